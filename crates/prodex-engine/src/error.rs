//! Errors raised by the planning pipeline.

use prodex_core::{CategoryRegression, ManifestError};
use prodex_tree::TreeError;
use std::path::PathBuf;
use thiserror::Error;

/// Error kinds as reported to users, independent of the concrete variant
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    ManifestShape,
    GraphInvariant,
    CategoryRegression,
    UncoveredExtension,
    MissingFoundationArtifact,
    CheckDiff,
    Config,
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("{0}")]
    GraphInvariant(String),

    #[error("Test {test}: {source}")]
    CategoryRegression {
        test: String,
        #[source]
        source: CategoryRegression,
    },

    /// Productized extensions without a covering test; `report` is human readable
    #[error("{report}")]
    UncoveredExtensions { count: usize, report: String },

    #[error("Foundation artifacts missing from the catalog at version {version}:\n{}", format_list(.artifacts))]
    MissingFoundationArtifacts {
        version: String,
        artifacts: Vec<String>,
    },

    #[error("The source tree differs from the computed one in {files} file(s):\n{report}")]
    CheckDiff { files: usize, report: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{command} failed: {message}")]
    Tool { command: String, message: String },
}

fn format_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!(" - {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

impl PlanError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PlanError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PlanError::Io { .. } | PlanError::Tool { .. } => ErrorKind::Io,
            PlanError::Tree(TreeError::Io { .. }) => ErrorKind::Io,
            PlanError::Tree(_) | PlanError::GraphInvariant(_) => ErrorKind::GraphInvariant,
            PlanError::Manifest(ManifestError::Io { .. }) => ErrorKind::Io,
            PlanError::Manifest(_) => ErrorKind::ManifestShape,
            PlanError::CategoryRegression { .. } => ErrorKind::CategoryRegression,
            PlanError::UncoveredExtensions { .. } => ErrorKind::UncoveredExtension,
            PlanError::MissingFoundationArtifacts { .. } => ErrorKind::MissingFoundationArtifact,
            PlanError::CheckDiff { .. } => ErrorKind::CheckDiff,
            PlanError::Config(_) => ErrorKind::Config,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::CheckDiff => 2,
            ErrorKind::UncoveredExtension => 3,
            ErrorKind::MissingFoundationArtifact => 4,
            ErrorKind::Io
            | ErrorKind::ManifestShape
            | ErrorKind::GraphInvariant
            | ErrorKind::CategoryRegression
            | ErrorKind::Config => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlanError>;
