//! # prodex-tree
//!
//! Reading and editing the descriptor tree of a multi-module project.
//!
//! This crate provides:
//! - A quick-xml based parser for Maven-style `pom.xml` descriptors
//! - [`ProjectGraph`]: an immutable snapshot of all modules with closure
//!   queries and `${name}` expression evaluation
//! - [`DescriptorEditor`]: targeted edits preserving every untouched byte
//! - [`relink_modules`]: re-enabling child references disabled by a previous run
//!
//! ## Example
//!
//! ```rust
//! use prodex_tree::descriptor;
//!
//! let xml = r#"<project>
//!     <groupId>io.acme</groupId>
//!     <artifactId>acme-root</artifactId>
//!     <version>1.0.0</version>
//!     <modules>
//!         <module>ext-a</module>
//!         <!-- <module>ext-b</module> disabled by prodex:prod-excludes -->
//!     </modules>
//! </project>"#;
//!
//! let parsed = descriptor::parse("pom.xml", xml).unwrap();
//! assert_eq!(parsed.declared.artifact.raw(), "acme-root");
//! assert_eq!(parsed.profiles[0].modules, vec!["ext-a"]);
//! assert_eq!(parsed.profiles[0].disabled_modules, vec!["ext-b"]);
//! ```

pub mod descriptor;
pub mod editor;
pub mod graph;
pub mod relink;
mod xml;

use std::path::PathBuf;
use thiserror::Error;

pub use editor::{DescriptorEditor, RawCoordinate};
pub use graph::{ExpressionEvaluator, ProjectGraph};
pub use relink::relink_modules;

/// Error reading, evaluating or editing the descriptor tree
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed descriptor {path}: {message}")]
    Xml { path: String, message: String },

    #[error("Descriptor {path} is missing <{element}>")]
    MissingElement { path: String, element: String },

    #[error("Module '{module}' referenced from {referenced_by} has no descriptor at {path}")]
    MissingDescriptor {
        path: String,
        module: String,
        referenced_by: String,
    },

    #[error("Duplicate module {ga} in {first} and {second}")]
    DuplicateModule {
        ga: String,
        first: String,
        second: String,
    },

    #[error("Cannot evaluate '{expression}' in {module}: {reason}")]
    UnresolvedExpression {
        expression: String,
        module: String,
        reason: String,
    },

    #[error("Parent {parent} of {module} cannot be located at {relative_path}")]
    ParentNotFound {
        module: String,
        parent: String,
        relative_path: String,
    },

    #[error("Cannot edit {path}: {message}")]
    Edit { path: String, message: String },
}

impl TreeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TreeError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn edit(path: impl Into<String>, message: impl Into<String>) -> Self {
        TreeError::Edit {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result alias for tree operations
pub type Result<T> = std::result::Result<T, TreeError>;
