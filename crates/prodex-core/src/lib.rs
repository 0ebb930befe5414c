//! # prodex-core
//!
//! Core domain model for the prodex productization planner.
//!
//! This crate provides:
//! - Coordinates: `Ga`, `Gav` and raw descriptor `Expression`s
//! - The module model: `Module`, `Profile`, `Dependency`, `ParentRef`
//! - Closed taxonomies: `ProjectEdition`, `FoundationEdition`, `TestCategory`,
//!   `Support`, `OnCheckFailure`, `ElementWhitespace`
//! - The `ProductManifest` consumed by the planner
//! - `${name}` template expansion
//!
//! ## Example
//!
//! ```rust
//! use prodex_core::{Ga, TestCategory};
//!
//! let ga: Ga = "io.acme:ext-a".parse().unwrap();
//! assert_eq!(ga.artifact(), "ext-a");
//! assert_eq!(ga.deployment().artifact(), "ext-a-deployment");
//!
//! let category = TestCategory::PureProduct
//!     .upgrade_from(Some(TestCategory::MixedNative))
//!     .unwrap();
//! assert_eq!(category, TestCategory::PureProduct);
//! ```

pub mod category;
pub mod edition;
pub mod manifest;
pub mod template;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use thiserror::Error;

pub use category::{CategoryRegression, TestCategory};
pub use edition::{FoundationEdition, ProjectEdition};
pub use manifest::{ExtensionEntry, ManifestError, ProductManifest, Support};

/// Marker placed beside every child module reference disabled by prodex.
///
/// Any disabled reference carrying this marker is re-enabled at the start of the
/// next run, which makes pruning idempotent.
pub const COMMENT_MARK: &str = "disabled by prodex:prod-excludes";

/// Relative path of the root descriptor
pub const ROOT_DESCRIPTOR: &str = "pom.xml";

// ============================================================================
// Coordinates
// ============================================================================

/// A `group:artifact` coordinate
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ga {
    group: String,
    artifact: String,
}

impl Ga {
    pub fn new(group: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    /// The same group with `suffix` appended to the artifact
    pub fn with_suffix(&self, suffix: &str) -> Ga {
        Ga::new(self.group.clone(), format!("{}{}", self.artifact, suffix))
    }

    /// The `-deployment` sibling of an extension runtime artifact
    pub fn deployment(&self) -> Ga {
        self.with_suffix("-deployment")
    }
}

impl std::fmt::Display for Ga {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.group, self.artifact)
    }
}

/// Error parsing a `group:artifact` string
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid coordinate '{0}': expected group:artifact")]
pub struct GaParseError(pub String);

impl FromStr for Ga {
    type Err = GaParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(g), Some(a), None) if !g.is_empty() && !a.is_empty() => Ok(Ga::new(g, a)),
            _ => Err(GaParseError(s.to_string())),
        }
    }
}

/// A `group:artifact:version` coordinate with an evaluated version
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Gav {
    pub ga: Ga,
    pub version: String,
}

impl Gav {
    pub fn new(ga: Ga, version: impl Into<String>) -> Self {
        Self {
            ga,
            version: version.into(),
        }
    }
}

impl std::fmt::Display for Gav {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ga, self.version)
    }
}

// ============================================================================
// Expressions
// ============================================================================

/// Raw text of a descriptor value, possibly containing `${name}` placeholders
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Expression(String);

impl Expression {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn raw(&self) -> &str {
        &self.0
    }

    pub fn is_constant(&self) -> bool {
        !self.0.contains("${")
    }

    /// The value itself if it contains no placeholder
    pub fn as_constant(&self) -> Option<&str> {
        if self.is_constant() {
            Some(&self.0)
        } else {
            None
        }
    }

    /// Names of all well-formed `${name}` placeholders, in order of appearance
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.0.as_str();
        while let Some(start) = rest.find("${") {
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    names.push(&after[..end]);
                    rest = &after[end + 1..];
                }
                None => break,
            }
        }
        names
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Expression {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// Dependencies
// ============================================================================

/// Whether a dependency participates in the build closure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyKind {
    Normal,
    /// Marker entry driving downstream catalogs; never traversed
    Virtual,
}

/// A declared or managed dependency as written in a descriptor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub group: Expression,
    pub artifact: Expression,
    pub version: Option<Expression>,
    pub scope: Option<String>,
    pub dep_type: Option<String>,
    /// Exclusions as `group:artifact` patterns
    pub exclusions: Vec<String>,
    pub kind: DependencyKind,
}

impl Dependency {
    /// Create a normal, unscoped dependency
    pub fn new(group: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            group: Expression::new(group),
            artifact: Expression::new(artifact),
            version: None,
            scope: None,
            dep_type: None,
            exclusions: Vec::new(),
            kind: DependencyKind::Normal,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(Expression::new(version));
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn dep_type(mut self, dep_type: impl Into<String>) -> Self {
        self.dep_type = Some(dep_type.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclusions.push(pattern.into());
        self
    }

    /// Recompute `kind` from type, scope and exclusions.
    ///
    /// A virtual dependency is a test-scoped `pom` dependency excluding `*:*`.
    pub fn classify(mut self) -> Self {
        let virtual_marker = self.dep_type.as_deref() == Some("pom")
            && self.scope.as_deref() == Some("test")
            && self.exclusions.iter().any(|e| e == "*:*");
        self.kind = if virtual_marker {
            DependencyKind::Virtual
        } else {
            DependencyKind::Normal
        };
        self
    }

    pub fn is_virtual(&self) -> bool {
        self.kind == DependencyKind::Virtual
    }

    /// A managed `pom` dependency imported with `import` scope (a BOM import)
    pub fn is_import(&self) -> bool {
        self.scope.as_deref() == Some("import")
    }

    /// The raw version expression, empty when no version is declared
    pub fn raw_version(&self) -> &str {
        self.version.as_ref().map(Expression::raw).unwrap_or("")
    }
}

// ============================================================================
// Modules
// ============================================================================

/// A named conditional overlay of a descriptor, or the descriptor body itself
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// `None` for the descriptor body, which is always active
    pub id: Option<String>,
    pub properties: BTreeMap<String, Expression>,
    /// Enabled child module references, in document order
    pub modules: Vec<String>,
    /// Child module references disabled with [`COMMENT_MARK`]
    pub disabled_modules: Vec<String>,
    pub dependencies: Vec<Dependency>,
    pub managed_dependencies: Vec<Dependency>,
}

impl Profile {
    pub fn named(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn is_default(&self) -> bool {
        self.id.is_none()
    }
}

/// The set of named profiles considered active; the descriptor body always is
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActiveProfiles {
    ids: BTreeSet<String>,
}

impl ActiveProfiles {
    /// Only the descriptor bodies are active
    pub fn none() -> Self {
        Self::default()
    }

    pub fn of<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_active(&self, profile: &Profile) -> bool {
        match &profile.id {
            None => true,
            Some(id) => self.ids.contains(id),
        }
    }
}

/// The `<parent>` reference of a descriptor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub group: Expression,
    pub artifact: Expression,
    pub version: Expression,
    /// `None` means the default `../pom.xml`; `Some("")` means no local lookup
    pub relative_path: Option<String>,
}

/// The coordinates exactly as written in the descriptor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredGav {
    pub group: Option<Expression>,
    pub artifact: Expression,
    pub version: Option<Expression>,
}

/// A module of the source tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Evaluated coordinate
    pub ga: Ga,
    pub declared: DeclaredGav,
    /// Relative unix path of the descriptor, e.g. `extensions/foo/pom.xml`
    pub path: String,
    pub parent: Option<ParentRef>,
    /// Relative path of the parent descriptor when the parent lives in the tree
    pub parent_path: Option<String>,
    pub name: Option<String>,
    /// Profile 0 is the descriptor body
    pub profiles: Vec<Profile>,
}

impl Module {
    pub fn is_root(&self) -> bool {
        self.path == ROOT_DESCRIPTOR
    }

    /// Relative directory of the module, empty for the root
    pub fn dir(&self) -> &str {
        parent_dir(&self.path)
    }

    pub fn default_profile(&self) -> &Profile {
        &self.profiles[0]
    }

    pub fn active_profiles<'a>(
        &'a self,
        active: &'a ActiveProfiles,
    ) -> impl Iterator<Item = &'a Profile> + 'a {
        self.profiles.iter().filter(move |p| active.is_active(p))
    }

    /// The version as declared, falling back to the parent's version
    pub fn version_expression(&self) -> Option<&Expression> {
        self.declared
            .version
            .as_ref()
            .or_else(|| self.parent.as_ref().map(|p| &p.version))
    }
}

// ============================================================================
// Run options shared by the tree and the engine
// ============================================================================

/// How empty XML elements are written
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementWhitespace {
    /// `<modules />`
    #[default]
    Space,
    /// `<modules/>`
    Empty,
}

impl ElementWhitespace {
    pub fn empty_element(self, name: &str) -> String {
        match self {
            ElementWhitespace::Space => format!("<{} />", name),
            ElementWhitespace::Empty => format!("<{}/>", name),
        }
    }
}

impl FromStr for ElementWhitespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "space" => Ok(ElementWhitespace::Space),
            "empty" => Ok(ElementWhitespace::Empty),
            other => Err(format!("unknown element whitespace style '{}'", other)),
        }
    }
}

/// What to do when CHECK mode finds a divergence
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnCheckFailure {
    Warn,
    #[default]
    Fail,
    Ignore,
}

impl FromStr for OnCheckFailure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "warn" => Ok(OnCheckFailure::Warn),
            "fail" => Ok(OnCheckFailure::Fail),
            "ignore" => Ok(OnCheckFailure::Ignore),
            other => Err(format!("unknown check failure policy '{}'", other)),
        }
    }
}

impl std::fmt::Display for OnCheckFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OnCheckFailure::Warn => write!(f, "WARN"),
            OnCheckFailure::Fail => write!(f, "FAIL"),
            OnCheckFailure::Ignore => write!(f, "IGNORE"),
        }
    }
}

// ============================================================================
// Unix relative paths
// ============================================================================

/// Directory part of a relative unix path, empty for a top-level file
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..i],
        None => "",
    }
}

/// Join `rel` onto `base_dir` and normalize `.` and `..` segments.
///
/// Returns `None` when the result would escape the tree root.
pub fn join_unix(base_dir: &str, rel: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in base_dir.split('/').chain(rel.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            s => segments.push(s),
        }
    }
    Some(segments.join("/"))
}

/// Relative unix path leading from directory `from_dir` to `to`
pub fn relative_unix(from_dir: &str, to: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = to.split('/').filter(|s| !s.is_empty()).collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    let mut out: Vec<&str> = std::iter::repeat("..").take(from.len() - common).collect();
    out.extend(&to[common..]);
    out.join("/")
}

// ============================================================================
// Tests
// ============================================================================
