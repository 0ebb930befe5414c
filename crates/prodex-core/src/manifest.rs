//! The product source manifest.
//!
//! A JSON document declaring which extensions are productized and how they
//! are supported:
//!
//! ```json
//! {
//!   "guideUrlTemplate": "https://docs.acme.io/${majorVersion}/${artifactIdBase}.html",
//!   "extensions": {
//!     "ext-a": { "jvm": "supported", "native": "techPreview" },
//!     "ext-b": { "jvm": "supported", "native": "community", "allowedMixedTests": ["it-ext-b"] }
//!   },
//!   "additionalProductizedArtifacts": ["acme-bom"],
//!   "excludeTests": ["it-flaky"],
//!   "versionTransformations": { "2.1.0": "2.1.0.acme-00001" }
//! }
//! ```
//!
//! Unknown fields are ignored.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Support level of an extension in one runtime mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Support {
    #[serde(rename = "community", alias = "COMMUNITY")]
    Community,
    #[serde(rename = "techPreview", alias = "TECH_PREVIEW")]
    TechPreview,
    #[serde(rename = "supported", alias = "SUPPORTED")]
    Supported,
}

impl Support {
    pub fn has_product_documentation_page(self) -> bool {
        match self {
            Support::TechPreview | Support::Supported => true,
            Support::Community => false,
        }
    }
}

/// One productized extension
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionEntry {
    pub jvm: Support,
    pub native: Support,
    #[serde(default)]
    pub allowed_mixed_tests: Vec<String>,
}

impl ExtensionEntry {
    pub fn new(jvm: Support, native: Support) -> Self {
        Self {
            jvm,
            native,
            allowed_mixed_tests: Vec::new(),
        }
    }

    pub fn allow_mixed_test(mut self, artifact_id: impl Into<String>) -> Self {
        self.allowed_mixed_tests.push(artifact_id.into());
        self
    }

    pub fn has_product_documentation_page(&self) -> bool {
        self.jvm.has_product_documentation_page() || self.native.has_product_documentation_page()
    }
}

/// The fields of the product source manifest consumed by the planner
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductManifest {
    pub guide_url_template: String,
    pub extensions: BTreeMap<String, ExtensionEntry>,
    #[serde(default)]
    pub additional_productized_artifacts: Vec<String>,
    #[serde(default)]
    pub exclude_tests: Vec<String>,
    #[serde(default)]
    pub version_transformations: BTreeMap<String, String>,
}

/// Malformed or contradictory manifest
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid manifest field {field}: {message}")]
    Shape { field: String, message: String },
}

impl ManifestError {
    fn shape(field: impl Into<String>, message: impl Into<String>) -> Self {
        ManifestError::Shape {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl ProductManifest {
    /// Read and validate a manifest file
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: ProductManifest =
            serde_json::from_str(&content).map_err(|source| ManifestError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse and validate manifest JSON
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let manifest: ProductManifest =
            serde_json::from_str(json).map_err(|source| ManifestError::Json {
                path: PathBuf::from("<inline>"),
                source,
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Reject contradictory entries
    pub fn validate(&self) -> Result<(), ManifestError> {
        let excluded: BTreeSet<&str> = self.exclude_tests.iter().map(String::as_str).collect();

        for (artifact_id, entry) in &self.extensions {
            if artifact_id.trim().is_empty() {
                return Err(ManifestError::shape(
                    "extensions",
                    "extension artifactId must not be empty",
                ));
            }
            if excluded.contains(artifact_id.as_str()) {
                return Err(ManifestError::shape(
                    format!("excludeTests[{}]", artifact_id),
                    format!("extension {} cannot exclude itself as a test", artifact_id),
                ));
            }
            for (i, test) in entry.allowed_mixed_tests.iter().enumerate() {
                if excluded.contains(test.as_str()) {
                    return Err(ManifestError::shape(
                        format!("extensions.{}.allowedMixedTests[{}]", artifact_id, i),
                        format!("test {} is both allowed and excluded", test),
                    ));
                }
            }
        }

        for (from, to) in &self.version_transformations {
            if self.version_transformations.contains_key(to) && from != to {
                return Err(ManifestError::shape(
                    format!("versionTransformations.{}", from),
                    format!("target {} is itself transformed", to),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_minimal_manifest() {
        let manifest = ProductManifest::from_json(
            r#"{
                "guideUrlTemplate": "https://docs/${artifactIdBase}",
                "extensions": { "ext-a": { "jvm": "supported", "native": "community" } },
                "somethingElse": 42
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.extensions.len(), 1);
        let entry = &manifest.extensions["ext-a"];
        assert_eq!(entry.jvm, Support::Supported);
        assert!(entry.allowed_mixed_tests.is_empty());
        assert!(manifest.exclude_tests.is_empty());
        assert!(manifest.version_transformations.is_empty());
    }

    #[test]
    fn upper_snake_support_values() {
        let manifest = ProductManifest::from_json(
            r#"{
                "guideUrlTemplate": "",
                "extensions": { "ext-a": { "jvm": "TECH_PREVIEW", "native": "COMMUNITY" } }
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.extensions["ext-a"].jvm, Support::TechPreview);
        assert!(manifest.extensions["ext-a"].has_product_documentation_page());
    }

    #[test]
    fn community_only_has_no_product_page() {
        let entry = ExtensionEntry::new(Support::Community, Support::Community);
        assert!(!entry.has_product_documentation_page());
    }

    #[test]
    fn extension_excluding_itself_is_rejected() {
        let err = ProductManifest::from_json(
            r#"{
                "guideUrlTemplate": "",
                "extensions": { "ext-a": { "jvm": "supported", "native": "supported" } },
                "excludeTests": ["ext-a"]
            }"#,
        )
        .unwrap_err();
        match err {
            ManifestError::Shape { field, .. } => assert_eq!(field, "excludeTests[ext-a]"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn allowed_and_excluded_test_is_rejected() {
        let err = ProductManifest::from_json(
            r#"{
                "guideUrlTemplate": "",
                "extensions": { "ext-a": { "jvm": "supported", "native": "supported", "allowedMixedTests": ["it-a"] } },
                "excludeTests": ["it-a"]
            }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("extensions.ext-a.allowedMixedTests[0]"));
    }

    #[test]
    fn chained_version_transformation_is_rejected() {
        let err = ProductManifest::from_json(
            r#"{
                "guideUrlTemplate": "",
                "extensions": {},
                "versionTransformations": { "1.0": "1.1", "1.1": "1.2" }
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::Shape { .. }));
    }

    #[test]
    fn unknown_support_value_is_a_json_error() {
        let err = ProductManifest::from_json(
            r#"{ "guideUrlTemplate": "", "extensions": { "x": { "jvm": "maybe", "native": "supported" } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::Json { .. }));
    }
}
