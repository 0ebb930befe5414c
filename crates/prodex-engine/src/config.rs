//! Planner configuration.
//!
//! Every relative path is interpreted against the tree being processed: the
//! source tree in APPLY mode, the scratch copy in CHECK mode. Inputs that are
//! only ever read (manifest, documentation pages, stage template, foundation
//! catalog) are resolved against `basedir`.

use crate::error::{PlanError, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use prodex_core::{ElementWhitespace, OnCheckFailure};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Marker lines delimiting the generated region of the CI file
pub const STAGES_START: &str = "// %generated-stages-start%";
pub const STAGES_END: &str = "// %generated-stages-end%";

// ============================================================================
// Test discovery globs
// ============================================================================

/// Descriptors under `directory` matching any include and no exclude
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestGlob {
    pub directory: String,
    pub includes: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
}

impl TestGlob {
    pub fn new(directory: impl Into<String>, include: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            includes: vec![include.into()],
            excludes: Vec::new(),
        }
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.excludes.push(pattern.into());
        self
    }

    pub(crate) fn include_set(&self) -> Result<GlobSet> {
        glob_set(&self.includes)
    }

    pub(crate) fn exclude_set(&self) -> Result<GlobSet> {
        glob_set(&self.excludes)
    }
}

/// `directory:include[,include...]`, excludes prefixed with `!`
impl FromStr for TestGlob {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (directory, patterns) = s
            .split_once(':')
            .ok_or_else(|| format!("expected directory:pattern, got '{}'", s))?;
        let mut glob = TestGlob {
            directory: directory.trim().to_string(),
            includes: Vec::new(),
            excludes: Vec::new(),
        };
        for pattern in patterns.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match pattern.strip_prefix('!') {
                Some(exclude) => glob.excludes.push(exclude.to_string()),
                None => glob.includes.push(pattern.to_string()),
            }
        }
        if glob.directory.is_empty() || glob.includes.is_empty() {
            return Err(format!("'{}' needs a directory and at least one include", s));
        }
        Ok(glob)
    }
}

/// Compile `patterns` with `*` not crossing directory separators
pub(crate) fn glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| PlanError::Config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| PlanError::Config(format!("invalid glob set: {}", e)))
}

/// Parse one `ARTIFACT=group:artifact,...` entry of the extra transitive map
pub fn parse_extra_transitive(entry: &str) -> std::result::Result<(String, Vec<String>), String> {
    let (artifact, patterns) = entry
        .split_once('=')
        .ok_or_else(|| format!("expected ARTIFACT=group:artifact,..., got '{}'", entry))?;
    let artifact = artifact.trim();
    if artifact.is_empty() {
        return Err(format!("missing artifactId in '{}'", entry));
    }
    let patterns: Vec<String> = patterns
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if let Some(bad) = patterns.iter().find(|p| p.split(':').count() != 2) {
        return Err(format!("'{}' is not a group:artifact pattern", bad));
    }
    Ok((artifact.to_string(), patterns))
}

// ============================================================================
// Planner configuration
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct PlannerConfig {
    /// Root of the source tree
    pub basedir: PathBuf,
    /// Only UTF-8 is supported
    pub encoding: String,
    pub product_manifest: PathBuf,
    pub skip: bool,
    pub test_globs: Vec<TestGlob>,
    pub element_whitespace: ElementWhitespace,
    pub required_foundation_artifacts_file: PathBuf,
    pub productized_artifacts_file: PathBuf,
    pub available_nodes: usize,
    pub ci_file: PathBuf,
    /// Stage template file; the built-in one when `None`
    pub ci_stage_template: Option<PathBuf>,
    /// Defaults to the evaluated `${foundation.version}` of the root module
    pub foundation_version: Option<String>,
    /// Defaults to the evaluated `${community.version}` of the root module, if any
    pub community_version: Option<String>,
    /// Defaults to the root module version
    pub product_version: Option<String>,
    pub on_check_failure: OnCheckFailure,
    /// Extension artifactId to extra `group:artifact` patterns for the transitive analyzer
    pub extra_transitive_map: BTreeMap<String, Vec<String>>,
    pub active_profiles: Vec<String>,
    /// Defaults to the group of the root module
    pub product_group: Option<String>,
    /// Defaults to the group of the root module's parent
    pub foundation_group: Option<String>,
    /// Stripped from artifactIds to form `${artifactIdBase}`
    pub artifact_id_prefix: String,
    pub community_guide_url_template: String,
    pub default_community_guide_url: String,
    pub docs_reference_dir: PathBuf,
    /// Metadata file holding the `guide:` link, relative to a module directory
    pub extension_metadata_path: String,
    /// Child references of the root aggregating integration tests
    pub test_parents: Vec<String>,
    /// Directory of the product aggregator
    pub product_module: String,
    /// Module below the product aggregator depending on every required extension.
    /// Not generated when `None`.
    pub superapp_module: Option<String>,
    /// Descriptor whose virtual dependencies mirror the required extensions; skipped when missing
    pub catalog_descriptor: PathBuf,
    /// Descriptor configuring the test list plugin; skipped when missing
    pub test_list_descriptor: PathBuf,
    /// `groupId:artifactId` of the plugin whose file set excludes list the excluded tests
    pub test_list_plugin: String,
    /// Directory the test list excludes are relative to
    pub integration_tests_dir: PathBuf,
    /// Descriptor of the foundation BOM; the catalog check is skipped when `None`
    pub foundation_catalog: Option<PathBuf>,
    /// Program and arguments of the transitive dependency analyzer
    pub transitive_deps_command: Option<Vec<String>>,
    pub transitive_productized_file: PathBuf,
    pub transitive_all_file: PathBuf,
    pub transitive_non_productized_file: PathBuf,
    /// Globs of non-descriptor files staged and compared in CHECK mode.
    /// `None` selects the CI file, extension metadata and transitive lists.
    pub check_auxiliary_files: Option<Vec<String>>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            basedir: PathBuf::from("."),
            encoding: "utf-8".to_string(),
            product_manifest: PathBuf::from("product/src/main/resources/product-source.json"),
            skip: false,
            test_globs: vec![
                TestGlob::new("tests", "*/pom.xml"),
                TestGlob::new("jvm-tests", "*/pom.xml"),
                TestGlob::new("test-groups", "*/pom.xml"),
            ],
            element_whitespace: ElementWhitespace::Space,
            required_foundation_artifacts_file: PathBuf::from(
                "target/required-foundation-artifacts.txt",
            ),
            productized_artifacts_file: PathBuf::from("target/productized-artifacts.txt"),
            available_nodes: 10,
            ci_file: PathBuf::from("Jenkinsfile.product"),
            ci_stage_template: None,
            foundation_version: None,
            community_version: None,
            product_version: None,
            on_check_failure: OnCheckFailure::Fail,
            extra_transitive_map: BTreeMap::new(),
            active_profiles: Vec::new(),
            product_group: None,
            foundation_group: None,
            artifact_id_prefix: String::new(),
            community_guide_url_template:
                "https://community.example.org/latest/reference/extensions/${artifactIdBase}.html"
                    .to_string(),
            default_community_guide_url: "https://community.example.org/latest/user-guide/index.html"
                .to_string(),
            docs_reference_dir: PathBuf::from("docs/reference/extensions"),
            extension_metadata_path: "src/main/resources/META-INF/extension-metadata.yaml"
                .to_string(),
            test_parents: vec![
                "tests".to_string(),
                "jvm-tests".to_string(),
                "test-groups".to_string(),
            ],
            product_module: "product".to_string(),
            superapp_module: Some("superapp".to_string()),
            catalog_descriptor: PathBuf::from("catalog/pom.xml"),
            test_list_descriptor: PathBuf::from("tooling/test-list/pom.xml"),
            test_list_plugin: "org.l2x6.rpkgtests:rpkgtests-maven-plugin".to_string(),
            integration_tests_dir: PathBuf::from("tests"),
            foundation_catalog: None,
            transitive_deps_command: None,
            transitive_productized_file: PathBuf::from(
                "product/src/main/generated/transitive-dependencies-productized.txt",
            ),
            transitive_all_file: PathBuf::from(
                "product/src/main/generated/transitive-dependencies-all.txt",
            ),
            transitive_non_productized_file: PathBuf::from(
                "product/src/main/generated/transitive-dependencies-non-productized.txt",
            ),
            check_auxiliary_files: None,
        }
    }
}

impl PlannerConfig {
    pub fn new(basedir: impl Into<PathBuf>) -> Self {
        Self {
            basedir: basedir.into(),
            ..Default::default()
        }
    }

    /// Reject settings no run could succeed with
    pub fn validate(&self) -> Result<()> {
        let encoding = self.encoding.to_ascii_lowercase().replace('_', "-");
        if encoding != "utf-8" && encoding != "utf8" {
            return Err(PlanError::Config(format!(
                "unsupported encoding '{}': only UTF-8 is supported",
                self.encoding
            )));
        }
        if self.available_nodes < 2 {
            return Err(PlanError::Config(format!(
                "availableNodes must be at least 2, got {}",
                self.available_nodes
            )));
        }
        if self.test_globs.iter().any(|g| g.includes.is_empty()) {
            return Err(PlanError::Config(
                "every test glob needs at least one include pattern".to_string(),
            ));
        }
        if let Some(command) = &self.transitive_deps_command {
            if command.is_empty() {
                return Err(PlanError::Config(
                    "transitiveDepsCommand must name a program".to_string(),
                ));
            }
        }
        if let Some(module) = &self.superapp_module {
            if module.is_empty() || module.contains(['/', '\\']) {
                return Err(PlanError::Config(format!(
                    "superappModule must be a plain directory name, got '{}'",
                    module
                )));
            }
        }
        self.test_list_coordinate()?;
        for glob in &self.test_globs {
            glob.include_set()?;
            glob.exclude_set()?;
        }
        glob_set(&self.auxiliary_globs())?;
        Ok(())
    }

    /// `path` resolved against `basedir` unless absolute
    pub fn resolve(&self, path: &Path) -> PathBuf {
        resolve_in(&self.basedir, path)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.resolve(&self.product_manifest)
    }

    /// Directory of the product aggregator inside `work_root`
    pub fn product_dir(&self, work_root: &Path) -> PathBuf {
        work_root.join(&self.product_module)
    }

    /// `test_list_plugin` split into its raw group and artifact
    pub fn test_list_coordinate(&self) -> Result<(String, String)> {
        match self.test_list_plugin.split_once(':') {
            Some((group, artifact)) if !group.is_empty() && !artifact.is_empty() && !artifact.contains(':') => {
                Ok((group.to_string(), artifact.to_string()))
            }
            _ => Err(PlanError::Config(format!(
                "testListPlugin must be groupId:artifactId, got '{}'",
                self.test_list_plugin
            ))),
        }
    }

    /// Globs of auxiliary files staged and compared in CHECK mode
    pub fn auxiliary_globs(&self) -> Vec<String> {
        if let Some(globs) = &self.check_auxiliary_files {
            return globs.clone();
        }
        let mut globs = vec![
            unix(&self.ci_file),
            format!("**/{}", self.extension_metadata_path.trim_start_matches('/')),
        ];
        for file in [
            &self.transitive_productized_file,
            &self.transitive_all_file,
            &self.transitive_non_productized_file,
        ] {
            globs.push(unix(file));
        }
        globs
    }
}

/// `path` inside `root` unless absolute
pub fn resolve_in(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn unix(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_is_valid() {
        let config = PlannerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.available_nodes, 10);
        assert_eq!(config.on_check_failure, OnCheckFailure::Fail);
        assert_eq!(config.test_globs.len(), 3);
    }

    #[test]
    fn rejects_single_node() {
        let config = PlannerConfig {
            available_nodes: 1,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("availableNodes"));
    }

    #[test]
    fn rejects_other_encodings() {
        let config = PlannerConfig {
            encoding: "ISO-8859-1".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PlanError::Config(_))));

        let config = PlannerConfig {
            encoding: "UTF_8".to_string(),
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_list_plugin_coordinate() {
        let config = PlannerConfig::default();
        assert_eq!(
            config.test_list_coordinate().unwrap(),
            ("org.l2x6.rpkgtests".to_string(), "rpkgtests-maven-plugin".to_string())
        );

        for bad in ["rpkgtests-maven-plugin", ":a", "g:a:1"] {
            let config = PlannerConfig {
                test_list_plugin: bad.to_string(),
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(PlanError::Config(_))), "{}", bad);
        }
    }

    #[test]
    fn superapp_module_is_a_directory_name() {
        let config = PlannerConfig {
            superapp_module: Some("apps/superapp".to_string()),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("superappModule"));

        let config = PlannerConfig {
            superapp_module: None,
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_glob_from_str() {
        let glob: TestGlob = "tests:*/pom.xml,!broken/pom.xml".parse().unwrap();
        assert_eq!(glob.directory, "tests");
        assert_eq!(glob.includes, vec!["*/pom.xml"]);
        assert_eq!(glob.excludes, vec!["broken/pom.xml"]);

        assert!("tests".parse::<TestGlob>().is_err());
        assert!("tests:!x".parse::<TestGlob>().is_err());
    }

    #[test]
    fn single_star_stays_in_one_directory() {
        let set = TestGlob::new("tests", "*/pom.xml").include_set().unwrap();
        assert!(set.is_match("it-a/pom.xml"));
        assert!(!set.is_match("it-a/target/pom.xml"));
        assert!(!set.is_match("pom.xml"));
    }

    #[test]
    fn extra_transitive_entries() {
        let (artifact, patterns) =
            parse_extra_transitive("ext-a=io.found:found-x, io.found:found-y").unwrap();
        assert_eq!(artifact, "ext-a");
        assert_eq!(patterns, vec!["io.found:found-x", "io.found:found-y"]);

        assert!(parse_extra_transitive("ext-a").is_err());
        assert!(parse_extra_transitive("=a:b").is_err());
        assert!(parse_extra_transitive("ext-a=nogroup").is_err());
    }

    #[test]
    fn default_auxiliary_globs() {
        let config = PlannerConfig::default();
        let globs = config.auxiliary_globs();
        assert_eq!(globs[0], "Jenkinsfile.product");
        assert_eq!(globs[1], "**/src/main/resources/META-INF/extension-metadata.yaml");
        assert_eq!(globs.len(), 5);

        let set = glob_set(&globs).unwrap();
        assert!(set.is_match("extensions/ext-a/runtime/src/main/resources/META-INF/extension-metadata.yaml"));
        assert!(set.is_match("product/src/main/generated/transitive-dependencies-all.txt"));
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let config = PlannerConfig::new("/work");
        assert_eq!(config.resolve(Path::new("a/b")), PathBuf::from("/work/a/b"));
        assert_eq!(config.resolve(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
