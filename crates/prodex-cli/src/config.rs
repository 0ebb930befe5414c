//! Option layering for the `prodex` binary.
//!
//! Every setting is taken from the command line first, then from the config
//! file (`--config`, or `prodex.toml` in the base directory), then from
//! [`PlannerConfig::default`].
//!
//! ```toml
//! available-nodes = 6
//! on-check-failure = "warn"
//! active-profiles = ["docs"]
//!
//! [[test-globs]]
//! directory = "integration-tests"
//! includes = ["*/pom.xml"]
//! excludes = ["broken/pom.xml"]
//!
//! [extra-transitive-map]
//! ext-a = ["io.found:found-x"]
//! ```

use anyhow::{Context, Result};
use clap::Args;
use prodex_core::{ElementWhitespace, OnCheckFailure};
use prodex_engine::config::parse_extra_transitive;
use prodex_engine::{PlannerConfig, TestGlob};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file looked up in the base directory when `--config` is not given
pub const CONFIG_FILE: &str = "prodex.toml";

// ============================================================================
// Config file
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub encoding: Option<String>,
    pub product_manifest: Option<PathBuf>,
    pub skip: Option<bool>,
    pub test_globs: Option<Vec<TestGlob>>,
    pub element_whitespace: Option<ElementWhitespace>,
    pub required_foundation_artifacts_file: Option<PathBuf>,
    pub productized_artifacts_file: Option<PathBuf>,
    pub available_nodes: Option<usize>,
    pub ci_file: Option<PathBuf>,
    pub ci_stage_template: Option<PathBuf>,
    pub foundation_version: Option<String>,
    pub community_version: Option<String>,
    pub product_version: Option<String>,
    pub on_check_failure: Option<OnCheckFailure>,
    pub extra_transitive_map: Option<BTreeMap<String, Vec<String>>>,
    pub active_profiles: Option<Vec<String>>,
    pub product_group: Option<String>,
    pub foundation_group: Option<String>,
    pub artifact_id_prefix: Option<String>,
    pub community_guide_url_template: Option<String>,
    pub default_community_guide_url: Option<String>,
    pub docs_reference_dir: Option<PathBuf>,
    pub extension_metadata_path: Option<String>,
    pub test_parents: Option<Vec<String>>,
    pub product_module: Option<String>,
    /// `false` disables the superapp
    pub superapp: Option<bool>,
    pub superapp_module: Option<String>,
    pub catalog_descriptor: Option<PathBuf>,
    pub test_list_descriptor: Option<PathBuf>,
    pub test_list_plugin: Option<String>,
    pub integration_tests_dir: Option<PathBuf>,
    pub foundation_catalog: Option<PathBuf>,
    pub transitive_deps_command: Option<Vec<String>>,
    pub transitive_productized_file: Option<PathBuf>,
    pub transitive_all_file: Option<PathBuf>,
    pub transitive_non_productized_file: Option<PathBuf>,
    pub check_auxiliary_files: Option<Vec<String>>,
}

impl FileConfig {
    pub fn parse(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Read `path`, which must exist
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Invalid config file {}", path.display()))
    }
}

// ============================================================================
// Command-line options
// ============================================================================

/// Options shared by `apply` and `check`
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Root of the source tree [default: current directory]
    #[arg(short = 'C', long, value_name = "DIR")]
    pub basedir: Option<PathBuf>,

    /// Config file [default: <basedir>/prodex.toml when present]
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Source encoding; only UTF-8 is supported
    #[arg(long)]
    pub encoding: Option<String>,

    /// Product manifest (JSON)
    #[arg(long, value_name = "FILE")]
    pub product_manifest: Option<PathBuf>,

    /// Do nothing and exit successfully
    #[arg(
        long,
        env = "PRODEX_SKIP",
        value_parser = clap::builder::BoolishValueParser::new(),
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub skip: Option<bool>,

    /// Test discovery glob as DIR:INCLUDE[,INCLUDE...], excludes prefixed with `!`
    #[arg(long = "test-glob", value_name = "DIR:GLOB")]
    pub test_globs: Vec<TestGlob>,

    /// How empty elements are written (space, empty)
    #[arg(long, value_name = "STYLE")]
    pub element_whitespace: Option<ElementWhitespace>,

    #[arg(long, value_name = "FILE")]
    pub required_foundation_artifacts_file: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub productized_artifacts_file: Option<PathBuf>,

    /// CI nodes available for test groups (at least 2)
    #[arg(long, value_name = "N")]
    pub available_nodes: Option<usize>,

    /// CI file holding the generated stages
    #[arg(long, value_name = "FILE")]
    pub ci_file: Option<PathBuf>,

    /// Template for one CI stage
    #[arg(long, value_name = "FILE")]
    pub ci_stage_template: Option<PathBuf>,

    #[arg(long, value_name = "VERSION")]
    pub foundation_version: Option<String>,

    #[arg(long, value_name = "VERSION")]
    pub community_version: Option<String>,

    #[arg(long, value_name = "VERSION")]
    pub product_version: Option<String>,

    /// What CHECK does with differences (warn, fail, ignore)
    #[arg(long, value_name = "POLICY")]
    pub on_check_failure: Option<OnCheckFailure>,

    /// Extra transitive dependencies as ARTIFACT=group:artifact[,group:artifact...]
    #[arg(long = "extra-transitive", value_name = "ENTRY", value_parser = parse_extra_transitive)]
    pub extra_transitive: Vec<(String, Vec<String>)>,

    #[arg(long = "active-profile", value_name = "ID")]
    pub active_profiles: Vec<String>,

    #[arg(long, value_name = "GROUP")]
    pub product_group: Option<String>,

    #[arg(long, value_name = "GROUP")]
    pub foundation_group: Option<String>,

    /// Prefix stripped from artifactIds in guide links
    #[arg(long, value_name = "PREFIX")]
    pub artifact_id_prefix: Option<String>,

    #[arg(long, value_name = "URL")]
    pub community_guide_url_template: Option<String>,

    #[arg(long, value_name = "URL")]
    pub default_community_guide_url: Option<String>,

    #[arg(long, value_name = "DIR")]
    pub docs_reference_dir: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub extension_metadata_path: Option<String>,

    /// Child module of the root aggregating integration tests
    #[arg(long = "test-parent", value_name = "DIR")]
    pub test_parents: Vec<String>,

    #[arg(long, value_name = "DIR")]
    pub product_module: Option<String>,

    /// Module below the product aggregator depending on every required extension
    #[arg(long, value_name = "DIR")]
    pub superapp_module: Option<String>,

    /// Do not generate the superapp module
    #[arg(long)]
    pub no_superapp: bool,

    /// Descriptor whose virtual dependencies list the required extensions
    #[arg(long, value_name = "FILE")]
    pub catalog_descriptor: Option<PathBuf>,

    /// Descriptor of the test list tooling
    #[arg(long, value_name = "FILE")]
    pub test_list_descriptor: Option<PathBuf>,

    /// Test list plugin as groupId:artifactId
    #[arg(long, value_name = "GA")]
    pub test_list_plugin: Option<String>,

    /// Directory the test list excludes are relative to
    #[arg(long, value_name = "DIR")]
    pub integration_tests_dir: Option<PathBuf>,

    /// Descriptor of the foundation BOM checked for required artifacts.
    /// Without it the check is skipped and missing artifacts go unreported.
    #[arg(long, value_name = "FILE")]
    pub foundation_catalog: Option<PathBuf>,

    /// Transitive dependency analyzer, split on whitespace
    #[arg(long, value_name = "COMMAND")]
    pub transitive_deps_command: Option<String>,

    #[arg(long, value_name = "FILE")]
    pub transitive_productized_file: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub transitive_all_file: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub transitive_non_productized_file: Option<PathBuf>,

    /// Non-descriptor file compared in CHECK mode (glob)
    #[arg(long = "check-auxiliary-file", value_name = "GLOB")]
    pub check_auxiliary_files: Vec<String>,
}

impl RunArgs {
    pub fn basedir(&self) -> PathBuf {
        self.basedir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// The `--config` file, else `prodex.toml` in the base directory if any
    pub fn load_file_config(&self) -> Result<FileConfig> {
        if let Some(path) = &self.config {
            return FileConfig::load(path);
        }
        let path = self.basedir().join(CONFIG_FILE);
        if path.is_file() {
            debug!("Using config file {}", path.display());
            FileConfig::load(&path)
        } else {
            Ok(FileConfig::default())
        }
    }

    /// Planner configuration from these options layered over `file`
    pub fn into_planner_config(self, file: FileConfig) -> PlannerConfig {
        let defaults = PlannerConfig::default();
        let basedir = self.basedir();
        PlannerConfig {
            basedir,
            encoding: pick(self.encoding, file.encoding, defaults.encoding),
            product_manifest: pick(
                self.product_manifest,
                file.product_manifest,
                defaults.product_manifest,
            ),
            skip: pick(self.skip, file.skip, defaults.skip),
            test_globs: pick(non_empty(self.test_globs), file.test_globs, defaults.test_globs),
            element_whitespace: pick(
                self.element_whitespace,
                file.element_whitespace,
                defaults.element_whitespace,
            ),
            required_foundation_artifacts_file: pick(
                self.required_foundation_artifacts_file,
                file.required_foundation_artifacts_file,
                defaults.required_foundation_artifacts_file,
            ),
            productized_artifacts_file: pick(
                self.productized_artifacts_file,
                file.productized_artifacts_file,
                defaults.productized_artifacts_file,
            ),
            available_nodes: pick(
                self.available_nodes,
                file.available_nodes,
                defaults.available_nodes,
            ),
            ci_file: pick(self.ci_file, file.ci_file, defaults.ci_file),
            ci_stage_template: self.ci_stage_template.or(file.ci_stage_template),
            foundation_version: self.foundation_version.or(file.foundation_version),
            community_version: self.community_version.or(file.community_version),
            product_version: self.product_version.or(file.product_version),
            on_check_failure: pick(
                self.on_check_failure,
                file.on_check_failure,
                defaults.on_check_failure,
            ),
            extra_transitive_map: pick(
                non_empty(self.extra_transitive).map(|entries| entries.into_iter().collect()),
                file.extra_transitive_map,
                defaults.extra_transitive_map,
            ),
            active_profiles: pick(
                non_empty(self.active_profiles),
                file.active_profiles,
                defaults.active_profiles,
            ),
            product_group: self.product_group.or(file.product_group),
            foundation_group: self.foundation_group.or(file.foundation_group),
            artifact_id_prefix: pick(
                self.artifact_id_prefix,
                file.artifact_id_prefix,
                defaults.artifact_id_prefix,
            ),
            community_guide_url_template: pick(
                self.community_guide_url_template,
                file.community_guide_url_template,
                defaults.community_guide_url_template,
            ),
            default_community_guide_url: pick(
                self.default_community_guide_url,
                file.default_community_guide_url,
                defaults.default_community_guide_url,
            ),
            docs_reference_dir: pick(
                self.docs_reference_dir,
                file.docs_reference_dir,
                defaults.docs_reference_dir,
            ),
            extension_metadata_path: pick(
                self.extension_metadata_path,
                file.extension_metadata_path,
                defaults.extension_metadata_path,
            ),
            test_parents: pick(
                non_empty(self.test_parents),
                file.test_parents,
                defaults.test_parents,
            ),
            product_module: pick(self.product_module, file.product_module, defaults.product_module),
            superapp_module: if self.no_superapp || file.superapp == Some(false) {
                None
            } else {
                self.superapp_module
                    .or(file.superapp_module)
                    .or(defaults.superapp_module)
            },
            catalog_descriptor: pick(
                self.catalog_descriptor,
                file.catalog_descriptor,
                defaults.catalog_descriptor,
            ),
            test_list_descriptor: pick(
                self.test_list_descriptor,
                file.test_list_descriptor,
                defaults.test_list_descriptor,
            ),
            test_list_plugin: pick(
                self.test_list_plugin,
                file.test_list_plugin,
                defaults.test_list_plugin,
            ),
            integration_tests_dir: pick(
                self.integration_tests_dir,
                file.integration_tests_dir,
                defaults.integration_tests_dir,
            ),
            foundation_catalog: self.foundation_catalog.or(file.foundation_catalog),
            transitive_deps_command: self
                .transitive_deps_command
                .map(|command| command.split_whitespace().map(str::to_string).collect())
                .or(file.transitive_deps_command),
            transitive_productized_file: pick(
                self.transitive_productized_file,
                file.transitive_productized_file,
                defaults.transitive_productized_file,
            ),
            transitive_all_file: pick(
                self.transitive_all_file,
                file.transitive_all_file,
                defaults.transitive_all_file,
            ),
            transitive_non_productized_file: pick(
                self.transitive_non_productized_file,
                file.transitive_non_productized_file,
                defaults.transitive_non_productized_file,
            ),
            check_auxiliary_files: non_empty(self.check_auxiliary_files)
                .or(file.check_auxiliary_files),
        }
    }
}

fn pick<T>(cli: Option<T>, file: Option<T>, default: T) -> T {
    cli.or(file).unwrap_or(default)
}

/// Repeatable flags count as given once they occur at all
fn non_empty<T>(values: Vec<T>) -> Option<Vec<T>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}
