//! Report files, guide links and the external collaborators they consult.
//!
//! The foundation catalog and the transitive dependency analyzer sit behind
//! traits so that runs can be driven without a build tool on the path.

use crate::config::PlannerConfig;
use crate::error::{PlanError, Result};
use crate::plan::Plan;
use prodex_core::{Expression, Ga};
use prodex_tree::ProjectGraph;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

// ============================================================================
// Foundation catalog
// ============================================================================

/// The artifacts a foundation release manages
pub trait FoundationCatalog {
    /// Coordinates managed at `version`
    fn artifacts(&self, version: &str) -> Result<BTreeSet<Ga>>;
}

/// A catalog read from the managed dependencies of a BOM descriptor
#[derive(Clone, Debug)]
pub struct BomCatalog {
    path: PathBuf,
}

impl BomCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FoundationCatalog for BomCatalog {
    fn artifacts(&self, version: &str) -> Result<BTreeSet<Ga>> {
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| PlanError::io(&self.path, e))?;
        let descriptor = prodex_tree::descriptor::parse(&self.path.to_string_lossy(), &content)?;
        let bom_group = descriptor
            .declared
            .group
            .as_ref()
            .or_else(|| descriptor.parent.as_ref().map(|p| &p.group))
            .and_then(Expression::as_constant)
            .unwrap_or_default()
            .to_string();
        let Some(body) = descriptor.profiles.first() else {
            return Ok(BTreeSet::new());
        };

        let at_version = |raw: &str| -> bool {
            match raw {
                "${project.version}" | "${self.version}" => true,
                _ if raw == version => true,
                _ => Expression::new(raw)
                    .placeholders()
                    .first()
                    .filter(|_| raw.starts_with("${") && raw.ends_with('}'))
                    .and_then(|name| body.properties.get(*name))
                    .and_then(Expression::as_constant)
                    .is_some_and(|value| value == version),
            }
        };

        let mut artifacts = BTreeSet::new();
        for dependency in &body.managed_dependencies {
            if dependency.is_import() || !at_version(dependency.raw_version()) {
                continue;
            }
            let group = match dependency.group.raw() {
                "${project.groupId}" => bom_group.as_str(),
                raw if dependency.group.is_constant() => raw,
                _ => continue,
            };
            if let Some(artifact) = dependency.artifact.as_constant() {
                artifacts.insert(Ga::new(group, artifact));
            }
        }
        debug!(
            "Catalog {} manages {} artifact(s) at {}",
            self.path.display(),
            artifacts.len(),
            version
        );
        Ok(artifacts)
    }
}

// ============================================================================
// Transitive dependency analysis
// ============================================================================

/// Everything the analyzer needs to produce the three dependency lists
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitiveRequest {
    pub work_root: PathBuf,
    pub productized_file: PathBuf,
    pub all_file: PathBuf,
    pub non_productized_file: PathBuf,
    pub product_version: String,
    pub community_version: Option<String>,
    pub foundation_version: Option<String>,
    pub extra_transitive_map: BTreeMap<String, Vec<String>>,
}

impl TransitiveRequest {
    /// `ARTIFACT=group:artifact,...` entries joined with `;`
    pub fn extra_transitive_entries(&self) -> String {
        self.extra_transitive_map
            .iter()
            .map(|(artifact, patterns)| format!("{}={}", artifact, patterns.join(",")))
            .collect::<Vec<_>>()
            .join(";")
    }
}

pub trait TransitiveDependencyAnalyzer {
    fn analyze(&self, request: &TransitiveRequest) -> Result<()>;
}

/// Runs an external program with the request passed as `PRODEX_*` variables
#[derive(Clone, Debug)]
pub struct CommandAnalyzer {
    program: String,
    args: Vec<String>,
}

impl CommandAnalyzer {
    /// `None` when `command` is empty
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl TransitiveDependencyAnalyzer for CommandAnalyzer {
    fn analyze(&self, request: &TransitiveRequest) -> Result<()> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&request.work_root)
            .env("PRODEX_WORK_ROOT", &request.work_root)
            .env("PRODEX_PRODUCTIZED_FILE", &request.productized_file)
            .env("PRODEX_ALL_FILE", &request.all_file)
            .env("PRODEX_NON_PRODUCTIZED_FILE", &request.non_productized_file)
            .env("PRODEX_PRODUCT_VERSION", &request.product_version)
            .env("PRODEX_EXTRA_TRANSITIVE", request.extra_transitive_entries());
        if let Some(version) = &request.community_version {
            command.env("PRODEX_COMMUNITY_VERSION", version);
        }
        if let Some(version) = &request.foundation_version {
            command.env("PRODEX_FOUNDATION_VERSION", version);
        }

        debug!("Running {}", self.display());
        let output = command.output().map_err(|e| PlanError::Tool {
            command: self.display(),
            message: e.to_string(),
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlanError::Tool {
                command: self.display(),
                message: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Guide links
// ============================================================================

/// `content` with its first `guide: "..."` value set to `url`.
///
/// `None` when there is no guide entry or it already points to `url`.
pub fn replace_guide(content: &str, url: &str) -> Option<String> {
    static GUIDE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = GUIDE
        .get_or_init(|| Regex::new(r#"guide: "([^"]*)""#).ok())
        .as_ref()?;
    let captures = re.captures(content)?;
    let value = captures.get(1)?;
    if value.as_str() == url {
        return None;
    }
    Some(format!(
        "{}{}{}",
        &content[..value.start()],
        url,
        &content[value.end()..]
    ))
}

// ============================================================================
// Report writer
// ============================================================================

pub struct ReportWriter<'a> {
    config: &'a PlannerConfig,
    catalog: Option<&'a dyn FoundationCatalog>,
    analyzer: Option<&'a dyn TransitiveDependencyAnalyzer>,
}

impl<'a> ReportWriter<'a> {
    pub fn new(config: &'a PlannerConfig) -> Self {
        Self {
            config,
            catalog: None,
            analyzer: None,
        }
    }

    pub fn with_catalog(mut self, catalog: Option<&'a dyn FoundationCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_analyzer(mut self, analyzer: Option<&'a dyn TransitiveDependencyAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Write every report below `work_root` and update guide links.
    ///
    /// Foundation artifacts missing from the catalog are recorded in
    /// `plan.missing_foundation_artifacts`; the caller decides when to fail.
    pub fn write(&self, graph: &ProjectGraph, work_root: &Path, plan: &mut Plan) -> Result<()> {
        self.write_productized_artifacts(work_root, plan)?;
        self.write_required_foundation_artifacts(graph, work_root, plan)?;
        self.update_guide_links(graph, work_root, plan)?;
        self.run_transitive_analyzer(work_root, plan)
    }

    fn write_productized_artifacts(&self, work_root: &Path, plan: &Plan) -> Result<()> {
        let artifacts: BTreeSet<&str> = plan
            .expanded_includes_with_tests
            .iter()
            .map(Ga::artifact)
            .collect();
        let path = work_root.join(&self.config.productized_artifacts_file);
        write_lines(&path, artifacts)?;
        info!("Wrote {} productized artifact(s) to {}", plan.expanded_includes_with_tests.len(), path.display());
        Ok(())
    }

    fn write_required_foundation_artifacts(
        &self,
        graph: &ProjectGraph,
        work_root: &Path,
        plan: &mut Plan,
    ) -> Result<()> {
        let mut required = BTreeSet::new();
        for module in plan
            .expanded_includes_with_tests
            .iter()
            .filter_map(|ga| graph.module(ga))
        {
            for dependency in module.profiles.iter().flat_map(|p| p.dependencies.iter()) {
                let ga = graph.dependency_ga(dependency, module)?;
                if ga.group() == plan.foundation_group {
                    required.insert(ga);
                }
            }
        }

        plan.missing_foundation_artifacts = match (self.catalog, &plan.foundation_version) {
            (Some(catalog), Some(version)) => {
                let managed = catalog.artifacts(version)?;
                required.difference(&managed).cloned().collect()
            }
            (Some(_), None) => {
                warn!("Foundation version unknown, skipping the foundation catalog check");
                BTreeSet::new()
            }
            (None, _) => {
                warn!(
                    "No foundation catalog configured, {} required foundation artifact(s) not checked",
                    required.len()
                );
                BTreeSet::new()
            }
        };

        let path = work_root.join(&self.config.required_foundation_artifacts_file);
        write_lines(&path, required.iter().map(Ga::artifact).collect::<BTreeSet<_>>())?;
        debug!("Wrote {} required foundation artifact(s) to {}", required.len(), path.display());
        plan.required_foundation_artifacts = required;
        Ok(())
    }

    fn update_guide_links(&self, graph: &ProjectGraph, work_root: &Path, plan: &Plan) -> Result<()> {
        let mut updated = 0;
        for module in graph.modules() {
            let Some(url) = plan.doc_pages.get(&module.ga) else {
                continue;
            };
            let path = work_root
                .join(module.dir())
                .join(&self.config.extension_metadata_path);
            if !path.is_file() {
                continue;
            }
            let content = std::fs::read_to_string(&path).map_err(|e| PlanError::io(&path, e))?;
            if let Some(new_content) = replace_guide(&content, url) {
                std::fs::write(&path, new_content).map_err(|e| PlanError::io(&path, e))?;
                debug!("{}: guide -> {}", module.ga.artifact(), url);
                updated += 1;
            }
        }
        if updated > 0 {
            info!("Updated {} guide link(s)", updated);
        }
        Ok(())
    }

    fn run_transitive_analyzer(&self, work_root: &Path, plan: &Plan) -> Result<()> {
        let Some(analyzer) = self.analyzer else {
            debug!("No transitive dependency analyzer configured");
            return Ok(());
        };
        let request = TransitiveRequest {
            work_root: work_root.to_path_buf(),
            productized_file: work_root.join(&self.config.transitive_productized_file),
            all_file: work_root.join(&self.config.transitive_all_file),
            non_productized_file: work_root.join(&self.config.transitive_non_productized_file),
            product_version: plan.product_version.clone(),
            community_version: plan.community_version.clone(),
            foundation_version: plan.foundation_version.clone(),
            extra_transitive_map: self.config.extra_transitive_map.clone(),
        };
        for file in [&request.productized_file, &request.all_file, &request.non_productized_file] {
            if let Some(dir) = file.parent() {
                std::fs::create_dir_all(dir).map_err(|e| PlanError::io(dir, e))?;
            }
        }
        analyzer.analyze(&request)?;
        info!("Transitive dependency lists updated");
        Ok(())
    }
}

/// Write one item per line, creating parent directories
fn write_lines<'i>(path: &Path, items: impl IntoIterator<Item = &'i str>) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| PlanError::io(dir, e))?;
    }
    let mut content = String::new();
    for item in items {
        content.push_str(item);
        content.push('\n');
    }
    std::fs::write(path, content).map_err(|e| PlanError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BOM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project>
    <modelVersion>4.0.0</modelVersion>
    <groupId>io.found</groupId>
    <artifactId>found-bom</artifactId>
    <version>4.0.0</version>
    <packaging>pom</packaging>
    <properties>
        <found-old.version>3.9.0</found-old.version>
        <found-same.version>4.0.0</found-same.version>
    </properties>
    <dependencyManagement>
        <dependencies>
            <dependency>
                <groupId>${project.groupId}</groupId>
                <artifactId>found-x</artifactId>
                <version>${project.version}</version>
            </dependency>
            <dependency>
                <groupId>io.found</groupId>
                <artifactId>found-y</artifactId>
                <version>4.0.0</version>
            </dependency>
            <dependency>
                <groupId>io.found</groupId>
                <artifactId>found-z</artifactId>
                <version>${found-same.version}</version>
            </dependency>
            <dependency>
                <groupId>io.found</groupId>
                <artifactId>found-old</artifactId>
                <version>${found-old.version}</version>
            </dependency>
        </dependencies>
    </dependencyManagement>
</project>
"#;

    #[test]
    fn bom_catalog_filters_by_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pom.xml");
        std::fs::write(&path, BOM).unwrap();

        let artifacts = BomCatalog::new(&path).artifacts("4.0.0").unwrap();
        let names: Vec<&str> = artifacts.iter().map(Ga::artifact).collect();
        assert_eq!(names, vec!["found-x", "found-y", "found-z"]);
        assert!(artifacts.iter().all(|ga| ga.group() == "io.found"));
    }

    #[test]
    fn bom_catalog_missing_file() {
        let err = BomCatalog::new("/nonexistent/pom.xml")
            .artifacts("1.0")
            .unwrap_err();
        assert!(matches!(err, PlanError::Io { .. }));
    }

    #[test]
    fn guide_replaced_once() {
        let yaml = "name: \"Ext A\"\nmetadata:\n  guide: \"https://old/a\"\n  other-guide: \"x\"\n";
        let updated = replace_guide(yaml, "https://new/a").unwrap();
        assert_eq!(
            updated,
            "name: \"Ext A\"\nmetadata:\n  guide: \"https://new/a\"\n  other-guide: \"x\"\n"
        );
        assert_eq!(replace_guide(&updated, "https://new/a"), None);
        assert_eq!(replace_guide("name: x\n", "https://new/a"), None);
    }

    #[test]
    fn extra_transitive_entries_are_joined() {
        let request = TransitiveRequest {
            work_root: PathBuf::from("/w"),
            productized_file: PathBuf::from("/w/p.txt"),
            all_file: PathBuf::from("/w/a.txt"),
            non_productized_file: PathBuf::from("/w/n.txt"),
            product_version: "1.0.0".to_string(),
            community_version: None,
            foundation_version: Some("4.0.0".to_string()),
            extra_transitive_map: BTreeMap::from([
                ("ext-b".to_string(), vec!["g:x".to_string()]),
                ("ext-a".to_string(), vec!["g:y".to_string(), "g:z".to_string()]),
            ]),
        };
        assert_eq!(request.extra_transitive_entries(), "ext-a=g:y,g:z;ext-b=g:x");
    }

    #[test]
    fn command_analyzer_needs_a_program() {
        assert!(CommandAnalyzer::from_command(&[]).is_none());
        let analyzer =
            CommandAnalyzer::from_command(&["deps".to_string(), "--all".to_string()]).unwrap();
        assert_eq!(analyzer.display(), "deps --all");
    }
}
