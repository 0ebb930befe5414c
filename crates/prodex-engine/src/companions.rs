//! Descriptors kept in step with the plan outside the module graph.
//!
//! - the extension catalog lists every required extension as a virtual dependency
//! - the superapp below the product aggregator depends on every required extension
//! - the test list plugin excludes the tests the manifest excludes
//!
//! The catalog and the test list are optional: a missing descriptor is skipped.

use crate::config::{resolve_in, PlannerConfig};
use crate::error::{PlanError, Result};
use crate::partition::{product_module, write_descriptor};
use crate::plan::Plan;
use prodex_core::{relative_unix, Dependency, Ga, ROOT_DESCRIPTOR};
use prodex_tree::{DescriptorEditor, ProjectGraph};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Container of the test list excludes below the plugin's `<configuration>`
const TEST_LIST_EXCLUDES: [&str; 3] = ["fileSets", "fileSet", "excludes"];

/// Test-scoped `pom` dependency on `ga` excluding `*:*`
pub fn virtual_dependency(ga: &Ga) -> Dependency {
    Dependency::new(ga.group(), ga.artifact())
        .dep_type("pom")
        .scope("test")
        .exclude("*:*")
        .classify()
}

pub struct CompanionUpdater<'a> {
    config: &'a PlannerConfig,
}

impl<'a> CompanionUpdater<'a> {
    pub fn new(config: &'a PlannerConfig) -> Self {
        Self { config }
    }

    /// Remove every virtual dependency of the catalog; runs before the tree is loaded
    pub fn clear_catalog(&self, work_root: &Path) -> Result<usize> {
        let Some(catalog) = self.existing(work_root, &self.config.catalog_descriptor) else {
            return Ok(0);
        };
        let removed = DescriptorEditor::edit(&catalog, self.config.element_whitespace, |e| {
            e.remove_dependencies(None, Dependency::is_virtual)
        })?;
        debug!("Removed {} virtual dependencies from {}", removed, catalog.display());
        Ok(removed)
    }

    /// Add one virtual dependency per required extension to the catalog
    pub fn update_catalog(&self, work_root: &Path, plan: &Plan) -> Result<usize> {
        let Some(catalog) = self.existing(work_root, &self.config.catalog_descriptor) else {
            return Ok(0);
        };
        let dependencies: Vec<Dependency> =
            plan.required_extensions.iter().map(virtual_dependency).collect();
        let added = DescriptorEditor::edit(&catalog, self.config.element_whitespace, |e| {
            e.add_dependencies(None, &dependencies)
        })?;
        info!("Catalog lists {} required extension(s)", dependencies.len());
        Ok(added)
    }

    /// Regenerate the superapp descriptor and link it from the product aggregator
    pub fn update_superapp(&self, graph: &ProjectGraph, work_root: &Path, plan: &Plan) -> Result<()> {
        let Some(module) = &self.config.superapp_module else {
            return Ok(());
        };
        let style = self.config.element_whitespace;
        let (product, version) = product_module(graph, self.config)?;
        let product_dir = work_root.join(product.dir());
        let descriptor = product_dir.join(module).join(ROOT_DESCRIPTOR);
        let artifact = format!("{}-{}", product.ga.artifact(), module);

        write_descriptor(
            &descriptor,
            &[
                ("groupId", product.ga.group()),
                ("parentArtifactId", product.ga.artifact()),
                ("version", version.as_str()),
                ("parentPath", "../pom.xml"),
                ("artifactId", artifact.as_str()),
                ("name", "Superapp"),
            ],
        )?;
        let dependencies: Vec<Dependency> = plan
            .required_extensions
            .iter()
            .map(|ga| Dependency::new(ga.group(), ga.artifact()))
            .collect();
        DescriptorEditor::edit(&descriptor, style, |e| e.add_dependencies(None, &dependencies))?;
        DescriptorEditor::edit(&product_dir.join(ROOT_DESCRIPTOR), style, |e| {
            e.add_module_if_missing(None, module)
        })?;
        debug!("Superapp {} depends on {} extension(s)", artifact, dependencies.len());
        Ok(())
    }

    /// Make the test list plugin exclude every excluded test.
    ///
    /// Excludes are descriptor paths relative to `integration_tests_dir`; only
    /// missing ones are appended, in sorted order. The plugin must be declared
    /// once the descriptor exists.
    pub fn update_test_list(&self, graph: &ProjectGraph, work_root: &Path, plan: &Plan) -> Result<usize> {
        let Some(test_list) = self.existing(work_root, &self.config.test_list_descriptor) else {
            return Ok(0);
        };
        let base = self
            .config
            .integration_tests_dir
            .to_string_lossy()
            .replace('\\', "/");
        let mut excludes = BTreeSet::new();
        for ga in &plan.exclude_tests {
            let module = graph.module(ga).ok_or_else(|| {
                PlanError::GraphInvariant(format!("Excluded test {} is not a module of the tree", ga))
            })?;
            excludes.insert(relative_unix(&base, &module.path));
        }

        let plugin = self.config.test_list_coordinate()?;
        let added = DescriptorEditor::edit(&test_list, self.config.element_whitespace, |e| {
            e.add_plugin_configuration_values(
                &plugin,
                &TEST_LIST_EXCLUDES,
                "exclude",
                excludes.iter().map(String::as_str),
            )
        })?;
        if added > 0 {
            info!("Excluded {} test(s) in {}", added, test_list.display());
        }
        Ok(added)
    }

    fn existing(&self, work_root: &Path, path: &Path) -> Option<PathBuf> {
        let path = resolve_in(work_root, path);
        if path.is_file() {
            Some(path)
        } else {
            debug!("{} does not exist, skipping", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn virtual_dependency_is_classified() {
        let dependency = virtual_dependency(&Ga::new("io.acme", "ext-a"));
        assert!(dependency.is_virtual());
        assert_eq!(dependency.exclusions, vec!["*:*"]);
        assert_eq!(dependency.version, None);
    }

    #[test]
    fn missing_descriptors_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlannerConfig::new(dir.path());
        let updater = CompanionUpdater::new(&config);
        assert_eq!(updater.clear_catalog(dir.path()).unwrap(), 0);
        assert_eq!(updater.update_catalog(dir.path(), &Plan::default()).unwrap(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
