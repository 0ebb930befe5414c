//! Locating integration test modules on disk.

use crate::config::TestGlob;
use crate::error::{PlanError, Result};
use prodex_core::Ga;
use prodex_tree::ProjectGraph;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// A discovered test and the local extensions it depends on
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestModule {
    pub ga: Ga,
    /// Relative unix path of the descriptor
    pub path: String,
    /// Runtime coordinates of tree extensions in the test's dependency closure
    pub extensions: BTreeSet<Ga>,
}

/// Walk every glob directory below `work_root` and resolve matches to modules.
///
/// Tests in `exclude` are skipped. Missing glob directories are ignored.
pub fn discover_tests(
    graph: &ProjectGraph,
    work_root: &Path,
    globs: &[TestGlob],
    exclude: &BTreeSet<Ga>,
) -> Result<BTreeMap<Ga, TestModule>> {
    let mut tests: BTreeMap<Ga, TestModule> = BTreeMap::new();
    for glob in globs {
        let base = work_root.join(&glob.directory);
        if !base.is_dir() {
            debug!("Test directory {} does not exist", base.display());
            continue;
        }
        let includes = glob.include_set()?;
        let excludes = glob.exclude_set()?;

        for entry in WalkDir::new(&base).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                PlanError::io(
                    base.clone(),
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
                )
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(&base).unwrap_or(entry.path());
            if !includes.is_match(relative) || excludes.is_match(relative) {
                continue;
            }

            let path = format!(
                "{}/{}",
                glob.directory.trim_end_matches('/'),
                relative.to_string_lossy().replace('\\', "/")
            );
            let module = graph.module_by_path(&path).ok_or_else(|| {
                PlanError::GraphInvariant(format!("Could not find module for path {}", path))
            })?;
            if exclude.contains(&module.ga) {
                debug!("Excluding test {}", module.ga.artifact());
                continue;
            }

            let extensions: BTreeSet<Ga> = graph
                .transitive_dependencies(&module.ga)?
                .into_iter()
                .filter(|dependency| graph.contains(&dependency.deployment()))
                .collect();
            debug!(
                "Found test {} covering {:?}",
                module.ga.artifact(),
                extensions.iter().map(Ga::artifact).collect::<Vec<_>>()
            );
            match tests.get_mut(&module.ga) {
                Some(test) => test.extensions.extend(extensions),
                None => {
                    tests.insert(
                        module.ga.clone(),
                        TestModule {
                            ga: module.ga.clone(),
                            path,
                            extensions,
                        },
                    );
                }
            }
        }
    }
    Ok(tests)
}
