//! Test categorization and extension coverage.

use crate::config::PlannerConfig;
use crate::discovery::{discover_tests, TestModule};
use crate::error::{PlanError, Result};
use crate::plan::Plan;
use crate::planner::artifact_id_base;
use prodex_core::{Ga, TestCategory};
use prodex_tree::ProjectGraph;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// Extensions whose base artifactId starts with this are not checked for coverage
const ANCILLARY_PREFIX: &str = "support-";

pub struct TestAnalyzer<'a> {
    config: &'a PlannerConfig,
}

impl<'a> TestAnalyzer<'a> {
    pub fn new(config: &'a PlannerConfig) -> Self {
        Self { config }
    }

    /// Discover tests below `work_root`, categorize them and record uncovered
    /// extensions in `plan`.
    ///
    /// Also computes `plan.expanded_includes_with_tests`. Uncovered extensions
    /// are not an error here; the caller decides when to fail.
    pub fn analyze(
        &self,
        graph: &ProjectGraph,
        work_root: &Path,
        plan: &mut Plan,
    ) -> Result<BTreeMap<Ga, TestModule>> {
        let tests = discover_tests(graph, work_root, &self.config.test_globs, &plan.exclude_tests)?;

        let mut categories: BTreeMap<Ga, TestCategory> = BTreeMap::new();
        for test in tests.values() {
            let category = TestCategory::initial_for_path(&test.path).ok_or_else(|| {
                PlanError::GraphInvariant(format!(
                    "Could not assign a category to test {}",
                    test.path
                ))
            })?;
            categories.insert(test.ga.clone(), category);
        }

        let mut uncovered: BTreeMap<Ga, BTreeMap<Ga, BTreeSet<Ga>>> = BTreeMap::new();
        info!("Test coverage:");
        for extension in self.productized_extensions(graph, plan) {
            let allowed = plan.allowed_mixed_tests.get(&extension);
            let mut covered = false;
            let mut pending: BTreeMap<Ga, BTreeSet<Ga>> = BTreeMap::new();

            for test in tests.values().filter(|t| t.extensions.contains(&extension)) {
                if test.extensions.is_subset(&plan.expanded_includes) {
                    upgrade(&mut categories, &test.ga, TestCategory::PureProduct)?;
                    covered = true;
                    info!(" - {} is covered by {}", extension.artifact(), test.ga.artifact());
                } else if allowed.is_some_and(|tests| tests.contains(&test.ga)) {
                    upgrade(&mut categories, &test.ga, TestCategory::MixedAllowed)?;
                    covered = true;
                    info!(
                        " - {} is covered by an explicitly allowed mixed test {}",
                        extension.artifact(),
                        test.ga.artifact()
                    );
                } else if !covered {
                    let missing: BTreeSet<Ga> = test
                        .extensions
                        .difference(&plan.expanded_includes)
                        .cloned()
                        .collect();
                    if self.is_named_after(&test.ga, &extension) {
                        warn!(
                            " - {} cannot be covered by {} because of missing dependencies: {}",
                            extension.artifact(),
                            test.ga.artifact(),
                            missing.iter().map(Ga::artifact).collect::<Vec<_>>().join(", ")
                        );
                    }
                    pending.insert(test.ga.clone(), missing);
                }
            }

            if !covered {
                uncovered.insert(extension, pending);
            }
        }

        plan.test_categories = categories;
        plan.uncovered_extensions = uncovered;

        let mut seed = plan.expanded_includes.clone();
        seed.extend(plan.product_tests());
        plan.expanded_includes_with_tests = graph.required_modules(&seed)?;

        for category in TestCategory::ALL {
            let count = plan.test_categories.values().filter(|c| **c == category).count();
            debug!("{}: {} test(s)", category, count);
        }
        Ok(tests)
    }

    /// Extension runtimes of the product group within the closure, ancillary ones excluded
    fn productized_extensions(&self, graph: &ProjectGraph, plan: &Plan) -> Vec<Ga> {
        graph
            .extensions()
            .into_iter()
            .filter(|ga| ga.group() == plan.product_group && plan.expanded_includes.contains(ga))
            .filter(|ga| {
                !artifact_id_base(&self.config.artifact_id_prefix, ga.artifact())
                    .starts_with(ANCILLARY_PREFIX)
            })
            .collect()
    }

    fn is_named_after(&self, test: &Ga, extension: &Ga) -> bool {
        let prefix = &self.config.artifact_id_prefix;
        artifact_id_base(prefix, test.artifact()).contains(artifact_id_base(prefix, extension.artifact()))
    }
}

fn upgrade(categories: &mut BTreeMap<Ga, TestCategory>, test: &Ga, to: TestCategory) -> Result<()> {
    let next = to
        .upgrade_from(categories.get(test).copied())
        .map_err(|source| PlanError::CategoryRegression {
            test: test.to_string(),
            source,
        })?;
    categories.insert(test.clone(), next);
    Ok(())
}
