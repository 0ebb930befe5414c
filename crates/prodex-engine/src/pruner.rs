//! Disabling the child references of modules the product does not need.

use crate::config::PlannerConfig;
use crate::error::Result;
use crate::plan::Plan;
use prodex_core::{ActiveProfiles, Ga, COMMENT_MARK, ROOT_DESCRIPTOR};
use prodex_tree::{DescriptorEditor, ProjectGraph};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

pub struct TreePruner<'a> {
    config: &'a PlannerConfig,
}

impl<'a> TreePruner<'a> {
    pub fn new(config: &'a PlannerConfig) -> Self {
        Self { config }
    }

    /// Comment out the test parents in the root descriptor, then every child
    /// reference to a module that is neither included nor an aggregator of an
    /// included module.
    ///
    /// Returns the disabled references as `<aggregator dir>/<module>`.
    pub fn prune(&self, work_root: &Path, plan: &Plan) -> Result<Vec<String>> {
        let style = self.config.element_whitespace;
        let test_parents: BTreeSet<String> = self.config.test_parents.iter().cloned().collect();
        let mut disabled = DescriptorEditor::edit(&work_root.join(ROOT_DESCRIPTOR), style, |e| {
            e.comment_modules(&test_parents, COMMENT_MARK)
        })?;

        let graph = ProjectGraph::load(
            work_root,
            ActiveProfiles::of(self.config.active_profiles.iter().cloned()),
        )?;
        let kept = self.kept_paths(&graph, plan);

        for aggregator in graph.modules_by_path().filter(|m| kept.contains(&m.path)) {
            let unlink: BTreeSet<String> = graph
                .child_modules(aggregator)
                .into_iter()
                .filter(|(_, child)| !kept.contains(&child.path))
                .map(|(name, _)| name.to_string())
                .collect();
            if unlink.is_empty() {
                continue;
            }
            let commented = DescriptorEditor::edit(&work_root.join(&aggregator.path), style, |e| {
                e.comment_modules(&unlink, COMMENT_MARK)
            })?;
            let dir = aggregator.dir();
            disabled.extend(commented.into_iter().map(|name| {
                if dir.is_empty() {
                    name
                } else {
                    format!("{}/{}", dir, name)
                }
            }));
        }

        info!("Disabled {} module reference(s)", disabled.len());
        for reference in &disabled {
            debug!(" - {}", reference);
        }
        Ok(disabled)
    }

    /// Descriptor paths that stay linked
    fn kept_paths(&self, graph: &ProjectGraph, plan: &Plan) -> BTreeSet<String> {
        let test_parent_paths: BTreeSet<String> = self
            .config
            .test_parents
            .iter()
            .map(|dir| format!("{}/{}", dir, ROOT_DESCRIPTOR))
            .collect();
        let product_path = format!("{}/{}", self.config.product_module, ROOT_DESCRIPTOR);

        let mut pending: Vec<String> = plan
            .expanded_includes_with_tests
            .iter()
            .filter(|ga: &&Ga| !plan.test_categories.contains_key(*ga))
            .filter_map(|ga| graph.module(ga))
            .map(|m| m.path.clone())
            .filter(|path| !test_parent_paths.contains(path))
            .collect();
        pending.push(ROOT_DESCRIPTOR.to_string());
        if graph.module_by_path(&product_path).is_some() {
            pending.push(product_path);
        }

        let mut kept = BTreeSet::new();
        while let Some(path) = pending.pop() {
            if !kept.insert(path.clone()) {
                continue;
            }
            if let Some(aggregator) = graph
                .module_by_path(&path)
                .and_then(|m| graph.aggregator_of(m))
            {
                pending.push(aggregator.path.clone());
            }
        }
        kept
    }
}
