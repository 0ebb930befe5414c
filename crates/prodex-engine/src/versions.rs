//! Version alignment and the product/community edition split of managed
//! dependencies.

use crate::config::PlannerConfig;
use crate::error::{PlanError, Result};
use crate::plan::Plan;
use prodex_core::{Expression, FoundationEdition, Module, ProjectEdition};
use prodex_tree::{DescriptorEditor, ProjectGraph, RawCoordinate};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

const PRODUCT_VERSION_PROPERTY: &str = "product.version";

/// Set-version edits of one profile, keyed by the new version expression
type VersionEdits = Vec<(String, BTreeSet<RawCoordinate>)>;

/// Counts of the edits a rewrite applied
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    pub parent_versions: usize,
    pub properties: usize,
    pub managed_versions: usize,
}

impl RewriteSummary {
    pub fn total(&self) -> usize {
        self.parent_versions + self.properties + self.managed_versions
    }
}

pub struct VersionRewriter<'a> {
    config: &'a PlannerConfig,
    plan: &'a Plan,
}

impl<'a> VersionRewriter<'a> {
    pub fn new(config: &'a PlannerConfig, plan: &'a Plan) -> Self {
        Self { config, plan }
    }

    /// Apply every rule to the descriptors of `graph`.
    ///
    /// The graph is stale afterwards; load a fresh one before further use.
    pub fn rewrite(&self, graph: &ProjectGraph) -> Result<RewriteSummary> {
        let mut summary = RewriteSummary::default();
        let root = graph.root()?;
        let root_version = match root.version_expression() {
            Some(expression) => graph.evaluate(expression, root)?,
            None => {
                return Err(PlanError::GraphInvariant(format!(
                    "root module {} declares no version",
                    root.ga
                )))
            }
        };

        self.align(graph, &root_version, &mut summary)?;
        summary.managed_versions += self.split_editions(graph)?;

        if !self.plan.version_transformations.is_empty() {
            let graph = reload(graph)?;
            let (properties, managed) = self.transform_versions(&graph)?;
            summary.properties += properties;
            summary.managed_versions += managed;
            if properties + managed > 0 {
                // a transformed foundation.version moves the root's parent
                self.align(&reload(&graph)?, &root_version, &mut summary)?;
            }
        }

        if summary.total() > 0 {
            info!(
                "Rewrote {} parent version(s), {} propert(ies), {} managed version(s)",
                summary.parent_versions, summary.properties, summary.managed_versions
            );
        }
        Ok(summary)
    }

    fn align(&self, graph: &ProjectGraph, root_version: &str, summary: &mut RewriteSummary) -> Result<()> {
        summary.parent_versions += self.align_parent_versions(graph, root_version)?;
        summary.properties += self.align_product_version_property(graph, root_version)?;
        summary.parent_versions += self.align_foundation_parent(graph, graph.root()?)?;
        Ok(())
    }

    /// Every module with an in-tree parent refers to the root version
    fn align_parent_versions(&self, graph: &ProjectGraph, root_version: &str) -> Result<usize> {
        let mut changed = 0;
        for module in graph.modules_by_path() {
            if module.is_root() || graph.parent_of(module).is_none() {
                continue;
            }
            let Some(parent) = &module.parent else {
                continue;
            };
            if parent.version.raw() != root_version {
                debug!(
                    "{}: parent version {} -> {}",
                    module.path, parent.version, root_version
                );
                if self.edit(graph, module, |e| e.set_parent_version(root_version))? {
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    /// A constant `product.version` property equals the root version
    fn align_product_version_property(&self, graph: &ProjectGraph, root_version: &str) -> Result<usize> {
        let mut changed = 0;
        for module in graph.modules_by_path() {
            let stale = module
                .default_profile()
                .properties
                .get(PRODUCT_VERSION_PROPERTY)
                .and_then(Expression::as_constant)
                .is_some_and(|value| value != root_version);
            if stale
                && self.edit(graph, module, |e| {
                    e.set_property(None, PRODUCT_VERSION_PROPERTY, root_version)
                })?
            {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// The root's parent version equals `${foundation.version}`
    fn align_foundation_parent(&self, graph: &ProjectGraph, root: &Module) -> Result<usize> {
        let Some(parent) = &root.parent else {
            debug!("Root module has no parent, skipping foundation alignment");
            return Ok(0);
        };
        let expected = match graph.evaluate(&Expression::new("${foundation.version}"), root) {
            Ok(version) => version,
            Err(prodex_tree::TreeError::UnresolvedExpression { .. }) => {
                debug!("foundation.version is not defined, skipping foundation alignment");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };
        if parent.version.raw() == expected {
            return Ok(0);
        }
        let changed = self.edit(graph, root, |e| e.set_parent_version(&expected))?;
        Ok(usize::from(changed))
    }

    /// Point managed dependencies at the edition matching their inclusion
    fn split_editions(&self, graph: &ProjectGraph) -> Result<usize> {
        let included = &self.plan.expanded_includes;
        let mut changed = 0;
        for module in graph.modules().filter(|m| included.contains(&m.ga)) {
            let mut per_profile: Vec<(Option<String>, VersionEdits)> = Vec::new();
            for profile in module.active_profiles(graph.active_profiles()) {
                if profile.managed_dependencies.is_empty() {
                    continue;
                }
                let mut edits: BTreeMap<&'static str, BTreeSet<RawCoordinate>> = BTreeMap::new();
                for dependency in &profile.managed_dependencies {
                    let ga = graph.dependency_ga(dependency, module)?;
                    let raw = dependency.raw_version();
                    let target = if ga.group() == self.plan.product_group {
                        let edition = ProjectEdition::for_inclusion(included.contains(&ga));
                        (!edition.accepts(raw)).then(|| edition.preferred_expression())
                    } else if ga.group() == self.plan.foundation_group {
                        let expression = FoundationEdition::Community.version_expression();
                        (raw != expression).then_some(expression)
                    } else {
                        None
                    };
                    if let Some(expression) = target {
                        edits.entry(expression).or_default().insert((
                            dependency.group.raw().to_string(),
                            dependency.artifact.raw().to_string(),
                        ));
                    }
                }
                let ordered: VersionEdits = edition_order()
                    .into_iter()
                    .filter_map(|expression| {
                        edits
                            .remove(expression)
                            .map(|coords| (expression.to_string(), coords))
                    })
                    .collect();
                if !ordered.is_empty() {
                    per_profile.push((profile.id.clone(), ordered));
                }
            }
            changed += self.apply_managed_edits(graph, module, &per_profile)?;
        }
        Ok(changed)
    }

    /// Replace constant versions listed in the manifest's transformations.
    ///
    /// `product.version` and managed dependencies of the product and
    /// foundation groups are left to the alignment and edition rules.
    fn transform_versions(&self, graph: &ProjectGraph) -> Result<(usize, usize)> {
        let transformations = &self.plan.version_transformations;
        let transform = |value: &str| transformations.get(value).filter(|to| *to != value);
        let mut properties = 0;
        let mut managed = 0;
        for module in graph
            .modules()
            .filter(|m| self.plan.expanded_includes.contains(&m.ga))
        {
            let mut property_edits: Vec<(Option<String>, String, String)> = Vec::new();
            let mut per_profile: Vec<(Option<String>, VersionEdits)> = Vec::new();
            for profile in module.active_profiles(graph.active_profiles()) {
                for (name, value) in &profile.properties {
                    if name == PRODUCT_VERSION_PROPERTY || !name.ends_with(".version") {
                        continue;
                    }
                    if let Some(to) = value.as_constant().and_then(transform) {
                        property_edits.push((profile.id.clone(), name.clone(), to.clone()));
                    }
                }
                let mut edits: BTreeMap<String, BTreeSet<RawCoordinate>> = BTreeMap::new();
                for dependency in &profile.managed_dependencies {
                    let ga = graph.dependency_ga(dependency, module)?;
                    if ga.group() == self.plan.product_group
                        || ga.group() == self.plan.foundation_group
                    {
                        continue;
                    }
                    let target = dependency
                        .version
                        .as_ref()
                        .and_then(Expression::as_constant)
                        .and_then(transform);
                    if let Some(to) = target {
                        edits.entry(to.clone()).or_default().insert((
                            dependency.group.raw().to_string(),
                            dependency.artifact.raw().to_string(),
                        ));
                    }
                }
                if !edits.is_empty() {
                    per_profile.push((profile.id.clone(), edits.into_iter().collect()));
                }
            }

            if !property_edits.is_empty() {
                properties += self.edit(graph, module, |editor| {
                    let mut count = 0;
                    for (profile, name, value) in &property_edits {
                        if editor.set_property(profile.as_deref(), name, value)? {
                            count += 1;
                        }
                    }
                    Ok(count)
                })?;
            }
            managed += self.apply_managed_edits(graph, module, &per_profile)?;
        }
        Ok((properties, managed))
    }

    fn apply_managed_edits(
        &self,
        graph: &ProjectGraph,
        module: &Module,
        per_profile: &[(Option<String>, VersionEdits)],
    ) -> Result<usize> {
        if per_profile.is_empty() {
            return Ok(0);
        }
        self.edit(graph, module, |editor| {
            let mut count = 0;
            for (profile, edits) in per_profile {
                for (version, coords) in edits {
                    debug!(
                        "{} [{}]: {} managed version(s) -> {}",
                        module.path,
                        profile.as_deref().unwrap_or("default"),
                        coords.len(),
                        version
                    );
                    count += editor.set_managed_dependency_version(
                        profile.as_deref(),
                        version,
                        coords,
                    )?;
                }
            }
            Ok(count)
        })
    }

    fn edit<T, F>(&self, graph: &ProjectGraph, module: &Module, f: F) -> Result<T>
    where
        F: FnOnce(&mut DescriptorEditor) -> prodex_tree::Result<T>,
    {
        let path = graph.root_dir().join(&module.path);
        Ok(DescriptorEditor::edit(
            &path,
            self.config.element_whitespace,
            f,
        )?)
    }
}

fn reload(graph: &ProjectGraph) -> Result<ProjectGraph> {
    Ok(ProjectGraph::load(
        graph.root_dir(),
        graph.active_profiles().clone(),
    )?)
}

/// Order in which grouped edits are applied within a profile
fn edition_order() -> Vec<&'static str> {
    ProjectEdition::ALL
        .iter()
        .map(|e| e.preferred_expression())
        .chain(FoundationEdition::ALL.iter().map(|e| e.version_expression()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn edits_follow_edition_order() {
        assert_eq!(
            edition_order(),
            vec![
                "${product.version}",
                "${community.version}",
                "${foundation.version}",
                "${foundation-community.version}",
            ]
        );
    }
}
