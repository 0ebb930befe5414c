//! Turning the product manifest into the set of included modules.

use crate::config::PlannerConfig;
use crate::error::{PlanError, Result};
use crate::plan::Plan;
use prodex_core::template::expand;
use prodex_core::{Expression, Ga, ManifestError, Module, ProductManifest};
use prodex_tree::{ProjectGraph, TreeError};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// `artifact` without the configured common prefix
pub(crate) fn artifact_id_base<'a>(prefix: &str, artifact: &'a str) -> &'a str {
    artifact.strip_prefix(prefix).unwrap_or(artifact)
}

/// Computes includes, documentation pages and test policies from the manifest
pub struct ProductPlanner<'a> {
    config: &'a PlannerConfig,
    manifest: &'a ProductManifest,
}

impl<'a> ProductPlanner<'a> {
    pub fn new(config: &'a PlannerConfig, manifest: &'a ProductManifest) -> Self {
        Self { config, manifest }
    }

    pub fn plan(&self, graph: &ProjectGraph) -> Result<Plan> {
        let root = graph.root()?;
        let mut plan = Plan {
            product_group: self.product_group(root),
            foundation_group: self.foundation_group(graph, root)?,
            product_version: self.product_version(graph, root)?,
            foundation_version: match &self.config.foundation_version {
                Some(version) => Some(version.clone()),
                None => optional_property(graph, root, "foundation.version")?,
            },
            community_version: match &self.config.community_version {
                Some(version) => Some(version.clone()),
                None => optional_property(graph, root, "community.version")?,
            },
            version_transformations: self.manifest.version_transformations.clone(),
            ..Default::default()
        };
        let major_version = plan
            .product_version
            .split('.')
            .next()
            .unwrap_or_default()
            .to_string();

        for (artifact, entry) in &self.manifest.extensions {
            let runtime = Ga::new(plan.product_group.clone(), artifact.clone());
            let deployment = runtime.deployment();
            for ga in [&runtime, &deployment] {
                if !graph.contains(ga) {
                    return Err(ManifestError::Shape {
                        field: format!("extensions.{}", artifact),
                        message: format!("no module {} in the source tree", ga),
                    }
                    .into());
                }
            }
            if entry.has_product_documentation_page() {
                plan.doc_pages.insert(
                    runtime.clone(),
                    self.guide_url(&self.manifest.guide_url_template, artifact, &major_version),
                );
            }
            if !entry.allowed_mixed_tests.is_empty() {
                plan.allowed_mixed_tests.insert(
                    runtime.clone(),
                    entry
                        .allowed_mixed_tests
                        .iter()
                        .map(|test| Ga::new(plan.product_group.clone(), test.clone()))
                        .collect(),
                );
            }
            plan.required_extensions.insert(runtime.clone());
            plan.includes.insert(runtime);
            plan.includes.insert(deployment);
        }

        for (i, artifact) in self.manifest.additional_productized_artifacts.iter().enumerate() {
            let ga = Ga::new(plan.product_group.clone(), artifact.clone());
            if !graph.contains(&ga) {
                return Err(ManifestError::Shape {
                    field: format!("additionalProductizedArtifacts[{}]", i),
                    message: format!("no module {} in the source tree", ga),
                }
                .into());
            }
            plan.includes.insert(ga);
        }
        plan.exclude_tests = self
            .manifest
            .exclude_tests
            .iter()
            .map(|test| Ga::new(plan.product_group.clone(), test.clone()))
            .collect();

        self.community_doc_pages(graph, &mut plan, &major_version);

        plan.expanded_includes = graph.required_modules(&plan.includes)?;
        info!(
            "{} extension(s) requested, {} module(s) required",
            plan.required_extensions.len(),
            plan.expanded_includes.len()
        );
        for ga in &plan.expanded_includes {
            debug!(" - {}", ga.artifact());
        }
        Ok(plan)
    }

    fn product_group(&self, root: &Module) -> String {
        self.config
            .product_group
            .clone()
            .unwrap_or_else(|| root.ga.group().to_string())
    }

    fn foundation_group(&self, graph: &ProjectGraph, root: &Module) -> Result<String> {
        if let Some(group) = &self.config.foundation_group {
            return Ok(group.clone());
        }
        match &root.parent {
            Some(parent) => Ok(graph.evaluate(&parent.group, root)?),
            None => Err(PlanError::Config(
                "foundationGroup is not set and the root module has no parent".to_string(),
            )),
        }
    }

    fn product_version(&self, graph: &ProjectGraph, root: &Module) -> Result<String> {
        if let Some(version) = &self.config.product_version {
            return Ok(version.clone());
        }
        let expression = root.version_expression().ok_or_else(|| {
            PlanError::GraphInvariant(format!("root module {} declares no version", root.ga))
        })?;
        Ok(graph.evaluate(expression, root)?)
    }

    fn guide_url(&self, template: &str, artifact: &str, major_version: &str) -> String {
        expand(
            template,
            &[
                (
                    "artifactIdBase",
                    artifact_id_base(&self.config.artifact_id_prefix, artifact),
                ),
                ("majorVersion", major_version),
            ],
        )
    }

    /// Guide links of the extensions the product does not document itself
    fn community_doc_pages(&self, graph: &ProjectGraph, plan: &mut Plan, major_version: &str) {
        let reference_dir = self.config.resolve(&self.config.docs_reference_dir);
        let extensions: BTreeSet<Ga> = graph
            .extensions()
            .into_iter()
            .filter(|ga| ga.group() == plan.product_group && !plan.doc_pages.contains_key(ga))
            .collect();
        for ga in extensions {
            let base = artifact_id_base(&self.config.artifact_id_prefix, ga.artifact());
            let url = if reference_dir.join(format!("{}.adoc", base)).is_file() {
                self.guide_url(
                    &self.config.community_guide_url_template,
                    ga.artifact(),
                    major_version,
                )
            } else {
                self.config.default_community_guide_url.clone()
            };
            plan.doc_pages.insert(ga, url);
        }
    }
}

/// Value of `${name}` in the scope of `module`, `None` when it is not defined
fn optional_property(graph: &ProjectGraph, module: &Module, name: &str) -> Result<Option<String>> {
    match graph.evaluate(&Expression::new(format!("${{{}}}", name)), module) {
        Ok(value) => Ok(Some(value)),
        Err(TreeError::UnresolvedExpression { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_strips_prefix_only_at_start() {
        assert_eq!(artifact_id_base("acme-", "acme-ext-a"), "ext-a");
        assert_eq!(artifact_id_base("acme-", "ext-acme-a"), "ext-acme-a");
        assert_eq!(artifact_id_base("", "ext-a"), "ext-a");
    }
}
