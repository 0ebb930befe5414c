//! Splitting tests into CI groups and generating their aggregators.
//!
//! Group layout is always regenerated from scratch: [`TestPartitioner::reset`]
//! runs before the tree is loaded and removes everything a previous run
//! generated below the product module.

use crate::config::{resolve_in, PlannerConfig, STAGES_END, STAGES_START};
use crate::error::{PlanError, Result};
use crate::plan::{Plan, TestGroup};
use prodex_core::template::expand;
use prodex_core::{relative_unix, Ga, Module, TestCategory, ROOT_DESCRIPTOR};
use prodex_tree::{DescriptorEditor, ProjectGraph};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

const DESCRIPTOR_TEMPLATE: &str = include_str!("../resources/descriptor-template.xml");
const STAGE_TEMPLATE: &str = include_str!("../resources/ci-stage-template.txt");

/// Profile linking the groups of mixed categories
const MIXED_PROFILE: &str = "mixed";

/// Largest native group size for `native_tests` spread over `available_nodes`.
///
/// One node is kept for the rest of the build.
pub fn max_tests_per_group(native_tests: usize, available_nodes: usize) -> usize {
    native_tests / available_nodes.saturating_sub(1).max(1) + 1
}

/// Split sorted `paths` into `group_count` runs whose sizes differ by at most one,
/// the larger ones first
pub fn split_evenly(paths: &[String], group_count: usize) -> Vec<Vec<String>> {
    let group_count = group_count.max(1);
    let min_size = paths.len() / group_count;
    let rest = paths.len() % group_count;
    let mut remaining = paths.iter();
    (0..group_count)
        .map(|i| {
            let size = min_size + usize::from(i < rest);
            remaining.by_ref().take(size).cloned().collect()
        })
        .collect()
}

/// Replace the text between the stage markers of `content` with `stages`.
///
/// The start marker line and the end marker with its indentation are kept.
/// Returns `None` when the markers are missing.
pub fn replace_stages(content: &str, stages: &str) -> Option<String> {
    static STAGES: OnceLock<Option<Regex>> = OnceLock::new();
    let re = STAGES
        .get_or_init(|| {
            Regex::new(&format!(
                r"(?s)({}\n)(.*)({})",
                regex::escape(STAGES_START),
                regex::escape(STAGES_END)
            ))
            .ok()
        })
        .as_ref()?;
    let captures = re.captures(content)?;
    let start = captures.get(1)?;
    let old = captures.get(2)?;
    let end = captures.get(3)?;

    let last_line = old.as_str().rsplit('\n').next().unwrap_or_default();
    let indent = if last_line.chars().all(|c| c == ' ' || c == '\t') {
        last_line
    } else {
        ""
    };
    Some(format!(
        "{}{}{}{}",
        &content[..start.end()],
        stages,
        indent,
        &content[end.start()..]
    ))
}

pub struct TestPartitioner<'a> {
    config: &'a PlannerConfig,
}

impl<'a> TestPartitioner<'a> {
    pub fn new(config: &'a PlannerConfig) -> Self {
        Self { config }
    }

    /// Empty the product aggregator's module lists and delete generated test directories
    pub fn reset(&self, work_root: &Path) -> Result<()> {
        let product_dir = self.config.product_dir(work_root);
        let descriptor = product_dir.join(ROOT_DESCRIPTOR);
        if descriptor.is_file() {
            DescriptorEditor::edit(&descriptor, self.config.element_whitespace, |e| {
                e.remove_all_modules(None)?;
                e.remove_all_modules(Some(MIXED_PROFILE))
            })?;
        }
        if !product_dir.is_dir() {
            return Ok(());
        }
        let entries = std::fs::read_dir(&product_dir).map_err(|e| PlanError::io(&product_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| PlanError::io(&product_dir, e))?;
            let generated = entry.file_name().to_string_lossy().starts_with("tests-");
            if generated && entry.path().is_dir() {
                debug!("Removing {}", entry.path().display());
                std::fs::remove_dir_all(entry.path()).map_err(|e| PlanError::io(entry.path(), e))?;
            }
        }
        Ok(())
    }

    /// Group the categorized tests of `graph`; paths are relative to a group directory
    pub fn group_tests(
        &self,
        graph: &ProjectGraph,
        categories: &BTreeMap<Ga, TestCategory>,
    ) -> Result<Vec<TestGroup>> {
        let native = categories.values().filter(|c| c.is_native()).count();
        let max_per_group = max_tests_per_group(native, self.config.available_nodes);

        let mut groups = Vec::new();
        for category in TestCategory::ALL {
            let group_dir = TestGroup::new(category, 0).directory(&self.config.product_module);
            let mut paths = BTreeSet::new();
            for (ga, _) in categories.iter().filter(|(_, c)| **c == category) {
                let module = graph.module(ga).ok_or_else(|| {
                    PlanError::GraphInvariant(format!("Test {} is not a module of the tree", ga))
                })?;
                paths.insert(relative_unix(&group_dir, module.dir()));
            }
            if paths.is_empty() {
                continue;
            }
            let paths: Vec<String> = paths.into_iter().collect();
            let limit = if category.is_native() {
                max_per_group
            } else {
                paths.len()
            };
            let group_count = paths.len().div_ceil(limit).max(1);
            for (index, tests) in split_evenly(&paths, group_count).into_iter().enumerate() {
                groups.push(TestGroup {
                    category,
                    index,
                    tests,
                });
            }
        }
        Ok(groups)
    }

    /// Group the tests of `plan`, write their aggregators and the CI stages
    pub fn partition(&self, graph: &ProjectGraph, work_root: &Path, plan: &mut Plan) -> Result<()> {
        let groups = self.group_tests(graph, &plan.test_categories)?;
        if !groups.is_empty() {
            self.write_descriptors(graph, work_root, &groups)?;
        }
        self.update_ci_file(work_root, &groups)?;
        info!(
            "Partitioned {} test(s) into {} group(s)",
            plan.test_categories.len(),
            groups.len()
        );
        plan.groups = groups;
        Ok(())
    }

    fn write_descriptors(&self, graph: &ProjectGraph, work_root: &Path, groups: &[TestGroup]) -> Result<()> {
        let style = self.config.element_whitespace;
        let (product, version) = product_module(graph, self.config)?;
        let product_path = product.path.clone();
        let group_id = product.ga.group();

        let mut by_category: BTreeMap<TestCategory, Vec<&TestGroup>> = BTreeMap::new();
        for group in groups {
            by_category.entry(group.category).or_default().push(group);
        }

        for (category, category_groups) in by_category {
            let directory = TestGroup::category_directory(category, &self.config.product_module);
            let category_dir = work_root.join(&directory);
            let category_artifact = format!("{}-tests-{}", product.ga.artifact(), category.key());
            let category_name = format!("Tests :: {}", category.human_name());
            write_descriptor(
                &category_dir.join(ROOT_DESCRIPTOR),
                &[
                    ("groupId", group_id),
                    ("parentArtifactId", product.ga.artifact()),
                    ("version", version.as_str()),
                    ("parentPath", "../pom.xml"),
                    ("artifactId", category_artifact.as_str()),
                    ("name", category_name.as_str()),
                ],
            )?;

            let profile = category.is_mixed().then_some(MIXED_PROFILE);
            let names: Vec<String> = category_groups.iter().map(|g| g.directory_name()).collect();
            DescriptorEditor::edit(&category_dir.join(ROOT_DESCRIPTOR), style, |e| {
                e.add_modules(profile, &names)
            })?;

            for group in category_groups {
                let group_descriptor = category_dir.join(group.directory_name()).join(ROOT_DESCRIPTOR);
                let group_artifact = format!("{}-{}", category_artifact, group.directory_name());
                let group_name = format!("Tests :: {}", group.stage_name());
                write_descriptor(
                    &group_descriptor,
                    &[
                        ("groupId", group_id),
                        ("parentArtifactId", category_artifact.as_str()),
                        ("version", version.as_str()),
                        ("parentPath", "../pom.xml"),
                        ("artifactId", group_artifact.as_str()),
                        ("name", group_name.as_str()),
                    ],
                )?;
                DescriptorEditor::edit(&group_descriptor, style, |e| e.add_modules(None, &group.tests))?;
            }

            let module = format!("tests-{}", category.key());
            DescriptorEditor::edit(&work_root.join(&product_path), style, |e| {
                e.add_module_if_missing(None, &module)
            })?;
        }
        Ok(())
    }

    fn update_ci_file(&self, work_root: &Path, groups: &[TestGroup]) -> Result<()> {
        let ci_file = resolve_in(work_root, &self.config.ci_file);
        if !ci_file.is_file() {
            warn!("CI file {} does not exist, skipping stage generation", ci_file.display());
            return Ok(());
        }
        let template = match &self.config.ci_stage_template {
            Some(path) => {
                let path = self.config.resolve(path);
                std::fs::read_to_string(&path).map_err(|e| PlanError::io(&path, e))?
            }
            None => STAGE_TEMPLATE.to_string(),
        };
        let stages: String = groups
            .iter()
            .map(|group| {
                let directory = group.directory(&self.config.product_module);
                let stage_name = group.stage_name();
                expand(
                    &template,
                    &[
                        ("groupDirectory", directory.as_str()),
                        ("stageName", stage_name.as_str()),
                    ],
                )
            })
            .collect();

        let content = std::fs::read_to_string(&ci_file).map_err(|e| PlanError::io(&ci_file, e))?;
        let updated = replace_stages(&content, &stages).ok_or_else(|| {
            PlanError::Config(format!(
                "{} lacks the {} / {} markers",
                ci_file.display(),
                STAGES_START,
                STAGES_END
            ))
        })?;
        if updated != content {
            std::fs::write(&ci_file, updated).map_err(|e| PlanError::io(&ci_file, e))?;
            debug!("Updated {}", ci_file.display());
        }
        Ok(())
    }
}

/// The product aggregator of `graph` with its evaluated version
pub(crate) fn product_module<'g>(
    graph: &'g ProjectGraph,
    config: &PlannerConfig,
) -> Result<(&'g Module, String)> {
    let product_path = format!("{}/{}", config.product_module, ROOT_DESCRIPTOR);
    let product = graph.module_by_path(&product_path).ok_or_else(|| {
        PlanError::GraphInvariant(format!(
            "Product module {} is not part of the tree",
            product_path
        ))
    })?;
    let expression = product.version_expression().ok_or_else(|| {
        PlanError::GraphInvariant(format!("Product module {} declares no version", product_path))
    })?;
    let version = graph.evaluate(expression, product)?;
    Ok((product, version))
}

/// Write a fresh aggregator descriptor from the built-in template
pub(crate) fn write_descriptor(path: &Path, values: &[(&str, &str)]) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| PlanError::io(dir, e))?;
    }
    std::fs::write(path, expand(DESCRIPTOR_TEMPLATE, values)).map_err(|e| PlanError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn paths(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("../../../tests/it-{:02}", i)).collect()
    }

    #[test]
    fn ten_native_tests_on_four_nodes() {
        let max = max_tests_per_group(10, 4);
        assert_eq!(max, 4);
        let count = 10usize.div_ceil(max);
        let groups = split_evenly(&paths(10), count);
        let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_eq!(groups[0][0], "../../../tests/it-00");
        assert_eq!(groups[1][0], "../../../tests/it-04");
        assert_eq!(groups[2][2], "../../../tests/it-09");
    }

    #[test]
    fn split_never_loses_tests() {
        for n in 0..25 {
            for count in 1..6 {
                let groups = split_evenly(&paths(n), count);
                assert_eq!(groups.len(), count);
                assert_eq!(groups.iter().map(Vec::len).sum::<usize>(), n);
                let max = groups.iter().map(Vec::len).max().unwrap_or(0);
                let min = groups.iter().map(Vec::len).min().unwrap_or(0);
                assert!(max - min <= 1);
            }
        }
    }

    #[test]
    fn stages_between_markers() {
        let content = "pipeline {\n    stages {\n        // %generated-stages-start%\n        stage('old') {}\n        // %generated-stages-end%\n    }\n}\n";
        let updated = replace_stages(content, "        stage('a') {}\n        stage('b') {}\n").unwrap();
        assert_eq!(
            updated,
            "pipeline {\n    stages {\n        // %generated-stages-start%\n        stage('a') {}\n        stage('b') {}\n        // %generated-stages-end%\n    }\n}\n"
        );
        assert_eq!(replace_stages(&updated, "        stage('a') {}\n        stage('b') {}\n").unwrap(), updated);
    }

    #[test]
    fn empty_stages_keep_markers() {
        let content = "// %generated-stages-start%\nstage('old')\n  // %generated-stages-end%\n";
        assert_eq!(
            replace_stages(content, "").unwrap(),
            "// %generated-stages-start%\n  // %generated-stages-end%\n"
        );
    }

    #[test]
    fn missing_markers() {
        assert_eq!(replace_stages("pipeline {}", "x"), None);
        assert_eq!(
            replace_stages("// %generated-stages-start%\nno end", "x"),
            None
        );
    }

    #[test]
    fn descriptor_template_placeholders() {
        let out = expand(
            DESCRIPTOR_TEMPLATE,
            &[
                ("groupId", "io.acme"),
                ("parentArtifactId", "acme-product"),
                ("version", "1.0.0"),
                ("parentPath", "../pom.xml"),
                ("artifactId", "acme-product-tests-product"),
                ("name", "Tests :: Product"),
            ],
        );
        assert!(!out.contains("${"));
        assert!(out.contains("<artifactId>acme-product-tests-product</artifactId>"));
        assert!(out.contains("<relativePath>../pom.xml</relativePath>"));
    }
}
