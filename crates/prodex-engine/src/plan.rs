//! The plan derived once per run and filled in stage by stage.

use prodex_core::{Ga, TestCategory};
use std::collections::{BTreeMap, BTreeSet};

/// One CI worker's share of the tests of a category
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestGroup {
    pub category: TestCategory,
    /// Zero-based position within the category
    pub index: usize,
    /// Test module directories relative to the group directory, sorted
    pub tests: Vec<String>,
}

impl TestGroup {
    pub fn new(category: TestCategory, index: usize) -> Self {
        Self {
            category,
            index,
            tests: Vec::new(),
        }
    }

    /// One-based, two-digit index, e.g. `01`
    pub fn human_index(&self) -> String {
        format!("{:02}", self.index + 1)
    }

    /// Name of the group directory, e.g. `group-01`
    pub fn directory_name(&self) -> String {
        format!("group-{}", self.human_index())
    }

    /// Directory of the category aggregator relative to the tree root
    pub fn category_directory(category: TestCategory, product_module: &str) -> String {
        format!("{}/tests-{}", product_module, category.key())
    }

    /// Directory of this group relative to the tree root
    pub fn directory(&self, product_module: &str) -> String {
        format!(
            "{}/{}",
            Self::category_directory(self.category, product_module),
            self.directory_name()
        )
    }

    /// CI stage name, e.g. `Mixed Native :: Group 02`
    pub fn stage_name(&self) -> String {
        format!("{} :: Group {}", self.category.human_name(), self.human_index())
    }
}

/// Everything computed about the product for one run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    pub product_group: String,
    pub foundation_group: String,
    pub product_version: String,
    pub foundation_version: Option<String>,
    pub community_version: Option<String>,

    /// Runtime coordinates of the extensions listed in the manifest
    pub required_extensions: BTreeSet<Ga>,
    /// Extensions, their deployment modules and additional artifacts
    pub includes: BTreeSet<Ga>,
    /// Guide URL per extension runtime coordinate
    pub doc_pages: BTreeMap<Ga, String>,
    pub allowed_mixed_tests: BTreeMap<Ga, BTreeSet<Ga>>,
    pub exclude_tests: BTreeSet<Ga>,
    pub version_transformations: BTreeMap<String, String>,

    /// Closure of `includes`, tests not considered
    pub expanded_includes: BTreeSet<Ga>,
    pub test_categories: BTreeMap<Ga, TestCategory>,
    /// Extension to candidate test to the test's non-productized dependencies
    pub uncovered_extensions: BTreeMap<Ga, BTreeMap<Ga, BTreeSet<Ga>>>,
    /// Closure of `expanded_includes` and the pure product tests
    pub expanded_includes_with_tests: BTreeSet<Ga>,

    pub groups: Vec<TestGroup>,
    pub required_foundation_artifacts: BTreeSet<Ga>,
    pub missing_foundation_artifacts: BTreeSet<Ga>,
}

impl Plan {
    /// Tests whose category is not mixed
    pub fn product_tests(&self) -> BTreeSet<Ga> {
        self.test_categories
            .iter()
            .filter(|(_, category)| !category.is_mixed())
            .map(|(ga, _)| ga.clone())
            .collect()
    }

    /// Human readable report of `uncovered_extensions`
    pub fn uncovered_report(&self) -> String {
        let mut out = String::from("Unable to find tests for extensions:\n");
        for (extension, candidates) in &self.uncovered_extensions {
            out.push_str(&format!(" - Extension {}:\n", extension.artifact()));
            if candidates.is_empty() {
                out.push_str("   - no test found\n");
            }
            for (test, missing) in candidates {
                out.push_str(&format!(
                    "   - Test {} has unsatisfied dependencies:\n",
                    test.artifact()
                ));
                for dependency in missing {
                    out.push_str(&format!("     - {}\n", dependency.artifact()));
                }
            }
        }
        out.push_str(
            "\nAdd tests covering these extensions or list a mixed test under \
             allowedMixedTests of the extension in the product manifest.",
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn group_naming() {
        let group = TestGroup::new(TestCategory::MixedNative, 1);
        assert_eq!(group.human_index(), "02");
        assert_eq!(group.directory("product"), "product/tests-mixed-native/group-02");
        assert_eq!(group.stage_name(), "Mixed Native :: Group 02");
    }

    #[test]
    fn uncovered_report_lists_candidates() {
        let mut plan = Plan::default();
        let ext_a = Ga::new("io.acme", "ext-a");
        let ext_c = Ga::new("io.acme", "ext-c");
        plan.uncovered_extensions.insert(
            ext_a,
            BTreeMap::from([(
                Ga::new("io.acme", "it-ext-a"),
                BTreeSet::from([Ga::new("io.acme", "ext-b")]),
            )]),
        );
        plan.uncovered_extensions.insert(ext_c, BTreeMap::new());

        let report = plan.uncovered_report();
        assert!(report.starts_with(
            "Unable to find tests for extensions:\n - Extension ext-a:\n   - Test it-ext-a has unsatisfied dependencies:\n     - ext-b\n - Extension ext-c:\n   - no test found\n"
        ));
        assert!(report.contains("allowedMixedTests"));
    }

    #[test]
    fn product_tests_are_the_unmixed_ones() {
        let mut plan = Plan::default();
        plan.test_categories
            .insert(Ga::new("g", "it-a"), TestCategory::PureProduct);
        plan.test_categories
            .insert(Ga::new("g", "it-b"), TestCategory::MixedAllowed);
        assert_eq!(plan.product_tests(), BTreeSet::from([Ga::new("g", "it-a")]));
    }
}
