//! Integration test categories.
//!
//! A test starts in the category implied by its location and can only move
//! towards higher priority (lower ordinal). `PureProduct` is the highest.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How "mixed" the dependency closure of an integration test is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TestCategory {
    /// Covers only productized extensions, all dependencies productized
    PureProduct,
    /// Covers productized extensions, explicitly allowed to depend on community artifacts
    MixedAllowed,
    /// Covers a mixture of productized and community artifacts, JVM only
    MixedJvm,
    /// Covers a mixture of productized and community artifacts, native
    MixedNative,
}

/// Attempted move of a test to a lower-priority category
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Cannot upgrade test category from {from:?} to {to:?}")]
pub struct CategoryRegression {
    pub from: TestCategory,
    pub to: TestCategory,
}

impl TestCategory {
    /// All categories in ordinal order
    pub const ALL: [TestCategory; 4] = [
        TestCategory::PureProduct,
        TestCategory::MixedAllowed,
        TestCategory::MixedJvm,
        TestCategory::MixedNative,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn human_name(self) -> &'static str {
        match self {
            TestCategory::PureProduct => "Product",
            TestCategory::MixedAllowed => "Mixed Allowed",
            TestCategory::MixedJvm => "Mixed JVM",
            TestCategory::MixedNative => "Mixed Native",
        }
    }

    /// Directory-friendly key, e.g. `mixed-allowed`
    pub fn key(self) -> String {
        self.human_name().to_lowercase().replace(' ', "-")
    }

    pub fn is_mixed(self) -> bool {
        match self {
            TestCategory::PureProduct => false,
            TestCategory::MixedAllowed | TestCategory::MixedJvm | TestCategory::MixedNative => {
                true
            }
        }
    }

    pub fn is_native(self) -> bool {
        match self {
            TestCategory::PureProduct | TestCategory::MixedAllowed | TestCategory::MixedNative => {
                true
            }
            TestCategory::MixedJvm => false,
        }
    }

    /// Move a test from `previous` to `self`.
    ///
    /// Allowed when there is no previous category or `self` has equal or
    /// higher priority than `previous`.
    pub fn upgrade_from(
        self,
        previous: Option<TestCategory>,
    ) -> Result<TestCategory, CategoryRegression> {
        match previous {
            Some(from) if self.ordinal() > from.ordinal() => {
                Err(CategoryRegression { from, to: self })
            }
            _ => Ok(self),
        }
    }

    /// Initial category of a test module from the relative path of its descriptor
    pub fn initial_for_path(descriptor_path: &str) -> Option<TestCategory> {
        if descriptor_path.starts_with("jvm-tests/") {
            Some(TestCategory::MixedJvm)
        } else if descriptor_path.starts_with("tests/") || descriptor_path.starts_with("test-groups/")
        {
            Some(TestCategory::MixedNative)
        } else {
            None
        }
    }
}

impl std::fmt::Display for TestCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.human_name())
    }
}
