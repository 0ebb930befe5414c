//! Product vs. community editions and their version expressions.

use serde::{Deserialize, Serialize};

/// Edition of an artifact of the product group
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProjectEdition {
    Product,
    Community,
}

impl ProjectEdition {
    pub const ALL: [ProjectEdition; 2] = [ProjectEdition::Product, ProjectEdition::Community];

    /// Version expressions that already denote this edition
    pub fn accepted_expressions(self) -> &'static [&'static str] {
        match self {
            ProjectEdition::Product => &["${self.version}", "${product.version}"],
            ProjectEdition::Community => &["${community.version}"],
        }
    }

    /// The expression written when a managed version has to change
    pub fn preferred_expression(self) -> &'static str {
        match self {
            ProjectEdition::Product => "${product.version}",
            ProjectEdition::Community => "${community.version}",
        }
    }

    pub fn accepts(self, raw_expression: &str) -> bool {
        self.accepted_expressions().contains(&raw_expression)
    }

    pub fn for_inclusion(included: bool) -> Self {
        if included {
            ProjectEdition::Product
        } else {
            ProjectEdition::Community
        }
    }
}

/// Edition of an artifact of the foundation group
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FoundationEdition {
    Product,
    Community,
}

impl FoundationEdition {
    pub const ALL: [FoundationEdition; 2] =
        [FoundationEdition::Product, FoundationEdition::Community];

    pub fn version_expression(self) -> &'static str {
        match self {
            FoundationEdition::Product => "${foundation.version}",
            FoundationEdition::Community => "${foundation-community.version}",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_accepts_both_aliases() {
        assert!(ProjectEdition::Product.accepts("${self.version}"));
        assert!(ProjectEdition::Product.accepts("${product.version}"));
        assert!(!ProjectEdition::Product.accepts("${community.version}"));
        assert!(!ProjectEdition::Product.accepts("1.0.0"));
    }

    #[test]
    fn preferred_is_accepted() {
        for edition in ProjectEdition::ALL {
            assert!(edition.accepts(edition.preferred_expression()));
        }
    }

    #[test]
    fn edition_by_inclusion() {
        assert_eq!(ProjectEdition::for_inclusion(true), ProjectEdition::Product);
        assert_eq!(ProjectEdition::for_inclusion(false), ProjectEdition::Community);
    }

    #[test]
    fn foundation_expressions() {
        assert_eq!(
            FoundationEdition::Community.version_expression(),
            "${foundation-community.version}"
        );
        assert_eq!(
            FoundationEdition::Product.version_expression(),
            "${foundation.version}"
        );
    }
}
