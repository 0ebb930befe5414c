//! # prodex-engine
//!
//! Productization planning for a multi-module source tree.
//!
//! This crate provides:
//! - [`ProductPlanner`]: includes, documentation pages and test policies from the manifest
//! - [`VersionRewriter`]: version alignment and the product/community edition split
//! - [`TestAnalyzer`]: test discovery, categorization and coverage
//! - [`TreePruner`]: disabling modules the product does not need
//! - [`TestPartitioner`]: CI test groups and their aggregators
//! - [`CompanionUpdater`]: the extension catalog, the superapp and the test list
//! - [`ReportWriter`]: artifact lists, foundation checks and guide links
//! - [`Orchestrator`]: the whole pipeline in APPLY or CHECK mode
//!
//! ## Example
//!
//! ```rust,no_run
//! use prodex_engine::{Mode, Orchestrator, PlannerConfig};
//!
//! let config = PlannerConfig::new("/path/to/source-tree");
//! let outcome = Orchestrator::new(config).run(Mode::Check)?;
//! if let Some(plan) = &outcome.plan {
//!     println!("{} test group(s)", plan.groups.len());
//! }
//! # Ok::<(), prodex_engine::PlanError>(())
//! ```

pub mod companions;
pub mod config;
pub mod coverage;
pub mod discovery;
pub mod error;
pub mod orchestrator;
pub mod partition;
pub mod plan;
pub mod planner;
pub mod pruner;
pub mod reports;
pub mod shadow;
pub mod versions;

pub use companions::CompanionUpdater;
pub use config::{PlannerConfig, TestGlob};
pub use coverage::TestAnalyzer;
pub use discovery::TestModule;
pub use error::{ErrorKind, PlanError, Result};
pub use orchestrator::{Mode, Orchestrator, RunOutcome, RunState};
pub use partition::TestPartitioner;
pub use plan::{Plan, TestGroup};
pub use planner::ProductPlanner;
pub use pruner::TreePruner;
pub use reports::{
    BomCatalog, CommandAnalyzer, FoundationCatalog, ReportWriter, TransitiveDependencyAnalyzer,
    TransitiveRequest,
};
pub use shadow::{Change, FileDiff, ShadowTree};
pub use versions::{RewriteSummary, VersionRewriter};
