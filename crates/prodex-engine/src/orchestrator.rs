//! Running the pipeline in APPLY or CHECK mode.

use crate::companions::CompanionUpdater;
use crate::config::PlannerConfig;
use crate::coverage::TestAnalyzer;
use crate::error::{PlanError, Result};
use crate::partition::TestPartitioner;
use crate::plan::Plan;
use crate::planner::ProductPlanner;
use crate::pruner::TreePruner;
use crate::reports::{
    BomCatalog, CommandAnalyzer, FoundationCatalog, ReportWriter, TransitiveDependencyAnalyzer,
};
use crate::shadow::{format_report, FileDiff, ShadowTree};
use crate::versions::VersionRewriter;
use prodex_core::{ActiveProfiles, OnCheckFailure, ProductManifest, COMMENT_MARK};
use prodex_tree::{relink_modules, ProjectGraph};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Edit the source tree in place
    Apply,
    /// Compute the tree in a scratch copy and compare
    Check,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Apply => write!(f, "apply"),
            Mode::Check => write!(f, "check"),
        }
    }
}

/// Pipeline stage reached by a run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Loaded,
    Planned,
    Rewritten,
    Analyzed,
    Pruned,
    Partitioned,
    Reported,
    /// CHECK mode compared the trees
    Verified,
    /// APPLY mode left its edits in the source tree
    Committed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Result of a run that did not fail
#[derive(Debug)]
pub struct RunOutcome {
    pub mode: Mode,
    /// `None` when the run was skipped
    pub plan: Option<Plan>,
    /// Differences found in CHECK mode, empty in APPLY mode
    pub diffs: Vec<FileDiff>,
    pub state: RunState,
}

impl RunOutcome {
    pub fn is_skipped(&self) -> bool {
        self.plan.is_none()
    }
}

struct Run {
    state: RunState,
}

impl Run {
    fn advance(&mut self, next: RunState) {
        info!("{} -> {}", self.state, next);
        self.state = next;
    }
}

pub struct Orchestrator {
    config: PlannerConfig,
    catalog: Option<Box<dyn FoundationCatalog>>,
    analyzer: Option<Box<dyn TransitiveDependencyAnalyzer>>,
}

impl Orchestrator {
    /// Collaborators are taken from `config`: a [`BomCatalog`] for
    /// `foundation_catalog` and a [`CommandAnalyzer`] for `transitive_deps_command`
    pub fn new(config: PlannerConfig) -> Self {
        let catalog = config
            .foundation_catalog
            .as_ref()
            .map(|path| Box::new(BomCatalog::new(config.resolve(path))) as Box<dyn FoundationCatalog>);
        let analyzer = config
            .transitive_deps_command
            .as_deref()
            .and_then(CommandAnalyzer::from_command)
            .map(|analyzer| Box::new(analyzer) as Box<dyn TransitiveDependencyAnalyzer>);
        Self {
            config,
            catalog,
            analyzer,
        }
    }

    pub fn with_catalog(mut self, catalog: impl FoundationCatalog + 'static) -> Self {
        self.catalog = Some(Box::new(catalog));
        self
    }

    pub fn with_analyzer(mut self, analyzer: impl TransitiveDependencyAnalyzer + 'static) -> Self {
        self.analyzer = Some(Box::new(analyzer));
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn run(&self, mode: Mode) -> Result<RunOutcome> {
        if self.config.skip {
            info!("Skipping productization ({})", mode);
            return Ok(RunOutcome {
                mode,
                plan: None,
                diffs: Vec::new(),
                state: RunState::Loaded,
            });
        }
        self.config.validate()?;
        let manifest = ProductManifest::load(&self.config.manifest_path())?;

        let mut run = Run {
            state: RunState::Loaded,
        };
        match self.run_mode(mode, &manifest, &mut run) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                run.advance(RunState::Failed);
                Err(e)
            }
        }
    }

    fn run_mode(&self, mode: Mode, manifest: &ProductManifest, run: &mut Run) -> Result<RunOutcome> {
        let (plan, diffs) = match mode {
            Mode::Apply => {
                let plan = self.execute(&self.config.basedir, manifest, run)?;
                run.advance(RunState::Committed);
                (plan, Vec::new())
            }
            Mode::Check => {
                let shadow = ShadowTree::stage(&self.config.basedir, &self.config.auxiliary_globs())?;
                let plan = self.execute(shadow.root(), manifest, run)?;
                let diffs = shadow.diff()?;
                run.advance(RunState::Verified);
                self.on_diffs(&diffs)?;
                (plan, diffs)
            }
        };

        if !plan.missing_foundation_artifacts.is_empty() {
            return Err(PlanError::MissingFoundationArtifacts {
                version: plan.foundation_version.clone().unwrap_or_default(),
                artifacts: plan
                    .missing_foundation_artifacts
                    .iter()
                    .map(|ga| ga.artifact().to_string())
                    .collect(),
            });
        }
        if !plan.uncovered_extensions.is_empty() {
            return Err(PlanError::UncoveredExtensions {
                count: plan.uncovered_extensions.len(),
                report: plan.uncovered_report(),
            });
        }

        Ok(RunOutcome {
            mode,
            plan: Some(plan),
            diffs,
            state: run.state,
        })
    }

    /// Run every stage against the tree at `work_root`
    fn execute(&self, work_root: &Path, manifest: &ProductManifest, run: &mut Run) -> Result<Plan> {
        let config = &self.config;
        let profiles = || ActiveProfiles::of(config.active_profiles.iter().cloned());
        let partitioner = TestPartitioner::new(config);
        let companions = CompanionUpdater::new(config);

        partitioner.reset(work_root)?;
        companions.clear_catalog(work_root)?;
        let relinked = relink_modules(work_root, COMMENT_MARK, config.element_whitespace)?;
        debug!("Re-enabled {} module reference(s)", relinked.len());

        let graph = ProjectGraph::load(work_root, profiles())?;
        let mut plan = ProductPlanner::new(config, manifest).plan(&graph)?;
        run.advance(RunState::Planned);

        VersionRewriter::new(config, &plan).rewrite(&graph)?;
        let graph = ProjectGraph::load(work_root, profiles())?;
        run.advance(RunState::Rewritten);

        TestAnalyzer::new(config).analyze(&graph, work_root, &mut plan)?;
        run.advance(RunState::Analyzed);

        TreePruner::new(config).prune(work_root, &plan)?;
        companions.update_catalog(work_root, &plan)?;
        run.advance(RunState::Pruned);

        partitioner.partition(&graph, work_root, &mut plan)?;
        companions.update_superapp(&graph, work_root, &plan)?;
        run.advance(RunState::Partitioned);

        ReportWriter::new(config)
            .with_catalog(self.catalog.as_deref())
            .with_analyzer(self.analyzer.as_deref())
            .write(&graph, work_root, &mut plan)?;
        companions.update_test_list(&graph, work_root, &plan)?;
        run.advance(RunState::Reported);

        info!(
            "{} productized module(s), {} test group(s)",
            plan.expanded_includes_with_tests.len(),
            plan.groups.len()
        );
        Ok(plan)
    }

    fn on_diffs(&self, diffs: &[FileDiff]) -> Result<()> {
        if diffs.is_empty() {
            info!("The source tree is up to date");
            return Ok(());
        }
        match self.config.on_check_failure {
            OnCheckFailure::Fail => Err(PlanError::CheckDiff {
                files: diffs.len(),
                report: format_report(diffs),
            }),
            OnCheckFailure::Warn => {
                for diff in diffs {
                    warn!("{} {}", diff.change, diff.path);
                    for line in &diff.lines {
                        warn!("    {}", line);
                    }
                }
                Ok(())
            }
            OnCheckFailure::Ignore => {
                debug!("Ignoring {} differing file(s)", diffs.len());
                Ok(())
            }
        }
    }
}
