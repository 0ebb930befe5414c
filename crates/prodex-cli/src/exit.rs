//! Process exit codes
//!
//! | Exit Code | Meaning |
//! |-----------|---------|
//! | 0 | Success (also a skipped run, or CHECK diffs under `warn`/`ignore`) |
//! | 1 | Fatal invariant, I/O or configuration error |
//! | 2 | CHECK found differences under `fail` |
//! | 3 | Productized extensions without a covering test |
//! | 4 | Foundation artifacts missing from the catalog |

use prodex_engine::{ErrorKind, PlanError};
use std::process;

/// Exit codes for CLI runs; stable API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    Failure = 1,
    CheckDiff = 2,
    UncoveredExtensions = 3,
    MissingFoundationArtifacts = 4,
}

impl ExitCode {
    /// Exit code for a failed run; errors not raised by the engine are failures
    pub fn from_error(error: &anyhow::Error) -> Self {
        match error.downcast_ref::<PlanError>().map(PlanError::kind) {
            Some(ErrorKind::CheckDiff) => ExitCode::CheckDiff,
            Some(ErrorKind::UncoveredExtension) => ExitCode::UncoveredExtensions,
            Some(ErrorKind::MissingFoundationArtifact) => ExitCode::MissingFoundationArtifacts,
            _ => ExitCode::Failure,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Get the numeric value
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn codes_agree_with_the_engine() {
        let errors = [
            PlanError::CheckDiff {
                files: 1,
                report: String::new(),
            },
            PlanError::UncoveredExtensions {
                count: 1,
                report: String::new(),
            },
            PlanError::MissingFoundationArtifacts {
                version: "4.0.0".into(),
                artifacts: vec![],
            },
            PlanError::Config("bad".into()),
        ];
        for error in errors {
            let expected = i32::from(error.exit_code());
            let code = ExitCode::from_error(&anyhow::Error::new(error));
            assert_eq!(code.code(), expected);
        }
    }

    #[test]
    fn context_does_not_hide_the_kind() {
        let error = anyhow::Error::new(PlanError::CheckDiff {
            files: 2,
            report: String::new(),
        })
        .context("prodex check failed");
        assert_eq!(ExitCode::from_error(&error), ExitCode::CheckDiff);
    }

    #[test]
    fn foreign_errors_are_failures() {
        let error = anyhow::anyhow!("could not read prodex.toml");
        assert_eq!(ExitCode::from_error(&error), ExitCode::Failure);
        assert!(!ExitCode::from_error(&error).is_success());
        assert!(ExitCode::Success.is_success());
    }
}
