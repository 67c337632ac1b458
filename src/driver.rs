//! Top-level sequencing of a benchmark run.
//!
//! Variants run strictly one after another, each in its own suite with its own
//! context. A variant that fails stops only itself; the next one starts from
//! scratch. Two things end the whole run instead: a row contract violation
//! (a harness defect) and the deadline, after which every variant not yet
//! finished is reported as aborted.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::capability::Backend;
use crate::config::VariantConfig;
use crate::error::{BenchError, Result};
use crate::suite::{BenchmarkSuite, Phase, PhaseFailure, SuiteReport};

/// How one variant ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VariantStatus {
    Completed,
    /// Every phase ran but at least one decrypted value was wrong.
    VerificationFailed,
    Failed(Phase),
    /// Stopped by the run deadline before entering the phase.
    Aborted(Phase),
}

impl fmt::Display for VariantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::VerificationFailed => f.write_str("verification failed"),
            Self::Failed(phase) => write!(f, "failed in {phase}"),
            Self::Aborted(phase) => write!(f, "aborted before {phase}"),
        }
    }
}

#[derive(Debug)]
pub struct VariantOutcome {
    pub name: String,
    pub report: SuiteReport,
}

impl VariantOutcome {
    #[must_use]
    pub fn status(&self) -> VariantStatus {
        match &self.report.failure {
            Some(PhaseFailure {
                phase,
                error: BenchError::DeadlineExceeded { .. },
            }) => VariantStatus::Aborted(*phase),
            Some(failure) => VariantStatus::Failed(failure.phase),
            None if self.report.verified() => VariantStatus::Completed,
            None => VariantStatus::VerificationFailed,
        }
    }

    /// Failed while setting up the context or its keys.
    #[must_use]
    pub fn failed_setup(&self) -> bool {
        matches!(
            self.status(),
            VariantStatus::Failed(Phase::Configure | Phase::KeyGen)
        )
    }
}

/// Outcome of a whole run.
#[derive(Debug)]
pub struct RunReport {
    pub variants: Vec<VariantOutcome>,
    pub elapsed: Duration,
}

impl RunReport {
    /// True when every variant walked all of its phases.
    ///
    /// Verification failures do not count against completion.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.variants
            .iter()
            .all(|v| v.report.phases.last() == Some(&Phase::Done))
    }

    /// Process exit status: 0 when the run completed, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::from(!self.completed())
    }

    /// Logs one line per variant plus a totals line.
    pub fn log_summary(&self) {
        for outcome in &self.variants {
            let status = outcome.status();
            let phases = outcome
                .report
                .phases
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(">");
            match status {
                VariantStatus::Completed => info!(
                    variant = %outcome.name,
                    %status,
                    files = outcome.report.files.len(),
                    "variant summary"
                ),
                _ => warn!(
                    variant = %outcome.name,
                    %status,
                    phases,
                    error = outcome.report.failure.as_ref().map(|f| f.error.to_string()),
                    "variant summary"
                ),
            }
        }
        let failed_setup = self.variants.iter().filter(|v| v.failed_setup()).count();
        info!(
            variants = self.variants.len(),
            completed = self.variants.iter().filter(|v| v.status() == VariantStatus::Completed).count(),
            failed_setup,
            elapsed_s = format!("{:.2}", self.elapsed.as_secs_f64()),
            "run finished"
        );
    }
}

/// Runs variants against one backend.
pub struct Driver<'b, B: Backend> {
    backend: &'b B,
    results_root: PathBuf,
    deadline: Option<Duration>,
}

impl<'b, B: Backend> Driver<'b, B> {
    pub fn new(backend: &'b B, results_root: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            results_root: results_root.into(),
            deadline: None,
        }
    }

    /// Wall-clock budget measured from the start of [`Driver::run`].
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Runs every variant in order.
    ///
    /// # Errors
    ///
    /// `Io` when the results root cannot be created, and the offending error
    /// when a variant breaks a table's row contract. Every other failure is
    /// recorded in the variant's outcome.
    pub fn run(&self, variants: &[VariantConfig]) -> Result<RunReport> {
        let started = Instant::now();
        let deadline = self.deadline.map(|budget| started + budget);
        fs::create_dir_all(&self.results_root).map_err(|e| BenchError::io(&self.results_root, e))?;
        info!(
            backend = self.backend.name(),
            root = %self.results_root.display(),
            variants = variants.len(),
            "starting run"
        );

        let mut outcomes = Vec::with_capacity(variants.len());
        let mut expired = false;
        for variant in variants {
            if expired {
                outcomes.push(VariantOutcome {
                    name: variant.name.clone(),
                    report: aborted(variant),
                });
                continue;
            }

            info!(variant = %variant.name, profile = %variant.profile, "starting variant");
            let mut suite = BenchmarkSuite::new(
                self.backend,
                variant.profile.clone(),
                variant.settings(),
                &self.results_root,
            )
            .with_deadline(deadline);
            if variant.label {
                suite = suite.with_label(&variant.name);
            }
            let report = suite.run();

            match report.failure {
                Some(PhaseFailure { error, .. }) if error.is_contract_violation() => {
                    error!(variant = %variant.name, %error, "row contract violated, stopping run");
                    return Err(error);
                }
                Some(PhaseFailure {
                    error: BenchError::DeadlineExceeded { .. },
                    ..
                }) => expired = true,
                _ => {}
            }
            outcomes.push(VariantOutcome {
                name: variant.name.clone(),
                report,
            });
        }

        Ok(RunReport {
            variants: outcomes,
            elapsed: started.elapsed(),
        })
    }
}

fn aborted(variant: &VariantConfig) -> SuiteReport {
    SuiteReport {
        profile: variant.profile.clone(),
        phases: Vec::new(),
        failure: Some(PhaseFailure {
            phase: Phase::Configure,
            error: BenchError::DeadlineExceeded {
                phase: Phase::Configure,
            },
        }),
        verification: None,
        files: Vec::new(),
    }
}
