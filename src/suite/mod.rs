//! Per-variant benchmark sequencing.
//!
//! A suite walks `Configure → KeyGen → EncryptDecrypt → HomomorphicOps →
//! Verify → Done` exactly once, in that order. Each case after Configure
//! writes its own table. The first error stops the walk; rows already written
//! stay on disk.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::capability::{Backend, DivideParams, Operation};
use crate::error::{BenchError, Result};
use crate::paths::{sanitize_label, ResultPath};
use crate::profile::{SchemeKind, SchemeProfile};
use crate::sink::ResultSink;
use crate::timing::TimingLog;
use crate::verify::{Tolerance, VerificationReport};

mod cases;
mod model;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Configure,
    KeyGen,
    EncryptDecrypt,
    HomomorphicOps,
    Verify,
    Done,
}

impl Phase {
    pub const ORDER: [Phase; 6] = [
        Self::Configure,
        Self::KeyGen,
        Self::EncryptDecrypt,
        Self::HomomorphicOps,
        Self::Verify,
        Self::Done,
    ];

    #[must_use]
    pub fn next(self) -> Option<Phase> {
        match self {
            Self::Configure => Some(Self::KeyGen),
            Self::KeyGen => Some(Self::EncryptDecrypt),
            Self::EncryptDecrypt => Some(Self::HomomorphicOps),
            Self::HomomorphicOps => Some(Self::Verify),
            Self::Verify => Some(Self::Done),
            Self::Done => None,
        }
    }

    /// Name of the result table the phase produces.
    #[must_use]
    pub fn case_name(self) -> Option<&'static str> {
        match self {
            Self::KeyGen => Some("KeyGen"),
            Self::EncryptDecrypt => Some("EncryptDecrypt"),
            Self::HomomorphicOps => Some("HomomorphicOps"),
            Self::Verify => Some("Verify"),
            Self::Configure | Self::Done => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configure => "Configure",
            Self::Done => "Done",
            other => other.case_name().unwrap_or_default(),
        };
        f.write_str(name)
    }
}

/// Knobs of one suite run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuiteSettings {
    /// Iterations of the EncryptDecrypt and HomomorphicOps cases.
    pub repetitions: usize,
    pub keygen_repetitions: usize,
    /// Time context creation together with key generation.
    pub fresh_context_per_keygen: bool,
    /// Slot counts benchmarked by EncryptDecrypt.
    pub payload_sizes: Vec<usize>,
    /// Slot count of the running HomomorphicOps state.
    pub ops_width: usize,
    /// Multiply a fresh encryption every iteration instead of the running product.
    pub reset_before_mult: bool,
    /// 0 multiplies with built-in relinearization and writes no `relin_us`
    /// column; `k` multiplies without it and relinearizes after every `k`th
    /// product.
    pub relin_interval: u32,
    /// CKKS reciprocal benchmark, off when `None`.
    pub divide: Option<DivideParams>,
    /// Absolute CKKS tolerance; derived from the scaling size when `None`.
    pub tolerance: Option<f64>,
}

impl SuiteSettings {
    /// Per-scheme defaults: repetitions, payload sizes and operand width.
    #[must_use]
    pub fn for_scheme(kind: SchemeKind) -> Self {
        match kind {
            SchemeKind::Bfv | SchemeKind::Bgv => Self {
                repetitions: 20,
                keygen_repetitions: 10,
                fresh_context_per_keygen: false,
                payload_sizes: vec![1, 5, 10],
                ops_width: 1,
                reset_before_mult: false,
                relin_interval: 1,
                divide: None,
                tolerance: None,
            },
            SchemeKind::Ckks => Self {
                repetitions: 10,
                keygen_repetitions: 10,
                fresh_context_per_keygen: false,
                payload_sizes: vec![1, 4, 8],
                ops_width: 8,
                reset_before_mult: true,
                relin_interval: 1,
                divide: None,
                tolerance: None,
            },
            SchemeKind::BooleanGate => Self {
                repetitions: 100,
                keygen_repetitions: 10,
                fresh_context_per_keygen: true,
                payload_sizes: vec![1],
                ops_width: 1,
                reset_before_mult: false,
                relin_interval: 0,
                divide: None,
                tolerance: None,
            },
        }
    }

    /// Checks the settings against the profile they will run with.
    ///
    /// # Errors
    ///
    /// `Config` for out-of-range values, `UnsupportedOperation` when division
    /// is requested for a scheme without it.
    pub fn validate(&self, profile: &SchemeProfile) -> Result<()> {
        let kind = profile.kind();
        if self.repetitions == 0 || self.keygen_repetitions == 0 {
            return Err(BenchError::Config("repetition counts must be positive".into()));
        }
        if self.payload_sizes.is_empty() {
            return Err(BenchError::Config("at least one payload size is required".into()));
        }
        let batch = profile.batch_size();
        if let Some(size) = self
            .payload_sizes
            .iter()
            .chain(std::iter::once(&self.ops_width))
            .find(|&&s| s == 0 || s > batch)
        {
            return Err(BenchError::Config(format!(
                "payload of {size} slots does not fit batch size {batch}"
            )));
        }
        if let Some(dup) = self.payload_sizes.iter().duplicates().next() {
            return Err(BenchError::Config(format!("payload size {dup} listed twice")));
        }
        if self.relin_interval > 0 && self.relin_interval >= profile.max_relin_sk_degree() {
            return Err(BenchError::Config(format!(
                "relinearizing every {} products needs relinearization keys above degree {}",
                self.relin_interval,
                profile.max_relin_sk_degree()
            )));
        }
        if let Some(divide) = &self.divide {
            if !kind.supports(Operation::EvalDivide) {
                return Err(crate::capability::unsupported(kind, Operation::EvalDivide));
            }
            divide.validate()?;
        }
        if let Some(eps) = self.tolerance {
            if !(eps.is_finite() && eps > 0.0) {
                return Err(BenchError::Config(format!("tolerance {eps} must be positive")));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn tolerance_for(&self, profile: &SchemeProfile) -> Tolerance {
        match (profile.kind(), self.tolerance) {
            (SchemeKind::Ckks, Some(eps)) => Tolerance::Absolute(eps),
            _ => Tolerance::for_profile(profile),
        }
    }
}

/// Where and why a suite stopped early.
#[derive(Debug)]
pub struct PhaseFailure {
    pub phase: Phase,
    pub error: BenchError,
}

/// Everything one suite run produced.
#[derive(Debug)]
pub struct SuiteReport {
    pub profile: SchemeProfile,
    /// Phases entered, in order.
    pub phases: Vec<Phase>,
    pub failure: Option<PhaseFailure>,
    pub verification: Option<VerificationReport>,
    pub files: Vec<PathBuf>,
}

impl SuiteReport {
    #[must_use]
    pub fn completed(&self) -> bool {
        self.failure.is_none() && self.phases.last() == Some(&Phase::Done)
    }

    #[must_use]
    pub fn verified(&self) -> bool {
        self.verification
            .as_ref()
            .is_some_and(VerificationReport::passed)
    }
}

/// Runs the benchmark cases of one scheme variant.
pub struct BenchmarkSuite<'b, B: Backend> {
    backend: &'b B,
    profile: SchemeProfile,
    settings: SuiteSettings,
    results_root: PathBuf,
    label: Option<String>,
    deadline: Option<Instant>,
    phase: Option<Phase>,
    history: Vec<Phase>,
}

impl<'b, B: Backend> BenchmarkSuite<'b, B> {
    pub fn new(
        backend: &'b B,
        profile: SchemeProfile,
        settings: SuiteSettings,
        results_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            backend,
            profile,
            settings,
            results_root: results_root.into(),
            label: None,
            deadline: None,
            phase: None,
            history: Vec::with_capacity(Phase::ORDER.len()),
        }
    }

    /// Appended to every file name of this variant.
    #[must_use]
    pub fn with_label(mut self, label: impl AsRef<str>) -> Self {
        let label = sanitize_label(label.as_ref());
        self.label = (!label.is_empty()).then_some(label);
        self
    }

    /// No phase is entered once `deadline` has passed.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    #[must_use]
    pub fn profile(&self) -> &SchemeProfile {
        &self.profile
    }

    /// Runs every phase and reports how far it got.
    pub fn run(mut self) -> SuiteReport {
        let mut report = SuiteReport {
            profile: self.profile.clone(),
            phases: Vec::new(),
            failure: None,
            verification: None,
            files: Vec::new(),
        };
        if let Err(error) = self.run_phases(&mut report) {
            let phase = match &error {
                BenchError::DeadlineExceeded { phase } => *phase,
                _ => self.phase.unwrap_or(Phase::Configure),
            };
            warn!(variant = %self.profile, %phase, %error, "suite aborted");
            report.failure = Some(PhaseFailure { phase, error });
        }
        report.phases = self.history;
        report
    }

    fn run_phases(&mut self, report: &mut SuiteReport) -> Result<()> {
        self.enter(Phase::Configure)?;
        let ctx = self.configure()?;

        self.enter(Phase::KeyGen)?;
        let keys = self.keygen_case(&ctx, report)?;

        self.enter(Phase::EncryptDecrypt)?;
        let round_trips = self.encrypt_decrypt_case(&ctx, &keys, report)?;

        self.enter(Phase::HomomorphicOps)?;
        let tracked = self.homomorphic_ops_case(&ctx, &keys, report)?;

        self.enter(Phase::Verify)?;
        let verification = self.verify_case(&ctx, &keys, round_trips, tracked, report)?;
        report.verification = Some(verification);

        self.enter(Phase::Done)
    }

    fn enter(&mut self, phase: Phase) -> Result<()> {
        let expected = self.phase.map_or(Some(Phase::Configure), Phase::next);
        debug_assert_eq!(Some(phase), expected, "phase transitions are strictly ordered");
        if phase != Phase::Done {
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    return Err(BenchError::DeadlineExceeded { phase });
                }
            }
        }
        self.phase = Some(phase);
        self.history.push(phase);
        info!(variant = %self.profile, %phase, "entering phase");
        Ok(())
    }

    fn result_path(&self, phase: Phase) -> Result<PathBuf> {
        let case = phase.case_name().unwrap_or_default();
        let mut suffix = self.profile.parameter_suffix();
        if let Some(label) = &self.label {
            suffix.push('_');
            suffix.push_str(label);
        }
        Ok(ResultPath::new(&self.results_root, self.profile.kind(), case, suffix)?.to_path_buf())
    }

    fn log_summary(&self, phase: Phase, log: &TimingLog) {
        for (operation, stats) in log.summary() {
            info!(
                variant = %self.profile,
                %phase,
                operation,
                count = stats.count,
                min_us = stats.min_us,
                median_us = stats.median_us,
                mean_us = format!("{:.1}", stats.mean_us),
                max_us = stats.max_us,
                "timing summary"
            );
        }
    }
}

/// Opens a table, runs `body` on it, and closes it whatever `body` returned.
fn with_sink<T>(
    path: &Path,
    columns: Vec<String>,
    body: impl FnOnce(&mut ResultSink) -> Result<T>,
) -> Result<T> {
    let mut sink = ResultSink::open(path, columns)?;
    let outcome = body(&mut sink);
    let closed = sink.close();
    let value = outcome?;
    closed?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::SimulatedBackend;
    use crate::profile::SecurityLevel;
    use std::time::Duration;

    #[test]
    fn phase_order_is_linear() {
        let mut walked = vec![Phase::Configure];
        while let Some(next) = walked.last().and_then(|p| p.next()) {
            walked.push(next);
        }
        assert_eq!(walked, Phase::ORDER);
        assert!(Phase::ORDER.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn settings_validation() {
        let profile = SchemeProfile::bfv(65537, 2);
        let mut settings = SuiteSettings::for_scheme(SchemeKind::Bfv);
        assert!(settings.validate(&profile).is_ok());

        settings.payload_sizes = vec![1, 32];
        assert!(settings.validate(&profile).is_err());
        settings.payload_sizes = vec![4, 4];
        assert!(settings.validate(&profile).is_err());

        let mut settings = SuiteSettings::for_scheme(SchemeKind::Bfv);
        settings.relin_interval = 2;
        assert!(settings.validate(&profile).is_err());
        assert!(settings
            .validate(&profile.clone().with_max_relin_sk_degree(3))
            .is_ok());

        let mut settings = SuiteSettings::for_scheme(SchemeKind::Bfv);
        settings.divide = Some(DivideParams {
            lower: 0.1,
            upper: 10.0,
            degree: 59,
        });
        assert!(matches!(
            settings.validate(&profile),
            Err(BenchError::UnsupportedOperation { .. })
        ));

        let mut settings = SuiteSettings::for_scheme(SchemeKind::Ckks);
        settings.repetitions = 0;
        assert!(settings.validate(&SchemeProfile::ckks(50, 1, 8)).is_err());
    }

    #[test]
    fn expired_deadline_stops_before_configure() {
        let dir = tempfile::tempdir().unwrap();
        let report = BenchmarkSuite::new(
            &SimulatedBackend,
            SchemeProfile::boolean(SecurityLevel::Classic128),
            SuiteSettings::for_scheme(SchemeKind::BooleanGate),
            dir.path(),
        )
        .with_deadline(Some(Instant::now().checked_sub(Duration::from_millis(1)).unwrap()))
        .run();
        let failure = report.failure.unwrap();
        assert_eq!(failure.phase, Phase::Configure);
        assert!(matches!(failure.error, BenchError::DeadlineExceeded { .. }));
        assert!(report.phases.is_empty());
    }

    #[test]
    fn labels_extend_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let suite = BenchmarkSuite::new(
            &SimulatedBackend,
            SchemeProfile::bfv(65537, 2),
            SuiteSettings::for_scheme(SchemeKind::Bfv),
            dir.path(),
        )
        .with_label("low depth");
        let path = suite.result_path(Phase::KeyGen).unwrap();
        assert!(path.ends_with("BFVResults/KeyGen_sec128_d2_t65537_low-depth.csv"));
    }
}
