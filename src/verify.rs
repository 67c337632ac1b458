//! Correctness checks on decrypted results.
//!
//! A failed check never aborts a run. It becomes a [`VerificationFailure`]
//! inside the [`VerificationReport`], which is written to its own table and
//! logged apart from the timing data.

use std::fmt;

use crate::capability::Plaintext;
use crate::profile::SchemeProfile;

/// Bits between the CKKS scaling factor and the precision the scheme promises.
pub const CKKS_PRECISION_LOSS_BITS: u32 = 20;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Tolerance {
    Exact,
    Absolute(f64),
}

impl Tolerance {
    /// Exact for integral and boolean schemes, `2^-(scale - 20)` for CKKS.
    #[must_use]
    pub fn for_profile(profile: &SchemeProfile) -> Self {
        match profile.scaling_mod_size() {
            Some(scale) => {
                let bits = scale.saturating_sub(CKKS_PRECISION_LOSS_BITS).max(1);
                Self::Absolute(2f64.powi(-i32::try_from(bits).unwrap_or(i32::MAX)))
            }
            None => Self::Exact,
        }
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => f.write_str("exact"),
            Self::Absolute(eps) => write!(f, "±{eps:e}"),
        }
    }
}

/// A decrypted value that did not match what the circuit should produce.
#[derive(Clone, Debug, PartialEq)]
pub struct VerificationFailure {
    pub check: String,
    pub reason: String,
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.check, self.reason)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Check {
    pub name: String,
    pub expected: Plaintext,
    pub actual: Option<Plaintext>,
    pub max_abs_error: Option<f64>,
    pub decrypt_us: Option<u64>,
    pub failure: Option<VerificationFailure>,
}

impl Check {
    /// Compares a successful decryption against `expected`.
    #[must_use]
    pub fn compare(
        name: impl Into<String>,
        expected: Plaintext,
        actual: Plaintext,
        tolerance: Tolerance,
        decrypt_us: Option<u64>,
    ) -> Self {
        let name = name.into();
        let (max_abs_error, reason) = match compare(&expected, &actual, tolerance) {
            Ok(err) => (Some(err), None),
            Err((err, reason)) => (err, Some(reason)),
        };
        Self {
            failure: reason.map(|reason| VerificationFailure {
                check: name.clone(),
                reason,
            }),
            name,
            expected,
            actual: Some(actual),
            max_abs_error,
            decrypt_us,
        }
    }

    /// Records a check whose ciphertext could not be decrypted at all.
    #[must_use]
    pub fn undecryptable(name: impl Into<String>, expected: Plaintext, reason: impl fmt::Display) -> Self {
        let name = name.into();
        Self {
            failure: Some(VerificationFailure {
                check: name.clone(),
                reason: format!("decryption failed: {reason}"),
            }),
            name,
            expected,
            actual: None,
            max_abs_error: None,
            decrypt_us: None,
        }
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

fn compare(
    expected: &Plaintext,
    actual: &Plaintext,
    tolerance: Tolerance,
) -> Result<f64, (Option<f64>, String)> {
    if expected.len() != actual.len() {
        return Err((
            None,
            format!("expected {} slots, got {}", expected.len(), actual.len()),
        ));
    }
    let err = match (expected, actual) {
        (Plaintext::Integers(e), Plaintext::Integers(a)) => e
            .iter()
            .zip(a)
            .map(|(x, y)| x.abs_diff(*y) as f64)
            .fold(0.0, f64::max),
        (Plaintext::Reals(e), Plaintext::Reals(a)) => e
            .iter()
            .zip(a)
            .map(|(x, y)| (x - y).abs())
            // NaN must win so a diverged slot cannot pass.
            .fold(0.0, |acc: f64, d| if d.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(d) }),
        (Plaintext::Bit(e), Plaintext::Bit(a)) => f64::from(u8::from(e != a)),
        _ => {
            return Err((
                None,
                format!("expected {} payload, got {}", expected.kind_name(), actual.kind_name()),
            ))
        }
    };
    let ok = match tolerance {
        Tolerance::Exact => err == 0.0,
        Tolerance::Absolute(eps) => err <= eps,
    };
    if ok {
        Ok(err)
    } else {
        Err((
            Some(err),
            format!("expected {expected}, got {actual} (max error {err:e}, tolerance {tolerance})"),
        ))
    }
}

/// Outcome of the Verify phase.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VerificationReport {
    checks: Vec<Check>,
}

impl VerificationReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, check: Check) {
        self.checks.push(check);
    }

    #[must_use]
    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.checks.iter().all(Check::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &VerificationFailure> {
        self.checks.iter().filter_map(|c| c.failure.as_ref())
    }

    #[must_use]
    pub fn check(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_must_match_exactly() {
        let ok = Check::compare(
            "add",
            Plaintext::Integers(vec![21]),
            Plaintext::Integers(vec![21]),
            Tolerance::Exact,
            Some(3),
        );
        assert!(ok.passed());
        assert_eq!(ok.max_abs_error, Some(0.0));

        let bad = Check::compare(
            "add",
            Plaintext::Integers(vec![21]),
            Plaintext::Integers(vec![20]),
            Tolerance::Exact,
            None,
        );
        assert!(!bad.passed());
        assert_eq!(bad.max_abs_error, Some(1.0));
        assert!(bad.failure.unwrap().reason.contains("expected [21]"));
    }

    #[test]
    fn reals_within_tolerance() {
        let expected = Plaintext::Reals(vec![10.0, 8.0]);
        let close = Plaintext::Reals(vec![10.000_01, 7.999_99]);
        assert!(Check::compare("x", expected.clone(), close.clone(), Tolerance::Absolute(1e-4), None).passed());
        assert!(!Check::compare("x", expected, close, Tolerance::Absolute(1e-6), None).passed());
    }

    #[test]
    fn nan_never_passes() {
        let c = Check::compare(
            "div",
            Plaintext::Reals(vec![0.5, 1.0]),
            Plaintext::Reals(vec![f64::NAN, 1.0]),
            Tolerance::Absolute(1.0),
            None,
        );
        assert!(!c.passed());
    }

    #[test]
    fn shape_and_kind_mismatches_fail() {
        let c = Check::compare(
            "x",
            Plaintext::Integers(vec![1, 2]),
            Plaintext::Integers(vec![1]),
            Tolerance::Exact,
            None,
        );
        assert!(!c.passed());
        let c = Check::compare("x", Plaintext::Bit(true), Plaintext::Integers(vec![1]), Tolerance::Exact, None);
        assert!(!c.passed());
    }

    #[test]
    fn report_collects_failures() {
        let mut report = VerificationReport::new();
        report.push(Check::compare("a", Plaintext::Bit(true), Plaintext::Bit(true), Tolerance::Exact, None));
        assert!(report.passed());
        report.push(Check::undecryptable("b", Plaintext::Bit(false), "noise"));
        assert!(!report.passed());
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].check, "b");
        assert!(report.check("a").unwrap().passed());
    }

    #[test]
    fn default_tolerances() {
        assert_eq!(Tolerance::for_profile(&SchemeProfile::bfv(65537, 1)), Tolerance::Exact);
        let Tolerance::Absolute(eps) = Tolerance::for_profile(&SchemeProfile::ckks(50, 1, 8)) else {
            panic!("ckks must be approximate");
        };
        assert!((eps - 2f64.powi(-30)).abs() < f64::EPSILON);
    }
}
