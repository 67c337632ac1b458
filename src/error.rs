//! Error taxonomy shared by every layer of the harness.

use std::path::PathBuf;

use crate::profile::SchemeKind;
use crate::suite::Phase;

/// Everything that can stop a case, a suite, or the whole run.
///
/// Decryption mismatches are not errors: they are reported through
/// [`crate::verify::VerificationReport`].
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// The capability layer rejected the profile.
    #[error("unsupported parameters for {scheme}: {reason}")]
    UnsupportedParameter { scheme: SchemeKind, reason: String },

    /// The operation is outside the scheme's capability set.
    #[error("{operation} is not available for {scheme}")]
    UnsupportedOperation {
        scheme: SchemeKind,
        operation: &'static str,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A row named a column the header does not declare.
    #[error("column `{column}` is not declared in the header of {}", path.display())]
    Schema { path: PathBuf, column: String },

    /// A row left declared columns without a value.
    #[error("row for {} is missing values for {missing:?}", path.display())]
    IncompleteRow { path: PathBuf, missing: Vec<String> },

    #[error("invalid result path component `{component}`")]
    InvalidPathComponent { component: String },

    /// A key or ciphertext was handed to a context that did not create it.
    #[error("handle from context {found} used with context {expected}")]
    ContextMismatch { expected: u64, found: u64 },

    #[error("noise budget exhausted: {level} levels consumed with depth {depth}")]
    NoiseBudgetExhausted { level: u32, depth: u32 },

    #[error("capability layer failure: {0}")]
    Capability(String),

    #[error("run deadline exceeded before {phase}")]
    DeadlineExceeded { phase: Phase },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BenchError {
    /// Row construction defects. These are never tolerated by the driver.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::Schema { .. } | Self::IncompleteRow { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = BenchError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_violations_are_flagged() {
        let schema = BenchError::Schema {
            path: "a.csv".into(),
            column: "x".into(),
        };
        let incomplete = BenchError::IncompleteRow {
            path: "a.csv".into(),
            missing: vec!["y".into()],
        };
        let unsupported = BenchError::UnsupportedParameter {
            scheme: SchemeKind::Bfv,
            reason: "depth".into(),
        };
        assert!(schema.is_contract_violation());
        assert!(incomplete.is_contract_violation());
        assert!(!unsupported.is_contract_violation());
    }

    #[test]
    fn messages_name_the_offender() {
        let err = BenchError::IncompleteRow {
            path: "out/KeyGen.csv".into(),
            missing: vec!["keygen_us".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("out/KeyGen.csv"));
        assert!(msg.contains("keygen_us"));
    }
}
