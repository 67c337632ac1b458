//! Boundary to the homomorphic-encryption library.
//!
//! The harness never touches ring arithmetic itself. Everything it times goes
//! through [`CryptoContext`], whose key and ciphertext handles are opaque and
//! only meaningful to the context that produced them. A backend implements the
//! operations its scheme exposes; the rest fall back to `UnsupportedOperation`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::profile::{ContextParameters, SchemeKind};

pub mod simulated;
#[cfg(feature = "tfhe-boolean")]
pub mod tfhe_boolean;

pub use simulated::SimulatedBackend;

/// Library calls the harness can time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    KeyGen,
    Encrypt,
    Decrypt,
    EvalAdd,
    EvalMult,
    EvalMultNoRelin,
    Relinearize,
    EvalDivide,
    EvalBinGate,
    EvalNot,
}

impl Operation {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::KeyGen => "KeyGen",
            Self::Encrypt => "Encrypt",
            Self::Decrypt => "Decrypt",
            Self::EvalAdd => "EvalAdd",
            Self::EvalMult => "EvalMult",
            Self::EvalMultNoRelin => "EvalMultNoRelin",
            Self::Relinearize => "Relinearize",
            Self::EvalDivide => "EvalDivide",
            Self::EvalBinGate => "EvalBinGate",
            Self::EvalNot => "EvalNot",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Two-input gates of the boolean scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GateKind {
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Xnor,
    XorFast,
    XnorFast,
}

impl GateKind {
    pub const ALL: [GateKind; 8] = [
        Self::And,
        Self::Or,
        Self::Xor,
        Self::Nand,
        Self::Nor,
        Self::Xnor,
        Self::XorFast,
        Self::XnorFast,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Nand => "nand",
            Self::Nor => "nor",
            Self::Xnor => "xnor",
            Self::XorFast => "xor_fast",
            Self::XnorFast => "xnor_fast",
        }
    }

    /// Truth table.
    #[must_use]
    pub fn eval(self, a: bool, b: bool) -> bool {
        match self {
            Self::And => a & b,
            Self::Or => a | b,
            Self::Xor | Self::XorFast => a ^ b,
            Self::Nand => !(a & b),
            Self::Nor => !(a | b),
            Self::Xnor | Self::XnorFast => !(a ^ b),
        }
    }
}

/// Decoded plaintext payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Plaintext {
    Integers(Vec<i64>),
    Reals(Vec<f64>),
    Bit(bool),
}

impl Plaintext {
    /// Number of packed slots.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Integers(v) => v.len(),
            Self::Reals(v) => v.len(),
            Self::Bit(_) => 1,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Integers(_) => "integers",
            Self::Reals(_) => "reals",
            Self::Bit(_) => "bit",
        }
    }
}

impl fmt::Display for Plaintext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integers(v) => write!(f, "{v:?}"),
            Self::Reals(v) => write!(f, "{v:?}"),
            Self::Bit(b) => write!(f, "{}", u8::from(*b)),
        }
    }
}

/// Chebyshev reciprocal over `[lower, upper]` (CKKS `EvalDivide`).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DivideParams {
    pub lower: f64,
    pub upper: f64,
    pub degree: u32,
}

impl DivideParams {
    /// Multiplicative depth consumed by a Chebyshev series of this degree.
    #[must_use]
    pub fn depth(&self) -> u32 {
        const TABLE: [(u32, u32); 9] = [
            (5, 3),
            (13, 4),
            (27, 5),
            (59, 6),
            (119, 7),
            (247, 8),
            (495, 9),
            (1007, 10),
            (2031, 11),
        ];
        TABLE
            .iter()
            .find(|(max_degree, _)| self.degree <= *max_degree)
            .map_or(12, |&(_, depth)| depth)
    }

    /// # Errors
    ///
    /// `Config` for an empty, non-positive or non-finite interval, or a zero
    /// degree.
    pub fn validate(&self) -> Result<()> {
        if !(self.lower.is_finite() && self.upper.is_finite()) || self.lower <= 0.0 {
            return Err(BenchError::Config(format!(
                "divide interval [{}, {}] must be finite and strictly positive",
                self.lower, self.upper
            )));
        }
        if self.lower >= self.upper {
            return Err(BenchError::Config(format!(
                "divide interval [{}, {}] is empty",
                self.lower, self.upper
            )));
        }
        if self.degree == 0 {
            return Err(BenchError::Config("divide degree must be positive".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, x: f64) -> bool {
        (self.lower..=self.upper).contains(&x)
    }
}

/// Factory for isolated library contexts.
pub trait Backend {
    type Context: CryptoContext;

    fn name(&self) -> &'static str;

    /// # Errors
    ///
    /// `UnsupportedParameter` when the backend cannot honour `params`.
    fn create_context(&self, params: &ContextParameters) -> Result<Self::Context>;
}

/// One library context. Keys and ciphertexts it returns are only valid with it.
pub trait CryptoContext {
    /// Public, secret and evaluation key material.
    type Keys;
    type Ciphertext: Clone;

    fn parameters(&self) -> &ContextParameters;

    fn ring_dimension(&self) -> usize {
        self.parameters().ring_dimension()
    }

    /// Generates a key pair and installs its evaluation keys in the context.
    fn key_gen(&self) -> Result<Self::Keys>;

    fn encrypt(&self, keys: &Self::Keys, plaintext: &Plaintext) -> Result<Self::Ciphertext>;

    fn decrypt(&self, keys: &Self::Keys, ciphertext: &Self::Ciphertext) -> Result<Plaintext>;

    fn eval_add(&self, _a: &Self::Ciphertext, _b: &Self::Ciphertext) -> Result<Self::Ciphertext> {
        Err(unsupported(self.parameters().kind(), Operation::EvalAdd))
    }

    /// Multiplication followed by relinearization.
    fn eval_mult(&self, _a: &Self::Ciphertext, _b: &Self::Ciphertext) -> Result<Self::Ciphertext> {
        Err(unsupported(self.parameters().kind(), Operation::EvalMult))
    }

    fn eval_mult_no_relin(
        &self,
        _a: &Self::Ciphertext,
        _b: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext> {
        Err(unsupported(self.parameters().kind(), Operation::EvalMultNoRelin))
    }

    fn relinearize(&self, _a: &Self::Ciphertext) -> Result<Self::Ciphertext> {
        Err(unsupported(self.parameters().kind(), Operation::Relinearize))
    }

    fn eval_divide(&self, _a: &Self::Ciphertext, _params: &DivideParams) -> Result<Self::Ciphertext> {
        Err(unsupported(self.parameters().kind(), Operation::EvalDivide))
    }

    fn eval_bin_gate(
        &self,
        _gate: GateKind,
        _a: &Self::Ciphertext,
        _b: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext> {
        Err(unsupported(self.parameters().kind(), Operation::EvalBinGate))
    }

    fn eval_not(&self, _a: &Self::Ciphertext) -> Result<Self::Ciphertext> {
        Err(unsupported(self.parameters().kind(), Operation::EvalNot))
    }
}

#[must_use]
pub fn unsupported(scheme: SchemeKind, operation: Operation) -> BenchError {
    BenchError::UnsupportedOperation {
        scheme,
        operation: operation.name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_truth_tables() {
        for (a, b) in [(false, false), (false, true), (true, false), (true, true)] {
            assert_eq!(GateKind::And.eval(a, b), a && b);
            assert_eq!(GateKind::Or.eval(a, b), a || b);
            assert_eq!(GateKind::Xor.eval(a, b), a != b);
            assert_eq!(GateKind::XorFast.eval(a, b), a != b);
            assert_eq!(GateKind::Nand.eval(a, b), !(a && b));
            assert_eq!(GateKind::Nor.eval(a, b), !(a || b));
            assert_eq!(GateKind::Xnor.eval(a, b), a == b);
            assert_eq!(GateKind::XnorFast.eval(a, b), a == b);
        }
    }

    #[test]
    fn chebyshev_depths() {
        let depth = |degree| DivideParams { lower: 1.0, upper: 2.0, degree }.depth();
        assert_eq!(depth(5), 3);
        assert_eq!(depth(6), 4);
        assert_eq!(depth(59), 6);
        assert_eq!(depth(2031), 11);
        assert_eq!(depth(4000), 12);
    }

    #[test]
    fn divide_validation() {
        let ok = DivideParams { lower: 0.1, upper: 10.0, degree: 59 };
        assert!(ok.validate().is_ok());
        assert!(ok.contains(0.25));
        assert!(!ok.contains(0.0));
        for bad in [
            DivideParams { lower: 0.0, upper: 1.0, degree: 5 },
            DivideParams { lower: 2.0, upper: 1.0, degree: 5 },
            DivideParams { lower: 1.0, upper: f64::INFINITY, degree: 5 },
            DivideParams { lower: 1.0, upper: 2.0, degree: 0 },
        ] {
            assert!(bad.validate().is_err(), "{bad:?}");
        }
    }

    #[test]
    fn plaintext_shape() {
        assert_eq!(Plaintext::Integers(vec![1, 2, 3]).len(), 3);
        assert_eq!(Plaintext::Bit(true).len(), 1);
        assert_eq!(Plaintext::Bit(true).to_string(), "1");
        assert!(Plaintext::Reals(vec![]).is_empty());
    }
}
