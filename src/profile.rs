//! Scheme profiles and the parameters derived from them.
//!
//! A [`SchemeProfile`] is what the user declares. [`SchemeProfile::derive`]
//! turns it into [`ContextParameters`] (ring dimension, modulus size) the way
//! the capability layer would, and [`SchemeProfile::build`] hands those to a
//! backend. The context keeps its own copy of the profile, so nothing done to
//! the caller's value afterwards can reach live key or ciphertext handles.

use std::fmt;

use num_integer::Integer;
use serde::{Deserialize, Serialize};

use crate::capability::{Backend, Operation};
use crate::error::{BenchError, Result};

/// Largest multiplicative depth accepted for any scheme.
pub const MAX_MULTIPLICATIVE_DEPTH: u32 = 64;

/// Modulus bits reserved for the first (decryption) prime.
const FIRST_MODULUS_BITS: u32 = 60;
/// Extra bits per BFV/BGV level on top of the plaintext modulus size.
const INTEGRAL_LEVEL_OVERHEAD_BITS: u32 = 20;

const RING_DIMENSIONS: [usize; 8] = [1024, 2048, 4096, 8192, 16384, 32768, 65536, 131072];

/// Maximum log2(q) per ring dimension (HE standard, classical security).
const MAX_LOG_Q_128: [u32; 8] = [27, 54, 109, 218, 438, 881, 1772, 3524];
const MAX_LOG_Q_192: [u32; 8] = [19, 37, 75, 152, 305, 611, 1229, 2446];
const MAX_LOG_Q_256: [u32; 8] = [14, 29, 58, 118, 237, 476, 958, 1915];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SchemeKind {
    Bfv,
    Bgv,
    Ckks,
    #[serde(rename = "boolean")]
    #[value(name = "boolean")]
    BooleanGate,
}

impl SchemeKind {
    pub const ALL: [SchemeKind; 4] = [Self::Bfv, Self::Bgv, Self::Ckks, Self::BooleanGate];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Bfv => "BFV",
            Self::Bgv => "BGV",
            Self::Ckks => "CKKS",
            Self::BooleanGate => "BooleanGate",
        }
    }

    /// Directory holding this scheme's result tables.
    #[must_use]
    pub fn results_dir(self) -> String {
        format!("{}Results", self.name())
    }

    #[must_use]
    pub fn is_integral(self) -> bool {
        matches!(self, Self::Bfv | Self::Bgv)
    }

    /// Operations the capability layer exposes for this scheme.
    #[must_use]
    pub fn operations(self) -> &'static [Operation] {
        use Operation::*;
        match self {
            Self::Bfv | Self::Bgv => &[
                KeyGen,
                Encrypt,
                Decrypt,
                EvalAdd,
                EvalMult,
                EvalMultNoRelin,
                Relinearize,
            ],
            Self::Ckks => &[
                KeyGen,
                Encrypt,
                Decrypt,
                EvalAdd,
                EvalMult,
                EvalMultNoRelin,
                Relinearize,
                EvalDivide,
            ],
            Self::BooleanGate => &[KeyGen, Encrypt, Decrypt, EvalBinGate, EvalNot],
        }
    }

    #[must_use]
    pub fn supports(self, op: Operation) -> bool {
        self.operations().contains(&op)
    }
}

impl fmt::Display for SchemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classical security target in bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum SecurityLevel {
    #[default]
    Classic128,
    Classic192,
    Classic256,
}

impl SecurityLevel {
    #[must_use]
    pub fn bits(self) -> u16 {
        match self {
            Self::Classic128 => 128,
            Self::Classic192 => 192,
            Self::Classic256 => 256,
        }
    }

    fn max_log_q(self) -> &'static [u32; 8] {
        match self {
            Self::Classic128 => &MAX_LOG_Q_128,
            Self::Classic192 => &MAX_LOG_Q_192,
            Self::Classic256 => &MAX_LOG_Q_256,
        }
    }
}

impl TryFrom<u16> for SecurityLevel {
    type Error = String;

    fn try_from(bits: u16) -> std::result::Result<Self, Self::Error> {
        match bits {
            128 => Ok(Self::Classic128),
            192 => Ok(Self::Classic192),
            256 => Ok(Self::Classic256),
            other => Err(format!("unsupported security level {other}, expected 128, 192 or 256")),
        }
    }
}

impl From<SecurityLevel> for u16 {
    fn from(level: SecurityLevel) -> Self {
        level.bits()
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

fn default_integral_batch_size() -> usize {
    16
}

fn default_ckks_batch_size() -> usize {
    8
}

fn default_max_relin_sk_degree() -> u32 {
    2
}

/// BFV / BGV parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegralParams {
    #[serde(default)]
    pub security_level: SecurityLevel,
    pub multiplicative_depth: u32,
    pub plaintext_modulus: u64,
    #[serde(default = "default_integral_batch_size")]
    pub batch_size: usize,
    /// Highest secret-key power with a relinearization key.
    #[serde(default = "default_max_relin_sk_degree")]
    pub max_relin_sk_degree: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CkksParams {
    #[serde(default)]
    pub security_level: SecurityLevel,
    pub multiplicative_depth: u32,
    pub scaling_mod_size: u32,
    #[serde(default = "default_ckks_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_relin_sk_degree")]
    pub max_relin_sk_degree: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BooleanParams {
    #[serde(default)]
    pub security_level: SecurityLevel,
}

/// One scheme variant under test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum SchemeProfile {
    Bfv(IntegralParams),
    Bgv(IntegralParams),
    Ckks(CkksParams),
    #[serde(rename = "boolean")]
    BooleanGate(BooleanParams),
}

impl SchemeProfile {
    #[must_use]
    pub fn bfv(plaintext_modulus: u64, multiplicative_depth: u32) -> Self {
        Self::Bfv(IntegralParams {
            security_level: SecurityLevel::default(),
            multiplicative_depth,
            plaintext_modulus,
            batch_size: default_integral_batch_size(),
            max_relin_sk_degree: default_max_relin_sk_degree(),
        })
    }

    #[must_use]
    pub fn bgv(plaintext_modulus: u64, multiplicative_depth: u32) -> Self {
        match Self::bfv(plaintext_modulus, multiplicative_depth) {
            Self::Bfv(p) => Self::Bgv(p),
            other => other,
        }
    }

    #[must_use]
    pub fn ckks(scaling_mod_size: u32, multiplicative_depth: u32, batch_size: usize) -> Self {
        Self::Ckks(CkksParams {
            security_level: SecurityLevel::default(),
            multiplicative_depth,
            scaling_mod_size,
            batch_size,
            max_relin_sk_degree: default_max_relin_sk_degree(),
        })
    }

    #[must_use]
    pub fn boolean(security_level: SecurityLevel) -> Self {
        Self::BooleanGate(BooleanParams { security_level })
    }

    #[must_use]
    pub fn with_security_level(mut self, level: SecurityLevel) -> Self {
        match &mut self {
            Self::Bfv(p) | Self::Bgv(p) => p.security_level = level,
            Self::Ckks(p) => p.security_level = level,
            Self::BooleanGate(p) => p.security_level = level,
        }
        self
    }

    /// Ignored for the boolean scheme, which works on single bits.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        match &mut self {
            Self::Bfv(p) | Self::Bgv(p) => p.batch_size = batch_size,
            Self::Ckks(p) => p.batch_size = batch_size,
            Self::BooleanGate(_) => {}
        }
        self
    }

    #[must_use]
    pub fn with_max_relin_sk_degree(mut self, degree: u32) -> Self {
        match &mut self {
            Self::Bfv(p) | Self::Bgv(p) => p.max_relin_sk_degree = degree,
            Self::Ckks(p) => p.max_relin_sk_degree = degree,
            Self::BooleanGate(_) => {}
        }
        self
    }

    #[must_use]
    pub fn kind(&self) -> SchemeKind {
        match self {
            Self::Bfv(_) => SchemeKind::Bfv,
            Self::Bgv(_) => SchemeKind::Bgv,
            Self::Ckks(_) => SchemeKind::Ckks,
            Self::BooleanGate(_) => SchemeKind::BooleanGate,
        }
    }

    #[must_use]
    pub fn security_level(&self) -> SecurityLevel {
        match self {
            Self::Bfv(p) | Self::Bgv(p) => p.security_level,
            Self::Ckks(p) => p.security_level,
            Self::BooleanGate(p) => p.security_level,
        }
    }

    #[must_use]
    pub fn multiplicative_depth(&self) -> u32 {
        match self {
            Self::Bfv(p) | Self::Bgv(p) => p.multiplicative_depth,
            Self::Ckks(p) => p.multiplicative_depth,
            Self::BooleanGate(_) => 0,
        }
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        match self {
            Self::Bfv(p) | Self::Bgv(p) => p.batch_size,
            Self::Ckks(p) => p.batch_size,
            Self::BooleanGate(_) => 1,
        }
    }

    #[must_use]
    pub fn max_relin_sk_degree(&self) -> u32 {
        match self {
            Self::Bfv(p) | Self::Bgv(p) => p.max_relin_sk_degree,
            Self::Ckks(p) => p.max_relin_sk_degree,
            Self::BooleanGate(_) => 0,
        }
    }

    /// Plaintext modulus of the integral schemes.
    #[must_use]
    pub fn plaintext_modulus(&self) -> Option<u64> {
        match self {
            Self::Bfv(p) | Self::Bgv(p) => Some(p.plaintext_modulus),
            _ => None,
        }
    }

    #[must_use]
    pub fn scaling_mod_size(&self) -> Option<u32> {
        match self {
            Self::Ckks(p) => Some(p.scaling_mod_size),
            _ => None,
        }
    }

    /// File-name suffix identifying this parameter set.
    #[must_use]
    pub fn parameter_suffix(&self) -> String {
        match self {
            Self::Bfv(p) | Self::Bgv(p) => format!(
                "_sec{}_d{}_t{}",
                p.security_level, p.multiplicative_depth, p.plaintext_modulus
            ),
            Self::Ckks(p) => format!(
                "_sec{}_d{}_s{}_b{}",
                p.security_level, p.multiplicative_depth, p.scaling_mod_size, p.batch_size
            ),
            Self::BooleanGate(p) => format!("_sec{}", p.security_level),
        }
    }

    fn unsupported(&self, reason: impl Into<String>) -> BenchError {
        BenchError::UnsupportedParameter {
            scheme: self.kind(),
            reason: reason.into(),
        }
    }

    /// Derives the library-internal parameters for this profile.
    ///
    /// # Errors
    ///
    /// `UnsupportedParameter` when no ring dimension satisfies the security
    /// level, modulus size and batch, or when a field is out of range.
    pub fn derive(&self) -> Result<ContextParameters> {
        let (modulus_bits, ring_dimension) = match self {
            Self::BooleanGate(p) => match p.security_level {
                SecurityLevel::Classic128 => (27, 1024),
                SecurityLevel::Classic192 | SecurityLevel::Classic256 => (37, 2048),
            },
            Self::Bfv(p) | Self::Bgv(p) => {
                if p.plaintext_modulus < 2 {
                    return Err(self.unsupported("plaintext modulus must be at least 2"));
                }
                let t_bits = u64::BITS - p.plaintext_modulus.leading_zeros();
                if t_bits > 60 {
                    return Err(self.unsupported("plaintext modulus wider than 60 bits"));
                }
                let bits = self.modulus_bits(t_bits + INTEGRAL_LEVEL_OVERHEAD_BITS)?;
                let n = self.ring_dimension_for(bits, p.batch_size)?;
                let two_n = 2 * n as u64;
                if !Integer::is_multiple_of(&(p.plaintext_modulus - 1), &two_n) {
                    return Err(self.unsupported(format!(
                        "plaintext modulus {} is not congruent to 1 mod {two_n}; packing is impossible at ring dimension {n}",
                        p.plaintext_modulus
                    )));
                }
                (bits, n)
            }
            Self::Ckks(p) => {
                if !(20..=60).contains(&p.scaling_mod_size) {
                    return Err(self.unsupported(format!(
                        "scaling modulus size {} outside 20..=60",
                        p.scaling_mod_size
                    )));
                }
                let bits = self.modulus_bits(p.scaling_mod_size)?;
                (bits, self.ring_dimension_for(bits, p.batch_size)?)
            }
        };
        Ok(ContextParameters {
            profile: self.clone(),
            ring_dimension,
            modulus_bits,
        })
    }

    fn modulus_bits(&self, bits_per_level: u32) -> Result<u32> {
        let depth = self.multiplicative_depth();
        if depth > MAX_MULTIPLICATIVE_DEPTH {
            return Err(self.unsupported(format!(
                "multiplicative depth {depth} exceeds the limit of {MAX_MULTIPLICATIVE_DEPTH}"
            )));
        }
        Ok(FIRST_MODULUS_BITS + depth * bits_per_level)
    }

    fn ring_dimension_for(&self, modulus_bits: u32, batch_size: usize) -> Result<usize> {
        if batch_size == 0 || !batch_size.is_power_of_two() {
            return Err(self.unsupported(format!(
                "batch size {batch_size} must be a positive power of two"
            )));
        }
        let slots = |n: usize| {
            if self.kind() == SchemeKind::Ckks {
                n / 2
            } else {
                n
            }
        };
        RING_DIMENSIONS
            .iter()
            .zip(self.security_level().max_log_q())
            .find(|&(&n, &max_bits)| modulus_bits <= max_bits && slots(n) >= batch_size)
            .map(|(&n, _)| n)
            .ok_or_else(|| {
                self.unsupported(format!(
                    "no ring dimension up to {} holds a {modulus_bits}-bit modulus at {}-bit security with batch {batch_size}",
                    RING_DIMENSIONS[RING_DIMENSIONS.len() - 1],
                    self.security_level()
                ))
            })
    }

    /// Derives parameters and asks `backend` for a context.
    ///
    /// # Errors
    ///
    /// `UnsupportedParameter` from derivation or from the backend.
    pub fn build<B: Backend>(&self, backend: &B) -> Result<B::Context> {
        let params = self.derive()?;
        backend.create_context(&params)
    }
}

impl fmt::Display for SchemeProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind(), self.parameter_suffix())
    }
}

/// Parameters fixed at context creation. Read-only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextParameters {
    profile: SchemeProfile,
    ring_dimension: usize,
    modulus_bits: u32,
}

impl ContextParameters {
    #[must_use]
    pub fn profile(&self) -> &SchemeProfile {
        &self.profile
    }

    #[must_use]
    pub fn kind(&self) -> SchemeKind {
        self.profile.kind()
    }

    #[must_use]
    pub fn ring_dimension(&self) -> usize {
        self.ring_dimension
    }

    /// Estimated ciphertext modulus size in bits.
    #[must_use]
    pub fn modulus_bits(&self) -> u32 {
        self.modulus_bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bfv_depth_twenty_fits_32k_ring() {
        let params = SchemeProfile::bfv(65537, 20).derive().unwrap();
        assert_eq!(params.modulus_bits(), 60 + 20 * 37);
        assert_eq!(params.ring_dimension(), 32768);
    }

    #[test]
    fn derivation_is_deterministic() {
        let profile = SchemeProfile::ckks(50, 12, 8);
        assert_eq!(profile.derive().unwrap(), profile.derive().unwrap());
    }

    #[test]
    fn ckks_depth_one() {
        let params = SchemeProfile::ckks(50, 1, 8).derive().unwrap();
        assert_eq!(params.modulus_bits(), 110);
        assert_eq!(params.ring_dimension(), 8192);
    }

    #[test]
    fn higher_security_needs_larger_ring() {
        // 160 bits fit n = 8192 at 128-bit security but not at 256-bit.
        let classic = SchemeProfile::ckks(50, 2, 8).derive().unwrap();
        let strong = SchemeProfile::ckks(50, 2, 8)
            .with_security_level(SecurityLevel::Classic256)
            .derive()
            .unwrap();
        assert_eq!(classic.ring_dimension(), 8192);
        assert_eq!(strong.ring_dimension(), 16384);
    }

    #[test]
    fn excessive_depth_is_rejected() {
        let err = SchemeProfile::bfv(65537, MAX_MULTIPLICATIVE_DEPTH + 1)
            .derive()
            .unwrap_err();
        assert!(matches!(err, BenchError::UnsupportedParameter { scheme: SchemeKind::Bfv, .. }));

        let err = SchemeProfile::ckks(59, 64, 8)
            .with_security_level(SecurityLevel::Classic256)
            .derive()
            .unwrap_err();
        assert!(matches!(err, BenchError::UnsupportedParameter { .. }));
    }

    #[test]
    fn packing_requires_compatible_plaintext_modulus() {
        let err = SchemeProfile::bfv(65536, 2).derive().unwrap_err();
        assert!(err.to_string().contains("packing"), "{err}");
        assert!(SchemeProfile::bgv(786_433, 2).derive().is_ok());
    }

    #[test]
    fn batch_must_be_power_of_two() {
        assert!(SchemeProfile::ckks(50, 1, 6).derive().is_err());
        assert!(SchemeProfile::bfv(65537, 1).with_batch_size(0).derive().is_err());
    }

    #[test]
    fn boolean_ring_dimensions() {
        let p = SchemeProfile::boolean(SecurityLevel::Classic128).derive().unwrap();
        assert_eq!(p.ring_dimension(), 1024);
        let p = SchemeProfile::boolean(SecurityLevel::Classic192).derive().unwrap();
        assert_eq!(p.ring_dimension(), 2048);
    }

    #[test]
    fn derived_parameters_own_a_copy() {
        let mut profile = SchemeProfile::bfv(65537, 2);
        let params = profile.derive().unwrap();
        profile = profile.with_batch_size(32);
        assert_eq!(params.profile().batch_size(), 16);
        assert_eq!(profile.batch_size(), 32);
    }

    #[test]
    fn suffixes() {
        assert_eq!(SchemeProfile::bfv(65537, 20).parameter_suffix(), "_sec128_d20_t65537");
        assert_eq!(SchemeProfile::ckks(50, 1, 8).parameter_suffix(), "_sec128_d1_s50_b8");
        assert_eq!(SchemeProfile::boolean(SecurityLevel::Classic128).parameter_suffix(), "_sec128");
    }

    #[test]
    fn operation_sets() {
        assert!(SchemeKind::Ckks.supports(Operation::EvalDivide));
        assert!(!SchemeKind::Bfv.supports(Operation::EvalDivide));
        assert!(!SchemeKind::BooleanGate.supports(Operation::EvalAdd));
        assert!(SchemeKind::BooleanGate.supports(Operation::EvalBinGate));
    }

    #[test]
    fn profile_from_toml() {
        let profile: SchemeProfile = toml::from_str(
            "scheme = \"ckks\"\nmultiplicative_depth = 1\nscaling_mod_size = 50\nsecurity_level = 192\n",
        )
        .unwrap();
        assert_eq!(
            profile,
            SchemeProfile::ckks(50, 1, 8).with_security_level(SecurityLevel::Classic192)
        );
        let bad = toml::from_str::<SchemeProfile>("scheme = \"boolean\"\nsecurity_level = 100\n");
        assert!(bad.is_err());
    }
}
