//! In-process stand-in for the encryption library.
//!
//! Ciphertexts carry their slot values in the clear together with the
//! bookkeeping a real library enforces: owning context and key, consumed
//! levels, and polynomial component count. CKKS slots additionally pick up
//! Gaussian noise on every encryption, operation and decryption, so tolerance
//! checks see realistic approximate results. Nothing here is secure.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use itertools::{EitherOrBoth, Itertools};
use rand_distr::{Distribution, Normal};

use super::{Backend, CryptoContext, DivideParams, GateKind, Operation, Plaintext};
use crate::error::{BenchError, Result};
use crate::profile::{ContextParameters, SchemeKind};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Bits of precision lost between the scaling factor and the CKKS noise floor.
const CKKS_NOISE_GAP_BITS: i32 = 8;

/// Components of a freshly encrypted ciphertext.
const FRESH_COMPONENTS: u32 = 2;

#[derive(Clone, Copy, Debug, Default)]
pub struct SimulatedBackend;

impl Backend for SimulatedBackend {
    type Context = SimContext;

    fn name(&self) -> &'static str {
        "simulated"
    }

    fn create_context(&self, params: &ContextParameters) -> Result<SimContext> {
        let noise = match params.profile().scaling_mod_size() {
            Some(scale) => {
                let sd = 2f64.powi(-(i32::try_from(scale).unwrap_or(i32::MAX) - CKKS_NOISE_GAP_BITS));
                Some(Normal::new(0.0, sd).map_err(|e| BenchError::UnsupportedParameter {
                    scheme: params.kind(),
                    reason: format!("noise model: {e}"),
                })?)
            }
            None => None,
        };
        Ok(SimContext {
            id: next_id(),
            params: params.clone(),
            noise,
            eval_keys: Cell::new(None),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey {
    context: u64,
    key: u64,
}

/// Never printed, never serialized.
pub struct SecretKey {
    context: u64,
    key: u64,
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Relinearization or bootstrapping keys for one key pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvalKeys {
    key: u64,
    max_relin_sk_degree: u32,
}

#[derive(Debug)]
pub struct SimKeys {
    pub public: PublicKey,
    pub secret: SecretKey,
    pub eval: EvalKeys,
}

#[derive(Clone, Debug, PartialEq)]
enum Slots {
    /// Residues modulo the plaintext modulus.
    Integers(Vec<u64>),
    Reals(Vec<f64>),
    Bit(bool),
}

#[derive(Clone, Debug)]
pub struct SimCiphertext {
    context: u64,
    key: u64,
    slots: Slots,
    level: u32,
    components: u32,
}

impl SimCiphertext {
    /// Multiplicative levels consumed so far.
    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Number of polynomial components (2 when relinearized).
    #[must_use]
    pub fn components(&self) -> u32 {
        self.components
    }
}

pub struct SimContext {
    id: u64,
    params: ContextParameters,
    noise: Option<Normal<f64>>,
    eval_keys: Cell<Option<EvalKeys>>,
}

impl SimContext {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    fn kind(&self) -> SchemeKind {
        self.params.kind()
    }

    fn require(&self, op: Operation) -> Result<()> {
        if self.kind().supports(op) {
            Ok(())
        } else {
            Err(super::unsupported(self.kind(), op))
        }
    }

    fn check_handle(&self, context: u64) -> Result<()> {
        if context == self.id {
            Ok(())
        } else {
            Err(BenchError::ContextMismatch {
                expected: self.id,
                found: context,
            })
        }
    }

    fn check_pair(&self, a: &SimCiphertext, b: &SimCiphertext) -> Result<()> {
        self.check_handle(a.context)?;
        self.check_handle(b.context)?;
        if a.key != b.key {
            return Err(BenchError::Capability(
                "operands were encrypted under different keys".into(),
            ));
        }
        Ok(())
    }

    fn eval_keys_for(&self, ct: &SimCiphertext, op: Operation) -> Result<EvalKeys> {
        match self.eval_keys.get() {
            Some(keys) if keys.key == ct.key => Ok(keys),
            _ => Err(BenchError::Capability(format!(
                "{op} needs evaluation keys for the ciphertext's key pair"
            ))),
        }
    }

    fn modulus(&self) -> u64 {
        self.params.profile().plaintext_modulus().unwrap_or(2)
    }

    fn sample_noise(&self) -> f64 {
        self.noise
            .as_ref()
            .map_or(0.0, |n| n.sample(&mut rand::thread_rng()))
    }

    fn perturb(&self, values: impl IntoIterator<Item = f64>) -> Vec<f64> {
        values.into_iter().map(|v| v + self.sample_noise()).collect()
    }

    fn combine(&self, a: &Slots, b: &Slots, op: SlotOp) -> Result<Slots> {
        let t = u128::from(self.modulus());
        match (a, b) {
            (Slots::Integers(x), Slots::Integers(y)) => Ok(Slots::Integers(
                x.iter()
                    .zip_longest(y)
                    .map(|pair| {
                        let (l, r) = match pair {
                            EitherOrBoth::Both(l, r) => (u128::from(*l), u128::from(*r)),
                            EitherOrBoth::Left(l) => (u128::from(*l), 0),
                            EitherOrBoth::Right(r) => (0, u128::from(*r)),
                        };
                        let v = match op {
                            SlotOp::Add => (l + r) % t,
                            SlotOp::Mul => (l * r) % t,
                        };
                        // v < t <= u64::MAX
                        u64::try_from(v).unwrap_or_default()
                    })
                    .collect(),
            )),
            (Slots::Reals(x), Slots::Reals(y)) => Ok(Slots::Reals(
                self.perturb(x.iter().zip_longest(y).map(|pair| {
                    let (l, r) = pair.or(&0.0, &0.0);
                    match op {
                        SlotOp::Add => l + r,
                        SlotOp::Mul => l * r,
                    }
                })),
            )),
            _ => Err(BenchError::Capability(
                "operands hold incompatible plaintext encodings".into(),
            )),
        }
    }

    fn multiply(&self, a: &SimCiphertext, b: &SimCiphertext, relin: bool) -> Result<SimCiphertext> {
        let op = if relin {
            Operation::EvalMult
        } else {
            Operation::EvalMultNoRelin
        };
        self.require(op)?;
        self.check_pair(a, b)?;
        let components = if relin {
            if a.components != FRESH_COMPONENTS || b.components != FRESH_COMPONENTS {
                return Err(BenchError::Capability(format!(
                    "{op} expects relinearized operands, got {} and {} components",
                    a.components, b.components
                )));
            }
            self.eval_keys_for(a, op)?;
            FRESH_COMPONENTS
        } else {
            a.components + b.components - 1
        };
        Ok(SimCiphertext {
            context: self.id,
            key: a.key,
            slots: self.combine(&a.slots, &b.slots, SlotOp::Mul)?,
            level: a.level.max(b.level) + 1,
            components,
        })
    }

    fn gate_operand(&self, ct: &SimCiphertext) -> Result<bool> {
        self.check_handle(ct.context)?;
        self.eval_keys_for(ct, Operation::EvalBinGate)?;
        match ct.slots {
            Slots::Bit(b) => Ok(b),
            _ => Err(BenchError::Capability("gate operand is not a single bit".into())),
        }
    }
}

#[derive(Clone, Copy)]
enum SlotOp {
    Add,
    Mul,
}

impl CryptoContext for SimContext {
    type Keys = SimKeys;
    type Ciphertext = SimCiphertext;

    fn parameters(&self) -> &ContextParameters {
        &self.params
    }

    fn key_gen(&self) -> Result<SimKeys> {
        let key = next_id();
        let eval = EvalKeys {
            key,
            max_relin_sk_degree: self.params.profile().max_relin_sk_degree(),
        };
        self.eval_keys.set(Some(eval));
        Ok(SimKeys {
            public: PublicKey {
                context: self.id,
                key,
            },
            secret: SecretKey {
                context: self.id,
                key,
            },
            eval,
        })
    }

    fn encrypt(&self, keys: &SimKeys, plaintext: &Plaintext) -> Result<SimCiphertext> {
        self.check_handle(keys.public.context)?;
        let batch = self.params.profile().batch_size();
        if plaintext.len() > batch {
            return Err(BenchError::Capability(format!(
                "payload of {} slots exceeds batch size {batch}",
                plaintext.len()
            )));
        }
        let slots = match (self.kind(), plaintext) {
            (SchemeKind::Bfv | SchemeKind::Bgv, Plaintext::Integers(v)) => {
                let t = i128::from(self.modulus());
                Slots::Integers(
                    v.iter()
                        .map(|&x| u64::try_from(i128::from(x).rem_euclid(t)).unwrap_or_default())
                        .collect(),
                )
            }
            (SchemeKind::Ckks, Plaintext::Reals(v)) => Slots::Reals(self.perturb(v.iter().copied())),
            (SchemeKind::BooleanGate, Plaintext::Bit(b)) => Slots::Bit(*b),
            (kind, pt) => {
                return Err(BenchError::Capability(format!(
                    "{kind} cannot encode a {} plaintext",
                    pt.kind_name()
                )))
            }
        };
        Ok(SimCiphertext {
            context: self.id,
            key: keys.public.key,
            slots,
            level: 0,
            components: FRESH_COMPONENTS,
        })
    }

    fn decrypt(&self, keys: &SimKeys, ct: &SimCiphertext) -> Result<Plaintext> {
        self.check_handle(keys.secret.context)?;
        self.check_handle(ct.context)?;
        if ct.key != keys.secret.key {
            return Err(BenchError::Capability(
                "ciphertext was encrypted under a different key pair".into(),
            ));
        }
        let depth = self.params.profile().multiplicative_depth();
        if ct.level > depth {
            return Err(BenchError::NoiseBudgetExhausted {
                level: ct.level,
                depth,
            });
        }
        Ok(match &ct.slots {
            Slots::Integers(v) => {
                let t = self.modulus();
                Plaintext::Integers(
                    v.iter()
                        .map(|&r| {
                            let centered = if r > t / 2 {
                                i128::from(r) - i128::from(t)
                            } else {
                                i128::from(r)
                            };
                            i64::try_from(centered).unwrap_or_default()
                        })
                        .collect(),
                )
            }
            Slots::Reals(v) => Plaintext::Reals(self.perturb(v.iter().copied())),
            Slots::Bit(b) => Plaintext::Bit(*b),
        })
    }

    fn eval_add(&self, a: &SimCiphertext, b: &SimCiphertext) -> Result<SimCiphertext> {
        self.require(Operation::EvalAdd)?;
        self.check_pair(a, b)?;
        Ok(SimCiphertext {
            context: self.id,
            key: a.key,
            slots: self.combine(&a.slots, &b.slots, SlotOp::Add)?,
            level: a.level.max(b.level),
            components: a.components.max(b.components),
        })
    }

    fn eval_mult(&self, a: &SimCiphertext, b: &SimCiphertext) -> Result<SimCiphertext> {
        self.multiply(a, b, true)
    }

    fn eval_mult_no_relin(&self, a: &SimCiphertext, b: &SimCiphertext) -> Result<SimCiphertext> {
        self.multiply(a, b, false)
    }

    fn relinearize(&self, a: &SimCiphertext) -> Result<SimCiphertext> {
        self.require(Operation::Relinearize)?;
        self.check_handle(a.context)?;
        let keys = self.eval_keys_for(a, Operation::Relinearize)?;
        if a.components - 1 > keys.max_relin_sk_degree {
            return Err(BenchError::Capability(format!(
                "relinearizing {} components needs secret-key degree {}, keys cover {}",
                a.components,
                a.components - 1,
                keys.max_relin_sk_degree
            )));
        }
        Ok(SimCiphertext {
            components: FRESH_COMPONENTS,
            ..a.clone()
        })
    }

    fn eval_divide(&self, a: &SimCiphertext, params: &DivideParams) -> Result<SimCiphertext> {
        self.require(Operation::EvalDivide)?;
        self.check_handle(a.context)?;
        params.validate()?;
        self.eval_keys_for(a, Operation::EvalDivide)?;
        let Slots::Reals(values) = &a.slots else {
            return Err(BenchError::Capability("EvalDivide expects real slots".into()));
        };
        // Outside the approximation interval the series diverges.
        let quotients = values
            .iter()
            .map(|&x| if params.contains(x) { 1.0 / x } else { f64::NAN });
        Ok(SimCiphertext {
            context: self.id,
            key: a.key,
            slots: Slots::Reals(self.perturb(quotients)),
            level: a.level + params.depth(),
            components: FRESH_COMPONENTS,
        })
    }

    fn eval_bin_gate(&self, gate: GateKind, a: &SimCiphertext, b: &SimCiphertext) -> Result<SimCiphertext> {
        self.require(Operation::EvalBinGate)?;
        if a.key != b.key {
            return Err(BenchError::Capability(
                "operands were encrypted under different keys".into(),
            ));
        }
        let bit = gate.eval(self.gate_operand(a)?, self.gate_operand(b)?);
        Ok(SimCiphertext {
            slots: Slots::Bit(bit),
            ..a.clone()
        })
    }

    fn eval_not(&self, a: &SimCiphertext) -> Result<SimCiphertext> {
        self.require(Operation::EvalNot)?;
        let bit = self.gate_operand(a)?;
        Ok(SimCiphertext {
            slots: Slots::Bit(!bit),
            ..a.clone()
        })
    }
}
