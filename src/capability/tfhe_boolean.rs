//! Boolean-gate backend on Zama's `tfhe` crate.
//!
//! Only the boolean scheme at 128-bit security is available. `key_gen`
//! builds the client key and installs the matching server (bootstrapping)
//! key in the context; gates fail until that has happened.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tfhe::boolean::ciphertext::Ciphertext;
use tfhe::boolean::parameters::DEFAULT_PARAMETERS;
use tfhe::boolean::prelude::{BinaryBooleanGates, ClientKey, ServerKey};

use super::{Backend, CryptoContext, GateKind, Operation, Plaintext};
use crate::error::{BenchError, Result};
use crate::profile::{ContextParameters, SchemeKind, SecurityLevel};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Builds [`TfheContext`]s for 128-bit boolean profiles.
#[derive(Clone, Copy, Debug, Default)]
pub struct TfheBooleanBackend;

impl Backend for TfheBooleanBackend {
    type Context = TfheContext;

    fn name(&self) -> &'static str {
        "tfhe-boolean"
    }

    fn create_context(&self, params: &ContextParameters) -> Result<TfheContext> {
        let kind = params.kind();
        if kind != SchemeKind::BooleanGate {
            return Err(BenchError::UnsupportedParameter {
                scheme: kind,
                reason: "the tfhe backend only provides boolean gates".into(),
            });
        }
        if params.profile().security_level() != SecurityLevel::Classic128 {
            return Err(BenchError::UnsupportedParameter {
                scheme: kind,
                reason: format!(
                    "no tfhe boolean parameter set for {}-bit security",
                    params.profile().security_level()
                ),
            });
        }
        Ok(TfheContext {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            params: params.clone(),
            server_key: RefCell::new(None),
        })
    }
}

/// Client key bound to the context that generated it.
pub struct TfheKeys {
    context: u64,
    client: ClientKey,
}

impl fmt::Debug for TfheKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TfheKeys")
            .field("context", &self.context)
            .field("client", &"<redacted>")
            .finish()
    }
}

/// A tfhe boolean ciphertext tagged with its context.
#[derive(Clone)]
pub struct TfheCiphertext {
    context: u64,
    inner: Ciphertext,
}

/// Context holding the server key installed by the last `key_gen`.
pub struct TfheContext {
    id: u64,
    params: ContextParameters,
    server_key: RefCell<Option<ServerKey>>,
}

impl TfheContext {
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

    fn with_server_key<T>(&self, op: Operation, f: impl FnOnce(&ServerKey) -> T) -> Result<T> {
        let guard = self.server_key.borrow();
        let sks = guard.as_ref().ok_or_else(|| {
            BenchError::Capability(format!("{op} needs a server key; run key generation first"))
        })?;
        Ok(f(sks))
    }

    fn wrap(&self, inner: Ciphertext) -> TfheCiphertext {
        TfheCiphertext {
            context: self.id,
            inner,
        }
    }
}

impl CryptoContext for TfheContext {
    type Keys = TfheKeys;
    type Ciphertext = TfheCiphertext;

    fn parameters(&self) -> &ContextParameters {
        &self.params
    }

    fn key_gen(&self) -> Result<TfheKeys> {
        let client = ClientKey::new(&DEFAULT_PARAMETERS);
        let server = ServerKey::new(&client);
        self.server_key.replace(Some(server));
        Ok(TfheKeys {
            context: self.id,
            client,
        })
    }

    fn encrypt(&self, keys: &TfheKeys, plaintext: &Plaintext) -> Result<TfheCiphertext> {
        self.check_handle(keys.context)?;
        match plaintext {
            Plaintext::Bit(bit) => Ok(self.wrap(keys.client.encrypt(*bit))),
            other => Err(BenchError::Capability(format!(
                "boolean gates cannot encode a {} plaintext",
                other.kind_name()
            ))),
        }
    }

    fn decrypt(&self, keys: &TfheKeys, ct: &TfheCiphertext) -> Result<Plaintext> {
        self.check_handle(keys.context)?;
        self.check_handle(ct.context)?;
        Ok(Plaintext::Bit(keys.client.decrypt(&ct.inner)))
    }

    fn eval_bin_gate(&self, gate: GateKind, a: &TfheCiphertext, b: &TfheCiphertext) -> Result<TfheCiphertext> {
        self.check_handle(a.context)?;
        self.check_handle(b.context)?;
        let (l, r) = (&a.inner, &b.inner);
        // tfhe has no separate fast XOR/XNOR; they time the regular gates.
        let out = self.with_server_key(Operation::EvalBinGate, |sks| match gate {
            GateKind::And => sks.and(l, r),
            GateKind::Or => sks.or(l, r),
            GateKind::Xor | GateKind::XorFast => sks.xor(l, r),
            GateKind::Nand => sks.nand(l, r),
            GateKind::Nor => sks.nor(l, r),
            GateKind::Xnor | GateKind::XnorFast => sks.xnor(l, r),
        })?;
        Ok(self.wrap(out))
    }

    fn eval_not(&self, a: &TfheCiphertext) -> Result<TfheCiphertext> {
        self.check_handle(a.context)?;
        let out = self.with_server_key(Operation::EvalNot, |sks| sks.not(&a.inner))?;
        Ok(self.wrap(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gates::full_adder;
    use crate::profile::SchemeProfile;

    #[test]
    fn rejects_other_schemes() {
        assert!(SchemeProfile::bfv(65537, 1).build(&TfheBooleanBackend).is_err());
        assert!(SchemeProfile::boolean(SecurityLevel::Classic256)
            .build(&TfheBooleanBackend)
            .is_err());
    }

    #[test]
    fn foreign_ciphertexts_are_rejected() {
        let profile = SchemeProfile::boolean(SecurityLevel::Classic128);
        let donor = profile.build(&TfheBooleanBackend).unwrap();
        let keys = donor.key_gen().unwrap();
        let ct = donor.encrypt(&keys, &Plaintext::Bit(true)).unwrap();
        let ctx = profile.build(&TfheBooleanBackend).unwrap();
        assert!(matches!(ctx.eval_not(&ct), Err(BenchError::ContextMismatch { .. })));
    }

    #[test]
    fn and_xor_and_adder() {
        let ctx = SchemeProfile::boolean(SecurityLevel::Classic128)
            .build(&TfheBooleanBackend)
            .unwrap();
        let keys = ctx.key_gen().unwrap();
        let one = ctx.encrypt(&keys, &Plaintext::Bit(true)).unwrap();
        let zero = ctx.encrypt(&keys, &Plaintext::Bit(false)).unwrap();
        let and = ctx.eval_bin_gate(GateKind::And, &one, &one).unwrap();
        let xor = ctx.eval_bin_gate(GateKind::Xor, &one, &one).unwrap();
        assert_eq!(ctx.decrypt(&keys, &and).unwrap(), Plaintext::Bit(true));
        assert_eq!(ctx.decrypt(&keys, &xor).unwrap(), Plaintext::Bit(false));
        let (sum, carry) = full_adder(&ctx, &one, &one, &zero).unwrap();
        assert_eq!(ctx.decrypt(&keys, &sum).unwrap(), Plaintext::Bit(false));
        assert_eq!(ctx.decrypt(&keys, &carry).unwrap(), Plaintext::Bit(true));
    }
}
