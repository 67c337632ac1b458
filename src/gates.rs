//! Composite circuits built from boolean gates.

use crate::capability::{CryptoContext, GateKind};
use crate::error::Result;

/// Encrypted one-bit full adder.
///
/// `sum = (a ⊕ b) ⊕ carry`, `carry_out = (a ∧ b) ∨ ((a ⊕ b) ∧ carry)`.
/// Five gate evaluations; `a ⊕ b` is shared between both outputs.
///
/// # Errors
///
/// Propagates the first failing gate.
pub fn full_adder<C: CryptoContext>(
    ctx: &C,
    a: &C::Ciphertext,
    b: &C::Ciphertext,
    carry: &C::Ciphertext,
) -> Result<(C::Ciphertext, C::Ciphertext)> {
    let a_xor_b = ctx.eval_bin_gate(GateKind::Xor, a, b)?;
    let sum = ctx.eval_bin_gate(GateKind::Xor, &a_xor_b, carry)?;
    let a_and_b = ctx.eval_bin_gate(GateKind::And, a, b)?;
    let propagate = ctx.eval_bin_gate(GateKind::And, &a_xor_b, carry)?;
    let carry_out = ctx.eval_bin_gate(GateKind::Or, &a_and_b, &propagate)?;
    Ok((sum, carry_out))
}

/// Cleartext counterpart of [`full_adder`].
#[must_use]
pub fn full_adder_bits(a: bool, b: bool, carry: bool) -> (bool, bool) {
    let a_xor_b = GateKind::Xor.eval(a, b);
    let sum = GateKind::Xor.eval(a_xor_b, carry);
    let carry_out = GateKind::Or.eval(GateKind::And.eval(a, b), GateKind::And.eval(a_xor_b, carry));
    (sum, carry_out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Plaintext, SimulatedBackend};
    use crate::profile::{SchemeProfile, SecurityLevel};
    use itertools::iproduct;

    #[test]
    fn cleartext_adder_matches_integer_addition() {
        for (a, b, c) in iproduct!([false, true], [false, true], [false, true]) {
            let total = u8::from(a) + u8::from(b) + u8::from(c);
            assert_eq!(full_adder_bits(a, b, c), (total % 2 == 1, total >= 2), "{a} {b} {c}");
        }
    }

    #[test]
    fn encrypted_adder_matches_integer_addition() {
        let ctx = SchemeProfile::boolean(SecurityLevel::Classic128)
            .build(&SimulatedBackend)
            .unwrap();
        let keys = ctx.key_gen().unwrap();
        let enc = |bit| ctx.encrypt(&keys, &Plaintext::Bit(bit)).unwrap();
        for (a, b, c) in iproduct!([false, true], [false, true], [false, true]) {
            let (sum, carry) = full_adder(&ctx, &enc(a), &enc(b), &enc(c)).unwrap();
            let total = u8::from(a) + u8::from(b) + u8::from(c);
            assert_eq!(ctx.decrypt(&keys, &sum).unwrap(), Plaintext::Bit(total % 2 == 1));
            assert_eq!(ctx.decrypt(&keys, &carry).unwrap(), Plaintext::Bit(total >= 2));
        }
    }

    #[test]
    fn adder_needs_gate_capability() {
        let ctx = SchemeProfile::bfv(65537, 1).build(&SimulatedBackend).unwrap();
        let keys = ctx.key_gen().unwrap();
        let x = ctx.encrypt(&keys, &Plaintext::Integers(vec![1])).unwrap();
        assert!(full_adder(&ctx, &x, &x, &x).is_err());
    }
}
