//! Cleartext shadow of the homomorphic pipelines.

use crate::capability::Plaintext;

/// Slot-wise arithmetic mirroring what the library computes.
///
/// Integer slots live in the centered residue system `(-t/2, t/2]` of the
/// plaintext modulus; real slots are exact `f64` arithmetic.
#[derive(Clone, Copy, Debug)]
pub(super) struct Model {
    modulus: Option<u64>,
}

impl Model {
    pub(super) fn new(modulus: Option<u64>) -> Self {
        Self { modulus }
    }

    pub(super) fn add(self, a: &Plaintext, b: &Plaintext) -> Plaintext {
        self.zip(a, b, |x, y| x + y, |x, y| x + y)
    }

    pub(super) fn mul(self, a: &Plaintext, b: &Plaintext) -> Plaintext {
        self.zip(a, b, |x, y| x * y, |x, y| x * y)
    }

    /// Only real slots have a reciprocal.
    pub(super) fn reciprocal(self, a: &Plaintext) -> Option<Plaintext> {
        match a {
            Plaintext::Reals(v) => Some(Plaintext::Reals(v.iter().map(|x| x.recip()).collect())),
            _ => None,
        }
    }

    fn reduce(self, v: i128) -> i64 {
        let centered = match self.modulus {
            Some(t) => {
                let t = i128::from(t);
                let r = v.rem_euclid(t);
                if r > t / 2 {
                    r - t
                } else {
                    r
                }
            }
            None => v,
        };
        i64::try_from(centered).unwrap_or(if centered < 0 { i64::MIN } else { i64::MAX })
    }

    fn zip(
        self,
        a: &Plaintext,
        b: &Plaintext,
        int_op: fn(i128, i128) -> i128,
        real_op: fn(f64, f64) -> f64,
    ) -> Plaintext {
        match (a, b) {
            (Plaintext::Integers(x), Plaintext::Integers(y)) => Plaintext::Integers(
                x.iter()
                    .zip(y)
                    .map(|(&l, &r)| self.reduce(int_op(i128::from(l), i128::from(r))))
                    .collect(),
            ),
            (Plaintext::Reals(x), Plaintext::Reals(y)) => {
                Plaintext::Reals(x.iter().zip(y).map(|(&l, &r)| real_op(l, r)).collect())
            }
            (Plaintext::Bit(l), Plaintext::Bit(r)) => {
                Plaintext::Bit(int_op(i128::from(*l), i128::from(*r)) & 1 == 1)
            }
            // Encodings never mix inside one suite.
            (a, _) => a.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubling_wraps_into_centered_residues() {
        let model = Model::new(Some(65537));
        let two = Plaintext::Integers(vec![2]);
        let mut acc = Plaintext::Integers(vec![1]);
        for _ in 0..20 {
            acc = model.mul(&acc, &two);
        }
        assert_eq!(acc, Plaintext::Integers(vec![-16]));
    }

    #[test]
    fn sums_reduce_mod_t() {
        let model = Model::new(Some(7));
        let a = Plaintext::Integers(vec![3, 4]);
        assert_eq!(model.add(&a, &a), Plaintext::Integers(vec![-1, 1]));
    }

    #[test]
    fn reals_are_plain_arithmetic() {
        let model = Model::new(None);
        let a = Plaintext::Reals(vec![0.5, 4.0]);
        assert_eq!(model.add(&a, &a), Plaintext::Reals(vec![1.0, 8.0]));
        assert_eq!(model.reciprocal(&a), Some(Plaintext::Reals(vec![2.0, 0.25])));
        assert_eq!(model.reciprocal(&Plaintext::Integers(vec![2])), None);
    }
}
