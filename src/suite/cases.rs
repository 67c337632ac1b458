//! The timed cases of a suite.
//!
//! Every timed call goes through a [`TimingLog`] so the per-operation summary
//! logged at the end of a case covers exactly the cells written to its table.
//! Setup work (encrypting operands, rebuilding fresh inputs) is never timed.

use std::fs;
use std::iter;

use tracing::{info, warn};

use super::model::Model;
use super::{with_sink, BenchmarkSuite, Phase, SuiteReport};
use crate::capability::{unsupported, Backend, CryptoContext, GateKind, Operation, Plaintext};
use crate::error::{BenchError, Result};
use crate::gates::{full_adder, full_adder_bits};
use crate::paths::ResultPath;
use crate::profile::SchemeKind;
use crate::sink::{Row, SKIPPED};
use crate::timing::{timed, TimingLog};
use crate::verify::{Check, VerificationReport};

type Ctx<B> = <B as Backend>::Context;
type Keys<B> = <Ctx<B> as CryptoContext>::Keys;
type Ct<B> = <Ctx<B> as CryptoContext>::Ciphertext;

/// Values encoded into CKKS payloads, repeated to fill wider batches.
const CKKS_SAMPLE: [f64; 8] = [5.0, 4.0, 3.0, 2.0, 1.0, 0.75, 0.5, 0.25];

/// A decryption already performed and timed during EncryptDecrypt.
pub(super) struct RoundTrip {
    name: String,
    expected: Plaintext,
    actual: Plaintext,
    decrypt_us: u64,
}

/// A ciphertext left behind by HomomorphicOps, with the value it should hold.
pub(super) struct Tracked<C> {
    name: String,
    ciphertext: C,
    expected: Plaintext,
}

impl<C> Tracked<C> {
    fn new(name: impl Into<String>, ciphertext: C, expected: Plaintext) -> Self {
        Self {
            name: name.into(),
            ciphertext,
            expected,
        }
    }
}

fn columns<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    names.into_iter().map(str::to_owned).collect()
}

impl<B: Backend> BenchmarkSuite<'_, B> {
    fn required_operations(&self) -> Vec<Operation> {
        let mut ops = vec![Operation::KeyGen, Operation::Encrypt, Operation::Decrypt];
        if self.profile.kind() == SchemeKind::BooleanGate {
            ops.extend([Operation::EvalBinGate, Operation::EvalNot]);
            return ops;
        }
        ops.push(Operation::EvalAdd);
        if self.settings.relin_interval == 0 {
            ops.push(Operation::EvalMult);
        } else {
            ops.extend([Operation::EvalMultNoRelin, Operation::Relinearize]);
        }
        if self.settings.divide.is_some() {
            ops.push(Operation::EvalDivide);
        }
        ops
    }

    fn payload(&self, slots: usize) -> Plaintext {
        match self.profile.kind() {
            SchemeKind::Bfv | SchemeKind::Bgv => Plaintext::Integers((1..).take(slots).collect()),
            SchemeKind::Ckks => {
                Plaintext::Reals(CKKS_SAMPLE.iter().copied().cycle().take(slots).collect())
            }
            SchemeKind::BooleanGate => Plaintext::Bit(true),
        }
    }

    pub(super) fn configure(&self) -> Result<Ctx<B>> {
        self.settings.validate(&self.profile)?;
        let kind = self.profile.kind();
        if let Some(op) = self.required_operations().into_iter().find(|&op| !kind.supports(op)) {
            return Err(unsupported(kind, op));
        }

        let (ctx, setup_us) = timed(|| self.profile.build(self.backend))?;

        let dir = ResultPath::new(&self.results_root, kind, Phase::KeyGen.to_string(), "")?.directory();
        fs::create_dir_all(&dir).map_err(|e| BenchError::io(&dir, e))?;
        info!(
            variant = %self.profile,
            backend = self.backend.name(),
            ring_dimension = ctx.ring_dimension(),
            modulus_bits = ctx.parameters().modulus_bits(),
            setup_us,
            "context ready"
        );
        Ok(ctx)
    }

    pub(super) fn keygen_case(&self, ctx: &Ctx<B>, report: &mut SuiteReport) -> Result<Keys<B>> {
        let path = self.result_path(Phase::KeyGen)?;
        let fresh = self.settings.fresh_context_per_keygen;
        let mut log = TimingLog::new();

        let last_keys = with_sink(&path, columns(["iteration", "keygen_us"]), |sink| {
            let mut last_keys = None;
            for iteration in 0..self.settings.keygen_repetitions {
                let micros = if fresh {
                    let ((), micros) = log.measure("keygen", || -> Result<()> {
                        let scratch = self.profile.build(self.backend)?;
                        scratch.key_gen().map(drop)
                    })?;
                    micros
                } else {
                    let (keys, micros) = log.measure("keygen", || ctx.key_gen())?;
                    last_keys = Some(keys);
                    micros
                };
                sink.write_row(&Row::new().set("iteration", iteration).set("keygen_us", micros))?;
            }
            Ok(last_keys)
        })?;
        report.files.push(path);
        self.log_summary(Phase::KeyGen, &log);

        // Keys made in scratch contexts are useless here.
        match last_keys {
            Some(keys) => Ok(keys),
            None => ctx.key_gen(),
        }
    }

    pub(super) fn encrypt_decrypt_case(
        &self,
        ctx: &Ctx<B>,
        keys: &Keys<B>,
        report: &mut SuiteReport,
    ) -> Result<Vec<RoundTrip>> {
        let path = self.result_path(Phase::EncryptDecrypt)?;
        let sizes = &self.settings.payload_sizes;
        let header = iter::once("iteration".to_owned())
            .chain(
                sizes
                    .iter()
                    .flat_map(|n| [format!("encrypt_{n}_us"), format!("decrypt_{n}_us")]),
            )
            .collect();
        let payloads: Vec<Plaintext> = sizes.iter().map(|&n| self.payload(n)).collect();
        let last = self.settings.repetitions - 1;
        let mut log = TimingLog::new();

        let round_trips = with_sink(&path, header, |sink| {
            let mut round_trips = Vec::with_capacity(sizes.len());
            for iteration in 0..self.settings.repetitions {
                let mut row = Row::new().set("iteration", iteration);
                for (n, plaintext) in sizes.iter().zip(&payloads) {
                    let (ct, encrypt_us) = log.measure("encrypt", || ctx.encrypt(keys, plaintext))?;
                    let (actual, decrypt_us) = log.measure("decrypt", || ctx.decrypt(keys, &ct))?;
                    row.insert(format!("encrypt_{n}_us"), encrypt_us);
                    row.insert(format!("decrypt_{n}_us"), decrypt_us);
                    if iteration == last {
                        round_trips.push(RoundTrip {
                            name: format!("round_trip_{n}"),
                            expected: plaintext.clone(),
                            actual,
                            decrypt_us,
                        });
                    }
                }
                sink.write_row(&row)?;
            }
            Ok(round_trips)
        })?;
        report.files.push(path);
        self.log_summary(Phase::EncryptDecrypt, &log);
        Ok(round_trips)
    }

    pub(super) fn homomorphic_ops_case(
        &self,
        ctx: &Ctx<B>,
        keys: &Keys<B>,
        report: &mut SuiteReport,
    ) -> Result<Vec<Tracked<Ct<B>>>> {
        let mut log = TimingLog::new();
        let tracked = if self.profile.kind() == SchemeKind::BooleanGate {
            self.gate_ops(ctx, keys, &mut log, report)
        } else {
            self.arithmetic_ops(ctx, keys, &mut log, report)
        }?;
        self.log_summary(Phase::HomomorphicOps, &log);
        Ok(tracked)
    }

    /// Addition chain, multiplication chain and (CKKS) reciprocal.
    ///
    /// The addition chain keeps adding the same encrypted input to a running
    /// sum. The multiplication chain doubles a running product, or a fresh
    /// encryption of the input when `reset_before_mult` is set, so its depth
    /// grows by one per iteration unless reset.
    fn arithmetic_ops(
        &self,
        ctx: &Ctx<B>,
        keys: &Keys<B>,
        log: &mut TimingLog,
        report: &mut SuiteReport,
    ) -> Result<Vec<Tracked<Ct<B>>>> {
        let path = self.result_path(Phase::HomomorphicOps)?;
        let settings = &self.settings;
        let model = Model::new(self.profile.plaintext_modulus());
        let width = settings.ops_width;
        let input = self.payload(width);
        let factor = match self.profile.kind() {
            SchemeKind::Ckks => Plaintext::Reals(vec![2.0; width]),
            _ => Plaintext::Integers(vec![2; width]),
        };
        let mut header = columns(["iteration", "add_us", "mult_us"]);
        if settings.relin_interval > 0 {
            header.push("relin_us".to_owned());
        }
        if settings.divide.is_some() {
            header.push("divide_us".to_owned());
        }

        let tracked = with_sink(&path, header, |sink| {
            let addend = ctx.encrypt(keys, &input)?;
            let multiplier = ctx.encrypt(keys, &factor)?;
            let (mut sum, mut sum_expected) = (addend.clone(), input.clone());
            let (mut product, mut product_expected) = (ctx.encrypt(keys, &input)?, input.clone());
            let mut quotient = None;
            let mut unrelinearized = 0;

            for iteration in 0..settings.repetitions {
                let mut row = Row::new().set("iteration", iteration);

                let (next, add_us) = log.measure("add", || ctx.eval_add(&sum, &addend))?;
                sum = next;
                sum_expected = model.add(&sum_expected, &input);
                row.insert("add_us", add_us);

                if settings.reset_before_mult {
                    product = ctx.encrypt(keys, &input)?;
                    product_expected = input.clone();
                    unrelinearized = 0;
                }
                if settings.relin_interval == 0 {
                    let (next, mult_us) = log.measure("mult", || ctx.eval_mult(&product, &multiplier))?;
                    product = next;
                    row.insert("mult_us", mult_us);
                } else {
                    let (next, mult_us) =
                        log.measure("mult", || ctx.eval_mult_no_relin(&product, &multiplier))?;
                    product = next;
                    row.insert("mult_us", mult_us);
                    unrelinearized += 1;
                    if unrelinearized >= settings.relin_interval {
                        let (next, relin_us) = log.measure("relin", || ctx.relinearize(&product))?;
                        product = next;
                        unrelinearized = 0;
                        row.insert("relin_us", relin_us);
                    } else {
                        row.insert("relin_us", SKIPPED);
                    }
                }
                product_expected = model.mul(&product_expected, &factor);

                if let Some(params) = &settings.divide {
                    let fresh = ctx.encrypt(keys, &input)?;
                    let (q, divide_us) = log.measure("divide", || ctx.eval_divide(&fresh, params))?;
                    quotient = Some(q);
                    row.insert("divide_us", divide_us);
                }
                sink.write_row(&row)?;
            }

            let mut tracked = vec![
                Tracked::new("add_chain", sum, sum_expected),
                Tracked::new("mult_chain", product, product_expected),
            ];
            if let (Some(q), Some(expected)) = (quotient, model.reciprocal(&input)) {
                tracked.push(Tracked::new("divide", q, expected));
            }
            Ok(tracked)
        })?;
        report.files.push(path);
        Ok(tracked)
    }

    /// Every binary gate and NOT on a fixed pair, then one full-adder step.
    ///
    /// The adder folds its sum back into the left operand and keeps its carry,
    /// starting from `x = 1, y = 1, carry = 0`.
    fn gate_ops(
        &self,
        ctx: &Ctx<B>,
        keys: &Keys<B>,
        log: &mut TimingLog,
        report: &mut SuiteReport,
    ) -> Result<Vec<Tracked<Ct<B>>>> {
        let path = self.result_path(Phase::HomomorphicOps)?;
        let header = iter::once("iteration".to_owned())
            .chain(GateKind::ALL.iter().map(|g| format!("{}_us", g.name())))
            .chain(["not_us".to_owned(), "full_adder_us".to_owned()])
            .collect();

        let tracked = with_sink(&path, header, |sink| {
            let (mut x, mut x_bit) = (ctx.encrypt(keys, &Plaintext::Bit(true))?, true);
            let (y, y_bit) = (ctx.encrypt(keys, &Plaintext::Bit(true))?, true);
            let (mut carry, mut carry_bit) = (ctx.encrypt(keys, &Plaintext::Bit(false))?, false);
            let mut outputs = Vec::with_capacity(GateKind::ALL.len() + 3);

            for iteration in 0..self.settings.repetitions {
                outputs.clear();
                let mut row = Row::new().set("iteration", iteration);
                for gate in GateKind::ALL {
                    let (out, us) = log.measure(gate.name(), || ctx.eval_bin_gate(gate, &x, &y))?;
                    row.insert(format!("{}_us", gate.name()), us);
                    outputs.push(Tracked::new(
                        format!("gate_{}", gate.name()),
                        out,
                        Plaintext::Bit(gate.eval(x_bit, y_bit)),
                    ));
                }

                let (out, not_us) = log.measure("not", || ctx.eval_not(&x))?;
                row.insert("not_us", not_us);
                outputs.push(Tracked::new("not", out, Plaintext::Bit(!x_bit)));

                let ((sum, carry_out), adder_us) =
                    log.measure("full_adder", || full_adder(ctx, &x, &y, &carry))?;
                (x_bit, carry_bit) = full_adder_bits(x_bit, y_bit, carry_bit);
                (x, carry) = (sum, carry_out);
                row.insert("full_adder_us", adder_us);

                sink.write_row(&row)?;
            }

            outputs.push(Tracked::new("full_adder_sum", x, Plaintext::Bit(x_bit)));
            outputs.push(Tracked::new("full_adder_carry", carry, Plaintext::Bit(carry_bit)));
            Ok(outputs)
        })?;
        report.files.push(path);
        Ok(tracked)
    }

    pub(super) fn verify_case(
        &self,
        ctx: &Ctx<B>,
        keys: &Keys<B>,
        round_trips: Vec<RoundTrip>,
        tracked: Vec<Tracked<Ct<B>>>,
        report: &mut SuiteReport,
    ) -> Result<VerificationReport> {
        let tolerance = self.settings.tolerance_for(&self.profile);
        let mut verification = VerificationReport::new();
        for rt in round_trips {
            verification.push(Check::compare(
                rt.name,
                rt.expected,
                rt.actual,
                tolerance,
                Some(rt.decrypt_us),
            ));
        }

        let mut log = TimingLog::new();
        for t in tracked {
            let check = match log.measure("decrypt", || ctx.decrypt(keys, &t.ciphertext)) {
                Ok((actual, us)) => Check::compare(t.name, t.expected, actual, tolerance, Some(us)),
                Err(error) => Check::undecryptable(t.name, t.expected, error),
            };
            verification.push(check);
        }

        let path = self.result_path(Phase::Verify)?;
        let header = columns(["check", "passed", "max_abs_error", "decrypt_us", "detail"]);
        with_sink(&path, header, |sink| {
            for check in verification.checks() {
                let row = Row::new()
                    .set("check", &check.name)
                    .set("passed", check.passed())
                    .set(
                        "max_abs_error",
                        check
                            .max_abs_error
                            .map_or_else(|| SKIPPED.to_owned(), |e| format!("{e:e}")),
                    )
                    .set(
                        "decrypt_us",
                        check
                            .decrypt_us
                            .map_or_else(|| SKIPPED.to_owned(), |us| us.to_string()),
                    )
                    .set(
                        "detail",
                        check
                            .failure
                            .as_ref()
                            .map_or_else(|| "ok".to_owned(), |f| f.reason.clone()),
                    );
                sink.write_row(&row)?;
            }
            Ok(())
        })?;
        report.files.push(path);
        self.log_summary(Phase::Verify, &log);

        for failure in verification.failures() {
            warn!(variant = %self.profile, check = %failure.check, reason = %failure.reason, "verification failed");
        }
        info!(
            variant = %self.profile,
            %tolerance,
            checks = verification.checks().len(),
            passed = verification.checks().iter().filter(|c| c.passed()).count(),
            "verification finished"
        );
        Ok(verification)
    }
}
