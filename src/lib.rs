//! he-bench ― microbenchmark harness for homomorphic-encryption primitives
//!
//! Times key generation, encryption, decryption and homomorphic evaluation for
//! BFV, BGV, CKKS and boolean-gate variants, writes one CSV table per case and
//! checks the decrypted results apart from the timing data.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

pub mod capability;
pub mod config;
pub mod driver;
pub mod error;
pub mod gates;
pub mod paths;
pub mod profile;
pub mod sink;
pub mod suite;
pub mod timing;
pub mod verify;

pub use capability::{Backend, CryptoContext, SimulatedBackend};
pub use config::{RunConfig, VariantConfig};
pub use driver::{Driver, RunReport, VariantOutcome, VariantStatus};
pub use error::{BenchError, Result};
pub use profile::{SchemeKind, SchemeProfile, SecurityLevel};
pub use sink::{ResultSink, Row};
pub use suite::{BenchmarkSuite, Phase, SuiteSettings};
pub use timing::{timed, TimingLog};
pub use verify::VerificationReport;
