//! Run configuration.
//!
//! A run is a list of named variants, each a [`SchemeProfile`] plus optional
//! suite overrides on top of the scheme defaults. The list comes from a TOML
//! file or, without one, from [`RunConfig::default_variants`].

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability::DivideParams;
use crate::error::{BenchError, Result};
use crate::paths::sanitize_label;
use crate::profile::{SchemeKind, SchemeProfile, SecurityLevel};
use crate::suite::SuiteSettings;

/// Per-variant changes to [`SuiteSettings::for_scheme`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SuiteOverrides {
    pub repetitions: Option<usize>,
    pub keygen_repetitions: Option<usize>,
    pub fresh_context_per_keygen: Option<bool>,
    pub payload_sizes: Option<Vec<usize>>,
    pub ops_width: Option<usize>,
    pub reset_before_mult: Option<bool>,
    pub relin_interval: Option<u32>,
    pub divide: Option<DivideParams>,
    pub tolerance: Option<f64>,
}

impl SuiteOverrides {
    #[must_use]
    pub fn apply(&self, mut settings: SuiteSettings) -> SuiteSettings {
        if let Some(n) = self.repetitions {
            settings.repetitions = n;
        }
        if let Some(n) = self.keygen_repetitions {
            settings.keygen_repetitions = n;
        }
        if let Some(fresh) = self.fresh_context_per_keygen {
            settings.fresh_context_per_keygen = fresh;
        }
        if let Some(sizes) = &self.payload_sizes {
            settings.payload_sizes.clone_from(sizes);
        }
        if let Some(width) = self.ops_width {
            settings.ops_width = width;
        }
        if let Some(reset) = self.reset_before_mult {
            settings.reset_before_mult = reset;
        }
        if let Some(k) = self.relin_interval {
            settings.relin_interval = k;
        }
        if self.divide.is_some() {
            settings.divide = self.divide;
        }
        if self.tolerance.is_some() {
            settings.tolerance = self.tolerance;
        }
        settings
    }
}

/// One scheme variant of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantConfig {
    /// Log name; also appended to result file names when `label` is set.
    pub name: String,
    pub profile: SchemeProfile,
    #[serde(default)]
    pub label: bool,
    #[serde(default)]
    pub suite: SuiteOverrides,
}

impl VariantConfig {
    #[must_use]
    pub fn new(name: impl Into<String>, profile: SchemeProfile) -> Self {
        Self {
            name: name.into(),
            profile,
            label: false,
            suite: SuiteOverrides::default(),
        }
    }

    #[must_use]
    pub fn with_suite(mut self, suite: SuiteOverrides) -> Self {
        self.suite = suite;
        self
    }

    /// Scheme defaults with this variant's overrides applied.
    #[must_use]
    pub fn settings(&self) -> SuiteSettings {
        self.suite
            .apply(SuiteSettings::for_scheme(self.profile.kind()))
    }
}

fn default_results_root() -> PathBuf {
    PathBuf::from("results")
}

/// Everything the driver needs for one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default = "default_results_root")]
    pub results_root: PathBuf,
    /// Wall-clock budget of the whole run.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
    #[serde(default = "RunConfig::default_variants")]
    pub variants: Vec<VariantConfig>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            results_root: default_results_root(),
            deadline_secs: None,
            variants: Self::default_variants(),
        }
    }
}

impl RunConfig {
    /// The variants the harness was written for.
    #[must_use]
    pub fn default_variants() -> Vec<VariantConfig> {
        let divide = SuiteOverrides {
            divide: Some(DivideParams {
                lower: 0.1,
                upper: 10.0,
                degree: 59,
            }),
            ..SuiteOverrides::default()
        };
        let mut ckks_divide = VariantConfig::new("ckks-divide", SchemeProfile::ckks(50, 12, 8)).with_suite(divide);
        ckks_divide.label = true;
        vec![
            VariantConfig::new("bfv", SchemeProfile::bfv(65537, 20)),
            VariantConfig::new("bgv", SchemeProfile::bgv(65537, 20)),
            VariantConfig::new("ckks", SchemeProfile::ckks(50, 1, 8)),
            ckks_divide,
            VariantConfig::new("boolean", SchemeProfile::boolean(SecurityLevel::Classic128)),
        ]
    }

    /// Loads and validates a TOML run file.
    ///
    /// # Errors
    ///
    /// `Config` when the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            BenchError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// # Errors
    ///
    /// `Config` on a parse or validation failure.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BenchError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks variant names and every variant's suite settings.
    ///
    /// # Errors
    ///
    /// `Config` for an empty run, duplicate or unusable names, or invalid
    /// settings; `UnsupportedOperation` when a setting needs an operation the
    /// scheme lacks.
    pub fn validate(&self) -> Result<()> {
        if self.variants.is_empty() {
            return Err(BenchError::Config("no variants to run".into()));
        }
        let mut seen = HashSet::new();
        for variant in &self.variants {
            if sanitize_label(&variant.name).is_empty() {
                return Err(BenchError::Config("variant names must not be empty".into()));
            }
            if !seen.insert(variant.name.as_str()) {
                return Err(BenchError::Config(format!(
                    "variant `{}` is defined twice",
                    variant.name
                )));
            }
            variant.settings().validate(&variant.profile)?;
        }
        Ok(())
    }

    /// Keeps only variants of the listed schemes; an empty list keeps all.
    pub fn retain_schemes(&mut self, kinds: &[SchemeKind]) {
        if !kinds.is_empty() {
            self.variants.retain(|v| kinds.contains(&v.profile.kind()));
        }
    }

    /// Forces the repetition count of every timed case.
    pub fn override_repetitions(&mut self, repetitions: usize) {
        for variant in &mut self.variants {
            variant.suite.repetitions = Some(repetitions);
            variant.suite.keygen_repetitions = Some(repetitions);
        }
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_run_covers_every_scheme() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.results_root, PathBuf::from("results"));
        for kind in SchemeKind::ALL {
            assert!(config.variants.iter().any(|v| v.profile.kind() == kind), "{kind}");
        }
        let divide = config
            .variants
            .iter()
            .filter(|v| v.settings().divide.is_some())
            .count();
        assert_eq!(divide, 1);
    }

    #[test]
    fn parses_variants_with_overrides() {
        let config = RunConfig::from_toml(
            r#"
            results_root = "out"
            deadline_secs = 600

            [[variants]]
            name = "bfv-small"
            profile = { scheme = "bfv", multiplicative_depth = 4, plaintext_modulus = 65537 }
            suite = { repetitions = 3, payload_sizes = [1, 2] }

            [[variants]]
            name = "ckks-div"
            label = true
            [variants.profile]
            scheme = "ckks"
            multiplicative_depth = 12
            scaling_mod_size = 50
            [variants.suite]
            divide = { lower = 0.5, upper = 8.0, degree = 27 }
            "#,
        )
        .unwrap();
        assert_eq!(config.results_root, PathBuf::from("out"));
        assert_eq!(config.deadline(), Some(Duration::from_secs(600)));
        assert_eq!(config.variants.len(), 2);

        let bfv = config.variants[0].settings();
        assert_eq!(bfv.repetitions, 3);
        assert_eq!(bfv.payload_sizes, vec![1, 2]);
        assert_eq!(bfv.keygen_repetitions, 10);

        let ckks = &config.variants[1];
        assert!(ckks.label);
        assert_eq!(ckks.settings().divide.map(|d| d.degree), Some(27));
        assert!(ckks.settings().reset_before_mult);
    }

    #[test]
    fn rejects_bad_runs() {
        assert!(RunConfig::from_toml("variants = []").is_err());
        assert!(RunConfig::from_toml("unknown = 1").is_err());
        let twice = r#"
            [[variants]]
            name = "x"
            profile = { scheme = "boolean" }
            [[variants]]
            name = "x"
            profile = { scheme = "boolean" }
        "#;
        assert!(RunConfig::from_toml(twice).is_err());
        let divide_on_bfv = r#"
            [[variants]]
            name = "bfv"
            profile = { scheme = "bfv", multiplicative_depth = 2, plaintext_modulus = 65537 }
            suite = { divide = { lower = 1.0, upper = 2.0, degree = 5 } }
        "#;
        assert!(matches!(
            RunConfig::from_toml(divide_on_bfv),
            Err(BenchError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn cli_overrides() {
        let mut config = RunConfig::default();
        config.retain_schemes(&[SchemeKind::Ckks]);
        assert_eq!(config.variants.len(), 2);
        config.override_repetitions(2);
        assert!(config.variants.iter().all(|v| v.settings().repetitions == 2));
        config.retain_schemes(&[]);
        assert_eq!(config.variants.len(), 2);
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "deadline_secs = 5\n").unwrap();
        let config = RunConfig::from_file(&path).unwrap();
        assert_eq!(config.deadline_secs, Some(5));
        assert_eq!(config.variants.len(), 5);
        assert!(RunConfig::from_file(dir.path().join("missing.toml")).is_err());
    }
}
