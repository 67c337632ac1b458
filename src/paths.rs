//! Result file locations: `<root>/<Kind>Results/<Case><Suffix>.csv`.

use std::path::{Path, PathBuf};

use crate::error::{BenchError, Result};
use crate::profile::SchemeKind;

/// Validated coordinates of one result table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultPath {
    root: PathBuf,
    scheme: SchemeKind,
    case: String,
    suffix: String,
}

fn is_valid_component(s: &str, allow_empty: bool) -> bool {
    (allow_empty || !s.is_empty())
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        && !s.starts_with('.')
}

/// Replaces anything outside `[A-Za-z0-9_-]` with `-`.
#[must_use]
pub fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

impl ResultPath {
    /// # Errors
    ///
    /// `InvalidPathComponent` when `case` is empty or either component holds
    /// characters outside `[A-Za-z0-9_.-]` or starts with a dot.
    pub fn new(
        root: impl Into<PathBuf>,
        scheme: SchemeKind,
        case: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Result<Self> {
        let case = case.into();
        let suffix = suffix.into();
        if !is_valid_component(&case, false) {
            return Err(BenchError::InvalidPathComponent { component: case });
        }
        if !is_valid_component(&suffix, true) {
            return Err(BenchError::InvalidPathComponent { component: suffix });
        }
        Ok(Self {
            root: root.into(),
            scheme,
            case,
            suffix,
        })
    }

    /// `<root>/<Kind>Results`
    #[must_use]
    pub fn directory(&self) -> PathBuf {
        self.root.join(self.scheme.results_dir())
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}{}.csv", self.case, self.suffix)
    }

    #[must_use]
    pub fn to_path_buf(&self) -> PathBuf {
        self.directory().join(self.file_name())
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}
