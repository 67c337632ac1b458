//! Append-only CSV result tables.
//!
//! A [`ResultSink`] owns one output file. The header is written on
//! [`ResultSink::open`]; every later row must supply a cell for each declared
//! column, so the file can never end up with ragged rows.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, Writer, WriterBuilder};
use itertools::Itertools;
use tracing::debug;

use crate::error::{BenchError, Result};

/// Placeholder for a cell that was intentionally not measured.
pub const SKIPPED: &str = "-";

const DELIMITER: u8 = b',';

/// Column → value mapping for one table row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Row {
    values: BTreeMap<String, String>,
}

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl ToString) -> Self {
        self.insert(column, value);
        self
    }

    /// Marks `column` as intentionally empty.
    #[must_use]
    pub fn skip(self, column: impl Into<String>) -> Self {
        self.set(column, SKIPPED)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl ToString) {
        self.values.insert(column.into(), value.to_string());
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }
}

/// Percent-escapes a cell that would otherwise break the row layout.
#[must_use]
pub fn escape_cell(value: &str) -> Cow<'_, str> {
    if !value.contains([char::from(DELIMITER), '\n', '\r']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            ',' => out.push_str("%2C"),
            '\n' => out.push_str("%0A"),
            '\r' => out.push_str("%0D"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Single-writer CSV table with a fixed, ordered header.
pub struct ResultSink {
    path: PathBuf,
    columns: Vec<String>,
    writer: Option<Writer<File>>,
    rows: usize,
}

impl ResultSink {
    /// Creates (or truncates) `path` and writes the header line.
    ///
    /// # Errors
    ///
    /// `Io` if the parent directory is missing or the file cannot be created,
    /// `Schema` for an empty or duplicated header.
    pub fn open<I, S>(path: impl AsRef<Path>, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = path.as_ref().to_path_buf();
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(BenchError::Schema {
                path,
                column: String::new(),
            });
        }
        if let Some(dup) = columns.iter().duplicates().next() {
            return Err(BenchError::Schema {
                path,
                column: dup.clone(),
            });
        }

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if !parent.is_dir() {
            return Err(BenchError::io(
                &path,
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("parent directory {} does not exist", parent.display()),
                ),
            ));
        }

        let file = File::create(&path).map_err(|e| BenchError::io(&path, e))?;
        let mut writer = WriterBuilder::new()
            .delimiter(DELIMITER)
            .quote_style(QuoteStyle::Never)
            .from_writer(file);
        writer
            .write_record(columns.iter().map(|c| escape_cell(c).into_owned()))
            .map_err(|source| BenchError::Csv {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            columns,
            writer: Some(writer),
            rows: 0,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of data rows written so far.
    #[must_use]
    pub fn rows_written(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Appends one complete row.
    ///
    /// # Errors
    ///
    /// `Schema` when the row names an undeclared column, `IncompleteRow` when a
    /// declared column has no value, `Io`/`Csv` on write failure or after close.
    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        if let Some(column) = row
            .values
            .keys()
            .find(|k| !self.columns.iter().any(|c| c == *k))
        {
            return Err(BenchError::Schema {
                path: self.path.clone(),
                column: column.clone(),
            });
        }
        let missing: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !row.values.contains_key(c.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(BenchError::IncompleteRow {
                path: self.path.clone(),
                missing,
            });
        }

        let Some(writer) = self.writer.as_mut() else {
            return Err(BenchError::io(
                &self.path,
                io::Error::new(io::ErrorKind::BrokenPipe, "sink already closed"),
            ));
        };
        let record: Vec<Cow<'_, str>> = self
            .columns
            .iter()
            .map(|c| escape_cell(&row.values[c.as_str()]))
            .collect();
        writer
            .write_record(record.iter().map(AsRef::<str>::as_ref))
            .map_err(|source| BenchError::Csv {
                path: self.path.clone(),
                source,
            })?;
        self.rows += 1;
        debug!(path = %self.path.display(), row = self.rows, "row written");
        Ok(())
    }

    /// Flushes and releases the file. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// `Io` if the final flush fails.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| BenchError::io(&self.path, e))?;
        }
        Ok(())
    }
}

impl Drop for ResultSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("KeyGen.csv");
        let mut sink = ResultSink::open(&path, ["iteration", "keygen_us"]).unwrap();
        sink.write_row(&Row::new().set("iteration", 0).set("keygen_us", 125))
            .unwrap();
        sink.write_row(&Row::new().set("keygen_us", 99).set("iteration", 1))
            .unwrap();
        sink.close().unwrap();
        assert_eq!(read(&path), "iteration,keygen_us\n0,125\n1,99\n");
        assert_eq!(sink.rows_written(), 2);
    }

    #[test]
    fn missing_parent_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("x.csv");
        let err = ResultSink::open(&path, ["a"]).err().unwrap();
        assert!(matches!(err, BenchError::Io { .. }), "{err}");
    }

    #[test]
    fn open_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(&path, "stale,data\n1,2\n3,4\n").unwrap();
        let mut sink = ResultSink::open(&path, ["a"]).unwrap();
        sink.close().unwrap();
        assert_eq!(read(&path), "a\n");
    }

    #[test]
    fn incomplete_row_rejected_and_nothing_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ops.csv");
        let mut sink = ResultSink::open(&path, ["iteration", "mult_us", "divide_us"]).unwrap();
        let err = sink
            .write_row(&Row::new().set("iteration", 0).set("mult_us", 3))
            .unwrap_err();
        match err {
            BenchError::IncompleteRow { missing, .. } => assert_eq!(missing, vec!["divide_us"]),
            other => panic!("unexpected {other}"),
        }
        sink.write_row(
            &Row::new()
                .set("iteration", 0)
                .set("mult_us", 3)
                .skip("divide_us"),
        )
        .unwrap();
        sink.close().unwrap();
        let text = read(&path);
        for line in text.lines() {
            assert_eq!(line.split(',').count(), 3, "ragged line {line:?}");
        }
        assert_eq!(text, "iteration,mult_us,divide_us\n0,3,-\n");
    }

    #[test]
    fn unknown_column_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ResultSink::open(dir.path().join("s.csv"), ["a"]).unwrap();
        let err = sink
            .write_row(&Row::new().set("a", 1).set("b", 2))
            .unwrap_err();
        assert!(matches!(err, BenchError::Schema { ref column, .. } if column == "b"));
        assert!(err.is_contract_violation());
    }

    #[test]
    fn duplicate_header_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = ResultSink::open(dir.path().join("d.csv"), ["a", "b", "a"])
            .err()
            .unwrap();
        assert!(matches!(err, BenchError::Schema { ref column, .. } if column == "a"));
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ResultSink::open(dir.path().join("c.csv"), ["a"]).unwrap();
        sink.close().unwrap();
        sink.close().unwrap();
        assert!(sink.is_closed());
        assert!(sink.write_row(&Row::new().set("a", 1)).is_err());
    }

    #[test]
    fn delimiter_is_percent_escaped() {
        assert_eq!(escape_cell("123"), "123");
        assert_eq!(escape_cell("50%"), "50%");
        assert_eq!(escape_cell("a,b"), "a%2Cb");
        assert_eq!(escape_cell("5%,x\n"), "5%25%2Cx%0A");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e.csv");
        let mut sink = ResultSink::open(&path, ["check", "detail"]).unwrap();
        sink.write_row(&Row::new().set("check", "add").set("detail", "got [1, 2]"))
            .unwrap();
        sink.close().unwrap();
        assert_eq!(read(&path), "check,detail\nadd,got [1%2C 2]\n");
    }

    #[test]
    fn drop_flushes_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.csv");
        {
            let mut sink = ResultSink::open(&path, ["a"]).unwrap();
            sink.write_row(&Row::new().set("a", 7)).unwrap();
        }
        assert_eq!(read(&path), "a\n7\n");
    }
}
