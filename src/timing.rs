//! Wall-clock timing of single library calls.
//!
//! [`timed`] runs a unit of work exactly once on the monotonic clock and hands
//! back its value with the elapsed microseconds. When the work fails the error
//! is returned unchanged and no measurement is produced: a failed call has no
//! meaningful duration to report.

use std::time::Instant;

use itertools::Itertools;

/// One measured invocation. Immutable once recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimingRecord {
    pub operation: String,
    pub micros: u64,
    pub sequence: u64,
}

/// Runs `work` once and returns `(value, elapsed_us)`.
///
/// # Errors
///
/// Propagates the error of `work` untouched.
pub fn timed<T, E, F>(work: F) -> Result<(T, u64), E>
where
    F: FnOnce() -> Result<T, E>,
{
    let start = Instant::now();
    let value = work()?;
    let micros = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
    Ok((value, micros))
}

/// Ordered log of the records produced by one benchmark case.
#[derive(Debug, Default)]
pub struct TimingLog {
    records: Vec<TimingRecord>,
}

impl TimingLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Times `work` under `operation` and appends the record on success.
    ///
    /// # Errors
    ///
    /// Propagates the error of `work`; nothing is appended in that case.
    pub fn measure<T, E, F>(&mut self, operation: &str, work: F) -> Result<(T, u64), E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let (value, micros) = timed(work)?;
        self.records.push(TimingRecord {
            operation: operation.to_owned(),
            micros,
            sequence: self.records.len() as u64,
        });
        Ok((value, micros))
    }

    #[must_use]
    pub fn records(&self) -> &[TimingRecord] {
        &self.records
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Per-operation statistics, in order of first appearance.
    #[must_use]
    pub fn summary(&self) -> Vec<(String, Stats)> {
        self.records
            .iter()
            .map(|r| r.operation.as_str())
            .unique()
            .filter_map(|op| {
                let samples = self
                    .records
                    .iter()
                    .filter(|r| r.operation == op)
                    .map(|r| r.micros);
                Stats::from_samples(samples).map(|s| (op.to_owned(), s))
            })
            .collect()
    }
}

/// Descriptive statistics over microsecond samples.
#[derive(Clone, Debug, PartialEq)]
pub struct Stats {
    pub count: usize,
    pub min_us: u64,
    pub median_us: u64,
    pub mean_us: f64,
    pub max_us: u64,
}

impl Stats {
    /// `None` for an empty sample set.
    pub fn from_samples(samples: impl IntoIterator<Item = u64>) -> Option<Self> {
        let xs: Vec<u64> = samples.into_iter().sorted_unstable().collect();
        let count = xs.len();
        let (&min_us, &max_us) = (xs.first()?, xs.last()?);
        let sum: u128 = xs.iter().map(|&x| u128::from(x)).sum();
        Some(Self {
            count,
            min_us,
            median_us: xs[count / 2],
            mean_us: sum as f64 / count as f64,
            max_us,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn timed_returns_value_and_elapsed() {
        let (value, micros) = timed(|| {
            std::thread::sleep(Duration::from_millis(2));
            Ok::<_, ()>(42)
        })
        .unwrap();
        assert_eq!(value, 42);
        assert!(micros >= 2_000, "elapsed {micros}us");
    }

    #[test]
    fn timed_runs_work_exactly_once() {
        let mut calls = 0;
        let _ = timed(|| {
            calls += 1;
            Ok::<_, ()>(())
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn failure_propagates_and_suppresses_record() {
        let mut log = TimingLog::new();
        let err = log
            .measure("decrypt", || Err::<(), _>("boom"))
            .unwrap_err();
        assert_eq!(err, "boom");
        assert!(log.is_empty());

        log.measure("decrypt", || Ok::<_, &str>(())).unwrap();
        assert_eq!(log.records().len(), 1);
        assert_eq!(log.records()[0].sequence, 0);
    }

    #[test]
    fn sequence_follows_insertion() {
        let mut log = TimingLog::new();
        for op in ["add", "mult", "add"] {
            log.measure(op, || Ok::<_, ()>(())).unwrap();
        }
        let seq: Vec<_> = log.records().iter().map(|r| r.sequence).collect();
        assert_eq!(seq, vec![0, 1, 2]);
    }

    #[test]
    fn summary_groups_by_operation() {
        let mut log = TimingLog::new();
        log.measure("add", || Ok::<_, ()>(())).unwrap();
        log.measure("mult", || Ok::<_, ()>(())).unwrap();
        log.measure("add", || Ok::<_, ()>(())).unwrap();
        let summary = log.summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].0, "add");
        assert_eq!(summary[0].1.count, 2);
        assert_eq!(summary[1].0, "mult");
    }

    #[test]
    fn stats_over_samples() {
        let stats = Stats::from_samples([5, 1, 3, 9, 7]).unwrap();
        assert_eq!(stats.min_us, 1);
        assert_eq!(stats.max_us, 9);
        assert_eq!(stats.median_us, 5);
        assert!((stats.mean_us - 5.0).abs() < f64::EPSILON);
        assert!(Stats::from_samples([]).is_none());
    }
}
