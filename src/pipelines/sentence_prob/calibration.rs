use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Mean raw sentence score per token count, built once over a reference
/// corpus and consulted by the calibrated combination policy.
///
/// The table is immutable after construction: entries are only ever replaced
/// wholesale (via [`CalibrationTable::extend`]), never partially updated.
/// A length with no entry is a recoverable condition — [`divisor`] falls back
/// to the neutral value 1 and logs a warning.
///
/// [`divisor`]: CalibrationTable::divisor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTable {
    means: BTreeMap<usize, f64>,
}

impl CalibrationTable {
    /// A table with no entries; every lookup falls back to divisor 1.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a table directly from `(token_count, mean_raw_score)` pairs.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (usize, f64)>,
    {
        Self {
            means: entries.into_iter().collect(),
        }
    }

    /// The mean raw score recorded for `token_count`, if any.
    pub fn get(&self, token_count: usize) -> Option<f64> {
        self.means.get(&token_count).copied()
    }

    /// The divisor the calibrated policy applies for `token_count`.
    ///
    /// Missing or non-positive entries fall back to the neutral divisor 1
    /// with a warning; a non-positive mean can only come from underflowed raw
    /// scores and would map every calibrated score to infinity.
    pub fn divisor(&self, token_count: usize) -> f64 {
        match self.means.get(&token_count) {
            Some(&mean) if mean > 0.0 => mean,
            Some(&mean) => {
                tracing::warn!(
                    token_count,
                    mean,
                    "calibration entry is not a positive score; using neutral divisor"
                );
                1.0
            }
            None => {
                tracing::warn!(
                    token_count,
                    "no calibration entry for this sentence length; using neutral divisor"
                );
                1.0
            }
        }
    }

    /// Token counts the table has entries for, in ascending order.
    pub fn lengths(&self) -> impl Iterator<Item = usize> + '_ {
        self.means.keys().copied()
    }

    /// Number of distinct token counts covered.
    pub fn len(&self) -> usize {
        self.means.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }

    /// Absorbs `other`, replacing any overlapping entries with `other`'s.
    ///
    /// Entries cannot be averaged across tables (per-bucket counts are not
    /// retained), so overlap resolves by whole-entry replacement.
    pub fn extend(&mut self, other: CalibrationTable) {
        self.means.extend(other.means);
    }

    /// Loads a table previously written by [`CalibrationTable::save`].
    ///
    /// # Errors
    ///
    /// Fails if the file is unreadable or not a serialized table.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Writes the table as JSON.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Streaming builder for a [`CalibrationTable`].
///
/// Keeps one `(count, sum)` pair per distinct token count, so memory is
/// proportional to the number of distinct lengths rather than corpus size.
#[derive(Debug, Default)]
pub struct CalibrationAccumulator {
    buckets: BTreeMap<usize, (u64, f64)>,
}

impl CalibrationAccumulator {
    /// A fresh accumulator with no observations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one reference sentence's raw score under its token count.
    pub fn record(&mut self, token_count: usize, raw_score: f64) {
        let bucket = self.buckets.entry(token_count).or_insert((0, 0.0));
        bucket.0 += 1;
        bucket.1 += raw_score;
    }

    /// Finalizes the per-length arithmetic means into a table.
    pub fn finish(self) -> CalibrationTable {
        CalibrationTable {
            means: self
                .buckets
                .into_iter()
                .map(|(len, (count, sum))| (len, sum / count as f64))
                .collect(),
        }
    }
}
