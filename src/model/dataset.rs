//! Tabular dataset built from flat JSON records.

use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{feature_value, Record};
use crate::{Error, Result};

/// Numeric feature matrix with binary labels.
///
/// Feature columns are every non-target key of the first record, in sorted
/// order; every other record must provide the same columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    feature_names: Vec<String>,
    rows: Vec<Vec<f64>>,
    labels: Vec<u8>,
}

impl Dataset {
    /// Build a dataset from records, using `target` as the 0/1 label.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty record list, a missing or
    /// non-binary target, or missing/non-numeric feature values.
    pub fn from_records(records: &[Record], target: &str) -> Result<Self> {
        let first = records
            .first()
            .ok_or_else(|| Error::InvalidInput("dataset has no records".to_string()))?;

        let mut feature_names: Vec<String> =
            first.keys().filter(|k| *k != target).cloned().collect();
        feature_names.sort();
        if feature_names.is_empty() {
            return Err(Error::InvalidInput(
                "dataset has no feature columns".to_string(),
            ));
        }

        let mut rows = Vec::with_capacity(records.len());
        let mut labels = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            labels.push(label_value(record, target, index)?);
            rows.push(
                feature_names
                    .iter()
                    .map(|name| feature_value(record, name, index))
                    .collect::<Result<Vec<f64>>>()?,
            );
        }

        Ok(Self {
            feature_names,
            rows,
            labels,
        })
    }

    /// Load a JSON array of records from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not an array of objects.
    pub fn load_json(path: impl AsRef<Path>, target: &str) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let records: Vec<Record> = serde_json::from_slice(&bytes)?;
        Self::from_records(&records, target)
    }

    /// Feature column names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Feature rows, one per record.
    #[must_use]
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Labels, aligned with `rows`.
    #[must_use]
    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Seeded random subset of `n` rows; the whole dataset if `n >= len`.
    #[must_use]
    pub fn sample(&self, n: usize, seed: u64) -> Self {
        if n >= self.len() {
            return self.clone();
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut indices = rand::seq::index::sample(&mut rng, self.len(), n).into_vec();
        indices.sort_unstable();
        self.select(&indices)
    }

    /// Seeded shuffle split into `(train, test)`.
    ///
    /// The test side gets `ceil(len * test_fraction)` rows, clamped so both
    /// sides keep at least one row.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for fewer than two rows or a fraction outside `(0, 1)`.
    pub fn train_test_split(&self, test_fraction: f64, seed: u64) -> Result<(Self, Self)> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(Error::InvalidInput(format!(
                "test fraction must be in (0, 1), got {test_fraction}"
            )));
        }
        if self.len() < 2 {
            return Err(Error::InvalidInput(format!(
                "need at least 2 rows to split, got {}",
                self.len()
            )));
        }

        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let test_len = ((self.len() as f64) * test_fraction).ceil() as usize;
        let test_len = test_len.clamp(1, self.len() - 1);

        let (test, train) = indices.split_at(test_len);
        Ok((self.select(train), self.select(test)))
    }

    fn select(&self, indices: &[usize]) -> Self {
        Self {
            feature_names: self.feature_names.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}

fn label_value(record: &Record, target: &str, index: usize) -> Result<u8> {
    let value = feature_value(record, target, index)?;
    if value == 0.0 {
        Ok(0)
    } else if value == 1.0 {
        Ok(1)
    } else {
        Err(Error::InvalidInput(format!(
            "record {index}: target '{target}' must be 0 or 1, got {value}"
        )))
    }
}
