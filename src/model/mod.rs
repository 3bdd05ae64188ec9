//! Fitted churn classifier and its training data.
//!
//! The model is a standardized logistic regression over named numeric
//! features. It serializes to a self-contained JSON document, which is the
//! artifact format stored by trainers and loaded by the serving layer.

mod dataset;
mod evaluation;

pub use dataset::Dataset;
pub use evaluation::{accuracy, roc_auc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// One flat input record: field name to JSON value.
pub type Record = serde_json::Map<String, Value>;

const ARTIFACT_FORMAT: u32 = 1;

/// Gradient-descent settings for [`ChurnModel::fit`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitParams {
    /// Full-batch gradient steps
    pub iterations: usize,
    /// Step size
    pub learning_rate: f64,
    /// L2 penalty on weights
    pub l2: f64,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            iterations: 500,
            learning_rate: 0.1,
            l2: 0.0,
        }
    }
}

/// Standardized logistic regression classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnModel {
    format: u32,
    feature_names: Vec<String>,
    means: Vec<f64>,
    scales: Vec<f64>,
    weights: Vec<f64>,
    bias: f64,
    threshold: f64,
}

impl ChurnModel {
    /// Fit a model on `dataset`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty dataset or a non-positive learning rate.
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(dataset: &Dataset, params: &FitParams) -> Result<Self> {
        if dataset.is_empty() {
            return Err(Error::InvalidInput("cannot fit on an empty dataset".to_string()));
        }
        if !(params.learning_rate.is_finite() && params.learning_rate > 0.0) {
            return Err(Error::InvalidInput(format!(
                "learning rate must be positive, got {}",
                params.learning_rate
            )));
        }

        let n = dataset.len() as f64;
        let dims = dataset.feature_names().len();

        let mut means = vec![0.0; dims];
        for row in dataset.rows() {
            for (m, x) in means.iter_mut().zip(row) {
                *m += x / n;
            }
        }
        let mut scales = vec![0.0; dims];
        for row in dataset.rows() {
            for ((s, x), m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (x - m).powi(2) / n;
            }
        }
        for s in &mut scales {
            *s = if *s > 1e-12 { s.sqrt() } else { 1.0 };
        }

        let standardized: Vec<Vec<f64>> = dataset
            .rows()
            .iter()
            .map(|row| standardize(row, &means, &scales))
            .collect();

        let mut weights = vec![0.0; dims];
        let mut bias = 0.0;
        let mut grad = vec![0.0; dims];
        for _ in 0..params.iterations {
            grad.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_bias = 0.0;
            for (x, &y) in standardized.iter().zip(dataset.labels()) {
                let err = sigmoid(linear(&weights, bias, x)) - f64::from(y);
                for (g, xi) in grad.iter_mut().zip(x) {
                    *g += err * xi;
                }
                grad_bias += err;
            }
            for (w, g) in weights.iter_mut().zip(&grad) {
                *w -= params.learning_rate * (g / n + params.l2 * *w);
            }
            bias -= params.learning_rate * grad_bias / n;
        }

        Ok(Self {
            format: ARTIFACT_FORMAT,
            feature_names: dataset.feature_names().to_vec(),
            means,
            scales,
            weights,
            bias,
            threshold: 0.5,
        })
    }

    /// Feature names the model expects in every record.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Positive-class probability for already-vectorized rows.
    #[must_use]
    pub fn predict_rows(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter()
            .map(|row| {
                let x = standardize(row, &self.means, &self.scales);
                sigmoid(linear(&self.weights, self.bias, &x))
            })
            .collect()
    }

    /// Positive-class probability per record, in input order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` naming the first record with a missing or
    /// non-numeric feature.
    pub fn predict_proba(&self, records: &[Record]) -> Result<Vec<f64>> {
        let rows = records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                self.feature_names
                    .iter()
                    .map(|name| feature_value(record, name, index))
                    .collect::<Result<Vec<f64>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.predict_rows(&rows))
    }

    /// Class label (0 or 1) per record, in input order.
    ///
    /// # Errors
    ///
    /// Same as [`ChurnModel::predict_proba`].
    pub fn predict(&self, records: &[Record]) -> Result<Vec<u8>> {
        Ok(self
            .predict_proba(records)?
            .into_iter()
            .map(|p| u8::from(p >= self.threshold))
            .collect())
    }

    /// Encode as a self-contained artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode and validate an artifact produced by [`ChurnModel::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns `Json` for undecodable bytes and `InvalidInput` for an unknown
    /// format version or inconsistent parameter vectors.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let model: Self = serde_json::from_slice(bytes)?;
        if model.format != ARTIFACT_FORMAT {
            return Err(Error::InvalidInput(format!(
                "unsupported model artifact format {}",
                model.format
            )));
        }
        let dims = model.feature_names.len();
        if model.means.len() != dims || model.scales.len() != dims || model.weights.len() != dims
        {
            return Err(Error::InvalidInput(
                "model artifact has inconsistent parameter lengths".to_string(),
            ));
        }
        Ok(model)
    }
}

/// Read one numeric feature from a record; booleans count as 0/1.
pub(crate) fn feature_value(record: &Record, name: &str, index: usize) -> Result<f64> {
    match record.get(name) {
        None | Some(Value::Null) => Err(Error::InvalidInput(format!(
            "record {index} is missing field '{name}'"
        ))),
        Some(Value::Bool(b)) => Ok(if *b { 1.0 } else { 0.0 }),
        Some(Value::Number(number)) => number.as_f64().ok_or_else(|| {
            Error::InvalidInput(format!("record {index}: field '{name}' is not a finite number"))
        }),
        Some(other) => Err(Error::InvalidInput(format!(
            "record {index}: field '{name}' must be numeric, got {other}"
        ))),
    }
}

fn standardize(row: &[f64], means: &[f64], scales: &[f64]) -> Vec<f64> {
    row.iter()
        .zip(means)
        .zip(scales)
        .map(|((x, m), s)| (x - m) / s)
        .collect()
}

fn linear(weights: &[f64], bias: f64, x: &[f64]) -> f64 {
    weights.iter().zip(x).map(|(w, xi)| w * xi).sum::<f64>() + bias
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
