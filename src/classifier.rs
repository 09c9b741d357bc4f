//! Pre-trained crop classifier
//!
//! The recommender treats the model as a black box behind [`Classifier`].
//! The shipped artifact is a multinomial logistic model exported to JSON:
//! eight standardized numeric features plus a one-hot drainage block,
//! scored per class and normalized with a softmax.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::models::{FEATURE_NAMES, SoilSample};

const NUMERIC_FEATURES: usize = 8;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("model expects features {expected:?}, sample provides {actual:?}")]
    FeatureMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("drainage category '{0}' is not known to the model")]
    UnknownCategory(String),

    #[error("non-finite {0} during inference")]
    NonFinite(&'static str),
}

/// Class-probability inference over a single soil sample
pub trait Classifier {
    /// Class labels, in the order probabilities are returned
    fn classes(&self) -> &[String];

    /// One probability per entry of [`Classifier::classes`], summing to 1
    fn predict_proba(&self, sample: &SoilSample) -> Result<Vec<f64>, ModelError>;

    /// Short description for diagnostics
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum ModelArtifact {
    MultinomialLogistic(LogisticModel),
}

/// Multinomial logistic regression exported from the training pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct LogisticModel {
    pub classes: Vec<String>,
    pub features: Vec<String>,
    pub drainage_levels: Vec<String>,
    #[serde(default)]
    pub mean: Option<Vec<f64>>,
    #[serde(default)]
    pub scale: Option<Vec<f64>>,
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

/// Load a model artifact from disk
pub fn load_model(path: &Path) -> Result<LogisticModel> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read model {}", path.display()))?;
    let artifact: ModelArtifact = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse model {}", path.display()))?;
    let ModelArtifact::MultinomialLogistic(model) = artifact;

    tracing::info!(
        path = %path.display(),
        classes = model.classes.len(),
        "loaded crop model"
    );
    Ok(model)
}

impl LogisticModel {
    fn encode(&self, sample: &SoilSample) -> Result<Vec<f64>, ModelError> {
        if self.features.len() != FEATURE_NAMES.len()
            || self.features.iter().zip(FEATURE_NAMES).any(|(a, b)| a != b)
        {
            return Err(ModelError::FeatureMismatch {
                expected: self.features.clone(),
                actual: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            });
        }

        let mut row = sample.numeric_features().to_vec();
        if row.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite("input feature"));
        }

        if let (Some(mean), Some(scale)) = (&self.mean, &self.scale) {
            if mean.len() != NUMERIC_FEATURES || scale.len() != NUMERIC_FEATURES {
                return Err(ModelError::Shape(format!(
                    "standardization needs {} values, got mean={} scale={}",
                    NUMERIC_FEATURES,
                    mean.len(),
                    scale.len()
                )));
            }
            for ((value, m), s) in row.iter_mut().zip(mean).zip(scale) {
                // zero-variance columns pass through centered
                *value = if *s == 0.0 { *value - m } else { (*value - m) / s };
            }
        }

        let drainage = sample.drainage.as_str();
        let hot = self
            .drainage_levels
            .iter()
            .position(|level| level == drainage)
            .ok_or_else(|| ModelError::UnknownCategory(drainage.to_string()))?;
        row.extend((0..self.drainage_levels.len()).map(|i| if i == hot { 1.0 } else { 0.0 }));

        Ok(row)
    }
}

impl Classifier for LogisticModel {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn predict_proba(&self, sample: &SoilSample) -> Result<Vec<f64>, ModelError> {
        if self.coefficients.len() != self.classes.len()
            || self.intercepts.len() != self.classes.len()
        {
            return Err(ModelError::Shape(format!(
                "{} classes but {} coefficient rows and {} intercepts",
                self.classes.len(),
                self.coefficients.len(),
                self.intercepts.len()
            )));
        }

        let row = self.encode(sample)?;

        let mut scores = Vec::with_capacity(self.classes.len());
        for (weights, intercept) in self.coefficients.iter().zip(&self.intercepts) {
            if weights.len() != row.len() {
                return Err(ModelError::Shape(format!(
                    "coefficient row has {} weights for {} encoded features",
                    weights.len(),
                    row.len()
                )));
            }
            let score: f64 = weights.iter().zip(&row).map(|(w, x)| w * x).sum::<f64>() + intercept;
            scores.push(score);
        }

        softmax(&scores)
    }

    fn describe(&self) -> String {
        format!(
            "multinomial-logistic ({} classes, {} features)",
            self.classes.len(),
            self.features.len()
        )
    }
}

fn softmax(scores: &[f64]) -> Result<Vec<f64>, ModelError> {
    if scores.is_empty() {
        return Err(ModelError::Shape("model has no classes".to_string()));
    }
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return Err(ModelError::NonFinite("class score"));
    }

    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    Ok(exps.into_iter().map(|e| e / total).collect())
}
