//! linear_model.rs - standardised linear / logistic scorer
//!
//! Weights, means and stds are keyed by feature name in the manifest and are
//! resolved to column order once, at load time.

use std::collections::HashMap;

use ndarray::{Array1, Array2};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::GuideError;
use crate::models::{FeatureVector, Mode};
use crate::prediction_tools::ScoringModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Identity,
    Logistic,
}

/// Parameters stored in a model manifest
#[derive(Debug, Clone, Default, Deserialize)]
struct ModelData {
    #[serde(default)]
    weights: HashMap<String, f64>,
    #[serde(default)]
    means: HashMap<String, f64>,
    #[serde(default)]
    stds: HashMap<String, f64>,
    #[serde(default)]
    intercept: f64,
}

#[derive(Debug, Clone)]
pub struct LinearModel {
    name: String,
    features: Vec<String>,
    weights: Array1<f64>,
    means: Array1<f64>,
    stds: Array1<f64>,
    intercept: f64,
    link: Link,
}

//───────────────────────────────── helpers ─────────────────────────────────//

/// Align a name-keyed map to `features`; absent names take `default`.
/// Names that are not features are a config error.
fn column_values(
    model: &str,
    what: &str,
    map: &HashMap<String, f64>,
    features: &[String],
    default: f64,
) -> Result<Array1<f64>, GuideError> {
    if let Some(unknown) = map.keys().find(|k| !features.contains(k)) {
        return Err(GuideError::Config(format!(
            "model '{}': {} given for unknown feature '{}'",
            model, what, unknown
        )));
    }
    Ok(features
        .iter()
        .map(|f| map.get(f).copied().unwrap_or(default))
        .collect())
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl LinearModel {
    pub fn new(
        name: impl Into<String>,
        features: Vec<String>,
        weights: Vec<f64>,
        intercept: f64,
        link: Link,
    ) -> Result<Self, GuideError> {
        let name = name.into();
        if weights.len() != features.len() {
            return Err(GuideError::Config(format!(
                "model '{}': {} weights for {} features",
                name,
                weights.len(),
                features.len()
            )));
        }
        let p = features.len();
        Ok(LinearModel {
            name,
            features,
            weights: Array1::from(weights),
            means: Array1::zeros(p),
            stds: Array1::ones(p),
            intercept,
            link,
        })
    }

    pub fn from_manifest(
        name: String,
        features: Vec<String>,
        link: Link,
        manifest: &str,
    ) -> Result<Self, GuideError> {
        let data: ModelData = serde_json::from_str(manifest)
            .map_err(|e| GuideError::Config(format!("model '{}': {}", name, e)))?;

        let weights = column_values(&name, "weight", &data.weights, &features, 0.0)?;
        let means = column_values(&name, "mean", &data.means, &features, 0.0)?;
        let stds = column_values(&name, "std", &data.stds, &features, 1.0)?;
        if let Some((i, _)) = stds.iter().enumerate().find(|(_, s)| **s <= 0.0 || !s.is_finite()) {
            return Err(GuideError::Config(format!(
                "model '{}': std for '{}' must be positive",
                name, features[i]
            )));
        }

        debug!("{}: {} weights, intercept {}", name, data.weights.len(), data.intercept);
        Ok(LinearModel {
            name,
            features,
            weights,
            means,
            stds,
            intercept: data.intercept,
            link,
        })
    }
}

impl ScoringModel for LinearModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn feature_names(&self) -> &[String] {
        &self.features
    }

    fn score(&self, mode: Mode, batch: &[FeatureVector]) -> Result<Vec<f64>, GuideError> {
        let n = batch.len();
        let p = self.features.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        if let Some(bad) = batch.iter().find(|v| v.values.len() != p) {
            return Err(GuideError::Model(format!(
                "{}: vector for candidate {} has {} values, expected {}",
                self.name,
                bad.candidate,
                bad.values.len(),
                p
            )));
        }

        let flat: Vec<f64> = batch.iter().flat_map(|v| v.values.iter().copied()).collect();
        let x = Array2::from_shape_vec((n, p), flat)
            .map_err(|e| GuideError::Model(format!("{}: {}", self.name, e)))?;

        // z-score with the training statistics, then w·z + b
        let z = (x - &self.means) / &self.stds;
        let linear = z.dot(&self.weights) + self.intercept;

        info!("Scored {} {} guides with {}", n, mode.label(), self.name);
        Ok(match self.link {
            Link::Identity => linear.to_vec(),
            Link::Logistic => linear.mapv(sigmoid).to_vec(),
        })
    }
}
