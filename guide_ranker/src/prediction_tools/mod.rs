//! Scoring models. The pipeline treats a model as an opaque batch function;
//! this module loads the concrete ones from JSON manifests.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::GuideError;
use crate::models::{FeatureVector, Mode};

pub mod external_model;
pub mod linear_model;

pub use external_model::ExternalModel;
pub use linear_model::{LinearModel, Link};

/// Batch scorer for one mode.
///
/// `score` must return exactly one value per input vector, in input order,
/// and must not depend on anything but its input.
pub trait ScoringModel: Send + Sync {
    fn name(&self) -> &str;

    /// Feature names, in the column order `score` expects.
    fn feature_names(&self) -> &[String];

    fn score(&self, mode: Mode, batch: &[FeatureVector]) -> Result<Vec<f64>, GuideError>;

    /// Combined scores plus one score vector per underlying model.
    fn score_members(&self, mode: Mode, batch: &[FeatureVector]) -> Result<BatchScores, GuideError> {
        let combined = self.score(mode, batch)?;
        Ok(BatchScores {
            members: vec![(self.name().to_string(), combined.clone())],
            combined,
        })
    }
}

/// Scores for one batch. `combined` ranks the guides; `members` keeps every
/// model's own prediction, in load order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchScores {
    pub combined: Vec<f64>,
    pub members: Vec<(String, Vec<f64>)>,
}

#[derive(Debug, Deserialize)]
struct ManifestHeader {
    name: Option<String>,
    mode: Mode,
    features: Vec<String>,
    kind: String,
}

/// Load a single model manifest and check it was built for `mode`.
pub fn load_manifest(path: &Path, mode: Mode) -> Result<Box<dyn ScoringModel>, GuideError> {
    let text = fs::read_to_string(path)
        .map_err(|e| GuideError::Config(format!("cannot read model {}: {}", path.display(), e)))?;
    let header: ManifestHeader = serde_json::from_str(&text)
        .map_err(|e| GuideError::Config(format!("invalid model manifest {}: {}", path.display(), e)))?;

    if header.mode != mode {
        return Err(GuideError::Config(format!(
            "model {} is a {} model, run is {}",
            path.display(),
            header.mode,
            mode
        )));
    }
    let name = header.name.unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string())
    });

    let model: Box<dyn ScoringModel> = match header.kind.as_str() {
        "linear" => Box::new(LinearModel::from_manifest(name, header.features, Link::Identity, &text)?),
        "logistic" => Box::new(LinearModel::from_manifest(name, header.features, Link::Logistic, &text)?),
        "external" => Box::new(ExternalModel::from_manifest(name, header.features, &text, path)?),
        other => {
            return Err(GuideError::Config(format!(
                "model {}: unknown kind '{}'",
                path.display(),
                other
            )))
        }
    };
    info!("Loaded model: {} ({} features)", model.name(), model.feature_names().len());
    Ok(model)
}

/// Load every `*.json` manifest in `dir`, in file name order. One manifest
/// yields that model; several yield an [`Ensemble`].
pub fn load_models(dir: &Path, mode: Mode) -> Result<Box<dyn ScoringModel>, GuideError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| GuideError::Config(format!("cannot list {}: {}", dir.display(), e)))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| GuideError::Config(e.to_string()))?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    if paths.is_empty() {
        return Err(GuideError::Config(format!("no model manifests in {}", dir.display())));
    }

    let mut models = paths
        .iter()
        .map(|p| load_manifest(p, mode))
        .collect::<Result<Vec<_>, _>>()?;
    info!("Total models loaded: {} from {}", models.len(), dir.display());

    if models.len() == 1 {
        return Ok(models.remove(0));
    }
    Ok(Box::new(Ensemble::new(models)?))
}

/// Mean of several models that share one feature layout.
pub struct Ensemble {
    name: String,
    members: Vec<Box<dyn ScoringModel>>,
}

impl Ensemble {
    pub fn new(members: Vec<Box<dyn ScoringModel>>) -> Result<Self, GuideError> {
        let first = members
            .first()
            .ok_or_else(|| GuideError::Config("ensemble needs at least one model".into()))?;
        for m in &members[1..] {
            if m.feature_names() != first.feature_names() {
                return Err(GuideError::Config(format!(
                    "models '{}' and '{}' declare different feature layouts",
                    first.name(),
                    m.name()
                )));
            }
        }
        let name = members
            .iter()
            .map(|m| m.name())
            .collect::<Vec<_>>()
            .join("+");
        Ok(Ensemble { name, members })
    }
}

impl ScoringModel for Ensemble {
    fn name(&self) -> &str {
        &self.name
    }

    fn feature_names(&self) -> &[String] {
        self.members[0].feature_names()
    }

    fn score(&self, mode: Mode, batch: &[FeatureVector]) -> Result<Vec<f64>, GuideError> {
        Ok(self.score_members(mode, batch)?.combined)
    }

    fn score_members(&self, mode: Mode, batch: &[FeatureVector]) -> Result<BatchScores, GuideError> {
        let mut total = vec![0.0; batch.len()];
        let mut members = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let scores = member.score(mode, batch)?;
            if scores.len() != batch.len() {
                return Err(GuideError::Model(format!(
                    "{} returned {} scores for {} vectors",
                    member.name(),
                    scores.len(),
                    batch.len()
                )));
            }
            for (t, s) in total.iter_mut().zip(&scores) {
                *t += s;
            }
            members.push((member.name().to_string(), scores));
        }
        let n = self.members.len() as f64;
        Ok(BatchScores {
            combined: total.into_iter().map(|t| t / n).collect(),
            members,
        })
    }
}
