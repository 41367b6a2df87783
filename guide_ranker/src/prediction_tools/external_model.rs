use std::path::{Path, PathBuf};
use std::process::Command;

use polars::prelude::*;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::error::GuideError;
use crate::helper_functions::{dataframe_to_csv, read_csv};
use crate::models::{FeatureVector, Mode};
use crate::prediction_tools::ScoringModel;

#[derive(Debug, Deserialize)]
struct ExternalSpec {
    program: PathBuf,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default = "default_score_column")]
    score_column: String,
}

fn default_score_column() -> String {
    "score".to_string()
}

/// Model served by another process. The batch goes out as a CSV with one column
/// per feature; the program is called as `program [args] --input <csv> --output <csv>`
/// and must write one score per input row.
#[derive(Debug, Clone)]
pub struct ExternalModel {
    name: String,
    features: Vec<String>,
    program: PathBuf,
    args: Vec<String>,
    score_column: String,
    workdir: PathBuf,
}

fn model_err(name: &str, e: impl std::fmt::Display) -> GuideError {
    GuideError::Model(format!("{}: {}", name, e))
}

impl ExternalModel {
    pub fn from_manifest(
        name: String,
        features: Vec<String>,
        manifest: &str,
        manifest_path: &Path,
    ) -> Result<Self, GuideError> {
        let spec: ExternalSpec = serde_json::from_str(manifest)
            .map_err(|e| GuideError::Config(format!("model '{}': {}", name, e)))?;
        let workdir = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(ExternalModel {
            name,
            features,
            program: spec.program,
            args: spec.args,
            score_column: spec.score_column,
            workdir,
        })
    }

    fn batch_frame(&self, batch: &[FeatureVector]) -> PolarsResult<DataFrame> {
        let columns: Vec<Column> = self
            .features
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let values: Vec<f64> = batch.iter().map(|v| v.values[j]).collect();
                Column::new(PlSmallStr::from(name.as_str()), values)
            })
            .collect();
        DataFrame::new(columns)
    }

    fn read_scores(&self, path: &Path) -> Result<Vec<f64>, GuideError> {
        let result_df = read_csv(path).map_err(|e| model_err(&self.name, e))?;
        let scores = result_df
            .column(&self.score_column)
            .and_then(|c| c.cast(&DataType::Float64))
            .map_err(|e| model_err(&self.name, e))?;
        let scores = scores.f64().map_err(|e| model_err(&self.name, e))?;

        scores
            .into_iter()
            .enumerate()
            .map(|(i, v)| v.ok_or_else(|| model_err(&self.name, format!("missing score in row {}", i))))
            .collect()
    }
}

impl ScoringModel for ExternalModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn feature_names(&self) -> &[String] {
        &self.features
    }

    fn score(&self, mode: Mode, batch: &[FeatureVector]) -> Result<Vec<f64>, GuideError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(bad) = batch.iter().find(|v| v.values.len() != self.features.len()) {
            return Err(model_err(
                &self.name,
                format!("vector for candidate {} has {} values", bad.candidate, bad.values.len()),
            ));
        }

        let scratch = tempfile::tempdir().map_err(|e| model_err(&self.name, e))?;
        let input_path = scratch.path().join("features.csv");
        let output_path = scratch.path().join("scores.csv");

        // 1) dump the batch, one column per feature
        let mut df = self.batch_frame(batch).map_err(|e| model_err(&self.name, e))?;
        dataframe_to_csv(&mut df, &input_path).map_err(|e| model_err(&self.name, e))?;

        // 2) call out to the model process
        info!("Running {} on {} {} guides", self.name, batch.len(), mode.label());
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--input")
            .arg(&input_path)
            .arg("--output")
            .arg(&output_path)
            .current_dir(&self.workdir)
            .env("GUIDE_RANKER_MODE", mode.flag())
            .output()
            .map_err(|e| model_err(&self.name, format!("cannot start {}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("{} failed: {}", self.name, stderr);
            return Err(model_err(&self.name, format!("exited with {}: {}", output.status, stderr.trim())));
        }
        debug!("{} output: {}", self.name, String::from_utf8_lossy(&output.stdout));

        // 3) read back what the model wrote
        self.read_scores(&output_path)
    }
}
