//! Pipeline configuration, loaded from JSON and passed explicitly to each component.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::GuideError;
use crate::helper_functions::resolve_path;
use crate::models::Mode;

const BIGWIG_EXTENSIONS: [&str; 3] = ["bw", "bigwig", "bigWig"];

/// Layout of a guide window in guide orientation:
/// `context_5 | protospacer | pam | context_3`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuideGeometry {
    pub context_5: usize,
    pub protospacer: usize,
    /// IUPAC pattern, e.g. `NGG`.
    pub pam: String,
    pub context_3: usize,
    /// Accept N inside context and protospacer. The PAM is always strict.
    pub tolerate_ambiguous: bool,
    /// Distance of the cut site from the PAM, counted into the protospacer.
    pub cut_offset: usize,
}

impl Default for GuideGeometry {
    fn default() -> Self {
        GuideGeometry {
            context_5: 4,
            protospacer: 20,
            pam: "NGG".to_string(),
            context_3: 3,
            tolerate_ambiguous: false,
            cut_offset: 3,
        }
    }
}

impl GuideGeometry {
    pub fn window_len(&self) -> usize {
        self.context_5 + self.protospacer + self.pam.len() + self.context_3
    }

    pub fn pam_offset(&self) -> usize {
        self.context_5 + self.protospacer
    }

    pub fn validate(&self) -> Result<(), GuideError> {
        if self.protospacer == 0 {
            return Err(GuideError::Config("protospacer length must be positive".into()));
        }
        if self.pam.is_empty() {
            return Err(GuideError::Config("PAM pattern must not be empty".into()));
        }
        if let Some(bad) = self.pam.bytes().find(|b| iupac_bases(*b).is_none()) {
            return Err(GuideError::Config(format!(
                "PAM pattern '{}' contains non-IUPAC symbol '{}'",
                self.pam, bad as char
            )));
        }
        if self.cut_offset > self.protospacer {
            return Err(GuideError::Config(format!(
                "cut offset {} exceeds protospacer length {}",
                self.cut_offset, self.protospacer
            )));
        }
        Ok(())
    }
}

/// Concrete bases an IUPAC code stands for.
pub fn iupac_bases(code: u8) -> Option<&'static [u8]> {
    let bases: &'static [u8] = match code.to_ascii_uppercase() {
        b'A' => b"A",
        b'C' => b"C",
        b'G' => b"G",
        b'T' | b'U' => b"T",
        b'R' => b"AG",
        b'Y' => b"CT",
        b'S' => b"CG",
        b'W' => b"AT",
        b'K' => b"GT",
        b'M' => b"AC",
        b'B' => b"CGT",
        b'D' => b"AGT",
        b'H' => b"ACT",
        b'V' => b"ACG",
        b'N' => b"ACGT",
        _ => return None,
    };
    Some(bases)
}

/// Candidates are kept when the cut site lies in `[tss - upstream, tss + downstream]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TssWindow {
    pub upstream: u64,
    pub downstream: u64,
}

impl TssWindow {
    pub fn contains(&self, tss: u64, site: u64) -> bool {
        site.saturating_add(self.upstream) >= tss && site <= tss.saturating_add(self.downstream)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeConfig {
    pub model_dir: PathBuf,
    pub geometry: GuideGeometry,
    pub tss_window: Option<TssWindow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceFeature {
    Onehot,
    Dinucleotide,
    Gc,
    Strand,
    Pssm,
    TssOffset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    Mean,
    Max,
    Min,
    Sum,
    Coverage,
}

impl Statistic {
    pub fn name(&self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Max => "max",
            Statistic::Min => "min",
            Statistic::Sum => "sum",
            Statistic::Coverage => "coverage",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackConfig {
    pub name: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub sequence: Vec<SequenceFeature>,
    pub tracks: Vec<TrackConfig>,
    /// Flank added on both sides of the guide window, one signal window per entry.
    pub extensions: Vec<u64>,
    pub statistics: Vec<Statistic>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            sequence: vec![
                SequenceFeature::Onehot,
                SequenceFeature::Dinucleotide,
                SequenceFeature::Gc,
            ],
            tracks: Vec::new(),
            extensions: vec![0],
            statistics: vec![Statistic::Mean],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub interference: ModeConfig,
    pub activation: ModeConfig,
    pub bigwig_dir: PathBuf,
    pub features: FeatureConfig,
    pub max_sequence_length: usize,
    pub io_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            interference: ModeConfig {
                model_dir: PathBuf::from("model_crispri"),
                ..ModeConfig::default()
            },
            activation: ModeConfig {
                model_dir: PathBuf::from("model_crispra"),
                ..ModeConfig::default()
            },
            bigwig_dir: PathBuf::from("bigwig"),
            features: FeatureConfig::default(),
            max_sequence_length: 500,
            io_retries: 2,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, GuideError> {
        let text = fs::read_to_string(path).map_err(|e| {
            GuideError::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: PipelineConfig = serde_json::from_str(&text).map_err(|e| {
            GuideError::Config(format!("cannot parse config {}: {}", path.display(), e))
        })?;
        info!("Loaded pipeline configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    pub fn mode(&self, mode: Mode) -> &ModeConfig {
        match mode {
            Mode::Interference => &self.interference,
            Mode::Activation => &self.activation,
        }
    }

    pub fn validate(&self) -> Result<(), GuideError> {
        self.interference.geometry.validate()?;
        self.activation.geometry.validate()?;
        if !self.features.tracks.is_empty() && self.features.extensions.is_empty() {
            return Err(GuideError::Config("tracks configured without any window extensions".into()));
        }
        if !self.features.tracks.is_empty() && self.features.statistics.is_empty() {
            return Err(GuideError::Config("tracks configured without any statistics".into()));
        }
        Ok(())
    }

    /// Model directory for `mode`, checked for existence.
    pub fn model_dir(&self, mode: Mode) -> Result<PathBuf, GuideError> {
        let dir = resolve_path(&self.mode(mode).model_dir);
        if !dir.is_dir() {
            return Err(GuideError::Config(format!(
                "model directory for {} missing: {}",
                mode,
                dir.display()
            )));
        }
        Ok(dir)
    }

    /// Track names and files, in feature order. Every returned path exists.
    pub fn resolve_tracks(&self) -> Result<Vec<(String, PathBuf)>, GuideError> {
        let dir = resolve_path(&self.bigwig_dir);

        if self.features.tracks.is_empty() {
            return discover_tracks(&dir);
        }

        let mut resolved = Vec::with_capacity(self.features.tracks.len());
        for track in &self.features.tracks {
            let path = match &track.path {
                Some(p) => resolve_path(p),
                None => match_track_file(&dir, &track.name)?.ok_or_else(|| {
                    GuideError::Config(format!(
                        "no file for track '{}' in {}",
                        track.name,
                        dir.display()
                    ))
                })?,
            };
            if !path.is_file() {
                return Err(GuideError::Config(format!(
                    "track file for '{}' missing: {}",
                    track.name,
                    path.display()
                )));
            }
            debug!("Track {} -> {}", track.name, path.display());
            resolved.push((track.name.clone(), path));
        }
        Ok(resolved)
    }
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>, GuideError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| GuideError::Config(format!("cannot list {}: {}", dir.display(), e)))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| GuideError::Config(e.to_string()))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn discover_tracks(dir: &Path) -> Result<Vec<(String, PathBuf)>, GuideError> {
    if !dir.is_dir() {
        debug!("No bigwig directory at {}, running without signal tracks", dir.display());
        return Ok(Vec::new());
    }
    let mut tracks: Vec<(String, PathBuf)> = list_files(dir)?
        .into_iter()
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| BIGWIG_EXTENSIONS.contains(&e))
                .unwrap_or(false)
        })
        .filter_map(|p| {
            let stem = p.file_stem()?.to_str()?.to_string();
            Some((stem, p))
        })
        .collect();
    tracks.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(tracks)
}

/// Shortest file whose name starts with `name`, ignoring case.
fn match_track_file(dir: &Path, name: &str) -> Result<Option<PathBuf>, GuideError> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let prefix = name.to_lowercase();
    let mut candidates: Vec<PathBuf> = list_files(dir)?
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.to_lowercase().starts_with(&prefix))
                .unwrap_or(false)
        })
        .collect();
    candidates.sort_by_key(|p| p.file_name().map(|n| n.len()).unwrap_or(usize::MAX));
    Ok(candidates.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn default_geometry_is_thirty_mer_ngg() {
        let geometry = GuideGeometry::default();
        assert_eq!(geometry.window_len(), 30);
        assert_eq!(geometry.pam_offset(), 24);
        assert!(geometry.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let json = r#"{ "max_sequence_length": 1000, "activation": { "model_dir": "/models/a" } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_sequence_length, 1000);
        assert_eq!(config.activation.model_dir, PathBuf::from("/models/a"));
        assert_eq!(config.activation.geometry, GuideGeometry::default());
        assert_eq!(config.io_retries, 2);
    }

    #[test]
    fn bad_pam_is_config_error() {
        let geometry = GuideGeometry {
            pam: "NGX".into(),
            ..GuideGeometry::default()
        };
        assert!(matches!(geometry.validate(), Err(GuideError::Config(_))));
    }

    #[test]
    fn missing_model_dir_fails_fast() {
        let mut config = PipelineConfig::default();
        config.interference.model_dir = PathBuf::from("/nonexistent/model_crispri");
        assert!(matches!(
            config.model_dir(Mode::Interference),
            Err(GuideError::Config(_))
        ));
    }

    #[test]
    fn track_prefix_match_prefers_shortest_name() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("H2AZ.bigwig")).unwrap();
        File::create(dir.path().join("h2az_replicate2.bigwig")).unwrap();
        File::create(dir.path().join("DNase.bw")).unwrap();

        let found = match_track_file(dir.path(), "H2AZ").unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "H2AZ.bigwig");
    }

    #[test]
    fn tracks_are_discovered_in_name_order() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("b_track.bw")).unwrap();
        File::create(dir.path().join("a_track.bigwig")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();

        let mut config = PipelineConfig::default();
        config.bigwig_dir = dir.path().to_path_buf();
        let tracks = config.resolve_tracks().unwrap();
        let names: Vec<&str> = tracks.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a_track", "b_track"]);
    }

    #[test]
    fn configured_track_without_file_is_config_error() {
        let dir = tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.bigwig_dir = dir.path().to_path_buf();
        config.features.tracks = vec![TrackConfig {
            name: "ATAC".into(),
            path: None,
        }];
        assert!(matches!(config.resolve_tracks(), Err(GuideError::Config(_))));
    }

    #[test]
    fn tss_window_bounds_are_inclusive() {
        let window = TssWindow {
            upstream: 50,
            downstream: 300,
        };
        assert!(window.contains(1_000, 950));
        assert!(window.contains(1_000, 1_300));
        assert!(!window.contains(1_000, 949));
        assert!(!window.contains(1_000, 1_301));
    }

    #[test]
    fn huge_tss_window_does_not_overflow() {
        let window = TssWindow {
            upstream: u64::MAX,
            downstream: u64::MAX,
        };
        assert!(window.contains(1_000, u64::MAX));
        assert!(window.contains(u64::MAX, 0));
    }
}
