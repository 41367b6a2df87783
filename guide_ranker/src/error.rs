use std::fmt;

use thiserror::Error;

use crate::models::Strand;

/// Errors raised by the guide ranking core.
#[derive(Debug, Error)]
pub enum GuideError {
    #[error("input error: {0}")]
    Input(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error("model error: {0}")]
    Model(String),
}

/// A requested region lies outside what a signal track covers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("region {chrom}:{start}-{end} is outside track '{track}' ({reason})")]
pub struct RangeError {
    pub track: String,
    pub chrom: String,
    pub start: i64,
    pub end: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Error)]
pub enum SignalError {
    #[error(transparent)]
    Range(#[from] RangeError),

    #[error("failed to read track '{track}': {reason}")]
    Read { track: String, reason: String },
}

/// Feature construction failed for a single candidate.
#[derive(Debug, Clone, Error)]
pub enum FeatureError {
    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error("sequence feature '{feature}' cannot be computed: {reason}")]
    Sequence { feature: String, reason: String },

    #[error("feature vector has {actual} values, layout declares {expected}")]
    Shape { expected: usize, actual: usize },
}

impl FeatureError {
    pub fn is_range(&self) -> bool {
        matches!(self, FeatureError::Signal(SignalError::Range(_)))
    }
}

/// Pipeline stages, in order. `Failed` is terminal and reachable from any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Scanning,
    FeatureBuilding,
    Scoring,
    Ranking,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Scanning => "scanning",
            RunState::FeatureBuilding => "feature building",
            RunState::Scoring => "scoring",
            RunState::Ranking => "ranking",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A run that ended in `Failed`, with the stage it was in.
#[derive(Debug, Error)]
#[error("run failed during {stage}: {error}")]
pub struct RunFailure {
    pub stage: RunState,
    #[source]
    pub error: GuideError,
}

/// Candidate dropped during feature building.
#[derive(Debug, Clone)]
pub struct DroppedCandidate {
    pub position: usize,
    pub strand: Strand,
    pub error: FeatureError,
}
