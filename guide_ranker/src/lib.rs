pub mod config;
pub mod data_handling;
pub mod error;
pub mod features;
pub mod helper_functions;
pub mod models;
pub mod pipeline;
pub mod prediction_tools;
pub mod report;
pub mod scanner;

pub use config::PipelineConfig;
pub use error::{FeatureError, GuideError, RunFailure, RunState};
pub use features::FeatureBuilder;
pub use models::{Candidate, Mode, RankedGuide, Sequence, Strand};
pub use pipeline::{RankingPipeline, RunReport};
pub use prediction_tools::ScoringModel;
pub use scanner::CandidateScanner;
