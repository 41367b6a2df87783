//! Scan -> feature building -> scoring -> ranking for one sequence.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{DroppedCandidate, GuideError, RunFailure, RunState};
use crate::features::FeatureBuilder;
use crate::models::{Candidate, FeatureVector, Mode, RankedGuide, ScoreResult, Sequence};
use crate::prediction_tools::ScoringModel;
use crate::scanner::CandidateScanner;

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub sequence_id: String,
    pub guides: Vec<RankedGuide>,
    pub dropped: Vec<DroppedCandidate>,
    pub state: RunState,
}

/// Tracks the stage of one run so a failure can say where it happened.
struct RunTracker<'a> {
    id: &'a str,
    state: RunState,
}

impl<'a> RunTracker<'a> {
    fn new(id: &'a str) -> Self {
        RunTracker {
            id,
            state: RunState::Idle,
        }
    }

    fn advance(&mut self, next: RunState) {
        debug!("{}: {} -> {}", self.id, self.state, next);
        self.state = next;
    }

    fn fail(&mut self, error: GuideError) -> RunFailure {
        let stage = self.state;
        warn!("{}: failed during {}: {}", self.id, stage, error);
        self.state = RunState::Failed;
        RunFailure { stage, error }
    }

    fn finish(mut self, guides: Vec<RankedGuide>, dropped: Vec<DroppedCandidate>) -> RunReport {
        self.advance(RunState::Done);
        RunReport {
            sequence_id: self.id.to_string(),
            guides,
            dropped,
            state: self.state,
        }
    }
}

pub struct RankingPipeline<'a> {
    mode: Mode,
    scanner: CandidateScanner,
    builder: FeatureBuilder,
    model: &'a dyn ScoringModel,
}

impl<'a> RankingPipeline<'a> {
    /// Fails with a config error when the builder's layout is not exactly what the model expects.
    pub fn new(
        mode: Mode,
        scanner: CandidateScanner,
        builder: FeatureBuilder,
        model: &'a dyn ScoringModel,
    ) -> Result<Self, GuideError> {
        builder
            .layout()
            .check_against(model.feature_names(), model.name())?;
        Ok(RankingPipeline {
            mode,
            scanner,
            builder,
            model,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn run(&self, sequence: &Sequence) -> Result<RunReport, RunFailure> {
        let mut run = RunTracker::new(&sequence.id);

        run.advance(RunState::Scanning);
        let candidates: Vec<Candidate> = self.scanner.scan(sequence).collect();
        info!("{}: {} candidates", sequence.id, candidates.len());
        if candidates.is_empty() {
            return Ok(run.finish(Vec::new(), Vec::new()));
        }

        run.advance(RunState::FeatureBuilding);
        if sequence.chromosome.is_none() && self.builder.has_signal_features() {
            warn!(
                "{}: no genomic coordinates in the record id, signal features are zero",
                sequence.id
            );
        }
        let (vectors, dropped) = self.build_features(&candidates);
        debug!(
            "{}: feature matrix {} x {}",
            sequence.id,
            vectors.len(),
            self.builder.layout().len()
        );
        if vectors.is_empty() {
            warn!("{}: every candidate was dropped during feature building", sequence.id);
            return Ok(run.finish(Vec::new(), dropped));
        }

        run.advance(RunState::Scoring);
        let results = self.score(&vectors).map_err(|e| run.fail(e))?;

        run.advance(RunState::Ranking);
        let guides = rank(&candidates, &results);
        Ok(run.finish(guides, dropped))
    }

    /// Build vectors in parallel; output keeps scan order.
    fn build_features(&self, candidates: &[Candidate]) -> (Vec<FeatureVector>, Vec<DroppedCandidate>) {
        let built: Vec<_> = candidates
            .par_iter()
            .enumerate()
            .map(|(i, c)| self.builder.build(i, c))
            .collect();

        let mut vectors = Vec::with_capacity(built.len());
        let mut dropped = Vec::new();
        for (candidate, result) in candidates.iter().zip(built) {
            match result {
                Ok(v) => vectors.push(v),
                Err(error) => {
                    warn!(
                        "Dropping candidate {}{}: {}",
                        candidate.position, candidate.strand, error
                    );
                    dropped.push(DroppedCandidate {
                        position: candidate.position,
                        strand: candidate.strand,
                        error,
                    });
                }
            }
        }
        (vectors, dropped)
    }

    /// One model call for the whole batch. Scores map back to vectors by position.
    fn score(&self, vectors: &[FeatureVector]) -> Result<Vec<ScoreResult>, GuideError> {
        let scores = self.model.score_members(self.mode, vectors)?;
        let short = std::iter::once((self.model.name(), &scores.combined))
            .chain(scores.members.iter().map(|(name, s)| (name.as_str(), s)))
            .find(|(_, s)| s.len() != vectors.len());
        if let Some((name, s)) = short {
            return Err(GuideError::Model(format!(
                "{} returned {} scores for {} vectors",
                name,
                s.len(),
                vectors.len()
            )));
        }
        if let Some(i) = scores.combined.iter().position(|s| !s.is_finite()) {
            return Err(GuideError::Model(format!(
                "{} returned a non-finite score for candidate {}",
                self.model.name(),
                vectors[i].candidate
            )));
        }
        Ok(vectors
            .iter()
            .zip(&scores.combined)
            .enumerate()
            .map(|(i, (v, &score))| ScoreResult {
                candidate: v.candidate,
                score,
                member_scores: scores
                    .members
                    .iter()
                    .map(|(name, s)| (name.clone(), s[i]))
                    .collect(),
            })
            .collect())
    }
}

/// Descending score, then ascending genomic start, then + before -. Ranks run 1..=N.
pub fn rank(candidates: &[Candidate], results: &[ScoreResult]) -> Vec<RankedGuide> {
    let mut order: Vec<&ScoreResult> = results.iter().collect();
    order.sort_by(|a, b| {
        let ca = &candidates[a.candidate];
        let cb = &candidates[b.candidate];
        b.score
            .total_cmp(&a.score)
            .then_with(|| ca.genomic_start.cmp(&cb.genomic_start))
            .then_with(|| ca.strand.cmp(&cb.strand))
            .then_with(|| ca.position.cmp(&cb.position))
    });

    order
        .into_iter()
        .enumerate()
        .map(|(i, r)| RankedGuide {
            candidate: candidates[r.candidate].clone(),
            score: r.score,
            member_scores: r.member_scores.clone(),
            rank: i + 1,
        })
        .collect()
}
