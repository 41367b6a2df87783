//! Per-candidate feature vectors: sequence features followed by signal features,
//! in a fixed, named layout.

use std::sync::Arc;

use crate::config::{FeatureConfig, GuideGeometry, SequenceFeature, Statistic};
use crate::data_handling::SignalSource;
use crate::error::{FeatureError, GuideError};
use crate::models::{Candidate, FeatureVector, Strand};

pub mod sequence;
pub mod signal;

/// Ordered feature names. Two layouts are compatible only if they are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureLayout {
    names: Vec<String>,
}

impl FeatureLayout {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Fail with a config error unless `expected` names the same features in the same order.
    pub fn check_against(&self, expected: &[String], model: &str) -> Result<(), GuideError> {
        if self.names.len() != expected.len() {
            return Err(GuideError::Config(format!(
                "model '{}' expects {} features, pipeline builds {}",
                model,
                expected.len(),
                self.names.len()
            )));
        }
        if let Some((i, (ours, theirs))) = self
            .names
            .iter()
            .zip(expected)
            .enumerate()
            .find(|(_, (a, b))| a != b)
        {
            return Err(GuideError::Config(format!(
                "model '{}' expects feature '{}' at column {}, pipeline builds '{}'",
                model, theirs, i, ours
            )));
        }
        Ok(())
    }
}

pub struct FeatureBuilder {
    geometry: GuideGeometry,
    groups: Vec<SequenceFeature>,
    tracks: Vec<Arc<dyn SignalSource>>,
    extensions: Vec<u64>,
    statistics: Vec<Statistic>,
    tss: Option<u64>,
    layout: FeatureLayout,
}

impl FeatureBuilder {
    pub fn new(
        config: &FeatureConfig,
        geometry: &GuideGeometry,
        tracks: Vec<Arc<dyn SignalSource>>,
        tss: Option<u64>,
    ) -> Self {
        let window_len = geometry.window_len();
        let mut names = Vec::new();
        for group in &config.sequence {
            match group {
                SequenceFeature::Onehot => names.extend(sequence::onehot_names(window_len)),
                SequenceFeature::Dinucleotide => {
                    names.extend(sequence::dinucleotide_names(window_len))
                }
                SequenceFeature::Gc => names.push("gc_content".to_string()),
                SequenceFeature::Strand => names.push("strand".to_string()),
                SequenceFeature::Pssm => names.push("pssm_score".to_string()),
                SequenceFeature::TssOffset => names.push("tss_offset".to_string()),
            }
        }
        // A single statistic is implied: `H2AZ_0` rather than `H2AZ_0_mean`.
        let single_stat = config.statistics.len() == 1;
        for track in &tracks {
            for ext in &config.extensions {
                for stat in &config.statistics {
                    names.push(if single_stat {
                        format!("{}_{}", track.name(), ext)
                    } else {
                        format!("{}_{}_{}", track.name(), ext, stat.name())
                    });
                }
            }
        }

        FeatureBuilder {
            geometry: geometry.clone(),
            groups: config.sequence.clone(),
            tracks,
            extensions: config.extensions.clone(),
            statistics: config.statistics.clone(),
            tss,
            layout: FeatureLayout { names },
        }
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    pub fn has_signal_features(&self) -> bool {
        !self.tracks.is_empty()
    }

    fn signal_width(&self) -> usize {
        self.tracks.len() * self.extensions.len() * self.statistics.len()
    }

    /// Feature vector for the candidate at `index` in scan order.
    pub fn build(&self, index: usize, candidate: &Candidate) -> Result<FeatureVector, FeatureError> {
        let window = candidate.sequence_window.as_bytes();
        let protospacer =
            &window[self.geometry.context_5..self.geometry.context_5 + self.geometry.protospacer];

        let mut values = Vec::with_capacity(self.layout.len());
        for group in &self.groups {
            match group {
                SequenceFeature::Onehot => sequence::onehot(window, &mut values),
                SequenceFeature::Dinucleotide => sequence::dinucleotide(window, &mut values),
                SequenceFeature::Gc => values.push(sequence::gc_content(protospacer)),
                SequenceFeature::Strand => values.push(match candidate.strand {
                    Strand::Forward => 1.0,
                    Strand::Reverse => 0.0,
                }),
                SequenceFeature::Pssm => {
                    let raw = sequence::calculate_pssm_score(protospacer).ok_or_else(|| {
                        FeatureError::Sequence {
                            feature: "pssm_score".into(),
                            reason: format!(
                                "needs a {}nt unambiguous protospacer",
                                sequence::PSSM_LENGTH
                            ),
                        }
                    })?;
                    values.push(sequence::normalize_score(raw));
                }
                SequenceFeature::TssOffset => values.push(match self.tss {
                    Some(tss) => candidate.cut_site as f64 - tss as f64,
                    None => 0.0,
                }),
            }
        }

        match &candidate.chromosome {
            Some(chrom) => {
                for track in &self.tracks {
                    for &ext in &self.extensions {
                        signal::window_statistics(
                            track.as_ref(),
                            chrom,
                            candidate.genomic_start,
                            candidate.genomic_end,
                            ext,
                            &self.statistics,
                            &mut values,
                        )?;
                    }
                }
            }
            // No coordinates: the model still runs on sequence features alone.
            None => values.extend(std::iter::repeat(0.0).take(self.signal_width())),
        }

        if values.len() != self.layout.len() {
            return Err(FeatureError::Shape {
                expected: self.layout.len(),
                actual: values.len(),
            });
        }
        Ok(FeatureVector {
            candidate: index,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handling::StaticSignal;
    use crate::error::SignalError;
    use crate::models::Sequence;
    use crate::scanner::CandidateScanner;

    fn candidate(chromosome: Option<&str>, genomic_start: u64) -> Candidate {
        let window = "TTTTACGTACGTACGTACGTACGTAGGCCC";
        Candidate {
            sequence_window: window.to_string(),
            reverse_complement: String::from_utf8(crate::helper_functions::reverse_complement(
                window.as_bytes(),
            ))
            .unwrap(),
            pam: "AGG".into(),
            strand: Strand::Forward,
            position: 0,
            chromosome: chromosome.map(str::to_string),
            genomic_start,
            genomic_end: genomic_start + 30,
            cut_site: genomic_start + 21,
        }
    }

    fn config(sequence: Vec<SequenceFeature>) -> FeatureConfig {
        FeatureConfig {
            sequence,
            tracks: Vec::new(),
            extensions: vec![0, 10],
            statistics: vec![Statistic::Mean, Statistic::Max],
        }
    }

    fn track() -> Arc<dyn SignalSource> {
        Arc::new(StaticSignal::new("ATAC").with_chrom("chr1", vec![2.0; 200]))
    }

    #[test]
    fn layout_names_follow_group_then_track_order() {
        let builder = FeatureBuilder::new(
            &config(vec![SequenceFeature::Gc, SequenceFeature::Strand]),
            &GuideGeometry::default(),
            vec![track()],
            None,
        );
        assert_eq!(
            builder.layout().names(),
            &["gc_content", "strand", "ATAC_0_mean", "ATAC_0_max", "ATAC_10_mean", "ATAC_10_max"]
        );
    }

    #[test]
    fn single_statistic_drops_the_suffix() {
        let mut cfg = config(vec![SequenceFeature::Gc]);
        cfg.statistics = vec![Statistic::Mean];
        let builder = FeatureBuilder::new(&cfg, &GuideGeometry::default(), vec![track()], None);
        assert_eq!(builder.layout().names(), &["gc_content", "ATAC_0", "ATAC_10"]);
    }

    #[test]
    fn vector_length_matches_layout() {
        let builder = FeatureBuilder::new(
            &config(vec![
                SequenceFeature::Onehot,
                SequenceFeature::Dinucleotide,
                SequenceFeature::Gc,
                SequenceFeature::Pssm,
                SequenceFeature::TssOffset,
            ]),
            &GuideGeometry::default(),
            vec![track()],
            Some(100),
        );
        let vector = builder.build(7, &candidate(Some("chr1"), 50)).unwrap();
        assert_eq!(vector.candidate, 7);
        assert_eq!(vector.values.len(), builder.layout().len());
        assert_eq!(vector.values.len(), 120 + 464 + 3 + 4);
    }

    #[test]
    fn strand_pssm_and_tss_offset_values_for_both_strands() {
        let geometry = GuideGeometry::default();
        let scanner = CandidateScanner::new(&geometry).unwrap();
        let forward_seq = Sequence::new("fwd", b"TTTTACGTACGTACGTACGTACGTAGGTTT").with_locus("chr1", 50);
        let reverse_seq = Sequence::new("rev", b"AAACCTACGTACGTACGTACGTACGTAAAA").with_locus("chr1", 50);
        let forward = scanner
            .scan(&forward_seq)
            .find(|c| c.strand == Strand::Forward)
            .unwrap();
        let reverse = scanner
            .scan(&reverse_seq)
            .find(|c| c.strand == Strand::Reverse)
            .unwrap();
        assert_eq!(forward.cut_site, 71);
        assert_eq!(reverse.cut_site, 58);

        let builder = FeatureBuilder::new(
            &config(vec![SequenceFeature::Strand, SequenceFeature::Pssm, SequenceFeature::TssOffset]),
            &geometry,
            Vec::new(),
            Some(100),
        );
        assert_eq!(builder.layout().names(), &["strand", "pssm_score", "tss_offset"]);

        let pssm = |c: &Candidate| {
            sequence::normalize_score(
                sequence::calculate_pssm_score(&c.sequence_window.as_bytes()[4..24]).unwrap(),
            )
        };

        let f = builder.build(0, &forward).unwrap();
        assert_eq!(f.values, vec![1.0, pssm(&forward), -29.0]);

        let r = builder.build(1, &reverse).unwrap();
        assert_eq!(r.values, vec![0.0, pssm(&reverse), -42.0]);
        assert!((0.0..=100.0).contains(&r.values[1]));
    }

    #[test]
    fn pssm_on_ambiguous_protospacer_is_sequence_error() {
        let builder = FeatureBuilder::new(
            &config(vec![SequenceFeature::Pssm]),
            &GuideGeometry::default(),
            Vec::new(),
            None,
        );
        let mut c = candidate(None, 0);
        c.sequence_window.replace_range(10..11, "N");
        assert!(matches!(
            builder.build(0, &c),
            Err(FeatureError::Sequence { .. })
        ));
    }

    #[test]
    fn signal_features_are_zero_without_coordinates() {
        let builder = FeatureBuilder::new(
            &config(vec![SequenceFeature::Gc]),
            &GuideGeometry::default(),
            vec![track()],
            None,
        );
        let vector = builder.build(0, &candidate(None, 0)).unwrap();
        assert_eq!(vector.values, vec![0.5, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn candidate_off_the_track_is_a_range_feature_error() {
        let builder = FeatureBuilder::new(
            &config(vec![SequenceFeature::Gc]),
            &GuideGeometry::default(),
            vec![track()],
            None,
        );
        let err = builder.build(0, &candidate(Some("chr1"), 180)).unwrap_err();
        assert!(err.is_range());
        assert!(matches!(err, FeatureError::Signal(SignalError::Range(_))));
    }

    #[test]
    fn layout_mismatch_is_config_error() {
        let builder = FeatureBuilder::new(
            &config(vec![SequenceFeature::Gc, SequenceFeature::Strand]),
            &GuideGeometry::default(),
            Vec::new(),
            None,
        );
        let swapped = vec!["strand".to_string(), "gc_content".to_string()];
        assert!(matches!(
            builder.layout().check_against(&swapped, "m"),
            Err(GuideError::Config(_))
        ));
        let same = vec!["gc_content".to_string(), "strand".to_string()];
        assert!(builder.layout().check_against(&same, "m").is_ok());
    }
}
