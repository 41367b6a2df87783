use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GuideError;

/// CRISPR modality the guides are designed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "i")]
    Interference,
    #[serde(rename = "a")]
    Activation,
}

impl Mode {
    pub fn flag(&self) -> &'static str {
        match self {
            Mode::Interference => "i",
            Mode::Activation => "a",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mode::Interference => "CRISPRi",
            Mode::Activation => "CRISPRa",
        }
    }
}

impl FromStr for Mode {
    type Err = GuideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "i" => Ok(Mode::Interference),
            "a" => Ok(Mode::Activation),
            other => Err(GuideError::Config(format!(
                "unknown mode '{}': expected 'i' (CRISPRi) or 'a' (CRISPRa)",
                other
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn symbol(&self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// An input locus. Bases are upper case over {A,C,G,T,N}.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub id: String,
    pub bases: Vec<u8>,
    pub chromosome: Option<String>,
    /// 0-based genomic coordinate of `bases[0]`.
    pub start_offset: Option<u64>,
}

impl Sequence {
    pub fn new(id: impl Into<String>, bases: &[u8]) -> Self {
        Sequence {
            id: id.into(),
            bases: normalize_bases(bases),
            chromosome: None,
            start_offset: None,
        }
    }

    pub fn with_locus(mut self, chromosome: impl Into<String>, start_offset: u64) -> Self {
        self.chromosome = Some(chromosome.into());
        self.start_offset = Some(start_offset);
        self
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }
}

/// Upper-case, U -> T, anything outside ACGT becomes N.
pub fn normalize_bases(raw: &[u8]) -> Vec<u8> {
    raw.iter()
        .filter(|b| !b.is_ascii_whitespace())
        .map(|b| match b.to_ascii_uppercase() {
            b'U' => b'T',
            c @ (b'A' | b'C' | b'G' | b'T') => c,
            _ => b'N',
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Full window in guide orientation (5' context, protospacer, PAM, 3' context).
    pub sequence_window: String,
    pub reverse_complement: String,
    pub pam: String,
    pub strand: Strand,
    /// Offset of the window's leftmost base on the + strand.
    pub position: usize,
    pub chromosome: Option<String>,
    pub genomic_start: u64,
    pub genomic_end: u64,
    /// Genomic coordinate of the Cas9 cut site.
    pub cut_site: u64,
}

impl Candidate {
    pub fn key(&self) -> (usize, Strand) {
        (self.position, self.strand)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    /// Index of the candidate in the run's scan order.
    pub candidate: usize,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    pub candidate: usize,
    pub score: f64,
    /// Each loaded model's own prediction, by model name.
    pub member_scores: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedGuide {
    pub candidate: Candidate,
    pub score: f64,
    pub member_scores: Vec<(String, f64)>,
    pub rank: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_flags_parse() {
        assert_eq!("i".parse::<Mode>().unwrap(), Mode::Interference);
        assert_eq!(" a ".parse::<Mode>().unwrap(), Mode::Activation);
        assert_eq!(Mode::Activation.to_string(), "CRISPRa");
    }

    #[test]
    fn unknown_mode_is_config_error() {
        assert!(matches!("x".parse::<Mode>(), Err(GuideError::Config(_))));
    }

    #[test]
    fn bases_are_normalised_on_load() {
        let seq = Sequence::new("s", b"acgu\nRyn");
        assert_eq!(seq.bases, b"ACGTNNN");
        assert_eq!(seq.len(), 7);
    }
}
