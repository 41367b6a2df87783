use std::fs::File;
use std::path::Path;
use std::sync::OnceLock;

use needletail::parse_fastx_reader;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::data_handling::SequenceSource;
use crate::error::GuideError;
use crate::helper_functions::{is_transient_io, with_retries};
use crate::models::{normalize_bases, Sequence};

/// A `chr:start-end` locus embedded in a FASTA header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locus {
    pub chromosome: String,
    /// 0-based.
    pub start: u64,
    pub end: u64,
}

fn locus_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(chr\w+|\b[0-9XYM]+)\s*:\s*([0-9,]+)\s*-\s*([0-9,]+)").ok())
        .as_ref()
}

/// Find a locus like `chr7:5,530,601-5,531,100` in `text`.
/// The start is read as 1-based and returned 0-based.
pub fn parse_locus(text: &str) -> Option<Locus> {
    let caps = locus_regex()?.captures(text)?;
    let raw_chrom = caps.get(1)?.as_str();
    let chromosome = if raw_chrom.len() > 3 && raw_chrom[..3].eq_ignore_ascii_case("chr") {
        format!("chr{}", &raw_chrom[3..])
    } else {
        format!("chr{}", raw_chrom)
    };
    let start: u64 = caps.get(2)?.as_str().replace(',', "").parse().ok()?;
    let end: u64 = caps.get(3)?.as_str().replace(',', "").parse().ok()?;
    Some(Locus {
        chromosome,
        start: start.saturating_sub(1),
        end,
    })
}

/// FASTA reader backed by needletail.
pub struct FastaSource {
    pub max_len: usize,
    pub retries: u32,
}

impl FastaSource {
    pub fn new(max_len: usize, retries: u32) -> Self {
        FastaSource { max_len, retries }
    }
}


impl SequenceSource for FastaSource {
    fn read(&self, path: &Path) -> Result<Vec<Sequence>, GuideError> {
        info!("Reading sequences from {}", path.display());
        let file = with_retries("opening FASTA", self.retries, is_transient_io, || File::open(path))
            .map_err(|e| GuideError::Input(format!("cannot open {}: {}", path.display(), e)))?;

        let mut reader = parse_fastx_reader(file)
            .map_err(|e| GuideError::Input(format!("{}: {}", path.display(), e)))?;

        let mut records = Vec::new();
        let mut seen = 0usize;
        while let Some(record) = reader.next() {
            let record =
                record.map_err(|e| GuideError::Input(format!("{}: {}", path.display(), e)))?;
            seen += 1;

            let id = String::from_utf8_lossy(record.id()).trim().to_string();
            let bases = normalize_bases(&record.seq());

            if bases.is_empty() {
                warn!("Skipping {}: empty sequence", id);
                continue;
            }
            if bases.len() > self.max_len {
                warn!("Skipping {}: too long ({} > {})", id, bases.len(), self.max_len);
                continue;
            }

            let mut sequence = Sequence {
                id,
                bases,
                chromosome: None,
                start_offset: None,
            };
            if let Some(locus) = parse_locus(&sequence.id) {
                debug!("{} -> {}:{}", sequence.id, locus.chromosome, locus.start);
                sequence.chromosome = Some(locus.chromosome);
                sequence.start_offset = Some(locus.start);
            }
            records.push(sequence);
        }

        if seen == 0 {
            return Err(GuideError::Input(format!("{} contains no FASTA records", path.display())));
        }
        info!("Loaded {} of {} sequences from {}", records.len(), seen, path.display());
        Ok(records)
    }
}
