use std::path::Path;

use crate::error::{GuideError, SignalError};
use crate::models::Sequence;

pub mod bigwig;
pub mod fasta;

pub use bigwig::{BigWigSource, CachedSignal, StaticSignal};
pub use fasta::FastaSource;

/// Reads the input loci.
pub trait SequenceSource {
    fn read(&self, path: &Path) -> Result<Vec<Sequence>, GuideError>;
}

/// Per-base numeric signal over a chromosome range.
///
/// `query` returns one value per base of `[start, end)`. Bases without data are `NaN`.
/// A region outside the covered domain is a `SignalError::Range`.
pub trait SignalSource: Send + Sync {
    fn name(&self) -> &str;

    fn query(&self, chrom: &str, start: i64, end: i64) -> Result<Vec<f32>, SignalError>;
}
