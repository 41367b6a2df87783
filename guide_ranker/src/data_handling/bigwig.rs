use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bigtools::utils::reopen::ReopenableFile;
use bigtools::{BBIReadError, BigWigRead, BigWigReadOpenError};
use tracing::{debug, info};

use crate::data_handling::SignalSource;
use crate::error::{GuideError, RangeError, SignalError};
use crate::helper_functions::{is_transient_io, with_retries};

fn range_error(track: &str, chrom: &str, start: i64, end: i64, reason: impl Into<String>) -> SignalError {
    SignalError::Range(RangeError {
        track: track.to_string(),
        chrom: chrom.to_string(),
        start,
        end,
        reason: reason.into(),
    })
}

/// Reject regions that are empty, start before 0, or run past the chromosome end.
fn check_bounds(
    track: &str,
    chrom_sizes: &HashMap<String, u64>,
    chrom: &str,
    start: i64,
    end: i64,
) -> Result<(), SignalError> {
    let size = chrom_sizes
        .get(chrom)
        .ok_or_else(|| range_error(track, chrom, start, end, "chromosome not in track"))?;
    if start >= end {
        return Err(range_error(track, chrom, start, end, "empty region"));
    }
    if start < 0 {
        return Err(range_error(track, chrom, start, end, "starts before the chromosome"));
    }
    if end as u64 > *size {
        return Err(range_error(
            track,
            chrom,
            start,
            end,
            format!("chromosome length is {}", size),
        ));
    }
    Ok(())
}

fn open_is_transient(e: &BigWigReadOpenError) -> bool {
    matches!(e, BigWigReadOpenError::IoError(io) if is_transient_io(io))
}

/// Only I/O hiccups are retried; format and chromosome errors fail at once.
fn read_is_transient(e: &BBIReadError) -> bool {
    matches!(e, BBIReadError::IoError(io) if is_transient_io(io))
}

/// BigWig track read through bigtools. The reader sits behind a mutex so
/// feature workers can share one open handle.
pub struct BigWigSource {
    name: String,
    path: PathBuf,
    chrom_sizes: HashMap<String, u64>,
    reader: Mutex<BigWigRead<ReopenableFile>>,
    retries: u32,
}

impl BigWigSource {
    pub fn open(name: &str, path: &Path, retries: u32) -> Result<Self, GuideError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| GuideError::Config(format!("non UTF-8 track path {}", path.display())))?;

        let reader = with_retries("opening bigwig", retries, open_is_transient, || {
            BigWigRead::open_file(path_str)
        })
        .map_err(|e| GuideError::Config(format!("cannot open track {}: {}", path.display(), e)))?;

        let chrom_sizes: HashMap<String, u64> = reader
            .chroms()
            .iter()
            .map(|c| (c.name.clone(), c.length as u64))
            .collect();
        info!(
            "Opened track {} ({} chromosomes) from {}",
            name,
            chrom_sizes.len(),
            path.display()
        );

        Ok(BigWigSource {
            name: name.to_string(),
            path: path.to_path_buf(),
            chrom_sizes,
            reader: Mutex::new(reader),
            retries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SignalSource for BigWigSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&self, chrom: &str, start: i64, end: i64) -> Result<Vec<f32>, SignalError> {
        check_bounds(&self.name, &self.chrom_sizes, chrom, start, end)?;

        let mut reader = self.reader.lock().map_err(|_| SignalError::Read {
            track: self.name.clone(),
            reason: "reader lock poisoned".into(),
        })?;
        with_retries("reading bigwig values", self.retries, read_is_transient, || {
            reader.values(chrom, start as u32, end as u32)
        })
        .map_err(|e| SignalError::Read {
            track: self.name.clone(),
            reason: e.to_string(),
        })
    }
}

type RegionKey = (String, i64, i64);

/// Memoises lookups for the lifetime of a run. Tracks are read-only, so
/// entries are never invalidated.
pub struct CachedSignal<S> {
    inner: S,
    cache: Mutex<HashMap<RegionKey, Arc<Vec<f32>>>>,
}

impl<S: SignalSource> CachedSignal<S> {
    pub fn new(inner: S) -> Self {
        CachedSignal {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_regions(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl<S: SignalSource> SignalSource for CachedSignal<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn query(&self, chrom: &str, start: i64, end: i64) -> Result<Vec<f32>, SignalError> {
        let key = (chrom.to_string(), start, end);
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return Ok(hit.as_ref().clone());
            }
        }

        let values = Arc::new(self.inner.query(chrom, start, end)?);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, Arc::clone(&values));
        }
        debug!("{}: cached {}:{}-{}", self.inner.name(), chrom, start, end);
        Ok(values.as_ref().clone())
    }
}

/// Signal held in memory, one value per base per chromosome.
#[derive(Debug, Clone, Default)]
pub struct StaticSignal {
    name: String,
    chroms: HashMap<String, Vec<f32>>,
    chrom_sizes: HashMap<String, u64>,
}

impl StaticSignal {
    pub fn new(name: &str) -> Self {
        StaticSignal {
            name: name.to_string(),
            ..StaticSignal::default()
        }
    }

    pub fn with_chrom(mut self, chrom: &str, values: Vec<f32>) -> Self {
        self.chrom_sizes.insert(chrom.to_string(), values.len() as u64);
        self.chroms.insert(chrom.to_string(), values);
        self
    }
}

impl SignalSource for StaticSignal {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&self, chrom: &str, start: i64, end: i64) -> Result<Vec<f32>, SignalError> {
        check_bounds(&self.name, &self.chrom_sizes, chrom, start, end)?;
        let values = self
            .chroms
            .get(chrom)
            .ok_or_else(|| range_error(&self.name, chrom, start, end, "chromosome not in track"))?;
        Ok(values[start as usize..end as usize].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSignal {
        inner: StaticSignal,
        calls: AtomicUsize,
    }

    impl SignalSource for CountingSignal {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn query(&self, chrom: &str, start: i64, end: i64) -> Result<Vec<f32>, SignalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.query(chrom, start, end)
        }
    }

    fn track() -> StaticSignal {
        StaticSignal::new("ATAC").with_chrom("chr1", (0..100).map(|v| v as f32).collect())
    }

    #[test]
    fn static_signal_returns_per_base_values() {
        let values = track().query("chr1", 10, 13).unwrap();
        assert_eq!(values, vec![10.0, 11.0, 12.0]);
    }

    #[test]
    fn regions_off_the_track_are_range_errors() {
        let signal = track();
        for (chrom, start, end) in [("chr1", 90, 101), ("chr1", -5, 10), ("chr2", 0, 10), ("chr1", 20, 20)] {
            match signal.query(chrom, start, end) {
                Err(SignalError::Range(e)) => assert_eq!(e.track, "ATAC"),
                other => panic!("expected range error for {}:{}-{}, got {:?}", chrom, start, end, other),
            }
        }
    }

    #[test]
    fn cache_serves_repeated_lookups() {
        let cached = CachedSignal::new(CountingSignal {
            inner: track(),
            calls: AtomicUsize::new(0),
        });
        let first = cached.query("chr1", 5, 9).unwrap();
        let second = cached.query("chr1", 5, 9).unwrap();
        assert_eq!(first, second);
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.cached_regions(), 1);
    }

    #[test]
    fn failed_lookups_are_not_cached() {
        let cached = CachedSignal::new(track());
        assert!(cached.query("chr1", 95, 120).is_err());
        assert_eq!(cached.cached_regions(), 0);
    }

    #[test]
    fn only_io_hiccups_are_retried() {
        let interrupted = || std::io::Error::from(std::io::ErrorKind::Interrupted);
        assert!(read_is_transient(&BBIReadError::IoError(interrupted())));
        assert!(open_is_transient(&BigWigReadOpenError::IoError(interrupted())));

        assert!(!read_is_transient(&BBIReadError::InvalidFile("bad block".into())));
        assert!(!read_is_transient(&BBIReadError::InvalidChromosome("chrZ".into())));
        assert!(!read_is_transient(&BBIReadError::IoError(std::io::Error::from(
            std::io::ErrorKind::UnexpectedEof
        ))));
        assert!(!open_is_transient(&BigWigReadOpenError::NotABigWig));
    }

    #[test]
    fn non_bigwig_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"track type=bedGraph\nchr1\t0\t10\t1.0\n").unwrap();
        let result = BigWigSource::open("bedgraph", file.path(), 3);
        assert!(matches!(result, Err(GuideError::Config(_))));
    }

    #[test]
    fn missing_bigwig_is_config_error() {
        let result = BigWigSource::open("H3K27ac", Path::new("/nonexistent/H3K27ac.bw"), 0);
        assert!(matches!(result, Err(GuideError::Config(_))));
    }
}
