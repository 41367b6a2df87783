use tracing::debug;

use crate::config::{iupac_bases, GuideGeometry, PipelineConfig, TssWindow};
use crate::error::GuideError;
use crate::helper_functions::reverse_complement;
use crate::models::{Candidate, Mode, Sequence, Strand};

/// Enumerates guide windows on both strands of a sequence.
///
/// A window is kept when its PAM matches the geometry's pattern with concrete
/// bases, it holds no `N` (unless tolerated), and its cut site lies inside the
/// TSS window when one is set. Forward hits come first in ascending position,
/// then reverse hits in descending position (5'->3' along the minus strand).
#[derive(Debug, Clone)]
pub struct CandidateScanner {
    geometry: GuideGeometry,
    pam: Vec<&'static [u8]>,
    tss: Option<(u64, TssWindow)>,
}

impl CandidateScanner {
    pub fn new(geometry: &GuideGeometry) -> Result<Self, GuideError> {
        geometry.validate()?;
        let pam = geometry
            .pam
            .bytes()
            .map(|code| {
                iupac_bases(code).ok_or_else(|| {
                    GuideError::Config(format!("invalid PAM symbol '{}'", code as char))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CandidateScanner {
            geometry: geometry.clone(),
            pam,
            tss: None,
        })
    }

    /// Scanner for `mode`, with the mode's TSS window applied when `tss` is known.
    pub fn for_mode(config: &PipelineConfig, mode: Mode, tss: Option<u64>) -> Result<Self, GuideError> {
        let mode_config = config.mode(mode);
        let scanner = CandidateScanner::new(&mode_config.geometry)?;
        Ok(match (tss, mode_config.tss_window) {
            (Some(tss), Some(window)) => scanner.with_tss(tss, window),
            _ => scanner,
        })
    }

    pub fn with_tss(mut self, tss: u64, window: TssWindow) -> Self {
        self.tss = Some((tss, window));
        self
    }

    pub fn geometry(&self) -> &GuideGeometry {
        &self.geometry
    }

    pub fn scan<'a>(&'a self, sequence: &'a Sequence) -> impl Iterator<Item = Candidate> + 'a {
        let positions = (sequence.len() + 1).saturating_sub(self.geometry.window_len());
        let forward = (0..positions).filter_map(move |pos| self.evaluate(sequence, pos, Strand::Forward));
        let reverse = (0..positions)
            .rev()
            .filter_map(move |pos| self.evaluate(sequence, pos, Strand::Reverse));
        forward.chain(reverse)
    }

    fn pam_matches(&self, pam: &[u8]) -> bool {
        pam.len() == self.pam.len()
            && pam
                .iter()
                .zip(&self.pam)
                .all(|(base, allowed)| allowed.contains(base))
    }

    fn evaluate(&self, sequence: &Sequence, pos: usize, strand: Strand) -> Option<Candidate> {
        let len = self.geometry.window_len();
        let window = &sequence.bases[pos..pos + len];
        let oriented = match strand {
            Strand::Forward => window.to_vec(),
            Strand::Reverse => reverse_complement(window),
        };

        let pam_offset = self.geometry.pam_offset();
        let pam = &oriented[pam_offset..pam_offset + self.pam.len()];
        if !self.pam_matches(pam) {
            return None;
        }
        if !self.geometry.tolerate_ambiguous && oriented.contains(&b'N') {
            debug!("{}: skipping {}{} window with ambiguous bases", sequence.id, pos, strand);
            return None;
        }

        let genomic_start = sequence.start_offset.unwrap_or(0) + pos as u64;
        let cut_index = pam_offset - self.geometry.cut_offset;
        let cut_site = match strand {
            Strand::Forward => genomic_start + cut_index as u64,
            Strand::Reverse => genomic_start + (len - 1 - cut_index) as u64,
        };
        if let Some((tss, tss_window)) = self.tss {
            if !tss_window.contains(tss, cut_site) {
                return None;
            }
        }

        let reverse = match strand {
            Strand::Forward => reverse_complement(&oriented),
            Strand::Reverse => window.to_vec(),
        };
        Some(Candidate {
            sequence_window: String::from_utf8_lossy(&oriented).into_owned(),
            reverse_complement: String::from_utf8_lossy(&reverse).into_owned(),
            pam: String::from_utf8_lossy(pam).into_owned(),
            strand,
            position: pos,
            chromosome: sequence.chromosome.clone(),
            genomic_start,
            genomic_end: genomic_start + len as u64,
            cut_site,
        })
    }
}
