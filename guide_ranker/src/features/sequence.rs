//! Sequence-derived guide features.

use tracing::debug;

const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// Scoring matrix for nucleotides at each protospacer position (1-indexed)
/// Format: [nucleotide][position] where nucleotide: 0=A, 1=C, 2=G, 3=T
pub const NUCLEOTIDE_SCORES: [[f64; 21]; 4] = [
    // A (position 1-20, plus a dummy 0 index since we're 1-indexed)
    [0.0, 0.322, 0.409, 0.324, 0.072, 0.039, 0.143, 0.178, -0.013, 0.439, 0.458, 0.318, 0.254, -0.242, 0.291, 0.106, 0.151, -0.191, -0.673, -0.523, 0.048],
    // C
    [0.0, -0.776, -0.131, -0.5, -0.143, -0.059, -0.079, 0.017, 0.03, -0.245, -0.092, -0.107, 0.174, 0.509, -0.163, -0.108, 0.366, 0.177, 1.0, 0.075, -0.631],
    // G
    [0.0, 0.281, -0.103, 0.088, 0.437, 0.11, 0.344, 0.169, 0.003, 0.013, 0.103, 0.052, -0.431, -0.056, -0.585, -0.223, -0.377, 0.012, -0.326, 0.442, 0.584],
    // T
    [0.0, 0.172, -0.174, 0.087, -0.367, -0.207, -0.402, -0.365, -0.014, -0.206, -0.468, -0.258, 0.006, -0.209, 0.461, 0.227, -0.144, -1.0, -1.0, -1.0, -1.0],
];

pub const PSSM_LENGTH: usize = 20;

/// Maps nucleotides to their index in `NUCLEOTIDE_SCORES` and in the one-hot blocks.
pub fn get_nucleotide_index(nucleotide: u8) -> Option<usize> {
    match nucleotide {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

/// Sum of position-specific scores over a 20-nt protospacer (no PAM).
/// `None` for any other length or for non-ACGT bases.
pub fn calculate_pssm_score(protospacer: &[u8]) -> Option<f64> {
    if protospacer.len() != PSSM_LENGTH {
        debug!("PSSM needs a {}nt protospacer, got {}nt", PSSM_LENGTH, protospacer.len());
        return None;
    }

    let mut score = 0.0;
    for (pos, &nucleotide) in protospacer.iter().enumerate() {
        let idx = get_nucleotide_index(nucleotide)?;
        score += NUCLEOTIDE_SCORES[idx][pos + 1];
    }
    Some(score)
}

/// Rescale a raw PSSM score to 0-100.
pub fn normalize_score(raw_score: f64) -> f64 {
    // Theoretical range: worst/best possible base at each position
    let min_possible_score = -6.798;
    let max_possible_score = 6.534;

    let normalized =
        (raw_score - min_possible_score) / (max_possible_score - min_possible_score) * 100.0;
    normalized.clamp(0.0, 100.0)
}

pub fn onehot_names(window_len: usize) -> Vec<String> {
    let mut names = Vec::with_capacity(window_len * 4);
    for i in 0..window_len {
        for b in BASES {
            names.push(format!("pos{}_{}", i, b as char));
        }
    }
    names
}

/// Positional one-hot encoding, 4 values per base. N encodes as all zeros.
pub fn onehot(window: &[u8], out: &mut Vec<f64>) {
    for &base in window {
        let idx = get_nucleotide_index(base);
        for i in 0..4 {
            out.push(if idx == Some(i) { 1.0 } else { 0.0 });
        }
    }
}

pub fn dinucleotide_names(window_len: usize) -> Vec<String> {
    let mut names = Vec::with_capacity(window_len.saturating_sub(1) * 16);
    for i in 0..window_len.saturating_sub(1) {
        for a in BASES {
            for b in BASES {
                names.push(format!("di{}_{}{}", i, a as char, b as char));
            }
        }
    }
    names
}

/// Positional dinucleotide encoding, 16 values per adjacent pair.
pub fn dinucleotide(window: &[u8], out: &mut Vec<f64>) {
    for pair in window.windows(2) {
        let code = match (get_nucleotide_index(pair[0]), get_nucleotide_index(pair[1])) {
            (Some(a), Some(b)) => Some(a * 4 + b),
            _ => None,
        };
        for i in 0..16 {
            out.push(if code == Some(i) { 1.0 } else { 0.0 });
        }
    }
}

/// GC fraction over the unambiguous bases of `seq`.
pub fn gc_content(seq: &[u8]) -> f64 {
    let (gc, called) = seq.iter().fold((0usize, 0usize), |(gc, called), &b| match b {
        b'G' | b'C' => (gc + 1, called + 1),
        b'A' | b'T' => (gc, called + 1),
        _ => (gc, called),
    });
    if called == 0 {
        0.0
    } else {
        gc as f64 / called as f64
    }
}
