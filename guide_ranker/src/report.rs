//! Ranked guides of every input record as one output table.

use std::path::Path;

use polars::prelude::*;
use tracing::{info, warn};

use crate::helper_functions::dataframe_to_csv;
use crate::pipeline::RunReport;

pub const OUTPUT_COLUMNS: [&str; 12] = [
    "ID",
    "Start",
    "End",
    "Strand",
    "Sequence",
    "ReverseComplement",
    "PAM",
    "Chromosome",
    "GenomicStart",
    "GenomicEnd",
    "Score",
    "Rank",
];

#[derive(Default)]
struct Rows {
    id: Vec<String>,
    start: Vec<u64>,
    end: Vec<u64>,
    strand: Vec<String>,
    sequence: Vec<String>,
    reverse_complement: Vec<String>,
    pam: Vec<String>,
    chromosome: Vec<Option<String>>,
    genomic_start: Vec<u64>,
    genomic_end: Vec<u64>,
    score: Vec<f64>,
    /// One column per model, in first-seen order.
    members: Vec<(String, Vec<Option<f64>>)>,
    rank: Vec<u64>,
}

/// Column name for a model's own score; never shadows a fixed column.
fn member_column(model: &str) -> String {
    if OUTPUT_COLUMNS.contains(&model) {
        format!("{}_model", model)
    } else {
        model.to_string()
    }
}

/// Build the output table, records in input order and guides in rank order.
/// Each model's own score gets a column between `Score` and `Rank`.
/// `top` keeps at most that many guides per record.
pub fn ranked_guides_frame(reports: &[RunReport], top: Option<usize>) -> PolarsResult<DataFrame> {
    let mut rows = Rows::default();
    for guide in reports.iter().flat_map(|r| &r.guides) {
        for (name, _) in &guide.member_scores {
            if !rows.members.iter().any(|(n, _)| n == name) {
                rows.members.push((name.clone(), Vec::new()));
            }
        }
    }
    for report in reports {
        let keep = top.unwrap_or(report.guides.len());
        for guide in report.guides.iter().take(keep) {
            let c = &guide.candidate;
            rows.id.push(report.sequence_id.clone());
            rows.start.push(c.position as u64);
            rows.end.push((c.position + c.sequence_window.len()) as u64);
            rows.strand.push(c.strand.to_string());
            rows.sequence.push(c.sequence_window.clone());
            rows.reverse_complement.push(c.reverse_complement.clone());
            rows.pam.push(c.pam.clone());
            rows.chromosome.push(c.chromosome.clone());
            rows.genomic_start.push(c.genomic_start);
            rows.genomic_end.push(c.genomic_end);
            rows.score.push(guide.score);
            for (name, column) in rows.members.iter_mut() {
                let value = guide
                    .member_scores
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, s)| *s);
                column.push(value);
            }
            rows.rank.push(guide.rank as u64);
        }
    }

    let [id, start, end, strand, sequence, rc, pam, chrom, gstart, gend, score, rank] =
        OUTPUT_COLUMNS.map(PlSmallStr::from_static);
    let mut columns = vec![
        Column::new(id, rows.id),
        Column::new(start, rows.start),
        Column::new(end, rows.end),
        Column::new(strand, rows.strand),
        Column::new(sequence, rows.sequence),
        Column::new(rc, rows.reverse_complement),
        Column::new(pam, rows.pam),
        Column::new(chrom, rows.chromosome),
        Column::new(gstart, rows.genomic_start),
        Column::new(gend, rows.genomic_end),
        Column::new(score, rows.score),
    ];
    for (name, values) in rows.members {
        columns.push(Column::new(PlSmallStr::from(member_column(&name)), values));
    }
    columns.push(Column::new(rank, rows.rank));
    DataFrame::new(columns)
}

/// Write the table to `path`. Returns the number of rows written; nothing is
/// written when there are no guides.
pub fn write_ranked_guides(reports: &[RunReport], top: Option<usize>, path: &Path) -> PolarsResult<usize> {
    let mut df = ranked_guides_frame(reports, top)?;
    if df.height() == 0 {
        warn!("No guides found. Nothing written to {}", path.display());
        return Ok(0);
    }
    dataframe_to_csv(&mut df, path)?;
    info!("Wrote {} guides to {}", df.height(), path.display());
    Ok(df.height())
}
