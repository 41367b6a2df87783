use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use guide_ranker::config::PipelineConfig;
use guide_ranker::data_handling::fasta::parse_locus;
use guide_ranker::data_handling::{BigWigSource, CachedSignal, FastaSource, SequenceSource, SignalSource};
use guide_ranker::features::FeatureBuilder;
use guide_ranker::helper_functions::resolve_path;
use guide_ranker::models::Mode;
use guide_ranker::pipeline::RankingPipeline;
use guide_ranker::prediction_tools::load_models;
use guide_ranker::report::write_ranked_guides;
use guide_ranker::scanner::CandidateScanner;

/// Rank CRISPRi / CRISPRa guides for the loci in a FASTA file.
#[derive(Parser, Debug)]
#[command(name = "guide_ranker", version, about)]
struct Cli {
    /// Input FASTA; record ids may carry a chr:start-end locus
    #[arg(short, long)]
    input: PathBuf,

    /// Output CSV
    #[arg(short, long)]
    output: PathBuf,

    /// i (CRISPRi) or a (CRISPRa)
    #[arg(long)]
    mode: String,

    /// Pipeline configuration (JSON); defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Genomic TSS coordinate, enables the mode's TSS window and tss_offset feature
    #[arg(long)]
    tss: Option<u64>,

    /// chr:start-end locus for every record, overrides the ids
    #[arg(long)]
    region: Option<String>,

    /// Keep only the N best guides per record
    #[arg(long)]
    top: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mode: Mode = cli.mode.parse()?;
    info!("Starting {} guide ranking", mode.label());

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(&resolve_path(path))?,
        None => PipelineConfig::default(),
    };
    let region = cli
        .region
        .as_deref()
        .map(|r| parse_locus(r).ok_or_else(|| anyhow!("cannot parse region '{}'", r)))
        .transpose()?;

    // Everything that can be misconfigured is checked before any input is read.
    let model_dir = config.model_dir(mode)?;
    let model = load_models(&model_dir, mode)?;

    let mut tracks: Vec<Arc<dyn SignalSource>> = Vec::new();
    for (name, path) in config.resolve_tracks()? {
        let source = BigWigSource::open(&name, &path, config.io_retries)?;
        tracks.push(Arc::new(CachedSignal::new(source)));
    }
    info!("Using {} signal tracks", tracks.len());

    let scanner = CandidateScanner::for_mode(&config, mode, cli.tss)?;
    let builder = FeatureBuilder::new(
        &config.features,
        &config.mode(mode).geometry,
        tracks,
        cli.tss,
    );
    let pipeline = RankingPipeline::new(mode, scanner, builder, model.as_ref())?;

    let reader = FastaSource::new(config.max_sequence_length, config.io_retries);
    let mut sequences = reader.read(&cli.input)?;
    if let Some(locus) = &region {
        info!("Placing every record at {}:{}", locus.chromosome, locus.start);
        for seq in sequences.iter_mut() {
            seq.chromosome = Some(locus.chromosome.clone());
            seq.start_offset = Some(locus.start);
        }
    }

    let mut reports = Vec::with_capacity(sequences.len());
    for seq in &sequences {
        let report = pipeline
            .run(seq)
            .with_context(|| format!("ranking guides for {}", seq.id))?;
        if !report.dropped.is_empty() {
            warn!("{}: {} candidates dropped", seq.id, report.dropped.len());
        }
        info!("{}: {} guides ranked", seq.id, report.guides.len());
        reports.push(report);
    }

    let written = write_ranked_guides(&reports, cli.top, &cli.output)
        .with_context(|| format!("writing {}", cli.output.display()))?;
    info!("Done: {} rows", written);
    Ok(())
}
