use std::fs;
use std::path::Path;
use std::sync::Arc;

use guide_ranker::config::{FeatureConfig, GuideGeometry, SequenceFeature, Statistic};
use guide_ranker::data_handling::{CachedSignal, FastaSource, SequenceSource, SignalSource, StaticSignal};
use guide_ranker::helper_functions::read_csv;
use guide_ranker::prediction_tools::load_models;
use guide_ranker::report::write_ranked_guides;
use guide_ranker::{CandidateScanner, FeatureBuilder, GuideError, Mode, RankingPipeline, Strand};
use tempfile::tempdir;

const MANIFEST: &str = r#"{
    "name": "crispri_test",
    "mode": "i",
    "kind": "linear",
    "features": ["gc_content", "strand", "H3K4me3_0"],
    "weights": {"strand": 1.0, "H3K4me3_0": 0.5},
    "intercept": 0.0
}"#;

fn features() -> FeatureConfig {
    FeatureConfig {
        sequence: vec![SequenceFeature::Gc, SequenceFeature::Strand],
        tracks: Vec::new(),
        extensions: vec![0],
        statistics: vec![Statistic::Mean],
    }
}

fn write_fasta(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("loci.fa");
    fs::write(
        &path,
        ">promoter chr1:101-137\nCCCCCCCCCCACGTACGTACGTACGTAGGGGGGGGGG\n>no_pam\nACACACACACACACACACACACACACACACACAC\n",
    )
    .unwrap();
    path
}

#[test]
fn fasta_to_ranked_csv() {
    let dir = tempdir().unwrap();
    let model_dir = dir.path().join("model_crispri");
    fs::create_dir(&model_dir).unwrap();
    fs::write(model_dir.join("linear.json"), MANIFEST).unwrap();

    let model = load_models(&model_dir, Mode::Interference).unwrap();
    let track: Arc<dyn SignalSource> = Arc::new(CachedSignal::new(
        StaticSignal::new("H3K4me3").with_chrom("chr1", vec![2.0; 1_000]),
    ));
    let geometry = GuideGeometry::default();
    let pipeline = RankingPipeline::new(
        Mode::Interference,
        CandidateScanner::new(&geometry).unwrap(),
        FeatureBuilder::new(&features(), &geometry, vec![track], None),
        model.as_ref(),
    )
    .unwrap();

    let sequences = FastaSource::new(500, 0).read(&write_fasta(dir.path())).unwrap();
    assert_eq!(sequences.len(), 2);
    assert_eq!(sequences[0].chromosome.as_deref(), Some("chr1"));
    assert_eq!(sequences[0].start_offset, Some(100));

    let reports: Vec<_> = sequences.iter().map(|s| pipeline.run(s).unwrap()).collect();
    let promoter = &reports[0];
    assert!(promoter.dropped.is_empty());
    assert!(reports[1].guides.is_empty());

    // Forward guides carry the strand weight and must outrank every reverse one.
    let first_reverse = promoter
        .guides
        .iter()
        .position(|g| g.candidate.strand == Strand::Reverse)
        .unwrap();
    assert!(first_reverse > 0);
    assert!(promoter.guides[first_reverse..]
        .iter()
        .all(|g| g.candidate.strand == Strand::Reverse));
    assert!(promoter.guides.iter().all(|g| g.candidate.genomic_start >= 100));

    let out = dir.path().join("results").join("guides.csv");
    let written = write_ranked_guides(&reports, Some(3), &out).unwrap();
    assert_eq!(written, 3);

    let df = read_csv(&out).unwrap();
    assert_eq!(df.height(), 3);
    let ranks: Vec<Option<i64>> = df.column("Rank").unwrap().i64().unwrap().into_iter().collect();
    assert_eq!(ranks, vec![Some(1), Some(2), Some(3)]);
    let pams: Vec<Option<&str>> = df.column("PAM").unwrap().str().unwrap().into_iter().collect();
    assert!(pams.iter().all(|p| p.map(|p| p.ends_with("GG")).unwrap_or(false)));
}

#[test]
fn manifest_for_other_mode_is_rejected_before_scanning() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("linear.json"), MANIFEST).unwrap();
    assert!(matches!(
        load_models(dir.path(), Mode::Activation),
        Err(GuideError::Config(_))
    ));
}

#[test]
fn mismatched_feature_layout_is_a_config_error() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("linear.json"), MANIFEST).unwrap();
    let model = load_models(dir.path(), Mode::Interference).unwrap();

    // No signal track, so the builder produces two columns instead of three.
    let geometry = GuideGeometry::default();
    let result = RankingPipeline::new(
        Mode::Interference,
        CandidateScanner::new(&geometry).unwrap(),
        FeatureBuilder::new(&features(), &geometry, Vec::new(), None),
        model.as_ref(),
    );
    assert!(matches!(result, Err(GuideError::Config(_))));
}

#[test]
fn every_model_score_reaches_the_csv() {
    let dir = tempdir().unwrap();
    let model_dir = dir.path().join("model_crispri");
    fs::create_dir(&model_dir).unwrap();
    for (file, name, weight) in [("a.json", "K562", 10.0), ("b.json", "HEK293", -10.0)] {
        fs::write(
            model_dir.join(file),
            format!(
                r#"{{"name": "{}", "mode": "i", "kind": "linear", "features": ["gc_content"],
                    "weights": {{"gc_content": {}}}}}"#,
                name, weight
            ),
        )
        .unwrap();
    }
    let model = load_models(&model_dir, Mode::Interference).unwrap();

    let gc_only = FeatureConfig {
        sequence: vec![SequenceFeature::Gc],
        ..features()
    };
    let geometry = GuideGeometry::default();
    let pipeline = RankingPipeline::new(
        Mode::Interference,
        CandidateScanner::new(&geometry).unwrap(),
        FeatureBuilder::new(&gc_only, &geometry, Vec::new(), None),
        model.as_ref(),
    )
    .unwrap();

    let sequences = FastaSource::new(500, 0).read(&write_fasta(dir.path())).unwrap();
    let reports: Vec<_> = sequences.iter().map(|s| pipeline.run(s).unwrap()).collect();
    let out = dir.path().join("guides.csv");
    let written = write_ranked_guides(&reports, None, &out).unwrap();
    assert!(written > 0);

    let df = read_csv(&out).unwrap();
    let column = |name: &str| -> Vec<f64> {
        df.column(name)
            .unwrap()
            .cast(&polars::prelude::DataType::Float64)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap())
            .collect()
    };
    let k562 = column("K562");
    let hek293 = column("HEK293");
    let score = column("Score");
    assert!(k562.iter().any(|v| *v != 0.0));
    for ((k, h), s) in k562.iter().zip(&hek293).zip(&score) {
        assert!((k + h).abs() < 1e-9);
        assert!(s.abs() < 1e-9);
    }
}
