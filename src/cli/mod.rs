//! Command-line interface
//!
//! Record files are JSON arrays of objects, one object per transaction.

use clap::{Parser, Subcommand};
use colored::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::behavior::{BehavioralScorer, ProfileStore};
use crate::config::EngineConfig;
use crate::evaluation::Evaluator;
use crate::export::{load_model, save_model, ModelMetadata};
use crate::features::Transaction;
use crate::inference::{ActiveModel, Prediction};
use crate::jobs::{JobStatus, TrainingJobs};
use crate::training::ModelKind;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString {
    s.truecolor(100, 100, 100)
}

fn accent(s: &str) -> ColoredString {
    s.truecolor(120, 170, 255)
}

fn muted(s: &str) -> ColoredString {
    s.truecolor(140, 140, 140)
}

fn ok(s: &str) -> ColoredString {
    s.truecolor(100, 210, 120)
}

fn kv(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "fraud-ensemble")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ensemble fraud scoring engine")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a model on a JSON record file
    Train {
        /// Input records (JSON array)
        #[arg(short, long)]
        data: PathBuf,

        /// Model kind (weighted_forest, isolation_forest, lof, one_class, ensemble)
        #[arg(short, long)]
        model: Option<ModelKind>,

        /// Engine configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of trees
        #[arg(long)]
        trees: Option<usize>,

        /// Decision threshold
        #[arg(long)]
        threshold: Option<f64>,

        /// Held-out fraction
        #[arg(long)]
        test_split: Option<f64>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Output model file (`.json` for JSON, anything else binary)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Score records with a trained model
    Predict {
        /// Trained model file
        #[arg(short, long)]
        model: PathBuf,

        /// Input records (JSON array)
        #[arg(short, long)]
        data: PathBuf,

        /// Output predictions file (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Evaluate a trained model on labeled records
    Evaluate {
        /// Trained model file
        #[arg(short, long)]
        model: PathBuf,

        /// Labeled records (JSON array)
        #[arg(short, long)]
        data: PathBuf,
    },

    /// Show a trained model's summary and metadata
    Inspect {
        /// Trained model file
        #[arg(short, long)]
        model: PathBuf,
    },

    /// Replay records through the behavioural rules, in file order
    Profile {
        /// Input records (JSON array), each with a user id
        #[arg(short, long)]
        data: PathBuf,

        /// Engine configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Read a JSON array of transaction records
pub fn load_records(path: &Path) -> anyhow::Result<Vec<Transaction>> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
    let records: Vec<Transaction> = serde_json::from_str(&json)
        .map_err(|e| anyhow::anyhow!("{} is not a JSON array of records: {}", path.display(), e))?;
    Ok(records)
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    Ok(match path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    })
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_train(
    data_path: &Path,
    model: Option<ModelKind>,
    config_path: Option<&Path>,
    trees: Option<usize>,
    threshold: Option<f64>,
    test_split: Option<f64>,
    seed: Option<u64>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Train");

    step_run("Loading records");
    let start = Instant::now();
    let records = load_records(data_path)?;
    step_done(&format!("{} records in {:?}", records.len(), start.elapsed()));

    let mut config = load_config(config_path)?.training;
    if let Some(kind) = model {
        config.model_kind = kind;
    }
    if let Some(n) = trees {
        config = config.with_num_trees(n);
    }
    if let Some(t) = threshold {
        config = config.with_threshold(t);
    }
    if let Some(f) = test_split {
        config = config.with_test_split(f);
    }
    if let Some(s) = seed {
        config = config.with_seed(s);
    }
    config.validate()?;
    let kind = config.model_kind;

    let jobs = TrainingJobs::new(ActiveModel::new());
    let job_id = jobs.submit(config, records).await;

    let status = loop {
        let status = jobs.status(&job_id).await?;
        if status.is_terminal() {
            break status;
        }
        if let JobStatus::Running { stage, percent } = &status {
            eprint!("\r  {} {:<22} {:>5.1}%", accent("›"), stage.name(), percent);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    };
    eprintln!();

    match status {
        JobStatus::Completed { metrics, summary, .. } => {
            println!();
            kv("Model", &kind.to_string());
            kv("Trees", &summary.n_trees.to_string());
            kv("Training samples", &summary.training_samples.to_string());
            kv("Time", &format!("{:.3}s", summary.training_time_secs));
            match metrics {
                Some(m) => {
                    kv("Accuracy", &format!("{:.4}", m.accuracy));
                    kv("Precision", &format!("{:.4}", m.precision));
                    kv("Recall", &format!("{:.4}", m.recall));
                    kv("F1", &format!("{:.4}", m.f1_score));
                }
                None => kv("Metrics", "not evaluated (no labeled held-out records)"),
            }
        }
        JobStatus::Failed { error } => anyhow::bail!("training failed: {}", error),
        JobStatus::Cancelled => anyhow::bail!("training cancelled"),
        JobStatus::Pending | JobStatus::Running { .. } => anyhow::bail!("training did not finish"),
    }

    if let Some(path) = output {
        let model = jobs
            .active()
            .current()
            .ok_or_else(|| anyhow::anyhow!("no trained model available"))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model")
            .to_string();
        save_model(&model, ModelMetadata::for_model(name, &model), path)?;
        kv("Saved", &path.display().to_string());
    }
    println!();

    Ok(())
}

#[derive(Serialize)]
struct ScoredRecord<'a> {
    id: Option<String>,
    #[serde(flatten)]
    prediction: &'a Prediction,
}

pub fn cmd_predict(model_path: &Path, data_path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    section("Predict");

    let (model, _) = load_model(model_path)?;
    let records = load_records(data_path)?;

    step_run(&format!("Scoring {} records", records.len()));
    let start = Instant::now();
    let predictions = model.predict_batch(&records)?;
    step_done(&format!("{:?}", start.elapsed()));

    let flagged = predictions.iter().filter(|p| p.is_fraud).count();
    println!();
    kv("Model", &model.kind().to_string());
    kv("Flagged", &format!("{} of {}", flagged, predictions.len()));

    let scored: Vec<ScoredRecord> = records
        .iter()
        .zip(&predictions)
        .map(|(tx, prediction)| ScoredRecord { id: tx.id(), prediction })
        .collect();

    match output {
        Some(path) => {
            std::fs::write(path, serde_json::to_string_pretty(&scored)?)?;
            kv("Saved", &path.display().to_string());
        }
        None => {
            println!();
            for (i, s) in scored.iter().enumerate().filter(|(_, s)| s.prediction.is_fraud) {
                let label = s.id.clone().unwrap_or_else(|| format!("#{}", i));
                println!(
                    "  {} {:<12} risk {:>3}  {}",
                    "!".red().bold(),
                    label,
                    s.prediction.risk_score,
                    dim(&s.prediction.explanation.join("; "))
                );
            }
        }
    }
    println!();

    Ok(())
}

pub fn cmd_evaluate(model_path: &Path, data_path: &Path) -> anyhow::Result<()> {
    section("Evaluate");

    let (model, _) = load_model(model_path)?;
    let records = load_records(data_path)?;
    let report = Evaluator::new().evaluate(&model, &records)?;

    println!();
    for line in report.to_string().lines() {
        println!("  {}", line);
    }
    println!();

    Ok(())
}

pub fn cmd_inspect(model_path: &Path) -> anyhow::Result<()> {
    section("Inspect");

    let (model, metadata) = load_model(model_path)?;
    let summary = model.summary();

    kv("Name", &metadata.name);
    kv("Version", &metadata.version);
    kv("Kind", &summary.kind.to_string());
    kv("Trained at", &summary.trained_at.to_rfc3339());
    kv("Threshold", &format!("{:.3}", summary.threshold));
    kv("Trees", &summary.n_trees.to_string());
    kv("Max depth", &summary.max_depth.to_string());
    kv("Training samples", &summary.training_samples.to_string());
    kv("Features", &summary.features.join(", "));

    if !summary.feature_importances.is_empty() {
        section("Feature importance");
        for (name, importance) in summary.feature_importances.iter().take(10) {
            println!("  {:<18} {:.4}", muted(name), importance);
        }
    }
    if let Some(metrics) = &summary.metrics {
        section("Held-out metrics");
        for line in metrics.to_string().lines() {
            println!("  {}", line);
        }
    }
    println!();

    Ok(())
}

pub fn cmd_profile(data_path: &Path, config_path: Option<&Path>) -> anyhow::Result<()> {
    section("Profile");

    let config = load_config(config_path)?;
    let records = load_records(data_path)?;
    let store = Arc::new(ProfileStore::new(&config.profiles)?);
    let scorer = BehavioralScorer::new(Arc::clone(&store)).with_rules(config.behavior);

    let mut suspicious = 0;
    for (i, tx) in records.iter().enumerate() {
        let assessment = scorer.assess(tx)?;
        if assessment.is_suspicious {
            suspicious += 1;
            let label = tx.id().unwrap_or_else(|| format!("#{}", i));
            println!(
                "  {} {:<12} user {:<12} score {:.2}  {}",
                "!".red().bold(),
                label,
                assessment.user_id,
                assessment.risk_score,
                dim(&assessment.reasons.join("; "))
            );
        }
    }

    let stats = store.stats();
    println!();
    kv("Records", &records.len().to_string());
    kv("Suspicious", &suspicious.to_string());
    kv("Profiles", &stats.profiles.to_string());
    kv("Evicted", &stats.evicted.to_string());
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(&path, r#"[{"Amount": 12.5, "Class": 0}, {"Amount": "99", "merchant": "casino"}]"#).unwrap();

        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].amount(), Some(99.0));
        assert_eq!(records[1].merchant(), Some("casino"));
    }

    #[test]
    fn test_load_records_rejects_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(&path, r#"{"Amount": 1}"#).unwrap();
        assert!(load_records(&path).is_err());
    }

    #[test]
    fn test_cli_parses_model_kind() {
        let cli = Cli::try_parse_from(["fraud-ensemble", "train", "--data", "x.json", "--model", "isolation_forest"]).unwrap();
        match cli.command {
            Commands::Train { model, .. } => assert_eq!(model, Some(ModelKind::IsolationForest)),
            _ => panic!("expected train"),
        }
    }
}
