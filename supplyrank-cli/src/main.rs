//! SupplyRank CLI: train supplier models and rank candidate purchases.
//!
//! Commands:
//! - `train`: run the search for one supplier and save its model artifact
//! - `score`: rank the supplier's candidate purchases with a saved artifact

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use supplyrank_core::frame::Frame;
use supplyrank_core::ingest::CorpusReader;
use supplyrank_runner::export::{export_trials_csv, write_candidates_csv};
use supplyrank_runner::{
    prepare_candidates, score_candidates, train_supplier, ModelArtifact, PipelineConfig,
    ScoredCandidate, SupplierRegistry, TrialHistory,
};

#[derive(Parser)]
#[command(
    name = "supplyrank",
    about = "SupplyRank CLI: per-supplier purchase recommendation"
)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a participation model for one supplier.
    Train {
        /// Path to the TOML pipeline config.
        #[arg(long)]
        config: PathBuf,

        /// Supplier id as it appears in the supplier column.
        #[arg(long)]
        supplier: String,

        /// Directory for model artifacts. Defaults to ./models.
        #[arg(long, default_value = "models")]
        output: PathBuf,

        /// Append every trial to this JSONL file.
        #[arg(long)]
        history: Option<PathBuf>,

        /// Also write the trial table as CSV.
        #[arg(long)]
        trials_csv: Option<PathBuf>,
    },
    /// Rank candidate purchases for one supplier.
    Score {
        /// Path to the TOML pipeline config.
        #[arg(long)]
        config: PathBuf,

        /// Supplier id as it appears in the supplier column.
        #[arg(long)]
        supplier: String,

        /// Artifact directory used by `train`. Defaults to ./models.
        #[arg(long, default_value = "models")]
        artifact: PathBuf,

        /// Write the full ranking as CSV.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Number of candidates to print.
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match cli.command {
        Commands::Train {
            config,
            supplier,
            output,
            history,
            trials_csv,
        } => run_train(&config, &supplier, &output, history, trials_csv),
        Commands::Score {
            config,
            supplier,
            artifact,
            output,
            top,
        } => run_score(&config, &supplier, &artifact, output, top),
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to install logger")?;
    Ok(())
}

fn read_corpus(path: &Path, config: &PipelineConfig) -> Result<Frame> {
    CorpusReader::new()
        .with_vector_column(config.train.vector.clone())
        .read(path)
        .with_context(|| format!("failed to load corpus {}", path.display()))
}

fn run_train(
    config_path: &Path,
    supplier: &str,
    output: &Path,
    history: Option<PathBuf>,
    trials_csv: Option<PathBuf>,
) -> Result<()> {
    let config = PipelineConfig::load(config_path)?;
    // Fail before training if the id cannot name an artifact directory.
    ModelArtifact::path_for(output, supplier)?;
    let train = read_corpus(&config.data.train_data, &config)?;

    let trained = train_supplier(&train, supplier, &config, history.map(TrialHistory::new))
        .with_context(|| format!("training failed for supplier {supplier}"))?;

    let path = trained.to_artifact()?.save(output)?;

    if let Some(csv_path) = trials_csv {
        let csv = export_trials_csv(&trained.search.trials)?;
        std::fs::write(&csv_path, csv)
            .with_context(|| format!("failed to write {}", csv_path.display()))?;
    }

    let failed = trained.search.trials.iter().filter(|t| t.is_failed()).count();
    println!("Supplier:    {supplier}");
    println!("Rows:        {} ({} positive)", trained.dataset.len(), trained.dataset.positives());
    println!("Features:    {}", trained.dataset.feature_count());
    println!(
        "Trials:      {} ({} failed)",
        trained.search.trials.len(),
        failed
    );
    println!("Best trial:  {}", trained.search.best_trial);
    println!("CV {}: {:.4}", trained.search.metric, trained.cv_score);
    println!("Artifact:    {}", path.display());
    Ok(())
}

fn run_score(
    config_path: &Path,
    supplier: &str,
    artifact_dir: &Path,
    output: Option<PathBuf>,
    top: usize,
) -> Result<()> {
    let config = PipelineConfig::load(config_path)?;

    let mut registry = SupplierRegistry::new();
    let artifact: ModelArtifact = registry
        .load_from_dir(artifact_dir, supplier)
        .with_context(|| format!("no usable model for supplier {supplier}"))?
        .clone();

    let train = read_corpus(&config.data.train_data, &config)?;
    let candidates = read_corpus(&config.data.candidate_data, &config)?;

    let partition = prepare_candidates(&train, &candidates, supplier, &config)?;
    if partition.used_fallback {
        eprintln!("WARNING: no candidates under the supplier's keys; ranking the full candidate corpus");
    }
    let ranked = score_candidates(&artifact, &partition.candidates)?;

    print_ranking(&ranked, top);

    if let Some(path) = output {
        write_candidates_csv(&ranked, &path)?;
        println!("Ranking saved to: {}", path.display());
    }
    Ok(())
}

fn print_ranking(ranked: &[ScoredCandidate], top: usize) {
    println!("{:>5}  {:<24} {:>8}", "rank", "purchase", "score");
    for c in ranked.iter().take(top) {
        println!("{:>5}  {:<24} {:>8.4}", c.rank, c.id.to_string(), c.score);
    }
    if ranked.len() > top {
        println!("... {} more", ranked.len() - top);
    }
}
