//! Vehicle damage analysis CLI
//!
//! The `damage` command analyzes vehicle photos and keeps a per-user history.
//!
//! ## Commands
//!
//! - `analyze`: Store, analyze and record one or more images
//! - `history`: List a user's analyses, newest first
//! - `show`: Print one stored analysis
//! - `summary`: Aggregate counts and cost for a user
//! - `delete`: Remove an analysis and its image
//! - `inspect`: Analyze an image without storing anything

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use damage_core::{
    load_classifier, AnalysisPipeline, AnalysisResult, AnalyzerConfig, DamageClassifier,
    FixedClassifier, METRICS,
};
use damage_intake::{AnalysisService, ServiceError, Submission};
use damage_state::{
    AnalysisId, AnalysisRecord, FsBlobStore, HistoryFilter, RecordStatus, SurrealAnalysisStore,
    UserId,
};

#[derive(Parser)]
#[command(name = "damage")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Vehicle damage analysis", long_about = None)]
struct Cli {
    /// Configuration file (TOML). Falls back to $DAMAGE_CONFIG, then defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Skip the model and report this confidence for every image
    #[arg(long, global = true, value_name = "F")]
    demo_confidence: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store, analyze and record images
    Analyze {
        /// Image files to analyze
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Owner of the analyses
        #[arg(short, long)]
        user: String,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// Maximum images analyzed at once
        #[arg(long, default_value = "4")]
        concurrency: usize,
    },

    /// List a user's analyses, newest first
    History {
        #[arg(short, long)]
        user: String,

        /// all, damaged or undamaged
        #[arg(short, long, default_value = "all")]
        filter: HistoryFilter,

        /// Maximum number of analyses to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show one analysis as JSON
    Show {
        /// Analysis ID
        id: String,

        #[arg(short, long)]
        user: String,
    },

    /// Aggregate counts and estimated cost for a user
    Summary {
        #[arg(short, long)]
        user: String,
    },

    /// Delete an analysis and its stored image
    Delete {
        /// Analysis ID
        id: String,

        #[arg(short, long)]
        user: String,
    },

    /// Analyze an image without storing it
    Inspect {
        image: PathBuf,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    damage_core::init_tracing(cli.json_logs, level);

    let result = run(cli).await;
    METRICS.flush();
    result
}

async fn run(cli: Cli) -> Result<()> {
    let config =
        AnalyzerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let pipeline = Arc::new(build_pipeline(&config, cli.demo_confidence)?);

    match cli.command {
        Commands::Inspect { image, json } => cmd_inspect(&pipeline, &image, json),
        Commands::Analyze {
            images,
            user,
            json,
            concurrency,
        } => {
            let service = open_service(&config, pipeline).await?;
            cmd_analyze(&service, &parse_user(&user)?, &images, json, concurrency).await
        }
        Commands::History {
            user,
            filter,
            limit,
        } => {
            let service = open_service(&config, pipeline).await?;
            cmd_history(&service, &parse_user(&user)?, filter, limit).await
        }
        Commands::Show { id, user } => {
            let service = open_service(&config, pipeline).await?;
            cmd_show(&service, &parse_user(&user)?, &id).await
        }
        Commands::Summary { user } => {
            let service = open_service(&config, pipeline).await?;
            cmd_summary(&service, &parse_user(&user)?).await
        }
        Commands::Delete { id, user } => {
            let service = open_service(&config, pipeline).await?;
            cmd_delete(&service, &parse_user(&user)?, &id).await
        }
    }
}

fn build_pipeline(
    config: &AnalyzerConfig,
    demo_confidence: Option<f64>,
) -> Result<AnalysisPipeline> {
    let classifier: Arc<dyn DamageClassifier> = match demo_confidence {
        Some(confidence) => {
            if !(0.0..=1.0).contains(&confidence) {
                bail!("--demo-confidence must be within [0, 1], got {confidence}");
            }
            Arc::new(FixedClassifier::new(confidence))
        }
        None => load_classifier(&config.model.weights_path),
    };
    AnalysisPipeline::from_config(config, classifier).context("Invalid analysis configuration")
}

async fn open_service(
    config: &AnalyzerConfig,
    pipeline: Arc<AnalysisPipeline>,
) -> Result<AnalysisService> {
    let store = match &config.storage.database_url {
        Some(url) => SurrealAnalysisStore::connect(url).await,
        None => SurrealAnalysisStore::from_env().await,
    }
    .context("Failed to connect to analysis database")?;

    let blobs = FsBlobStore::new(&config.storage.blob_dir).with_context(|| {
        format!(
            "Failed to open image directory {}",
            config.storage.blob_dir.display()
        )
    })?;

    Ok(AnalysisService::new(pipeline, Arc::new(store), Arc::new(blobs)))
}

fn parse_user(raw: &str) -> Result<UserId> {
    UserId::new(raw).with_context(|| format!("Invalid user id '{}'", raw))
}

/// One line of `analyze --json` output.
#[derive(Serialize)]
struct AnalyzeOutput<'a> {
    file: String,
    analysis_id: Option<&'a AnalysisId>,
    result: Option<&'a AnalysisResult>,
    error: Option<String>,
}

impl<'a> AnalyzeOutput<'a> {
    /// A failed analysis still names the `Failed` record it left behind.
    fn new(file: String, outcome: &'a std::result::Result<AnalysisRecord, ServiceError>) -> Self {
        match outcome {
            Ok(record) => Self {
                file,
                analysis_id: Some(&record.id),
                result: record.result.as_ref(),
                error: None,
            },
            Err(e) => Self {
                file,
                analysis_id: match e {
                    ServiceError::Analysis { record_id, .. } => Some(record_id),
                    _ => None,
                },
                result: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Store, analyze and record each image
async fn cmd_analyze(
    service: &AnalysisService,
    user: &UserId,
    images: &[PathBuf],
    json: bool,
    concurrency: usize,
) -> Result<()> {
    let mut submissions = Vec::with_capacity(images.len());
    for path in images {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        submissions.push(Submission::new(file_name_of(path), bytes));
    }

    let outcomes = service.submit_batch(user, submissions, concurrency).await;

    let mut failures = 0usize;
    for (path, outcome) in images.iter().zip(&outcomes) {
        let file = path.display().to_string();
        if outcome.is_err() {
            failures += 1;
        }
        if json {
            print_json(&AnalyzeOutput::new(file, outcome))?;
            continue;
        }
        match outcome {
            Ok(record) => {
                println!("{} -> {}", file, record.id);
                if let Some(result) = &record.result {
                    print_result(result);
                }
            }
            Err(e) => eprintln!("{}: {}", file, e),
        }
    }

    info!(
        submitted = images.len(),
        failed = failures,
        "analyze finished"
    );
    if failures > 0 {
        bail!("{} of {} images could not be analyzed", failures, images.len());
    }
    Ok(())
}

/// Show a user's history
async fn cmd_history(
    service: &AnalysisService,
    user: &UserId,
    filter: HistoryFilter,
    limit: Option<usize>,
) -> Result<()> {
    let records = service
        .history(user, filter, limit)
        .await
        .context("Failed to load history")?;

    if records.is_empty() {
        println!("No analyses found for '{}'", user);
        return Ok(());
    }

    for record in &records {
        println!("{}", history_line(record));
    }
    Ok(())
}

/// Show one analysis
async fn cmd_show(service: &AnalysisService, user: &UserId, id: &str) -> Result<()> {
    let record = service
        .get(user, &AnalysisId::from(id))
        .await
        .context(format!("Failed to load analysis '{}'", id))?;
    print_json(&record)
}

async fn cmd_summary(service: &AnalysisService, user: &UserId) -> Result<()> {
    let summary = service
        .summary(user)
        .await
        .context("Failed to compute summary")?;

    println!("User:            {}", user);
    println!("Analyses:        {}", summary.total_analyses);
    println!("  completed:     {}", summary.completed);
    println!("  failed:        {}", summary.failed);
    println!("Damaged:         {}", summary.damaged);
    println!("Undamaged:       {}", summary.undamaged);
    println!("Estimated cost:  {:.2}", summary.total_estimated_cost);
    if let Some(last) = summary.last_analysis_at {
        println!("Last analysis:   {}", last.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    Ok(())
}

/// Delete an analysis
async fn cmd_delete(service: &AnalysisService, user: &UserId, id: &str) -> Result<()> {
    let record = service
        .delete(user, &AnalysisId::from(id))
        .await
        .context(format!("Failed to delete analysis '{}'", id))?;

    println!("Deleted analysis {} ({})", record.id, record.file_name);
    Ok(())
}

/// Analyze without persisting
fn cmd_inspect(pipeline: &AnalysisPipeline, image: &Path, json: bool) -> Result<()> {
    let result = pipeline
        .analyze_file(image)
        .with_context(|| format!("Failed to analyze {}", image.display()))?;

    if json {
        print_json(&result)
    } else {
        println!("{} (classifier: {})", image.display(), pipeline.classifier().name());
        print_result(&result);
        Ok(())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_result(result: &AnalysisResult) {
    println!(
        "  damage: {}  confidence: {:.3}  severity: {}",
        if result.damage_detected { "yes" } else { "no" },
        result.confidence,
        result.severity
    );
    for finding in &result.damage_types {
        println!(
            "  - {:?} at {} ({})",
            finding.kind, finding.location, finding.severity
        );
    }
    let cost = &result.cost_estimation;
    println!(
        "  estimated cost: {:.2} (labor {:.2}, parts {:.2}, paint {:.2})",
        cost.total_cost, cost.labor_cost, cost.parts_cost, cost.paint_cost
    );
}

fn history_line(record: &AnalysisRecord) -> String {
    let outcome = match (&record.status, &record.result, &record.failure) {
        (RecordStatus::Completed, Some(result), _) => format!(
            "{:<6} {:>9.2}",
            result.severity.as_str(),
            result.cost_estimation.total_cost
        ),
        (_, _, Some(failure)) => format!("failed: {}", failure.kind),
        _ => record.status.as_str().to_string(),
    };
    format!(
        "{}  {}  {:<24} {}",
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        record.id,
        record.file_name,
        outcome
    )
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use damage_state::fakes::{MemoryAnalysisStore, MemoryBlobStore};
    use damage_state::AnalysisStore;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    fn png_file(dir: &Path, name: &str) -> PathBuf {
        let img = RgbImage::from_fn(32, 32, |x, y| Rgb([x as u8 * 8, y as u8 * 8, 90]));
        let path = dir.join(name);
        DynamicImage::ImageRgb8(img)
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();
        path
    }

    fn demo_service(confidence: f64) -> (AnalysisService, Arc<MemoryAnalysisStore>) {
        let pipeline = build_pipeline(&AnalyzerConfig::default(), Some(confidence)).unwrap();
        let store = Arc::new(MemoryAnalysisStore::new());
        let service = AnalysisService::new(
            Arc::new(pipeline),
            store.clone(),
            Arc::new(MemoryBlobStore::new()),
        );
        (service, store)
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "damage",
            "history",
            "--user",
            "alice",
            "--filter",
            "damaged",
            "--demo-confidence",
            "0.9",
        ])
        .unwrap();
        assert_eq!(cli.demo_confidence, Some(0.9));
        match cli.command {
            Commands::History { user, filter, .. } => {
                assert_eq!(user, "alice");
                assert_eq!(filter, HistoryFilter::Damaged);
            }
            _ => panic!("expected history"),
        }
    }

    #[test]
    fn rejects_out_of_range_demo_confidence() {
        assert!(build_pipeline(&AnalyzerConfig::default(), Some(1.5)).is_err());
    }

    #[test]
    fn missing_model_still_builds_a_pipeline() {
        let mut config = AnalyzerConfig::default();
        config.model.weights_path = PathBuf::from("/nonexistent/probe.json");
        let pipeline = build_pipeline(&config, None).unwrap();
        assert_eq!(pipeline.classifier().name(), "unavailable");
    }

    #[tokio::test]
    async fn analyze_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let image = png_file(dir.path(), "door.png");
        let (service, store) = demo_service(0.7);
        let alice = parse_user("alice").unwrap();

        cmd_analyze(&service, &alice, &[image], true, 2).await.unwrap();
        let records = service
            .history(&alice, HistoryFilter::All, None)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_name, "door.png");

        cmd_delete(&service, &alice, records[0].id.as_str())
            .await
            .unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn analyze_reports_partial_failure() {
        let dir = tempfile::tempdir().unwrap();
        let good = png_file(dir.path(), "good.png");
        let bad = dir.path().join("bad.png");
        std::fs::write(&bad, b"not a png").unwrap();
        let (service, store) = demo_service(0.2);
        let bob = parse_user("bob").unwrap();

        let err = cmd_analyze(&service, &bob, &[good, bad], false, 1)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1 of 2"));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn json_output_names_failed_record() {
        let (service, store) = demo_service(0.5);
        let bob = parse_user("bob").unwrap();
        let outcome = service
            .submit(&bob, Submission::new("bad.png", b"not a png".to_vec()))
            .await;

        let ServiceError::Analysis { record_id, .. } = outcome.as_ref().unwrap_err() else {
            panic!("expected analysis error");
        };
        let output = AnalyzeOutput::new("bad.png".to_string(), &outcome);
        assert_eq!(output.analysis_id, Some(record_id));
        assert!(output.result.is_none());
        assert!(output.error.is_some());

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["analysis_id"], record_id.as_str());
        assert_eq!(
            store.get(&bob, record_id).await.unwrap().status,
            RecordStatus::Failed
        );
    }

    #[tokio::test]
    async fn show_rejects_other_users_records() {
        let dir = tempfile::tempdir().unwrap();
        let image = png_file(dir.path(), "hood.png");
        let (service, _store) = demo_service(0.95);
        let alice = parse_user("alice").unwrap();
        cmd_analyze(&service, &alice, &[image], false, 1)
            .await
            .unwrap();
        let id = service.history(&alice, HistoryFilter::All, None).await.unwrap()[0]
            .id
            .clone();

        let mallory = parse_user("mallory").unwrap();
        assert!(cmd_show(&service, &mallory, id.as_str()).await.is_err());
        assert!(cmd_show(&service, &alice, id.as_str()).await.is_ok());
    }

    #[test]
    fn inspect_runs_without_storage() {
        let dir = tempfile::tempdir().unwrap();
        let image = png_file(dir.path(), "bumper.png");
        let pipeline = build_pipeline(&AnalyzerConfig::default(), Some(0.85)).unwrap();
        cmd_inspect(&pipeline, &image, true).unwrap();
        assert!(cmd_inspect(&pipeline, &dir.path().join("missing.png"), false).is_err());
    }

    #[test]
    fn blank_user_is_rejected() {
        assert!(parse_user("   ").is_err());
    }
}
