//! The `hazardscan scan` command: discover images, analyze them, write the report.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, ValueEnum};
use hazardscan_core::output::create_output_file;
use hazardscan_core::report::columns;
use hazardscan_core::{
    Analyzer, AnalyzerOptions, BatchRunner, ClipScorer, Config, FileDiscovery, ObjectDetector,
    OutputFormat, OutputWriter, ProcessingStats, Taxonomy, YoloDetector,
};
use tokio::sync::watch;

/// Arguments for the `scan` command.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Image file or directory to scan
    #[arg(required = true)]
    pub input: PathBuf,

    /// Report file [default: output.path from config]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Report format [default: output.format from config]
    #[arg(short, long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Number of images analyzed concurrently
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Maximum tags retained per image
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Minimum probability (exclusive) for a tag to be retained
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Taxonomy file replacing the built-in tag set
    #[arg(long)]
    pub taxonomy: Option<PathBuf>,

    /// Skip object detection; the objects column stays empty
    #[arg(long)]
    pub no_detector: bool,

    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Add a diagnostics column to CSV output
    #[arg(long)]
    pub diagnostics: bool,
}

/// Report formats accepted on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Comma-separated values with a header row
    Csv,
    /// Single JSON array
    Json,
    /// One JSON object per line
    Jsonl,
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportFormat::Csv => write!(f, "csv"),
            ReportFormat::Json => write!(f, "json"),
            ReportFormat::Jsonl => write!(f, "jsonl"),
        }
    }
}

/// Execute the scan command.
pub async fn execute(args: ScanArgs) -> anyhow::Result<()> {
    let mut config = Config::load().with_context(|| {
        format!(
            "Invalid config file at {}",
            Config::default_path().display()
        )
    })?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    let format = OutputFormat::parse(&config.output.format)
        .with_context(|| format!("Unknown output format {:?}", config.output.format))?;
    let taxonomy = Arc::new(Taxonomy::load(config.taxonomy_path().as_deref())?);

    if !args.input.exists() {
        anyhow::bail!("Input not found: {}", args.input.display());
    }
    let files = FileDiscovery::new(&config.processing).discover(&args.input);

    // Models load even for an empty input so broken installs fail up front.
    let analyzer = Arc::new(load_analyzer(&config, taxonomy.clone())?);
    let runner = BatchRunner::new(analyzer, &config);

    let report_path = resolve_report_path(&config.output.path, format, args.output.is_some());
    let mut writer = open_report(&config, format, &taxonomy, &report_path)?;

    if files.is_empty() {
        tracing::warn!(
            "No supported images ({}) found at {:?}",
            config.processing.supported_formats.join(", "),
            args.input
        );
        writer
            .finish()
            .with_context(|| format!("Failed to finish report {}", report_path.display()))?;
        eprintln!("  Empty report written to {}", report_path.display());
        return Ok(());
    }
    tracing::info!("Found {} image(s) to scan", files.len());

    let cancel = spawn_interrupt_watch();
    let progress = create_progress_bar(files.len() as u64);
    let started = std::time::Instant::now();

    let result = runner
        .run(files, cancel, |record, row| {
            writer.write_row(row)?;
            progress.inc(1);
            if !record.is_complete() {
                progress.println(format!("  ! {}: {}", row.image, row.diagnostics.join("; ")));
            }
            let elapsed = started.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                progress.set_message(format!(
                    "{:.1} img/sec",
                    writer.rows_written() as f64 / elapsed
                ));
            }
            Ok(())
        })
        .await;

    progress.finish_and_clear();
    // Flush whatever was produced, even when the run stopped early.
    writer
        .finish()
        .with_context(|| format!("Failed to finish report {}", report_path.display()))?;
    let stats = result?;

    print_summary(&stats, &report_path);

    if stats.cancelled > 0 {
        anyhow::bail!(
            "Scan interrupted: {} image(s) not analyzed. Partial report kept at {}",
            stats.cancelled,
            report_path.display()
        );
    }
    Ok(())
}

/// Fold command-line flags into the loaded configuration.
fn apply_overrides(config: &mut Config, args: &ScanArgs) {
    if let Some(output) = &args.output {
        config.output.path = output.clone();
    }
    if let Some(format) = args.format {
        config.output.format = format.to_string();
    }
    if let Some(parallel) = args.parallel {
        config.processing.parallel_workers = parallel;
    }
    if let Some(top_k) = args.top_k {
        config.scoring.top_k = top_k;
    }
    if let Some(threshold) = args.threshold {
        config.scoring.threshold = threshold;
    }
    if let Some(taxonomy) = &args.taxonomy {
        config.taxonomy.path = Some(taxonomy.to_string_lossy().into_owned());
    }
    if args.no_detector {
        config.detection.enabled = false;
    }
    if args.recursive {
        config.processing.recursive = true;
    }
    if args.diagnostics {
        config.output.diagnostics_column = true;
    }
}

/// Where the report goes. A path given with `-o` is used verbatim; the
/// configured default takes the extension of the selected format.
fn resolve_report_path(configured: &Path, format: OutputFormat, explicit: bool) -> PathBuf {
    if explicit {
        configured.to_path_buf()
    } else {
        configured.with_extension(format.extension())
    }
}

/// Create the report file and write its header.
fn open_report(
    config: &Config,
    format: OutputFormat,
    taxonomy: &Taxonomy,
    path: &Path,
) -> anyhow::Result<OutputWriter<BufWriter<File>>> {
    let diagnostics = config.output.diagnostics_column;
    let sink = create_output_file(path)
        .with_context(|| format!("Cannot create report file {}", path.display()))?;
    Ok(OutputWriter::new(
        sink,
        format,
        &columns(taxonomy, diagnostics),
        diagnostics,
        config.output.pretty,
    )?)
}

/// Load both models and encode the candidate phrases.
///
/// Any failure here is fatal: no image is processed with a half-loaded model.
fn load_analyzer(config: &Config, taxonomy: Arc<Taxonomy>) -> anyhow::Result<Analyzer> {
    let threads = intra_threads(config.processing.device_permits);

    let scorer_dir = config.scoring_model_dir();
    let scorer = Arc::new(
        ClipScorer::load(&config.scoring, &scorer_dir, threads)
            .with_context(|| format!("Failed to load scorer from {}", scorer_dir.display()))?,
    );

    let detector: Option<Arc<dyn ObjectDetector>> = if config.detection.enabled {
        let detector_dir = config.detection_model_dir();
        let detector = YoloDetector::load(&config.detection, &detector_dir, threads)
            .with_context(|| {
                format!(
                    "Failed to load detector from {} (use --no-detector to skip detection)",
                    detector_dir.display()
                )
            })?;
        Some(Arc::new(detector) as Arc<dyn ObjectDetector>)
    } else {
        tracing::info!("Object detection disabled");
        None
    };

    let analyzer = Analyzer::new(
        scorer.clone(),
        detector,
        taxonomy,
        AnalyzerOptions::from_config(config),
    );
    scorer
        .prepare(analyzer.prompts())
        .context("Failed to encode taxonomy phrases")?;

    Ok(analyzer)
}

/// ONNX intra-op threads per session, splitting the cores across device permits.
fn intra_threads(device_permits: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    (cores / device_permits.max(1)).max(1)
}

/// Flip a watch flag on the first Ctrl-C.
fn spawn_interrupt_watch() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping after rows already written");
            let _ = tx.send(true);
        }
    });
    rx
}

/// Create a progress bar for batch processing.
fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .map(|s| s.progress_chars("##-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("loading...");
    pb
}

/// Print a summary table to stderr.
fn print_summary(stats: &ProcessingStats, report_path: &Path) {
    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Complete:     {:>8}", stats.succeeded);
    if stats.failed > 0 {
        eprintln!("    With errors:  {:>8}", stats.failed);
    }
    if stats.cancelled > 0 {
        eprintln!("    Cancelled:    {:>8}", stats.cancelled);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Rows:         {:>8}", stats.rows());
    eprintln!("    Duration:     {:>7.1}s", stats.total_seconds);
    eprintln!("    Rate:         {:>7.1} img/sec", stats.images_per_second());
    eprintln!("  ====================================");
    eprintln!("    Report: {}", report_path.display());
}
