use anyhow::{Context, Result};
use bioanalyzer::config::Config;
use bioanalyzer::extract::{FieldModel, GeminiModel, PaperAnalyzer};
use bioanalyzer::models::Pmid;
use bioanalyzer::retrieval::EutilsClient;
use bioanalyzer::ui::{self, ColorMode};
use bioanalyzer::utils::MemoryCache;
use bioanalyzer::{BatchProcessor, Pipeline};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// BioAnalyzer - retrieve PubMed papers and extract BugSigDB curation fields
#[derive(Parser, Debug)]
#[command(name = "bioanalyzer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Retrieve PubMed papers and extract BugSigDB curation fields", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short)]
    quiet: bool,

    /// Output format
    #[arg(long, short, value_enum, global = true, default_value_t = OutputFormat::Auto)]
    output: OutputFormat,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Disable caching for this run
    #[arg(long, global = true, default_value_t = false)]
    no_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Table when stdout is a terminal, JSON otherwise
    Auto,
    /// Human-readable table
    Table,
    /// Machine-readable JSON
    Json,
    /// Comma-separated values
    Csv,
}

impl OutputFormat {
    fn resolve(self) -> OutputFormat {
        match self {
            OutputFormat::Auto => {
                if std::io::stdout().is_terminal() {
                    OutputFormat::Table
                } else {
                    OutputFormat::Json
                }
            }
            other => other,
        }
    }

    fn color_mode(self) -> ColorMode {
        if std::io::stdout().is_terminal() {
            ColorMode::Enabled
        } else {
            ColorMode::Disabled
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch a paper's metadata and full text without analyzing it
    Fetch {
        /// PubMed identifier
        pmid: String,
    },

    /// Fetch and analyze one paper
    Analyze {
        /// PubMed identifier
        pmid: String,
    },

    /// Analyze many papers concurrently
    Batch {
        /// PubMed identifiers
        pmids: Vec<String>,

        /// Read identifiers from a file, one per line ('#' starts a comment)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Override the configured concurrency limit
        #[arg(long)]
        concurrency: Option<usize>,

        /// Overall deadline in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = if cli.quiet { "error" } else { log_level };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("bioanalyzer={}", env_filter)),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let pipeline = build_pipeline(&config, cli.no_cache);

    let format = cli.output.resolve();
    let color = cli.output.color_mode();

    match cli.command {
        Commands::Fetch { pmid } => {
            let pmid = Pmid::new(&pmid)?;
            let record = pipeline.fetch_paper(&pmid).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
                _ => println!("{}", ui::render_record(&record, color)),
            }
        }

        Commands::Analyze { pmid } => {
            let pmid = Pmid::new(&pmid)?;
            let analysis = pipeline.analyze_paper(&pmid).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&analysis)?),
                OutputFormat::Csv => print!("{}", ui::analysis_csv(&analysis)),
                _ => println!("{}", ui::render_analysis(&analysis, color)),
            }
        }

        Commands::Batch {
            pmids,
            file,
            concurrency,
            timeout,
        } => {
            let mut inputs = pmids;
            if let Some(path) = file {
                inputs.extend(read_pmid_file(&path)?);
            }
            anyhow::ensure!(!inputs.is_empty(), "no identifiers given (arguments or --file)");

            let mut batch_config = config.batch.clone();
            if let Some(n) = concurrency {
                anyhow::ensure!(n >= 1, "--concurrency must be at least 1");
                batch_config.max_concurrent = n;
            }
            if let Some(secs) = timeout {
                batch_config.timeout_secs = Some(secs);
            }

            let processor = BatchProcessor::new(Arc::new(pipeline), batch_config);

            let spinner = make_spinner(cli.quiet, inputs.len());
            let outcome = processor.process(&inputs).await;
            if let Some(spinner) = spinner {
                spinner.finish_and_clear();
            }

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
                OutputFormat::Csv => print!("{}", ui::batch_csv(&outcome)),
                _ => println!("{}", ui::render_batch(&outcome, color)),
            }

            if outcome.failed() > 0 {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn build_pipeline(config: &Config, no_cache: bool) -> Pipeline {
    let client = EutilsClient::new(&config.retrieval, config.api_keys.ncbi.clone());

    let model: Arc<dyn FieldModel> = Arc::new(GeminiModel::new(
        config.api_keys.gemini.clone(),
        config.extraction.model.clone(),
    ));
    if config.api_keys.gemini.is_none() {
        tracing::warn!("GEMINI_API_KEY not set; extraction will rely on the keyword fallback");
    }

    let analyzer = PaperAnalyzer::new(
        model,
        config.extraction.confidence_threshold,
        config.extraction.field_timeout(),
    );

    let cache = if no_cache {
        MemoryCache::disabled()
    } else {
        MemoryCache::from_config(&config.cache)
    };

    Pipeline::new(client, analyzer, cache)
}

/// One identifier per line; blank lines and '#' comments are skipped.
fn read_pmid_file(path: &std::path::Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

fn make_spinner(quiet: bool, total: usize) -> Option<ProgressBar> {
    if quiet || !std::io::stderr().is_terminal() {
        return None;
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("analyzing {total} papers..."));
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(120));
    Some(spinner)
}
