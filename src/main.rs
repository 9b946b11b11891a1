use std::io::{self, BufRead, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use registry_scraper::batch::ResumePoint;
use registry_scraper::config::Settings;
use registry_scraper::driver::webdriver::WebDriverSession;
use registry_scraper::driver::PageDriver;
use registry_scraper::input::load_identifiers;
use registry_scraper::merge::merge_archives;
use registry_scraper::pipeline::Pipeline;
use registry_scraper::portal::{Profile, ProfileKind};

#[derive(Parser)]
#[command(
    name = "registry_scraper",
    about = "Batch scraper for sam.gov and usaspending.gov entity records"
)]
struct Cli {
    /// Settings file (default: ./registry_scraper.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up company names on sam.gov
    Sam(ScrapeArgs),
    /// Look up UEIs on usaspending.gov recipient profiles
    Recipient(ScrapeArgs),
    /// Recipient profiles plus their sub-award listings
    Funding(ScrapeArgs),
    /// Merge downloaded usaspending award archives into four tables
    Merge {
        /// Directory holding the .zip downloads
        dir: PathBuf,
        /// Where the merged csv files go (default: DIR)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ScrapeArgs {
    /// CSV file with the identifiers to look up
    #[arg(short, long, default_value = "input.csv")]
    input: PathBuf,
    /// Input column (default depends on the portal)
    #[arg(long)]
    column: Option<String>,
    /// Root directory for batch output files
    #[arg(short, long, default_value = ".")]
    out: PathBuf,
    /// 1-based batch number to start from; prompted for when omitted
    #[arg(short = 's', long)]
    start_batch: Option<usize>,
    #[arg(short = 'b', long)]
    batch_size: Option<usize>,
    /// WebDriver server URL
    #[arg(long)]
    webdriver: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let result = run(Cli::parse()).await;

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Sam(args) => scrape(ProfileKind::Sam, args, config).await,
        Commands::Recipient(args) => scrape(ProfileKind::Recipient, args, config).await,
        Commands::Funding(args) => scrape(ProfileKind::Funding, args, config).await,
        Commands::Merge { dir, out } => {
            let out = out.unwrap_or_else(|| dir.clone());
            let summary = merge_archives(&dir, &out)
                .with_context(|| format!("Failed to merge archives in {}", dir.display()))?;
            summary.print();
            Ok(())
        }
    }
}

async fn scrape(kind: ProfileKind, args: ScrapeArgs, config: Option<&Path>) -> Result<()> {
    let mut settings = Settings::load(config)?;
    if let Some(url) = args.webdriver {
        settings.webdriver_url = url;
    }
    if let Some(size) = args.batch_size {
        settings.batch_size = size;
    }
    let batch_size =
        NonZeroUsize::new(settings.batch_size).context("Batch size must be at least 1")?;

    let profile = Profile::for_kind(kind);
    let column = args.column.as_deref().unwrap_or(profile.input_column);
    let identifiers = load_identifiers(&args.input, column)?;
    if identifiers.is_empty() {
        println!("No identifiers in {}.", args.input.display());
        return Ok(());
    }

    let number = match args.start_batch {
        Some(n) => n,
        None => prompt_start_batch()?,
    };
    let Some(resume) = ResumePoint::from_batch_number(number) else {
        bail!("Batch numbers start at 1");
    };

    info!(
        "Scraping {} with {} identifiers in batches of {}",
        profile.name,
        identifiers.len(),
        batch_size
    );
    let mut driver = WebDriverSession::connect(&settings.webdriver_url, settings.headless)
        .await
        .with_context(|| format!("Failed to start a browser via {}", settings.webdriver_url))?;

    let outcome = Pipeline::new(&mut driver, &profile, settings.waits(), &args.out)
        .run(&identifiers, batch_size, resume)
        .await;
    if let Err(e) = driver.quit().await {
        warn!("Failed to close the browser session: {}", e);
    }

    outcome?.print();
    Ok(())
}

fn prompt_start_batch() -> Result<usize> {
    print!("Enter the batch number to start from: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    line.trim()
        .parse()
        .with_context(|| format!("Not a batch number: {:?}", line.trim()))
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
