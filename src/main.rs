use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use trimscrape::browser::ChromeDriver;
use trimscrape::core::{Config, PageDriver};
use trimscrape::profile::SiteProfile;
use trimscrape::runner::Runner;
use trimscrape::seeds;
use trimscrape::store::ResultStore;

/// Visit every seed page, click through its configurator and record what it shows.
#[derive(Parser, Debug)]
#[command(name = "trimscrape", version, about = "Resilient browser-driven configurator scraper")]
struct Args {
    /// Site profile (targets, rules and extraction plan) as JSON
    #[arg(long)]
    profile: PathBuf,

    /// Seed list as JSON
    #[arg(long)]
    seeds: PathBuf,

    /// Output directory; overrides the config file
    #[arg(long)]
    out: Option<PathBuf>,

    /// Run Chrome without a visible window
    #[arg(long)]
    headless: bool,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    yes: bool,

    /// Only process the first N seeds
    #[arg(long)]
    limit: Option<usize>,

    /// Engine config (browser, timing, output) as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save before/after screenshots of every unit
    #[arg(long)]
    screenshots: bool,
}

fn confirm(profile: &str, seeds: usize, out: &std::path::Path) -> Result<bool> {
    println!("{}", "=".repeat(60));
    println!("Profile: {}", profile);
    println!("Units:   {}", seeds);
    println!("Output:  {}", out.display());
    println!("{}", "=".repeat(60));
    print!("Start scraping? (yes/no): ");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "yes" | "y"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    if args.headless {
        config.browser.headless = true;
    }
    if let Some(out) = &args.out {
        config.output.directory = out.clone();
    }
    if args.screenshots {
        config.output.screenshots = true;
    }

    let profile = SiteProfile::load(&args.profile)
        .and_then(|p| p.compile())
        .with_context(|| format!("loading profile {}", args.profile.display()))?;
    let mut seeds = seeds::load(&args.seeds).with_context(|| format!("loading seeds {}", args.seeds.display()))?;
    if let Some(limit) = args.limit {
        seeds.truncate(limit);
    }

    if !args.yes && !confirm(&profile.name, seeds.len(), &config.output.directory)? {
        info!("Cancelled");
        return Ok(());
    }

    let driver = ChromeDriver::launch(&config.browser).context("starting Chrome")?;
    let mut store = ResultStore::create(&config.output.directory, &profile.name).await?;

    let outcome = Runner::new(&driver, &config, &profile)
        .run(&seeds, &mut store, async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Interrupt received, stopping after the last checkpoint"),
                Err(e) => {
                    error!("Cannot listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await
                }
            }
        })
        .await;

    if let Err(e) = driver.close().await {
        error!("Closing the browser failed: {}", e);
    }

    let stats = outcome?;
    println!(
        "Done: {} completed, {} failed, {} skipped, {} records in {}",
        stats.completed,
        stats.failed,
        stats.skipped,
        stats.records,
        store.dir().display()
    );
    Ok(())
}
