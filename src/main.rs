use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};

use workflow_gallery_scraper::{
    progress_bar, scrape_batch, scrape_workflow, sitemap, synthetic, HttpFetcher, Settings,
    SynthOptions,
};

#[derive(Parser)]
#[command(name = "workflow_gallery_scraper", about = "n8n workflow gallery scraper")]
struct Cli {
    /// Settings file (default: ./gallery.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
    /// Never fall back to the template API
    #[arg(long, global = true)]
    no_api: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape one workflow and print its record
    Scrape {
        /// Gallery workflow id (e.g. 1750)
        id: String,
    },
    /// Scrape several workflows one after another, one JSON line each
    Batch {
        /// Workflow ids
        ids: Vec<String>,
        /// Add every workflow listed in the gallery sitemap
        #[arg(long = "sitemap")]
        from_sitemap: bool,
        /// Max workflows to scrape
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Stop on the first malformed payload
        #[arg(long)]
        strict: bool,
    },
    /// List workflow ids from the gallery sitemap
    Discover {
        /// Max ids to print
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Print a synthetic workflow record
    Synth {
        #[arg(long, default_value = "0")]
        seed: u64,
        /// Node count (default: 3-6, picked from the seed)
        #[arg(long)]
        nodes: Option<usize>,
        /// Chance of each extra forward edge, 0.0-1.0
        #[arg(long, default_value = "0.2")]
        density: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(secs) = cli.timeout {
        settings.timeout_secs = secs;
    }
    if cli.no_api {
        settings.api_fallback = false;
    }

    let result = match cli.command {
        Commands::Scrape { id } => {
            let fetcher = HttpFetcher::new(&settings)?;
            let scraped = scrape_workflow(&fetcher, &settings, &id).await?;
            for v in &scraped.violations {
                eprintln!("warning: {}", v);
            }
            println!("{}", serde_json::to_string_pretty(&scraped)?);
            Ok(())
        }
        Commands::Batch {
            mut ids,
            from_sitemap,
            limit,
            strict,
        } => {
            let fetcher = HttpFetcher::new(&settings)?;
            if from_sitemap {
                ids.extend(sitemap::fetch_workflow_ids(&fetcher, &settings).await?);
            }
            if let Some(n) = limit {
                ids.truncate(n);
            }
            if ids.is_empty() {
                eprintln!("No workflow ids given. Pass ids or --sitemap.");
                return Ok(());
            }

            eprintln!("Scraping {} workflows...", ids.len());
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let mut write_err: Option<anyhow::Error> = None;
            let pb = progress_bar(ids.len() as u64)?;
            let stats = scrape_batch(&fetcher, &settings, &ids, strict, &pb, |scraped| {
                if write_err.is_some() {
                    return;
                }
                let line = serde_json::to_string(scraped).map_err(anyhow::Error::from);
                if let Err(e) = line.and_then(|l| writeln!(out, "{}", l).map_err(Into::into)) {
                    write_err = Some(e);
                }
            })
            .await?;
            if let Some(e) = write_err {
                return Err(e.context("Failed to write record"));
            }

            eprintln!(
                "Done: {} workflows ({} ok, {} unavailable, {} unextractable, {} malformed).",
                stats.total, stats.ok, stats.unavailable, stats.unextractable, stats.malformed
            );
            Ok(())
        }
        Commands::Discover { limit } => {
            let fetcher = HttpFetcher::new(&settings)?;
            let ids = sitemap::fetch_workflow_ids(&fetcher, &settings).await?;
            let shown = limit.unwrap_or(ids.len());
            for id in ids.iter().take(shown) {
                println!("{}", id);
            }
            eprintln!("{} workflow ids in sitemap", ids.len());
            Ok(())
        }
        Commands::Synth {
            seed,
            nodes,
            density,
        } => {
            let record = synthetic::generate(&SynthOptions {
                seed,
                node_count: nodes,
                density,
            });
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", elapsed_label(elapsed));
    }

    result
}

/// `4.2s`, `3m 07s`, `1h 02m 09s`.
fn elapsed_label(d: Duration) -> String {
    let secs = d.as_secs();
    match (secs / 3600, secs % 3600 / 60) {
        (0, 0) => format!("{:.1}s", d.as_secs_f64()),
        (0, m) => format!("{}m {:02}s", m, secs % 60),
        (h, m) => format!("{}h {:02}m {:02}s", h, m, secs % 60),
    }
}
