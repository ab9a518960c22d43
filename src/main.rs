use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use narrated_shorts::api::reddit::TimeHorizon;
use narrated_shorts::api::synthesia::{DEFAULT_ACTOR, DEFAULT_BACKGROUND, STOCK_ACTORS};
use narrated_shorts::cancel::cancel_pair;
use narrated_shorts::config::Config;
use narrated_shorts::init;
use narrated_shorts::workflow::{self, RunOutcome, RunParams};

/// Narrate a top Reddit post as an AI avatar video
#[derive(Debug, Parser)]
#[command(name = "narrated-shorts", version, about)]
struct Cli {
    /// JSON config file; the environment (and .env) is used when omitted
    #[arg(long, env = "NARRATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Subreddit to read, with or without the r/ prefix
    #[arg(long, default_value = "TwoSentenceComedy")]
    subreddit: String,

    /// Time window of the top listing
    #[arg(long = "time", value_enum, default_value_t = TimeHorizon::Day)]
    horizon: TimeHorizon,

    /// Zero-based position of the post in the listing
    #[arg(long, default_value_t = 3)]
    index: usize,

    /// Avatar id (see --list-actors)
    #[arg(long, default_value = DEFAULT_ACTOR)]
    actor: String,

    #[arg(long, default_value = DEFAULT_BACKGROUND)]
    background: String,

    /// Request a billed, unwatermarked render instead of a test render
    #[arg(long)]
    production: bool,

    /// Only print the download link of the finished video
    #[arg(long)]
    no_download: bool,

    /// Overrides the configured output directory
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Print the stock avatars and exit
    #[arg(long)]
    list_actors: bool,
}

impl Cli {
    fn run_params(&self) -> RunParams {
        RunParams {
            subreddit: self.subreddit.clone(),
            horizon: self.horizon,
            index: self.index,
            actor: self.actor.clone(),
            background: self.background.clone(),
            test: !self.production,
            download: !self.no_download,
        }
    }
}

async fn load_config(cli: &Cli) -> Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => Config::load(path).await?,
        None => Config::from_env().context("Failed to load config from environment")?,
    };
    if let Some(dir) = &cli.output_dir {
        cfg.output_dir = dir.clone();
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init::init_tracing();

    let cli = Cli::parse();
    if cli.list_actors {
        for (name, id) in STOCK_ACTORS {
            println!("{:<10} {}", name, id);
        }
        return Ok(());
    }

    let cfg = load_config(&cli).await?;
    if !cli.no_download {
        init::ensure_output_root(&cfg.output_dir).await?;
    }

    let (cancel_handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping at the next checkpoint...");
            cancel_handle.cancel();
        }
    });

    let code = match workflow::run_workflow(&cfg, &cli.run_params(), &cancel).await {
        Ok(report) => {
            match &report.outcome {
                RunOutcome::Downloaded(path) => println!("{}", path.display()),
                RunOutcome::Completed {
                    download_url: Some(url),
                } => println!("{}", url),
                RunOutcome::Completed { download_url: None } => {}
                RunOutcome::Failed => eprintln!("[ERROR] video {} failed to render", report.job.id),
            }
            report.exit_code()
        }
        Err(err) => {
            eprintln!("[ERROR] {}", err);
            workflow::error_exit_code(&err)
        }
    };
    std::process::exit(code);
}
