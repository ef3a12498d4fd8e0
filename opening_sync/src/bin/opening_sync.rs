use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use game_ingestor::providers::lichess::LichessProvider;
use opening_sync::config::{AppConfig, load_config_path};
use opening_sync::graph::{Dimension, Side};
use opening_sync::job::JobStatus;
use opening_sync::{Platform, SyncOutcome, SyncService, SyncTarget};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Opening graph sync CLI")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<String>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Args, Clone)]
struct TargetArgs {
    /// Account the import runs for.
    #[arg(long)]
    account: String,
    /// Scout this opponent instead of the account's own games.
    #[arg(long)]
    opponent: Option<String>,
}

impl TargetArgs {
    fn target(&self) -> SyncTarget {
        match &self.opponent {
            Some(opp) => SyncTarget::opponent(Platform::Lichess, &self.account, opp),
            None => SyncTarget::own(Platform::Lichess, &self.account),
        }
    }
}

#[derive(Subcommand)]
enum Cmd {
    /// Apply pending schema migrations.
    Migrate,
    /// Run one sync step (or keep stepping with --until-done).
    Sync {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        until_done: bool,
    },
    /// Import the whole remaining history in one streaming run.
    Stream {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Request cancellation of a job.
    Stop {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Resume a cancelled job from its cursor.
    Restart {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Print the job snapshot.
    Status {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Print the stored moves from a position.
    Moves {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        fen: String,
        #[arg(long, default_value = "all")]
        dimension: String,
        #[arg(long, default_value = "by")]
        side: String,
    },
    /// Print the most recent stored games.
    Recent {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long, default_value_t = 10)]
        n: usize,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn service(config: &AppConfig, db_url: &str) -> Result<SyncService> {
    let provider = LichessProvider::with_config(config.lichess.provider_config()?)
        .context("building lichess provider")?;
    Ok(SyncService::new(Arc::new(provider), config, db_url))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config_path(path)?,
        None => AppConfig::default(),
    };
    let db_url = config.resolve_database_url()?;

    match cli.cmd {
        Cmd::Migrate => {
            opening_sync::db::migrate::run_all(&db_url)?;
            info!("migrations applied");
        }
        Cmd::Sync { target, until_done } => {
            let svc = service(&config, &db_url)?;
            let target = target.target();
            loop {
                match svc.continue_sync(&target).await? {
                    SyncOutcome::Busy => {
                        info!(%target, "busy; retrying shortly");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                    SyncOutcome::Progress(report) => {
                        let running = report.job.status == JobStatus::Running;
                        if !until_done || !running {
                            print_json(&report)?;
                            break;
                        }
                    }
                }
            }
        }
        Cmd::Stream { target } => {
            let svc = service(&config, &db_url)?;
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });
            let outcome = svc.run_streaming_import(&target.target(), cancel).await?;
            print_json(&outcome)?;
        }
        Cmd::Stop { target } => print_json(&service(&config, &db_url)?.stop_sync(&target.target())?)?,
        Cmd::Restart { target } => {
            print_json(&service(&config, &db_url)?.restart_sync(&target.target())?)?
        }
        Cmd::Status { target } => print_json(&service(&config, &db_url)?.status(&target.target())?)?,
        Cmd::Moves {
            target,
            fen,
            dimension,
            side,
        } => {
            let dimension = Dimension::parse(&dimension)?;
            let side = Side::from_code(&side)?;
            let moves = service(&config, &db_url)?.moves_at(&target.target(), dimension, &fen, side)?;
            print_json(&moves)?;
        }
        Cmd::Recent { target, n } => {
            print_json(&service(&config, &db_url)?.recent_games(&target.target(), n)?)?
        }
    }

    Ok(())
}
