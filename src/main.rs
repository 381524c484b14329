//! # Mucklan CLI
//!
//! Household assistant for a shared flat: weekly cleaning rotation and the
//! monthly rent split from posted bills, delivered over Discord.
//!
//! Usage:
//!   mucklan run                          # Scheduler + Discord listener
//!   mucklan rotate                       # Run the cleaning rotation now
//!   mucklan bills                        # Check bills and announce the rent now
//!   mucklan remind                       # Send the bill reminder if needed
//!   mucklan preview-rotation             # Show this week's areas without sending
//!   mucklan extract bill.pdf --split     # Read amounts from local PDFs
//!   mucklan config check                 # Validate configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::Local;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use mucklan_agent::Household;
use mucklan_bills::{PdfReader, extract, rent_announcement, split};
use mucklan_channels::DiscordChannel;
use mucklan_chores::{RotationState, SqliteStateStore, StateStore, assign, open_store};
use mucklan_core::DocumentReader;
use mucklan_core::MucklanConfig;
use mucklan_core::config::{StateBackend, TOKEN_ENV};
use mucklan_scheduler::{SchedulerEngine, jobs_from_config, spawn_scheduler};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mucklan",
    version,
    about = "🏠 Mucklan: household chores and rent over Discord"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and listen for chat commands
    Run,
    /// Advance the cleaning rotation and notify everyone
    Rotate,
    /// Read this month's bills and announce the rent
    Bills,
    /// Remind the bill manager if no bills are posted yet
    Remind,
    /// Show the current rotation without advancing it
    PreviewRotation,
    /// Extract amounts from local PDF bills
    Extract {
        /// PDF files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Also split the rent with the configured policy
        #[arg(long)]
        split: bool,
    },
    /// Show recorded job runs (sqlite state backend)
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate the configuration, schedules included
    Check,
    /// Show the effective configuration
    Show,
    /// Print the default config path
    Path,
}

fn load_config(path: &Option<String>) -> Result<MucklanConfig> {
    let config = match path {
        Some(p) => MucklanConfig::load_from(Path::new(shellexpand::tilde(p).as_ref()))?,
        None => MucklanConfig::load()?,
    };
    Ok(config)
}

fn build_household(config: MucklanConfig) -> Result<(Arc<Household>, Arc<DiscordChannel>)> {
    let token = config
        .token()
        .ok_or_else(|| anyhow!("no Discord token: set [discord] token or {TOKEN_ENV}"))?;
    let channel = Arc::new(DiscordChannel::new(&token)?);
    let store = open_store(&config.state)?;
    let household = Household::new(config, channel.clone(), Arc::new(PdfReader::new()), store);
    Ok((Arc::new(household), channel))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "mucklan=debug,mucklan_agent=debug,mucklan_bills=debug,mucklan_chores=debug,mucklan_scheduler=debug,mucklan_channels=debug,mucklan_core=debug"
    } else {
        "mucklan=info,mucklan_agent=info,mucklan_bills=info,mucklan_chores=info,mucklan_scheduler=info,mucklan_channels=info,mucklan_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run => {
            let config = load_config(&cli.config)?;
            let jobs = jobs_from_config(&config)?;
            let (household, channel) = build_household(config)?;

            let me = channel.get_me().await?;
            println!("🏠 Mucklan v{} as {} ({})", env!("CARGO_PKG_VERSION"), me.username, me.id);

            let scheduler_config = household.config().scheduler.clone();
            let engine = SchedulerEngine::new(
                jobs,
                scheduler_config.misfire_grace_secs,
                Local::now().naive_local(),
            );
            if let Some((kind, at)) = engine.next_due() {
                println!("   Next duty: {kind} at {at}");
            }

            let runner = household.clone();
            let scheduler = tokio::spawn(spawn_scheduler(
                engine,
                move |kind| {
                    let household = runner.clone();
                    async move { household.run_job(kind).await }
                },
                scheduler_config.check_interval_secs,
            ));

            let mut messages = channel.gateway().start();
            let listener_household = household.clone();
            let listener = tokio::spawn(async move {
                while let Some(msg) = messages.next().await {
                    match listener_household.handle_message(&msg).await {
                        Ok(Some(outcome)) => tracing::info!("💬 {outcome}"),
                        Ok(None) => {}
                        Err(e) => tracing::warn!("⚠️ Command failed: {e}"),
                    }
                }
            });

            println!("\nRunning. Press Ctrl+C to stop.");
            tokio::signal::ctrl_c().await?;
            scheduler.abort();
            listener.abort();
            println!("\n👋 Mucklan stopped.");
        }

        Commands::Rotate => {
            let (household, _) = build_household(load_config(&cli.config)?)?;
            let outcome = household.run_rotation().await?;
            for a in &outcome.rotation.assignments {
                println!("  🧹 {} → {}", a.resident, a.task);
            }
            println!("✅ {outcome}");
        }

        Commands::Bills => {
            let (household, _) = build_household(load_config(&cli.config)?)?;
            let outcome = household.run_bill_check().await?;
            println!("✅ {outcome}");
        }

        Commands::Remind => {
            let (household, _) = build_household(load_config(&cli.config)?)?;
            let outcome = household.run_reminder().await?;
            println!("✅ {outcome}");
        }

        Commands::PreviewRotation => {
            let config = load_config(&cli.config)?;
            let chores = config
                .chores
                .as_ref()
                .ok_or_else(|| anyhow!("no [chores] section configured"))?;
            let store = open_store(&config.state)?;
            let state = store
                .load()?
                .unwrap_or(RotationState::new(chores.start_counter));
            let rotation = assign(&chores.residents, &chores.tasks, state)?;

            println!("🧹 Rotation (counter {}):", state.counter);
            for a in &rotation.assignments {
                println!("  {} → {}", a.resident, a.task);
            }
            println!("   Next counter: {}", rotation.next.counter);
        }

        Commands::Extract { files, split: do_split } => {
            let reader = PdfReader::new();
            let mut amounts = Vec::new();
            for path in &files {
                let bytes = std::fs::read(path)?;
                let found = reader.pages(&bytes).and_then(|pages| extract(&pages));
                match found {
                    Ok(found) => {
                        println!(
                            "🧾 {}: {} (rule {}, page {})",
                            path.display(),
                            found.amount,
                            found.rule,
                            found.page + 1
                        );
                        amounts.push(found.amount);
                    }
                    Err(e) => println!("⚠️ {}: {e}", path.display()),
                }
            }

            if do_split {
                let config = load_config(&cli.config)?;
                let bills = config
                    .bills
                    .as_ref()
                    .ok_or_else(|| anyhow!("no [bills] section configured"))?;
                let breakdown = split(&amounts, &bills.policy)?;
                println!("\n{}", rent_announcement(&breakdown, &bills.currency));
                println!(
                    "Collected {} for a total of {} (residual {})",
                    breakdown.collected,
                    breakdown.total,
                    breakdown.residual
                );
            }
        }

        Commands::History { limit } => {
            let config = load_config(&cli.config)?;
            if config.state.backend != StateBackend::Sqlite {
                println!("Job history needs [state] backend = \"sqlite\".");
                return Ok(());
            }
            let db = SqliteStateStore::open(&config.state.resolved_path())?;
            for run in db.recent_runs(limit)? {
                println!("  {} [{}] {}", run.ran_at.format("%Y-%m-%d %H:%M"), run.job, run.outcome);
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Check => {
                let config = load_config(&cli.config)?;
                let jobs = jobs_from_config(&config)?;
                println!("✅ Configuration is valid.");
                for job in &jobs {
                    println!("   {}: {}", job.kind, job.schedule);
                }
                if config.token().is_none() {
                    println!("⚠️  No Discord token (set [discord] token or {TOKEN_ENV}).");
                }
            }
            ConfigAction::Show => {
                let mut config = load_config(&cli.config)?;
                if !config.discord.token.is_empty() {
                    config.discord.token = "***".into();
                }
                println!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigAction::Path => {
                println!("{}", MucklanConfig::default_path().display());
            }
        },
    }

    Ok(())
}
