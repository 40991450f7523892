use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use schedule_bot::bot_info::BotInfo;
use schedule_bot::config::Settings;
use schedule_bot::db;
use schedule_bot::discord::DiscordScheduledEventClient;
use schedule_bot::health;
use schedule_bot::link_store::PgLinkStore;
use schedule_bot::ops::{self, CommandCaller, OpsAccessPolicy, OpsCommand};
use schedule_bot::sync::{ScheduleDryRunWorker, ScheduleSyncWorker};
use schedule_bot::twitch::{self, ScheduleSource};

#[derive(Parser)]
#[command(name = "schedule-bot")]
#[command(version, about = "Sync Twitch stream schedules into Discord scheduled events")]
#[command(
    long_about = "Periodically reads the Twitch schedule of every configured channel and creates \
    a Discord guild scheduled event for each upcoming broadcast that has not been synced yet.\n\n\
    Settings come from settings.toml, settings.<APP_ENV>.toml and SCHEDSYNC__* environment \
    variables; DATABASE_URL overrides database.url."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the sync loop until interrupted (default)
    Run,

    /// Only log what would be synced; needs neither database nor Discord
    DryRun,

    /// Run a single cycle and exit
    Once {
        /// Fetch and filter only, do not create events
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect stored event links
    Links {
        #[command(subcommand)]
        action: LinksAction,
    },

    /// Run an ops command as the given caller
    Ops {
        /// ping, about or health
        command: OpsCommand,

        /// Discord user id of the caller
        #[arg(long)]
        user_id: u64,

        /// Guild the command is sent from; omit for a direct message
        #[arg(long)]
        guild_id: Option<u64>,

        /// Caller has the Administrator permission in that guild
        #[arg(long)]
        guild_admin: bool,
    },
}

#[derive(Subcommand)]
enum LinksAction {
    /// List the newest links of a guild
    List {
        #[arg(long)]
        guild: u64,

        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Count all links
    Count,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "schedule_bot=info,shared_types=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load settings")?;
    let info = BotInfo::capture(&settings.environment, Utc::now());

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(settings, info).await,
        Command::DryRun => dry_run(settings).await,
        Command::Once { dry_run } => once(settings, dry_run).await,
        Command::Links { action } => links(settings, action).await,
        Command::Ops {
            command,
            user_id,
            guild_id,
            guild_admin,
        } => {
            let caller = CommandCaller {
                user_id,
                guild_id,
                is_guild_admin: guild_admin,
            };
            let policy = OpsAccessPolicy::from(&settings.ops_security);
            let reply = ops::dispatch(command, &caller, &policy, &info, Utc::now())?;
            println!("{}", reply);
            Ok(())
        }
    }
}

fn http_client(settings: &Settings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(settings.http_timeout())
        .user_agent(concat!("schedule-bot/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

fn schedule_source(settings: &Settings, http: reqwest::Client) -> Arc<dyn ScheduleSource> {
    Arc::new(twitch::schedule_client(http, &settings.twitch))
}

fn sync_worker(settings: &Settings, http: reqwest::Client) -> Result<ScheduleSyncWorker> {
    let pool = db::establish_connection_pool(&settings.database)
        .context("Failed to create database pool")?;
    tracing::info!("Database connection pool initialized");

    Ok(ScheduleSyncWorker::new(
        &settings.schedule_sync,
        settings.twitch.channels.clone(),
        schedule_source(settings, http.clone()),
        Arc::new(DiscordScheduledEventClient::new(http, &settings.discord)),
        Arc::new(PgLinkStore::new(pool)),
    ))
}

fn dry_run_worker(settings: &Settings, http: reqwest::Client) -> ScheduleDryRunWorker {
    ScheduleDryRunWorker::new(
        &settings.schedule_sync,
        settings.twitch.channels.clone(),
        schedule_source(settings, http),
    )
}

async fn run(settings: Settings, info: BotInfo) -> Result<()> {
    settings.validate_sync()?;

    tracing::info!(
        "Starting {} {} (environment: {}, machine: {})",
        info.name,
        info.version,
        info.environment,
        info.machine
    );

    let http = http_client(&settings)?;
    let worker = sync_worker(&settings, http.clone())?;
    let observer = settings
        .schedule_sync
        .dry_run_observer
        .then(|| dry_run_worker(&settings, http));

    if let Err(e) = health::write_ready_marker(&settings.health.ready_file, Utc::now()).await {
        tracing::warn!("Could not write readiness marker: {:#}", e);
    }

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    let token = cancel.clone();
    tasks.push(tokio::spawn(async move { worker.run(token).await }));

    if let Some(observer) = observer {
        let token = cancel.clone();
        tasks.push(tokio::spawn(async move { observer.run(token).await }));
    }

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping...");
    cancel.cancel();

    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!("Worker task failed: {}", e);
        }
    }

    tracing::info!("Schedule bot stopped");
    Ok(())
}

async fn dry_run(settings: Settings) -> Result<()> {
    settings.validate_schedule()?;

    let observer = dry_run_worker(&settings, http_client(&settings)?);
    let cancel = CancellationToken::new();

    let token = cancel.clone();
    let task = tokio::spawn(async move { observer.run(token).await });

    shutdown_signal().await;
    cancel.cancel();
    task.await.context("Dry-run observer failed")?;

    Ok(())
}

async fn once(settings: Settings, dry_run: bool) -> Result<()> {
    let http = http_client(&settings)?;
    let cancel = CancellationToken::new();

    let report = if dry_run {
        settings.validate_schedule()?;
        dry_run_worker(&settings, http).run_cycle(&cancel).await
    } else {
        settings.validate_sync()?;
        sync_worker(&settings, http)?.run_cycle(&cancel).await
    };

    for channel in &report.channels {
        println!(
            "{:<24} {:?}: fetched {}, in window {}, already linked {}, created {}, conflicts {}, failed {}",
            channel.channel,
            channel.status,
            channel.fetched,
            channel.in_window,
            channel.already_linked,
            channel.created,
            channel.conflicts,
            channel.failed
        );
    }

    Ok(())
}

async fn links(settings: Settings, action: LinksAction) -> Result<()> {
    settings.require_database()?;

    let pool = db::establish_connection_pool(&settings.database)
        .context("Failed to create database pool")?;
    let store = PgLinkStore::new(pool);

    match action {
        LinksAction::List { guild, limit } => {
            let links = store.list_for_guild(guild, limit).await?;
            if links.is_empty() {
                println!("No links for guild {}", guild);
            }
            for link in links {
                println!(
                    "{}  {}/{}  event {}  {} -> {}",
                    link.id,
                    link.source,
                    link.source_id,
                    link.discord_event_id,
                    link.start_utc.format("%Y-%m-%d %H:%M"),
                    link.end_utc.format("%Y-%m-%d %H:%M")
                );
            }
        }
        LinksAction::Count => {
            println!("{}", store.count().await?);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
