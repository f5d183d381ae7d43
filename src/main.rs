mod analytics;
mod api;
mod channels;
mod chat;
mod config;
mod context;
mod engagement;
mod i18n;
mod membership;
mod model;
mod notifier;
mod report;
mod retry;
mod scheduler;
mod settings;
mod standups;
mod store;
mod timeparse;
mod worklogs;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::watch;

use analytics::CollectorClient;
use context::BotContext;
use i18n::Localizer;
use notifier::NotifierRegistry;
use report::Cadence;
use scheduler::Scheduler;
use settings::SettingsHandle;
use store::sqlite::SqliteStore;
use timeparse::ClockResolver;

#[derive(Parser)]
#[command(
    name = "huddle",
    version,
    about = "Standup reminders and team activity reports for chat workspaces"
)]
struct Cli {
    #[arg(short, long, default_value = "~/.huddle/config.toml", env = "HUDDLE_CONFIG")]
    config: String,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and the admin API
    Run,
    Init,
    /// Validate the config and every stored time expression
    Check,
    /// Build and send a report now
    Report {
        #[command(subcommand)]
        cadence: ReportCommand,
    },
    /// Show monitored channels and their members
    Status,
}

#[derive(Subcommand)]
enum ReportCommand {
    Daily,
    Weekly,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Init => {
            let dir = config::init_config_dir().await?;
            tracing::info!("Initialized {}", dir.display());
        }
        Commands::Run => run(&cli.config).await?,
        Commands::Check => check(&cli.config).await?,
        Commands::Report { cadence } => {
            let cadence = match cadence {
                ReportCommand::Daily => Cadence::Daily,
                ReportCommand::Weekly => Cadence::Weekly,
            };
            let cfg = config::load(&cli.config)?;
            let ctx = build_context(&cfg)?;
            let entries = report::send(&ctx, cadence, Local::now().fixed_offset()).await?;
            println!("Sent {} report with {entries} entries", cadence.kind());
        }
        Commands::Status => status(&cli.config).await?,
    }
    Ok(())
}

fn build_context(cfg: &config::Config) -> Result<BotContext> {
    let settings = cfg.settings();
    settings.validate()?;

    let messages_dir = match &cfg.i18n.messages_dir {
        Some(dir) => config::expand_tilde(&dir.to_string_lossy()),
        None => cfg.base_dir().join("i18n"),
    };
    if cfg.collector.enabled && cfg.collector.url.is_empty() {
        anyhow::bail!("[collector] is enabled but has no url");
    }

    Ok(BotContext {
        chat: chat::create_client(&cfg.slack)?,
        store: Arc::new(SqliteStore::open(cfg.base_dir())?),
        analytics: Arc::new(CollectorClient::new(&cfg.collector, &cfg.workspace.id)),
        resolver: Arc::new(ClockResolver),
        localizer: Arc::new(Localizer::load_dir(&messages_dir)?),
        settings: SettingsHandle::new(settings),
    })
}

async fn run(config_path: &str) -> Result<()> {
    let cfg = config::load(config_path)?;
    let ctx = build_context(&cfg)?;
    let registry = NotifierRegistry::new();
    tracing::info!(
        "huddle starting for {} (chat: {})",
        cfg.workspace.name,
        ctx.chat.name()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(ctx.clone(), registry.clone());
    let scheduler_task = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    if cfg.api.enabled {
        if cfg.api.api_key.is_none() {
            if is_localhost(&cfg.api.bind) {
                tracing::warn!("API authentication disabled (localhost-only)");
            } else {
                anyhow::bail!(
                    "API authentication required for non-localhost binding '{}'. Set [api] api_key.",
                    cfg.api.bind
                );
            }
        }
        let state = api::AppState {
            ctx,
            registry,
            api_key: cfg.api.api_key.clone(),
        };
        let listener = tokio::net::TcpListener::bind(&cfg.api.bind).await?;
        tracing::info!("Admin API listening on {}", cfg.api.bind);
        axum::serve(listener, api::router(state))
            .with_graceful_shutdown(async {
                signal::ctrl_c().await.ok();
            })
            .await?;
    } else {
        signal::ctrl_c().await?;
    }

    tracing::info!("Shutting down");
    shutdown_tx.send(true).ok();
    scheduler_task.await?;
    Ok(())
}

async fn check(config_path: &str) -> Result<()> {
    let cfg = config::load(config_path)?;
    let ctx = build_context(&cfg)?;
    let settings = ctx.settings.current();
    let now = Local::now().fixed_offset();

    let mut problems = 0;
    if !settings.reporting_time.is_empty() {
        match ctx.resolver.resolve(&settings.reporting_time, now) {
            Ok(time) => println!("reporting time: {}", time.format("%H:%M")),
            Err(e) => {
                problems += 1;
                println!("reporting time: {e}");
            }
        }
    }
    for channel in ctx.store.list_channels(&settings.workspace_id).await? {
        if !channel.has_deadline() {
            continue;
        }
        match ctx.resolver.resolve(&channel.deadline, now) {
            Ok(time) => println!("#{}: deadline {}", channel.name, time.format("%H:%M")),
            Err(e) => {
                problems += 1;
                println!("#{}: {e}", channel.name);
            }
        }
    }
    if problems > 0 {
        anyhow::bail!("{problems} time expression(s) could not be resolved");
    }
    println!("Config OK");
    Ok(())
}

async fn status(config_path: &str) -> Result<()> {
    let cfg = config::load(config_path)?;
    let ctx = build_context(&cfg)?;
    let settings = ctx.settings.current();
    for channel in ctx.store.list_channels(&settings.workspace_id).await? {
        let members = ctx.store.list_standupers(&channel.channel_id).await?;
        let deadline = if channel.has_deadline() {
            channel.deadline.as_str()
        } else {
            "none"
        };
        println!(
            "#{} ({}): deadline {deadline}, days {}, {} members",
            channel.name,
            channel.channel_id,
            channel.submission_days,
            members.len()
        );
        for m in members {
            println!("  {} <{}> {}", m.display_name, m.user_id, m.role.as_str());
        }
    }
    Ok(())
}

fn is_localhost(bind: &str) -> bool {
    use std::net::IpAddr;

    let host = if let Some(inner) = bind.strip_prefix('[')
        && let Some(bracket_end) = inner.find(']')
    {
        &inner[..bracket_end]
    } else if let Some(colon) = bind.rfind(':') {
        &bind[..colon]
    } else {
        bind
    };

    if host == "localhost" {
        return true;
    }
    host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}
