mod schedule;

use anyhow::{Context, Result};
use aside_core::{
    Allowlist, AsideConfig, ContextProvider, DndGate, EventSource, MessageSender, ReplyComposer,
    StatusBoard,
};
use aside_gateway::{AppState, GatewayServer};
use aside_monitor::{MonitorLoop, ReplyDispatcher};
use aside_reply::{GoogleCalendarContext, LlmComposer, OsaScriptSender, TemplateComposer};
use aside_store::{CallHistorySource, MessageStoreSource};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use schedule::ScheduledSender;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about = "Away-from-phone auto-responder", long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "aside.toml", env = "ASIDE_CONFIG")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the gateway, the monitor loop and the scheduled-send loop (default)
    Run,
    /// Manage the auto-reply whitelist
    Whitelist {
        #[command(subcommand)]
        action: WhitelistAction,
    },
    /// Manage one-shot scheduled sends
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
}

#[derive(Subcommand, Debug)]
enum WhitelistAction {
    /// Show the current whitelist
    List,
    /// Add a number (international format preferred)
    Add {
        number: String,
        /// Contact name, for the operator's benefit only
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove a number
    Remove { number: String },
}

#[derive(Subcommand, Debug)]
enum ScheduleAction {
    /// Show pending scheduled messages
    List,
    /// Schedule a message for later
    Add {
        /// Recipient number (must be whitelisted)
        #[arg(long)]
        to: String,
        #[arg(long)]
        message: String,
        /// Absolute send time, RFC 3339 (e.g. 2026-08-06T18:30:00Z)
        #[arg(long, conflicts_with = "in_minutes")]
        at: Option<DateTime<Utc>>,
        /// Relative send time in minutes from now
        #[arg(long)]
        in_minutes: Option<i64>,
    },
    /// Cancel a pending message by id
    Cancel { id: Uuid },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = AsideConfig::load_or_default(&cli.config);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Whitelist { action } => whitelist_cmd(&config, action).await,
        Command::Schedule { action } => schedule_cmd(&config, action).await,
    }
}

// ============================================================================
// run
// ============================================================================

async fn run(config: AsideConfig) -> Result<()> {
    let _log_guard = init_tracing();
    info!("Starting aside...");

    let gate = Arc::new(DndGate::new());
    let board = Arc::new(StatusBoard::new());
    let allowlist = Arc::new(Allowlist::open(&config.allowlist.path));

    let sources: Vec<Arc<dyn EventSource>> = vec![
        Arc::new(CallHistorySource::new(
            expand_home(&config.stores.call_db_path),
            config.monitor.poll_limit,
        )),
        Arc::new(MessageStoreSource::new(
            expand_home(&config.stores.message_db_path),
            config.monitor.poll_limit,
        )),
    ];

    let context: Arc<dyn ContextProvider> = Arc::new(GoogleCalendarContext::new(&config.calendar)?);
    let composer: Arc<dyn ReplyComposer> = match LlmComposer::from_env(&config.reply)? {
        Some(llm) => Arc::new(llm),
        None => Arc::new(TemplateComposer::new(&config.reply)),
    };
    let sender: Arc<dyn MessageSender> = Arc::new(OsaScriptSender::new(config.reply.send_timeout()));

    let gateway = GatewayServer::new(
        &config.gateway,
        AppState::new(gate.clone(), allowlist.clone(), board.clone(), context.clone()),
    );
    let _gateway_task = gateway.start();

    let scheduler = Arc::new(ScheduledSender::new(
        PathBuf::from(&config.schedule.path),
        allowlist.clone(),
        sender.clone(),
    ));
    let schedule_task = scheduler.spawn(
        config.schedule.tick_interval(),
        config.schedule.error_backoff(),
    );

    let dispatcher = ReplyDispatcher::new(allowlist, context, composer, sender);
    let monitor = MonitorLoop::new(config.monitor.clone(), gate, sources, dispatcher, board);
    let monitor_handle = monitor.spawn();

    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    info!("Shutting down...");
    schedule_task.abort();
    monitor_handle.stop().await;
    Ok(())
}

/// Log to stderr and to `aside.log`, filtered by `RUST_LOG` (info by
/// default). The guard must stay alive for the file writer to flush.
fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let file_appender = tracing_appender::rolling::never(".", "aside.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();
    guard
}

/// Expand a leading `~/` against the home directory.
fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

// ============================================================================
// whitelist
// ============================================================================

async fn whitelist_cmd(config: &AsideConfig, action: WhitelistAction) -> Result<()> {
    let allowlist = Allowlist::open(&config.allowlist.path);
    match action {
        WhitelistAction::List => {
            let all = allowlist.all().await;
            if all.is_empty() {
                println!("Whitelist is empty");
            } else {
                println!("Current whitelist ({} contacts):", all.len());
                for (i, identity) in all.iter().enumerate() {
                    println!("{}. {}", i + 1, identity);
                }
            }
        }
        WhitelistAction::Add { number, name } => {
            if allowlist.add(&number, name.as_deref()).await? {
                println!("Added {number} to whitelist");
            } else {
                println!("{number} is already in the whitelist");
            }
        }
        WhitelistAction::Remove { number } => {
            if allowlist.remove(&number).await? {
                println!("Removed {number} from whitelist");
            } else {
                println!("{number} not found in whitelist");
            }
        }
    }
    Ok(())
}

// ============================================================================
// schedule
// ============================================================================

async fn schedule_cmd(config: &AsideConfig, action: ScheduleAction) -> Result<()> {
    let allowlist = Arc::new(Allowlist::open(&config.allowlist.path));
    let sender: Arc<dyn MessageSender> = Arc::new(OsaScriptSender::new(config.reply.send_timeout()));
    let scheduler = ScheduledSender::new(PathBuf::from(&config.schedule.path), allowlist, sender);

    match action {
        ScheduleAction::List => {
            let entries = scheduler.list();
            if entries.is_empty() {
                println!("No scheduled messages");
            } else {
                for entry in entries {
                    println!(
                        "{}  {}  -> {}: {}",
                        entry.id, entry.scheduled_time, entry.recipient, entry.message
                    );
                }
            }
        }
        ScheduleAction::Add {
            to,
            message,
            at,
            in_minutes,
        } => {
            let when = match (at, in_minutes) {
                (Some(at), _) => at,
                (None, Some(mins)) => Utc::now() + Duration::minutes(mins),
                (None, None) => anyhow::bail!("give either --at or --in-minutes"),
            };
            let entry = scheduler.add(&to, &message, when).await?;
            println!("Scheduled {} for {}", entry.id, entry.scheduled_time);
        }
        ScheduleAction::Cancel { id } => {
            if scheduler.cancel(id)? {
                println!("Cancelled {id}");
            } else {
                println!("No scheduled message with id {id}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_home_leaves_absolute_paths_alone() {
        assert_eq!(expand_home("/tmp/x.db"), PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn expand_home_resolves_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/x.db"), home.join("x.db"));
        }
    }

    #[test]
    fn cli_parses_run_by_default() {
        let cli = Cli::parse_from(["aside"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn cli_parses_whitelist_add() {
        let cli = Cli::parse_from(["aside", "whitelist", "add", "+15551234567", "--name", "Ana"]);
        match cli.command {
            Some(Command::Whitelist {
                action: WhitelistAction::Add { number, name },
            }) => {
                assert_eq!(number, "+15551234567");
                assert_eq!(name.as_deref(), Some("Ana"));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_schedule_add_with_relative_time() {
        let cli = Cli::parse_from([
            "aside",
            "schedule",
            "add",
            "--to",
            "+15551234567",
            "--message",
            "running late",
            "--in-minutes",
            "30",
        ]);
        match cli.command {
            Some(Command::Schedule {
                action:
                    ScheduleAction::Add {
                        to, in_minutes, at, ..
                    },
            }) => {
                assert_eq!(to, "+15551234567");
                assert_eq!(in_minutes, Some(30));
                assert!(at.is_none());
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }
}
