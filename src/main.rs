use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::Local;
use clap::{Parser, Subcommand};

use outreach_ops::bridge::{CommandBridge, CommandHandler};
use outreach_ops::config::OutreachConfig;
use outreach_ops::engine::{ReplySyncEngine, SendEngine, SendOptions};
use outreach_ops::notifier::Notifier;
use outreach_ops::roster::Roster;
use outreach_ops::scheduler::spawn_cron_loop;
use outreach_ops::store::LibSqlBackend;
use outreach_ops::transport::{DiscordClient, HttpWebhook, MailClient, MailTransport};

#[derive(Debug, Parser)]
#[command(name = "outreach-ops")]
#[command(about = "Approval-gated outreach sequences driven from chat", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate configuration and roster columns
    Check,
    /// Replace the roster with a JSON array of string arrays (header first)
    Import {
        file: PathBuf,
    },
    /// Run the send engine once
    Send {
        /// Report what would be sent without sending or writing
        #[arg(long)]
        dry_run: bool,
        /// Cap on send attempts (defaults to OUTREACH_MAX_SENDS)
        #[arg(long)]
        max: Option<usize>,
    },
    /// Run reply sync once
    Replies,
    /// Set chat cursors to the newest message (every permitted channel by default)
    Bootstrap {
        channels: Vec<String>,
    },
    /// Poll every permitted channel once
    Poll,
    /// Run send, reply sync and polling on their cron schedules
    Daemon,
}

/// Everything the subcommands share, built once from the configuration.
struct App {
    config: Arc<OutreachConfig>,
    store: Arc<LibSqlBackend>,
    roster: Arc<Roster>,
    send: Arc<SendEngine>,
    replies: Arc<ReplySyncEngine>,
}

impl App {
    async fn open(config: OutreachConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let store = Arc::new(
            LibSqlBackend::new_local(&config.db_path)
                .await
                .with_context(|| format!("opening store at {}", config.db_path.display()))?,
        );
        let roster = Arc::new(Roster::new(store.clone()));

        let mailer: Option<Arc<dyn MailTransport>> = config
            .smtp
            .clone()
            .map(|smtp| Arc::new(MailClient::new(smtp, config.imap.clone())) as Arc<dyn MailTransport>);
        let reply_mailer = mailer.clone().filter(|_| config.imap.is_some());

        let notifier = Arc::new(Notifier::from_config(Arc::new(HttpWebhook::new()), &config));
        let send = Arc::new(
            SendEngine::new(roster.clone(), mailer, notifier.clone()).with_delay(config.send_delay),
        );
        let replies = Arc::new(ReplySyncEngine::new(roster.clone(), reply_mailer, notifier));

        Ok(Self {
            config,
            store,
            roster,
            send,
            replies,
        })
    }

    fn bridge(&self) -> anyhow::Result<CommandBridge> {
        let discord = self.config.require_discord()?;
        let handler = CommandHandler::new(
            self.config.clone(),
            self.roster.clone(),
            self.send.clone(),
            self.replies.clone(),
        );
        Ok(CommandBridge::new(
            self.config.clone(),
            Arc::new(DiscordClient::new(discord)),
            self.store.clone(),
            handler,
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = OutreachConfig::from_env()?;
    let app = App::open(config).await?;

    match cli.command {
        Commands::Check => check(&app).await,
        Commands::Import { file } => import(&app, &file).await,
        Commands::Send { dry_run, max } => send(&app, dry_run, max).await,
        Commands::Replies => {
            let report = app.replies.run().await?;
            println!("{}", report.render());
            Ok(())
        }
        Commands::Bootstrap { channels } => bootstrap(&app, &channels).await,
        Commands::Poll => {
            let processed = app.bridge()?.poll_all().await;
            println!("Processed {processed} command(s)");
            Ok(())
        }
        Commands::Daemon => daemon(app).await,
    }
}

async fn check(app: &App) -> anyhow::Result<()> {
    println!("{}", app.config.summary());
    app.roster.check_columns().await?;
    let snapshot = app.roster.load().await?;
    println!("Roster OK: {} rows", snapshot.rows.len());
    Ok(())
}

async fn import(app: &App, path: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let records: Vec<Vec<String>> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    let imported = app.roster.import(records).await?;
    println!("Imported {imported} rows");
    Ok(())
}

async fn send(app: &App, dry_run: bool, max: Option<usize>) -> anyhow::Result<()> {
    let mut options = SendOptions::from_config(&app.config, Local::now().date_naive());
    options.dry_run |= dry_run;
    if let Some(max) = max {
        options.max_count = max;
    }
    if !options.dry_run {
        app.config.require_smtp()?;
    }

    let report = app.send.run(options).await?;
    println!("{}", report.render());
    Ok(())
}

async fn bootstrap(app: &App, channels: &[String]) -> anyhow::Result<()> {
    let bridge = app.bridge()?;
    if channels.is_empty() {
        let done = bridge.bootstrap_all().await;
        println!("Bootstrapped {} of {} channel(s)", done.len(), app.config.admin_channel_ids.len());
        return Ok(());
    }
    for channel in channels {
        let cursor = bridge.bootstrap_cursor(channel).await?;
        println!("{channel}: cursor {cursor}");
    }
    Ok(())
}

async fn daemon(app: App) -> anyhow::Result<()> {
    let schedules = app.config.schedules.clone();
    let mut handles = Vec::new();

    let send = app.send.clone();
    let config = app.config.clone();
    handles.push(spawn_cron_loop("send", schedules.send, move || {
        let send = send.clone();
        let options = SendOptions::from_config(&config, Local::now().date_naive());
        async move {
            if let Err(e) = send.run(options).await {
                tracing::error!(error = %e, "Send run failed");
            }
        }
    })?);

    let replies = app.replies.clone();
    handles.push(spawn_cron_loop("replies", schedules.replies, move || {
        let replies = replies.clone();
        async move {
            if let Err(e) = replies.run().await {
                tracing::error!(error = %e, "Reply sync failed");
            }
        }
    })?);

    match app.bridge() {
        Ok(bridge) => {
            let bridge = Arc::new(bridge);
            handles.push(spawn_cron_loop("poll", schedules.poll, move || {
                let bridge = bridge.clone();
                async move {
                    bridge.poll_all().await;
                }
            })?);
        }
        Err(e) => tracing::warn!(error = %e, "Command bridge disabled"),
    }

    tracing::info!(loops = handles.len(), "Daemon running");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    for handle in handles {
        handle.abort();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Commands {
        let argv = std::iter::once("outreach-ops").chain(args.iter().copied());
        Cli::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn send_flags() {
        match parse(&["send", "--dry-run", "--max", "3"]) {
            Commands::Send { dry_run, max } => {
                assert!(dry_run);
                assert_eq!(max, Some(3));
            }
            other => panic!("expected Send, got {other:?}"),
        }
        match parse(&["send"]) {
            Commands::Send { dry_run, max } => {
                assert!(!dry_run);
                assert_eq!(max, None);
            }
            other => panic!("expected Send, got {other:?}"),
        }
    }

    #[test]
    fn max_must_be_a_number() {
        let argv = ["outreach-ops", "send", "--max", "many"];
        assert!(Cli::try_parse_from(argv).is_err());
        assert!(Cli::try_parse_from(["outreach-ops", "send", "--max"]).is_err());
    }

    #[test]
    fn bootstrap_takes_any_number_of_channels() {
        match parse(&["bootstrap"]) {
            Commands::Bootstrap { channels } => assert!(channels.is_empty()),
            other => panic!("expected Bootstrap, got {other:?}"),
        }
        match parse(&["bootstrap", "1", "2"]) {
            Commands::Bootstrap { channels } => assert_eq!(channels, vec!["1", "2"]),
            other => panic!("expected Bootstrap, got {other:?}"),
        }
    }

    #[test]
    fn import_needs_a_file() {
        assert!(Cli::try_parse_from(["outreach-ops", "import"]).is_err());
        match parse(&["import", "roster.json"]) {
            Commands::Import { file } => assert_eq!(file, PathBuf::from("roster.json")),
            other => panic!("expected Import, got {other:?}"),
        }
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["outreach-ops", "launch"]).is_err());
    }
}
