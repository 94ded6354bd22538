//! Majordomo CLI entry point.

use majordomo::agent::{self, AgentIdentity, PollSettings, Poller, ReplyPipeline};
use majordomo::config::Config;
use majordomo::llm::ChatCompletionsClient;
use majordomo::messaging::{ImapConnector, MailboxArchive, SmtpReplyTransport};
use majordomo::prompts::PromptEngine;
use majordomo::telemetry;

use anyhow::Context as _;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "majordomo", version, about = "Autonomous mailbox reply agent")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, default_value = "majordomo.toml")]
    config: PathBuf,

    /// Run a single poll cycle and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    let _log_guard = telemetry::init(&config.logging)?;

    let connector = Arc::new(ImapConnector::from_config(&config.imap));
    let folders = agent::discover_folders(
        connector.clone(),
        config.imap.inbox.clone(),
        config.agent.sent_folder_candidates(),
    )
    .await
    .context("failed to resolve mailbox folders")?;

    let transport = SmtpReplyTransport::from_config(&config.smtp)?;
    if let Err(error) = transport.health_check().await {
        tracing::warn!(%error, "SMTP server not reachable yet; replies will be retried per message");
    }

    let pipeline = ReplyPipeline::new(
        AgentIdentity::from_config(&config.agent, &config.smtp),
        PromptEngine::new()?,
        Arc::new(ChatCompletionsClient::from_config(&config.llm)?),
        Arc::new(transport),
    )
    .with_archive(Arc::new(MailboxArchive::new(connector.clone())));

    let poller = Poller::new(
        connector,
        Arc::new(folders),
        pipeline,
        PollSettings {
            interval: config.agent.poll_interval(),
            delivery: config.agent.delivery,
            limits: config.thread.into(),
        },
    );

    if cli.once {
        let report = poller.poll_once().await?;
        tracing::info!(
            polled = report.polled,
            dispatched = report.dispatched,
            skipped = report.skipped,
            failed = report.failed,
            "single poll cycle finished"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown requested; finishing the current cycle");
                shutdown_tx.send(true).ok();
            }
            Err(error) => {
                tracing::warn!(%error, "failed to listen for ctrl-c; running until killed");
                // Dropping the sender would stop the loop.
                std::future::pending::<()>().await;
                drop(shutdown_tx);
            }
        }
    });

    tracing::info!(
        address = %config.agent.address,
        interval = ?config.agent.poll_interval(),
        delivery = ?config.agent.delivery,
        "majordomo started"
    );
    poller.run(shutdown_rx).await;

    Ok(())
}
