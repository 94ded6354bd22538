//! The outer loop: list unseen mail, rebuild each thread, run the pipeline.

use super::pipeline::{ConversationState, ReplyPipeline, Stage};
use crate::config::DeliveryMode;
use crate::conversation::{ThreadLimits, reconstruct, render_history};
use crate::messaging::{
    Connector, FolderSearchList, IncomingMessage, MailStore, MailboxError, SearchQuery, Uid,
};

use anyhow::Context as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const INITIAL_RETRY_BACKOFF: Duration = Duration::from_secs(5);
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(300);

/// An unseen message read during a poll, with its rendered thread.
#[derive(Debug, Clone)]
pub struct PolledMessage {
    pub incoming: IncomingMessage,
    pub thread_history: String,
}

/// Tally of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub polled: usize,
    pub skipped: usize,
    pub dispatched: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub delivery: DeliveryMode,
    pub limits: ThreadLimits,
}

/// Read every unseen inbox message, flag it according to `delivery` and
/// reconstruct its thread. Runs on a single blocking session.
///
/// Per-message problems are logged and skipped; only session-fatal errors
/// abort the listing.
pub fn collect_unseen<S: MailStore + ?Sized>(
    store: &mut S,
    folders: &FolderSearchList,
    delivery: DeliveryMode,
    limits: ThreadLimits,
) -> Result<Vec<PolledMessage>, MailboxError> {
    let inbox = folders.inbox();
    store.select(inbox, false)?;
    let uids = store.search(inbox, &SearchQuery::Unseen)?;
    if !uids.is_empty() {
        tracing::debug!(folder = inbox, count = uids.len(), "found unseen messages");
    }

    let mut polled = Vec::with_capacity(uids.len());
    for uid in uids {
        let raw = match store.fetch(inbox, uid) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::warn!(folder = inbox, uid, "email fetch body missing; leaving message unseen for retry");
                continue;
            }
            Err(error) if error.is_fatal() => return Err(error),
            Err(error) => {
                tracing::warn!(folder = inbox, uid, %error, "failed to fetch unseen email");
                continue;
            }
        };

        // Unparsable mail is flagged in every mode.
        let incoming = match IncomingMessage::parse(uid, &raw) {
            Ok(incoming) => incoming,
            Err(error) => {
                tracing::warn!(folder = inbox, uid, %error, "failed to parse inbound email; flagging it as seen");
                mark_seen(store, inbox, uid)?;
                continue;
            }
        };
        if delivery == DeliveryMode::AtMostOnce {
            mark_seen(store, inbox, uid)?;
        }

        let nodes = reconstruct(store, &incoming, folders, limits)?;
        polled.push(PolledMessage {
            thread_history: render_history(&nodes),
            incoming,
        });
    }

    Ok(polled)
}

fn mark_seen<S: MailStore + ?Sized>(
    store: &mut S,
    folder: &str,
    uid: Uid,
) -> Result<(), MailboxError> {
    match store.mark_seen(folder, uid) {
        Err(error) if error.is_fatal() => Err(error),
        Err(error) => {
            tracing::warn!(folder, uid, %error, "failed to mark email as seen");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

pub struct Poller<C> {
    connector: Arc<C>,
    folders: Arc<FolderSearchList>,
    pipeline: ReplyPipeline,
    settings: PollSettings,
}

impl<C: Connector> Poller<C> {
    pub fn new(
        connector: Arc<C>,
        folders: Arc<FolderSearchList>,
        pipeline: ReplyPipeline,
        settings: PollSettings,
    ) -> Self {
        Self {
            connector,
            folders,
            pipeline,
            settings,
        }
    }

    /// One full cycle. Errors mean the mailbox session could not be used;
    /// per-message failures only show up in the report.
    pub async fn poll_once(&self) -> crate::Result<CycleReport> {
        let connector = self.connector.clone();
        let folders = self.folders.clone();
        let PollSettings {
            delivery, limits, ..
        } = self.settings;

        let polled = tokio::task::spawn_blocking(move || {
            let mut store = connector.connect()?;
            let result = collect_unseen(&mut store, &folders, delivery, limits);
            store.logout();
            result
        })
        .await
        .context("email poll task panicked")??;

        let mut report = CycleReport {
            polled: polled.len(),
            ..CycleReport::default()
        };
        let mut settled = Vec::new();

        for message in polled {
            let state = ConversationState::new(message.incoming, message.thread_history);
            let state = self.pipeline.run(state, &self.folders).await;
            match state.stage {
                Stage::Skipped => report.skipped += 1,
                Stage::Dispatched => report.dispatched += 1,
                _ => report.failed += 1,
            }
            if matches!(state.stage, Stage::Skipped | Stage::Dispatched) {
                settled.push(state.incoming.uid);
            }
        }

        if delivery == DeliveryMode::AfterReply && !settled.is_empty() {
            self.mark_settled(settled).await;
        }

        Ok(report)
    }

    async fn mark_settled(&self, uids: Vec<Uid>) {
        let connector = self.connector.clone();
        let folders = self.folders.clone();

        let result = tokio::task::spawn_blocking(move || {
            let mut store = connector.connect()?;
            let inbox = folders.inbox();
            let result = uids.iter().try_for_each(|uid| mark_seen(&mut store, inbox, *uid));
            store.logout();
            result
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::warn!(%error, "failed to flag handled messages; they will be polled again");
            }
            Err(error) => tracing::warn!(%error, "mark-seen task panicked"),
        }
    }

    /// Poll until `shutdown_rx` flips to `true`. Failed cycles are retried
    /// with exponential backoff instead of the regular interval.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut retry_backoff = INITIAL_RETRY_BACKOFF;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let sleep_duration = match self.poll_once().await {
                Ok(report) => {
                    retry_backoff = INITIAL_RETRY_BACKOFF;
                    if report.polled > 0 {
                        tracing::info!(
                            polled = report.polled,
                            dispatched = report.dispatched,
                            skipped = report.skipped,
                            failed = report.failed,
                            "poll cycle finished"
                        );
                    }
                    self.settings.interval
                }
                Err(error) => {
                    tracing::warn!(%error, retry_in = ?retry_backoff, "email poll cycle failed");
                    next_backoff(&mut retry_backoff)
                }
            };

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(sleep_duration) => {}
            }
        }

        tracing::info!("email poll loop stopped");
    }
}

/// Returns the current delay and doubles the next one, capped.
fn next_backoff(retry_backoff: &mut Duration) -> Duration {
    let current = *retry_backoff;
    *retry_backoff = (*retry_backoff * 2).min(MAX_RETRY_BACKOFF);
    current
}
