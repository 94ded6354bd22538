//! The reply agent: per-message pipeline and the poll loop driving it.

pub mod pipeline;
pub mod poller;

pub use pipeline::{AgentIdentity, ConversationState, ReplyPipeline, SkipReason, Stage};
pub use poller::{CycleReport, PollSettings, PolledMessage, Poller, collect_unseen};

use crate::messaging::{Connector, FolderSearchList, MailStore, resolve_folders};

use anyhow::Context as _;
use std::sync::Arc;

/// Probe the mailbox once for its sent folder. Any failure here is a
/// startup error.
pub async fn discover_folders<C: Connector>(
    connector: Arc<C>,
    inbox: String,
    candidates: Vec<String>,
) -> crate::Result<FolderSearchList> {
    let folders = tokio::task::spawn_blocking(move || {
        let mut store = connector.connect()?;
        let result = resolve_folders(&mut store, &inbox, &candidates);
        store.logout();
        result
    })
    .await
    .context("folder discovery task panicked")??;

    Ok(folders)
}
