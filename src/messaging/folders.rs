//! Sent-folder discovery and the resulting search order.

use super::{MailStore, MailboxError};

/// Folders consulted during thread reconstruction: the inbox, then the sent
/// folder if one was found. Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderSearchList {
    inbox: String,
    sent: Option<String>,
}

impl FolderSearchList {
    pub fn inbox_only(inbox: impl Into<String>) -> Self {
        Self {
            inbox: inbox.into(),
            sent: None,
        }
    }

    pub fn with_sent(inbox: impl Into<String>, sent: impl Into<String>) -> Self {
        Self {
            inbox: inbox.into(),
            sent: Some(sent.into()),
        }
    }

    pub fn inbox(&self) -> &str {
        &self.inbox
    }

    pub fn sent(&self) -> Option<&str> {
        self.sent.as_deref()
    }

    /// Search order: inbox first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.inbox.as_str()).chain(self.sent.as_deref())
    }
}

/// Probe `candidates` in order with read-only selects; the first one that
/// opens is the sent folder. Leaves the session on the inbox.
///
/// Only a session failure is an error. Candidates that fail to open are
/// skipped, and when none open the list is inbox-only.
pub fn resolve_folders<S: MailStore + ?Sized>(
    store: &mut S,
    inbox: &str,
    candidates: &[String],
) -> Result<FolderSearchList, MailboxError> {
    let mut sent = None;

    for candidate in candidates {
        match store.select(candidate, true) {
            Ok(()) => {
                sent = Some(candidate.clone());
                break;
            }
            Err(error) if error.is_fatal() => return Err(error),
            Err(error) => {
                tracing::debug!(folder = %candidate, %error, "sent folder candidate rejected");
            }
        }
    }

    store.select(inbox, false)?;

    match sent {
        Some(sent) => {
            tracing::info!(folder = %sent, "sent folder detected");
            Ok(FolderSearchList::with_sent(inbox, sent))
        }
        None => {
            tracing::warn!("no sent folder detected; thread history will only search the inbox");
            Ok(FolderSearchList::inbox_only(inbox))
        }
    }
}
