//! Thread reconstruction: a breadth-first walk over `References`/`In-Reply-To`
//! identifiers across the configured folders.

use super::history::{ThreadNode, sort_chronologically};
use crate::config::ThreadConfig;
use crate::messaging::email::{
    IncomingMessage, extract_text_body, header_value, parse_date, references_of, truncate_chars,
};
use crate::messaging::{FolderSearchList, MailStore, MailboxError, SearchQuery, Uid};

use std::collections::{HashSet, VecDeque};

/// Bounds on a single reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadLimits {
    /// Hard cap on collected nodes. Threads can be arbitrarily long or cyclic.
    pub max_messages: usize,
    pub max_body_chars: usize,
    /// Give up after this many failed folder lookups. `None` never gives up.
    pub max_transport_failures: Option<usize>,
}

impl From<ThreadConfig> for ThreadLimits {
    fn from(config: ThreadConfig) -> Self {
        Self {
            max_messages: config.max_messages,
            max_body_chars: config.max_body_chars,
            max_transport_failures: config.max_transport_failures,
        }
    }
}

impl Default for ThreadLimits {
    fn default() -> Self {
        ThreadConfig::default().into()
    }
}

/// Result of looking for one identifier in one folder.
#[derive(Debug)]
pub enum LookupOutcome {
    Found { uid: Uid, raw: Vec<u8> },
    NotFound,
    /// The folder could not be searched. The session is still usable.
    TransportFailure(MailboxError),
}

/// Look up `message_id` in `folder`. Only session-fatal errors are returned
/// as `Err`; everything else becomes a [`LookupOutcome`].
pub fn lookup<S: MailStore + ?Sized>(
    store: &mut S,
    folder: &str,
    message_id: &str,
) -> Result<LookupOutcome, MailboxError> {
    match try_lookup(store, folder, message_id) {
        Ok(outcome) => Ok(outcome),
        Err(error) if error.is_fatal() => Err(error),
        Err(error) => Ok(LookupOutcome::TransportFailure(error)),
    }
}

fn try_lookup<S: MailStore + ?Sized>(
    store: &mut S,
    folder: &str,
    message_id: &str,
) -> Result<LookupOutcome, MailboxError> {
    store.select(folder, true)?;

    let uids = store.search(folder, &SearchQuery::MessageId(message_id.to_string()))?;
    let Some(uid) = uids.last().copied() else {
        return Ok(LookupOutcome::NotFound);
    };

    match store.fetch(folder, uid)? {
        Some(raw) => Ok(LookupOutcome::Found { uid, raw }),
        None => Err(MailboxError::Command(format!(
            "server returned no body for uid {uid}"
        ))),
    }
}

/// Walk the ancestors of `incoming` and return them oldest first.
///
/// Each identifier is looked up at most once; the first folder holding it
/// wins. Identifiers found nowhere are dropped. The session is re-selected
/// read-write on the inbox before returning.
pub fn reconstruct<S: MailStore + ?Sized>(
    store: &mut S,
    incoming: &IncomingMessage,
    folders: &FolderSearchList,
    limits: ThreadLimits,
) -> Result<Vec<ThreadNode>, MailboxError> {
    let seed = incoming.ancestor_ids();
    if seed.is_empty() {
        tracing::debug!(uid = incoming.uid, "no message-id references; skipping thread fetch");
        return Ok(Vec::new());
    }

    let mut seen: HashSet<String> = seed.iter().cloned().collect();
    let mut processed: HashSet<String> = HashSet::new();
    if !incoming.message_id.is_empty() {
        processed.insert(incoming.message_id.clone());
    }
    let mut frontier: VecDeque<String> = seed.into();
    let mut nodes = Vec::new();
    let mut transport_failures = 0usize;

    'walk: while nodes.len() < limits.max_messages {
        let Some(message_id) = frontier.pop_front() else {
            break;
        };
        if !processed.insert(message_id.clone()) {
            continue;
        }

        let mut found = false;
        for folder in folders.iter() {
            let (uid, raw) = match lookup(store, folder, &message_id)? {
                LookupOutcome::Found { uid, raw } => (uid, raw),
                LookupOutcome::NotFound => continue,
                LookupOutcome::TransportFailure(error) => {
                    transport_failures += 1;
                    tracing::debug!(folder, message_id = %message_id, %error, "thread lookup failed");
                    if limits
                        .max_transport_failures
                        .is_some_and(|limit| transport_failures >= limit)
                    {
                        tracing::warn!(
                            transport_failures,
                            collected = nodes.len(),
                            "too many failed thread lookups; returning partial history"
                        );
                        break 'walk;
                    }
                    continue;
                }
            };

            let node = match build_node(&raw, folder, &message_id, limits.max_body_chars) {
                Ok(node) => node,
                Err(error) => {
                    tracing::warn!(folder, uid, message_id = %message_id, %error, "failed to parse thread message");
                    continue;
                }
            };

            tracing::debug!(folder, uid, message_id = %message_id, from = %node.from, "found thread message");
            for reference in &node.references {
                if seen.insert(reference.clone()) {
                    frontier.push_back(reference.clone());
                }
            }
            nodes.push(node);
            found = true;
            break;
        }

        if !found {
            tracing::debug!(message_id = %message_id, "thread message not found in any folder");
        }
    }

    if let Err(error) = store.select(folders.inbox(), false) {
        if error.is_fatal() {
            return Err(error);
        }
        tracing::warn!(folder = folders.inbox(), %error, "failed to restore inbox selection");
    }

    sort_chronologically(&mut nodes);
    tracing::debug!(uid = incoming.uid, count = nodes.len(), "thread history reconstructed");
    Ok(nodes)
}

fn build_node(
    raw: &[u8],
    folder: &str,
    message_id: &str,
    max_body_chars: usize,
) -> anyhow::Result<ThreadNode> {
    let parsed = mailparse::parse_mail(raw)?;
    let headers = parsed.headers.as_slice();
    let date_header = header_value(headers, "Date");

    Ok(ThreadNode {
        message_id: message_id.to_string(),
        from: header_value(headers, "From"),
        date: parse_date(&date_header),
        date_header,
        body_excerpt: truncate_chars(&extract_text_body(&parsed), max_body_chars),
        references: references_of(headers),
        folder: folder.to_string(),
    })
}
