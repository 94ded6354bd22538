//! In-memory mailbox used by tests.

use super::email::normalize_message_id;
use super::{Connector, MailStore, MailboxError, MessageFlag, SearchQuery, Uid};
use mailparse::MailHeaderMap;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

struct StoredMessage {
    uid: Uid,
    raw: Vec<u8>,
    seen: bool,
}

#[derive(Default)]
struct MailboxState {
    folders: BTreeMap<String, Vec<StoredMessage>>,
    selected: Option<(String, bool)>,
    next_uid: Uid,
    failing_folders: HashSet<String>,
    session_lost: bool,
    searches: Vec<(String, SearchQuery)>,
    fetches: Vec<(String, Uid)>,
    appended: Vec<(String, Vec<u8>, Vec<MessageFlag>)>,
    connects: usize,
}

/// Cheaply cloneable handle; clones share the same mailbox.
#[derive(Clone, Default)]
pub struct MemoryMailbox {
    state: Arc<Mutex<MailboxState>>,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_folder(self, folder: &str) -> Self {
        self.lock().folders.entry(folder.to_string()).or_default();
        self
    }

    /// Store a message as unseen and return its uid.
    pub fn deliver(&self, folder: &str, raw: &str) -> Uid {
        let mut state = self.lock();
        state.next_uid += 1;
        let uid = state.next_uid;
        state
            .folders
            .entry(folder.to_string())
            .or_default()
            .push(StoredMessage {
                uid,
                raw: raw.replace('\n', "\r\n").into_bytes(),
                seen: false,
            });
        uid
    }

    /// Every search and fetch in `folder` fails with a command error.
    pub fn fail_folder(&self, folder: &str) {
        self.lock().failing_folders.insert(folder.to_string());
    }

    /// Every subsequent operation fails as if the connection dropped.
    pub fn lose_session(&self) {
        self.lock().session_lost = true;
    }

    pub fn selected(&self) -> Option<(String, bool)> {
        self.lock().selected.clone()
    }

    pub fn searches(&self) -> Vec<(String, SearchQuery)> {
        self.lock().searches.clone()
    }

    pub fn fetches(&self) -> Vec<(String, Uid)> {
        self.lock().fetches.clone()
    }

    pub fn appended(&self) -> Vec<(String, Vec<u8>, Vec<MessageFlag>)> {
        self.lock().appended.clone()
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn is_seen(&self, folder: &str, uid: Uid) -> bool {
        self.lock()
            .folders
            .get(folder)
            .and_then(|messages| messages.iter().find(|message| message.uid == uid))
            .is_some_and(|message| message.seen)
    }

    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MailboxState {
    fn check_session(&self) -> Result<(), MailboxError> {
        if self.session_lost {
            return Err(MailboxError::Session("connection lost".into()));
        }
        Ok(())
    }

    fn ensure_selected(&mut self, folder: &str, writable: bool) -> Result<(), MailboxError> {
        self.check_session()?;
        if !self.folders.contains_key(folder) {
            return Err(MailboxError::Select {
                folder: folder.to_string(),
                reason: "no such folder".into(),
            });
        }

        let already = self
            .selected
            .as_ref()
            .is_some_and(|(current, read_only)| current == folder && (!writable || !read_only));
        if !already {
            self.selected = Some((folder.to_string(), !writable));
        }
        Ok(())
    }

    fn check_failing(&self, folder: &str) -> Result<(), MailboxError> {
        if self.failing_folders.contains(folder) {
            return Err(MailboxError::Command(format!("simulated failure in '{folder}'")));
        }
        Ok(())
    }
}

impl MailStore for MemoryMailbox {
    fn select(&mut self, folder: &str, read_only: bool) -> Result<(), MailboxError> {
        let mut state = self.lock();
        state.check_session()?;
        if !state.folders.contains_key(folder) {
            return Err(MailboxError::Select {
                folder: folder.to_string(),
                reason: "no such folder".into(),
            });
        }
        state.selected = Some((folder.to_string(), read_only));
        Ok(())
    }

    fn search(&mut self, folder: &str, query: &SearchQuery) -> Result<Vec<Uid>, MailboxError> {
        let mut state = self.lock();
        state.ensure_selected(folder, false)?;
        state.searches.push((folder.to_string(), query.clone()));
        state.check_failing(folder)?;

        let messages = state.folders.get(folder).map(Vec::as_slice).unwrap_or_default();
        let uids = match query {
            SearchQuery::Unseen => messages
                .iter()
                .filter(|message| !message.seen)
                .map(|message| message.uid)
                .collect(),
            SearchQuery::MessageId(wanted) => {
                let wanted = normalize_message_id(wanted);
                messages
                    .iter()
                    .filter(|message| {
                        mailparse::parse_headers(&message.raw)
                            .ok()
                            .and_then(|(headers, _)| headers.get_first_value("Message-ID"))
                            .is_some_and(|value| normalize_message_id(&value) == wanted)
                    })
                    .map(|message| message.uid)
                    .collect()
            }
        };
        Ok(uids)
    }

    fn fetch(&mut self, folder: &str, uid: Uid) -> Result<Option<Vec<u8>>, MailboxError> {
        let mut state = self.lock();
        state.ensure_selected(folder, false)?;
        state.fetches.push((folder.to_string(), uid));
        state.check_failing(folder)?;

        Ok(state.folders.get(folder).and_then(|messages| {
            messages
                .iter()
                .find(|message| message.uid == uid)
                .map(|message| message.raw.clone())
        }))
    }

    fn mark_seen(&mut self, folder: &str, uid: Uid) -> Result<(), MailboxError> {
        let mut state = self.lock();
        state.ensure_selected(folder, true)?;
        let message = state
            .folders
            .get_mut(folder)
            .and_then(|messages| messages.iter_mut().find(|message| message.uid == uid))
            .ok_or_else(|| MailboxError::Command(format!("no message {uid} in '{folder}'")))?;
        message.seen = true;
        Ok(())
    }

    fn append(
        &mut self,
        folder: &str,
        raw: &[u8],
        flags: &[MessageFlag],
    ) -> Result<(), MailboxError> {
        let mut state = self.lock();
        state.check_session()?;
        if !state.folders.contains_key(folder) {
            return Err(MailboxError::Command(format!("no such folder '{folder}'")));
        }

        state.next_uid += 1;
        let uid = state.next_uid;
        let seen = flags.contains(&MessageFlag::Seen);
        state
            .appended
            .push((folder.to_string(), raw.to_vec(), flags.to_vec()));
        if let Some(messages) = state.folders.get_mut(folder) {
            messages.push(StoredMessage {
                uid,
                raw: raw.to_vec(),
                seen,
            });
        }
        Ok(())
    }
}

impl Connector for MemoryMailbox {
    type Store = MemoryMailbox;

    fn connect(&self) -> Result<Self::Store, MailboxError> {
        let mut state = self.lock();
        state.check_session()?;
        state.connects += 1;
        state.selected = None;
        drop(state);
        Ok(self.clone())
    }
}
