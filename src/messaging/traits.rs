//! Collaborator seams: the mailbox session, the outbound transport and the
//! sent-folder archive.

use async_trait::async_trait;
use lettre::address::Envelope;

/// Mailbox-local message identifier.
pub type Uid = u32;

/// What to look for inside a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    Unseen,
    /// Exact `Message-ID` header match. Angle brackets are optional.
    MessageId(String),
}

/// Flags that can accompany an appended message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFlag {
    Seen,
}

/// Errors raised by a mailbox session.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    /// The session is unusable (connection lost, authentication rejected).
    #[error("mailbox session failed: {0}")]
    Session(String),

    #[error("failed to select folder '{folder}': {reason}")]
    Select { folder: String, reason: String },

    /// A single command failed but the session is still usable.
    #[error("mailbox command failed: {0}")]
    Command(String),
}

impl MailboxError {
    /// Fatal errors abort the poll cycle; everything else is contained.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Session(_))
    }
}

/// A synchronous, authenticated mailbox session.
///
/// Every operation names the folder it acts on. Read operations select the
/// folder when it is not already selected; write operations make sure it is
/// selected read-write. Sessions are not safe for concurrent use.
pub trait MailStore {
    fn select(&mut self, folder: &str, read_only: bool) -> Result<(), MailboxError>;

    fn search(&mut self, folder: &str, query: &SearchQuery) -> Result<Vec<Uid>, MailboxError>;

    /// Raw RFC 5322 bytes, without setting `\Seen`. `None` if the server
    /// returned no body.
    fn fetch(&mut self, folder: &str, uid: Uid) -> Result<Option<Vec<u8>>, MailboxError>;

    fn mark_seen(&mut self, folder: &str, uid: Uid) -> Result<(), MailboxError>;

    fn append(&mut self, folder: &str, raw: &[u8], flags: &[MessageFlag])
    -> Result<(), MailboxError>;

    fn logout(&mut self) {}
}

/// Opens authenticated mailbox sessions.
pub trait Connector: Send + Sync + 'static {
    type Store: MailStore + Send + 'static;

    fn connect(&self) -> Result<Self::Store, MailboxError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("failed to build reply: {0}")]
    Build(String),

    #[error("failed to send reply: {0}")]
    Send(String),
}

/// Outbound mail submission.
#[async_trait]
pub trait ReplyTransport: Send + Sync {
    async fn send(&self, envelope: &Envelope, raw: &[u8]) -> Result<(), TransportError>;
}

/// Stores a copy of outgoing mail in the sent folder.
#[async_trait]
pub trait SentArchive: Send + Sync {
    async fn archive(&self, folder: &str, raw: &[u8]) -> Result<(), MailboxError>;
}

/// [`SentArchive`] that opens a fresh mailbox session per copy.
pub struct MailboxArchive<C> {
    connector: std::sync::Arc<C>,
}

impl<C: Connector> MailboxArchive<C> {
    pub fn new(connector: std::sync::Arc<C>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl<C: Connector> SentArchive for MailboxArchive<C> {
    async fn archive(&self, folder: &str, raw: &[u8]) -> Result<(), MailboxError> {
        let connector = self.connector.clone();
        let folder = folder.to_string();
        let raw = raw.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut store = connector.connect()?;
            let result = store.append(&folder, &raw, &[MessageFlag::Seen]);
            store.logout();
            result
        })
        .await
        .map_err(|error| MailboxError::Session(format!("archive task failed: {error}")))?
    }
}
