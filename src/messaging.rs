//! Mail plumbing: parsing, classification, IMAP sessions, SMTP delivery and
//! reply construction.

pub mod classify;
pub mod email;
pub mod folders;
pub mod imap_client;
#[cfg(test)]
pub mod memory;
pub mod outbound;
pub mod smtp;
pub mod traits;

pub use email::IncomingMessage;
pub use folders::{FolderSearchList, resolve_folders};
pub use imap_client::{ImapConnector, ImapMailbox};
pub use smtp::SmtpReplyTransport;
pub use traits::{
    Connector, MailStore, MailboxArchive, MailboxError, MessageFlag, ReplyTransport, SearchQuery,
    SentArchive, TransportError, Uid,
};
