//! Top-level error type.

use crate::config::ConfigError;
use crate::llm::GeneratorError;
use crate::messaging::{MailboxError, TransportError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
