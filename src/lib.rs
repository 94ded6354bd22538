//! Majordomo: an autonomous mailbox agent.
//!
//! Polls an IMAP inbox, reconstructs the conversation each unseen message
//! belongs to, asks a text-generation provider for a reply and sends it over
//! SMTP with threading headers intact.

pub mod agent;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod messaging;
pub mod prompts;
pub mod telemetry;

pub use error::{Error, Result};
