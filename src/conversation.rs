//! Conversation reconstruction from threading headers.

pub mod history;
pub mod thread;

pub use history::{ThreadNode, render_history, sort_chronologically};
pub use thread::{LookupOutcome, ThreadLimits, lookup, reconstruct};
