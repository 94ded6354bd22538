//! Thread history: the ancestor messages found during reconstruction, and
//! their rendering as generation context.

use chrono::{DateTime, Utc};

/// A historical message found while walking a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadNode {
    pub message_id: String,
    pub from: String,
    /// Parsed `Date`; `None` when missing or unparsable.
    pub date: Option<DateTime<Utc>>,
    /// `Date` header as received, for display.
    pub date_header: String,
    pub body_excerpt: String,
    /// Identifiers from this message's own `References`/`In-Reply-To`.
    pub references: Vec<String>,
    pub folder: String,
}

/// Oldest first. Undated nodes go last and keep their discovery order.
pub fn sort_chronologically(nodes: &mut [ThreadNode]) {
    nodes.sort_by_key(|node| (node.date.is_none(), node.date));
}

/// One block per node, separated by a blank line.
pub fn render_history(nodes: &[ThreadNode]) -> String {
    nodes
        .iter()
        .map(|node| {
            format!(
                "--- From: {} | Date: {}\n{}",
                node.from, node.date_header, node.body_excerpt
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
