//! Inbound message parsing: identifiers, decoded headers and plain-text body.

use super::classify::is_auto_generated;
use super::Uid;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use mailparse::{DispositionType, MailAddr, MailHeaderMap};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// One polled email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub uid: Uid,
    pub sender: String,
    pub subject: String,
    pub body_text: String,
    /// `Message-ID` as received (angle-bracket form), empty if absent.
    pub message_id: String,
    /// `References` as received, trimmed but otherwise verbatim.
    pub references: String,
    /// `In-Reply-To` as received, trimmed.
    pub in_reply_to: String,
    pub is_auto_generated: bool,
}

impl IncomingMessage {
    pub fn parse(uid: Uid, raw: &[u8]) -> anyhow::Result<Self> {
        let parsed = mailparse::parse_mail(raw).context("failed to parse MIME email")?;
        let headers = parsed.headers.as_slice();

        Ok(Self {
            uid,
            sender: header_value(headers, "From"),
            subject: header_value(headers, "Subject"),
            body_text: extract_text_body(&parsed),
            message_id: header_value(headers, "Message-ID"),
            references: header_value(headers, "References"),
            in_reply_to: header_value(headers, "In-Reply-To"),
            is_auto_generated: is_auto_generated(headers),
        })
    }

    /// Ancestor identifiers this message points at, deduplicated.
    pub fn ancestor_ids(&self) -> Vec<String> {
        extract_message_ids(&self.references, &self.in_reply_to)
    }

    /// Bare address of the sender, if `From` parses.
    pub fn sender_address(&self) -> Option<String> {
        parse_primary_mailbox(&self.sender).map(|(address, _)| address)
    }
}

/// Decoded, trimmed header value; empty when missing.
pub fn header_value(headers: &[mailparse::MailHeader<'_>], name: &str) -> String {
    headers
        .get_first_value(name)
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

/// Every `<...>` identifier in `References` followed by `In-Reply-To`,
/// first-seen order, without duplicates.
pub fn extract_message_ids(references: &str, in_reply_to: &str) -> Vec<String> {
    let combined = format!("{references} {in_reply_to}");
    let mut seen = HashSet::new();

    message_id_regex()
        .find_iter(&combined)
        .map(|found| found.as_str().to_string())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Identifiers referenced by a parsed message's own threading headers.
pub fn references_of(headers: &[mailparse::MailHeader<'_>]) -> Vec<String> {
    extract_message_ids(
        &header_value(headers, "References"),
        &header_value(headers, "In-Reply-To"),
    )
}

fn message_id_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid message-id regex"))
}

pub fn normalize_message_id(value: &str) -> String {
    value
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_string()
}

/// RFC 2822 `Date` header to UTC. `None` when missing or unparsable.
///
/// Not `mailparse::dateparse`: it maps unreadable input to the epoch.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let mut value = value.trim();
    // Trailing zone comment, as in `+0000 (UTC)`.
    if value.ends_with(')')
        && let Some(start) = value.rfind('(')
    {
        value = value[..start].trim_end();
    }
    if value.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

pub fn parse_primary_mailbox(value: &str) -> Option<(String, Option<String>)> {
    let addresses = mailparse::addrparse(value).ok()?.into_inner();
    for address in addresses {
        match address {
            MailAddr::Single(single) => {
                return Some((single.addr, single.display_name));
            }
            MailAddr::Group(group) => {
                if let Some(single) = group.addrs.into_iter().next() {
                    return Some((single.addr, single.display_name));
                }
            }
        }
    }
    None
}

/// First `max_chars` characters of `value`.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((cutoff, _)) => value[..cutoff].to_string(),
        None => value.to_string(),
    }
}

/// Plain-text body: `text/plain` parts first, flattened HTML otherwise.
/// Attachments are ignored.
pub fn extract_text_body(parsed: &mailparse::ParsedMail<'_>) -> String {
    let mut plain_text_parts = Vec::new();
    let mut html_parts = Vec::new();

    collect_parts(parsed, &mut plain_text_parts, &mut html_parts);

    let body_text = if !plain_text_parts.is_empty() {
        plain_text_parts.join("\n\n")
    } else if !html_parts.is_empty() {
        html_to_text(&html_parts.join("\n\n"))
    } else if parsed.subparts.is_empty() {
        parsed.get_body().unwrap_or_default()
    } else {
        String::new()
    };

    body_text.replace("\r\n", "\n").trim().to_string()
}

fn collect_parts(
    part: &mailparse::ParsedMail<'_>,
    plain_text_parts: &mut Vec<String>,
    html_parts: &mut Vec<String>,
) {
    if part.subparts.is_empty() {
        let disposition = part.get_content_disposition();
        let is_attachment = matches!(disposition.disposition, DispositionType::Attachment)
            || disposition.params.contains_key("filename")
            || part.ctype.params.contains_key("name");
        if is_attachment {
            return;
        }

        let mime_type = part.ctype.mimetype.to_ascii_lowercase();
        if mime_type.starts_with("text/plain") {
            if let Ok(body) = part.get_body()
                && !body.trim().is_empty()
            {
                plain_text_parts.push(body);
            }
        } else if mime_type.starts_with("text/html")
            && let Ok(body) = part.get_body()
            && !body.trim().is_empty()
        {
            html_parts.push(body);
        }
        return;
    }

    for subpart in &part.subparts {
        collect_parts(subpart, plain_text_parts, html_parts);
    }
}

fn html_to_text(html: &str) -> String {
    let without_tags = html_tag_regex().replace_all(html, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn html_tag_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?is)<[^>]+>").expect("valid HTML tag regex"))
}
