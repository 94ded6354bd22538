//! Detection of machine-generated mail, so the agent never answers an
//! autoresponder (and never gets answered by one in a loop).

use mailparse::MailHeaderMap;

const BULK_PRECEDENCE: &[&str] = &["bulk", "list", "auto_reply", "junk"];

const AUTO_RESPONSE_HEADERS: &[&str] = &["X-Auto-Response-Suppress", "X-Autoreply", "X-Autorespond"];

/// True when the headers carry a standard auto-reply or bulk marker.
///
/// Checked in order: `Auto-Submitted` other than `no`, a bulk `Precedence`,
/// then the presence (with any value) of the vendor auto-response headers.
pub fn is_auto_generated(headers: &[mailparse::MailHeader<'_>]) -> bool {
    let auto_submitted = headers
        .get_first_value("Auto-Submitted")
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if !auto_submitted.is_empty() && auto_submitted != "no" {
        return true;
    }

    let precedence = headers
        .get_first_value("Precedence")
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if BULK_PRECEDENCE.contains(&precedence.as_str()) {
        return true;
    }

    AUTO_RESPONSE_HEADERS
        .iter()
        .any(|name| headers.get_first_header(name).is_some())
}
