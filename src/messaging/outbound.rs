//! Outgoing reply construction: threading headers, envelope and raw bytes.

use super::TransportError;
use super::email::{IncomingMessage, parse_primary_mailbox};

use lettre::address::Envelope;
use lettre::message::header::{ContentType, Header, HeaderName, HeaderValue};
use lettre::message::Mailbox;
use lettre::{Address, Message};

/// `In-Reply-To`/`References` for a reply. Both are absent when the
/// incoming message had no `Message-ID`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadHeaders {
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
}

pub fn compose_thread_headers(message_id: &str, references: &str) -> ThreadHeaders {
    let message_id = message_id.trim();
    if message_id.is_empty() {
        return ThreadHeaders::default();
    }

    let references = format!("{} {message_id}", references.trim())
        .trim()
        .to_string();

    ThreadHeaders {
        in_reply_to: Some(message_id.to_string()),
        references: Some(references),
    }
}

/// A fully rendered reply ready for submission.
#[derive(Debug, Clone)]
pub struct OutgoingReply {
    pub message_id: String,
    pub envelope: Envelope,
    pub raw: Vec<u8>,
}

/// `Auto-Submitted: auto-replied`, so other agents leave us alone.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AutoSubmitted(String);

impl Header for AutoSubmitted {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("Auto-Submitted")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(s.trim().to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

/// Build the reply to `incoming` sent from `from`.
///
/// `message_id_domain` is the right-hand side of the generated `Message-ID`.
pub fn build_reply(
    from: &str,
    incoming: &IncomingMessage,
    body: &str,
    message_id_domain: &str,
) -> Result<OutgoingReply, TransportError> {
    let message_id = format!("<{}@{}>", uuid::Uuid::new_v4().simple(), message_id_domain);
    let thread = compose_thread_headers(&incoming.message_id, &incoming.references);

    let mut builder = Message::builder()
        .message_id(Some(message_id.clone()))
        .date_now()
        .from(parse_mailbox(from)?)
        .to(parse_mailbox(&incoming.sender)?)
        .subject(format!("Re: {}", incoming.subject))
        .header(AutoSubmitted("auto-replied".to_string()))
        .header(ContentType::TEXT_PLAIN);

    if let Some(in_reply_to) = thread.in_reply_to {
        builder = builder.in_reply_to(in_reply_to);
    }
    if let Some(references) = thread.references {
        builder = builder.references(references);
    }

    let message = builder
        .body(body.to_string())
        .map_err(|error| TransportError::Build(error.to_string()))?;

    Ok(OutgoingReply {
        message_id,
        envelope: message.envelope().clone(),
        raw: message.formatted(),
    })
}

pub fn parse_mailbox(value: &str) -> Result<Mailbox, TransportError> {
    if let Ok(mailbox) = value.parse::<Mailbox>() {
        return Ok(mailbox);
    }

    let (address, display_name) =
        parse_primary_mailbox(value).ok_or_else(|| TransportError::Address {
            address: value.to_string(),
            reason: "no mailbox found".to_string(),
        })?;
    let address: Address = address.parse().map_err(|error: lettre::address::AddressError| {
        TransportError::Address {
            address: address.clone(),
            reason: error.to_string(),
        }
    })?;
    Ok(Mailbox::new(display_name, address))
}

#[cfg(test)]
mod tests {
    use super::{ThreadHeaders, build_reply, compose_thread_headers, parse_mailbox};
    use crate::messaging::email::IncomingMessage;

    fn incoming(message_id: &str, references: &str) -> IncomingMessage {
        IncomingMessage {
            uid: 1,
            sender: "Alice Example <alice@example.com>".to_string(),
            subject: "Budget".to_string(),
            body_text: "Can we talk?".to_string(),
            message_id: message_id.to_string(),
            references: references.to_string(),
            in_reply_to: String::new(),
            is_auto_generated: false,
        }
    }

    fn header<'a>(raw: &'a str, name: &str) -> Option<&'a str> {
        raw.lines()
            .take_while(|line| !line.is_empty())
            .find_map(|line| line.strip_prefix(&format!("{name}: ")))
    }

    #[test]
    fn no_message_id_means_no_thread_headers() {
        assert_eq!(compose_thread_headers("", ""), ThreadHeaders::default());
        assert_eq!(
            compose_thread_headers("  ", "<r1@x>"),
            ThreadHeaders::default()
        );
    }

    #[test]
    fn references_gain_the_replied_message_id() {
        let headers = compose_thread_headers("<a@x>", "<r1@x> <r2@x>");
        assert_eq!(headers.in_reply_to.as_deref(), Some("<a@x>"));
        assert_eq!(headers.references.as_deref(), Some("<r1@x> <r2@x> <a@x>"));
    }

    #[test]
    fn empty_references_yield_only_the_message_id() {
        let headers = compose_thread_headers("<a@x>", "   ");
        assert_eq!(headers.references.as_deref(), Some("<a@x>"));
    }

    #[test]
    fn build_reply_sets_threading_and_loop_headers() {
        let reply = build_reply(
            "Majordomo <agent@example.com>",
            &incoming("<a@x>", "<r1@x>"),
            "Sure, Tuesday works.",
            "smtp.example.com",
        )
        .expect("reply builds");

        let raw = String::from_utf8(reply.raw.clone()).expect("utf-8");
        assert_eq!(header(&raw, "In-Reply-To"), Some("<a@x>"));
        assert_eq!(header(&raw, "References"), Some("<r1@x> <a@x>"));
        assert_eq!(header(&raw, "Auto-Submitted"), Some("auto-replied"));
        assert_eq!(header(&raw, "Subject"), Some("Re: Budget"));
        assert_eq!(header(&raw, "Message-ID"), Some(reply.message_id.as_str()));
        assert!(header(&raw, "Date").is_some());
        assert!(reply.message_id.ends_with("@smtp.example.com>"));
        assert!(raw.contains("Sure, Tuesday works."));

        assert_eq!(
            reply.envelope.from().map(|address| address.to_string()),
            Some("agent@example.com".to_string())
        );
        assert_eq!(
            reply
                .envelope
                .to()
                .iter()
                .map(|address| address.to_string())
                .collect::<Vec<_>>(),
            vec!["alice@example.com".to_string()]
        );
    }

    #[test]
    fn build_reply_omits_thread_headers_without_message_id() {
        let reply = build_reply(
            "agent@example.com",
            &incoming("", "<r1@x>"),
            "Hello",
            "example.com",
        )
        .expect("reply builds");

        let raw = String::from_utf8(reply.raw).expect("utf-8");
        assert_eq!(header(&raw, "In-Reply-To"), None);
        assert_eq!(header(&raw, "References"), None);
    }

    #[test]
    fn unparsable_recipient_is_an_address_error() {
        let mut message = incoming("<a@x>", "");
        message.sender = "undisclosed-recipients".to_string();
        let error = build_reply("agent@example.com", &message, "Hello", "example.com")
            .expect_err("bad recipient");
        assert!(error.to_string().contains("undisclosed-recipients"));
    }

    #[test]
    fn parse_mailbox_accepts_bare_and_named_addresses() {
        assert_eq!(
            parse_mailbox("bob@example.com").expect("bare").email.to_string(),
            "bob@example.com"
        );
        let named = parse_mailbox("Bob <bob@example.com>").expect("named");
        assert_eq!(named.name.as_deref(), Some("Bob"));
    }
}
