//! IMAP mailbox sessions over native-tls.

use super::email::normalize_message_id;
use super::{Connector, MailStore, MailboxError, MessageFlag, SearchQuery, Uid};
use crate::config::ImapConfig;

use imap::types::Flag;

type ImapSession = imap::Session<native_tls::TlsStream<std::net::TcpStream>>;

/// Opens authenticated IMAP sessions from configuration.
#[derive(Clone)]
pub struct ImapConnector {
    host: String,
    port: u16,
    username: String,
    password: String,
    use_tls: bool,
}

impl std::fmt::Debug for ImapConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConnector")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &"[REDACTED]")
            .field("password", &"[REDACTED]")
            .field("use_tls", &self.use_tls)
            .finish()
    }
}

impl ImapConnector {
    pub fn from_config(config: &ImapConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            password: config.password.clone(),
            use_tls: config.use_tls,
        }
    }
}

impl Connector for ImapConnector {
    type Store = ImapMailbox;

    fn connect(&self) -> Result<ImapMailbox, MailboxError> {
        let tls = native_tls::TlsConnector::builder().build().map_err(|error| {
            MailboxError::Session(format!("failed to build TLS connector for IMAP: {error}"))
        })?;

        let address = (self.host.as_str(), self.port);
        let client = if self.use_tls {
            imap::connect(address, self.host.as_str(), &tls)
        } else {
            imap::connect_starttls(address, self.host.as_str(), &tls)
        }
        .map_err(|error| {
            MailboxError::Session(format!(
                "failed to connect to IMAP server '{}:{}': {error}",
                self.host, self.port
            ))
        })?;

        let session = client
            .login(self.username.as_str(), self.password.as_str())
            .map_err(|(error, _)| {
                MailboxError::Session(format!("failed to authenticate to IMAP server: {error}"))
            })?;

        tracing::debug!(host = %self.host, port = self.port, "IMAP session opened");

        Ok(ImapMailbox {
            session,
            selected: None,
        })
    }
}

/// A live IMAP session that remembers which folder is selected and how.
pub struct ImapMailbox {
    session: ImapSession,
    selected: Option<(String, bool)>,
}

impl ImapMailbox {
    fn ensure_selected(&mut self, folder: &str, writable: bool) -> Result<(), MailboxError> {
        let usable = self
            .selected
            .as_ref()
            .is_some_and(|(current, read_only)| current == folder && (!writable || !read_only));
        if usable {
            return Ok(());
        }
        self.select(folder, !writable)
    }
}

impl MailStore for ImapMailbox {
    fn select(&mut self, folder: &str, read_only: bool) -> Result<(), MailboxError> {
        self.selected = None;

        let result = if read_only {
            self.session.examine(folder)
        } else {
            self.session.select(folder)
        };

        match result {
            Ok(_) => {
                self.selected = Some((folder.to_string(), read_only));
                Ok(())
            }
            Err(error) if is_session_error(&error) => Err(MailboxError::Session(error.to_string())),
            Err(error) => Err(MailboxError::Select {
                folder: folder.to_string(),
                reason: error.to_string(),
            }),
        }
    }

    fn search(&mut self, folder: &str, query: &SearchQuery) -> Result<Vec<Uid>, MailboxError> {
        let criterion = build_search_criterion(query)?;
        self.ensure_selected(folder, false)?;

        let mut uids = self
            .session
            .uid_search(&criterion)
            .map_err(classify_error)?
            .into_iter()
            .collect::<Vec<_>>();
        uids.sort_unstable();
        Ok(uids)
    }

    fn fetch(&mut self, folder: &str, uid: Uid) -> Result<Option<Vec<u8>>, MailboxError> {
        self.ensure_selected(folder, false)?;

        let fetches = self
            .session
            .uid_fetch(uid.to_string(), "(UID BODY.PEEK[])")
            .map_err(classify_error)?;

        Ok(fetches
            .iter()
            .find_map(|fetch| fetch.body())
            .map(<[u8]>::to_vec))
    }

    fn mark_seen(&mut self, folder: &str, uid: Uid) -> Result<(), MailboxError> {
        self.ensure_selected(folder, true)?;

        self.session
            .uid_store(uid.to_string(), "+FLAGS (\\Seen)")
            .map_err(classify_error)?;
        Ok(())
    }

    fn append(
        &mut self,
        folder: &str,
        raw: &[u8],
        flags: &[MessageFlag],
    ) -> Result<(), MailboxError> {
        let flags = flags
            .iter()
            .map(|flag| match flag {
                MessageFlag::Seen => Flag::Seen,
            })
            .collect::<Vec<_>>();

        self.session
            .append_with_flags(folder, raw, &flags)
            .map_err(classify_error)
    }

    fn logout(&mut self) {
        if let Err(error) = self.session.logout() {
            tracing::debug!(%error, "IMAP logout failed");
        }
    }
}

fn is_session_error(error: &imap::error::Error) -> bool {
    matches!(
        error,
        imap::error::Error::Io(_)
            | imap::error::Error::ConnectionLost
            | imap::error::Error::Tls(_)
            | imap::error::Error::TlsHandshake(_)
    )
}

fn classify_error(error: imap::error::Error) -> MailboxError {
    if is_session_error(&error) {
        MailboxError::Session(error.to_string())
    } else {
        MailboxError::Command(error.to_string())
    }
}

fn build_search_criterion(query: &SearchQuery) -> Result<String, MailboxError> {
    match query {
        SearchQuery::Unseen => Ok("UNSEEN".to_string()),
        SearchQuery::MessageId(message_id) => build_message_id_search_criterion(message_id)
            .ok_or_else(|| {
                MailboxError::Command(format!(
                    "refusing unsafe message id in search: {message_id:?}"
                ))
            }),
    }
}

/// `HEADER Message-ID "<id without angle brackets>"`, or `None` when the id
/// is empty or would break out of the quoted string.
fn build_message_id_search_criterion(message_id: &str) -> Option<String> {
    let search_id = normalize_message_id(message_id);
    if search_id.is_empty()
        || search_id
            .chars()
            .any(|character| character == '\r' || character == '\n')
    {
        return None;
    }

    let escaped = search_id.replace('\\', "\\\\").replace('"', "\\\"");
    Some(format!("HEADER Message-ID \"{escaped}\""))
}

#[cfg(test)]
mod tests {
    use super::{build_message_id_search_criterion, build_search_criterion};
    use crate::messaging::SearchQuery;

    #[test]
    fn message_id_criterion_unwraps_angle_brackets() {
        assert_eq!(
            build_message_id_search_criterion("<m1@example.com>"),
            Some("HEADER Message-ID \"m1@example.com\"".to_string())
        );
    }

    #[test]
    fn message_id_criterion_escapes_quotes() {
        assert_eq!(
            build_message_id_search_criterion("<we\"ird@x>"),
            Some("HEADER Message-ID \"we\\\"ird@x\"".to_string())
        );
    }

    #[test]
    fn message_id_criterion_rejects_line_breaks_and_empties() {
        assert_eq!(build_message_id_search_criterion("<a\r\nb@x>"), None);
        assert_eq!(build_message_id_search_criterion("<>"), None);
        assert!(build_search_criterion(&SearchQuery::MessageId("<>".into())).is_err());
    }

    #[test]
    fn unseen_criterion() {
        assert_eq!(
            build_search_criterion(&SearchQuery::Unseen).expect("criterion"),
            "UNSEEN"
        );
    }
}
