//! Configuration loading: a TOML file layered with `MAJORDOMO__*` environment
//! overrides.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Conventional sent-folder names, probed in order.
pub const DEFAULT_SENT_FOLDER_CANDIDATES: &[&str] = &[
    "Sent",
    "Sent Items",
    "Sent Messages",
    "[Gmail]/Sent Mail",
    "INBOX.Sent",
    "SENT",
];

const ENV_PREFIX: &str = "MAJORDOMO";
const MIN_POLL_INTERVAL_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub imap: ImapConfig,
    pub smtp: SmtpConfig,
    pub agent: AgentConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub thread: ThreadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Deserialize)]
pub struct ImapConfig {
    pub host: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Implicit TLS when true, STARTTLS otherwise.
    #[serde(default = "default_true")]
    pub use_tls: bool,
    #[serde(default = "default_inbox")]
    pub inbox: String,
}

#[derive(Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub use_starttls: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Address replies are sent from. Also used to recognise our own mail.
    pub address: String,
    /// Sign-off name used in generated replies.
    pub name: String,
    /// System prompt handed to the text-generation provider.
    pub persona: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub delivery: DeliveryMode,
    #[serde(default = "default_sent_folder_candidates")]
    pub sent_folder_candidates: Vec<String>,
}

#[derive(Clone, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

/// Bounds on thread reconstruction.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ThreadConfig {
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,
    /// Stop traversal after this many failed folder lookups. Unlimited when unset.
    #[serde(default)]
    pub max_transport_failures: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Directory for daily-rolling log files. Stderr only when unset.
    #[serde(default)]
    pub dir: Option<std::path::PathBuf>,
    #[serde(default)]
    pub json: bool,
}

/// When an unseen message gets flagged `\Seen`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Flag immediately after reading. A crash mid-pipeline loses the reply.
    #[default]
    AtMostOnce,
    /// Flag only once the message was skipped or replied to. Failed
    /// messages are picked up again on the next poll.
    AfterReply,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            max_body_chars: default_max_body_chars(),
            max_transport_failures: None,
        }
    }
}

fn default_imap_port() -> u16 {
    993
}

fn default_smtp_port() -> u16 {
    465
}

fn default_true() -> bool {
    true
}

fn default_inbox() -> String {
    "INBOX".to_string()
}

fn default_poll_interval() -> u64 {
    60
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_max_messages() -> usize {
    10
}

fn default_max_body_chars() -> usize {
    800
}

fn default_sent_folder_candidates() -> Vec<String> {
    DEFAULT_SENT_FOLDER_CANDIDATES
        .iter()
        .map(|name| name.to_string())
        .collect()
}

impl Config {
    /// Load from a TOML file, then apply environment overrides such as
    /// `MAJORDOMO__IMAP__PASSWORD`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_settings(settings)
    }

    /// Parse a TOML document without touching the environment.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;

        Self::from_settings(settings)
    }

    fn from_settings(settings: config::Config) -> Result<Self, ConfigError> {
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("imap.host", &self.imap.host),
            ("imap.username", &self.imap.username),
            ("imap.inbox", &self.imap.inbox),
            ("smtp.host", &self.smtp.host),
            ("agent.address", &self.agent.address),
            ("llm.base_url", &self.llm.base_url),
            ("llm.model", &self.llm.model),
        ];

        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("'{key}' must not be empty")));
            }
        }

        if !self.agent.address.contains('@') {
            return Err(ConfigError::Invalid(format!(
                "'agent.address' is not an email address: '{}'",
                self.agent.address
            )));
        }

        if self.thread.max_messages == 0 {
            return Err(ConfigError::Invalid(
                "'thread.max_messages' must be at least 1".to_string(),
            ));
        }

        if self.thread.max_body_chars == 0 {
            return Err(ConfigError::Invalid(
                "'thread.max_body_chars' must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl AgentConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }

    /// Candidate names with blanks removed, falling back to the defaults.
    pub fn sent_folder_candidates(&self) -> Vec<String> {
        let candidates = self
            .sent_folder_candidates
            .iter()
            .map(|folder| folder.trim().to_string())
            .filter(|folder| !folder.is_empty())
            .collect::<Vec<_>>();

        if candidates.is_empty() {
            default_sent_folder_candidates()
        } else {
            candidates
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl std::fmt::Debug for ImapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &"[REDACTED]")
            .field("password", &"[REDACTED]")
            .field("use_tls", &self.use_tls)
            .field("inbox", &self.inbox)
            .finish()
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &"[REDACTED]")
            .field("password", &"[REDACTED]")
            .field("use_starttls", &self.use_starttls)
            .finish()
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
