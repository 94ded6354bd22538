//! SMTP delivery through lettre.

use super::{ReplyTransport, TransportError};
use crate::config::SmtpConfig;

use anyhow::Context as _;
use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

pub struct SmtpReplyTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpReplyTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpReplyTransport").finish_non_exhaustive()
    }
}

impl SmtpReplyTransport {
    pub fn from_config(config: &SmtpConfig) -> crate::Result<Self> {
        let builder = if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .with_context(|| format!("invalid SMTP host '{}'", config.host))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .with_context(|| format!("invalid SMTP host '{}'", config.host))?
        };

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self { transport })
    }

    /// Connect and authenticate without sending anything.
    pub async fn health_check(&self) -> crate::Result<()> {
        let ok = self
            .transport
            .test_connection()
            .await
            .context("SMTP health check failed")?;
        if !ok {
            return Err(anyhow::anyhow!("SMTP server rejected test connection").into());
        }
        Ok(())
    }
}

#[async_trait]
impl ReplyTransport for SmtpReplyTransport {
    async fn send(&self, envelope: &Envelope, raw: &[u8]) -> Result<(), TransportError> {
        self.transport
            .send_raw(envelope, raw)
            .await
            .map(|_| ())
            .map_err(|error| TransportError::Send(error.to_string()))
    }
}
