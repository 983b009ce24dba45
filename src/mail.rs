//! Outbound delivery of verification codes.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::SmtpConfig;

const SUBJECT: &str = "Login Verification Code";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid mail address: {0}")]
    Address(String),

    #[error("failed to build mail message: {0}")]
    Build(String),

    #[error("smtp send failed: {0}")]
    Transport(String),
}

pub type MailResult<T> = Result<T, MailError>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends a one-shot message carrying `code` to `to`.
    async fn send_code(&self, to: &str, code: &str) -> MailResult<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    host: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> MailResult<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| MailError::Address(format!("from '{}': {}", config.from, e)))?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| MailError::Transport(format!("create relay: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        let mut builder = builder.port(config.port);

        if let Some((username, password)) = &config.credentials {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            host: config.host.clone(),
        })
    }
}

fn build_message(from: &Mailbox, to: &str, code: &str) -> MailResult<Message> {
    let to: Mailbox = to
        .parse()
        .map_err(|e| MailError::Address(format!("to '{}': {}", to, e)))?;

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(SUBJECT)
        .header(ContentType::TEXT_PLAIN)
        .body(format!(
            "Your verification code is: {}. Valid for 5 minutes.\r\n",
            code
        ))
        .map_err(|e| MailError::Build(e.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_code(&self, to: &str, code: &str) -> MailResult<()> {
        debug!(to, host = %self.host, "sending verification code via smtp");
        let message = build_message(&self.from, to, code)?;

        self.transport.send(message).await.map_err(|e| {
            error!(to, error = %e, "smtp send failed");
            MailError::Transport(e.to_string())
        })?;

        info!(to, "verification code sent");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCode {
    pub to: String,
    pub code: String,
}

/// Most recent messages kept by [`InMemoryMailer`]; older ones are dropped.
pub const OUTBOX_CAPACITY: usize = 100;

/// Records messages instead of delivering them.
#[derive(Clone, Default)]
pub struct InMemoryMailer {
    outbox: Arc<Mutex<VecDeque<SentCode>>>,
}

impl InMemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentCode> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Most recent code sent to `to`, if any.
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|sent| sent.to == to)
            .map(|sent| sent.code.clone())
    }
}

#[async_trait]
impl Mailer for InMemoryMailer {
    async fn send_code(&self, to: &str, code: &str) -> MailResult<()> {
        debug!(to, "verification code captured in memory outbox");
        let mut outbox = self.outbox.lock().unwrap_or_else(PoisonError::into_inner);
        if outbox.len() == OUTBOX_CAPACITY {
            outbox.pop_front();
        }
        outbox.push_back(SentCode {
            to: to.to_string(),
            code: code.to_string(),
        });
        Ok(())
    }
}
