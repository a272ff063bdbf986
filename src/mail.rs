//! Send emails to user for verification and password reset.
//!
//! Rendering and transport belong to a mail relay. [`LogMailer`] only
//! records the message.

use async_trait::async_trait;
use serde::Serialize;

/// Mail templates list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// Link proving ownership of an email.
    VerifyEmail,
    /// Link allowing to choose a new password.
    ResetPassword,
}

/// Message handed to the mail relay.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Message {
    pub to: String,
    pub username: String,
    pub template: Template,
    pub link: String,
}

#[derive(thiserror::Error, Debug)]
#[error("mail could not be delivered: {0}")]
pub struct MailError(pub String);

/// Port for sending emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: Message) -> Result<(), MailError>;
}

/// Mailer writing messages to the logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: Message) -> Result<(), MailError> {
        tracing::info!(
            to = %message.to,
            username = %message.username,
            template = ?message.template,
            "mail queued"
        );
        tracing::debug!(link = %message.link, "mail link");

        Ok(())
    }
}

/// Keep messages in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryMailer {
    pub sent: tokio::sync::Mutex<Vec<Message>>,
}

#[cfg(test)]
#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: Message) -> Result<(), MailError> {
        self.sent.lock().await.push(message);
        Ok(())
    }
}

/// Relay that is always down.
#[cfg(test)]
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingMailer;

#[cfg(test)]
#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _message: Message) -> Result<(), MailError> {
        Err(MailError("relay unreachable".into()))
    }
}
