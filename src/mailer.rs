// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound account mail.
//!
//! Sends always go through [`crate::background::BackgroundTasks`]; a handler
//! never awaits delivery.

use async_trait::async_trait;

use crate::models::UserId;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Welcome message carrying the activation token for a new account.
    async fn send_welcome(
        &self,
        recipient: &str,
        user_id: UserId,
        activation_token: &str,
    ) -> Result<(), MailError>;
}

/// Mailer that only records that a message would have been sent.
///
/// The activation token is deliberately left out of the log line.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_welcome(
        &self,
        recipient: &str,
        user_id: UserId,
        _activation_token: &str,
    ) -> Result<(), MailError> {
        tracing::info!(recipient, user_id, "Welcome mail queued");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        LogMailer
            .send_welcome("alice@example.com", 1, "AAAAAAAAAAAAAAAAAAAAAA")
            .await
            .unwrap();
    }
}
