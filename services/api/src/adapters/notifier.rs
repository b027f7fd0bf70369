//! services/api/src/adapters/notifier.rs
//!
//! Implementations of the `NotificationSender` port.

use async_trait::async_trait;
use keepstash_core::domain::Notification;
use keepstash_core::ports::{NotificationSender, PortError, PortResult};
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::config::ResendConfig;

const RESEND_API_URL: &str = "https://api.resend.com";

/// Writes notifications to the log. Used when no mail provider is configured.
pub struct LogNotifier;

#[async_trait]
impl NotificationSender for LogNotifier {
    async fn send(&self, notification: Notification) -> PortResult<()> {
        match &notification {
            Notification::EmailVerificationRequested {
                email,
                verification_url,
                ..
            } => info!(to = %email, url = %verification_url, "Email verification requested"),
            Notification::ForgotPasswordOtpRequested { email, otp } => {
                info!(to = %email, otp = %otp, "Password reset code requested")
            }
        }
        Ok(())
    }
}

/// Delivers notifications through the Resend email API.
pub struct ResendNotifier {
    client: Client,
    base_url: String,
    api_key: String,
    from_email: String,
}

#[derive(Serialize)]
struct EmailPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: String,
    text: String,
}

impl ResendNotifier {
    pub fn new(client: Client, config: &ResendConfig) -> Self {
        Self::with_base_url(client, config, RESEND_API_URL)
    }

    pub fn with_base_url(client: Client, config: &ResendConfig, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            from_email: config.from_email.clone(),
        }
    }
}

/// Subject and plain-text body for a notification.
fn render(notification: &Notification) -> (String, String) {
    match notification {
        Notification::EmailVerificationRequested {
            verification_url, ..
        } => (
            "Verify your email address".to_string(),
            format!(
                "Confirm your email address for KeepStash by opening this link:\n\n{}\n\n\
                 If you did not request this, you can ignore this message.",
                verification_url
            ),
        ),
        Notification::ForgotPasswordOtpRequested { otp, .. } => (
            "Your password reset code".to_string(),
            format!(
                "Your KeepStash password reset code is {}. It expires in 5 minutes.",
                otp
            ),
        ),
    }
}

#[async_trait]
impl NotificationSender for ResendNotifier {
    async fn send(&self, notification: Notification) -> PortResult<()> {
        let (subject, text) = render(&notification);
        let payload = EmailPayload {
            from: &self.from_email,
            to: [notification.recipient()],
            subject,
            text,
        };

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to send email: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::Unexpected(format!(
                "Mail provider rejected the message ({}): {}",
                status, body
            )));
        }

        info!("Email sent to {}", notification.recipient());
        Ok(())
    }
}
