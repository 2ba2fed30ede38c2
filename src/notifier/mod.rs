pub mod render;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::types::FilingWithSymbol;

use self::render::Email;

/// Delivers the per-cycle batch of new filings.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// `batch` is non-empty and grouped by symbol in encounter order.
    async fn notify(&self, batch: &[FilingWithSymbol]) -> Result<()>;

    /// Sends a connectivity-test message.
    async fn send_test(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Resend
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResendErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Email notifier over the Resend HTTP API.
pub struct ResendNotifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
    to: Vec<String>,
    subject_prefix: String,
    symbols: Vec<String>,
}

impl ResendNotifier {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.notify_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/emails", cfg.resend_api_url.trim_end_matches('/')),
            api_key: cfg.resend_api_key.clone(),
            from: cfg.email_from.clone(),
            to: cfg.email_to.clone(),
            subject_prefix: cfg.email_subject.clone(),
            symbols: cfg.symbols.clone(),
        })
    }

    async fn send(&self, email: &Email) -> Result<()> {
        let body = SendEmailRequest {
            from: &self.from,
            to: &self.to,
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ResendErrorBody>(&raw)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or(raw);
            return Err(AppError::Delivery(format!(
                "email provider returned {status}: {message}"
            )));
        }

        match resp.json::<SendEmailResponse>().await {
            Ok(SendEmailResponse { id: Some(id) }) => {
                info!(email_id = %id, subject = %email.subject, "Email sent")
            }
            Ok(_) => info!(subject = %email.subject, "Email sent"),
            Err(e) => warn!("Email accepted but response was unreadable: {e}"),
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn notify(&self, batch: &[FilingWithSymbol]) -> Result<()> {
        if batch.is_empty() {
            info!("No filings to notify about");
            return Ok(());
        }
        info!(
            filings = batch.len(),
            "Sending email notification for {} filing(s)...",
            batch.len()
        );
        let email = render::new_filings_email(batch, Utc::now());
        self.send(&email).await
    }

    async fn send_test(&self) -> Result<()> {
        let email = render::test_email(&self.subject_prefix, &self.symbols, Utc::now());
        self.send(&email).await
    }
}
