//! Email API client
//!
//! Sends plain-text mail through an HTTP email provider (Resend-compatible
//! `POST {endpoint}` with bearer auth).

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::EmailConfig;
use crate::error::{AppError, AppResult};

/// Email API client
#[derive(Clone)]
pub struct EmailClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    from_address: String,
}

/// Outgoing message
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Result of a delivery attempt that did not error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// No API key configured; the message was only logged
    Skipped,
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(default)]
    message: Option<String>,
}

impl EmailClient {
    /// Create a client from configuration
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.api_endpoint.clone(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            from_address: config.from_address.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Deliver a message
    pub async fn send(&self, message: &EmailMessage) -> AppResult<Delivery> {
        let Some(api_key) = &self.api_key else {
            tracing::info!(
                to = %message.to,
                subject = %message.subject,
                "email delivery disabled, message not sent"
            );
            return Ok(Delivery::Skipped);
        };

        let request = SendEmailRequest {
            from: &self.from_address,
            to: [&message.to],
            subject: &message.subject,
            text: &message.text,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::EmailProvider(format!("request failed: {}", e)))?;

        if response.status().is_success() {
            Ok(Delivery::Sent)
        } else {
            let status = response.status();
            let detail = response
                .json::<ProviderError>()
                .await
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| "unknown error".to_string());
            Err(AppError::EmailProvider(format!("{} - {}", status, detail)))
        }
    }
}
