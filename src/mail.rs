//! Outbound email.
//!
//! The authentication flows only know the [`Mailer`] trait. `HttpMailer` posts
//! messages to a transactional-mail HTTP API, `LogMailer` writes them to the log
//! for local development, and `MemoryMailer` keeps them in memory for tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use log::info;
use serde::Serialize;
use thiserror::Error;

use crate::config::MailConfig;
use crate::error::AppError;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport error: {0}")]
    Transport(String),
    #[error("mail API rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<MailError> for AppError {
    fn from(error: MailError) -> Self {
        AppError::EmailDeliveryFailure(error.to_string())
    }
}

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

/// Builds the mailer for this deployment: HTTP delivery when an API URL is
/// configured, logging otherwise.
pub fn from_config(config: &MailConfig) -> Arc<dyn Mailer> {
    match &config.api_url {
        Some(api_url) => Arc::new(HttpMailer::new(
            api_url.clone(),
            config.api_key.clone(),
            config.from.clone(),
        )),
        None => Arc::new(LogMailer),
    }
}

#[derive(Debug, Serialize)]
struct OutboundMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

pub struct HttpMailer {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(api_url: String, api_key: Option<String>, from: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let mut request = self.http.post(&self.api_url).json(&OutboundMessage {
            from: &self.from,
            to: &email.to,
            subject: &email.subject,
            html: &email.html,
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(MailError::Rejected {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        info!("sent \"{}\" to {}", email.subject, email.to);
        Ok(())
    }
}

/// Logs the recipient and subject instead of sending. The body carries a live
/// token and is not logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        info!(
            "mail delivery disabled, dropping \"{}\" to {}",
            email.subject, email.to
        );
        Ok(())
    }
}

/// Keeps every message in memory. Can be switched into a failing mode to
/// exercise delivery-failure handling.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<Email>>,
    failing: Mutex<bool>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|p| p.into_inner()) = failing;
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn last(&self) -> Option<Email> {
        self.sent().pop()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        if *self.failing.lock().unwrap_or_else(|p| p.into_inner()) {
            return Err(MailError::Transport("mailer is switched off".into()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(email.clone());
        Ok(())
    }
}

fn describe_ttl(ttl: Duration) -> String {
    let minutes = ttl.num_minutes();
    if minutes >= 60 && minutes % 60 == 0 {
        let hours = minutes / 60;
        format!("{} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else {
        format!("{} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    }
}

fn layout(
    heading: &str,
    intro: &str,
    token: &str,
    link: &str,
    button: &str,
    ttl: Duration,
) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h1 style="color: #333;">{heading}</h1>
  <p>{intro}</p>
  <div style="background-color: #f4f4f4; padding: 15px; border-radius: 5px; margin: 20px 0;">
    <code style="font-size: 18px; color: #007bff; font-family: monospace;">{token}</code>
  </div>
  <a href="{link}" style="display: inline-block; padding: 12px 24px; background-color: #007bff; color: white; text-decoration: none; border-radius: 5px;">{button}</a>
  <p><strong style="color: #d9534f;">This link will expire in {ttl}.</strong></p>
  <p style="color: #666;">If you did not request this, please ignore this email.</p>
  <hr style="margin: 30px 0; border: none; border-top: 1px solid #ddd;">
  <p style="color: #999; font-size: 12px;">This is an automated email from Task Master. Please do not reply.</p>
</div>"#,
        heading = heading,
        intro = intro,
        token = token,
        link = link,
        button = button,
        ttl = describe_ttl(ttl),
    )
}

pub fn password_reset_email(to: &str, frontend_url: &str, token: &str, ttl: Duration) -> Email {
    let link = format!(
        "{}/resetpassword/{}",
        frontend_url.trim_end_matches('/'),
        token
    );
    Email {
        to: to.to_string(),
        subject: "Password Reset Request - Task Master".into(),
        html: layout(
            "Password Reset Request",
            "You are receiving this email because you (or someone else) requested a password reset.",
            token,
            &link,
            "Reset Password",
            ttl,
        ),
    }
}

pub fn verification_email(to: &str, frontend_url: &str, token: &str, ttl: Duration) -> Email {
    let link = format!(
        "{}/verifyemail/{}",
        frontend_url.trim_end_matches('/'),
        token
    );
    Email {
        to: to.to_string(),
        subject: "Verify your email - Task Master".into(),
        html: layout(
            "Verify Your Email",
            "Thanks for signing up. Confirm your email address to finish setting up your account.",
            token,
            &link,
            "Verify Email",
            ttl,
        ),
    }
}
