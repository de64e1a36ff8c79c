//! Out-of-band delivery of verification secrets (email / SMS).
//!
//! The identity core only needs `send(destination, subject, body)`; real
//! providers sit behind [`WebhookNotifier`] or a custom implementation.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Delivery channel. Email and SMS share one contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync + core::fmt::Debug {
    fn channel(&self) -> Channel;

    async fn send(&self, destination: &str, subject: &str, body: &str) -> Result<(), DeliveryError>;
}

/// Development notifier: logs the envelope, never the body (it carries the
/// secret).
#[derive(Debug, Clone)]
pub struct LogNotifier {
    channel: Channel,
}

impl LogNotifier {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, destination: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        info!(channel = ?self.channel, to = %destination, subject = %subject, body_len = body.len(), "mock delivery");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    channel: Channel,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// POSTs `{channel, to, subject, body}` as JSON to a relay endpoint.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    channel: Channel,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: impl Into<String>, channel: Channel) -> Self {
        Self {
            client,
            url: url.into(),
            channel,
        }
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, destination: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let payload = WebhookPayload {
            channel: self.channel,
            to: destination,
            subject,
            body,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Failed(e.without_url().to_string()))?;
        if !response.status().is_success() {
            warn!(channel = ?self.channel, status = %response.status(), "notify webhook rejected message");
            return Err(DeliveryError::Failed(format!("relay returned {}", response.status())));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: Channel,
    pub destination: String,
    pub subject: String,
    pub body: String,
}

/// Captures messages in memory; can be switched to fail every send.
#[derive(Debug)]
pub struct RecordingNotifier {
    channel: Channel,
    sent: Mutex<Vec<SentMessage>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            sent: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<SentMessage> {
        self.sent().pop()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, destination: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Failed("recording notifier set to fail".to_string()));
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| DeliveryError::Failed("recorder lock poisoned".to_string()))?;
        sent.push(SentMessage {
            channel: self.channel,
            destination: destination.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recorder_captures_and_fails_on_demand() {
        let n = RecordingNotifier::new(Channel::Sms);
        n.send("+15550001111", "OTP", "Your code is 123456").await.unwrap();
        assert_eq!(n.last().unwrap().destination, "+15550001111");

        n.set_failing(true);
        assert!(n.send("+15550001111", "OTP", "x").await.is_err());
        assert_eq!(n.sent().len(), 1);
    }

    #[test]
    fn webhook_payload_shape() {
        let payload = WebhookPayload {
            channel: Channel::Email,
            to: "a@b.com",
            subject: "s",
            body: "b",
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["channel"], "email");
        assert_eq!(json["to"], "a@b.com");
    }
}
