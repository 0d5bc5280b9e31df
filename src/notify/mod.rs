// src/notify/mod.rs
//! Outbound notification channels. Delivery failures are logged and
//! reported in `SendResult`; they never propagate into a run.

pub mod antiflutter;
pub mod discord;
pub mod email;
pub mod slack;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::alert::AlertMessage;

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, msg: &AlertMessage) -> Result<()>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fan-out over every configured channel.
#[derive(Clone, Default)]
pub struct NotifierMux {
    channels: Vec<Arc<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new(channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self { channels }
    }

    /// Slack / Discord / e-mail, each only if its env vars are present.
    pub fn from_env() -> Self {
        let mut channels: Vec<Arc<dyn Notifier>> = Vec::new();
        if let Ok(url) = std::env::var("SLACK_WEBHOOK_URL") {
            channels.push(Arc::new(slack::SlackNotifier::new(url)));
        }
        if let Ok(url) = std::env::var("DISCORD_WEBHOOK_URL") {
            channels.push(Arc::new(discord::DiscordNotifier::new(url)));
        }
        match email::EmailSender::from_env() {
            Ok(Some(sender)) => channels.push(Arc::new(sender)),
            Ok(None) => {}
            Err(e) => tracing::warn!(target: "notify", error = %e, "email channel misconfigured"),
        }
        tracing::info!(target: "notify", channels = channels.len(), "notification channels configured");
        Self { channels }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Delivery targets: one per channel, or the log alone when none is configured.
    pub fn targets(&self) -> usize {
        self.channels.len().max(1)
    }

    pub fn target_name(&self, idx: usize) -> &'static str {
        self.channels.get(idx).map_or("log", |ch| ch.name())
    }

    /// Deliver through a single target.
    pub async fn send_to(&self, idx: usize, msg: &AlertMessage) -> Result<()> {
        match self.channels.get(idx) {
            Some(ch) => ch.send(msg).await,
            None if self.channels.is_empty() => {
                tracing::info!(target: "notify", "{}", msg.text);
                Ok(())
            }
            None => Err(anyhow!("no notification target #{idx}")),
        }
    }

    /// `ok` only if every channel accepted the message.
    pub async fn notify(&self, msg: &AlertMessage) -> SendResult {
        if self.channels.is_empty() {
            tracing::debug!(target: "notify", "no channels configured; alert logged only");
            tracing::info!(target: "notify", "{}", msg.text);
            return SendResult { ok: true, error: None };
        }

        let mut errors = Vec::new();
        for ch in &self.channels {
            if let Err(e) = ch.send(msg).await {
                tracing::warn!(target: "notify", channel = ch.name(), error = %e, "notification failed");
                errors.push(format!("{}: {e:#}", ch.name()));
            }
        }
        if errors.is_empty() {
            SendResult { ok: true, error: None }
        } else {
            SendResult {
                ok: false,
                error: Some(errors.join("; ")),
            }
        }
    }
}
