use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clanmanager_core::{ClanId, ClanMember, MemberId, NotifyConfig};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::NotifyError;

/// Delivers a direct message to a member about to expire.
///
/// Delivery is best-effort: callers log failures and carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, member: &ClanMember, message: &str) -> Result<(), NotifyError>;
}

/// Writes the notice to the log. Used when no webhook is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, member: &ClanMember, message: &str) -> Result<(), NotifyError> {
        info!(
            member_id = %member.id,
            discord_user_id = member.discord_user_id,
            %message,
            "reverification notice"
        );
        Ok(())
    }
}

/// JSON body posted to the notification webhook.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    member_id: MemberId,
    discord_user_id: u64,
    clan_id: ClanId,
    message: &'a str,
}

/// POSTs each notice to an HTTP endpoint, typically a bot process that owns
/// the chat-platform connection and turns it into a direct message.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, member: &ClanMember, message: &str) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            member_id: member.id,
            discord_user_id: member.discord_user_id,
            clan_id: member.clan_id,
            message,
        };
        let resp = self.client.post(&self.url).json(&payload).send().await?;
        if !resp.status().is_success() {
            return Err(NotifyError::Rejected {
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }
}

/// Pick the notifier described by `config`. A webhook that cannot be built
/// falls back to logging so expiries still go through.
pub fn build_notifier(config: &NotifyConfig) -> Arc<dyn Notifier> {
    match config.webhook_url.as_deref() {
        Some(url) => match WebhookNotifier::new(url, Duration::from_millis(config.timeout_ms)) {
            Ok(n) => {
                info!(url, "expiry notices go to webhook");
                Arc::new(n)
            }
            Err(e) => {
                warn!(url, error = %e, "webhook notifier unavailable, logging notices instead");
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    }
}
