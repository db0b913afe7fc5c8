//! Thin client for the Telegram Bot HTTP API.
//!
//! Only the handful of methods the supervision and maintenance paths need —
//! the bot's own long-poll dispatcher is the *supervised* process and lives
//! elsewhere. This client must never hold a getUpdates consumer slot longer
//! than a single flush call.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::TelegramApiConfig;

pub struct BotApi {
    client: Client,
    api_base: String,
    token: String,
    reset_cooldown: Duration,
    drain_offset_sweep: i64,
}

impl BotApi {
    pub fn new(token: &str, config: &TelegramApiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            reset_cooldown: Duration::from_secs(config.session_reset_cooldown_secs),
            drain_offset_sweep: config.drain_offset_sweep,
        })
    }

    /// Call one API method and unwrap the `{ok, result, description}`
    /// envelope. The token is part of the URL and is never logged.
    async fn call(&self, method: &str, params: Value) -> anyhow::Result<Value> {
        let url = format!("{}/bot{}/{}", self.api_base, self.token, method);
        let response = self.client.post(&url).json(&params).send().await?;
        let status = response.status();
        let body: Value = response.json().await?;

        if !body["ok"].as_bool().unwrap_or(false) {
            let description = body["description"].as_str().unwrap_or("unknown error");
            anyhow::bail!("Telegram API {} failed ({}): {}", method, status, description);
        }
        Ok(body["result"].clone())
    }

    pub async fn get_me(&self) -> anyhow::Result<Value> {
        self.call("getMe", json!({})).await
    }

    pub async fn delete_webhook(&self, drop_pending_updates: bool) -> anyhow::Result<Value> {
        self.call(
            "deleteWebhook",
            json!({ "drop_pending_updates": drop_pending_updates }),
        )
        .await
    }

    /// Fetch pending updates. `timeout: 0` keeps this a short poll — holding
    /// a long poll here would itself conflict with the bot we supervise.
    pub async fn get_updates(&self, offset: Option<i64>, limit: i64) -> anyhow::Result<Vec<Value>> {
        let mut params = json!({ "limit": limit, "timeout": 0 });
        if let Some(offset) = offset {
            params["offset"] = json!(offset);
        }
        let result = self.call("getUpdates", params).await?;
        Ok(result.as_array().cloned().unwrap_or_default())
    }

    pub async fn set_webhook(
        &self,
        url: &str,
        max_connections: u32,
        allowed_updates: &[&str],
    ) -> anyhow::Result<Value> {
        self.call(
            "setWebhook",
            json!({
                "url": url,
                "max_connections": max_connections,
                "allowed_updates": allowed_updates,
            }),
        )
        .await
    }

    pub async fn get_webhook_info(&self) -> anyhow::Result<Value> {
        self.call("getWebhookInfo", json!({})).await
    }

    /// Release the remote long-poll consumer slot before a new bot starts.
    ///
    /// Telegram allows one getUpdates consumer per token; a stale consumer
    /// produces "Conflict" errors for the next one. The sequence is:
    /// webhook removal (dropping pending updates), queue flush one past the
    /// highest known update id, a defensive sweep over low offsets, then a
    /// settling delay. Every step is best-effort — failures are logged and
    /// the sequence always runs to completion. Returns whether all steps
    /// succeeded.
    pub async fn reset_session(&self) -> bool {
        info!("Resetting Telegram API session");
        let mut all_ok = true;

        match self.delete_webhook(true).await {
            Ok(result) => debug!(?result, "Webhook deleted"),
            Err(e) => {
                warn!("deleteWebhook failed: {}", e);
                all_ok = false;
            }
        }

        match self.get_updates(None, 100).await {
            Ok(updates) => {
                if let Some(last_id) = updates.iter().filter_map(|u| u["update_id"].as_i64()).max()
                {
                    let next_offset = last_id + 1;
                    info!(next_offset, "Flushing update queue");
                    if let Err(e) = self.get_updates(Some(next_offset), 100).await {
                        warn!("Queue flush at offset {} failed: {}", next_offset, e);
                        all_ok = false;
                    }
                }
            }
            Err(e) => {
                warn!("getUpdates failed: {}", e);
                all_ok = false;
            }
        }

        for offset in 1..=self.drain_offset_sweep {
            if let Err(e) = self.get_updates(Some(offset), 100).await {
                debug!(offset, "Defensive offset sweep call failed: {}", e);
                all_ok = false;
            }
        }

        info!(
            cooldown_secs = self.reset_cooldown.as_secs(),
            "Waiting for the Telegram API to settle"
        );
        tokio::time::sleep(self.reset_cooldown).await;

        if all_ok {
            info!("Session reset complete");
        } else {
            warn!("Session reset finished with errors");
        }
        all_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelegramApiConfig;

    fn unreachable_api() -> BotApi {
        // a port nothing listens on: every call fails fast with
        // connection refused
        let config = TelegramApiConfig {
            api_base: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 2,
            session_reset_cooldown_secs: 0,
            drain_offset_sweep: 2,
        };
        BotApi::new("000:test-token", &config).unwrap()
    }

    #[tokio::test]
    async fn reset_session_never_errors_even_when_every_call_fails() {
        let api = unreachable_api();
        // best-effort contract: completes and reports failure
        assert!(!api.reset_session().await);
    }

    #[tokio::test]
    async fn individual_calls_surface_errors() {
        let api = unreachable_api();
        assert!(api.get_me().await.is_err());
        assert!(api.delete_webhook(true).await.is_err());
        assert!(api.get_updates(Some(1), 10).await.is_err());
    }
}
