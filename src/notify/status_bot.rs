//! Operator status responder.
//!
//! An independent long-poll loop against the Telegram `getUpdates` API. It
//! shares nothing with the watch loop except the read-only
//! [`StatusTracker`] handle — in particular it never touches the browsing
//! session. Any iteration failure is logged, backed off, and retried; the
//! loop itself never exits unless the bot is unconfigured.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::core::config::TelegramConfig;
use crate::features::status::{format_report, StatusTracker};

const LONG_POLL_SECS: u64 = 30;
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    text: Option<String>,
    chat: Chat,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

/// `status` / `/status`, case-insensitive, surrounding whitespace ignored.
pub fn is_status_command(text: &str) -> bool {
    matches!(
        text.trim().to_lowercase().as_str(),
        "status" | "/status"
    )
}

/// Run the long-poll loop until process shutdown.
pub async fn run(config: TelegramConfig, status: Arc<StatusTracker>) {
    let Some(token) = &config.bot_token else {
        info!("status bot disabled: TELEGRAM_BOT_TOKEN missing");
        return;
    };
    if config.chat_ids.is_empty() {
        info!("status bot disabled: no allowed chat ids");
        return;
    }

    // Own client with headroom over the long-poll window; the notifier's
    // short-timeout client would abort every poll.
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(LONG_POLL_SECS + 10))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            error!("status bot: failed to build http client: {}", e);
            return;
        }
    };

    let base = format!("{}/bot{}", config.api_base, token);
    let mut offset: Option<i64> = None;

    info!("status bot: starting long-poll loop");
    loop {
        if let Err(e) = poll_once(&client, &base, &config.chat_ids, &status, &mut offset).await {
            warn!("status bot iteration failed: {}", e);
            tokio::time::sleep(ERROR_BACKOFF).await;
        }
    }
}

async fn poll_once(
    client: &reqwest::Client,
    base: &str,
    allowed: &[String],
    status: &StatusTracker,
    offset: &mut Option<i64>,
) -> Result<()> {
    let mut body = serde_json::json!({
        "timeout": LONG_POLL_SECS,
        "allowed_updates": ["message"],
    });
    if let Some(o) = *offset {
        body["offset"] = serde_json::json!(o + 1);
    }

    let data: UpdatesResponse = client
        .post(format!("{base}/getUpdates"))
        .json(&body)
        .send()
        .await?
        .json()
        .await?;

    if !data.ok {
        return Err(anyhow!("getUpdates returned ok=false"));
    }

    for update in data.result {
        *offset = Some(update.update_id);

        let Some(message) = update.message else { continue };
        let Some(text) = message.text else { continue };

        let chat_id = message.chat.id.to_string();
        if !allowed.iter().any(|id| id == &chat_id) {
            continue;
        }
        if !is_status_command(&text) {
            continue;
        }

        let reply = format_report(&status.snapshot());
        let send = client
            .post(format!("{base}/sendMessage"))
            .json(&serde_json::json!({ "chat_id": chat_id, "text": reply }))
            .send()
            .await;
        match send {
            Ok(res) if !res.status().is_success() => {
                warn!("status reply rejected for chat {}: {}", chat_id, res.status())
            }
            Ok(_) => {}
            Err(e) => warn!("status reply failed for chat {}: {}", chat_id, e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_command_variants() {
        assert!(is_status_command("status"));
        assert!(is_status_command("/status"));
        assert!(is_status_command("  STATUS \n"));
        assert!(is_status_command("/Status"));

        assert!(!is_status_command("status?"));
        assert!(!is_status_command("/start"));
        assert!(!is_status_command(""));
    }

    #[test]
    fn test_updates_payload_parses() {
        let raw = serde_json::json!({
            "ok": true,
            "result": [
                {
                    "update_id": 900100,
                    "message": {
                        "message_id": 5,
                        "text": "/status",
                        "chat": { "id": 77001, "type": "private" }
                    }
                },
                { "update_id": 900101 }
            ]
        });
        let parsed: UpdatesResponse = serde_json::from_value(raw).unwrap();
        assert!(parsed.ok);
        assert_eq!(parsed.result.len(), 2);
        assert_eq!(parsed.result[0].update_id, 900100);
        assert_eq!(
            parsed.result[0].message.as_ref().unwrap().chat.id,
            77001
        );
        assert!(parsed.result[1].message.is_none());
    }
}
