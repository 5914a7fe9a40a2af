//! Telegram notification transport.
//!
//! All sends are best-effort: transport failures and API rejections are
//! logged and swallowed so notification trouble can never stall the watch
//! loop. With several chat ids configured, each is delivered independently —
//! one failing recipient does not block the rest.

use serde::Deserialize;
use tracing::{info, warn};

use crate::core::config::TelegramConfig;
use crate::core::types::Contest;

#[derive(Debug, Deserialize)]
struct ApiStatus {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    bot_token: Option<String>,
    chat_ids: Vec<String>,
    api_base: String,
}

impl Notifier {
    pub fn new(client: reqwest::Client, config: &TelegramConfig) -> Self {
        Self {
            client,
            bot_token: config.bot_token.clone(),
            chat_ids: config.chat_ids.clone(),
            api_base: config.api_base.clone(),
        }
    }

    /// Deliver `text` to every configured chat independently.
    pub async fn send(&self, text: &str, markdown: bool) {
        let Some(token) = &self.bot_token else {
            warn!("telegram not configured: TELEGRAM_BOT_TOKEN missing");
            return;
        };
        if self.chat_ids.is_empty() {
            warn!("telegram not configured: no chat ids");
            return;
        }

        let url = format!("{}/bot{}/sendMessage", self.api_base, token);
        for chat_id in &self.chat_ids {
            let mut body = serde_json::json!({ "chat_id": chat_id, "text": text });
            if markdown {
                body["parse_mode"] = serde_json::Value::String("Markdown".into());
            }

            match self.client.post(&url).json(&body).send().await {
                Ok(res) => match res.json::<ApiStatus>().await {
                    Ok(api) if !api.ok => warn!(
                        "sendMessage rejected for chat {}: {}",
                        chat_id,
                        api.description.as_deref().unwrap_or("no description")
                    ),
                    Ok(_) => {}
                    Err(e) => warn!("sendMessage response unreadable for chat {}: {}", chat_id, e),
                },
                Err(e) => warn!("sendMessage transport error for chat {}: {}", chat_id, e),
            }
        }
    }

    pub async fn notify_started(&self) {
        self.send("*Watcher restarted*", true).await;
    }

    pub async fn notify_stopped(&self) {
        self.send("*Watcher stopped*", true).await;
    }

    pub async fn notify_new_contests(&self, fresh: &[Contest]) {
        if fresh.is_empty() {
            return;
        }
        for c in fresh {
            info!(
                "  [{}] {} {} vs {} ({}) -> {}",
                c.id, c.match_type, c.team_left, c.team_right, c.time_left, c.href
            );
        }
        self.send(&format_new_contests(fresh), true).await;
    }

    /// Error reports go out without markdown so arbitrary error text cannot
    /// break the message parse.
    pub async fn notify_error(&self, context: &str, err: &dyn std::fmt::Display) {
        self.send(&format_error_report(context, err), false).await;
    }
}

pub(crate) fn format_new_contests(fresh: &[Contest]) -> String {
    let lines: Vec<String> = fresh
        .iter()
        .map(|c| {
            format!(
                "• *{}* {} vs {} [#{}]",
                c.match_type, c.team_left, c.team_right, c.id
            )
        })
        .collect();
    format!("*New contests detected:*\n\n{}", lines.join("\n\n"))
}

pub(crate) fn format_error_report(context: &str, err: &dyn std::fmt::Display) -> String {
    format!("matchwatch — ERROR\n\nContext: {context}\nMessage: {err}")
}
