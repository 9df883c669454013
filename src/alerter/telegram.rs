//! Telegram Bot API backend for the [`Notifier`] seam.
//!
//! An empty bot token disables the backend entirely: every send no-ops and
//! returns `false`, so the rest of the system runs unchanged without a bot.
//! All HTTP calls carry a 10-second timeout and report failure as `false` —
//! the next scheduled run retries implicitly.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info, warn};

use super::notifier::{CallbackQuery, InboundUpdate, Notifier};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_TIMEOUT_SECS: u64 = 5;

/// Telegram notifier. Fans primary sends out to `chat_ids`.
pub struct TelegramNotifier {
    base_url: String,
    chat_ids: Vec<String>,
    enabled: bool,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_ids: Vec<String>) -> Self {
        let enabled = !bot_token.is_empty();
        if !enabled {
            warn!("telegram bot token not configured, notifications disabled");
        }
        Self {
            base_url: format!("{TELEGRAM_API_BASE}/bot{bot_token}"),
            chat_ids,
            enabled,
            client: reqwest::Client::builder()
                .timeout(SEND_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    async fn post_message(&self, payload: Value) -> bool {
        if !self.enabled {
            return false;
        }
        let url = format!("{}/sendMessage", self.base_url);
        match self.client.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                error!(%status, body = %body.chars().take(200).collect::<String>(),
                       "telegram API error");
                false
            }
            Err(err) => {
                error!(error = %err, "telegram connection error");
                false
            }
        }
    }

    fn message_payload(chat_id: &str, text: &str, ack_alert_id: Option<i64>) -> Value {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(alert_id) = ack_alert_id {
            payload["reply_markup"] = json!({
                "inline_keyboard": [[{
                    "text": "✅ I saw it",
                    "callback_data": format!("ack_{alert_id}"),
                }]],
            });
        }
        payload
    }

    /// Parse one raw update into the normalised form. Updates that are
    /// neither a text message nor a callback query are dropped.
    fn parse_update(update: &Value) -> Option<InboundUpdate> {
        let update_id = update.get("update_id")?.as_i64()?;

        if let Some(callback) = update.get("callback_query") {
            let chat_id = callback
                .pointer("/message/chat/id")
                .map(json_id_to_string)?;
            return Some(InboundUpdate {
                update_id,
                chat_id: chat_id.clone(),
                text: None,
                callback: Some(CallbackQuery {
                    id: callback.get("id")?.as_str()?.to_string(),
                    chat_id,
                    data: callback.get("data")?.as_str().unwrap_or_default().to_string(),
                }),
            });
        }

        let message = update.get("message")?;
        let chat_id = message.pointer("/chat/id").map(json_id_to_string)?;
        Some(InboundUpdate {
            update_id,
            chat_id,
            text: message
                .get("text")
                .and_then(Value::as_str)
                .map(str::to_string),
            callback: None,
        })
    }
}

/// Telegram ids arrive as numbers; we key chats by string everywhere.
fn json_id_to_string(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, chat_id: &str, text: &str) -> bool {
        let ok = self.post_message(Self::message_payload(chat_id, text, None)).await;
        if ok {
            info!(chat_id, "telegram message sent");
        }
        ok
    }

    async fn send_with_ack(&self, chat_id: &str, text: &str, alert_id: i64) -> bool {
        let ok = self
            .post_message(Self::message_payload(chat_id, text, Some(alert_id)))
            .await;
        if ok {
            info!(chat_id, alert_id, "telegram ack-message sent");
        }
        ok
    }

    async fn send_to_all(&self, text: &str) -> bool {
        let mut any = false;
        for chat_id in &self.chat_ids {
            any |= self.send(chat_id, text).await;
        }
        any
    }

    async fn send_to_all_with_ack(&self, text: &str, alert_id: i64) -> bool {
        let mut any = false;
        for chat_id in &self.chat_ids {
            any |= self.send_with_ack(chat_id, text, alert_id).await;
        }
        any
    }

    async fn poll_inbound(&self, offset: i64) -> (Vec<InboundUpdate>, i64) {
        if !self.enabled {
            return (Vec::new(), offset);
        }

        let url = format!("{}/getUpdates", self.base_url);
        let mut request = self.client.get(&url).query(&[
            ("timeout", POLL_TIMEOUT_SECS.to_string()),
            (
                "allowed_updates",
                r#"["message","callback_query"]"#.to_string(),
            ),
        ]);
        if offset > 0 {
            request = request.query(&[("offset", offset.to_string())]);
        }

        let body: Value = match request.send().await {
            Ok(response) if response.status().is_success() => {
                match response.json().await {
                    Ok(body) => body,
                    Err(err) => {
                        warn!(error = %err, "getUpdates returned unparseable body");
                        return (Vec::new(), offset);
                    }
                }
            }
            Ok(response) => {
                warn!(status = %response.status(), "getUpdates failed");
                return (Vec::new(), offset);
            }
            Err(err) => {
                error!(error = %err, "getUpdates connection error");
                return (Vec::new(), offset);
            }
        };

        let mut updates = Vec::new();
        let mut next_offset = offset;
        if let Some(raw_updates) = body.get("result").and_then(Value::as_array) {
            for raw in raw_updates {
                if let Some(update_id) = raw.get("update_id").and_then(Value::as_i64) {
                    next_offset = next_offset.max(update_id + 1);
                }
                if let Some(update) = Self::parse_update(raw) {
                    updates.push(update);
                }
            }
        }
        (updates, next_offset)
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let url = format!("{}/answerCallbackQuery", self.base_url);
        let payload = json!({ "callback_query_id": callback_id, "text": text });
        match self.client.post(&url).json(&payload).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                error!(error = %err, "answerCallbackQuery connection error");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_notifier_noops_every_send() {
        let notifier = TelegramNotifier::new("", vec!["111".to_string()]);
        assert!(!notifier.enabled());
        assert!(!notifier.send("111", "hello").await);
        assert!(!notifier.send_to_all("hello").await);
        assert!(!notifier.send_with_ack("111", "hello", 1).await);
        let (updates, offset) = notifier.poll_inbound(5).await;
        assert!(updates.is_empty());
        assert_eq!(offset, 5);
    }

    #[test]
    fn ack_payload_carries_the_inline_keyboard() {
        let payload = TelegramNotifier::message_payload("111", "check in please", Some(42));
        let button = payload
            .pointer("/reply_markup/inline_keyboard/0/0")
            .expect("button present");
        assert_eq!(button["callback_data"], "ack_42");
        assert!(button["text"].as_str().map_or(false, |t| t.contains("I saw it")));

        let plain = TelegramNotifier::message_payload("111", "hello", None);
        assert!(plain.get("reply_markup").is_none());
    }

    #[test]
    fn parse_update_handles_messages_and_callbacks() {
        let message = json!({
            "update_id": 10,
            "message": { "chat": { "id": 111 }, "text": "/status" }
        });
        let parsed = TelegramNotifier::parse_update(&message).expect("message parses");
        assert_eq!(parsed.update_id, 10);
        assert_eq!(parsed.chat_id, "111");
        assert_eq!(parsed.text.as_deref(), Some("/status"));
        assert!(parsed.callback.is_none());

        let callback = json!({
            "update_id": 11,
            "callback_query": {
                "id": "cb_9",
                "data": "ack_3",
                "message": { "chat": { "id": 999 } }
            }
        });
        let parsed = TelegramNotifier::parse_update(&callback).expect("callback parses");
        let cb = parsed.callback.expect("callback present");
        assert_eq!(cb.data, "ack_3");
        assert_eq!(cb.chat_id, "999");

        let junk = json!({ "update_id": 12 });
        assert!(TelegramNotifier::parse_update(&junk).is_none());
    }
}
