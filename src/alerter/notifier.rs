//! Notifier seam — the capability set the alert manager needs from any
//! messenger backend.
//!
//! Production uses [`super::telegram::TelegramNotifier`]; tests and dry-run
//! deployments use [`RecordingNotifier`]. Nothing above this trait knows
//! which one it is talking to.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Inline-button callback carried by an inbound update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackQuery {
    /// Messenger-side callback id (needed to clear the button's spinner)
    pub id: String,
    /// Chat the button was pressed in
    pub chat_id: String,
    /// Callback payload, e.g. `ack_42`
    pub data: String,
}

/// One inbound update, already normalised from the wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundUpdate {
    pub update_id: i64,
    pub chat_id: String,
    /// Plain text message, if this update is one
    pub text: Option<String>,
    /// Callback query, if this update is one
    pub callback: Option<CallbackQuery>,
}

/// Outbound messaging capabilities. All sends return a plain success flag;
/// transport failures are logged by the implementation and never propagate
/// across job boundaries.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Whether the backend is configured at all. A disabled notifier
    /// no-ops and returns `false` from every send.
    fn enabled(&self) -> bool;

    /// Send to a single chat.
    async fn send(&self, chat_id: &str, text: &str) -> bool;

    /// Send to a single chat with an acknowledgement button whose callback
    /// payload is `ack_<alert_id>`.
    async fn send_with_ack(&self, chat_id: &str, text: &str, alert_id: i64) -> bool;

    /// Send to every primary chat. True when at least one send succeeded.
    async fn send_to_all(&self, text: &str) -> bool;

    /// Send to every primary chat with the acknowledgement button.
    async fn send_to_all_with_ack(&self, text: &str, alert_id: i64) -> bool;

    /// Fetch inbound updates past `offset`. Returns the updates and the next
    /// offset to poll from (unchanged when nothing arrived).
    async fn poll_inbound(&self, offset: i64) -> (Vec<InboundUpdate>, i64);

    /// Answer a callback query so the sender's UI stops spinning.
    async fn answer_callback(&self, callback_id: &str, text: &str) -> bool;
}

// ============================================================================
// Recording fake
// ============================================================================

/// Everything a [`RecordingNotifier`] "sent".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: String,
    pub text: String,
    /// Set when the message carried an acknowledgement button
    pub ack_alert_id: Option<i64>,
}

/// In-memory notifier for tests and dry-run deployments. Records every send
/// and replays queued inbound updates.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    chat_ids: Vec<String>,
    sent: Mutex<Vec<SentMessage>>,
    inbound: Mutex<VecDeque<InboundUpdate>>,
    answered: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new(chat_ids: Vec<String>) -> Self {
        Self {
            chat_ids,
            ..Self::default()
        }
    }

    /// Queue an inbound update for the next `poll_inbound`.
    pub fn push_inbound(&self, update: InboundUpdate) {
        lock_ignoring_poison(&self.inbound).push_back(update);
    }

    /// Snapshot of everything sent so far.
    pub fn sent(&self) -> Vec<SentMessage> {
        lock_ignoring_poison(&self.sent).clone()
    }

    /// Snapshot of answered callbacks (callback id, reply text).
    pub fn answered(&self) -> Vec<(String, String)> {
        lock_ignoring_poison(&self.answered).clone()
    }

    fn record(&self, chat_id: &str, text: &str, ack_alert_id: Option<i64>) {
        lock_ignoring_poison(&self.sent).push(SentMessage {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            ack_alert_id,
        });
    }
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn enabled(&self) -> bool {
        true
    }

    async fn send(&self, chat_id: &str, text: &str) -> bool {
        self.record(chat_id, text, None);
        true
    }

    async fn send_with_ack(&self, chat_id: &str, text: &str, alert_id: i64) -> bool {
        self.record(chat_id, text, Some(alert_id));
        true
    }

    async fn send_to_all(&self, text: &str) -> bool {
        for chat_id in &self.chat_ids {
            self.record(chat_id, text, None);
        }
        !self.chat_ids.is_empty()
    }

    async fn send_to_all_with_ack(&self, text: &str, alert_id: i64) -> bool {
        for chat_id in &self.chat_ids {
            self.record(chat_id, text, Some(alert_id));
        }
        !self.chat_ids.is_empty()
    }

    async fn poll_inbound(&self, offset: i64) -> (Vec<InboundUpdate>, i64) {
        let mut queue = lock_ignoring_poison(&self.inbound);
        let updates: Vec<InboundUpdate> = queue.drain(..).filter(|u| u.update_id >= offset).collect();
        let next_offset = updates
            .iter()
            .map(|u| u.update_id + 1)
            .max()
            .unwrap_or(offset);
        (updates, next_offset)
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> bool {
        lock_ignoring_poison(&self.answered).push((callback_id.to_string(), text.to_string()));
        true
    }
}
