//! Alerting — notification decisions, message rendering, messenger backends.
//!
//! The manager owns `pending_alerts` and the `alert_rate_state` key. It
//! talks to the outside world exclusively through the [`Notifier`] seam.

pub mod inbound;
pub mod manager;
pub mod notifier;
pub mod telegram;
pub mod templates;

pub use inbound::process_inbound;
pub use manager::AlertManager;
pub use notifier::{InboundUpdate, Notifier, RecordingNotifier, SentMessage};
pub use telegram::TelegramNotifier;
