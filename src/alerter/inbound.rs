//! Inbound message processing — acknowledgement callbacks and caregiver
//! commands.
//!
//! Polls the messenger with the persisted `telegram_last_offset` cursor so a
//! restart never replays or drops updates. Only chats in the configured
//! primary list may acknowledge alerts or issue commands; strangers get a
//! polite reply (to clear their button spinner) and nothing else.

use tracing::{info, warn};

use super::notifier::{CallbackQuery, InboundUpdate, Notifier};
use crate::config::AppConfig;
use crate::store::{keys, Store, StoreError};
use crate::types::{Channel, DATE_FORMAT};
use chrono::NaiveDateTime;

/// Callback payload prefix for acknowledgement buttons.
const ACK_PREFIX: &str = "ack_";

/// Poll the messenger once and process everything that arrived.
pub async fn process_inbound(
    notifier: &dyn Notifier,
    store: &Store,
    config: &AppConfig,
    now: NaiveDateTime,
) -> Result<(), StoreError> {
    if !notifier.enabled() {
        return Ok(());
    }

    let offset = store
        .state(keys::TELEGRAM_LAST_OFFSET)?
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or(0);

    let (updates, new_offset) = notifier.poll_inbound(offset).await;
    if updates.is_empty() && new_offset == offset {
        return Ok(());
    }

    for update in &updates {
        if let Some(callback) = &update.callback {
            handle_callback(notifier, store, config, callback).await?;
        } else if let Some(text) = &update.text {
            handle_command(notifier, store, config, &update.chat_id, text, now).await?;
        }
    }

    if new_offset != offset {
        store.set_state(keys::TELEGRAM_LAST_OFFSET, &new_offset.to_string())?;
    }
    Ok(())
}

/// Acknowledgement button handling. Unauthorised chats still get an answer
/// so their client stops spinning, but the alert stays untouched.
async fn handle_callback(
    notifier: &dyn Notifier,
    store: &Store,
    config: &AppConfig,
    callback: &CallbackQuery,
) -> Result<(), StoreError> {
    let Some(raw_id) = callback.data.strip_prefix(ACK_PREFIX) else {
        notifier.answer_callback(&callback.id, "Understood").await;
        return Ok(());
    };
    let Ok(alert_id) = raw_id.parse::<i64>() else {
        notifier.answer_callback(&callback.id, "Understood").await;
        return Ok(());
    };

    if !config.messenger.chat_ids.contains(&callback.chat_id) {
        warn!(chat_id = %callback.chat_id, "ack from unauthorised chat ignored");
        notifier.answer_callback(&callback.id, "Understood").await;
        return Ok(());
    }

    if store.acknowledge_alert(alert_id)? {
        info!(alert_id, chat_id = %callback.chat_id, "alert acknowledged");
        notifier
            .answer_callback(&callback.id, "Acknowledged — thank you! ✅")
            .await;
    } else {
        // Already acknowledged or escalated; still clear the spinner.
        notifier.answer_callback(&callback.id, "Already handled").await;
    }
    Ok(())
}

/// Slash-command handling for authorised chats.
async fn handle_command(
    notifier: &dyn Notifier,
    store: &Store,
    config: &AppConfig,
    chat_id: &str,
    text: &str,
    now: NaiveDateTime,
) -> Result<(), StoreError> {
    if !config.messenger.chat_ids.contains(&chat_id.to_string()) {
        warn!(chat_id, "command from unknown chat ignored");
        return Ok(());
    }
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return Ok(());
    }

    // "/status@carewatch_bot" is still "/status".
    let command = trimmed
        .split_whitespace()
        .next()
        .unwrap_or("")
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    match command.as_str() {
        "/help" | "/start" => {
            notifier
                .send(
                    chat_id,
                    "🏠 <b>CAREWATCH — Commands</b>\n\n\
                     /status — system status\n\
                     /today — today's event counts\n\
                     /vacation — enable vacation mode\n\
                     /home — disable vacation mode\n\
                     /help — this message",
                )
                .await;
        }
        "/status" => {
            let vacation = store.vacation_mode(config.system.vacation_mode)?;
            let latest = store.latest_score()?;
            let (train_days, is_learning) = latest
                .map(|row| (row.train_days, row.is_learning))
                .unwrap_or((0, true));
            let midnight = now.date().and_hms_opt(0, 0, 0).unwrap_or(now);
            let last_event = store
                .last_event_since(midnight - chrono::Duration::days(7))?
                .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "none".to_string());

            notifier
                .send(
                    chat_id,
                    &format!(
                        "📊 <b>System Status</b>\n\n\
                         Vacation mode: {}\n\
                         Training day: {train_days}\n\
                         Phase: {}\n\
                         Last event: {last_event}",
                        if vacation { "ON" } else { "OFF" },
                        if is_learning { "learning" } else { "active" },
                    ),
                )
                .await;
        }
        "/today" => {
            let midnight = now.date().and_hms_opt(0, 0, 0).unwrap_or(now);
            let counts = store.channel_counts_between(midnight, now)?;
            if counts.is_empty() {
                notifier.send(chat_id, "No events recorded yet today.").await;
            } else {
                let mut lines = vec![format!(
                    "📋 <b>Today's Events</b> — {}\n",
                    now.date().format(DATE_FORMAT)
                )];
                let mut total = 0;
                for channel in Channel::ALL {
                    if let Some(count) = counts.get(&channel) {
                        lines.push(format!("  {}: {count}", channel.label()));
                        total += count;
                    }
                }
                lines.push(format!("\nTotal: {total}"));
                notifier.send(chat_id, &lines.join("\n")).await;
            }
        }
        "/vacation" => {
            store.set_vacation_mode(true)?;
            notifier
                .send(
                    chat_id,
                    "Vacation mode is <b>on</b>.\n\
                     Alerts are paused. Send /home when they are back.",
                )
                .await;
            info!(chat_id, "vacation mode enabled");
        }
        "/home" => {
            store.set_vacation_mode(false)?;
            notifier
                .send(
                    chat_id,
                    "Vacation mode is <b>off</b>.\nNormal monitoring has resumed.",
                )
                .await;
            info!(chat_id, "vacation mode disabled");
        }
        _ => {}
    }
    Ok(())
}
