//! Caregiver-facing message rendering.
//!
//! Pure functions: no store access, inputs in, HTML-formatted strings out.
//! Tone matters here — the readers are worried relatives, not operators.

use std::collections::HashMap;

use crate::types::Channel;

/// Tiered daily alert. Level 0 renders to an empty string.
pub fn render_alert(level: i64, date: &str, composite_z: f64, explanation: &str) -> String {
    match level {
        l if l <= 0 => String::new(),
        1 => format!(
            "💛 <b>Heads-up</b> — {date}\n\n\
             Today's activity pattern differs from the usual routine \
             (score: {composite_z:.1}).\n\n\
             {explanation}\n\n\
             ℹ️ Probably nothing to worry about, but it may be worth keeping an eye out."
        ),
        2 => format!(
            "🟠 <b>Important Warning</b> — {date}\n\n\
             A clear activity anomaly was detected (score: {composite_z:.1}).\n\n\
             {explanation}\n\n\
             📞 Please call and check in."
        ),
        _ => format!(
            "🔴 <b>URGENT WARNING</b> — {date}\n\n\
             A serious activity anomaly was detected (score: {composite_z:.1})!\n\n\
             {explanation}\n\n\
             🚨 Get in touch IMMEDIATELY, or ask a neighbour to check."
        ),
    }
}

/// 22:00 daily summary.
pub fn render_daily_summary(
    date: &str,
    composite_z: f64,
    alert_level: i64,
    train_days: i64,
    ci_width: f64,
    event_counts: &HashMap<Channel, i64>,
) -> String {
    let status = match alert_level {
        0 => "✅ Everything looks normal.",
        1 => "💛 A slight deviation was noticed.",
        2 => "🟠 A clear anomaly was detected.",
        _ => "🔴 A serious anomaly was detected!",
    };

    let total_events: i64 = event_counts.values().sum();
    let mut channel_lines = String::new();
    for channel in Channel::ALL {
        if let Some(count) = event_counts.get(&channel) {
            channel_lines.push_str(&format!("  • {}: {count}\n", channel.label()));
        }
    }

    let ci_pct = ci_width * 100.0;
    format!(
        "🏠 <b>Daily Summary</b> — {date}\n\n\
         {status}\n\n\
         📊 Anomaly score: <b>{composite_z:.1}</b>\n\
         📈 Confidence interval: ±{ci_pct:.0}%\n\
         🔢 Total events: {total_events}\n\
         {channel_lines}\
         🧠 Training: day {train_days}"
    )
}

/// Morning silence alert.
pub fn render_morning_silence(check_time: &str) -> String {
    format!(
        "☀️ <b>Morning Check</b>\n\n\
         As of {check_time}, no sensor has reported any movement today.\n\n\
         📞 Please call and check in."
    )
}

/// Extended daytime silence alert.
pub fn render_extended_silence(detail: &str) -> String {
    format!(
        "⏰ <b>Extended Silence</b>\n\n\
         {detail}\n\n\
         📞 Please check in."
    )
}

/// Possible bathroom fall.
pub fn render_fall_suspicion(detail: &str) -> String {
    format!(
        "🚨 <b>FALL SUSPICION</b>\n\n\
         {detail}\n\n\
         📞 Call NOW. If there is no answer, send someone over immediately."
    )
}

/// Escalation wrapper around an unacknowledged emergency message.
pub fn render_escalation(timeout_minutes: i64, original_message: &str) -> String {
    format!(
        "🚨 <b>EMERGENCY ESCALATION</b>\n\n\
         The primary contact has not responded to an emergency alert \
         for {timeout_minutes} minutes!\n\n\
         Original alert:\n{original_message}\n\n\
         Please check on them now!"
    )
}

/// Learning-phase progress notice (day 7).
pub fn render_learning_progress(date: &str, train_days: i64, ci_width: f64, extra: &str) -> String {
    let ci_pct = ci_width * 100.0;
    format!(
        "🧠 <b>Learning Update</b> — {date}\n\n\
         The system is on training day {train_days}. \
         Confidence interval: ±{ci_pct:.0}%\n\n\
         {extra}"
    )
}

/// Learning-phase completion notice (day 14).
pub fn render_learning_complete(confidence: f64) -> String {
    format!(
        "🎉 <b>System Ready!</b>\n\n\
         The 14-day learning period is complete. \
         Confidence level: {confidence:.0}%\n\n\
         You will now be notified automatically about unusual activity."
    )
}
