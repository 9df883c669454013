//! Shared domain types for the monitoring pipeline.
//!
//! The day is divided into 96 fifteen-minute slots (0 = 00:00-00:15,
//! 95 = 23:45-00:00). Every sensor is mapped to one of four semantic
//! channels; the model learns one Beta posterior per (slot, channel) cell.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Number of 15-minute slots in a local day.
pub const SLOTS_PER_DAY: usize = 96;

/// Slot width in minutes.
pub const SLOT_MINUTES: u32 = 15;

/// Timestamp format used throughout the store (ISO-8601, local wall clock).
pub const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Date format used for `daily_scores` / `slot_summary` keys.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Channels
// ============================================================================

/// Semantic sensor class. A channel groups devices by meaning, not by id:
/// two motion sensors in different rooms both feed `Presence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Motion / presence detectors
    Presence,
    /// Fridge door contact
    Fridge,
    /// Bathroom motion or door contact
    Bathroom,
    /// Entrance door contact
    Door,
}

impl Channel {
    /// All channels, in the fixed column order of `daily_scores`.
    pub const ALL: [Channel; 4] = [
        Channel::Presence,
        Channel::Fridge,
        Channel::Bathroom,
        Channel::Door,
    ];

    /// Number of channels.
    pub const COUNT: usize = 4;

    /// Stable storage name (matches `slot_summary.channel` values).
    pub const fn as_str(self) -> &'static str {
        match self {
            Channel::Presence => "presence",
            Channel::Fridge => "fridge",
            Channel::Bathroom => "bathroom",
            Channel::Door => "door",
        }
    }

    /// Human-readable label used in caregiver-facing messages.
    pub const fn label(self) -> &'static str {
        match self {
            Channel::Presence => "Motion sensor",
            Channel::Fridge => "Fridge",
            Channel::Bathroom => "Bathroom",
            Channel::Door => "Front door",
        }
    }

    /// Dense index for per-channel arrays (same order as [`Channel::ALL`]).
    pub const fn index(self) -> usize {
        match self {
            Channel::Presence => 0,
            Channel::Fridge => 1,
            Channel::Bathroom => 2,
            Channel::Door => 3,
        }
    }

    /// Parse a storage name back into a channel.
    pub fn parse(s: &str) -> Option<Channel> {
        match s {
            "presence" => Some(Channel::Presence),
            "fridge" => Some(Channel::Fridge),
            "bathroom" => Some(Channel::Bathroom),
            "door" => Some(Channel::Door),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Sensor Events
// ============================================================================

/// An accepted, debounced sensor transition. Written by the ingestion side,
/// read-only for the detection pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorEvent {
    /// Local wall-clock time of the transition
    pub timestamp: NaiveDateTime,
    /// Device identifier as configured (e.g. "motion_livingroom")
    pub sensor_id: String,
    /// Semantic channel the device maps to
    pub channel: Channel,
    /// Event kind, normally `state_change`
    pub event_type: String,
    /// Raw trigger value, if the device reports one
    pub value: Option<String>,
}

impl SensorEvent {
    /// Convenience constructor for a plain state-change event.
    pub fn state_change(timestamp: NaiveDateTime, sensor_id: &str, channel: Channel) -> Self {
        Self {
            timestamp,
            sensor_id: sensor_id.to_string(),
            channel,
            event_type: "state_change".to_string(),
            value: None,
        }
    }
}

// ============================================================================
// Slot Grid
// ============================================================================

/// One completed day's occupancy bits: for every (channel, slot) cell,
/// whether at least one event fell into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotGrid {
    bits: [[u8; SLOTS_PER_DAY]; Channel::COUNT],
}

impl Default for SlotGrid {
    fn default() -> Self {
        Self::empty()
    }
}

impl SlotGrid {
    /// All-zero grid (no activity anywhere).
    pub const fn empty() -> Self {
        Self {
            bits: [[0; SLOTS_PER_DAY]; Channel::COUNT],
        }
    }

    /// Active bit for a cell (0 or 1).
    pub fn get(&self, channel: Channel, slot: usize) -> u8 {
        self.bits[channel.index()][slot]
    }

    /// Set a cell's active bit. Slots outside 0..96 are ignored.
    pub fn set(&mut self, channel: Channel, slot: usize, active: bool) {
        if slot < SLOTS_PER_DAY {
            self.bits[channel.index()][slot] = u8::from(active);
        }
    }

    /// Total number of active cells across all channels.
    pub fn active_count(&self) -> i64 {
        self.bits
            .iter()
            .flat_map(|row| row.iter())
            .map(|&b| i64::from(b))
            .sum()
    }
}

/// Slot number (0-95) for a local wall-clock time.
pub fn slot_of(ts: NaiveDateTime) -> usize {
    (ts.hour() * 4 + ts.minute() / SLOT_MINUTES) as usize
}

// ============================================================================
// Real-time Alerts
// ============================================================================

/// Kind of real-time check that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// No activity at all by the morning check hour
    MorningSilence,
    /// No activity for several hours inside the awake window
    ExtendedSilence,
    /// Bathroom entered, no exit movement for too long
    FallSuspicion,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::MorningSilence => write!(f, "morning_silence"),
            AlertKind::ExtendedSilence => write!(f, "extended_silence"),
            AlertKind::FallSuspicion => write!(f, "fall_suspicion"),
        }
    }
}

/// Result of a real-time check. At most one per check per invocation.
#[derive(Debug, Clone)]
pub struct RealtimeAlert {
    /// Which check fired
    pub kind: AlertKind,
    /// Alert tier, 1-3
    pub level: u8,
    /// Pre-rendered human-readable body
    pub message: String,
    /// Last observed event time, where relevant
    pub last_event_time: Option<NaiveDateTime>,
}
