//! Engine configuration loading and saving.
//!
//! Knobs the monitoring center tunes per installation. Loading falls back to
//! defaults when the file is missing or unreadable; the engine keeps working
//! with stock settings rather than failing startup.

use chrono::Duration;
use fs_err as fs;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::StorageConfig;

fn default_slot_count() -> u32 {
    64
}

fn default_shift_minutes() -> i64 {
    12 * 60
}

fn default_max_work_items() -> usize {
    20
}

/// Operator-tunable engine knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of equal time divisions the shift is split into for reminders.
    #[serde(default = "default_slot_count")]
    pub slot_count: u32,
    /// Shift length in minutes.
    #[serde(default = "default_shift_minutes")]
    pub shift_minutes: i64,
    /// Minimum touched-and-resolved channels required across the round
    /// before it may be finalized.
    #[serde(default)]
    pub minimum_channels_required: u32,
    /// Hard cap on work items per round.
    #[serde(default = "default_max_work_items")]
    pub max_work_items: usize,
    /// When true, pending slot reminders are suspended while the round is
    /// paused and resume with their remaining active-time delay. The default
    /// keeps reminders on wall-clock offsets regardless of pauses.
    #[serde(default)]
    pub defer_slots_while_paused: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            slot_count: default_slot_count(),
            shift_minutes: default_shift_minutes(),
            minimum_channels_required: 0,
            max_work_items: default_max_work_items(),
            defer_slots_while_paused: false,
        }
    }
}

impl EngineConfig {
    pub fn shift_duration(&self) -> Duration {
        Duration::minutes(self.shift_minutes)
    }

    /// Length of one slot. Falls back to the whole shift if `slot_count` is
    /// misconfigured to zero.
    pub fn slot_length(&self) -> Duration {
        if self.slot_count == 0 {
            return self.shift_duration();
        }
        self.shift_duration() / self.slot_count as i32
    }
}

/// Loads the engine configuration, returning defaults if the file doesn't
/// exist or can't be parsed.
pub fn load_engine_config(storage: &StorageConfig) -> EngineConfig {
    let path = storage.config_file();
    match fs::read_to_string(&path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|err| {
            warn!(error = %err, path = %path.display(), "Unreadable engine config, using defaults");
            EngineConfig::default()
        }),
        Err(_) => EngineConfig::default(),
    }
}

/// Saves the engine configuration to disk.
pub fn save_engine_config(storage: &StorageConfig, config: &EngineConfig) -> Result<(), String> {
    let path = storage.config_file();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config dir: {}", e))?;
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(&path, content).map_err(|e| format!("Failed to write config: {}", e))
}
