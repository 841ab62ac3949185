//! Store configuration.
//!
//! Defaults reproduce the fixed constants of the browser client (10s debounce,
//! no per-save timeout). `from_env` layers `PLANWISE_*` overrides on top.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::save::CoalescePolicy;

pub const DEFAULT_DEBOUNCE_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Idle window before queued saves run.
    pub debounce_ms: u64,
    /// What re-scheduling an already queued key does to its position.
    pub coalesce: CoalescePolicy,
    /// Optional cap on a single persistence callback. `None` waits forever.
    pub save_timeout_ms: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            coalesce: CoalescePolicy::default(),
            save_timeout_ms: None,
        }
    }
}

impl StoreConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn save_timeout(&self) -> Option<Duration> {
        self.save_timeout_ms.map(Duration::from_millis)
    }

    /// Defaults plus `PLANWISE_*` environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides_from(|key| std::env::var(key).ok());
        config
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F)
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("PLANWISE_DEBOUNCE_MS") {
            match raw.trim().parse::<u64>() {
                Ok(value) => self.debounce_ms = value,
                Err(err) => tracing::warn!("invalid PLANWISE_DEBOUNCE_MS, ignoring: {err}"),
            }
        }

        if let Some(raw) = lookup("PLANWISE_COALESCE") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "move_to_end" | "move-to-end" => self.coalesce = CoalescePolicy::MoveToEnd,
                "keep_position" | "keep-position" => self.coalesce = CoalescePolicy::KeepPosition,
                _ => tracing::warn!("invalid PLANWISE_COALESCE, ignoring: {raw}"),
            }
        }

        if let Some(raw) = lookup("PLANWISE_SAVE_TIMEOUT_MS") {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed == "0" {
                self.save_timeout_ms = None;
            } else {
                match trimmed.parse::<u64>() {
                    Ok(value) => self.save_timeout_ms = Some(value),
                    Err(err) => tracing::warn!("invalid PLANWISE_SAVE_TIMEOUT_MS, ignoring: {err}"),
                }
            }
        }
    }
}
