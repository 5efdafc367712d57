//! Process-wide tunables that are not per-event data.
//! Constructed explicitly — no implicit global state — with `Default`
//! supplying the fixed policy constants (dedup window, close-finish
//! threshold, dual-slalom grouping window).

use serde::{Deserialize, Serialize};

/// Timing engine tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Window for bib-level punch deduplication, in seconds.
    pub dedup_window_seconds: f64,
    /// Threshold for the `close_finish` highlight, in seconds.
    pub close_finish_threshold_seconds: f64,
    /// Default dual-slalom start-grouping window when an event does not
    /// override it.
    pub default_dual_slalom_window_seconds: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            dedup_window_seconds: 2.0,
            close_finish_threshold_seconds: 2.0,
            default_dual_slalom_window_seconds: 5.0,
        }
    }
}

/// Well-known keys in the persisted settings store.
pub mod settings_keys {
    pub const INGEST_PAUSED: &str = "ingest_paused";
    pub const STANDINGS_FROZEN: &str = "standings_frozen";
    pub const USB_CONNECTED: &str = "usb_connected";
    pub const ADMIN_TOKEN: &str = "admin_token";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = TimingConfig::default();
        assert_eq!(cfg.dedup_window_seconds, 2.0);
        assert_eq!(cfg.close_finish_threshold_seconds, 2.0);
        assert_eq!(cfg.default_dual_slalom_window_seconds, 5.0);
    }
}
