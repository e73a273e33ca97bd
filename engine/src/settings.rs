//! Engine configuration.

use crate::{error::Result, Error, Quantity, RetryPolicy, SessionId};
use serde::{Deserialize, Serialize};

/// Longest delay any engine timer may be configured with: one day.
pub const MAX_DELAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Upper bound on write attempts per batch.
pub const MAX_ATTEMPTS: u32 = 20;

/// Timer lengths used by the engine, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timing {
    /// Quiet period after the last scan before a delta is written
    pub debounce_ms: u64,
    /// Delay between a confirmed write and clearing the optimistic counter
    pub confirm_delay_ms: u64,
    /// Window in which a repeated attach of the same code is ignored
    pub attach_guard_ms: u64,
    /// Vibration length for an accepted scan
    pub haptic_ms: u64,
    /// Display time of a scan toast
    pub toast_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            debounce_ms: 350,
            confirm_delay_ms: 1500,
            attach_guard_ms: 1000,
            haptic_ms: 50,
            toast_ms: 2000,
        }
    }
}

/// Per-session scanning behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSettings {
    /// Counting session that scopes lookups and writes
    pub count_id: SessionId,
    /// Assign the first scanned code to a selected item without a barcode
    pub attach_first_scan: bool,
    /// Look the scanned code up across the session instead of only the
    /// selected item
    pub auto_select_by_barcode: bool,
    /// Switch to a looked-up item immediately instead of offering it
    pub auto_switch_on_match: bool,
    /// Units credited per accepted scan
    pub qty_per_scan: Quantity,
    /// Minimum interval between accepted repeats of the same code
    pub dedupe_ms: u64,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl ScanSettings {
    /// Settings for `count_id` with the defaults used by the mobile scan mode.
    pub fn new(count_id: impl Into<SessionId>) -> Self {
        Self {
            count_id: count_id.into(),
            attach_first_scan: true,
            auto_select_by_barcode: true,
            auto_switch_on_match: true,
            qty_per_scan: 1,
            dedupe_ms: 600,
            timing: Timing::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_attach_first_scan(mut self, enabled: bool) -> Self {
        self.attach_first_scan = enabled;
        self
    }

    pub fn with_auto_select(mut self, enabled: bool) -> Self {
        self.auto_select_by_barcode = enabled;
        self
    }

    pub fn with_auto_switch(mut self, enabled: bool) -> Self {
        self.auto_switch_on_match = enabled;
        self
    }

    pub fn with_qty_per_scan(mut self, qty: Quantity) -> Self {
        self.qty_per_scan = qty;
        self
    }

    pub fn with_dedupe_ms(mut self, window_ms: u64) -> Self {
        self.dedupe_ms = window_ms;
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<()> {
        if self.count_id.trim().is_empty() {
            return Err(Error::InvalidSettings("count_id must not be empty".into()));
        }
        if self.qty_per_scan <= 0 {
            return Err(Error::InvalidSettings(format!(
                "qty_per_scan must be positive, got {}",
                self.qty_per_scan
            )));
        }
        if self.retry.max_attempts == 0 || self.retry.max_attempts > MAX_ATTEMPTS {
            return Err(Error::InvalidSettings(format!(
                "retry.max_attempts must be between 1 and {MAX_ATTEMPTS}, got {}",
                self.retry.max_attempts
            )));
        }

        let delays = [
            ("dedupe_ms", self.dedupe_ms),
            ("timing.debounce_ms", self.timing.debounce_ms),
            ("timing.confirm_delay_ms", self.timing.confirm_delay_ms),
            ("timing.attach_guard_ms", self.timing.attach_guard_ms),
            ("retry backoff", self.retry.total_backoff()),
        ];
        for (name, ms) in delays {
            if ms > MAX_DELAY_MS {
                return Err(Error::InvalidSettings(format!(
                    "{name} must be at most {MAX_DELAY_MS} ms, got {ms}"
                )));
            }
        }
        Ok(())
    }
}
