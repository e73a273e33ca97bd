//! Serializable view of the engine state.
//!
//! Snapshots are what a UI renders from. They are read-only; the engine is
//! not restored from them.

use crate::{ItemId, NetworkHealth, PendingFlush, Quantity, SessionId, Timestamp};
use serde::{Deserialize, Serialize};

/// A point-in-time copy of the engine state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub count_id: SessionId,
    pub current_item_id: Option<ItemId>,
    /// Last code that passed the dedup filter
    pub last_code: Option<String>,
    pub last_scan_time: Option<Timestamp>,
    /// Optimistic delta of the selected item
    pub session_increments: Quantity,
    /// Last-known-good delta, restored when a write fails
    pub backup_increments: Quantity,
    /// Part of `session_increments` no write has covered yet
    pub unsent_increments: Quantity,
    /// Stored quantity plus the optimistic delta
    pub displayed_total: Option<Quantity>,
    pub is_processing: bool,
    pub is_persisting: bool,
    pub network_health: NetworkHealth,
    pub pending_flushes: Vec<PendingFlush>,
}

impl EngineSnapshot {
    /// Check if any delta is still waiting to be written.
    pub fn has_unsaved(&self) -> bool {
        self.is_persisting
            || self.unsent_increments > 0
            || self.pending_flushes.iter().any(|p| p.delta > 0)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
