//! Inputs to and outputs from the engine.
//!
//! Callers feed [`ScanEvent`]s in and execute the [`Command`]s that come back.
//! Commands that perform a write carry a [`RequestId`]; the caller reports the
//! outcome through `ScanEngine::complete` with the same id.

use crate::{Feedback, ItemId, Quantity, RequestId, SessionId};
use serde::{Deserialize, Serialize};

/// A user or scanner event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ScanEvent {
    /// The user picked an item to count.
    ItemSelected { item_id: ItemId },
    /// The scanner produced a code.
    ScanDetected { code: String },
    /// The user typed an absolute quantity for the selected item.
    SetQty { qty: Quantity },
}

impl ScanEvent {
    pub fn item_selected(item_id: impl Into<ItemId>) -> Self {
        ScanEvent::ItemSelected {
            item_id: item_id.into(),
        }
    }

    pub fn scan_detected(code: impl Into<String>) -> Self {
        ScanEvent::ScanDetected { code: code.into() }
    }

    pub fn set_qty(qty: Quantity) -> Self {
        ScanEvent::SetQty { qty }
    }

    /// Get the event name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanEvent::ItemSelected { .. } => "ITEM_SELECTED",
            ScanEvent::ScanDetected { .. } => "SCAN_DETECTED",
            ScanEvent::SetQty { .. } => "SET_QTY",
        }
    }
}

/// Connectivity as reported by the surrounding environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkHealth {
    #[default]
    Online,
    Degraded,
    Offline,
}

/// A side effect the caller must carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store `code` as the barcode of `item_id`.
    AssignBarcode {
        request: RequestId,
        item_id: ItemId,
        code: String,
    },
    /// Add `delta` to the counted quantity of `item_id`.
    ///
    /// Every attempt of the same batch carries the same `request`, so a
    /// backend may use it as an idempotency key.
    ApplyDelta {
        request: RequestId,
        attempt: u32,
        session_id: SessionId,
        item_id: ItemId,
        delta: Quantity,
    },
    /// Overwrite the counted quantity of `item_id`.
    SetAbsolute {
        request: RequestId,
        session_id: SessionId,
        item_id: ItemId,
        quantity: Quantity,
    },
    /// Show a toast.
    Notify(Feedback),
    /// Trigger haptic feedback.
    Vibrate { millis: u64 },
}

impl Command {
    /// Get the request id of a write command.
    pub fn request(&self) -> Option<RequestId> {
        match self {
            Command::AssignBarcode { request, .. }
            | Command::ApplyDelta { request, .. }
            | Command::SetAbsolute { request, .. } => Some(*request),
            Command::Notify(_) | Command::Vibrate { .. } => None,
        }
    }

    /// Check if the command talks to the backend.
    pub fn is_write(&self) -> bool {
        self.request().is_some()
    }

    /// Get the feedback carried by a `Notify` command.
    pub fn feedback(&self) -> Option<&Feedback> {
        match self {
            Command::Notify(feedback) => Some(feedback),
            _ => None,
        }
    }
}
