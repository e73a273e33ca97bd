//! User-facing feedback produced by the engine.
//!
//! Every message the engine can show is built here so wording stays in one
//! place and tests can match on titles.

use crate::{ItemId, Quantity, WriteError, WriteErrorKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Something the user can act on from a toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FeedbackAction {
    /// Dispatching `ItemSelected` for this item switches to it
    OfferSwitch { item_id: ItemId },
}

/// A toast or alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub severity: Severity,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<FeedbackAction>,
}

impl Feedback {
    fn new(severity: Severity, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            description: description.into(),
            duration_ms: None,
            action: None,
        }
    }

    fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn scanned(qty: Quantity, item_name: &str, in_stock: Quantity, duration_ms: u64) -> Self {
        Self::new(
            Severity::Success,
            format!("+{qty} scanned"),
            format!("{item_name} • In-Stock: {in_stock}"),
        )
        .with_duration(duration_ms)
    }

    pub fn switched(item_name: &str, qty: Quantity, duration_ms: u64) -> Self {
        Self::new(
            Severity::Success,
            format!("Switched to {item_name}"),
            format!("+{qty} scanned"),
        )
        .with_duration(duration_ms)
    }

    pub fn offer_switch(item_id: &str, item_name: &str) -> Self {
        let mut feedback = Self::new(
            Severity::Info,
            format!("Scanned {item_name}"),
            "Tap to switch to this item",
        );
        feedback.action = Some(FeedbackAction::OfferSwitch {
            item_id: item_id.to_string(),
        });
        feedback
    }

    pub fn no_item_selected() -> Self {
        Self::new(
            Severity::Error,
            "No item selected",
            "Please select an item first",
        )
    }

    pub fn not_in_count(code: &str) -> Self {
        Self::new(
            Severity::Error,
            "Item not in this count",
            format!("Barcode {code} not found in current count"),
        )
    }

    pub fn mismatch(scanned: &str, expected: &str) -> Self {
        Self::new(
            Severity::Error,
            "Not this item",
            format!("Scanned {scanned}, expected {expected}"),
        )
    }

    pub fn barcode_in_use(code: &str, owner_name: &str) -> Self {
        Self::new(
            Severity::Error,
            "Barcode already in use",
            format!("{code} belongs to {owner_name}"),
        )
    }

    pub fn barcode_attached(code: &str, item_name: &str) -> Self {
        Self::new(
            Severity::Success,
            "Barcode attached",
            format!("{code} → {item_name}"),
        )
    }

    pub fn attach_failed(error: &WriteError) -> Self {
        Self::new(
            Severity::Error,
            "Failed to attach barcode",
            if error.message.is_empty() {
                "Could not attach barcode".to_string()
            } else {
                error.message.clone()
            },
        )
    }

    pub fn invalid_quantity(qty: Quantity) -> Self {
        Self::new(
            Severity::Error,
            "Invalid quantity",
            format!("Quantity must not be negative, got {qty}"),
        )
    }

    pub fn set_qty_failed(error: &WriteError) -> Self {
        Self::new(
            Severity::Error,
            "Failed to set quantity",
            error.message.clone(),
        )
    }

    pub fn data_integrity(detail: &str) -> Self {
        Self::new(
            Severity::Error,
            "Data integrity error",
            format!("{detail}. Scans were not saved"),
        )
    }

    pub fn slow_connection() -> Self {
        Self::new(
            Severity::Warning,
            "Slow connection",
            "Saving may take longer than usual",
        )
    }

    /// Message for a write that failed after every retry.
    pub fn persist_failed(error: &WriteError, kept: Quantity) -> Self {
        match error.kind {
            WriteErrorKind::InvalidId => Self::new(
                Severity::Error,
                "Invalid record",
                "This count or item has an invalid identifier. Reload the count and try again",
            ),
            WriteErrorKind::PermissionDenied => Self::new(
                Severity::Error,
                "Permission denied",
                "You do not have permission to update this count",
            ),
            WriteErrorKind::ConnectionLost => Self::new(
                Severity::Error,
                "Connection lost",
                format!("{kept} scanned unit(s) kept and will be saved on the next scan"),
            ),
            WriteErrorKind::Other => {
                Self::new(Severity::Error, "Save failed", error.message.clone())
            }
        }
    }
}
