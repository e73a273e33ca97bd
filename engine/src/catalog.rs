//! Catalog - the read-only snapshot of items in a counting session.
//!
//! The engine never owns item data. Callers hand it a snapshot of the tracked
//! items and the per-session count records, and replace the snapshot whenever
//! their read model refreshes.

use crate::{ItemId, Quantity, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Strip the whitespace and line terminators scanners append to a code.
pub fn normalize_code(code: &str) -> &str {
    code.trim()
}

/// An item in the counting universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedItem {
    /// Unique identifier for this item
    pub id: ItemId,
    /// Display name shown in feedback
    pub name: String,
    /// Stored barcode, if one has been assigned
    #[serde(default)]
    pub barcode: Option<String>,
}

impl TrackedItem {
    /// Create an item without a barcode.
    pub fn new(id: impl Into<ItemId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            barcode: None,
        }
    }

    /// Attach a barcode to the item.
    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode = Some(barcode.into());
        self
    }

    /// Whether the item carries a non-empty barcode.
    pub fn has_barcode(&self) -> bool {
        self.barcode.as_deref().is_some_and(|b| !b.is_empty())
    }
}

/// The record of an item's counted quantity within one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountSessionItem {
    /// Counting session this record belongs to
    pub session_id: SessionId,
    /// Item being counted
    pub item_id: ItemId,
    /// Authoritative quantity recorded so far
    #[serde(default)]
    pub actual_quantity: Quantity,
}

impl CountSessionItem {
    pub fn new(
        session_id: impl Into<SessionId>,
        item_id: impl Into<ItemId>,
        actual_quantity: Quantity,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            item_id: item_id.into(),
            actual_quantity,
        }
    }
}

/// Items and count records for a single counting session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    session_id: SessionId,
    /// Kept in caller order so duplicate barcodes resolve first-match-wins.
    items: Vec<TrackedItem>,
    count_items: HashMap<ItemId, CountSessionItem>,
}

impl Catalog {
    /// Build a catalog for `session_id`.
    ///
    /// Count records belonging to other sessions are skipped. Only the first
    /// record for a given item is kept.
    pub fn new(
        session_id: impl Into<SessionId>,
        items: Vec<TrackedItem>,
        count_items: Vec<CountSessionItem>,
    ) -> Self {
        let session_id = session_id.into();
        let mut by_item = HashMap::with_capacity(count_items.len());

        for count_item in count_items {
            if count_item.session_id != session_id {
                tracing::debug!(
                    session_id = %count_item.session_id,
                    item_id = %count_item.item_id,
                    "skipping count item from another session"
                );
                continue;
            }
            if by_item.contains_key(&count_item.item_id) {
                tracing::warn!(
                    item_id = %count_item.item_id,
                    "duplicate count item for session, keeping the first"
                );
                continue;
            }
            by_item.insert(count_item.item_id.clone(), count_item);
        }

        Self {
            session_id,
            items,
            count_items: by_item,
        }
    }

    /// Get the session this catalog is scoped to.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Get an item by ID, whether or not it is part of the session.
    pub fn item(&self, id: &str) -> Option<&TrackedItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Get the session record for an item.
    pub fn count_item(&self, item_id: &str) -> Option<&CountSessionItem> {
        self.count_items.get(item_id)
    }

    /// Check if an item is part of the session.
    pub fn in_session(&self, item_id: &str) -> bool {
        self.count_items.contains_key(item_id)
    }

    /// Quantity recorded so far for an item, zero if it has no record.
    pub fn actual_quantity(&self, item_id: &str) -> Quantity {
        self.count_item(item_id)
            .map(|ci| ci.actual_quantity)
            .unwrap_or(0)
    }

    /// All items that are part of the session, in caller order.
    pub fn session_items(&self) -> impl Iterator<Item = &TrackedItem> {
        self.items.iter().filter(|item| self.in_session(&item.id))
    }

    /// Find the session item carrying `code` as its barcode.
    ///
    /// Items outside the session are never matched, even when they carry the
    /// code. If several session items share a barcode the first one wins.
    pub fn find_in_session(&self, code: &str) -> Option<&TrackedItem> {
        let code = normalize_code(code);
        if code.is_empty() {
            return None;
        }
        self.session_items()
            .find(|item| item.barcode.as_deref() == Some(code))
    }

    /// Count of items in the session.
    pub fn len(&self) -> usize {
        self.session_items().count()
    }

    /// Check if the session has no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a written delta to the stored quantity, ahead of the next refresh.
    pub(crate) fn add_to_actual(&mut self, item_id: &str, delta: Quantity) {
        if let Some(count_item) = self.count_items.get_mut(item_id) {
            count_item.actual_quantity += delta;
        }
    }

    /// Overwrite the stored quantity, ahead of the next refresh.
    pub(crate) fn set_actual(&mut self, item_id: &str, quantity: Quantity) {
        if let Some(count_item) = self.count_items.get_mut(item_id) {
            count_item.actual_quantity = quantity;
        }
    }

    /// Record a barcode the engine just assigned, ahead of the next refresh.
    pub(crate) fn assign_barcode(&mut self, item_id: &str, code: &str) -> bool {
        match self.items.iter_mut().find(|item| item.id == item_id) {
            Some(item) => {
                item.barcode = Some(code.to_string());
                true
            }
            None => false,
        }
    }
}
