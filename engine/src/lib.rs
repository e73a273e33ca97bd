//! # Tally Engine
//!
//! A deterministic scan reconciliation engine for physical inventory counts.
//!
//! Hardware scanners fire fast and often fire twice. This crate turns that
//! input stream into a small number of remote quantity writes while keeping
//! the counter the user sees up to date on every scan, without ever waiting
//! on the network.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never touches the network, a timer or a clock.
//!   Every input carries a millisecond timestamp and every side effect is
//!   returned as a [`Command`] for the caller to execute.
//! - **Deterministic**: the same inputs at the same timestamps always
//!   produce the same commands, so debounce and retry timing is testable
//!   without sleeping.
//! - **Never throws**: failures are reported as [`Feedback`] commands and
//!   logged through `tracing`; `dispatch` always returns.
//!
//! ## Core Concepts
//!
//! ### Catalog
//!
//! A [`Catalog`] is a read-only snapshot of the tracked items and of the
//! [`CountSessionItem`]s of one counting session. Barcode lookups are always
//! scoped to the items in the session.
//!
//! ### Accumulator
//!
//! Every accepted scan adds `qty_per_scan` to the optimistic session delta.
//! The displayed total is `actual_quantity + session_increments`.
//!
//! ### Persistence
//!
//! A burst of scans becomes one [`Command::ApplyDelta`] after a quiet period.
//! Failed writes are retried according to a [`RetryPolicy`] and rolled back
//! to the last-known-good delta, never to zero.
//!
//! ## Quick Start
//!
//! ```rust
//! use tally_engine::{
//!     Catalog, Command, CountSessionItem, ScanEngine, ScanEvent, ScanSettings, TrackedItem,
//! };
//!
//! let count_id = "7f4c3c1e-2a54-4d0e-9a51-2d7f0d8a9b10";
//! let item_id = "0b6f1f6a-3c2e-4f7b-8a0d-5e9c1b2a3d4e";
//!
//! let catalog = Catalog::new(
//!     count_id,
//!     vec![TrackedItem::new(item_id, "Espresso beans 1kg").with_barcode("4006381333931")],
//!     vec![CountSessionItem::new(count_id, item_id, 12)],
//! );
//! let mut engine = ScanEngine::new(ScanSettings::new(count_id), catalog).unwrap();
//!
//! engine.dispatch(ScanEvent::item_selected(item_id), 0);
//! engine.dispatch(ScanEvent::scan_detected("4006381333931"), 10);
//! assert_eq!(engine.session_increments(), 1);
//! assert_eq!(engine.displayed_total(), Some(13));
//!
//! // After the quiet period the burst is persisted as one delta.
//! let commands = engine.poll_timers(400);
//! assert!(commands
//!     .iter()
//!     .any(|c| matches!(c, Command::ApplyDelta { delta: 1, .. })));
//! ```

pub mod catalog;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod event;
pub mod feedback;
pub mod persist;
pub mod retry;
pub mod settings;
pub mod snapshot;

// Re-export main types at crate root
pub use catalog::{normalize_code, Catalog, CountSessionItem, TrackedItem};
pub use dedup::DedupFilter;
pub use engine::ScanEngine;
pub use error::{Error, WriteError, WriteErrorKind};
pub use event::{Command, NetworkHealth, ScanEvent};
pub use feedback::{Feedback, FeedbackAction, Severity};
pub use persist::{validate_identifier, PendingFlush};
pub use retry::RetryPolicy;
pub use settings::{ScanSettings, Timing};
pub use snapshot::EngineSnapshot;

/// Type aliases for clarity
pub type ItemId = String;
pub type SessionId = String;
pub type Quantity = i64;
pub type Timestamp = u64;
pub type RequestId = u64;
