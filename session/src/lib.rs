//! # Tally Session
//!
//! Async shell around [`tally_engine::ScanEngine`].
//!
//! The engine is a pure state machine; this crate gives it a clock, timers
//! and a backend. A [`ScanSession`] runs the engine on its own Tokio task,
//! a [`SessionHandle`] feeds it events, and UI signals come back over a
//! channel.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tally_engine::{Catalog, ScanSettings};
//! use tally_session::{health_channel, MemoryBackend, ScanSession};
//! use tokio::sync::mpsc;
//!
//! # async fn run(catalog: Catalog) -> tally_session::Result<()> {
//! let backend = Arc::new(MemoryBackend::from_catalog(&catalog));
//! let (_health_tx, health_rx) = health_channel();
//! let (signals_tx, mut signals) = mpsc::unbounded_channel();
//!
//! let settings = ScanSettings::new(catalog.session_id().clone());
//! let session = ScanSession::spawn(settings, catalog, backend, health_rx, signals_tx)?;
//! session.scan("4006381333931")?;
//! while let Some(signal) = signals.recv().await {
//!     println!("{signal:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod driver;
pub mod error;

pub use backend::{CountBackend, MemoryBackend};
pub use config::{load_catalog, CatalogFile, Config, ConfigError};
pub use driver::{health_channel, ScanSession, SessionHandle, Signal, SignalSender};
pub use error::{Result, SessionError};
