//! Count backends executing the engine's write commands.

use std::{
    collections::VecDeque,
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use dashmap::DashMap;
use tally_engine::{Catalog, ItemId, Quantity, RequestId, SessionId, WriteError};

/// Remote store of counted quantities.
///
/// Implementations report failures as [`WriteError`]s with a structured
/// kind; the engine decides from the kind whether to retry.
pub trait CountBackend: Send + Sync + 'static {
    /// Add `delta` to the counted quantity. `request` is the same for every
    /// retry of one batch.
    fn apply_delta(
        &self,
        session_id: &str,
        item_id: &str,
        delta: Quantity,
        request: RequestId,
    ) -> impl Future<Output = Result<(), WriteError>> + Send;

    /// Overwrite the counted quantity.
    fn set_absolute(
        &self,
        session_id: &str,
        item_id: &str,
        quantity: Quantity,
    ) -> impl Future<Output = Result<(), WriteError>> + Send;

    /// Store a barcode on an item.
    fn assign_barcode(
        &self,
        item_id: &str,
        code: &str,
    ) -> impl Future<Output = Result<(), WriteError>> + Send;
}

/// In-memory backend with failure injection.
///
/// Thread-safe and can be shared across tasks via `Arc`.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    quantities: DashMap<(SessionId, ItemId), Quantity>,
    barcodes: DashMap<ItemId, String>,
    /// Errors returned by the next calls, oldest first
    failures: Mutex<VecDeque<WriteError>>,
    latency: Option<Duration>,
    apply_calls: AtomicUsize,
    set_calls: AtomicUsize,
    assign_calls: AtomicUsize,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend holding the quantities and barcodes of `catalog`.
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let backend = Self::new();
        for item in catalog.session_items() {
            backend.quantities.insert(
                (catalog.session_id().clone(), item.id.clone()),
                catalog.actual_quantity(&item.id),
            );
            if let Some(code) = item.barcode.as_ref().filter(|c| !c.is_empty()) {
                backend.barcodes.insert(item.id.clone(), code.clone());
            }
        }
        backend
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next call fail with `error`. Queued failures are consumed in
    /// order, one per call.
    pub fn fail_next(&self, error: WriteError) {
        self.lock_failures().push_back(error);
    }

    /// Make the next `times` calls fail with `error`.
    pub fn fail_times(&self, error: WriteError, times: usize) {
        let mut failures = self.lock_failures();
        failures.extend(std::iter::repeat(error).take(times));
    }

    /// Stored quantity of an item.
    pub fn quantity(&self, session_id: &str, item_id: &str) -> Quantity {
        self.quantities
            .get(&(session_id.to_string(), item_id.to_string()))
            .map(|q| *q)
            .unwrap_or(0)
    }

    /// Stored barcode of an item.
    pub fn barcode(&self, item_id: &str) -> Option<String> {
        self.barcodes.get(item_id).map(|code| code.value().clone())
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn assign_calls(&self) -> usize {
        self.assign_calls.load(Ordering::SeqCst)
    }

    fn lock_failures(&self) -> std::sync::MutexGuard<'_, VecDeque<WriteError>> {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn begin(&self, counter: &AtomicUsize) -> Result<(), WriteError> {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.lock_failures().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl CountBackend for MemoryBackend {
    async fn apply_delta(
        &self,
        session_id: &str,
        item_id: &str,
        delta: Quantity,
        request: RequestId,
    ) -> Result<(), WriteError> {
        self.begin(&self.apply_calls).await?;
        let mut quantity = self
            .quantities
            .entry((session_id.to_string(), item_id.to_string()))
            .or_insert(0);
        *quantity += delta;
        tracing::debug!(item_id, delta, request, total = *quantity, "delta applied");
        Ok(())
    }

    async fn set_absolute(
        &self,
        session_id: &str,
        item_id: &str,
        quantity: Quantity,
    ) -> Result<(), WriteError> {
        self.begin(&self.set_calls).await?;
        self.quantities
            .insert((session_id.to_string(), item_id.to_string()), quantity);
        tracing::debug!(item_id, quantity, "quantity overwritten");
        Ok(())
    }

    async fn assign_barcode(&self, item_id: &str, code: &str) -> Result<(), WriteError> {
        self.begin(&self.assign_calls).await?;
        self.barcodes.insert(item_id.to_string(), code.to_string());
        tracing::debug!(item_id, code, "barcode stored");
        Ok(())
    }
}
