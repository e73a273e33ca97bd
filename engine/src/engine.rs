//! ScanEngine - the scan reconciliation state machine.
//!
//! The engine holds the selection, the dedup filter and the persistence
//! pipeline. It processes one event at a time and answers with the commands
//! the caller must execute.

use crate::{
    catalog::normalize_code,
    error::Result,
    persist::{PendingFlush, Pipeline},
    Catalog, Command, DedupFilter, EngineSnapshot, Error, Feedback, ItemId, NetworkHealth,
    Quantity, RequestId, ScanEvent, ScanSettings, Timestamp, TrackedItem, WriteError,
};

/// A write the engine is blocked on. While one exists, `dispatch` drops
/// new events.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Awaiting {
    Attach {
        request: RequestId,
        item_id: ItemId,
        code: String,
    },
    SetQty {
        request: RequestId,
        item_id: ItemId,
        qty: Quantity,
    },
}

/// The engine for one counting session.
#[derive(Debug, Clone)]
pub struct ScanEngine {
    settings: ScanSettings,
    catalog: Catalog,
    dedup: DedupFilter,
    current_item_id: Option<ItemId>,
    pipeline: Pipeline,
    awaiting: Option<Awaiting>,
    /// Code of the last attach and the time until which repeats are ignored
    attach_guard: Option<(String, Timestamp)>,
}

impl ScanEngine {
    /// Create an engine for the session in `settings`.
    ///
    /// Fails if the settings are invalid or the catalog belongs to another
    /// session.
    pub fn new(settings: ScanSettings, catalog: Catalog) -> Result<Self> {
        settings.validate()?;
        if catalog.session_id() != &settings.count_id {
            return Err(Error::SessionMismatch {
                configured: settings.count_id.clone(),
                catalog: catalog.session_id().clone(),
            });
        }

        let pipeline = Pipeline::new(settings.count_id.clone(), settings.retry, &settings.timing);
        Ok(Self {
            dedup: DedupFilter::new(settings.dedupe_ms),
            settings,
            catalog,
            current_item_id: None,
            pipeline,
            awaiting: None,
            attach_guard: None,
        })
    }

    /// Get the settings.
    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Get the catalog snapshot.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn current_item_id(&self) -> Option<&ItemId> {
        self.current_item_id.as_ref()
    }

    /// Optimistic delta of the selected item.
    pub fn session_increments(&self) -> Quantity {
        self.pipeline.increments()
    }

    /// Check if the engine is waiting on an attach or set-quantity write.
    pub fn is_processing(&self) -> bool {
        self.awaiting.is_some()
    }

    /// Check if a delta write is in flight.
    pub fn is_persisting(&self) -> bool {
        self.pipeline.is_persisting()
    }

    pub fn network_health(&self) -> NetworkHealth {
        self.pipeline.health()
    }

    /// Stored quantity of the selected item plus its optimistic delta.
    pub fn displayed_total(&self) -> Option<Quantity> {
        let item_id = self.current_item_id.as_ref()?;
        Some(self.catalog.actual_quantity(item_id) + self.pipeline.increments())
    }

    /// Deltas for previously selected items that are not written yet.
    pub fn pending_flushes(&self) -> Vec<PendingFlush> {
        self.pipeline.pending_flushes()
    }

    /// Earliest time at which `poll_timers` has work to do.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.pipeline.next_deadline()
    }

    /// Get a serializable view of the engine state.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            count_id: self.settings.count_id.clone(),
            current_item_id: self.current_item_id.clone(),
            last_code: self.dedup.last_code().map(str::to_string),
            last_scan_time: self.dedup.last_seen(),
            session_increments: self.pipeline.increments(),
            backup_increments: self.pipeline.backup(),
            unsent_increments: self.pipeline.unsent(),
            displayed_total: self.displayed_total(),
            is_processing: self.is_processing(),
            is_persisting: self.is_persisting(),
            network_health: self.pipeline.health(),
            pending_flushes: self.pipeline.pending_flushes(),
        }
    }

    /// Handle a user or scanner event.
    ///
    /// Events arriving while an attach or set-quantity write is outstanding
    /// are dropped, not queued.
    pub fn dispatch(&mut self, event: ScanEvent, now: Timestamp) -> Vec<Command> {
        if self.is_processing() {
            tracing::debug!(event = event.kind(), "engine busy, dropping event");
            return Vec::new();
        }

        let mut cmds = Vec::new();
        match event {
            ScanEvent::ItemSelected { item_id } => self.on_item_selected(item_id, &mut cmds),
            ScanEvent::ScanDetected { code } => self.on_scan(&code, now, &mut cmds),
            ScanEvent::SetQty { qty } => self.on_set_qty(qty, &mut cmds),
        }
        cmds
    }

    /// Report the outcome of a write command.
    ///
    /// Completions for requests the engine no longer tracks (after a reset,
    /// or delivered twice) are ignored.
    pub fn complete(
        &mut self,
        request: RequestId,
        result: std::result::Result<(), WriteError>,
        now: Timestamp,
    ) -> Vec<Command> {
        let mut cmds = Vec::new();

        match self.awaiting.take() {
            Some(Awaiting::Attach {
                request: pending,
                item_id,
                code,
            }) if pending == request => {
                self.finish_attach(&item_id, &code, result, now, &mut cmds);
                return cmds;
            }
            Some(Awaiting::SetQty {
                request: pending,
                item_id,
                qty,
            }) if pending == request => {
                match result {
                    Ok(()) => {
                        tracing::info!(item_id = %item_id, qty, "quantity set");
                        self.catalog.set_actual(&item_id, qty);
                    }
                    Err(error) => {
                        tracing::warn!(item_id = %item_id, qty, error = %error, "set quantity failed");
                        cmds.push(Command::Notify(Feedback::set_qty_failed(&error)));
                    }
                }
                return cmds;
            }
            other => self.awaiting = other,
        }

        if !self.pipeline.complete(request, result, now, &mut cmds) {
            tracing::debug!(request, "ignoring completion for unknown request");
        }
        self.settle();
        cmds
    }

    /// Fire the debounce, retry and confirmation timers due at `now`.
    pub fn poll_timers(&mut self, now: Timestamp) -> Vec<Command> {
        let mut cmds = Vec::new();
        self.pipeline.poll(now, &mut cmds);
        self.settle();
        cmds
    }

    /// Update the network health used before each write attempt.
    pub fn set_network_health(&mut self, health: NetworkHealth) {
        if self.pipeline.health() != health {
            tracing::info!(?health, "network health changed");
        }
        self.pipeline.set_health(health);
    }

    /// Replace the catalog snapshot.
    ///
    /// The new snapshot is expected to include every write confirmed so far;
    /// confirmed amounts still shown as increments are dropped from them.
    pub fn refresh_catalog(&mut self, catalog: Catalog) -> Result<()> {
        if catalog.session_id() != &self.settings.count_id {
            return Err(Error::SessionMismatch {
                configured: self.settings.count_id.clone(),
                catalog: catalog.session_id().clone(),
            });
        }
        self.catalog = catalog;
        self.pipeline.absorb_confirmed();
        Ok(())
    }

    /// Resubmit every delta whose write failed.
    pub fn retry_pending(&mut self, now: Timestamp) -> Vec<Command> {
        let mut cmds = Vec::new();
        self.pipeline.retry_pending(now, &mut cmds);
        self.settle();
        cmds
    }

    /// Clear all state and cancel every timer.
    ///
    /// Unwritten deltas are discarded. Completions of writes issued before
    /// the reset are ignored.
    pub fn reset(&mut self) {
        tracing::info!(count_id = %self.settings.count_id, "resetting scan engine");
        self.dedup.clear();
        self.current_item_id = None;
        self.awaiting = None;
        self.attach_guard = None;
        self.pipeline.clear();
    }

    fn current_item(&self) -> Option<TrackedItem> {
        let id = self.current_item_id.as_ref()?;
        self.catalog.item(id).cloned()
    }

    fn on_item_selected(&mut self, item_id: ItemId, cmds: &mut Vec<Command>) {
        if self.catalog.item(&item_id).is_none() {
            tracing::warn!(item_id = %item_id, "selected item is not in the catalog");
        }
        self.select(item_id, cmds);
    }

    fn select(&mut self, item_id: ItemId, cmds: &mut Vec<Command>) {
        tracing::info!(
            from = ?self.current_item_id,
            to = %item_id,
            "item selected"
        );
        self.current_item_id = Some(item_id.clone());
        self.pipeline.select(item_id, cmds);
        self.settle();
    }

    /// Fold confirmed writes into the catalog's stored quantities.
    fn settle(&mut self) {
        for written in self.pipeline.take_settled() {
            self.catalog.add_to_actual(&written.item_id, written.delta);
        }
    }

    fn on_scan(&mut self, raw: &str, now: Timestamp, cmds: &mut Vec<Command>) {
        let code = normalize_code(raw);
        if code.is_empty() {
            return;
        }

        if !self.dedup.check(code, now) {
            tracing::debug!(code, "duplicate scan suppressed");
            return;
        }

        let Some(current) = self.current_item() else {
            tracing::warn!(code, "scan with no item selected");
            cmds.push(Command::Notify(Feedback::no_item_selected()));
            return;
        };

        if self.settings.auto_select_by_barcode {
            match self.catalog.find_in_session(code).cloned() {
                Some(found) if found.id != current.id => {
                    if self.settings.auto_switch_on_match {
                        tracing::info!(item = %found.name, "switching to scanned item");
                        self.select(found.id.clone(), cmds);
                        self.credit(&found, now, true, cmds);
                    } else {
                        cmds.push(Command::Notify(Feedback::offer_switch(
                            &found.id,
                            &found.name,
                        )));
                    }
                    return;
                }
                Some(_) => {}
                None => {
                    let attachable = self.settings.attach_first_scan && !current.has_barcode();
                    if !attachable {
                        tracing::warn!(code, "scanned code is not in this count");
                        cmds.push(Command::Notify(Feedback::not_in_count(code)));
                        return;
                    }
                }
            }
        }

        match current.barcode.as_deref().filter(|b| !b.is_empty()) {
            Some(expected) if expected != code => {
                tracing::warn!(scanned = code, expected, "barcode mismatch");
                cmds.push(Command::Notify(Feedback::mismatch(code, expected)));
                return;
            }
            Some(_) => {}
            None if self.settings.attach_first_scan => {
                self.begin_attach(&current, code, now, cmds);
                return;
            }
            None => {}
        }

        self.credit(&current, now, false, cmds);
    }

    fn begin_attach(
        &mut self,
        item: &TrackedItem,
        code: &str,
        now: Timestamp,
        cmds: &mut Vec<Command>,
    ) {
        if let Some((guarded, until)) = &self.attach_guard {
            if guarded == code && now < *until {
                tracing::debug!(code, "attach already issued for this code");
                return;
            }
        }

        if let Some(owner) = self.catalog.find_in_session(code) {
            if owner.id != item.id {
                tracing::warn!(code, owner = %owner.id, "barcode belongs to another item");
                cmds.push(Command::Notify(Feedback::barcode_in_use(code, &owner.name)));
                return;
            }
        }

        self.attach_guard = Some((
            code.to_string(),
            now.saturating_add(self.settings.timing.attach_guard_ms),
        ));
        let request = self.pipeline.allocate_request();
        self.awaiting = Some(Awaiting::Attach {
            request,
            item_id: item.id.clone(),
            code: code.to_string(),
        });

        tracing::info!(item_id = %item.id, code, "attaching barcode");
        cmds.push(Command::AssignBarcode {
            request,
            item_id: item.id.clone(),
            code: code.to_string(),
        });
    }

    fn finish_attach(
        &mut self,
        item_id: &str,
        code: &str,
        result: std::result::Result<(), WriteError>,
        now: Timestamp,
        cmds: &mut Vec<Command>,
    ) {
        if let Err(error) = result {
            tracing::warn!(item_id, code, error = %error, "barcode attach failed");
            cmds.push(Command::Notify(Feedback::attach_failed(&error)));
            return;
        }

        self.catalog.assign_barcode(item_id, code);
        let Some(item) = self.catalog.item(item_id).cloned() else {
            return;
        };
        cmds.push(Command::Notify(Feedback::barcode_attached(code, &item.name)));

        if self.current_item_id.as_deref() == Some(item_id) {
            self.credit(&item, now, false, cmds);
        }
    }

    /// Count an accepted scan against `item`.
    fn credit(&mut self, item: &TrackedItem, now: Timestamp, switched: bool, cmds: &mut Vec<Command>) {
        let qty = self.settings.qty_per_scan;
        self.pipeline.record_scan(qty, now);

        let in_stock = self.catalog.actual_quantity(&item.id) + self.pipeline.increments();
        tracing::debug!(
            item_id = %item.id,
            qty,
            session_total = self.pipeline.increments(),
            "scan accepted"
        );

        let timing = &self.settings.timing;
        cmds.push(Command::Vibrate {
            millis: timing.haptic_ms,
        });
        let feedback = if switched {
            Feedback::switched(&item.name, qty, timing.toast_ms)
        } else {
            Feedback::scanned(qty, &item.name, in_stock, timing.toast_ms)
        };
        cmds.push(Command::Notify(feedback));
    }

    fn on_set_qty(&mut self, qty: Quantity, cmds: &mut Vec<Command>) {
        let Some(item_id) = self.current_item_id.clone() else {
            cmds.push(Command::Notify(Feedback::no_item_selected()));
            return;
        };
        if qty < 0 {
            cmds.push(Command::Notify(Feedback::invalid_quantity(qty)));
            return;
        }

        self.pipeline.set_absolute(&item_id, cmds);
        let request = self.pipeline.allocate_request();
        self.awaiting = Some(Awaiting::SetQty {
            request,
            item_id: item_id.clone(),
            qty,
        });

        tracing::info!(item_id = %item_id, qty, "setting absolute quantity");
        cmds.push(Command::SetAbsolute {
            request,
            session_id: self.settings.count_id.clone(),
            item_id,
            quantity: qty,
        });
    }
}
