//! Scan session actor.
//!
//! Owns one [`ScanEngine`] on a Tokio task, sleeps until the engine's next
//! deadline, executes the commands it returns against a [`CountBackend`] and
//! feeds write outcomes back in.

use std::{future::Future, sync::Arc, time::Duration};

use tally_engine::{
    Catalog, Command, EngineSnapshot, Feedback, NetworkHealth, RequestId, ScanEngine, ScanEvent,
    ScanSettings, Timestamp, WriteError,
};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::Instant,
};

use crate::{
    backend::CountBackend,
    error::{Result, SessionError},
};

/// Something the UI should render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Toast(Feedback),
    Vibrate { millis: u64 },
}

/// Sender half for UI signals.
pub type SignalSender = mpsc::UnboundedSender<Signal>;

/// Create a network-health channel starting `Online`.
pub fn health_channel() -> (watch::Sender<NetworkHealth>, watch::Receiver<NetworkHealth>) {
    watch::channel(NetworkHealth::Online)
}

enum Message {
    Dispatch(ScanEvent),
    RefreshCatalog(Catalog, oneshot::Sender<tally_engine::error::Result<()>>),
    Reset,
    RetryPending,
    Shutdown(oneshot::Sender<()>),
}

struct Completion {
    request: RequestId,
    result: std::result::Result<(), WriteError>,
}

enum Wake {
    Message(Option<Message>),
    Completed(Completion),
    Health(bool),
    Timer,
}

/// Spawns scan sessions.
pub struct ScanSession;

impl ScanSession {
    /// Start a session actor on the current Tokio runtime.
    ///
    /// The actor stops when `shutdown` is called or every handle is dropped.
    /// Stopping cancels all pending timers; unwritten deltas are discarded.
    pub fn spawn<B: CountBackend>(
        settings: ScanSettings,
        catalog: Catalog,
        backend: Arc<B>,
        health: watch::Receiver<NetworkHealth>,
        signals: SignalSender,
    ) -> Result<SessionHandle> {
        let mut engine = ScanEngine::new(settings, catalog)?;
        engine.set_network_health(*health.borrow());

        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());

        let actor = Actor {
            engine,
            backend,
            origin: Instant::now(),
            inbox,
            completions,
            completions_tx,
            health,
            health_open: true,
            signals,
            snapshot_tx,
        };
        tokio::spawn(actor.run());

        Ok(SessionHandle {
            tx: inbox_tx,
            snapshot: snapshot_rx,
        })
    }
}

/// Handle to a running scan session.
///
/// Cheap to clone; every clone talks to the same actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Message>,
    snapshot: watch::Receiver<EngineSnapshot>,
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Dispatch(event) => f.debug_tuple("Dispatch").field(event).finish(),
            Message::RefreshCatalog(..) => f.write_str("RefreshCatalog"),
            Message::Reset => f.write_str("Reset"),
            Message::RetryPending => f.write_str("RetryPending"),
            Message::Shutdown(_) => f.write_str("Shutdown"),
        }
    }
}

impl SessionHandle {
    fn send(&self, message: Message) -> Result<()> {
        self.tx.send(message).map_err(|_| SessionError::Closed)
    }

    /// Queue an event for the engine.
    pub fn dispatch(&self, event: ScanEvent) -> Result<()> {
        self.send(Message::Dispatch(event))
    }

    pub fn select_item(&self, item_id: impl Into<String>) -> Result<()> {
        self.dispatch(ScanEvent::item_selected(item_id))
    }

    pub fn scan(&self, code: impl Into<String>) -> Result<()> {
        self.dispatch(ScanEvent::scan_detected(code))
    }

    pub fn set_qty(&self, qty: i64) -> Result<()> {
        self.dispatch(ScanEvent::set_qty(qty))
    }

    /// Replace the engine's catalog.
    pub async fn refresh_catalog(&self, catalog: Catalog) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(Message::RefreshCatalog(catalog, ack))?;
        done.await.map_err(|_| SessionError::Closed)??;
        Ok(())
    }

    /// Clear all engine state and cancel its timers.
    pub fn reset(&self) -> Result<()> {
        self.send(Message::Reset)
    }

    /// Resubmit every delta whose write failed.
    pub fn retry_pending(&self) -> Result<()> {
        self.send(Message::RetryPending)
    }

    /// Get the latest engine snapshot.
    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshot.clone()
    }

    /// Stop the actor and wait for it to finish.
    pub async fn shutdown(self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(Message::Shutdown(ack))?;
        done.await.map_err(|_| SessionError::Closed)
    }
}

struct Actor<B> {
    engine: ScanEngine,
    backend: Arc<B>,
    /// Engine timestamps are milliseconds since this instant
    origin: Instant,
    inbox: mpsc::UnboundedReceiver<Message>,
    completions: mpsc::UnboundedReceiver<Completion>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    health: watch::Receiver<NetworkHealth>,
    health_open: bool,
    signals: SignalSender,
    snapshot_tx: watch::Sender<EngineSnapshot>,
}

impl<B: CountBackend> Actor<B> {
    async fn run(mut self) {
        tracing::info!(count_id = %self.engine.settings().count_id, "scan session started");

        loop {
            let deadline = self
                .engine
                .next_deadline()
                .and_then(|at| self.origin.checked_add(Duration::from_millis(at)));
            let health_open = self.health_open;

            let wake = tokio::select! {
                message = self.inbox.recv() => Wake::Message(message),
                Some(done) = self.completions.recv() => Wake::Completed(done),
                changed = self.health.changed(), if health_open => Wake::Health(changed.is_ok()),
                _ = sleep_until(deadline) => Wake::Timer,
            };

            let now = self.now();
            match wake {
                Wake::Message(None) => break,
                Wake::Message(Some(Message::Shutdown(ack))) => {
                    let _ = ack.send(());
                    break;
                }
                Wake::Message(Some(message)) => self.handle(message, now),
                Wake::Completed(done) => {
                    let cmds = self.engine.complete(done.request, done.result, now);
                    self.execute(cmds);
                }
                Wake::Health(true) => self.on_health_change(now),
                Wake::Health(false) => {
                    tracing::debug!("health signal closed, keeping last value");
                    self.health_open = false;
                }
                Wake::Timer => {
                    let cmds = self.engine.poll_timers(now);
                    self.execute(cmds);
                }
            }

            self.snapshot_tx.send_replace(self.engine.snapshot());
        }

        tracing::info!(count_id = %self.engine.settings().count_id, "scan session stopped");
    }

    fn now(&self) -> Timestamp {
        self.origin.elapsed().as_millis() as Timestamp
    }

    fn handle(&mut self, message: Message, now: Timestamp) {
        match message {
            Message::Dispatch(event) => {
                let cmds = self.engine.dispatch(event, now);
                self.execute(cmds);
            }
            Message::RefreshCatalog(catalog, ack) => {
                let _ = ack.send(self.engine.refresh_catalog(catalog));
            }
            Message::Reset => self.engine.reset(),
            Message::RetryPending => {
                let cmds = self.engine.retry_pending(now);
                self.execute(cmds);
            }
            Message::Shutdown(_) => {}
        }
    }

    fn on_health_change(&mut self, now: Timestamp) {
        let health = *self.health.borrow_and_update();
        let previous = self.engine.network_health();
        self.engine.set_network_health(health);

        if health == NetworkHealth::Online && previous != NetworkHealth::Online {
            tracing::info!("back online, resubmitting pending deltas");
            let cmds = self.engine.retry_pending(now);
            self.execute(cmds);
        }
    }

    fn execute(&mut self, cmds: Vec<Command>) {
        for cmd in cmds {
            match cmd {
                Command::Notify(feedback) => self.signal(Signal::Toast(feedback)),
                Command::Vibrate { millis } => self.signal(Signal::Vibrate { millis }),
                Command::ApplyDelta {
                    request,
                    session_id,
                    item_id,
                    delta,
                    ..
                } => {
                    let backend = Arc::clone(&self.backend);
                    self.spawn_write(request, async move {
                        backend
                            .apply_delta(&session_id, &item_id, delta, request)
                            .await
                    });
                }
                Command::SetAbsolute {
                    request,
                    session_id,
                    item_id,
                    quantity,
                } => {
                    let backend = Arc::clone(&self.backend);
                    self.spawn_write(request, async move {
                        backend.set_absolute(&session_id, &item_id, quantity).await
                    });
                }
                Command::AssignBarcode {
                    request,
                    item_id,
                    code,
                } => {
                    let backend = Arc::clone(&self.backend);
                    self.spawn_write(request, async move {
                        backend.assign_barcode(&item_id, &code).await
                    });
                }
            }
        }
    }

    fn signal(&self, signal: Signal) {
        if self.signals.send(signal).is_err() {
            tracing::debug!("signal receiver dropped");
        }
    }

    fn spawn_write<F>(&self, request: RequestId, write: F)
    where
        F: Future<Output = std::result::Result<(), WriteError>> + Send + 'static,
    {
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = write.await;
            let _ = completions.send(Completion { request, result });
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
