//! QuotaCore: the Facade entry-point for all consumers (CLI, status bar, etc.)
//!
//! This struct owns the pipeline, its shared state and the poller task.
//! Consumers never need to acquire locks or wire services themselves.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Settings;
use crate::pipeline::poller::{self, PollerSignals};
use crate::pipeline::{DiscoveryBackend, Pipeline};
use crate::state::SharedState;

use super::events::CoreEvent;

/// Default broadcast channel capacity
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The Facade that wraps the discovery pipeline.
///
/// Constructed via [`QuotaCoreBuilder`](super::builder::QuotaCoreBuilder).
pub struct QuotaCore {
    /// Application settings
    settings: Arc<Settings>,
    /// Pipeline shared with the poller task
    pipeline: Arc<Pipeline>,
    /// Broadcast sender for core events
    event_tx: broadcast::Sender<CoreEvent>,
    /// Wakes the poller for an out-of-schedule cycle
    refresh: Arc<Notify>,
    /// Tells the poller to stop scheduling cycles
    shutdown_tx: watch::Sender<bool>,
    /// Running poller, if started
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl QuotaCore {
    /// Create a new QuotaCore instance (prefer `QuotaCoreBuilder`)
    pub(crate) fn new(
        settings: Arc<Settings>,
        backend: Arc<dyn DiscoveryBackend>,
        state: SharedState,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, _) = watch::channel(false);
        let pipeline = Arc::new(Pipeline::new(backend, state, event_tx.clone()));
        Self {
            settings,
            pipeline,
            event_tx,
            refresh: Arc::new(Notify::new()),
            shutdown_tx,
            poller: Mutex::new(None),
        }
    }

    /// Access application settings (read-only)
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Start the poller: one immediate cycle, then one per interval.
    ///
    /// Calling it again while running is a no-op. Must be called inside a
    /// tokio runtime.
    pub fn start(&self) {
        let mut slot = self.poller.lock();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        self.shutdown_tx.send_replace(false);

        info!(
            "Starting quota poller (every {}s, process {:?})",
            self.settings.poll_interval_secs, self.settings.process_name
        );
        *slot = Some(poller::spawn(
            self.pipeline.clone(),
            self.settings.poll_interval(),
            PollerSignals {
                refresh: self.refresh.clone(),
                shutdown: self.shutdown_tx.subscribe(),
            },
        ));
    }

    /// Whether the poller task is running
    pub fn is_running(&self) -> bool {
        self.poller
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stop scheduling cycles and wait for an in-flight cycle to finish
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let handle = self.poller.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                debug!("Poller task ended abnormally: {}", e);
            }
            info!("Quota poller stopped");
        }
    }

    /// Get a clone of the broadcast event sender.
    pub(crate) fn event_sender(&self) -> broadcast::Sender<CoreEvent> {
        self.event_tx.clone()
    }

    // =========================================================
    // Internal accessors for query/action impls
    // =========================================================

    pub(crate) fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub(crate) fn state(&self) -> &SharedState {
        self.pipeline.state()
    }

    pub(crate) fn refresh_signal(&self) -> &Notify {
        &self.refresh
    }
}

impl Drop for QuotaCore {
    fn drop(&mut self) {
        // Dropping the handle detaches the task; the flag makes it exit
        self.shutdown_tx.send_replace(true);
    }
}
