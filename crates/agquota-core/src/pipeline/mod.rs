//! The discovery pipeline: runs cycles, applies their outcome to the shared
//! state, and publishes events.

pub mod cycle;
pub(crate) mod poller;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::api::CoreEvent;
use crate::error::DiscoveryError;
use crate::quota::QuotaSnapshot;
use crate::state::{transition, SharedState};

pub use cycle::{run_cycle, CyclePhase, DiscoveryBackend, SystemBackend};

/// Result of asking the pipeline to run a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A snapshot was fetched and applied
    Parsed(QuotaSnapshot),
    /// The cycle failed; state kept its previous snapshot
    Failed(DiscoveryError),
    /// Another cycle was already running
    Skipped,
}

/// Clears the in-flight flag when a cycle ends, even if it is cancelled
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the backend and everything a cycle writes to
pub(crate) struct Pipeline {
    backend: Arc<dyn DiscoveryBackend>,
    state: SharedState,
    event_tx: broadcast::Sender<CoreEvent>,
    snapshot_tx: watch::Sender<QuotaSnapshot>,
    in_flight: AtomicBool,
    phase: Mutex<CyclePhase>,
    /// Message of the last reported failure, for log de-duplication
    last_failure: Mutex<Option<String>>,
}

impl Pipeline {
    pub(crate) fn new(
        backend: Arc<dyn DiscoveryBackend>,
        state: SharedState,
        event_tx: broadcast::Sender<CoreEvent>,
    ) -> Self {
        let initial = state.read().latest_snapshot.clone();
        let (snapshot_tx, _) = watch::channel(initial);
        Self {
            backend,
            state,
            event_tx,
            snapshot_tx,
            in_flight: AtomicBool::new(false),
            phase: Mutex::new(CyclePhase::Idle),
            last_failure: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> &SharedState {
        &self.state
    }

    pub(crate) fn phase(&self) -> CyclePhase {
        *self.phase.lock()
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn snapshot_receiver(&self) -> watch::Receiver<QuotaSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: CoreEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn set_phase(&self, phase: CyclePhase) {
        debug!("Cycle phase: {}", phase);
        *self.phase.lock() = phase;
    }

    /// Run one cycle unless one is already in flight
    pub(crate) async fn run_once(&self) -> CycleOutcome {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!("Cycle already in flight, skipping trigger");
            return CycleOutcome::Skipped;
        }
        let _guard = InFlight(&self.in_flight);

        let result = run_cycle(self.backend.as_ref(), |phase| self.set_phase(phase)).await;
        let outcome = match result {
            Ok(snapshot) => {
                self.apply_success(snapshot.clone());
                CycleOutcome::Parsed(snapshot)
            }
            Err(e) => {
                self.apply_failure(&e);
                CycleOutcome::Failed(e)
            }
        };
        self.set_phase(CyclePhase::Idle);
        outcome
    }

    fn apply_success(&self, snapshot: QuotaSnapshot) {
        if self.last_failure.lock().take().is_some() {
            info!("Quota fetch recovered");
        }
        info!(
            "Quota fetched: {} models from port {}",
            snapshot.entries.len(),
            snapshot.port.map(|p| p.to_string()).unwrap_or_default()
        );

        let (applied, selected) = transition(&self.state, |s| {
            let (next, applied) = s.apply_snapshot(snapshot.clone());
            let selected = next.selected_model.clone();
            (next, (applied, selected))
        });
        self.snapshot_tx.send_replace(snapshot);

        self.emit(CoreEvent::SnapshotUpdated);
        if let Some(model) = applied.active_model_changed {
            info!("Active model changed: {}", model);
            self.emit(CoreEvent::ActiveModelChanged { model });
        }
        if applied.selected_model_changed {
            self.emit(CoreEvent::SelectedModelChanged { model: selected });
        }
    }

    fn apply_failure(&self, error: &DiscoveryError) {
        let message = error.to_string();
        {
            let mut last = self.last_failure.lock();
            if last.as_deref() == Some(message.as_str()) {
                debug!("Quota fetch still failing: {}", message);
            } else {
                warn!("Quota fetch failed: {}", message);
                *last = Some(message.clone());
            }
        }

        transition(&self.state, |s| (s.record_failure(error), ()));
        self.emit(CoreEvent::FetchFailed {
            kind: error.kind(),
            message,
        });
    }
}
