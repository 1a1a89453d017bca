//! State-changing actions on [`QuotaCore`].

use tracing::{debug, info};

use super::core::QuotaCore;
use super::events::CoreEvent;
use crate::pipeline::CycleOutcome;
use crate::state::transition;

impl QuotaCore {
    /// Manual model override.
    ///
    /// Sticks until the server reports a different active model.
    pub fn set_selected_model(&self, model: impl Into<String>) {
        let model = model.into();
        info!("Selected model set to {:?}", model);
        transition(self.state(), |s| (s.select_model(model.clone()), ()));
        self.pipeline()
            .emit(CoreEvent::SelectedModelChanged { model });
    }

    /// Ask the poller for a cycle now.
    ///
    /// Returns `false` when the request is dropped: the poller is not
    /// running, or a cycle is already in flight. Dropped requests are not
    /// remembered.
    pub fn trigger_refresh(&self) -> bool {
        if !self.is_running() {
            debug!("Refresh ignored: poller not running");
            return false;
        }
        if self.pipeline().is_in_flight() {
            debug!("Refresh ignored: cycle in flight");
            return false;
        }
        self.refresh_signal().notify_waiters();
        true
    }

    /// Run one cycle on the caller's task and return its outcome.
    ///
    /// Shares the in-flight guard with the poller, so it reports
    /// [`CycleOutcome::Skipped`] instead of overlapping a running cycle.
    pub async fn refresh_now(&self) -> CycleOutcome {
        self.pipeline().run_once().await
    }
}
