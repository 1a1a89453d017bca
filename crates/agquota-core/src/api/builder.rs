//! Builder for constructing a [`QuotaCore`] instance.
//!
//! ```ignore
//! let core = QuotaCoreBuilder::new(settings)
//!     .with_state(state)
//!     .with_backend(backend)
//!     .build()?;
//! ```

use anyhow::Result;
use std::sync::Arc;

use crate::config::Settings;
use crate::pipeline::{DiscoveryBackend, SystemBackend};
use crate::state::{DiscoveryState, SharedState};

use super::core::QuotaCore;

/// Builder for constructing a [`QuotaCore`] Facade instance
pub struct QuotaCoreBuilder {
    settings: Arc<Settings>,
    state: Option<SharedState>,
    backend: Option<Arc<dyn DiscoveryBackend>>,
}

impl QuotaCoreBuilder {
    /// Create a new builder with the given settings
    pub fn new(settings: Settings) -> Self {
        Self::from_shared_settings(Arc::new(settings))
    }

    /// Create a new builder from an already-shared settings
    pub fn from_shared_settings(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            state: None,
            backend: None,
        }
    }

    /// Use an existing shared state instead of creating a new one
    pub fn with_state(mut self, state: SharedState) -> Self {
        self.state = Some(state);
        self
    }

    /// Replace the system backend (process inspection + HTTP)
    pub fn with_backend(mut self, backend: Arc<dyn DiscoveryBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Build the `QuotaCore` instance
    ///
    /// Settings are validated first, so intervals and timeouts are never
    /// below their minimums. If no state was provided, a fresh state
    /// selecting `settings.default_model` is created. If no backend was
    /// provided, the [`SystemBackend`] for the current platform is used.
    pub fn build(self) -> Result<QuotaCore> {
        let mut settings = Arc::unwrap_or_clone(self.settings);
        settings.validate();
        let settings = Arc::new(settings);

        let state = self
            .state
            .unwrap_or_else(|| DiscoveryState::shared(settings.default_model.clone()));

        let backend = match self.backend {
            Some(backend) => backend,
            None => Arc::new(SystemBackend::new(&settings)?),
        };

        Ok(QuotaCore::new(settings, backend, state))
    }
}
