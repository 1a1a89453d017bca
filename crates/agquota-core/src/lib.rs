//! agquota-core: discover the local Antigravity language server and poll
//! its per-model quota.
//!
//! The pipeline locates the server process, recovers its CSRF token from the
//! command line, enumerates its listening ports, and probes each port with a
//! `GetUserStatus` request. Consumers use [`api::QuotaCore`] and never touch
//! the individual stages directly.

pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod process;
pub mod quota;
pub mod state;

pub use api::{CoreEvent, QuotaCore, QuotaCoreBuilder};
pub use config::Settings;
pub use error::{DiscoveryError, ErrorKind};
pub use pipeline::{CycleOutcome, DiscoveryBackend, SystemBackend};
pub use quota::{QuotaEntry, QuotaSnapshot};
