//! Public API layer (Facade) for agquota-core.
//!
//! [`QuotaCore`] owns the discovery pipeline and its state and exposes typed
//! query/action methods. Collaborators (status bar, model picker, CLI) use
//! this instead of operating on the pipeline or `SharedState` directly.
//!
//! # Quick Start
//!
//! ```ignore
//! use agquota_core::api::QuotaCoreBuilder;
//!
//! let core = QuotaCoreBuilder::new(settings).build()?;
//! core.start();
//!
//! let snapshot = core.latest_snapshot();
//! let mut rx = core.subscribe();
//! ```

mod actions;
mod builder;
mod core;
pub mod events;
mod queries;

pub use builder::QuotaCoreBuilder;
pub use core::QuotaCore;
pub use events::CoreEvent;
