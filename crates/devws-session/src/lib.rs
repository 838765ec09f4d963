//! Up session orchestration.
//!
//! Drives a workspace session end to end: resolve a client, take the
//! session lock, check provider freshness, run the backend session,
//! persist the result, release the lock and fire post actions.

pub mod freshness;
pub mod orchestrator;
pub mod post;
pub mod signals;

pub use freshness::{FreshnessOutcome, ProviderUpdater, ProviderVersions, check_provider_freshness};
pub use orchestrator::{ClientResolver, SessionError, SessionOrchestrator};
pub use post::{NoPostActions, PostActions, run_post_actions};
pub use signals::{SignalAction, SignalPolicy};
