//! Tournament bracket core: bracket generation (single and double
//! elimination, with byes), the per-match state machine, winner/loser
//! advancement, and the no-show and health monitors. The HTTP layer,
//! persistence engine, and notification delivery are external collaborators;
//! this crate exposes [`TournamentService`] as the single entry point.

pub mod advance;
pub mod bracket;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod monitor;
pub mod notify;
pub mod service;
pub mod store;
pub mod types;

pub use config::{load_config, CoreConfig};
pub use error::{CoreError, CoreResult};
pub use notify::{LogNotifier, Notification, NotificationPriority, Notifier, RecipientType};
pub use service::{Actor, AdminOps, Role, TournamentService};
pub use store::TournamentStore;
pub use types::*;

use tracing_subscriber::EnvFilter;

/// Install the default tracing subscriber (stderr, `RUST_LOG`-driven filter,
/// `info` fallback). Call once from the embedding application.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
