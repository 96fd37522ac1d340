//! Playlist synchronization
//!
//! [`SyncOrchestrator`] owns the fetch, parse and persist cycle, startup
//! reconciliation and the background pre-sync of fallback sources.
//! Progress is published through [`SyncStateManager`].

pub mod defaults;
pub mod startup;
pub mod state_manager;
pub mod sync;

pub use defaults::default_playlists;
pub use startup::{PresyncReport, StartupReport};
pub use state_manager::{SyncProgress, SyncState, SyncStateManager};
pub use sync::{SyncOrchestrator, SyncOutcome, SyncTicket};
