//! Repository pattern implementation for data access
//!
//! The sync core talks to storage only through the traits in [`traits`];
//! the SQLite implementations here are the production backing.

pub mod channel;
pub mod playlist;
pub mod preferences;
pub mod traits;

pub use channel::SqliteChannelStore;
pub use playlist::SqlitePlaylistRegistry;
pub use preferences::SqlitePreferenceStore;
pub use traits::*;
