//! Centralized error handling for the playlist sync core
//!
//! Errors are grouped by the layer that produces them:
//!
//! - **Database Errors**: SQLite operations and migrations
//! - **Repository Errors**: Channel store / playlist registry failures
//! - **Source Errors**: Playlist fetching and parsing
//!
//! Most of these never reach a caller: the sync orchestrator and the
//! fallback resolver handle them at the boundary where they occur and
//! degrade to an empty or unchanged result.

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Repository Results
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Convenience type alias for Source Results
pub type SourceResult<T> = Result<T, SourceError>;
