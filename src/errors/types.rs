//! Error type definitions for the playlist sync core

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Repository layer errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Source handling errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O errors while reading a playlist body
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation was cancelled by a newer request
    #[error("Operation cancelled")]
    Cancelled,
}

/// Repository layer specific errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// SQL query execution failures
    #[error("Query failed: {query} - {message}")]
    QueryFailed { query: String, message: String },

    /// Record not found
    #[error("Record not found: {table} with {field} = {value}")]
    RecordNotFound {
        table: String,
        field: String,
        value: String,
    },

    /// Migration failures
    #[error("Migration failed: {version} - {message}")]
    MigrationFailed { version: String, message: String },
}

/// Source handling specific errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// Connect or read timeouts
    #[error("Connection timeout: {url}")]
    Timeout { url: String },

    /// Non-success status or transport failure
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// The body could not be parsed as the expected playlist format
    #[error("Parse error: {source_type} - {message}")]
    ParseError {
        source_type: String,
        message: String,
    },

    /// The body does not have the top-level shape of the expected format
    #[error("Invalid playlist format: {message}")]
    InvalidFormat { message: String },
}

impl AppError {
    /// Create a not found error for a specific resource
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl RepositoryError {
    /// Create a query failed error
    pub fn query_failed<Q: Into<String>, M: ToString>(query: Q, message: M) -> Self {
        Self::QueryFailed {
            query: query.into(),
            message: message.to_string(),
        }
    }

    /// Create a record not found error
    pub fn record_not_found<T: Into<String>, F: Into<String>, V: Into<String>>(
        table: T,
        field: F,
        value: V,
    ) -> Self {
        Self::RecordNotFound {
            table: table.into(),
            field: field.into(),
            value: value.into(),
        }
    }
}

impl SourceError {
    /// Create a timeout error
    pub fn timeout<U: Into<String>>(url: U) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Create an HTTP status error
    pub fn http<M: Into<String>>(status: u16, message: M) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse_error<S: Into<String>, M: Into<String>>(source_type: S, message: M) -> Self {
        Self::ParseError {
            source_type: source_type.into(),
            message: message.into(),
        }
    }

    /// Create an invalid format error
    pub fn invalid_format<M: Into<String>>(message: M) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        let url = e.url().map(|u| u.to_string()).unwrap_or_default();
        if e.is_timeout() {
            return Self::timeout(crate::utils::url::obfuscate_credentials(&url));
        }
        let status = e.status().map(|s| s.as_u16()).unwrap_or(0);
        Self::http(status, crate::utils::url::obfuscate_credentials(&e.to_string()))
    }
}
