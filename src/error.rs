// ⚠️ Error Taxonomy - typed failures that cross component boundaries
//
// Store and application plumbing uses anyhow (see db.rs); the two kinds of
// failure that callers must tell apart get their own types here.

use thiserror::Error;

// ============================================================================
// TRANSPORT ERRORS (upstream feed + country lookup)
// ============================================================================

/// Failure talking to an upstream collaborator.
///
/// Never surfaced to API callers: ingestion logs it and skips the affected
/// unit of work (the whole cycle for a fetch, one address for a lookup).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },

    #[error("{url} returned an empty body")]
    EmptyBody { url: String },
}

// ============================================================================
// VALIDATION ERRORS (query parameters)
// ============================================================================

/// Malformed query input. Surfaced to the caller as a client error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid starttime format: {0}")]
    StartTime(String),

    #[error("Invalid endtime format: {0}")]
    EndTime(String),

    #[error("Invalid pagination parameter: {0}")]
    Count(String),
}
