// Exit Watch - Core Library
// Exit-node ingestion, allow-list aware queries, shared by the CLI, the API server, and tests

pub mod allowlist;
pub mod config;
pub mod db;
pub mod error;
pub mod ingestion;
pub mod query;
pub mod scheduler;
pub mod sources;
pub mod store;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use allowlist::AllowlistManager;
pub use config::Config;
pub use db::{setup_database, SqliteStore};
pub use error::{TransportError, ValidationError};
pub use ingestion::{CycleReport, IngestionPipeline};
pub use query::{QueryEngine, QueryFilter, QueryParams};
pub use scheduler::PeriodicTask;
pub use sources::{CountryLookup, HttpFeed, IpInfoLookup, SourceFetcher};
pub use store::{
    AddressRecord, AddressStore, AllowStore, InsertOutcome, MemoryStore, NewAddressRecord,
    RecordFilter,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the tracing subscriber used by both binaries.
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,exit_watch=debug".into()),
        )
        .init();
}
