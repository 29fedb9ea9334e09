//! Device track API: serves stored GPS samples newest-first to the tracker.

pub mod errors;
pub mod metrics;
pub mod model;
pub mod rest;
pub mod simulate;
pub mod store;

pub use errors::{Error, Result};
pub use model::{GpsPayload, QueryResponse, SortOrder, StoredRecord};
pub use rest::create_router;
pub use store::TrackStore;
