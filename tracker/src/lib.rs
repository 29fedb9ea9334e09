//! Client-side synchronization engine for viewing a device's location track.
//!
//! An operator authenticates, the controller fetches the newest page of the
//! device's records (debounced, newest request wins) and the view reconciler
//! redraws the whole track on a map surface from each accepted response.

pub mod auth;
pub mod config;
pub mod console;
pub mod controller;
pub mod errors;
pub mod fetcher;
pub mod metrics;
pub mod model;
pub mod query;
pub mod validate;
pub mod view;

pub use auth::{AuthProvider, AuthSession, BearerToken, CognitoProvider, PassphraseProvider};
pub use config::SyncConfig;
pub use controller::{Command, Notice, Progress, SyncController, SyncState};
pub use errors::{AuthError, Error, FetchError, QueryError, Result};
pub use fetcher::{DebouncedFetcher, HttpTrackSource, TrackSource};
pub use model::{LatLon, RawRecord, TrackPage};
pub use query::{QueryBuilder, QueryParameters, RequestDescriptor};
pub use view::{HeadlessMap, MapSurface, MarkerHandle, ViewReconciler};
