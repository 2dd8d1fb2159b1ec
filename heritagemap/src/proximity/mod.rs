//! Nearby heritage queries
//!
//! The [`ProximityCoordinator`] turns a stream of position and radius changes
//! into nearby queries against a [`NearbyClient`], and publishes only the
//! result of the most recently issued query.
//!
//! - Triggers are debounced with a restartable timer.
//! - Position changes are ignored until the user has moved far enough from
//!   the position of the last issued query (GPS jitter).
//! - Every issued query captures a [`RequestEpoch`]; replies carrying an older
//!   epoch are discarded, so a slow reply can never overwrite a newer result.
//! - Queries without an access token are rejected before any network call.

mod client;
mod coordinator;
mod model;

pub use client::{
    decode_nearby_body, AccessTokenProvider, ApiConfig, HttpNearbyClient, NearbyClient,
    NearbyFuture, QueryError, TokenStore, DEFAULT_API_TIMEOUT_SECS,
};
pub use coordinator::{
    ProximityConfig, ProximityCoordinator, ProximityStats, DEFAULT_DEBOUNCE,
    DEFAULT_MIN_DISPLACEMENT_M, DEFAULT_RADIUS_M,
};
pub use model::{NearbyQuery, NearbySnapshot, PointOfInterest, RequestEpoch};
