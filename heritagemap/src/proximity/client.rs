//! Nearby endpoint client.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use super::model::{NearbyQuery, PointOfInterest};

/// Default request timeout for the nearby endpoint.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 10;

/// Errors from issuing a nearby query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// No access token; the query was rejected before any network call.
    #[error("no authentication context")]
    NoAuthContext,

    /// Connection, TLS or timeout failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("HTTP {status} from nearby endpoint")]
    Status { status: u16 },

    /// The body was not a list of points.
    #[error("invalid nearby response: {0}")]
    Decode(String),

    /// The client could not be constructed.
    #[error("invalid API configuration: {0}")]
    InvalidConfig(String),
}

/// Boxed future returned by [`NearbyClient::nearby`].
pub type NearbyFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<PointOfInterest>, QueryError>> + Send + 'a>>;

/// Remote "nearby" query.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock clients in tests.
pub trait NearbyClient: Send + Sync + 'static {
    fn nearby<'a>(&'a self, query: &'a NearbyQuery, access_token: &'a str) -> NearbyFuture<'a>;
}

/// Source of the current access token.
pub trait AccessTokenProvider: Send + Sync + 'static {
    /// Current token, or `None` when signed out.
    fn access_token(&self) -> Option<String>;
}

/// In-memory token holder. Session storage is someone else's job; the host
/// pushes the token in after sign-in and clears it on sign-out.
#[derive(Debug, Default)]
pub struct TokenStore {
    token: RwLock<Option<String>>,
}

impl TokenStore {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    pub fn set(&self, token: Option<String>) {
        *self.token.write() = token;
    }
}

impl AccessTokenProvider for TokenStore {
    fn access_token(&self) -> Option<String> {
        self.token.read().clone().filter(|t| !t.is_empty())
    }
}

/// Nearby endpoint settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    /// Base URL; `heritages/nearby` is resolved against it.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api/".to_string(),
            timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
        }
    }
}

/// The endpoint returns either a bare array or `{"heritages": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum NearbyBody {
    List(Vec<PointOfInterest>),
    Wrapped { heritages: Vec<PointOfInterest> },
}

impl NearbyBody {
    fn into_points(self) -> Vec<PointOfInterest> {
        match self {
            NearbyBody::List(points) | NearbyBody::Wrapped { heritages: points } => points,
        }
    }
}

/// Decode a nearby response body.
pub fn decode_nearby_body(body: &[u8]) -> Result<Vec<PointOfInterest>, QueryError> {
    serde_json::from_slice::<NearbyBody>(body)
        .map(NearbyBody::into_points)
        .map_err(|e| QueryError::Decode(e.to_string()))
}

/// Real client implementation using reqwest.
#[derive(Debug, Clone)]
pub struct HttpNearbyClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpNearbyClient {
    pub fn new(config: &ApiConfig) -> Result<Self, QueryError> {
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base)
            .and_then(|u| u.join("heritages/nearby"))
            .map_err(|e| QueryError::InvalidConfig(format!("base_url '{}': {}", base, e)))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| QueryError::InvalidConfig(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    /// Full URL for a query.
    pub fn query_url(&self, query: &NearbyQuery) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("latitude", &query.position.latitude.to_string())
            .append_pair("longitude", &query.position.longitude.to_string())
            .append_pair("radius", &query.radius_m.to_string());
        url
    }
}

impl NearbyClient for HttpNearbyClient {
    fn nearby<'a>(&'a self, query: &'a NearbyQuery, access_token: &'a str) -> NearbyFuture<'a> {
        Box::pin(async move {
            let url = self.query_url(query);
            let response = self
                .client
                .get(url)
                .bearer_auth(access_token)
                .send()
                .await
                .map_err(|e| QueryError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(QueryError::Status {
                    status: status.as_u16(),
                });
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| QueryError::Transport(format!("failed to read response: {}", e)))?;

            decode_nearby_body(&body)
        })
    }
}
