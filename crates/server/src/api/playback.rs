//! Playback resolution API handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use playback_core::{
    Availability, DownloadStatus, ExpectedMetadata, PlaybackRequest, ProviderError, Resolution,
    ResolveError,
};
use tracing::warn;

use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct PlaybackParams {
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub episode: Option<u32>,
    #[serde(default)]
    pub absolute_episode: Option<u32>,
    #[serde(default)]
    pub year: Option<u32>,
    /// Comma-separated title aliases
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub index: Option<i64>,
    #[serde(default)]
    pub cache_and_play: bool,
    #[serde(default)]
    pub nzb: Option<String>,
}

impl PlaybackParams {
    fn expected(&self) -> Option<ExpectedMetadata> {
        let titles: Vec<String> = self
            .title
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        let empty = titles.is_empty()
            && self.season.is_none()
            && self.episode.is_none()
            && self.absolute_episode.is_none()
            && self.year.is_none();
        if empty {
            return None;
        }

        Some(ExpectedMetadata {
            titles,
            year: self.year,
            season: self.season,
            episode: self.episode,
            absolute_episode: self.absolute_episode,
        })
    }

    pub fn into_request(self, hash: String, client_ip: Option<String>) -> PlaybackRequest {
        PlaybackRequest {
            expected: self.expected(),
            hash,
            nzb_url: self.nzb,
            filename: self.filename,
            index: self.index,
            cache_and_play: self.cache_and_play,
            client_ip,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityParams {
    /// Comma-separated content hashes
    #[serde(default)]
    pub hashes: String,
}

#[derive(Debug, Serialize)]
pub struct NotReadyResponse {
    pub status: DownloadStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub availability: Vec<Availability>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available: Vec<String>,
}

impl From<&ResolveError> for ErrorResponse {
    fn from(e: &ResolveError) -> Self {
        let available = match e {
            ResolveError::NoMatchingFile { available } => available.clone(),
            _ => Vec::new(),
        };
        Self {
            error: e.to_string(),
            retryable: e.is_retryable(),
            available,
        }
    }
}

fn error_status(e: &ResolveError) -> StatusCode {
    match e {
        ResolveError::NoMatchingFile { .. } => StatusCode::NOT_FOUND,
        ResolveError::Provider(ProviderError::NotFound(_)) => StatusCode::NOT_FOUND,
        ResolveError::Provider(e) if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
        ResolveError::Provider(_) => StatusCode::BAD_GATEWAY,
        ResolveError::LockTimeout => StatusCode::SERVICE_UNAVAILABLE,
        ResolveError::LockBackend(_) | ResolveError::Cache(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// First hop of `X-Forwarded-For`, else `X-Real-IP`, else the peer address.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/playback/{hash}
///
/// Redirect to the direct link when ready, 202 while the provider is still
/// fetching the content.
pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
    Query(params): Query<PlaybackParams>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let request = params.into_request(hash, Some(client_ip(&headers, peer)));

    match state.resolver().resolve(&request).await {
        Ok(Resolution::Ready { url, .. }) => Redirect::temporary(&url).into_response(),
        Ok(Resolution::NotReady { status }) => (
            StatusCode::ACCEPTED,
            [(header::RETRY_AFTER, "10")],
            Json(NotReadyResponse {
                status,
                message: format!("Download is {}", status.as_str()),
            }),
        )
            .into_response(),
        Err(e) => {
            warn!(hash = %request.hash, error = %e, "Playback resolution failed");
            (error_status(&e), Json(ErrorResponse::from(&e))).into_response()
        }
    }
}

/// GET /api/v1/availability?hashes=a,b
///
/// Which hashes the provider can serve immediately.
pub async fn availability(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AvailabilityParams>,
) -> Result<Json<AvailabilityResponse>, impl IntoResponse> {
    let hashes: Vec<String> = params
        .hashes
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect();

    match state.resolver().check_availability(&hashes).await {
        Ok(availability) => {
            let count = availability.len();
            Ok(Json(AvailabilityResponse {
                availability,
                count,
            }))
        }
        Err(e) => Err((error_status(&e), Json(ErrorResponse::from(&e)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_params_without_metadata_have_no_expectation() {
        let params = PlaybackParams::default();
        let request = params.into_request("abc".to_string(), None);
        assert!(request.expected.is_none());
        assert!(!request.cache_and_play);
    }

    #[test]
    fn test_params_split_title_aliases() {
        let params = PlaybackParams {
            title: Some("The Office, Office US ,".to_string()),
            season: Some(2),
            episode: Some(3),
            ..Default::default()
        };
        let expected = params.expected().unwrap();
        assert_eq!(expected.titles, vec!["The Office", "Office US"]);
        assert_eq!(expected.season, Some(2));
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let peer = SocketAddr::from(([192, 168, 1, 20], 51000));
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, peer), "192.168.1.20");

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(client_ip(&headers, peer), "10.0.0.9");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, peer), "203.0.113.7");
    }

    #[test]
    fn test_blank_forwarded_header_falls_back_to_peer() {
        let peer = SocketAddr::from(([192, 168, 1, 20], 51000));
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" "));
        assert_eq!(client_ip(&headers, peer), "192.168.1.20");
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            error_status(&ResolveError::NoMatchingFile { available: vec![] }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&ResolveError::Provider(ProviderError::Unauthorized(
                "bad".to_string()
            ))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            error_status(&ResolveError::Provider(ProviderError::RateLimited)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            error_status(&ResolveError::LockTimeout),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
