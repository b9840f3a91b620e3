//! Forward-auth HTTP boundary.
//!
//! The reverse proxy sends every gated request here first: the original
//! path arrives in `X-Forwarded-Uri`, the original host in
//! `X-Forwarded-Host`, and the bearer token in `X-Token` or a `token`
//! query parameter of the forwarded URI. A grant answers `204 No Content`
//! with identity headers; every rejection answers a uniform
//! `401 Unauthorized` with no body, so the caller cannot distinguish a
//! malformed token from an unknown or out-of-scope one.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, TextEncoder};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::metrics;
use crate::validator::{Identity, Validator};

/// Header carrying the forwarded request URI.
pub const FORWARDED_URI_HEADER: &str = "x-forwarded-uri";
/// Header carrying the forwarded request host.
pub const FORWARDED_HOST_HEADER: &str = "x-forwarded-host";
/// Header carrying the bearer token.
pub const TOKEN_HEADER: &str = "x-token";
/// Query parameter carrying the bearer token.
pub const TOKEN_QUERY: &str = "token";
/// Response header carrying the resolved user.
pub const AUTH_USER_HEADER: &str = "x-user";
/// Response header carrying the public-identifier hint.
pub const AUTH_TOKEN_HINT_HEADER: &str = "x-token-hint";

/// Build the auth router: `/health`, `/metrics`, and the auth handler on
/// every other method and path.
pub fn router(validator: Arc<Validator>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .fallback(authorize)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(validator)
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn metrics_text() -> Response {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buf) {
        warn!(error = %err, "failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], buf).into_response()
}

enum Denial {
    BadForwardedUri(String),
    Validation(ValidationError),
}

impl Denial {
    const fn kind(&self) -> &'static str {
        match self {
            Self::BadForwardedUri(_) => "malformed_request",
            Self::Validation(err) => err.kind(),
        }
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadForwardedUri(reason) => write!(f, "bad forwarded uri: {reason}"),
            Self::Validation(err) => err.fmt(f),
        }
    }
}

async fn authorize(State(validator): State<Arc<Validator>>, headers: HeaderMap) -> Response {
    let correlation_id = Uuid::new_v4();
    match check(&validator, &headers).await {
        Ok(identity) => grant(&identity),
        Err(denial) => {
            if matches!(denial, Denial::BadForwardedUri(_)) {
                metrics::record_validation(denial.kind());
            }
            debug!(
                correlation_id = %correlation_id,
                cause = denial.kind(),
                error = %denial,
                "request rejected"
            );
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

async fn check(validator: &Validator, headers: &HeaderMap) -> Result<Identity, Denial> {
    let (path, query) = forwarded_uri(headers)?;
    let host = forwarded_host(headers);
    let token = bearer_token(headers, query.as_deref());

    validator
        .validate_instrumented(&host, &path, &token)
        .await
        .map_err(Denial::Validation)
}

fn grant(identity: &Identity) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();

    match HeaderValue::from_str(&identity.user) {
        Ok(value) => {
            headers.insert(HeaderName::from_static(AUTH_USER_HEADER), value);
        }
        Err(_) => warn!(key_id = %identity.key_id, "user name is not a valid header value"),
    }
    if let Ok(value) = HeaderValue::from_str(&identity.key_id.to_string()) {
        headers.insert(HeaderName::from_static(AUTH_TOKEN_HINT_HEADER), value);
    }

    for header in &identity.headers {
        match (
            HeaderName::from_bytes(header.name.as_bytes()),
            HeaderValue::from_str(&header.value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(
                key_id = %identity.key_id,
                name = %header.name,
                "skipping invalid configured header"
            ),
        }
    }

    response
}

// Path and query of the original request, from the forwarded-URI header.
// An absent header behaves like an empty path, matching nothing but a
// match-any pattern only when the token itself is valid.
fn forwarded_uri(headers: &HeaderMap) -> Result<(String, Option<String>), Denial> {
    let Some(raw) = headers.get(FORWARDED_URI_HEADER) else {
        return Ok((String::new(), None));
    };
    let raw = raw
        .to_str()
        .map_err(|e| Denial::BadForwardedUri(e.to_string()))?;
    if raw.is_empty() {
        return Ok((String::new(), None));
    }
    let uri: Uri = raw
        .parse()
        .map_err(|e: axum::http::uri::InvalidUri| Denial::BadForwardedUri(e.to_string()))?;
    Ok((
        uri.path().to_string(),
        uri.query().map(ToString::to_string),
    ))
}

fn forwarded_host(headers: &HeaderMap) -> String {
    for name in [FORWARDED_HOST_HEADER, "host"] {
        if let Some(value) = headers.get(name) {
            if let Ok(host) = value.to_str() {
                if !host.is_empty() {
                    return host.to_string();
                }
            }
        }
    }
    String::new()
}

fn bearer_token(headers: &HeaderMap, query: Option<&str>) -> String {
    if let Some(value) = headers.get(TOKEN_HEADER) {
        if let Ok(token) = value.to_str() {
            if !token.is_empty() {
                return token.to_string();
            }
        }
    }
    query
        .and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(name, _)| name == TOKEN_QUERY)
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_default()
}
