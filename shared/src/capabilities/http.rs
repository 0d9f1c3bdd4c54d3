//! HTTP/JSON binding for the trip API on top of `crux_http`.
//!
//! [`request`] turns an [`ApiCall`] into a `crux_http` request the shell
//! executes. The `read_*` helpers turn the shell's answer back into the
//! typed results carried by [`Event`]s.

use std::fmt;
use std::time::Duration;

use crux_http::http::StatusCode;
use crux_http::{Http, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use url::Url;

use super::trip_api::{ApiCall, ApiError};
use crate::config::ConfigError;
use crate::coordinator::RequestId;
use crate::event::Event;
use crate::trip::Trip;

pub type HttpCapability = Http<Event>;

pub const MAX_URL_LENGTH: usize = 2048;
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/";
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";
/// Shells apply this as the transport timeout and report expiry as
/// `crux_http::Error::Timeout`.
pub const TIMEOUT_HEADER: &str = "X-Timeout-Ms";

/// Root of the trip API, e.g. `https://school.example.com/` or
/// `https://example.com/tenant-a/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiBaseUrl {
    url: Url,
}

impl ApiBaseUrl {
    pub fn new(url: impl AsRef<str>) -> Result<Self, ConfigError> {
        let raw = url.as_ref().trim();
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: truncate_url(raw),
            reason,
        };

        if raw.is_empty() {
            return Err(invalid("URL cannot be empty".to_string()));
        }

        if raw.len() > MAX_URL_LENGTH {
            return Err(invalid(format!(
                "URL exceeds maximum length of {MAX_URL_LENGTH} bytes"
            )));
        }

        let parsed = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;

        let scheme = parsed.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(invalid(format!(
                "invalid scheme '{scheme}', only 'http' and 'https' are allowed"
            )));
        }

        if parsed.host_str().is_none() {
            return Err(invalid("URL must have a host".to_string()));
        }

        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(invalid("credentials in URL are not allowed".to_string()));
        }

        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(invalid("base URL cannot carry a query or fragment".to_string()));
        }

        Ok(Self { url: parsed })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Full URL of `call`. Identifiers are percent-encoded as path segments.
    pub fn endpoint(&self, call: &ApiCall) -> Url {
        match call {
            ApiCall::ListRoutes => self.join(&["api", "bus", "routes"]),
            ApiCall::GetActiveTrip { route_id } => {
                self.join(&["api", "bus", "routes", route_id.as_str(), "active-trip"])
            }
            ApiCall::GetTrip { trip_id } => self.join(&["api", "bus", "trips", trip_id.as_str()]),
            ApiCall::SetEntryStatus {
                trip_id,
                student_id,
                ..
            } => self.join(&[
                "api",
                "bus",
                "trips",
                trip_id.as_str(),
                "students",
                student_id.as_str(),
                "status",
            ]),
            ApiCall::StartTrip { trip_id } => {
                self.join(&["api", "bus", "trips", trip_id.as_str(), "start"])
            }
            ApiCall::EndTrip { trip_id } => self.join(&["api", "bus", "trips", trip_id.as_str(), "end"]),
        }
    }

    fn join(&self, segments: &[&str]) -> Url {
        let mut url = self.url.clone();
        // Validated http(s) URLs with a host always accept path segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

impl Default for ApiBaseUrl {
    fn default() -> Self {
        Self {
            url: Url::parse(DEFAULT_API_BASE_URL).expect("default API base URL is valid"),
        }
    }
}

impl TryFrom<String> for ApiBaseUrl {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ApiBaseUrl> for String {
    fn from(value: ApiBaseUrl) -> Self {
        value.url.into()
    }
}

impl fmt::Display for ApiBaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn truncate_url(url: &str) -> String {
    if url.len() <= 100 {
        url.to_string()
    } else {
        let mut end = 100;
        while !url.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &url[..end])
    }
}

/// Builds the request for `call`. The caller picks the expected body and
/// sends it.
pub fn request(
    http: &HttpCapability,
    base: &ApiBaseUrl,
    request_id: &RequestId,
    call: &ApiCall,
    timeout: Duration,
) -> RequestBuilder<Event> {
    let url = base.endpoint(call);
    let builder = if call.is_mutation() {
        http.post(url.as_str())
    } else {
        http.get(url.as_str())
    };

    let builder = builder
        .header("Accept", "application/json")
        .header(REQUEST_ID_HEADER, request_id.to_string())
        .header(TIMEOUT_HEADER, timeout_ms(timeout).to_string());

    match call {
        ApiCall::SetEntryStatus { status, .. } => builder
            .body_string(serde_json::json!({ "status": status.as_str() }).to_string())
            .header("Content-Type", "application/json"),
        _ => builder,
    }
}

/// Body of a successful JSON response.
pub fn read_json<T>(result: crux_http::Result<Response<T>>, timeout: Duration) -> Result<T, ApiError> {
    let mut response = result.map_err(|e| api_error(e, timeout))?;
    response.take_body().ok_or_else(|| ApiError::InvalidResponse {
        reason: "response had no body".to_string(),
    })
}

/// `GET .../active-trip` answers 404 when the route has no trip today.
pub fn read_active_trip(
    result: crux_http::Result<Response<Trip>>,
    timeout: Duration,
) -> Result<Option<Trip>, ApiError> {
    match result {
        Err(crux_http::Error::Http(e)) if e.code == StatusCode::NotFound => Ok(None),
        other => read_json(other, timeout).map(Some),
    }
}

/// Mutations only need a 2xx; the body is ignored.
pub fn read_ack(
    result: crux_http::Result<Response<Vec<u8>>>,
    timeout: Duration,
) -> Result<(), ApiError> {
    result.map(|_| ()).map_err(|e| api_error(e, timeout))
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

fn api_error(error: crux_http::Error, timeout: Duration) -> ApiError {
    match error {
        crux_http::Error::Http(e) => {
            let status = u16::from(e.code);
            if e.code == StatusCode::NotFound {
                return ApiError::NotFound;
            }
            let message = e
                .body
                .as_deref()
                .and_then(|body| serde_json::from_slice::<ApiErrorBody>(body).ok())
                .map(|b| b.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("HTTP error: {status}"));
            ApiError::Rejected { status, message }
        }
        crux_http::Error::Timeout => ApiError::Timeout {
            timeout_ms: timeout_ms(timeout),
        },
        crux_http::Error::Io(message) => ApiError::Network { message },
        crux_http::Error::Json(message) => ApiError::InvalidResponse {
            reason: format!("failed to parse JSON: {message}"),
        },
        crux_http::Error::Url(message) => ApiError::InvalidResponse {
            reason: format!("invalid URL: {message}"),
        },
    }
}

fn timeout_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}
