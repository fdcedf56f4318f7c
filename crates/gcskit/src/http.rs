//! HTTP transport seam.
//!
//! The filesystem never talks to `reqwest` directly; it builds [`Request`]
//! values and hands them to an [`HttpTransport`]. The production transport
//! is [`ReqwestTransport`]; tests substitute a scripted fake. Keeping the
//! seam at the request/response level (rather than wrapping individual
//! verbs) lets the fake assert on the exact wire shape of every call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::error::{Error, Result};

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Per-request timeout triple, in seconds.
///
/// `connect` bounds connection establishment, `idle` bounds the gap between
/// received bytes, and `operation` bounds the whole request. The operation
/// component is picked per request category (metadata / read / write).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeouts {
    pub connect: u64,
    pub idle: u64,
    pub operation: u64,
}

/// An API request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    /// Inclusive byte range for media downloads.
    pub range: Option<(u64, u64)>,
    pub body: Vec<u8>,
    pub timeouts: RequestTimeouts,
}

/// An API response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    /// Whether the response carries a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The body as UTF-8, lossily.
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport capable of executing one [`Request`].
///
/// Implementations return `Ok` for any HTTP response the server produced,
/// whatever its status; `Err` is reserved for transport-level failures
/// (connect errors, timeouts), reported as retriable `Unavailable`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response>;
}

/// Map a non-success HTTP status to the semantic error for `uri`.
///
/// The message embeds the raw status so upload-recovery code and operators
/// can tell the failure shapes apart.
pub fn status_to_error(status: u16, uri: &str) -> Error {
    let msg = format!("important HTTP error {status} for {uri}");
    match status {
        404 | 410 => Error::not_found(msg),
        400 => Error::invalid_argument(msg),
        401 | 403 => Error::failed_precondition(msg),
        408 | 429 => Error::unavailable(msg),
        s if s >= 500 => Error::unavailable(msg),
        _ => Error::internal(msg),
    }
}

/// Whether an HTTP status indicates a retriable failure.
pub fn is_retriable_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

/// `reqwest`-backed transport.
///
/// Redirects are disabled: the object store replies with explicit session
/// URIs and never needs them, and following one silently would bypass the
/// caller's endpoint expectations.
pub struct ReqwestTransport;

impl ReqwestTransport {
    pub fn new() -> Self {
        Self
    }

    fn client_for(timeouts: RequestTimeouts) -> Result<Client> {
        Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect))
            .read_timeout(Duration::from_secs(timeouts.idle))
            .timeout(Duration::from_secs(timeouts.operation))
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("gcskit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let url = Url::parse(&request.uri)
            .map_err(|e| Error::invalid_argument(format!("invalid URI {}: {e}", request.uri)))?;

        let client = Self::client_for(request.timeouts)?;
        let mut builder = client.request(request.method.as_reqwest(), url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some((start, end)) = request.range {
            builder = builder.header("Range", format!("bytes={start}-{end}"));
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::unavailable(format!("request to {} timed out", request.uri))
            } else {
                Error::unavailable(format!("request to {} failed: {e}", request.uri))
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::unavailable(format!("failed to read response body: {e}")))?
            .to_vec();

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_kinds() {
        assert!(status_to_error(404, "gs://b/o").is_not_found());
        assert!(status_to_error(410, "gs://b/o").is_not_found());
        assert!(status_to_error(503, "gs://b/o").is_retriable());
        assert!(status_to_error(408, "gs://b/o").is_retriable());
        assert!(matches!(
            status_to_error(400, "gs://b/o"),
            Error::InvalidArgument(_)
        ));
        assert!(matches!(
            status_to_error(403, "gs://b/o"),
            Error::FailedPrecondition(_)
        ));
    }

    #[test]
    fn status_message_names_status_and_uri() {
        let msg = format!("{}", status_to_error(410, "gs://bucket/path"));
        assert!(msg.contains("important HTTP error 410"), "got: {msg}");
        assert!(msg.contains("gs://bucket/path"), "got: {msg}");
    }

    #[test]
    fn retriable_statuses() {
        assert!(is_retriable_status(500));
        assert!(is_retriable_status(503));
        assert!(is_retriable_status(408));
        assert!(is_retriable_status(429));
        assert!(!is_retriable_status(404));
        assert!(!is_retriable_status(200));
        assert!(!is_retriable_status(308));
    }

    #[test]
    fn response_header_lookup_is_case_insensitive() {
        let resp = Response {
            status: 200,
            headers: vec![("Location".into(), "https://session".into())],
            body: Vec::new(),
        };
        assert_eq!(resp.header("location"), Some("https://session"));
        assert_eq!(resp.header("Range"), None);
    }
}
