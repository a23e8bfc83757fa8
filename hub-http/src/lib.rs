//! Shared outbound HTTP plumbing for hub services.
//!
//! Every component that calls out (registry, agent dispatch, integration
//! tools) goes through the same hyper client so connection pooling and TLS
//! configuration live in one place.

#![warn(missing_docs, clippy::pedantic)]

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hyper::body::to_bytes;
use hyper::client::HttpConnector;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{Body, Client, Method, Request, StatusCode, Uri};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use thiserror::Error;
use tokio::time::timeout;
use webpki_roots::TLS_SERVER_ROOTS;

/// Pooled hyper client shared across hub components.
pub type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Result alias for outbound HTTP operations.
pub type HttpResult<T> = Result<T, HttpError>;

/// Errors surfaced by outbound HTTP calls.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The request target could not be parsed.
    #[error("invalid request uri `{uri}`: {reason}")]
    InvalidUri {
        /// The offending URI string.
        uri: String,
        /// Human-readable parse failure.
        reason: String,
    },

    /// The request could not be constructed.
    #[error("failed to build request: {reason}")]
    Build {
        /// Human-readable reason.
        reason: String,
    },

    /// Transport-level failure (connect, TLS, reset).
    #[error("transport error: {reason}")]
    Transport {
        /// Human-readable reason.
        reason: String,
    },

    /// The call exceeded its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The response body could not be read.
    #[error("failed to read response body: {reason}")]
    Body {
        /// Human-readable reason.
        reason: String,
    },
}

impl HttpError {
    /// Convenience constructor for transport failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }
}

/// Builds the shared HTTPS-capable client.
///
/// Plain `http://` endpoints are accepted too; in-cluster agents are
/// typically reached without TLS.
#[must_use]
pub fn build_client() -> HyperClient {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnector::from((http, Arc::new(config)));
    Client::builder().build::<_, Body>(connector)
}

/// A JSON request ready to be sent through [`send`].
#[derive(Debug)]
pub struct JsonRequest {
    method: Method,
    uri: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Option<Vec<u8>>,
}

impl JsonRequest {
    /// Starts a request for the given method and target.
    #[must_use]
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Build`] when the name or value is not a legal
    /// header.
    pub fn header(mut self, name: &str, value: &str) -> HttpResult<Self> {
        let name = HeaderName::try_from(name).map_err(|err| HttpError::Build {
            reason: format!("invalid header name `{name}`: {err}"),
        })?;
        let value = HeaderValue::try_from(value).map_err(|err| HttpError::Build {
            reason: format!("invalid header value: {err}"),
        })?;
        self.headers.push((name, value));
        Ok(self)
    }

    /// Attaches a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Build`] when the value cannot be encoded.
    pub fn json(mut self, value: &serde_json::Value) -> HttpResult<Self> {
        let body = serde_json::to_vec(value).map_err(|err| HttpError::Build {
            reason: format!("failed to encode JSON body: {err}"),
        })?;
        self.body = Some(body);
        Ok(self)
    }

    /// Attaches a raw body with the supplied content type.
    #[must_use]
    pub fn bytes(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    fn into_hyper(self) -> HttpResult<Request<Body>> {
        let uri: Uri = self.uri.parse().map_err(|err| HttpError::InvalidUri {
            uri: self.uri.clone(),
            reason: format!("{err}"),
        })?;

        let mut builder = Request::builder().method(self.method).uri(uri);
        let has_json_body = self.body.is_some();
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        if has_json_body
            && !builder
                .headers_ref()
                .is_some_and(|headers| headers.contains_key(CONTENT_TYPE))
        {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }

        let body = self.body.map_or_else(Body::empty, Body::from);
        builder.body(body).map_err(|err| HttpError::Build {
            reason: format!("{err}"),
        })
    }
}

/// Sends a request and collects the response within the deadline.
///
/// # Errors
///
/// Returns [`HttpError`] on build, transport, timeout, or body-read
/// failures. Non-2xx statuses are returned to the caller for mapping into
/// component-specific errors.
pub async fn send(
    client: &HyperClient,
    request: JsonRequest,
    deadline: Duration,
) -> HttpResult<(StatusCode, Bytes)> {
    let request = request.into_hyper()?;

    let response = timeout(deadline, client.request(request))
        .await
        .map_err(|_| HttpError::Timeout(deadline))?
        .map_err(|err| HttpError::transport(format!("{err}")))?;

    let status = response.status();
    let bytes = to_bytes(response.into_body())
        .await
        .map_err(|err| HttpError::Body {
            reason: format!("{err}"),
        })?;

    Ok((status, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_json_request_with_content_type() {
        let request = JsonRequest::new(Method::POST, "http://example.local/run")
            .header("x-tenant-id", "t1")
            .unwrap()
            .json(&serde_json::json!({"k": "v"}))
            .unwrap()
            .into_hyper()
            .unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.headers().get("x-tenant-id").unwrap(), "t1");
        assert_eq!(
            request.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn rejects_invalid_uri() {
        let err = JsonRequest::new(Method::GET, "not a uri")
            .into_hyper()
            .expect_err("uri must fail");
        assert!(matches!(err, HttpError::InvalidUri { .. }));
    }

    #[tokio::test]
    async fn surfaces_connect_failures_as_transport() {
        let client = build_client();
        // Port 9 (discard) is almost never listening.
        let err = send(
            &client,
            JsonRequest::new(Method::GET, "http://127.0.0.1:9/"),
            Duration::from_millis(500),
        )
        .await
        .expect_err("connect must fail");
        assert!(matches!(
            err,
            HttpError::Transport { .. } | HttpError::Timeout(_)
        ));
    }
}
