//! Batched delivery over HTTP.

use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use bytes::Bytes;
use http_body_util::{BodyExt as _, Collected, Full};
use hyper::{
    header::{HeaderValue, CONTENT_TYPE},
    Method, Request, Uri,
};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::Serialize;
use tokio::runtime::{self, Runtime};
use tracing::trace;

use super::{Transport, TransportError};
use crate::{
    builder::BuildError,
    metric::{Labels, Metric, Payload},
    value::Value,
};

const HTTPS_PORT: u16 = 443;

#[derive(Serialize)]
struct Point<'a> {
    key: &'a str,
    tags: &'a Labels,
    resource: &'a Labels,
    value: Option<Value>,
    timestamp: u64,
}

impl<'a> Point<'a> {
    fn from_payload(payload: &'a Payload, timestamp: u64) -> Self {
        Point {
            key: &payload.key,
            tags: &payload.attributes,
            resource: &payload.resources,
            value: payload.value,
            timestamp,
        }
    }
}

#[derive(Serialize)]
struct Batch<'a> {
    points: Vec<Point<'a>>,
}

enum WallClock {
    System,
    #[cfg(test)]
    Fixed(u64),
}

impl WallClock {
    fn now_millis(&self) -> u64 {
        match self {
            WallClock::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .ok()
                .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            #[cfg(test)]
            WallClock::Fixed(millis) => *millis,
        }
    }
}

/// Sends metrics as a single batched `POST` to the collector's HTTP API.
///
/// Requests are made synchronously: the sender drives its own single-threaded Tokio runtime, so it must not be used
/// from within an asynchronous context.
pub struct HttpSender {
    endpoint: Uri,
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    runtime: Runtime,
    clock: WallClock,
}

impl HttpSender {
    /// Creates a new `HttpSender` posting to the endpoint formed from `host`, `port`, and `path`.
    ///
    /// If `host` has no `http://` or `https://` scheme, `https` is assumed for port 443 and `http` otherwise.
    ///
    /// # Errors
    ///
    /// If the resulting endpoint is not a valid URI, or the runtime backing the sender cannot be created, an error
    /// is returned.
    pub fn new(host: &str, port: u16, path: Option<&str>) -> Result<Self, BuildError> {
        let endpoint = resolve_endpoint(host, port, path);
        let endpoint = endpoint
            .parse::<Uri>()
            .map_err(|e| BuildError::InvalidEndpoint { endpoint, reason: e.to_string() })?;

        let runtime = runtime::Builder::new_current_thread().enable_all().build()?;

        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).pool_max_idle_per_host(0).build(https);

        Ok(HttpSender { endpoint, client, runtime, clock: WallClock::System })
    }

    /// Returns the endpoint batches are posted to.
    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    #[cfg(test)]
    pub(crate) fn with_fixed_time(mut self, millis: u64) -> Self {
        self.clock = WallClock::Fixed(millis);
        self
    }

    fn build_request(&self, metrics: &[&Metric]) -> Result<Request<Full<Bytes>>, TransportError> {
        let payloads = metrics.iter().map(|m| m.to_payload()).collect::<Vec<_>>();
        let points = payloads
            .iter()
            .map(|payload| Point::from_payload(payload, self.clock.now_millis()))
            .collect();
        let body = serde_json::to_vec(&Batch { points })?;

        Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| TransportError::InvalidRequest { reason: e.to_string() })
    }
}

impl Transport for HttpSender {
    fn send(&self, metrics: &[&Metric]) -> Result<(), TransportError> {
        let request = self.build_request(metrics)?;
        trace!(endpoint = %self.endpoint, points = metrics.len(), "Posting batch.");

        self.runtime.block_on(async {
            let response = self.client.request(request).await?;
            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            let body = response
                .into_body()
                .collect()
                .await
                .map(Collected::to_bytes)
                .map_err(|_| ())
                .and_then(|b| String::from_utf8(b[..].to_vec()).map_err(|_| ()))
                .unwrap_or_else(|()| String::from("<failed to read response body>"));

            Err(TransportError::Status { status, body })
        })
    }
}

impl fmt::Debug for HttpSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSender").field("endpoint", &self.endpoint).finish_non_exhaustive()
    }
}

fn resolve_endpoint(host: &str, port: u16, path: Option<&str>) -> String {
    let mut endpoint = if host.starts_with("http://") || host.starts_with("https://") {
        format!("{host}:{port}")
    } else if port == HTTPS_PORT {
        format!("https://{host}:{port}")
    } else {
        format!("http://{host}:{port}")
    };

    if let Some(path) = path {
        if !path.starts_with('/') {
            endpoint.push('/');
        }
        endpoint.push_str(path);
    }

    endpoint
}

#[cfg(test)]
mod tests {
    use hyper::StatusCode;

    use super::{resolve_endpoint, HttpSender};
    use crate::{
        builder::{BuildError, RelayBuilder},
        metric::Metric,
        transport::{test_util::serve_once, Transport, TransportError},
    };

    #[test]
    fn endpoint_scheme_inference() {
        let cases = [
            ("http://metrics.com", 8080, Some("/v1/api"), "http://metrics.com:8080/v1/api"),
            ("https://metrics.com", 8443, None, "https://metrics.com:8443"),
            ("metrics.com", 443, None, "https://metrics.com:443"),
            ("metrics.com", 80, None, "http://metrics.com:80"),
            ("127.0.0.1", 19000, Some("v1/batch"), "http://127.0.0.1:19000/v1/batch"),
        ];

        for (host, port, path, expected) in cases {
            assert_eq!(resolve_endpoint(host, port, path), expected);
        }
    }

    #[test]
    fn invalid_endpoint() {
        let result = HttpSender::new("http://bad host", 80, None);
        assert!(matches!(result, Err(BuildError::InvalidEndpoint { .. })));
    }

    #[test]
    fn posts_batch_with_renamed_fields() {
        let (port, server) = serve_once("200 OK", "");
        let sender = HttpSender::new("127.0.0.1", port, Some("/v1/api")).unwrap().with_fixed_time(1000);

        let counter = Metric::new("test", "key").with_value(2).with_resources([("host", "a")]);
        let timer = Metric::new("timer", "key").with_attributes([("unit", "ns")]).with_value(1.5);
        sender.send(&[&counter, &timer]).unwrap();

        let captured = server.join().unwrap();
        assert_eq!(captured.request_line, "POST /v1/api HTTP/1.1");
        assert_eq!(captured.header("content-type"), Some("application/json"));
        assert_eq!(
            captured.body,
            serde_json::json!({"points": [
                {"key": "key", "tags": {"what": "test"}, "resource": {"host": "a"}, "value": 2, "timestamp": 1000},
                {"key": "key", "tags": {"what": "timer", "unit": "ns"}, "resource": {}, "value": 1.5, "timestamp": 1000},
            ]})
        );
    }

    #[test]
    fn non_success_status_is_an_error() {
        let (port, server) = serve_once("503 Service Unavailable", "overloaded");
        let sender = HttpSender::new("127.0.0.1", port, None).unwrap();

        let result = sender.send_single(&Metric::new("test", "key"));
        server.join().unwrap();

        match result {
            Err(TransportError::Status { status, body }) => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn relay_flush_over_http() {
        let (port, server) = serve_once("200 OK", "");
        let sender = HttpSender::new("http://127.0.0.1", port, Some("/v1/api")).unwrap().with_fixed_time(1000);

        let mut relay = RelayBuilder::new("key").build_with_transport(sender).unwrap();
        relay.increment_one("test");
        relay.increment_one("test");
        relay.flush().unwrap();

        let captured = server.join().unwrap();
        assert_eq!(
            captured.body,
            serde_json::json!({"points": [
                {"key": "key", "tags": {"what": "test"}, "resource": {}, "value": 2, "timestamp": 1000},
            ]})
        );
    }
}
