//! Minimal HTTP/1 client over plain TCP.
//!
//! One connection per request, driven in a background task. Used for the
//! container runtime API, the chain daemon's JSON-RPC, the image catalog
//! and peer delivery, which are all plain-HTTP services on known addresses.

use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tracing::debug;

const USER_AGENT: &str = concat!("hive/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("connect to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("invalid request: {0}")]
    Build(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("reading response body failed: {0}")]
    Body(String),

    #[error("request to {0} timed out")]
    Timeout(String),
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Body as lossy UTF-8, for error messages.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Builder-style description of one request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    path: String,
    headers: Vec<(&'static str, String)>,
    body: Bytes,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// JSON body with the matching content type.
    pub fn json<T: serde::Serialize>(self, value: &T) -> Result<Self, HttpError> {
        let body = serde_json::to_vec(value).map_err(|e| HttpError::Build(e.to_string()))?;
        let mut request = self.header("content-type", "application/json");
        request.body = Bytes::from(body);
        Ok(request)
    }

    fn build(self, address: &str) -> Result<Request<Full<Bytes>>, HttpError> {
        let mut builder = Request::builder()
            .method(self.method)
            .uri(format!("http://{address}{}", self.path))
            .header("host", address)
            .header("user-agent", USER_AGENT);
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        builder
            .body(Full::new(self.body))
            .map_err(|e| HttpError::Build(e.to_string()))
    }
}

/// Send a request and return the response with its body still streaming.
pub async fn send_streaming(
    address: &str,
    request: HttpRequest,
) -> Result<Response<Incoming>, HttpError> {
    let request = request.build(address)?;
    let stream = tokio::net::TcpStream::connect(address)
        .await
        .map_err(|e| HttpError::Connect {
            address: address.to_string(),
            reason: e.to_string(),
        })?;
    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| HttpError::Connect {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "http connection closed with error");
        }
    });

    sender
        .send_request(request)
        .await
        .map_err(|e| HttpError::Request(e.to_string()))
}

/// Send a request and buffer the whole response, bounded by `timeout`.
pub async fn send(
    address: &str,
    request: HttpRequest,
    timeout: Duration,
) -> Result<HttpResponse, HttpError> {
    let exchange = async {
        let response = send_streaming(address, request).await?;
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| HttpError::Body(e.to_string()))?
            .to_bytes();
        Ok::<_, HttpError>(HttpResponse { status, body })
    };
    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| HttpError::Timeout(address.to_string()))?
}
