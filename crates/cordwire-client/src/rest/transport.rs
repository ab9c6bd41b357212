//! HTTP request/response types and the REST transport seam.

use std::error::Error as _;
use std::io;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use tracing::debug;

use cordwire_core::error::{CordError, CordResult};
use cordwire_core::transport::BoxFuture;

use super::multipart::Multipart;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body. Multipart forms stay as a part list so a request can be
/// cloned and sent again after a reconnect.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Bytes(Vec<u8>),
    Multipart(Multipart),
}

/// One request, with `path` relative to the API base and including any query.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn json(mut self, body: &serde_json::Value) -> CordResult<Self> {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(RequestBody::Bytes(serde_json::to_vec(body)?));
        Ok(self)
    }

    /// Send a `multipart/form-data` body. The transport picks the boundary.
    pub fn multipart(mut self, form: Multipart) -> Self {
        self.headers.remove(CONTENT_TYPE);
        self.body = Some(RequestBody::Multipart(form));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header value by name, case-insensitive. Non-ASCII values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Executes REST requests over a reusable connection.
///
/// `request` returns [`CordError::ConnectionLost`] when the underlying
/// connection can no longer be used; the pipeline then closes, reopens and
/// retries.
pub trait RestTransport: Send {
    fn open(&mut self) -> CordResult<()>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
    fn request(&mut self, request: HttpRequest) -> BoxFuture<'_, CordResult<HttpResponse>>;
}

/// [`RestTransport`] backed by a pooled `reqwest::Client`.
///
/// Connection-scoped headers (authorization, user agent) are kept here and
/// applied again every time the client is rebuilt.
pub struct ReqwestTransport {
    base_url: String,
    default_headers: HeaderMap,
    timeout: Duration,
    client: Option<reqwest::Client>,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>, default_headers: HeaderMap, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_headers,
            timeout,
            client: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

impl RestTransport for ReqwestTransport {
    fn open(&mut self) -> CordResult<()> {
        let client = reqwest::Client::builder()
            .default_headers(self.default_headers.clone())
            .timeout(self.timeout)
            .build()
            .map_err(|e| CordError::Transport(format!("failed to build HTTP client: {e}")))?;
        debug!(base_url = %self.base_url, "REST transport opened");
        self.client = Some(client);
        Ok(())
    }

    fn close(&mut self) {
        if self.client.take().is_some() {
            debug!(base_url = %self.base_url, "REST transport closed");
        }
    }

    fn is_open(&self) -> bool {
        self.client.is_some()
    }

    fn request(&mut self, request: HttpRequest) -> BoxFuture<'_, CordResult<HttpResponse>> {
        Box::pin(async move {
            let client = self
                .client
                .as_ref()
                .ok_or_else(|| CordError::Transport("REST transport is not open".into()))?;

            let method = match request.method {
                Method::Get => reqwest::Method::GET,
                Method::Post => reqwest::Method::POST,
                Method::Put => reqwest::Method::PUT,
                Method::Patch => reqwest::Method::PATCH,
                Method::Delete => reqwest::Method::DELETE,
            };
            let mut builder = client
                .request(method, self.url(&request.path))
                .headers(request.headers);
            match request.body {
                Some(RequestBody::Bytes(bytes)) => builder = builder.body(bytes),
                Some(RequestBody::Multipart(form)) => builder = builder.multipart(form.to_form()?),
                None => {}
            }

            let response = builder.send().await.map_err(classify_error)?;
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(classify_error)?.to_vec();

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}

/// Map a reqwest failure to `ConnectionLost` when the pooled connection died
/// under us, so the pipeline knows a reopen may help.
fn classify_error(err: reqwest::Error) -> CordError {
    if err.is_timeout() {
        return CordError::Timeout;
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
            ) {
                return CordError::ConnectionLost(err.to_string());
            }
        }
        source = cause.source();
    }

    if err.is_connect() {
        CordError::Transport(format!("connect error: {err}"))
    } else {
        CordError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::AUTHORIZATION;

    #[test]
    fn response_headers_are_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("4"));
        let resp = HttpResponse {
            status: 200,
            headers,
            body: Vec::new(),
        };
        assert_eq!(resp.header("X-RateLimit-Remaining"), Some("4"));
        assert_eq!(resp.header("X-RATELIMIT-REMAINING"), Some("4"));
        assert_eq!(resp.header("Retry-After"), None);
    }

    #[test]
    fn json_request_sets_content_type() {
        let req = HttpRequest::new(Method::Post, "/channels/1/messages")
            .json(&serde_json::json!({"content": "hi"}))
            .unwrap();
        assert_eq!(req.headers.get("content-type").unwrap(), "application/json");
        assert_eq!(
            req.body,
            Some(RequestBody::Bytes(br#"{"content":"hi"}"#.to_vec()))
        );
    }

    #[test]
    fn multipart_request_leaves_content_type_to_the_transport() {
        let req = HttpRequest::new(Method::Post, "/channels/1/messages")
            .json(&serde_json::json!({}))
            .unwrap()
            .multipart(Multipart::new().text("payload_json", "{}"));
        assert!(req.headers.get(CONTENT_TYPE).is_none());
        assert!(matches!(req.body, Some(RequestBody::Multipart(_))));
    }

    #[test]
    fn success_range() {
        let mut resp = HttpResponse {
            status: 204,
            headers: HeaderMap::new(),
            body: Vec::new(),
        };
        assert!(resp.is_success());
        resp.status = 429;
        assert!(!resp.is_success());
    }

    #[test]
    fn reqwest_transport_open_close() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bot t"));
        let mut transport =
            ReqwestTransport::new("https://api.test/v6/", headers, Duration::from_secs(5));
        assert_eq!(transport.base_url(), "https://api.test/v6");
        assert_eq!(transport.url("/gateway"), "https://api.test/v6/gateway");
        assert!(!transport.is_open());
        transport.open().unwrap();
        assert!(transport.is_open());
        transport.close();
        assert!(!transport.is_open());
    }
}
