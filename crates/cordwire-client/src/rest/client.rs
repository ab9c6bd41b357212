//! The REST request pipeline.
//!
//! Every call goes through the same steps: admission by the rate limiter,
//! execution on the shared transport (reopening it if the connection died),
//! quota bookkeeping from the response headers, 429 handling, and
//! classification of error responses.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time;
use tracing::{debug, trace, warn};

use cordwire_core::error::{CordError, CordResult, EntityKind, LimitKind};

use super::route::route_key;
use super::transport::{HttpRequest, HttpResponse, ReqwestTransport, RestTransport};
use crate::config::RestConfig;
use crate::ratelimit::RateLimiter;

pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_RESET: &str = "X-RateLimit-Reset";

/// Wait applied to a 429 that carries no usable retry hint.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

struct RestInner {
    transport: Box<dyn RestTransport>,
    limiter: RateLimiter,
}

/// REST client. Calls from any task are serialized through one lock that is
/// held for the whole request, rate-limit waits included.
pub struct RestClient {
    config: RestConfig,
    inner: Mutex<RestInner>,
}

impl RestClient {
    /// Client over HTTPS with the token sent as a connection-scoped
    /// `Authorization` header.
    ///
    /// Fails with [`CordError::Config`] if the token or user agent cannot be
    /// sent as a header value.
    pub fn new(token: &str, config: RestConfig) -> CordResult<Self> {
        let mut headers = HeaderMap::new();
        let mut authorization = HeaderValue::from_str(&config.token_kind.authorization(token))
            .map_err(|e| CordError::Config(format!("invalid token: {e}")))?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| CordError::Config(format!("invalid user agent: {e}")))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let transport = ReqwestTransport::new(
            config.base_url.clone(),
            headers,
            Duration::from_secs(config.timeout_secs),
        );
        Ok(Self::with_transport(config, Box::new(transport)))
    }

    pub fn with_transport(config: RestConfig, transport: Box<dyn RestTransport>) -> Self {
        let limiter = RateLimiter::new(config.ratelimit_cache_size);
        Self::with_parts(config, transport, limiter)
    }

    pub fn with_parts(config: RestConfig, transport: Box<dyn RestTransport>, limiter: RateLimiter) -> Self {
        Self {
            config,
            inner: Mutex::new(RestInner { transport, limiter }),
        }
    }

    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    /// Execute a request and return its JSON body (`Null` for an empty 2xx).
    pub async fn request(&self, request: HttpRequest) -> CordResult<Value> {
        let route = route_key(request.method, &request.path);
        let mut inner = self.inner.lock().await;

        loop {
            if self.config.ratelimit_prediction {
                inner.limiter.acquire(&route, time::sleep).await;
            }

            debug!(method = %request.method, path = %request.path, "sending REST request");
            let response = inner.send(&request, &self.config).await?;
            trace!(status = response.status, route = %route, "REST response");

            if self.config.ratelimit_prediction {
                if let Some((remaining, total, reset_at)) = quota_headers(&response) {
                    inner.limiter.refresh(&route, remaining, total, reset_at);
                }
            }

            if response.status == 429 {
                let retry_after = retry_after(&response);
                if !self.config.retry_on_quota {
                    return Err(CordError::QuotaExceeded { route, retry_after });
                }
                warn!(route = %route, ?retry_after, "rate limited by server, retrying");
                time::sleep(retry_after).await;
                continue;
            }

            return classify(response);
        }
    }
}

impl RestInner {
    /// Send on the transport, reopening it and retrying when the connection
    /// was lost mid-request.
    async fn send(&mut self, request: &HttpRequest, config: &RestConfig) -> CordResult<HttpResponse> {
        let mut attempt = 0;
        loop {
            if !self.transport.is_open() {
                self.transport.open()?;
            }

            match self.transport.request(request.clone()).await {
                Err(e) if e.is_connection_lost() && attempt < config.max_connection_retries => {
                    attempt += 1;
                    let delay = config.connection_retry_backoff(attempt);
                    warn!(attempt, ?delay, error = %e, "REST connection lost, reopening");
                    self.transport.close();
                    time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

/// Quota from the three rate-limit headers, when all are present and valid.
fn quota_headers(response: &HttpResponse) -> Option<(u32, u32, SystemTime)> {
    let remaining = response.header(HEADER_REMAINING)?.trim().parse().ok()?;
    let total = response.header(HEADER_LIMIT)?.trim().parse().ok()?;
    let reset: f64 = response.header(HEADER_RESET)?.trim().parse().ok()?;
    if !reset.is_finite() || reset < 0.0 {
        return None;
    }
    Some((remaining, total, UNIX_EPOCH + Duration::from_secs_f64(reset)))
}

/// Wait requested by a 429: body `retry_after`, then the `Retry-After` header.
fn retry_after(response: &HttpResponse) -> Duration {
    let from_body = serde_json::from_slice::<Value>(&response.body)
        .ok()
        .and_then(|body| body.get("retry_after").and_then(Value::as_f64));
    let from_header = || {
        response
            .header("Retry-After")
            .and_then(|v| v.trim().parse::<f64>().ok())
    };
    from_body
        .or_else(from_header)
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

/// Turn a final response into its JSON body or a typed error.
fn classify(response: HttpResponse) -> CordResult<Value> {
    if response.is_success() {
        if is_blank(&response.body) {
            return Ok(Value::Null);
        }
        return Ok(serde_json::from_slice(&response.body)?);
    }

    let status = response.status;
    let body: Value = serde_json::from_slice(&response.body).unwrap_or(Value::Null);
    let code = body.get("code").and_then(Value::as_i64);
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string);

    if let (Some(code), Some(message)) = (code, message.clone()) {
        match code / 10000 {
            1 => {
                return Err(CordError::UnknownEntity {
                    entity: EntityKind::from_code(code),
                    code,
                    message,
                })
            }
            3 => {
                return Err(CordError::LimitReached {
                    limit: LimitKind::from_code(code),
                    code,
                    message,
                })
            }
            _ => {}
        }
    }

    if message.is_none() {
        if let Some((parameter, reason)) = parameter_error(&body) {
            return Err(CordError::InvalidParameter { parameter, reason });
        }
    }

    Err(CordError::Api {
        status,
        code,
        message: message.unwrap_or_else(|| format!("HTTP {status}")),
    })
}

/// `{"param": ["reason", ...]}` bodies describe one rejected parameter.
fn parameter_error(body: &Value) -> Option<(String, String)> {
    let (parameter, reasons) = body.as_object()?.iter().next()?;
    let reason = reasons.as_array()?.first()?.as_str()?;
    Some((parameter.clone(), reason.to_string()))
}
