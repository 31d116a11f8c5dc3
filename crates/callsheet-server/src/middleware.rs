//! Request-scoped middleware: request IDs, bearer auth and per-caller rate
//! limiting. Rejections use the same envelope as handler errors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, RETRY_AFTER},
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::{ApiError, ErrorCode};

const REQUEST_ID_HEADER: &str = "x-request-id";
const ANONYMOUS_CALLER: &str = "anonymous";

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Accepted bearer tokens. Disabled only in development with no tokens set.
#[derive(Clone)]
pub struct AuthState {
    api_keys: Arc<Vec<String>>,
    pub enabled: bool,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("keys", &self.api_keys.len())
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl AuthState {
    /// Reads comma-separated tokens from `CALLSHEET_API_KEYS`.
    ///
    /// # Errors
    ///
    /// Fails outside development when no token is configured.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var("CALLSHEET_API_KEYS").unwrap_or_default();
        Self::from_keys(&raw, is_development)
    }

    /// # Errors
    ///
    /// Fails outside development when `raw` holds no token.
    pub fn from_keys(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let mut keys: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect();
        keys.sort();
        keys.dedup();

        match (keys.is_empty(), is_development) {
            (false, _) => Ok(Self {
                api_keys: Arc::new(keys),
                enabled: true,
            }),
            (true, true) => {
                tracing::warn!("api: CALLSHEET_API_KEYS empty; bearer auth disabled");
                Ok(Self {
                    api_keys: Arc::new(Vec::new()),
                    enabled: false,
                })
            }
            (true, false) => anyhow::bail!(
                "CALLSHEET_API_KEYS must hold at least one bearer token outside development"
            ),
        }
    }

    /// Every configured key is compared, each in constant time.
    fn allows(&self, token: &str) -> bool {
        self.api_keys.iter().fold(false, |found, key| {
            found | bool::from(key.as_bytes().ct_eq(token.as_bytes()))
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct CallerWindow {
    opened_at: Instant,
    used: usize,
}

/// Fixed request budget per caller per window.
///
/// Callers are keyed by bearer token; requests without one share a single
/// anonymous budget.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    callers: Arc<Mutex<HashMap<String, CallerWindow>>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            callers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Spend one request for `caller`, or return how long until its window
    /// reopens.
    async fn check(&self, caller: &str, now: Instant) -> Result<(), Duration> {
        let mut callers = self.callers.lock().await;
        callers.retain(|_, w| now.duration_since(w.opened_at) < self.window);

        let entry = callers.entry(caller.to_owned()).or_insert(CallerWindow {
            opened_at: now,
            used: 0,
        });
        if entry.used >= self.max_requests {
            return Err(self.window.saturating_sub(now.duration_since(entry.opened_at)));
        }
        entry.used += 1;
        Ok(())
    }
}

fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map_or_else(String::new, |id| id.0.clone())
}

fn caller_key(headers: &HeaderMap) -> String {
    extract_bearer_token(headers.get(AUTHORIZATION))
        .map_or_else(|| ANONYMOUS_CALLER.to_owned(), ToOwned::to_owned)
}

/// Reuses a non-blank `x-request-id` from the caller or mints a `UUIDv4`,
/// exposes it as a [`RequestId`] extension and echoes it on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), ToOwned::to_owned);

    req.extensions_mut().insert(RequestId(id.clone()));
    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    let token = extract_bearer_token(req.headers().get(AUTHORIZATION));
    if !auth.enabled || token.is_some_and(|t| auth.allows(t)) {
        return next.run(req).await;
    }

    ApiError::new(
        request_id_of(&req),
        ErrorCode::Unauthorized,
        "missing or invalid bearer token",
    )
    .into_response()
}

/// Rejects with 429 and `Retry-After` once the caller's budget is spent.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let caller = caller_key(req.headers());
    match rate_limit.check(&caller, Instant::now()).await {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            let rid = request_id_of(&req);
            let mut response =
                ApiError::new(rid, ErrorCode::RateLimited, "rate limit exceeded").into_response();
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
            response
        }
    }
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
