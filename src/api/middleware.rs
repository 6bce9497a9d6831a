use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

use super::TokenVerifier;

const TOKEN_PREFIX: &str = "Token ";

/// Require a valid `Authorization: Token <jwt>` header.
pub async fn auth(
    State(verifier): State<Arc<dyn TokenVerifier>>,
    req: Request,
    next: Next,
) -> Response {
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    // Anything that is not our Token scheme (Bearer, Basic, empty) is refused.
    let Some(token) = header_value.strip_prefix(TOKEN_PREFIX) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let token = token.trim();
    if token.is_empty() || verifier.verify(token).is_err() {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    next.run(req).await
}

/// Process-wide admission control: try to take a slot, shed load with 503
/// when none is free. Never blocks.
pub async fn concurrency(
    State(semaphore): State<Arc<Semaphore>>,
    req: Request,
    next: Next,
) -> Response {
    let Ok(_permit) = semaphore.try_acquire() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "too many concurrent requests").into_response();
    };

    next.run(req).await
}

/// Token bucket with capacity 1 at a fixed rate. Requests wait for their slot
/// up to `max_wait`, then give up with 408.
pub struct RateLimiter {
    interval: Duration,
    max_wait: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(rps: u32, max_wait: Duration) -> Arc<Self> {
        Arc::new(Self {
            interval: Duration::from_secs(1) / rps.max(1),
            max_wait,
            next_slot: Mutex::new(Instant::now()),
        })
    }

    /// Claim the next slot; false means the wait would exceed the deadline
    /// (the slot is left unclaimed in that case).
    pub async fn acquire(&self) -> bool {
        let deadline = Instant::now() + self.max_wait;

        let wait_until = {
            let mut slot = self.next_slot.lock().await;
            let at = (*slot).max(Instant::now());
            if at > deadline {
                return false;
            }
            *slot = at + self.interval;
            at
        };

        tokio::time::sleep_until(wait_until).await;
        true
    }
}

pub async fn rate(State(limiter): State<Arc<RateLimiter>>, req: Request, next: Next) -> Response {
    if !limiter.acquire().await {
        return (StatusCode::REQUEST_TIMEOUT, "request timed out waiting for rate limit")
            .into_response();
    }

    next.run(req).await
}
