//! REST Gateway Module
//!
//! The JSON surface over the internal services plus everything that guards it:
//! token authentication on the mutating endpoints and process-wide admission
//! control (a non-blocking concurrency limiter and a token-bucket rate
//! limiter).
//!
//! Handlers depend on the port traits defined here, not on the concrete
//! services, so the router can be exercised in tests with mock collaborators.
//!
//! ## Submodules
//! - **`handlers`**: one function per endpoint.
//! - **`auth`**: credential check and HS256 token mint/verify.
//! - **`middleware`**: auth header check, concurrency limiter, rate limiter.
//! - **`types`**: request/response DTOs.

pub mod auth;
pub mod handlers;
pub mod middleware;
pub mod types;


use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::middleware as axum_middleware;
use axum::routing::{delete, get, post};
use axum::{Extension, Router};
use tokio::sync::{watch, Semaphore};

use crate::error::Result;
use crate::search::types::Comic;
use crate::search::SearchService;
use crate::update::types::{ServiceStats, UpdateStatus};
use crate::update::UpdateService;
use crate::words::WordsService;

/// Ingestion port of the gateway.
#[async_trait]
pub trait Updater: Send + Sync {
    async fn update(&self, cancel: watch::Receiver<bool>) -> Result<()>;
    async fn stats(&self) -> Result<ServiceStats>;
    fn status(&self) -> UpdateStatus;
    async fn drop_all(&self) -> Result<()>;
}

/// Search port of the gateway.
#[async_trait]
pub trait Searcher: Send + Sync {
    async fn search(&self, phrase: &str, limit: i64) -> Result<Vec<Comic>>;
    async fn index_search(&self, phrase: &str, limit: i64) -> Result<Vec<Comic>>;
}

/// Liveness port; every internal service answers the `/ping` fan-out.
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self) -> Result<()>;
}

pub trait Authenticator: Send + Sync {
    fn login(&self, name: &str, password: &str) -> Result<String>;
}

pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<()>;
}

#[async_trait]
impl Updater for UpdateService {
    async fn update(&self, cancel: watch::Receiver<bool>) -> Result<()> {
        UpdateService::update(self, cancel).await
    }

    async fn stats(&self) -> Result<ServiceStats> {
        UpdateService::stats(self).await
    }

    fn status(&self) -> UpdateStatus {
        UpdateService::status(self)
    }

    async fn drop_all(&self) -> Result<()> {
        UpdateService::drop_all(self).await
    }
}

#[async_trait]
impl Searcher for SearchService {
    async fn search(&self, phrase: &str, limit: i64) -> Result<Vec<Comic>> {
        SearchService::search(self, phrase, limit).await
    }

    async fn index_search(&self, phrase: &str, limit: i64) -> Result<Vec<Comic>> {
        SearchService::index_search(self, phrase, limit).await
    }
}

#[async_trait]
impl Pinger for UpdateService {
    async fn ping(&self) -> Result<()> {
        UpdateService::ping(self).await
    }
}

#[async_trait]
impl Pinger for SearchService {
    async fn ping(&self) -> Result<()> {
        SearchService::ping(self).await
    }
}

#[async_trait]
impl Pinger for WordsService {
    async fn ping(&self) -> Result<()> {
        WordsService::ping(self).await
    }
}

impl Authenticator for auth::Aaa {
    fn login(&self, name: &str, password: &str) -> Result<String> {
        auth::Aaa::login(self, name, password)
    }
}

impl TokenVerifier for auth::Aaa {
    fn verify(&self, token: &str) -> Result<()> {
        auth::Aaa::verify(self, token)
    }
}

/// Everything the router needs, behind ports.
pub struct Dependencies {
    pub updater: Arc<dyn Updater>,
    pub searcher: Arc<dyn Searcher>,
    pub authenticator: Arc<dyn Authenticator>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub pingers: HashMap<String, Arc<dyn Pinger>>,
    /// Process-wide cancellation signal handed to long-running operations.
    pub cancel: watch::Receiver<bool>,
    /// Max in-flight requests; 0 disables the limiter.
    pub concurrency_limit: usize,
    /// Admitted requests per second; 0 disables the limiter.
    pub rps_limit: u32,
    /// Bounds the rate limiter wait.
    pub request_timeout: Duration,
}

pub fn router(deps: Dependencies) -> Router {
    let open = Router::new()
        .route("/ping", get(handlers::ping))
        .route("/api/login", post(handlers::login))
        .route("/api/db/stats", get(handlers::stats))
        .route("/api/db/status", get(handlers::status))
        .route("/api/search", get(handlers::search))
        .route("/api/isearch", get(handlers::index_search));

    let protected = Router::new()
        .route("/api/db/update", post(handlers::update))
        .route("/api/db", delete(handlers::drop_db))
        .route_layer(axum_middleware::from_fn_with_state(
            deps.verifier.clone(),
            middleware::auth,
        ));

    let mut app = open
        .merge(protected)
        .layer(Extension(deps.updater))
        .layer(Extension(deps.searcher))
        .layer(Extension(deps.authenticator))
        .layer(Extension(Arc::new(deps.pingers)))
        .layer(Extension(deps.cancel));

    // Admission control wraps everything, rate limiting before slot taking so
    // a queued request does not hold a concurrency slot while it waits.
    if deps.concurrency_limit > 0 {
        let semaphore = Arc::new(Semaphore::new(deps.concurrency_limit));
        app = app.layer(axum_middleware::from_fn_with_state(
            semaphore,
            middleware::concurrency,
        ));
    }
    if deps.rps_limit > 0 {
        let limiter = middleware::RateLimiter::new(deps.rps_limit, deps.request_timeout);
        app = app.layer(axum_middleware::from_fn_with_state(limiter, middleware::rate));
    }

    app
}
