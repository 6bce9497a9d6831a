use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use tokio::sync::watch;

use super::types::{
    LoginRequest, PingResponse, SearchComic, SearchParams, SearchResponse, StatsResponse,
    StatusResponse,
};
use super::{Authenticator, Pinger, Searcher, Updater};
use crate::error::Error;
use crate::update::types::UpdateStatus;

/// Per-dependency deadline for the ping fan-out.
const PING_TIMEOUT: Duration = Duration::from_secs(2);

const DEFAULT_SEARCH_LIMIT: i64 = 10;

fn error_status(err: &Error) -> StatusCode {
    match err {
        Error::BadArguments | Error::PhraseTooLarge => StatusCode::BAD_REQUEST,
        Error::Unauthorized => StatusCode::UNAUTHORIZED,
        Error::AlreadyExists => StatusCode::ACCEPTED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn ping(
    Extension(pingers): Extension<Arc<HashMap<String, Arc<dyn Pinger>>>>,
) -> Json<PingResponse> {
    let mut tasks = Vec::with_capacity(pingers.len());
    for (name, pinger) in pingers.iter() {
        let name = name.clone();
        let pinger = pinger.clone();
        tasks.push(tokio::spawn(async move {
            let ok = matches!(
                tokio::time::timeout(PING_TIMEOUT, pinger.ping()).await,
                Ok(Ok(()))
            );
            (name, ok)
        }));
    }

    let mut replies = HashMap::new();
    for task in tasks {
        if let Ok((name, ok)) = task.await {
            if !ok {
                tracing::error!("service is not available: {}", name);
            }
            let reply = if ok { "ok" } else { "unavailable" };
            replies.insert(name, reply.to_string());
        }
    }

    Json(PingResponse { replies })
}

pub async fn login(
    Extension(auth): Extension<Arc<dyn Authenticator>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = body else {
        return (StatusCode::BAD_REQUEST, "bad request").into_response();
    };

    match auth.login(&req.name, &req.password) {
        Ok(token) => (StatusCode::OK, token).into_response(),
        Err(err) => {
            tracing::error!("cannot login: {}", err);
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

pub async fn update(
    Extension(updater): Extension<Arc<dyn Updater>>,
    Extension(cancel): Extension<watch::Receiver<bool>>,
) -> Response {
    match updater.update(cancel).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => {
            tracing::error!("error while update: {}", err);
            error_status(&err).into_response()
        }
    }
}

pub async fn stats(Extension(updater): Extension<Arc<dyn Updater>>) -> Response {
    match updater.stats().await {
        Ok(stats) => Json(StatsResponse {
            words_total: stats.words_total,
            words_unique: stats.words_unique,
            comics_fetched: stats.comics_fetched,
            comics_total: stats.comics_total,
        })
        .into_response(),
        Err(err) => {
            tracing::error!("error while stats: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

pub async fn status(Extension(updater): Extension<Arc<dyn Updater>>) -> Json<StatusResponse> {
    let status = match updater.status() {
        UpdateStatus::Idle => "idle",
        UpdateStatus::Running => "running",
        UpdateStatus::Unknown => "unknown",
    };

    Json(StatusResponse {
        status: status.to_string(),
    })
}

pub async fn drop_db(Extension(updater): Extension<Arc<dyn Updater>>) -> Response {
    match updater.drop_all().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => {
            tracing::error!("error while drop: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

pub async fn search(
    Extension(searcher): Extension<Arc<dyn Searcher>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Response {
    run_search(params, move |phrase, limit| async move {
        searcher.search(&phrase, limit).await
    })
    .await
}

pub async fn index_search(
    Extension(searcher): Extension<Arc<dyn Searcher>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Response {
    run_search(params, move |phrase, limit| async move {
        searcher.index_search(&phrase, limit).await
    })
    .await
}

async fn run_search<F, Fut>(
    params: Result<Query<SearchParams>, QueryRejection>,
    run: F,
) -> Response
where
    F: FnOnce(String, i64) -> Fut,
    Fut: std::future::Future<Output = crate::error::Result<Vec<crate::search::types::Comic>>>,
{
    // A non-integer limit (or a missing phrase) never reaches the service
    let Ok(Query(params)) = params else {
        return (StatusCode::BAD_REQUEST, "invalid query parameters").into_response();
    };

    if params.phrase.is_empty() {
        return (StatusCode::BAD_REQUEST, "empty phrase").into_response();
    }
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    if limit <= 0 {
        return (StatusCode::BAD_REQUEST, "invalid limit").into_response();
    }

    match run(params.phrase, limit).await {
        Ok(comics) => {
            let comics: Vec<SearchComic> = comics
                .into_iter()
                .map(|c| SearchComic {
                    id: c.id,
                    url: c.url,
                })
                .collect();
            let total = comics.len();
            Json(SearchResponse { comics, total }).into_response()
        }
        Err(err) => {
            tracing::error!("error while search: {}", err);
            (error_status(&err), err.to_string()).into_response()
        }
    }
}
