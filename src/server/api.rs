use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::jobs::Job;
use crate::query::{self, QueryError, RowQuery};
use crate::server::{AppState, USER_HEADER};

/// Raw query string; values that do not parse fall back to defaults instead of rejecting.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RowParams {
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub search: Option<String>,
}

impl RowParams {
    pub fn to_query(&self) -> RowQuery {
        RowQuery {
            page: parse_usize(self.page.as_deref()),
            page_size: parse_usize(self.page_size.as_deref()),
            search: self.search.clone(),
        }
    }
}

fn parse_usize(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
}

fn caller(headers: &HeaderMap) -> &str {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or("")
}

pub async fn health() -> Response {
    Json(serde_json::json!({
        "status": "ok",
        "service": "voicetable-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
    .into_response()
}

pub async fn datasets(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match query::list_datasets(state.store.as_ref(), caller(&headers)) {
        Ok(list) => Json(serde_json::json!({ "datasets": list })).into_response(),
        Err(err) => query_error_response(err),
    }
}

pub async fn rows(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    params: Result<Query<RowParams>, QueryRejection>,
    headers: HeaderMap,
) -> Response {
    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, &rejection.body_text());
        }
    };
    match query::list_rows(
        state.store.as_ref(),
        caller(&headers),
        &slug,
        &params.to_query(),
    ) {
        Ok(page) => Json(page).into_response(),
        Err(err) => query_error_response(err),
    }
}

pub async fn enqueue_import(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Response {
    enqueue(&state, &slug, caller(&headers), Job::Import)
}

pub async fn enqueue_scan(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Response {
    enqueue(&state, &slug, caller(&headers), Job::Scan)
}

fn enqueue(
    state: &AppState,
    slug: &str,
    caller: &str,
    make_job: fn(crate::data::model::DatasetId) -> Job,
) -> Response {
    let dataset = match query::visible_dataset(state.store.as_ref(), caller, slug) {
        Ok(dataset) => dataset,
        Err(err) => return query_error_response(err),
    };
    let job = make_job(dataset.id);
    match state.jobs.enqueue(job) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "queued", "job": job.name() })),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(%job, error = %err, "failed to enqueue job");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
    }
}

pub async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Route not found")
}

fn query_error_response(err: QueryError) -> Response {
    match err {
        QueryError::NotFound => error_response(StatusCode::NOT_FOUND, "Dataset not found"),
        QueryError::Store(err) => {
            tracing::error!(error = %err, "store failure while serving query");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "status": "error",
            "message": message,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparseable_params_fall_back_to_defaults() {
        let params = RowParams {
            page: Some("two".to_string()),
            page_size: Some(" 50 ".to_string()),
            search: Some("ali".to_string()),
        };
        assert_eq!(
            params.to_query(),
            RowQuery {
                page: None,
                page_size: Some(50),
                search: Some("ali".to_string()),
            }
        );
    }

    #[test]
    fn caller_header_is_trimmed() {
        let mut headers = HeaderMap::new();
        assert_eq!(caller(&headers), "");
        headers.insert(USER_HEADER, " alice ".parse().expect("header value"));
        assert_eq!(caller(&headers), "alice");
    }
}
