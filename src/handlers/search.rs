use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::{
    AppState,
    error::{AppError, AppResult},
    search::{
        DEFAULT_LIMIT, MAX_LIMIT, MAX_QUERY_LEN, MIN_QUERY_LEN, SearchResponse, cache_key,
        load_corpus,
    },
};

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct SearchParams {
    /// 2 to 200 characters.
    pub q: Option<String>,
    /// Defaults to 10, at most 25.
    pub limit: Option<usize>,
}

/// search
///
/// [Public Route] Ranked results across published posts, services and
/// projects. Results are memoized per normalized query and limit.
#[utoipa::path(
    get,
    path = "/api/search",
    params(SearchParams),
    responses(
        (status = 200, description = "Ranked hits", body = SearchResponse),
        (status = 400, description = "Query too short or too long")
    ),
    tag = "search"
)]
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<SearchResponse>> {
    let query = params.q.unwrap_or_default().trim().to_string();
    let length = query.chars().count();
    if !(MIN_QUERY_LEN..=MAX_QUERY_LEN).contains(&length) {
        return Err(AppError::BadRequest(format!(
            "Query must be between {MIN_QUERY_LEN} and {MAX_QUERY_LEN} characters"
        )));
    }
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let key = cache_key(&query, limit);
    if let Some(hits) = state.search_cache.get(&key) {
        tracing::debug!(%key, "search cache hit");
        return Ok(Json(SearchResponse {
            query,
            hits,
            cached: true,
        }));
    }

    // Content changes while this search runs make its result stale.
    let generation = state.search_cache.generation();
    let corpus = load_corpus(state.repo.as_ref(), &state.retry).await?;
    let hits = state.search.search(&query, corpus, limit).await;
    if !state.search_cache.insert_if_current(key, hits.clone(), generation) {
        tracing::debug!("content changed during search, result not cached");
    }

    Ok(Json(SearchResponse {
        query,
        hits,
        cached: false,
    }))
}
