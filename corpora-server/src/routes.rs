//! HTTP handlers for the four routes in §6.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use corpora_core::augment;
use corpora_core::model::{ColumnHint, Profile};
use corpora_core::profiler::{ProfileRequest, Profiler, SketchMode};
use corpora_core::query;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    query: Option<Value>,
    data: Option<ProbeData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeData {
    DatasetId(String),
    /// Raw CSV text for an unindexed probe dataset. The pack has no base64
    /// crate, so unlike the original byte-oriented API this accepts UTF-8
    /// CSV text directly (noted in DESIGN.md).
    CsvText(String),
}

#[derive(Debug, Serialize)]
pub struct SearchHitResponse {
    pub id: String,
    pub score: f64,
    pub metadata: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_columns: Option<Vec<(String, String)>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub union_columns: Option<Vec<(String, String)>>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHitResponse>,
}

pub async fn search(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    query::require_query_or_data(&body)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let request: SearchRequest = serde_json::from_value(body.clone())
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?;

    let compiled = match &request.query {
        Some(q) => query::compile(q).map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => None,
    };

    if let Some(data) = request.data {
        let probe = resolve_probe(&state, data).await?;
        let candidates =
            augment::find_candidates(&probe, state.catalog.as_ref(), state.sketch.as_ref(), compiled.as_ref())
                .map_err(ApiError::from)?;

        let results = candidates
            .into_iter()
            .map(|c| SearchHitResponse {
                id: c.id,
                score: c.score,
                metadata: c.metadata,
                join_columns: (!c.join_columns.is_empty()).then(|| {
                    c.join_columns
                        .into_iter()
                        .map(|p| (p.probe_column, p.catalog_column))
                        .collect()
                }),
                union_columns: (!c.union_columns.is_empty()).then_some(c.union_columns),
            })
            .collect();
        return Ok(Json(SearchResponse { results }).into_response());
    }

    let compiled = compiled.unwrap_or(query::CompiledQuery {
        filter: query::QueryNode::MatchAll,
        should: Vec::new(),
    });
    let hits = state.catalog.search(&compiled).map_err(ApiError::from)?;
    let results = hits
        .into_iter()
        .map(|h| {
            let mut metadata = BTreeMap::new();
            metadata.insert("source".to_string(), h.source);
            SearchHitResponse {
                id: h.id,
                score: h.score,
                metadata,
                join_columns: None,
                union_columns: None,
            }
        })
        .collect();
    Ok(Json(SearchResponse { results }).into_response())
}

async fn resolve_probe(state: &AppState, data: ProbeData) -> Result<Profile, ApiError> {
    match data {
        ProbeData::DatasetId(id) => state
            .catalog
            .get(&id)
            .map_err(ApiError::from),
        ProbeData::CsvText(text) => {
            let hints: Vec<Option<ColumnHint>> = Vec::new();
            let request = ProfileRequest {
                dataset_id: "probe".to_string(),
                name: "probe".to_string(),
                description: None,
                materialize: BTreeMap::new(),
                column_hints: &hints,
            };
            let profiler = Profiler::new().with_sketch(state.sketch.as_ref(), SketchMode::Search);
            profiler
                .profile(text.as_bytes(), request)
                .map_err(|e| ApiError::Internal(e.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    #[serde(default)]
    #[allow(dead_code)]
    pub format: Option<String>,
}

pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(_params): Query<DownloadParams>,
) -> Result<Response, ApiError> {
    let profile = state.catalog.get(&id).map_err(ApiError::from)?;
    match profile.materialize.get("direct_url") {
        Some(url) => Ok(Redirect::to(url).into_response()),
        None => Err(ApiError::Internal(format!(
            "no direct_url recorded for {id}; local byte storage is not configured"
        ))),
    }
}

pub async fn metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let profile = state.catalog.get(&id).map_err(ApiError::from)?;
    Ok(Json(profile).into_response())
}

pub async fn augment_reserved() -> StatusCode {
    StatusCode::NOT_IMPLEMENTED
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path as PathExtractor;
    use corpora_core::catalog::memory::InMemoryCatalog;
    use corpora_core::model::{ColumnProfile, StructuralType};
    use corpora_core::sketch::InMemorySketchIndex;
    use std::collections::BTreeMap as Map;
    use std::sync::Arc;

    fn state() -> AppState {
        AppState {
            catalog: Arc::new(InMemoryCatalog::new()),
            sketch: Arc::new(InMemorySketchIndex::new()),
        }
    }

    fn sample_profile(id: &str) -> Profile {
        let mut col = ColumnProfile::new("population");
        col.structural_type = Some(StructuralType::Integer);
        Profile {
            id: id.to_string(),
            name: "widgets".to_string(),
            description: None,
            nb_rows: 1,
            size_bytes: 1,
            columns: vec![col],
            spatial_coverage: vec![],
            materialize: Map::new(),
            indexed_at: chrono::Utc::now(),
            lazo: vec![],
        }
    }

    #[tokio::test]
    async fn metadata_returns_404_for_unknown_id() {
        let state = state();
        let result = metadata(State(state), PathExtractor("nope".to_string())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn metadata_returns_profile_json() {
        let state = state();
        state.catalog.put(sample_profile("ds.1")).unwrap();
        let result = metadata(State(state), PathExtractor("ds.1".to_string())).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn search_rejects_body_without_query_or_data() {
        let state = state();
        let body = serde_json::json!({});
        let result = search(State(state), Json(body)).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn search_returns_hits_for_matching_query() {
        let state = state();
        state.catalog.put(sample_profile("ds.1")).unwrap();
        let body = serde_json::json!({ "query": { "dataset": { "about": "widgets" } } });
        let result = search(State(state), Json(body)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn download_redirects_when_direct_url_present() {
        let state = state();
        let mut profile = sample_profile("ds.1");
        profile
            .materialize
            .insert("direct_url".to_string(), "https://example.com/data.csv".to_string());
        state.catalog.put(profile).unwrap();
        let result = download(
            State(state),
            PathExtractor("ds.1".to_string()),
            Query(DownloadParams { format: None }),
        )
        .await;
        assert!(result.is_ok());
    }
}
