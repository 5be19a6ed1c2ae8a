//! HTTP routes for the ledger API.

use std::collections::HashMap;

use actions::respond;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{Json, Response};
use axum::routing::get;
use serde::Serialize;

use crate::ledger::LedgerHistory;
use crate::ledgers::{LedgerIndexAction, LedgerShowAction};
use crate::state::AppState;

/// Header an event-stream client sends when reconnecting.
const LAST_EVENT_ID: &str = "last-event-id";

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/ledgers", get(ledger_index))
        .route("/ledgers/{sequence}", get(ledger_show))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    latest_ledger: Option<u32>,
    history_elder: Option<u32>,
    retained: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let latest_ledger = state.store.latest().ok().flatten().map(|l| l.sequence);
    let history_elder = state.store.elder().ok().flatten();
    let status = if state.store.is_empty() { "empty" } else { "ok" };
    Json(HealthResponse {
        status,
        latest_ledger,
        history_elder,
        retained: state.store.len(),
    })
}

/// GET /ledgers - a page of ledgers, or a stream of ledgers as they close.
async fn ledger_index(
    State(state): State<AppState>,
    Query(mut params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    // A reconnecting stream resumes after the last event it saw.
    if let Some(last_id) = headers.get(LAST_EVENT_ID).and_then(|v| v.to_str().ok()) {
        params
            .entry("cursor".to_string())
            .or_insert_with(|| last_id.to_string());
    }
    let action = LedgerIndexAction::new(state.ledgers.clone(), params);
    respond(state.engine.clone(), &headers, action).await
}

/// GET /ledgers/{sequence} - a single ledger, as HAL JSON or raw XDR.
async fn ledger_show(
    State(state): State<AppState>,
    Path(sequence): Path<String>,
    headers: HeaderMap,
) -> Response {
    let action = LedgerShowAction::new(state.ledgers.clone(), sequence);
    respond(state.engine.clone(), &headers, action).await
}
