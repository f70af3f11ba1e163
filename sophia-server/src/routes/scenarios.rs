//! Read-only scenario content.

use axum::extract::{Path, State};
use axum::Json;
use sophia_core::content::Scenario;

use crate::{AppState, HttpApiError};

pub(crate) async fn list(State(state): State<AppState>) -> Json<Vec<Scenario>> {
    Json(state.engine().list_scenarios().cloned().collect())
}

pub(crate) async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Scenario>, HttpApiError> {
    let scenario = state.engine().scenarios().get_scenario(&id)?.clone();
    Ok(Json(scenario))
}
