//! Player lifecycle and action dispatch.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use sophia_core::{Action, ActionResponse, Alignment, PlayerId, PlayerState};

use crate::{AppState, HttpApiError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreatePlayerRequest {
    player_name: String,
    #[serde(default)]
    initial_alignment: Option<Alignment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ActionRequest {
    player_id: PlayerId,
    action: Action,
}

pub(crate) async fn create(
    State(state): State<AppState>,
    body: Result<Json<CreatePlayerRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PlayerState>), HttpApiError> {
    let Json(req) = body?;
    let alignment = req.initial_alignment.unwrap_or(Alignment::Undecided);
    let player = state
        .run(move |engine| engine.create_player(&req.player_name, alignment))
        .await?;
    Ok((StatusCode::CREATED, Json(player)))
}

pub(crate) async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PlayerState>, HttpApiError> {
    let id = PlayerId::from(id);
    let player = state.run(move |engine| engine.get_player(&id)).await?;
    Ok(Json(player))
}

pub(crate) async fn list(State(state): State<AppState>) -> Result<Json<Vec<PlayerId>>, HttpApiError> {
    let ids = state
        .run(|engine| engine.registry().list_players())
        .await?;
    Ok(Json(ids))
}

pub(crate) async fn action(
    State(state): State<AppState>,
    body: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<Json<ActionResponse>, HttpApiError> {
    let Json(req) = body?;
    let response = state
        .run(move |engine| engine.dispatch(&req.player_id, req.action))
        .await?;
    Ok(Json(response))
}
