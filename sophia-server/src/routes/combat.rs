//! Encounter endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use sophia_core::combat::{CombatResolution, TurnPrompt};
use sophia_core::PlayerId;

use crate::{AppState, HttpApiError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EngageRequest {
    player_id: PlayerId,
    enemy_id: String,
}

/// The client's historical field names are kept as-is.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SyllogismRequest {
    request_player_id: PlayerId,
    syllogism_id: String,
    player_answer: bool,
    enemy_id: String,
}

pub(crate) async fn engage(
    State(state): State<AppState>,
    body: Result<Json<EngageRequest>, JsonRejection>,
) -> Result<Json<TurnPrompt>, HttpApiError> {
    let Json(req) = body?;
    let turn = state
        .run(move |engine| engine.combat().engage(&req.player_id, &req.enemy_id))
        .await?;
    Ok(Json(turn))
}

pub(crate) async fn syllogism(
    State(state): State<AppState>,
    body: Result<Json<SyllogismRequest>, JsonRejection>,
) -> Result<Json<CombatResolution>, HttpApiError> {
    let Json(req) = body?;
    let resolution = state
        .run(move |engine| {
            engine.combat().resolve_syllogism(
                &req.request_player_id,
                &req.enemy_id,
                &req.syllogism_id,
                req.player_answer,
            )
        })
        .await?;
    Ok(Json(resolution))
}
