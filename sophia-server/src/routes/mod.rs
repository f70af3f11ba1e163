//! HTTP routes.

mod combat;
mod player;
mod scenarios;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::AppState;

/// Every route, without state or middleware.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/player/create", post(player::create))
        .route("/player/{id}", get(player::get))
        .route("/players", get(player::list))
        .route("/action", post(player::action))
        .route("/scenarios", get(scenarios::list))
        .route("/scenarios/{id}", get(scenarios::get))
        .route("/combat/engage", post(combat::engage))
        .route("/combat/syllogism", post(combat::syllogism))
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
