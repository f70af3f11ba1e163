//! # SOPHIA Server
//!
//! JSON-over-HTTP integration for the SOPHIA rules engine. Handlers decode
//! requests, run the engine on tokio's blocking pool and map core errors to
//! `{ code, message, details }` bodies.
//!
//! | Method | Path | Body → Response |
//! |--------|------|-----------------|
//! | POST | `/player/create` | `{playerName, initialAlignment}` → PlayerState |
//! | GET | `/player/{id}` | → PlayerState |
//! | GET | `/players` | → player ids |
//! | POST | `/action` | `{playerId, action}` → tagged response |
//! | GET | `/scenarios` | → Scenario list |
//! | GET | `/scenarios/{id}` | → Scenario |
//! | POST | `/combat/engage` | `{playerId, enemyId}` → TurnPrompt |
//! | POST | `/combat/syllogism` | `{requestPlayerId, syllogismId, playerAnswer, enemyId}` → CombatResolution |
//! | GET | `/health` | → status |

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use sophia_core::config::{ServerConfig, SophiaConfig};
use sophia_core::{GameEngine, SophiaError};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use error::{HttpApiError, ServerError};

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    engine: Arc<GameEngine>,
}

impl AppState {
    /// Wrap an engine for sharing across handlers.
    #[must_use]
    pub fn new(engine: GameEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// The engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<GameEngine> {
        &self.engine
    }

    /// Run a synchronous engine call on the blocking pool.
    ///
    /// # Errors
    /// The engine's error mapped to an [`HttpApiError`], or a 500 if the
    /// task panicked.
    pub async fn run<T, F>(&self, f: F) -> Result<T, HttpApiError>
    where
        T: Send + 'static,
        F: FnOnce(&GameEngine) -> Result<T, SophiaError> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || f(&engine))
            .await
            .map_err(|e| HttpApiError::internal(format!("engine task failed: {e}")))?
            .map_err(HttpApiError::from)
    }
}

/// Build the application router.
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    let app = routes::routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if config.permissive_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Build the engine, bind and serve until Ctrl-C, then checkpoint the store.
///
/// # Errors
/// Engine construction, bind or serve failures.
pub async fn serve(config: SophiaConfig) -> Result<(), ServerError> {
    let engine_config = config.clone();
    let engine = tokio::task::spawn_blocking(move || GameEngine::from_config(&engine_config))
        .await??;
    let state = AppState::new(engine);
    let app = router(state.clone(), &config.server);

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!(addr = %listener.local_addr()?, "SOPHIA server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let engine = Arc::clone(state.engine());
    match tokio::task::spawn_blocking(move || engine.checkpoint()).await? {
        Ok(()) => info!("Shutdown checkpoint written"),
        Err(e) => warn!(error = %e, "Shutdown checkpoint failed"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
