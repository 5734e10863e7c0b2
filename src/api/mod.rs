//! HTTP API module - REST endpoints and WebSocket

mod websocket;

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::catalog::{slug, CatalogError, FactionRef};
use crate::duel::{DuelContext, Matchmaker};
pub use websocket::{
    ClientMessage, ConnectParams, ConnectionManager, PlayerSession, RollsEvent, ServerMessage,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<DuelContext>,
    pub matchmaker: Matchmaker,
}

/// Build the API router
pub fn router(ctx: Arc<DuelContext>, matchmaker: Matchmaker) -> Router {
    let state = AppState { ctx, matchmaker };

    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
        .route("/api/rooms", get(list_rooms))
        .route("/api/factions", get(list_factions))
        .route("/api/{faction}/units", get(list_units))
        .route("/ws", get(websocket::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Root endpoint
async fn root() -> impl IntoResponse {
    Json(RootResponse {
        name: "dueld",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct RootResponse {
    name: &'static str,
    version: &'static str,
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        rooms: state.ctx.registry.room_count(),
        lobby: state.ctx.registry.lobby_size(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    rooms: usize,
    lobby: usize,
}

/// Active rooms, most recently updated first
async fn list_rooms(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.ctx.registry.summaries())
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Offered when the catalog has no factions to list
const SAMPLE_FACTIONS: [&str; 3] = ["Orks", "Necrons", "Adeptus Custodes"];

/// Factions for the lobby picker, sorted by name
async fn list_factions(State(state): State<AppState>) -> impl IntoResponse {
    let mut list = match state.ctx.catalog.factions().await {
        Ok(list) if !list.is_empty() => list,
        Ok(_) => sample_factions(),
        Err(e) => {
            warn!("faction list unavailable, offering samples: {}", e);
            sample_factions()
        }
    };
    list.sort_by_key(|f| f.name.to_lowercase());
    Json(list)
}

fn sample_factions() -> Vec<FactionRef> {
    SAMPLE_FACTIONS
        .iter()
        .map(|name| FactionRef {
            id: slug(name),
            name: name.to_string(),
        })
        .collect()
}

/// Units of one faction, sorted by name
async fn list_units(
    State(state): State<AppState>,
    Path(faction): Path<String>,
) -> impl IntoResponse {
    match state.ctx.catalog.units(&faction).await {
        Ok(units) => (StatusCode::OK, Json(units)).into_response(),
        Err(e) => {
            let status = match e {
                CatalogError::EmptyFaction(_) | CatalogError::UnknownUnit { .. } => {
                    StatusCode::NOT_FOUND
                }
                _ => StatusCode::BAD_GATEWAY,
            };
            warn!("unit list for {} failed: {}", faction, e);
            (
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}
