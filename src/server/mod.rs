//! HTTP server exposing the catalog, resolution, and download endpoints.
//!
//! Every request gets an independent, stateless handling context; the only
//! shared state is the read-only configuration snapshot taken at startup.

mod stream;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::catalog::{self, CatalogEntry, FileTreeNode, GameCatalog, GameList, GameSummary, StartInfo};
use crate::config::{GameConfig, ServerConfig};
use crate::download::API_KEY_HEADER;
use crate::error::{Error, Result};
use crate::resolve;

/// Shared per-process state handed to every handler.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<ServerConfig>,
    started_at: DateTime<Utc>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Auth | Self::PathViolation(_) => StatusCode::FORBIDDEN,
            Self::GameNotFound(_)
            | Self::FileNotFound(_)
            | Self::EmptyCatalog(_)
            | Self::NothingToStream(_) => StatusCode::NOT_FOUND,
            Self::Range { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("request failed: {self}");
        }
        (status, self.to_string()).into_response()
    }
}

/// Rejects the request before any work when the shared secret is missing
/// or wrong. A server configured with verification disabled accepts any
/// (or absent) value.
pub(crate) fn require_api_key(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let presented = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    if state.config.key_is_valid(presented) {
        Ok(())
    } else {
        log::warn!("rejected request with invalid API key");
        Err(Error::Auth)
    }
}

/// Scans a game directory into catalog form, off the async runtime.
///
/// A missing game directory yields an empty catalog; any error inside an
/// existing directory aborts the whole response.
pub(crate) async fn scan_game(
    game: &GameConfig,
) -> Result<(Vec<CatalogEntry>, Vec<FileTreeNode>)> {
    if !game.directory.exists() {
        return Ok((Vec::new(), Vec::new()));
    }
    let game_id = game.id.clone();
    let root = game.directory.clone();
    tokio::task::spawn_blocking(move || catalog::scan_game_dir(&game_id, &root))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

#[derive(Serialize)]
struct StatusBody {
    status: &'static str,
    name: &'static str,
    version: &'static str,
    games_count: usize,
    started_at: DateTime<Utc>,
}

async fn server_status(State(state): State<AppState>) -> Json<StatusBody> {
    Json(StatusBody {
        status: "running",
        name: "depot-dl server",
        version: env!("CARGO_PKG_VERSION"),
        games_count: state.config.games.len(),
        started_at: state.started_at,
    })
}

async fn list_games(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<GameList>> {
    require_api_key(&state, &headers)?;
    let games = state
        .config
        .games
        .iter()
        .map(|g| GameSummary {
            id: g.id.clone(),
            name: g.name.clone(),
            version: g.version.clone(),
            description: g.description.clone(),
            client_config: g.client_config.clone(),
        })
        .collect();
    Ok(Json(GameList { games }))
}

async fn game_catalog(
    UrlPath(game_id): UrlPath<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<GameCatalog>> {
    require_api_key(&state, &headers)?;
    let game = state
        .config
        .game(&game_id)
        .ok_or_else(|| Error::GameNotFound(game_id.clone()))?;

    let (files, file_tree) = scan_game(game).await?;
    let total_size = files.iter().map(|f| f.size).sum();
    log::info!(
        "catalog for {game_id}: {} file(s), {total_size} byte(s)",
        files.len()
    );
    Ok(Json(GameCatalog {
        game_id,
        game_name: game.name.clone(),
        total_files: files.len(),
        total_size,
        files,
        file_tree,
        client_config: game.client_config.clone(),
    }))
}

#[derive(Debug, Deserialize)]
struct StartQuery {
    #[serde(default)]
    progress: f64,
}

async fn start_info(
    UrlPath(game_id): UrlPath<String>,
    Query(query): Query<StartQuery>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StartInfo>> {
    require_api_key(&state, &headers)?;
    let game = state
        .config
        .game(&game_id)
        .ok_or_else(|| Error::GameNotFound(game_id.clone()))?;
    let client_config = game.client_config.clone();

    let (files, _) = scan_game(game).await?;
    if files.is_empty() {
        return Ok(Json(StartInfo {
            game_id,
            start_file_index: 0,
            start_file_path: String::new(),
            start_file_offset: 0,
            files,
            message: "game directory is empty".to_string(),
            client_config,
        }));
    }

    let progress = query.progress.clamp(0.0, 100.0);
    let sizes: Vec<u64> = files.iter().map(|f| f.size).collect();
    let point = resolve::resolve_start(&sizes, progress);

    if point.is_exhausted(files.len()) {
        return Ok(Json(StartInfo {
            game_id,
            start_file_index: files.len(),
            start_file_path: String::new(),
            start_file_offset: 0,
            files,
            message: "game already fully downloaded".to_string(),
            client_config,
        }));
    }

    let start_file = &files[point.file_index];
    let mut message = format!(
        "progress {progress}%: starting at file {} of {} ({})",
        point.file_index + 1,
        files.len(),
        start_file.path
    );
    if point.byte_offset > 0 {
        message.push_str(&format!(", offset {} bytes", point.byte_offset));
    }

    Ok(Json(StartInfo {
        game_id,
        start_file_index: point.file_index,
        start_file_path: start_file.path.clone(),
        start_file_offset: point.byte_offset,
        files,
        message,
        client_config,
    }))
}

/// Builds the application router around a configuration snapshot.
#[must_use]
pub fn router(config: Arc<ServerConfig>) -> Router {
    let state = AppState {
        config,
        started_at: Utc::now(),
    };
    Router::new()
        .route("/", get(server_status))
        .route("/games", get(list_games))
        .route("/games/{game_id}", get(game_catalog))
        .route("/games/{game_id}/start", get(start_info))
        .route("/download/file/{game_id}/{*path}", get(stream::download_file))
        .route("/download/stream/{game_id}", get(stream::stream_game))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Binds the configured address and serves until the process exits.
///
/// # Errors
///
/// Returns an error if the listen address is invalid or binding fails.
pub async fn run(config: Arc<ServerConfig>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| Error::Config(format!("invalid listen address: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!(
        "serving {} game(s) on http://{}",
        config.games.len(),
        listener.local_addr()?
    );
    axum::serve(listener, router(config)).await?;
    Ok(())
}
