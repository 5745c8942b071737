//! HTTP, WebSocket and SSE routes for the mutation API.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use futures::stream::Stream;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;

use ripple_core::notebook::{CellId, NotebookId, UserId};

use crate::auth::Authenticator;
use crate::coordinator::Coordinator;
use crate::error::{ApiError, ApiResult};
use crate::protocol::{
    ClientMessage, CreateCellRequest, CreateNotebookRequest, CreateNotebookResponse,
    DeleteCellRequest, SetDbConfigRequest, UpdateCellRequest,
};
use crate::registry::Registry;

/// Application state shared across handlers.
pub struct AppState {
    pub registry: Arc<Registry>,
    pub auth: Arc<dyn Authenticator>,
}

/// Build the router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/notebooks", get(list_notebooks).post(create_notebook))
        .route("/notebooks/{id}", get(get_notebook))
        .route("/notebooks/{id}/state", get(get_state))
        .route("/notebooks/{id}/cells", post(create_cell))
        .route(
            "/notebooks/{id}/cells/{cell_id}",
            put(update_cell).delete(delete_cell),
        )
        .route("/notebooks/{id}/cells/{cell_id}/run", post(run_cell))
        .route("/notebooks/{id}/config", put(set_db_config))
        .route("/notebooks/{id}/shutdown", post(shutdown_notebook))
        .route("/notebooks/{id}/ws", get(ws_handler))
        .route("/notebooks/{id}/events", get(sse_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn open(
    state: &AppState,
    headers: &HeaderMap,
    id: &str,
) -> ApiResult<(UserId, Arc<Coordinator>)> {
    let user = state.auth.authenticate(headers).await?;
    let coordinator = state.registry.open(&user, &NotebookId::from(id)).await?;
    Ok((user, coordinator))
}

fn parse_cell_id(raw: &str) -> ApiResult<CellId> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid cell id '{raw}'")))
}

// ----- notebooks -----------------------------------------------------------

async fn list_notebooks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let user = state.auth.authenticate(&headers).await?;
    let notebooks = state.registry.list_notebooks(&user).await?;
    Ok(Json(notebooks))
}

async fn create_notebook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateNotebookRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = state.auth.authenticate(&headers).await?;
    let id = state.registry.create_notebook(&user, request.name).await?;
    Ok(Json(CreateNotebookResponse { id }))
}

#[derive(Debug, Default, Deserialize)]
struct StateQuery {
    #[serde(default)]
    include_outputs: Option<bool>,
    /// Comma-separated cell ids.
    #[serde(default)]
    cells: Option<String>,
}

impl StateQuery {
    fn cell_ids(&self) -> ApiResult<Option<Vec<CellId>>> {
        match &self.cells {
            None => Ok(None),
            Some(raw) => raw
                .split(',')
                .filter(|part| !part.is_empty())
                .map(parse_cell_id)
                .collect::<ApiResult<Vec<_>>>()
                .map(Some),
        }
    }
}

async fn get_notebook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<StateQuery>,
) -> ApiResult<impl IntoResponse> {
    let (user, coordinator) = open(&state, &headers, &id).await?;
    let view = coordinator
        .get_state(&user, query.include_outputs.unwrap_or(true), None)
        .await?;
    Ok(Json(view))
}

async fn get_state(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<StateQuery>,
) -> ApiResult<impl IntoResponse> {
    let (user, coordinator) = open(&state, &headers, &id).await?;
    let view = coordinator
        .get_state(
            &user,
            query.include_outputs.unwrap_or(false),
            query.cell_ids()?,
        )
        .await?;
    Ok(Json(view))
}

// ----- cells ---------------------------------------------------------------

async fn create_cell(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<CreateCellRequest>,
) -> ApiResult<impl IntoResponse> {
    let (user, coordinator) = open(&state, &headers, &id).await?;
    let view = coordinator
        .create_cell(
            &user,
            request.cell_type,
            request.code,
            request.position,
            request.expected_revision,
        )
        .await?;
    Ok(Json(view))
}

async fn update_cell(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, cell_id)): Path<(String, String)>,
    Json(request): Json<UpdateCellRequest>,
) -> ApiResult<impl IntoResponse> {
    let (user, coordinator) = open(&state, &headers, &id).await?;
    let cell_id = parse_cell_id(&cell_id)?;
    let view = coordinator
        .update_cell(&user, cell_id, request.code, request.expected_revision)
        .await?;
    Ok(Json(view))
}

async fn delete_cell(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, cell_id)): Path<(String, String)>,
    Query(request): Query<DeleteCellRequest>,
) -> ApiResult<impl IntoResponse> {
    let (user, coordinator) = open(&state, &headers, &id).await?;
    let cell_id = parse_cell_id(&cell_id)?;
    coordinator
        .delete_cell(&user, cell_id, request.expected_revision)
        .await?;
    Ok(Json(serde_json::json!({ "deleted": cell_id })))
}

#[derive(Debug, Default, Deserialize)]
struct RunQuery {
    #[serde(default)]
    wait: Option<bool>,
}

async fn run_cell(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, cell_id)): Path<(String, String)>,
    Query(query): Query<RunQuery>,
) -> ApiResult<impl IntoResponse> {
    let (user, coordinator) = open(&state, &headers, &id).await?;
    let cell_id = parse_cell_id(&cell_id)?;
    let result = coordinator
        .run_cell(&user, cell_id, query.wait.unwrap_or(false))
        .await?;
    match result {
        Some(view) => Ok(Json(serde_json::json!({ "started": cell_id, "cell": view }))),
        None => Ok(Json(serde_json::json!({ "started": cell_id }))),
    }
}

async fn set_db_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<SetDbConfigRequest>,
) -> ApiResult<impl IntoResponse> {
    let (user, coordinator) = open(&state, &headers, &id).await?;
    coordinator.set_db_config(&user, request.conn_string).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn shutdown_notebook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let user = state.auth.authenticate(&headers).await?;
    state
        .registry
        .shutdown_notebook(&user, &NotebookId::from(id.as_str()))
        .await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

// ----- streaming -----------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenQuery {
    #[serde(default)]
    token: Option<String>,
}

/// Bidirectional subscription channel. The token rides the query string
/// because browsers cannot set WebSocket headers.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Response {
    let token = match query.token {
        Some(token) => token,
        None => return ApiError::Unauthorized.into_response(),
    };
    let user = match state.auth.resolve_token(&token).await {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };
    let coordinator = match state.registry.open(&user, &NotebookId::from(id.as_str())).await {
        Ok(coordinator) => coordinator,
        Err(e) => return e.into_response(),
    };
    ws.on_upgrade(move |socket| handle_websocket(socket, coordinator, user))
}

async fn handle_websocket(socket: WebSocket, coordinator: Arc<Coordinator>, user: UserId) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = coordinator.subscribe();

    // Forward broadcast events to this subscriber. Falling behind the
    // bounded buffer closes the connection; others are unaffected.
    let forward = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let Ok(json) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber lagged, dropping connection");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::RunCell { cell_id }) => {
                    if let Err(e) = coordinator.run_cell(&user, cell_id, false).await {
                        tracing::warn!(%cell_id, "run_cell over ws failed: {e}");
                    }
                }
                Err(e) => {
                    tracing::warn!("unparseable client frame: {e}");
                }
            },
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::debug!("websocket error: {e}");
                break;
            }
            _ => {}
        }
    }

    forward.abort();
    let _ = forward.await;
}

/// Unidirectional stream (tool-call drivers). Ends silently when the
/// subscriber falls behind the bounded buffer.
async fn sse_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let user = match query.token {
        Some(token) => state.auth.resolve_token(&token).await?,
        None => state.auth.authenticate(&headers).await?,
    };
    let coordinator = state.registry.open(&user, &NotebookId::from(id.as_str())).await?;
    let events = coordinator.subscribe();

    let stream = BroadcastStream::new(events)
        .take_while(|result| futures::future::ready(result.is_ok()))
        .map(|result| {
            let event = result.expect("take_while keeps only Ok items");
            let data = serde_json::to_string(&event).unwrap_or_default();
            Ok(SseEvent::default().data(data))
        });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
