use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use burrow_core::session::{InvokeRequest, SessionOrchestrator};
use burrow_core::tools::ToolCatalog;
use burrow_core::transport::SSE_HEADERS;
use burrow_core::workspace::{ProjectFile, ProjectWorkspaces};
use burrow_db::models::{Conversation, Message, Project};
use burrow_db::queries::conversations::ConversationSummary;

use crate::app::{App, Stores};

/// Header set by the authenticating proxy in front of the server.
const FORWARDED_EMAIL: &str = "x-forwarded-email";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        tracing::error!(error = %format!("{err:#}"), "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// State and payloads
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: SessionOrchestrator,
    pub stores: Stores,
    pub workspaces: ProjectWorkspaces,
    pub tools: Arc<ToolCatalog>,
    /// Owner for requests that arrive without a forwarded identity.
    pub local_user: Arc<str>,
}

impl AppState {
    fn owner(&self, headers: &HeaderMap) -> String {
        headers
            .get(FORWARDED_EMAIL)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map_or_else(|| self.local_user.to_string(), str::to_string)
    }

    /// Another owner's project is indistinguishable from a missing one.
    async fn require_project(&self, id: Uuid, owner: &str) -> Result<Project, AppError> {
        self.stores
            .projects
            .get_owned(id, owner)
            .await
            .map_err(AppError::internal)?
            .ok_or_else(|| AppError::not_found(format!("Project not found: {id}")))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<String>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/invoke_agent", post(invoke_agent))
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/projects/{id}/files", get(list_project_files))
        .route("/api/projects/{id}/conversations", get(list_conversations))
        .route("/api/conversations/{id}", get(get_conversation))
        .route("/api/tools", get(list_tools))
        .route("/api/admin/tools/refresh", post(refresh_tools))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(app: App, local_user: &str, bind: &str, port: u16) -> Result<()> {
    let App {
        stores,
        workspaces,
        tools,
        orchestrator,
        backup,
    } = app;

    let router = build_router(AppState {
        orchestrator,
        stores,
        workspaces,
        tools,
        local_user: Arc::from(local_user),
    });

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("burrow serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    backup.shutdown().await?;
    tracing::info!("burrow serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Run one agent turn and stream its frames as server-sent events.
///
/// Resolution failures, including a project owned by someone else, are
/// reported in-band as an error frame; the HTTP status is always 200 once
/// the request body parses.
async fn invoke_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut request): Json<InvokeRequest>,
) -> Response {
    request.owner = Some(state.owner(&headers));
    let events = state
        .orchestrator
        .invoke(request)
        .map(|frame| Ok::<_, Infallible>(Event::default().data(frame.data())));

    (
        SSE_HEADERS,
        Sse::new(events).keep_alive(KeepAlive::default()),
    )
        .into_response()
}

async fn list_projects(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Project>>, AppError> {
    let owner = state.owner(&headers);
    let projects = state
        .stores
        .projects
        .list_for_owner(&owner)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(projects))
}

async fn create_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), AppError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("project name must not be empty"));
    }

    let owner = state.owner(&headers);
    let project = state
        .stores
        .projects
        .create(name, &owner)
        .await
        .map_err(AppError::internal)?;
    state
        .workspaces
        .ensure(project.id)
        .await
        .map_err(AppError::internal)?;

    tracing::info!(project_id = %project.id, owner = %owner, "project created");
    Ok((StatusCode::CREATED, Json(project)))
}

async fn list_project_files(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ProjectFile>>, AppError> {
    state.require_project(id, &state.owner(&headers)).await?;
    let files = state
        .workspaces
        .list_files(id)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(files))
}

async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ConversationSummary>>, AppError> {
    state.require_project(id, &state.owner(&headers)).await?;
    let conversations = state
        .stores
        .conversations
        .list(id)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(conversations))
}

async fn get_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationDetail>, AppError> {
    let not_found = || AppError::not_found(format!("Conversation not found: {id}"));
    let conversations = &state.stores.conversations;
    let conversation = conversations
        .find(id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(not_found)?;
    state
        .stores
        .projects
        .get_owned(conversation.project_id, &state.owner(&headers))
        .await
        .map_err(AppError::internal)?
        .ok_or_else(not_found)?;
    let messages = conversations
        .messages(id)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(ConversationDetail {
        conversation,
        messages,
    }))
}

async fn list_tools(State(state): State<AppState>) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        tools: state.tools.allowed_tools().await,
    })
}

/// Drop the cached allow-list and assemble a fresh one.
async fn refresh_tools(State(state): State<AppState>) -> Json<ToolsResponse> {
    state.tools.invalidate().await;
    tracing::info!("tool allow-list invalidated");
    Json(ToolsResponse {
        tools: state.tools.allowed_tools().await,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
