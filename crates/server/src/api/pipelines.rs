//! Pipeline API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path as FsPath};
use std::sync::Arc;
use tracing::{info, warn};

use mediaflow_core::{
    JobPayload, OrchestratorError, PipelineId, PipelineRequest, PipelineSummary,
};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting a pipeline. Exactly one of `magnet_uri` and
/// `torrent_path` must be set.
#[derive(Debug, Deserialize)]
pub struct CreatePipelineBody {
    pub magnet_uri: Option<String>,
    /// Path of a .torrent file, relative to the configured torrent directory
    pub torrent_path: Option<String>,
    /// Destination relative to the engine's scratch root
    #[serde(default)]
    pub destination: String,
    /// Title used to locate the job on the conversion host
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatePipelineResponse {
    pub id: PipelineId,
}

#[derive(Debug, Serialize)]
pub struct ListPipelinesResponse {
    pub pipelines: Vec<PipelineSummary>,
    pub total: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct PipelineErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(PipelineErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// Answer for every unusable `torrent_path`, whatever the cause.
const TORRENT_UNAVAILABLE: &str = "torrent_path does not name an available .torrent file";

/// Read a `.torrent` file from inside `torrent_dir`. Returns the file name and
/// contents.
async fn read_torrent(
    torrent_dir: Option<&FsPath>,
    requested: &str,
) -> Result<(String, Vec<u8>), Response> {
    let Some(dir) = torrent_dir else {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "torrent_path submissions are disabled",
        ));
    };
    let unavailable = || error_response(StatusCode::BAD_REQUEST, TORRENT_UNAVAILABLE);

    let relative = FsPath::new(requested);
    let well_formed = relative
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("torrent"))
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !well_formed {
        warn!(torrent_path = requested, "Rejected torrent path");
        return Err(unavailable());
    }

    // Symlinks may point outside the directory; compare resolved paths
    let resolved = match (
        tokio::fs::canonicalize(dir).await,
        tokio::fs::canonicalize(dir.join(relative)).await,
    ) {
        (Ok(root), Ok(path)) if path.starts_with(&root) => path,
        (Ok(_), Ok(path)) => {
            warn!(torrent_path = requested, resolved = %path.display(), "Torrent path escapes torrent_dir");
            return Err(unavailable());
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!(torrent_path = requested, "Cannot resolve torrent path: {}", e);
            return Err(unavailable());
        }
    };

    let data = tokio::fs::read(&resolved).await.map_err(|e| {
        warn!(torrent_path = requested, "Cannot read torrent file: {}", e);
        unavailable()
    })?;
    let filename = relative
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.torrent".to_string());
    Ok((filename, data))
}

impl CreatePipelineBody {
    async fn into_request(self, torrent_dir: Option<&FsPath>) -> Result<PipelineRequest, Response> {
        let payload = match (self.magnet_uri, self.torrent_path) {
            (Some(uri), None) => {
                if !uri.trim().starts_with("magnet:") {
                    return Err(error_response(
                        StatusCode::BAD_REQUEST,
                        "magnet_uri must start with 'magnet:'",
                    ));
                }
                JobPayload::magnet(uri.trim())
            }
            (None, Some(path)) => {
                let (filename, data) = read_torrent(torrent_dir, &path).await?;
                JobPayload::torrent_file(data).with_filename(filename)
            }
            _ => {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    "Exactly one of magnet_uri or torrent_path is required",
                ))
            }
        };

        let mut request = PipelineRequest::new(payload, self.destination);
        if let Some(title) = self.title {
            request = request.with_title(title);
        }
        Ok(request)
    }
}

fn orchestrator_error(e: OrchestratorError) -> Response {
    let status = match &e {
        OrchestratorError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        OrchestratorError::PipelineNotFound(_) => StatusCode::NOT_FOUND,
        // The download engine is an upstream service
        OrchestratorError::Engine(_) => StatusCode::BAD_GATEWAY,
    };
    error_response(status, e.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a job and start tracking it
pub async fn create_pipeline(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreatePipelineBody>,
) -> Response {
    let request = match body.into_request(state.torrent_dir()).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    match state.orchestrator().submit(request).await {
        Ok(handle) => {
            info!(pipeline_id = %handle.id, "Pipeline created via API");
            // HTTP clients follow the pipeline through GET or the websocket
            drop(handle.updates);
            (
                StatusCode::CREATED,
                Json(CreatePipelineResponse { id: handle.id }),
            )
                .into_response()
        }
        Err(e) => {
            warn!("Pipeline submission failed: {}", e);
            orchestrator_error(e)
        }
    }
}

/// List running pipelines
pub async fn list_pipelines(State(state): State<Arc<AppState>>) -> Json<ListPipelinesResponse> {
    let pipelines = state.orchestrator().list().await;
    Json(ListPipelinesResponse {
        total: pipelines.len(),
        pipelines,
    })
}

/// Get a pipeline by ID
pub async fn get_pipeline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<PipelineSummary>, Response> {
    state
        .orchestrator()
        .get(PipelineId(id))
        .await
        .map(Json)
        .ok_or_else(|| {
            error_response(
                StatusCode::NOT_FOUND,
                format!("Pipeline not found: {}", id),
            )
        })
}

/// Stop a pipeline (DELETE endpoint). Repeated stops also return 204.
pub async fn stop_pipeline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Response {
    match state.orchestrator().stop(PipelineId(id)).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => orchestrator_error(e),
    }
}
