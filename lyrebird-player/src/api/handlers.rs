//! HTTP request handlers

use crate::api::AppContext;
use crate::audio::CpalSink;
use crate::error::Error;
use crate::session::{GenerationConfig, WeightedPrompt};
use crate::storage::Preset;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Serialize)]
pub struct PlaybackStateResponse {
    state: String,
    connection_broken: bool,
}

#[derive(Debug, Serialize)]
pub struct PositionResponse {
    state: String,
    elapsed_seconds: f64,
    captured_segments: usize,
}

#[derive(Debug, Deserialize)]
pub struct PromptsRequest {
    prompts: Vec<WeightedPrompt>,
}

#[derive(Debug, Serialize)]
pub struct PromptsResponse {
    prompts: Vec<WeightedPrompt>,
    filtered: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    volume: u8, // 0-100 user-facing scale
}

#[derive(Debug, Serialize)]
pub struct VolumeResponse {
    volume: u8,
}

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    devices: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PresetListResponse {
    presets: Vec<String>,
}

type HandlerError = (StatusCode, Json<StatusResponse>);

/// Map internal errors onto HTTP status codes.
fn error_response(e: Error) -> HandlerError {
    let status = match &e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::Export(_) => StatusCode::CONFLICT,
        Error::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}

fn ok() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "lyrebird_player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Playback Control Endpoints
// ============================================================================

/// POST /playback/play - Begin or resume playback
///
/// Returns 503 while the session connection is down; a reconnect has
/// been requested and the client should retry after SetupComplete.
pub async fn play(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.engine.play().map_err(error_response)?;
    Ok(ok())
}

/// POST /playback/pause - Pause playback
pub async fn pause(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.engine.pause().map_err(error_response)?;
    Ok(ok())
}

/// POST /playback/stop - Stop playback and discard captured audio
pub async fn stop(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.engine.stop().map_err(error_response)?;
    Ok(ok())
}

/// POST /playback/reset - Reset the generation context
pub async fn reset_context(
    State(ctx): State<AppContext>,
) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.engine.reset_context().map_err(error_response)?;
    Ok(ok())
}

/// GET /playback/state - Current playback state
pub async fn get_playback_state(State(ctx): State<AppContext>) -> Json<PlaybackStateResponse> {
    Json(PlaybackStateResponse {
        state: ctx.engine.state().to_string(),
        connection_broken: ctx.engine.is_connection_broken(),
    })
}

/// GET /playback/position - Elapsed playing time and capture size
pub async fn get_position(State(ctx): State<AppContext>) -> Json<PositionResponse> {
    Json(PositionResponse {
        state: ctx.engine.state().to_string(),
        elapsed_seconds: ctx.engine.elapsed_seconds(),
        captured_segments: ctx.engine.capture_len(),
    })
}

// ============================================================================
// Generation Control Endpoints
// ============================================================================

/// GET /prompts - Active prompts and rejected prompt texts
pub async fn get_prompts(State(ctx): State<AppContext>) -> Json<PromptsResponse> {
    Json(PromptsResponse {
        prompts: ctx.engine.active_prompts(),
        filtered: ctx.engine.filtered_prompts(),
    })
}

/// POST /prompts - Replace the weighted prompt set
///
/// Rapid calls within the coalescing window collapse to one session
/// submission.
pub async fn set_prompts(
    State(ctx): State<AppContext>,
    Json(request): Json<PromptsRequest>,
) -> Result<Json<StatusResponse>, HandlerError> {
    if request.prompts.iter().any(|p| p.weight < 0.0) {
        return Err(error_response(Error::InvalidInput(
            "prompt weights must be non-negative".to_string(),
        )));
    }

    info!("prompts updated: {} entries", request.prompts.len());
    ctx.engine.set_weighted_prompts(request.prompts);
    Ok(ok())
}

/// POST /generation-config - Replace the generation config
pub async fn set_generation_config(
    State(ctx): State<AppContext>,
    Json(config): Json<GenerationConfig>,
) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.engine.set_generation_config(config);
    Ok(ok())
}

// ============================================================================
// Export Endpoint
// ============================================================================

/// GET /export - Download captured audio as a WAV file
///
/// 409 when nothing has been captured.
pub async fn export_wav(State(ctx): State<AppContext>) -> Result<impl IntoResponse, HandlerError> {
    let (file_name, bytes) = ctx.engine.export_wav().map_err(error_response)?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    ))
}

// ============================================================================
// Audio Device Endpoints
// ============================================================================

/// GET /audio/devices - List available audio output devices
pub async fn list_audio_devices() -> Result<Json<DeviceListResponse>, HandlerError> {
    match CpalSink::list_devices() {
        Ok(devices) => {
            info!("found {} audio devices", devices.len());
            Ok(Json(DeviceListResponse { devices }))
        }
        Err(e) => {
            error!("failed to list audio devices: {}", e);
            Err(error_response(e))
        }
    }
}

/// GET /audio/volume - Current volume (0-100)
pub async fn get_volume(State(ctx): State<AppContext>) -> Json<VolumeResponse> {
    Json(VolumeResponse {
        volume: (ctx.engine.volume() * 100.0).round() as u8,
    })
}

/// POST /audio/volume - Set volume (0-100)
pub async fn set_volume(
    State(ctx): State<AppContext>,
    Json(request): Json<VolumeRequest>,
) -> Result<Json<VolumeResponse>, HandlerError> {
    if request.volume > 100 {
        return Err(error_response(Error::InvalidInput(
            "volume must be 0-100".to_string(),
        )));
    }

    ctx.engine.set_volume(request.volume as f32 / 100.0);
    Ok(Json(VolumeResponse {
        volume: request.volume,
    }))
}

// ============================================================================
// Preset Endpoints
// ============================================================================

/// GET /presets - List saved preset names
pub async fn list_presets(
    State(ctx): State<AppContext>,
) -> Result<Json<PresetListResponse>, HandlerError> {
    let presets = ctx.presets.list().map_err(error_response)?;
    Ok(Json(PresetListResponse { presets }))
}

/// GET /presets/:name - Fetch one preset
pub async fn get_preset(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
) -> Result<Json<Preset>, HandlerError> {
    match ctx.presets.load(&name).map_err(error_response)? {
        Some(preset) => Ok(Json(preset)),
        None => Err(error_response(Error::NotFound(format!(
            "preset {:?}",
            name
        )))),
    }
}

/// PUT /presets/:name - Save a preset
pub async fn save_preset(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
    Json(preset): Json<Preset>,
) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.presets.save(&name, &preset).map_err(error_response)?;
    info!("preset {:?} saved", name);
    Ok(ok())
}

/// DELETE /presets/:name - Delete a preset
pub async fn delete_preset(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.presets.delete(&name).map_err(error_response)?;
    Ok(ok())
}

/// POST /presets/:name/apply - Load a preset and submit it to the session
pub async fn apply_preset(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
) -> Result<Json<StatusResponse>, HandlerError> {
    let preset = match ctx.presets.load(&name).map_err(error_response)? {
        Some(preset) => preset,
        None => {
            return Err(error_response(Error::NotFound(format!(
                "preset {:?}",
                name
            ))))
        }
    };

    info!("applying preset {:?}", name);
    ctx.engine.set_weighted_prompts(preset.prompts);
    ctx.engine.set_generation_config(preset.config);
    Ok(ok())
}
