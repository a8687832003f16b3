use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "audio": {
                "voice_threshold": config.audio.voice_threshold,
                "voice_start_frames": config.audio.voice_start_frames,
                "silence_end_frames": config.audio.silence_end_frames
            },
            "synthesis": {
                "min_reply_secs": config.synthesis.min_reply_secs,
                "words_per_sec": config.synthesis.words_per_sec
            },
            "performance": {
                "max_concurrent_sessions": config.performance.max_concurrent_sessions
            }
        }
    })))
}

pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config.update_from_json(&json_str)?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": {
            "server": {
                "host": current_config.server.host,
                "port": current_config.server.port
            },
            "audio": {
                "voice_threshold": current_config.audio.voice_threshold,
                "voice_start_frames": current_config.audio.voice_start_frames,
                "silence_end_frames": current_config.audio.silence_end_frames
            },
            "synthesis": {
                "min_reply_secs": current_config.synthesis.min_reply_secs,
                "words_per_sec": current_config.synthesis.words_per_sec
            },
            "performance": {
                "max_concurrent_sessions": current_config.performance.max_concurrent_sessions
            }
        }
    })))
}
