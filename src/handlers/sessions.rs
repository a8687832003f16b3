//! # Session Observability Handlers
//!
//! REST access to the live session set and to each session's recorded
//! protocol events: connect time, STT latency, barge-in latencies, and
//! total event count.

use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// `GET /api/v1/sessions`: ids of all live sessions plus capacity.
pub async fn list_sessions(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let mut ids = state.registry.active_ids();
    ids.sort();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "count": ids.len(),
        "max_sessions": state.registry.capacity(),
        "sessions": ids
    })))
}

/// `GET /api/v1/sessions/{session_id}/metrics`: one session summary.
///
/// Unknown ids surface as 404 at this boundary.
pub async fn session_metrics(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let session_id = path.into_inner();

    let metrics = state
        .registry
        .metrics(&session_id)
        .ok_or_else(|| AppError::NotFound(format!("No session with id '{}'", session_id)))?;

    let summary = metrics.lock().unwrap().summary();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "metrics": summary
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::session::metrics::MetricsRecorder;
    use actix_web::http::StatusCode;
    use actix_web::ResponseError;
    use std::sync::{Arc, Mutex};

    #[actix_web::test]
    async fn test_unknown_session_returns_not_found() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let result = session_metrics(state, web::Path::from("missing".to_string())).await;

        let err = result.err().expect("lookup should fail");
        assert_eq!(err.error_response().status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_known_session_returns_summary() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let recorder = Arc::new(Mutex::new(MetricsRecorder::new("s1".to_string())));
        state.registry.insert("s1", recorder).unwrap();

        let response = session_metrics(state, web::Path::from("s1".to_string()))
            .await
            .expect("lookup should succeed");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
