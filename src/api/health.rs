use crate::api::AppState;
use axum::extract::State;
use axum::Json;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once some epoch data is available, cached or fetched.
pub async fn ready(State(state): State<AppState>) -> Json<serde_json::Value> {
    let view = state.engine.view();
    let status = if view.epoch_info.is_some() {
        "ready"
    } else {
        "starting"
    };
    Json(serde_json::json!({
        "status": status,
        "lastSuccessfulFetchTime": view.last_successful_fetch_time,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_returns_ok() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
    }
}
