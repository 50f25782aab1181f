use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{health_check, submit};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/submit", post(submit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::LatestPointQuerier;
    use crate::infrastructure::ecocounter::test_server;
    use crate::infrastructure::sqlite_store::SqliteStore;

    async fn serve() -> (String, SqliteStore) {
        let store = SqliteStore::open_in_memory().unwrap();
        let state = Arc::new(AppState {
            submitter: Arc::new(store.clone()),
        });
        (test_server(build_router(state)).await, store)
    }

    #[tokio::test]
    async fn test_submit_stores_points() {
        let (base, store) = serve().await;

        let resp = reqwest::Client::new()
            .post(format!("{}/submit", base))
            .body(r#"{"id":"test-1","direction_id":"nb","points":[{"time":3600,"resolution":2,"value":7}]}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);

        let latest = store.latest_point("test-1", "nb").await.unwrap().unwrap();
        assert_eq!(latest.time.timestamp(), 3600);
        assert_eq!(latest.value, 7.0);
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_json() {
        let (base, _) = serve().await;

        let resp = reqwest::Client::new()
            .post(format!("{}/submit", base))
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let (base, _) = serve().await;
        let body = reqwest::get(format!("{}/health", base)).await.unwrap().text().await.unwrap();
        assert_eq!(body, "ok");
    }
}
