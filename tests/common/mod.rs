use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use serde_json::Value;

use dsa_tutor_backend::assistant::OfflineTutor;
use dsa_tutor_backend::catalog::InMemoryCatalog;
use dsa_tutor_backend::config::TutorConfig;
use dsa_tutor_backend::routes::build_router;
use dsa_tutor_backend::state::AppState;
use dsa_tutor_backend::store::InMemoryStore;

/// Router over the built-in catalog, an in-memory store, and the offline tutor.
pub fn create_test_app() -> Router {
    create_test_app_with(TutorConfig::default())
}

pub fn create_test_app_with(config: TutorConfig) -> Router {
    let catalog = Arc::new(InMemoryCatalog::from_config(&config));
    let state = AppState::with_parts(config, catalog, Arc::new(InMemoryStore::new()), Arc::new(OfflineTutor));
    build_router(Arc::new(state))
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
