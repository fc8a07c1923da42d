use std::sync::Arc;

use axum::{routing::get, Router};

use conversation_cell::router::conversation_routes;
use conversation_cell::services::workflow::AppointmentWorkflow;

pub fn create_router(workflow: Arc<AppointmentWorkflow>) -> Router {
    Router::new()
        .route("/", get(|| async { "Scheduling assistant API is running!" }))
        .nest("/conversations", conversation_routes(workflow))
}
