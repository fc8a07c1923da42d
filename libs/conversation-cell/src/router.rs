// libs/conversation-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::services::workflow::AppointmentWorkflow;

pub fn conversation_routes(workflow: Arc<AppointmentWorkflow>) -> Router {
    Router::new()
        .route("/{thread_id}/messages", post(handlers::post_message))
        .route("/{thread_id}", get(handlers::get_conversation))
        .with_state(workflow)
}
