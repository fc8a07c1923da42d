// libs/conversation-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use shared_models::error::AppError;

use crate::services::workflow::AppointmentWorkflow;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

/// POST /conversations/{thread_id}/messages
pub async fn post_message(
    State(workflow): State<Arc<AppointmentWorkflow>>,
    Path(thread_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<Value>, AppError> {
    if thread_id.trim().is_empty() {
        return Err(AppError::BadRequest("Thread id must not be empty".to_string()));
    }

    info!("Turn for thread {}", thread_id);
    let reply = workflow.handle_message(&thread_id, &request.message).await;

    Ok(Json(json!({
        "response": reply.message,
        "status": reply.status,
        "step": reply.step,
    })))
}

/// GET /conversations/{thread_id}
pub async fn get_conversation(
    State(workflow): State<Arc<AppointmentWorkflow>>,
    Path(thread_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let state = workflow
        .state_of(&thread_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("No conversation for thread {}", thread_id)))?;

    Ok(Json(json!({
        "thread_id": state.thread_id,
        "step": state.current_step,
        "messages": state.messages,
        "booking_id": state.booking_id,
    })))
}
