use axum::{body::Bytes, extract::State, Json};

use crate::alexa::{SkillRequest, SkillResponse};
use crate::state::AppState;

pub const LIVENESS_MESSAGE: &str = "Voice relay is running!";

pub async fn index_handler() -> &'static str {
    LIVENESS_MESSAGE
}

/// Platform webhook. Always answers 200 with a speech envelope; bodies that
/// do not parse are handled like an unrecognized request type.
pub async fn chat_handler(State(state): State<AppState>, body: Bytes) -> Json<SkillResponse> {
    let request = match serde_json::from_slice::<SkillRequest>(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Malformed platform request: {}", e);
            SkillRequest::default()
        }
    };

    Json(state.dispatcher.dispatch(&request).await)
}
