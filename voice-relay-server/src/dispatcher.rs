//! Request dispatcher: platform request in, spoken reply out

use std::sync::Arc;
use tracing::{debug, error, info, warn};
use voice_relay_core::session::{merge_turn, storage_key, SessionStore};
use voice_relay_core::utils::truncate;
use voice_relay_core::Error;
use voice_relay_providers::{GenerationParams, LanguageModel};

use crate::alexa::{Inbound, SkillRequest, SkillResponse};
use crate::locks::KeyLocks;

pub const WELCOME_MESSAGE: &str = "Welcome to Gemini. How can I help you today?";
pub const REPROMPT_MESSAGE: &str = "I didn't quite catch that. Could you repeat it?";
pub const UNRECOGNIZED_MESSAGE: &str = "I'm not sure how to handle that request.";

/// Routes platform requests to canned replies or a model conversation
pub struct Dispatcher {
    model: Arc<dyn LanguageModel>,
    store: Arc<SessionStore>,
    params: GenerationParams,
    locks: KeyLocks,
}

impl Dispatcher {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        store: Arc<SessionStore>,
        params: GenerationParams,
    ) -> Self {
        Self {
            model,
            store,
            params,
            locks: KeyLocks::default(),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Produce the response envelope for a request; never fails
    pub async fn dispatch(&self, request: &SkillRequest) -> SkillResponse {
        let text = match request.classify() {
            Inbound::Launch => {
                info!("Launch request");
                WELCOME_MESSAGE.to_string()
            }
            Inbound::Intent { utterance: None } => {
                info!("Intent request without an utterance");
                REPROMPT_MESSAGE.to_string()
            }
            Inbound::Intent {
                utterance: Some(utterance),
            } => self.converse(request.user_id(), utterance).await,
            Inbound::Unrecognized(kind) => {
                info!(request_type = kind, "Unrecognized request");
                UNRECOGNIZED_MESSAGE.to_string()
            }
        };
        SkillResponse::speak(text)
    }

    /// Run one conversational turn for `user_id` and return the text to speak
    pub async fn converse(&self, user_id: &str, utterance: &str) -> String {
        let key = storage_key(user_id);
        let _guard = self.locks.acquire(&key).await;

        let history = match self.store.load(user_id) {
            Ok(history) => history,
            Err(e) => return self.session_failure(user_id, &key, e),
        };

        info!(
            key = %key,
            history_turns = history.len(),
            model = %self.model.model_name(),
            "Generating reply"
        );
        debug!(utterance = %truncate(utterance, 120), "User utterance");

        match self.model.generate(&history, utterance, self.params).await {
            Ok(reply) => {
                let merged = merge_turn(history, utterance, &reply);
                if let Err(e) = self.store.save(user_id, &merged) {
                    error!(key = %key, error = %e, "Failed to save session");
                }
                reply
            }
            Err(e) => {
                warn!(key = %key, kind = %e.kind, error = %e, "Model call failed");
                format!("Sorry, I ran into an error: {}", e)
            }
        }
    }

    fn session_failure(&self, user_id: &str, key: &str, e: Error) -> String {
        error!(key = %key, error = %e, "Failed to load session");
        if matches!(e, Error::CorruptSession { .. }) {
            if let Err(discard_err) = self.store.discard(user_id) {
                error!(key = %key, error = %discard_err, "Failed to discard corrupt session");
            }
        }
        format!("Sorry, I couldn't load our conversation: {}", e)
    }
}
