//! Voice platform request and response envelopes
//!
//! Only the fields the relay reads are modelled; everything else in the
//! platform's request is ignored.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of the intent slot carrying the user's free-form utterance
pub const QUERY_SLOT: &str = "query";

/// Envelope version reported in every response
pub const RESPONSE_VERSION: &str = "1.0";

/// Inbound platform request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillRequest {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub session: Option<SkillSession>,
    #[serde(default)]
    pub request: Option<RequestBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillSession {
    #[serde(default)]
    pub user: Option<SkillUser>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillUser {
    #[serde(rename = "userId", default)]
    pub user_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestBody {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub intent: Option<Intent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Intent {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slots: Option<HashMap<String, Slot>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Slot {
    #[serde(default)]
    pub value: Option<String>,
}

/// What kind of turn a request represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    /// The user opened the skill
    Launch,
    /// The user said something; `None` when the query slot is empty
    Intent { utterance: Option<&'a str> },
    /// Any other request type, including a missing one
    Unrecognized(&'a str),
}

impl SkillRequest {
    /// Classify the request by its `request.type`
    pub fn classify(&self) -> Inbound<'_> {
        let Some(body) = &self.request else {
            return Inbound::Unrecognized("");
        };
        match body.kind.as_str() {
            "LaunchRequest" => Inbound::Launch,
            "IntentRequest" => Inbound::Intent {
                utterance: body.utterance(),
            },
            other => Inbound::Unrecognized(other),
        }
    }

    /// Platform user identifier, empty when absent
    pub fn user_id(&self) -> &str {
        self.session
            .as_ref()
            .and_then(|s| s.user.as_ref())
            .map(|u| u.user_id.as_str())
            .unwrap_or("")
    }
}

impl RequestBody {
    /// Raw value of the query slot, if it holds anything besides whitespace
    pub fn utterance(&self) -> Option<&str> {
        self.intent
            .as_ref()?
            .slots
            .as_ref()?
            .get(QUERY_SLOT)?
            .value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
    }
}

/// Outbound platform response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillResponse {
    pub version: String,
    pub response: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    pub output_speech: OutputSpeech,
    pub should_end_session: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpeech {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl SkillResponse {
    /// Plain-text speech that keeps the session open
    pub fn speak(text: impl Into<String>) -> Self {
        Self {
            version: RESPONSE_VERSION.to_string(),
            response: ResponseBody {
                output_speech: OutputSpeech {
                    kind: "PlainText".to_string(),
                    text: text.into(),
                },
                should_end_session: false,
            },
        }
    }

    pub fn text(&self) -> &str {
        &self.response.output_speech.text
    }
}
