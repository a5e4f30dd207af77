use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use voice_relay_core::session::{Role, SessionStore, Transcript};
use voice_relay_providers::{GenerationParams, LanguageModel, ModelError, ModelResult};
use voice_relay_server::{build_router, AppState, Dispatcher};

/// Model that always answers the same way and counts calls
struct FixedModel {
    reply: ModelResult<String>,
    calls: AtomicUsize,
}

impl FixedModel {
    fn ok(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(err: ModelError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(err),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LanguageModel for FixedModel {
    async fn generate(
        &self,
        _history: &Transcript,
        _utterance: &str,
        params: GenerationParams,
    ) -> ModelResult<String> {
        assert!((params.temperature - 0.5).abs() < f32::EPSILON);
        assert_eq!(params.max_output_tokens, 500);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }

    fn model_name(&self) -> String {
        "fixed".to_string()
    }
}

struct Harness {
    router: Router,
    store: Arc<SessionStore>,
    _dir: TempDir,
}

fn harness(model: Arc<FixedModel>) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SessionStore::open(dir.path()).unwrap());
    let dispatcher = Dispatcher::new(model, Arc::clone(&store), GenerationParams::default());
    Harness {
        router: build_router(AppState::new(Arc::new(dispatcher))),
        store,
        _dir: dir,
    }
}

async fn post_chat(router: &Router, body: impl Into<Body>) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri("/chat")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap();

    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn speech(value: &Value) -> &str {
    value["response"]["outputSpeech"]["text"].as_str().unwrap()
}

fn intent_body(user: &str, query: &str) -> String {
    json!({
        "version": "1.0",
        "session": {"user": {"userId": user}},
        "request": {
            "type": "IntentRequest",
            "intent": {"name": "ChatIntent", "slots": {"query": {"name": "query", "value": query}}}
        }
    })
    .to_string()
}

#[tokio::test]
async fn launch_request_welcomes() {
    let model = FixedModel::ok("unused");
    let h = harness(model.clone());

    let body = json!({
        "session": {"user": {"userId": "u1"}},
        "request": {"type": "LaunchRequest"}
    });
    let (status, value) = post_chat(&h.router, body.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(speech(&value), "Welcome to Gemini. How can I help you today?");
    assert_eq!(value["response"]["shouldEndSession"], false);
    assert_eq!(value["response"]["outputSpeech"]["type"], "PlainText");
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_query_asks_to_repeat() {
    let h = harness(FixedModel::ok("unused"));

    let (status, value) = post_chat(&h.router, intent_body("u1", "")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(speech(&value), "I didn't quite catch that. Could you repeat it?");
    assert_eq!(value["response"]["shouldEndSession"], false);
    assert!(h.store.list().unwrap().is_empty());
}

#[tokio::test]
async fn first_turn_persists_two_turn_transcript() {
    let h = harness(FixedModel::ok("It is sunny"));

    let (status, value) =
        post_chat(&h.router, intent_body("amzn1.ask.account.NEW", "What is the weather")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(speech(&value), "It is sunny");

    let transcript = h.store.load("amzn1.ask.account.NEW").unwrap();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript.turns()[0].role, Role::User);
    assert_eq!(transcript.turns()[0].text(), "What is the weather");
    assert_eq!(transcript.turns()[1].role, Role::Model);
    assert_eq!(transcript.turns()[1].text(), "It is sunny");
}

#[tokio::test]
async fn rate_limit_error_is_spoken_and_nothing_saved() {
    let h = harness(FixedModel::failing(ModelError::quota("429 quota exceeded")));

    let (status, value) = post_chat(&h.router, intent_body("u1", "hello")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        speech(&value),
        "Sorry, I ran into an error: 429 quota exceeded"
    );
    assert!(h.store.list().unwrap().is_empty());
}

#[tokio::test]
async fn unrecognized_request_type_falls_back() {
    let h = harness(FixedModel::ok("unused"));

    let body = json!({
        "session": {"user": {"userId": "u1"}},
        "request": {"type": "SessionEndedRequest", "reason": "USER_INITIATED"}
    });
    let (status, value) = post_chat(&h.router, body.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(speech(&value), "I'm not sure how to handle that request.");
    assert_eq!(value["response"]["shouldEndSession"], false);
}

#[tokio::test]
async fn malformed_body_still_gets_an_envelope() {
    let h = harness(FixedModel::ok("unused"));

    let (status, value) = post_chat(&h.router, "{not json").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(speech(&value), "I'm not sure how to handle that request.");
}

#[tokio::test]
async fn index_reports_liveness() {
    let h = harness(FixedModel::ok("unused"));

    let req = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = h.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"Voice relay is running!");
}
