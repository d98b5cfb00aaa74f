use crate::config::RagConfig;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::Value;
use std::sync::{Arc, Mutex};

pub const STUB_API_KEY: &str = "stub-key";

/// One request as the stub server saw it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub path: String,
    pub query: Option<String>,
    pub api_key: Option<String>,
    pub body: Value,
}

type Responder = dyn Fn(&RecordedCall) -> (StatusCode, Value) + Send + Sync;

#[derive(Clone)]
struct StubState {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    respond: Arc<Responder>,
}

/// Local stand-in for the Gemini REST API, listening on an ephemeral port.
pub struct GeminiStub {
    base_url: String,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl GeminiStub {
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&RecordedCall) -> (StatusCode, Value) + Send + Sync + 'static,
    {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            calls: calls.clone(),
            respond: Arc::new(respond),
        };
        let router = Router::new().fallback(record_and_respond).with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            calls,
        }
    }

    pub fn config(&self) -> RagConfig {
        RagConfig {
            api_key: STUB_API_KEY.to_string(),
            api_base_url: self.base_url.clone(),
            ..RagConfig::default()
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

async fn record_and_respond(
    State(state): State<StubState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let call = RecordedCall {
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        api_key: headers
            .get("x-goog-api-key")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    };

    let (status, json) = (state.respond)(&call);
    state.calls.lock().unwrap().push(call);
    (status, Json(json)).into_response()
}
