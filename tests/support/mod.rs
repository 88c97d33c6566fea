//! Stub downstream services for integration tests.
//!
//! Each stub is a small axum router on an ephemeral localhost port that counts
//! and records the requests it receives.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use linguaflow::{HttpTransport, OrchestratorConfig, ServiceConfig};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// How a stub answers its capability endpoint.
#[derive(Clone)]
pub enum Reply {
    Json(Value),
    Audio(Vec<u8>),
    Status(u16, &'static str),
    Slow(Duration, Value),
}

#[derive(Clone)]
struct StubState {
    reply: Reply,
    calls: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

pub struct Stub {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Value>>>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Stub {
    pub async fn serve(path: &str, reply: Reply) -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            reply,
            calls: calls.clone(),
            bodies: bodies.clone(),
        };
        let app = Router::new()
            .route(path, post(answer))
            .route("/health", get(|| async { Json(json!({"status": "healthy"})) }))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    signal.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            calls,
            bodies,
            shutdown,
            task,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.bodies.lock().unwrap().clone()
    }

    /// Stops accepting connections and waits until the server is gone.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        self.task.await.unwrap();
    }
}

async fn answer(State(state): State<StubState>, body: Bytes) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);
    let parsed = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state.bodies.lock().unwrap().push(parsed);

    match state.reply {
        Reply::Json(value) => Json(value).into_response(),
        Reply::Audio(bytes) => ([(header::CONTENT_TYPE, "audio/mpeg")], bytes).into_response(),
        Reply::Status(code, text) => (StatusCode::from_u16(code).unwrap(), text).into_response(),
        Reply::Slow(delay, value) => {
            tokio::time::sleep(delay).await;
            Json(value).into_response()
        }
    }
}

pub fn completion(content: &str) -> Reply {
    Reply::Json(json!({"choices": [{"message": {"content": content}}]}))
}

pub fn embedding() -> Reply {
    Reply::Json(json!({"embedding": [0.1, 0.2, 0.3], "dimensions": 3}))
}

pub fn audio() -> Reply {
    Reply::Audio(vec![0x49, 0x44, 0x33])
}

/// The three default services.
pub struct Stack {
    pub llm: Stub,
    pub embedding: Stub,
    pub tts: Stub,
}

impl Stack {
    pub async fn start(llm: Reply, embedding: Reply, tts: Reply) -> Self {
        Self {
            llm: Stub::serve("/v1/chat/completions", llm).await,
            embedding: Stub::serve("/v1/embeddings", embedding).await,
            tts: Stub::serve("/v1/tts", tts).await,
        }
    }

    pub async fn healthy() -> Self {
        Self::start(completion("Guten Morgen"), embedding(), audio()).await
    }

    pub fn config(&self) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default();
        point_at(&mut config.language_model, &self.llm);
        point_at(&mut config.embedding, &self.embedding);
        point_at(&mut config.speech, &self.tts);
        config
    }
}

fn point_at(service: &mut ServiceConfig, stub: &Stub) {
    service.host = "127.0.0.1".to_string();
    service.port = stub.addr.port();
}

/// HTTP transport without idle connection reuse, so a stopped stub is seen as gone.
pub fn transport() -> Arc<HttpTransport> {
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap();
    Arc::new(HttpTransport::with_client(client))
}
