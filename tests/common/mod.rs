#![allow(dead_code)]

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use payment_gateway::app::config::Config;
use payment_gateway::app::server;
use payment_gateway::services::coordination::{CoordinationStore, InMemoryCoordinationStore};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Scriptable stand-in for a payment processor.
#[derive(Default)]
pub struct MockProcessor {
    pub reject_payments: AtomicBool,
    pub failing: AtomicBool,
    pub payments: AtomicUsize,
    pub health_checks: AtomicUsize,
}

impl MockProcessor {
    pub fn payments(&self) -> usize {
        self.payments.load(Ordering::SeqCst)
    }

    pub fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }
}

async fn accept_payment(State(mock): State<Arc<MockProcessor>>, Json(_body): Json<Value>) -> StatusCode {
    mock.payments.fetch_add(1, Ordering::SeqCst);
    if mock.reject_payments.load(Ordering::SeqCst) {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

async fn service_health(State(mock): State<Arc<MockProcessor>>) -> Json<Value> {
    mock.health_checks.fetch_add(1, Ordering::SeqCst);
    Json(serde_json::json!({
        "failing": mock.failing.load(Ordering::SeqCst),
        "minResponseTime": 0
    }))
}

pub async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

pub async fn spawn_processor() -> (Arc<MockProcessor>, String) {
    let mock = Arc::new(MockProcessor::default());
    let app = Router::new()
        .route("/payments", post(accept_payment))
        .route("/payments/service-health", get(service_health))
        .with_state(mock.clone());
    (mock, spawn(app).await)
}

pub struct Gateway {
    pub url: String,
    pub client: reqwest::Client,
}

impl Gateway {
    pub async fn post_payment(&self, body: Value) -> (u16, Value) {
        let response = self
            .client
            .post(format!("{}/payments", self.url))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    pub async fn summary(&self, query: &str) -> Value {
        self.client
            .get(format!("{}/payments-summary{}", self.url, query))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    /// Polls the summary until `done` holds, settlement being asynchronous.
    pub async fn wait_for_summary(&self, done: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..100 {
            let summary = self.summary("").await;
            if done(&summary) {
                return summary;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.summary("").await
    }
}

pub fn config_for(default_url: &str, fallback_url: &str) -> Config {
    Config {
        default_processor_url: default_url.to_string(),
        fallback_processor_url: fallback_url.to_string(),
        redis_url: String::new(),
        payment_timeout_ms: 500,
        dispatch_deadline_ms: 1500,
        ..Config::default()
    }
}

pub async fn spawn_gateway(config: &Config, store: Arc<dyn CoordinationStore>) -> Gateway {
    let health = server::build_health_coordinator(config);
    health.attach_store(store);
    let service = server::build_service(config, health).unwrap();
    let url = spawn(server::router(service)).await;
    Gateway {
        url,
        client: reqwest::Client::new(),
    }
}

pub async fn spawn_default_gateway(default_url: &str, fallback_url: &str) -> Gateway {
    spawn_gateway(
        &config_for(default_url, fallback_url),
        Arc::new(InMemoryCoordinationStore::new()),
    )
    .await
}
