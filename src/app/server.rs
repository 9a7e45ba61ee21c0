use crate::app::config::Config;
use crate::error::CoordinationError;
use crate::handlers::{self, health_handler, payments, payments_summary};
use crate::models::payment::ProcessorKind;
use crate::services::atomic_metrics::AtomicMetrics;
use crate::services::circuit_breaker::CircuitBreaker;
use crate::services::coordination::{CoordinationStore, InMemoryCoordinationStore, RedisCoordinationStore};
use crate::services::dispatcher::{DispatchTimeouts, PaymentDispatcher, Route};
use crate::services::health_coordinator::HealthCoordinator;
use crate::services::http_client_pool::build_http_client;
use crate::services::ledger::Ledger;
use crate::services::payment_processor_client::PaymentProcessorClient;
use crate::services::PaymentService;
use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const REDIS_RETRY_INTERVAL: Duration = Duration::from_secs(2);
const MAX_IDLE_PER_HOST: usize = 50;

/// Health coordinator with no store attached yet; checks are throttled per
/// instance until `connect_coordination_store` attaches one.
pub fn build_health_coordinator(config: &Config) -> Arc<HealthCoordinator> {
    Arc::new(HealthCoordinator::new(
        None,
        config.health_check_window(),
        config.health_check_timeout(),
        config.coordination_timeout(),
    ))
}

/// Attaches the coordination store. An empty `redis_url` selects the
/// in-process store. If Redis is unreachable the coordinator keeps throttling
/// locally while a background task retries until Redis comes up.
pub async fn connect_coordination_store(config: &Config, health: &Arc<HealthCoordinator>) {
    if config.redis_url.is_empty() {
        info!("No REDIS_URL configured, using in-process coordination store");
        health.attach_store(Arc::new(InMemoryCoordinationStore::new()));
        return;
    }

    let redis_url = config.redis_url.clone();
    let connect = move || {
        let redis_url = redis_url.clone();
        async move {
            let store = RedisCoordinationStore::connect(&redis_url, REDIS_CONNECT_TIMEOUT).await?;
            Ok::<_, CoordinationError>(Arc::new(store) as Arc<dyn CoordinationStore>)
        }
    };

    match connect().await {
        Ok(store) => health.attach_store(store),
        Err(e) => {
            warn!(
                "Redis unavailable at {} ({}), health checks throttled per instance until it comes up",
                config.redis_url, e
            );
            let health = health.clone();
            tokio::spawn(async move {
                tokio::time::sleep(REDIS_RETRY_INTERVAL).await;
                health.attach_store_when_ready(connect, REDIS_RETRY_INTERVAL).await;
            });
        }
    }
}

/// Composition root: every shared component is built once here and handed
/// down explicitly.
pub fn build_service(config: &Config, health: Arc<HealthCoordinator>) -> anyhow::Result<Arc<PaymentService>> {
    let http_client = build_http_client(MAX_IDLE_PER_HOST).context("failed to build HTTP client")?;

    let route = |kind: ProcessorKind, url: &str| {
        let client = PaymentProcessorClient::new(
            http_client.clone(),
            kind,
            url,
            config.payment_timeout(),
            config.health_check_timeout(),
        );
        let breaker = CircuitBreaker::new(config.circuit_breaker_threshold, config.circuit_breaker_cooldown());
        Route::new(Arc::new(client), breaker)
    };

    let ledger = Arc::new(Ledger::new());
    let metrics = Arc::new(AtomicMetrics::new());

    let dispatcher = Arc::new(PaymentDispatcher::new(
        route(ProcessorKind::Default, &config.default_processor_url),
        route(ProcessorKind::Fallback, &config.fallback_processor_url),
        health,
        ledger.clone(),
        metrics.clone(),
        DispatchTimeouts {
            attempt: config.payment_timeout(),
            deadline: config.dispatch_deadline(),
        },
    ));

    Ok(Arc::new(PaymentService::new(dispatcher, ledger, metrics)))
}

pub fn router(service: Arc<PaymentService>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/payments", post(payments::create_payment))
        .route("/payments-summary", get(payments_summary::get_summary))
        .route("/metrics", get(handlers::metrics::get_metrics))
        .with_state(service)
}

pub async fn serve(config: Config) -> anyhow::Result<()> {
    info!("Starting payment gateway on port {}", config.server_port);

    let health = build_health_coordinator(&config);
    connect_coordination_store(&config, &health).await;
    let service = build_service(&config, health)?;
    let app = router(service);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
