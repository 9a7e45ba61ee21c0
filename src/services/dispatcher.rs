use crate::error::UpstreamError;
use crate::models::payment::{Payment, ProcessorKind, ProcessorPayload};
use crate::services::atomic_metrics::AtomicMetrics;
use crate::services::circuit_breaker::{CallError, CircuitBreaker, CircuitBreakerState};
use crate::services::health_coordinator::HealthCoordinator;
use crate::services::ledger::Ledger;
use crate::services::payment_processor_client::ProcessorGateway;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, warn};

/// One upstream together with the breaker that guards it.
pub struct Route {
    gateway: Arc<dyn ProcessorGateway>,
    breaker: CircuitBreaker,
}

impl Route {
    pub fn new(gateway: Arc<dyn ProcessorGateway>, breaker: CircuitBreaker) -> Self {
        Self { gateway, breaker }
    }

    pub fn kind(&self) -> ProcessorKind {
        self.gateway.kind()
    }

    pub fn breaker_state(&self) -> CircuitBreakerState {
        self.breaker.state()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchTimeouts {
    /// Limit for a single settlement call.
    pub attempt: Duration,
    /// Shared by both attempts of one payment.
    pub deadline: Duration,
}

pub struct PaymentDispatcher {
    default: Route,
    fallback: Route,
    health: Arc<HealthCoordinator>,
    ledger: Arc<Ledger>,
    metrics: Arc<AtomicMetrics>,
    timeouts: DispatchTimeouts,
}

impl PaymentDispatcher {
    pub fn new(
        default: Route,
        fallback: Route,
        health: Arc<HealthCoordinator>,
        ledger: Arc<Ledger>,
        metrics: Arc<AtomicMetrics>,
        timeouts: DispatchTimeouts,
    ) -> Self {
        Self {
            default,
            fallback,
            health,
            ledger,
            metrics,
            timeouts,
        }
    }

    /// Settles `payment` on the default processor, failing over to the
    /// fallback once. Settled payments are appended to the ledger; a payment
    /// both processors refuse is dropped. Returns the settling processor.
    pub async fn process(&self, mut payment: Payment) -> Option<ProcessorKind> {
        let deadline = Instant::now() + self.timeouts.deadline;
        let payload = payment.to_payload();

        let mut last_error = None;
        for route in [&self.default, &self.fallback] {
            match self.try_route(route, &payload, deadline).await {
                Ok(()) => {
                    let kind = route.kind();
                    payment.processor = Some(kind);
                    if let Err(e) = self.ledger.append(payment) {
                        error!("Failed to record payment {}: {}", payload.correlation_id, e);
                        return None;
                    }
                    self.metrics.increment_settled(kind);
                    debug!("Payment {} processed by {} processor", payload.correlation_id, kind);
                    return Some(kind);
                }
                Err(e) => {
                    warn!("Payment {} not settled by {} processor: {}", payload.correlation_id, route.kind(), e);
                    last_error = Some(e);
                }
            }
        }

        self.metrics.increment_dropped();
        error!(
            correlation_id = %payload.correlation_id,
            "Failed to process payment: {}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        );
        None
    }

    async fn try_route(&self, route: &Route, payload: &ProcessorPayload, deadline: Instant) -> Result<(), UpstreamError> {
        let result = route
            .breaker
            .call(move || async move {
                timeout_at(deadline, self.attempt(route, payload))
                    .await
                    .unwrap_or(Err(UpstreamError::DeadlineExceeded))
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(CallError::Open) => Err(UpstreamError::CircuitOpen),
            Err(CallError::Failed(e)) => Err(e),
        }
    }

    async fn attempt(&self, route: &Route, payload: &ProcessorPayload) -> Result<(), UpstreamError> {
        let gateway = route.gateway.as_ref();
        if !self.health.is_eligible(gateway).await {
            return Err(UpstreamError::Unhealthy(gateway.kind()));
        }

        timeout(self.timeouts.attempt, gateway.submit(payload))
            .await
            .unwrap_or(Err(UpstreamError::Timeout))
    }

    pub fn breaker_state(&self, kind: ProcessorKind) -> CircuitBreakerState {
        match kind {
            ProcessorKind::Default => self.default.breaker_state(),
            ProcessorKind::Fallback => self.fallback.breaker_state(),
        }
    }
}
