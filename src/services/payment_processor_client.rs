use crate::error::UpstreamError;
use crate::models::payment::{HealthCheckResponse, ProcessorKind, ProcessorPayload};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Outbound contract shared by both payment processors.
#[async_trait]
pub trait ProcessorGateway: Send + Sync {
    fn kind(&self) -> ProcessorKind;

    async fn submit(&self, payload: &ProcessorPayload) -> Result<(), UpstreamError>;

    async fn service_health(&self) -> Result<HealthCheckResponse, UpstreamError>;
}

pub struct PaymentProcessorClient {
    client: Client,
    kind: ProcessorKind,
    payments_url: String,
    health_url: String,
    payment_timeout: Duration,
    health_timeout: Duration,
}

impl PaymentProcessorClient {
    pub fn new(
        client: Client,
        kind: ProcessorKind,
        base_url: &str,
        payment_timeout: Duration,
        health_timeout: Duration,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/');
        Self {
            client,
            kind,
            payments_url: format!("{}/payments", base_url),
            health_url: format!("{}/payments/service-health", base_url),
            payment_timeout,
            health_timeout,
        }
    }
}

#[async_trait]
impl ProcessorGateway for PaymentProcessorClient {
    fn kind(&self) -> ProcessorKind {
        self.kind
    }

    async fn submit(&self, payload: &ProcessorPayload) -> Result<(), UpstreamError> {
        let response = self
            .client
            .post(&self.payments_url)
            .timeout(self.payment_timeout)
            .json(payload)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if status.is_success() {
            debug!("{} processor accepted payment {}", self.kind, payload.correlation_id);
            Ok(())
        } else {
            Err(UpstreamError::Status(status.as_u16()))
        }
    }

    async fn service_health(&self) -> Result<HealthCheckResponse, UpstreamError> {
        let response = self
            .client
            .get(&self.health_url)
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        response.json::<HealthCheckResponse>().await.map_err(classify)
    }
}

fn classify(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout
    } else {
        UpstreamError::Transport(err)
    }
}
