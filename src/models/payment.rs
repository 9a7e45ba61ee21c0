use crate::utils::money::Money;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorKind {
    Default,
    Fallback,
}

impl ProcessorKind {
    pub const ALL: [ProcessorKind; 2] = [ProcessorKind::Default, ProcessorKind::Fallback];

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessorKind::Default => "default",
            ProcessorKind::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Corpo recebido em POST /payments
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
    pub amount: f64,
}

/// A payment accepted at intake. `processor` stays `None` until an upstream
/// settles it; only settled payments reach the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub correlation_id: String,
    pub amount: Money,
    pub requested_at: DateTime<Utc>,
    pub processor: Option<ProcessorKind>,
}

impl Payment {
    pub fn new(correlation_id: impl Into<String>, amount: Money, requested_at: DateTime<Utc>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            amount,
            requested_at,
            processor: None,
        }
    }

    pub fn to_payload(&self) -> ProcessorPayload {
        ProcessorPayload {
            correlation_id: self.correlation_id.clone(),
            amount: self.amount.to_decimal(),
            requested_at: self.requested_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

// Payload para enviar aos Payment Processors
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessorPayload {
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
    pub amount: f64,
    #[serde(rename = "requestedAt")]
    pub requested_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckResponse {
    pub failing: bool,
    #[serde(rename = "minResponseTime", default)]
    pub min_response_time: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorSummary {
    #[serde(rename = "totalRequests")]
    pub total_requests: u64,
    #[serde(rename = "totalAmount")]
    pub total_amount: Money,
}

impl ProcessorSummary {
    pub fn record(&mut self, amount: Money) {
        self.total_requests += 1;
        self.total_amount = self.total_amount.saturating_add(amount);
    }

    /// Like `record`, but leaves the summary untouched when the amount total
    /// would overflow.
    pub fn try_record(&mut self, amount: Money) -> Option<()> {
        let total_amount = self.total_amount.checked_add(amount)?;
        self.total_requests += 1;
        self.total_amount = total_amount;
        Some(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PaymentSummary {
    pub default: ProcessorSummary,
    pub fallback: ProcessorSummary,
}

impl PaymentSummary {
    pub fn for_processor_mut(&mut self, kind: ProcessorKind) -> &mut ProcessorSummary {
        match kind {
            ProcessorKind::Default => &mut self.default,
            ProcessorKind::Fallback => &mut self.fallback,
        }
    }
}
