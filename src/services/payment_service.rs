use crate::error::ValidationError;
use crate::models::payment::{Payment, PaymentRequest, PaymentSummary, ProcessorKind};
use crate::services::atomic_metrics::AtomicMetrics;
use crate::services::dispatcher::PaymentDispatcher;
use crate::services::ledger::Ledger;
use crate::utils::money::Money;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

// R$ 1 bilhão por pagamento
pub const MAX_PAYMENT: Money = Money::from_cents(100_000_000_000);

#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryFilters {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub struct PaymentService {
    dispatcher: Arc<PaymentDispatcher>,
    ledger: Arc<Ledger>,
    metrics: Arc<AtomicMetrics>,
}

impl PaymentService {
    pub fn new(dispatcher: Arc<PaymentDispatcher>, ledger: Arc<Ledger>, metrics: Arc<AtomicMetrics>) -> Self {
        Self {
            dispatcher,
            ledger,
            metrics,
        }
    }

    /// Validates the request and schedules settlement on its own task. The
    /// caller only learns that the payment was accepted.
    pub fn submit_payment(&self, request: PaymentRequest) -> Result<(), ValidationError> {
        let payment = match validate(request) {
            Ok(payment) => payment,
            Err(e) => {
                self.metrics.increment_rejected();
                return Err(e);
            }
        };

        self.metrics.increment_accepted();
        debug!("Accepted payment {}", payment.correlation_id);

        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            dispatcher.process(payment).await;
        });
        Ok(())
    }

    pub fn get_summary(&self, filters: SummaryFilters) -> PaymentSummary {
        self.ledger.summary(filters.from, filters.to)
    }

    pub fn get_metrics(&self) -> serde_json::Value {
        serde_json::json!({
            "payments": self.metrics.snapshot(),
            "ledger_size": self.ledger.len(),
            "circuit_breakers": {
                "default": format!("{:?}", self.dispatcher.breaker_state(ProcessorKind::Default)),
                "fallback": format!("{:?}", self.dispatcher.breaker_state(ProcessorKind::Fallback)),
            }
        })
    }
}

fn validate(request: PaymentRequest) -> Result<Payment, ValidationError> {
    if request.correlation_id.is_empty() {
        return Err(ValidationError::MissingCorrelationId);
    }
    let amount = Money::from_decimal(request.amount).ok_or(ValidationError::InvalidAmount)?;
    if !amount.is_positive() {
        return Err(ValidationError::NonPositiveAmount);
    }
    if amount > MAX_PAYMENT {
        return Err(ValidationError::AmountTooLarge(MAX_PAYMENT));
    }

    Ok(Payment::new(request.correlation_id, amount, Utc::now()))
}
