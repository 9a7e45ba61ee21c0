use crate::models::payment::ProcessorKind;
use thiserror::Error;

/// Rejections raised at intake, before a payment reaches the dispatcher.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("correlationId is required")]
    MissingCorrelationId,
    #[error("amount must be positive")]
    NonPositiveAmount,
    #[error("amount is not a valid number")]
    InvalidAmount,
    #[error("amount exceeds the maximum of {0}")]
    AmountTooLarge(crate::utils::money::Money),
    #[error("invalid json: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("processor {0} unhealthy")]
    Unhealthy(ProcessorKind),
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("processor returned status {0}")]
    Status(u16),
    #[error("processor call timed out")]
    Timeout,
    #[error("dispatch deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Error, Debug)]
pub enum CoordinationError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("coordination store timed out")]
    Timeout,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerError {
    #[error("payment has no settling processor")]
    Unsettled,
    #[error("{0} total would overflow")]
    Overflow(ProcessorKind),
}
