pub mod atomic_metrics;
pub mod circuit_breaker;
pub mod coordination;
pub mod dispatcher;
pub mod health_coordinator;
pub mod http_client_pool;
pub mod ledger;
pub mod payment_processor_client;
pub mod payment_service;

pub use payment_service::{PaymentService, SummaryFilters};
pub use payment_processor_client::{PaymentProcessorClient, ProcessorGateway};
