use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::models::payment::PaymentSummary;
use crate::services::{PaymentService, SummaryFilters};

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    from: Option<String>,
    to: Option<String>,
}

pub async fn get_summary(
    State(service): State<Arc<PaymentService>>,
    Query(query): Query<SummaryQuery>,
) -> Json<PaymentSummary> {
    let filters = SummaryFilters {
        from: parse_bound("from", query.from.as_deref()),
        to: parse_bound("to", query.to.as_deref()),
    };

    Json(service.get_summary(filters))
}

// Limites inválidos são ignorados, como se não tivessem sido enviados.
fn parse_bound(name: &str, raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(e) => {
            warn!("Ignoring invalid '{}' bound {:?}: {}", name, raw, e);
            None
        }
    }
}
