use crate::error::LedgerError;
use crate::models::payment::{Payment, PaymentSummary};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

const INITIAL_CAPACITY: usize = 10_000;

/// In-memory record of settled payments plus running per-processor totals.
///
/// History and totals live behind one lock so a reader never sees a count
/// without its amount.
pub struct Ledger {
    inner: RwLock<LedgerState>,
}

struct LedgerState {
    payments: Vec<Payment>,
    totals: PaymentSummary,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(LedgerState {
                payments: Vec::with_capacity(capacity),
                totals: PaymentSummary::default(),
            }),
        }
    }

    pub fn append(&self, payment: Payment) -> Result<(), LedgerError> {
        let kind = payment.processor.ok_or(LedgerError::Unsettled)?;

        let mut state = self.inner.write();
        state
            .totals
            .for_processor_mut(kind)
            .try_record(payment.amount)
            .ok_or(LedgerError::Overflow(kind))?;
        state.payments.push(payment);
        Ok(())
    }

    /// Totals for payments requested within `[from, to]`, both bounds
    /// inclusive. Without bounds the running totals are returned as is.
    pub fn summary(&self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> PaymentSummary {
        let state = self.inner.read();

        if from.is_none() && to.is_none() {
            return state.totals;
        }

        let mut summary = PaymentSummary::default();
        for payment in state.payments.iter() {
            if from.is_some_and(|from| payment.requested_at < from) {
                continue;
            }
            if to.is_some_and(|to| payment.requested_at > to) {
                continue;
            }
            if let Some(kind) = payment.processor {
                summary.for_processor_mut(kind).record(payment.amount);
            }
        }
        summary
    }

    pub fn len(&self) -> usize {
        self.inner.read().payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
