//! Gateway idempotency keys
//!
//! A key is derived from `(invoice_id, attempt_number)`. The attempt number
//! is the count of recorded payments on the invoice plus one, so a request
//! retried after a transport failure (no payment recorded) reuses the same
//! key and the gateway returns the original charge instead of a new one.

use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::InvoiceId;

/// Idempotency key sent with a charge request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Key for charge attempt `attempt_number` (1-based) on `invoice_id`
    pub fn for_attempt(invoice_id: InvoiceId, attempt_number: u32) -> Self {
        Self(format!(
            "invoice-{}-attempt-{}",
            invoice_id.as_uuid().simple(),
            attempt_number
        ))
    }

    /// Key for the compensating refund of a charge
    pub fn for_refund(&self) -> Self {
        Self(format!("{}-refund", self.0))
    }

    /// Wraps a key read back from storage
    pub fn from_stored(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
