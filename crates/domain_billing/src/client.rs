//! Client billing identity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::ClientId;

/// A client receiving care services and the invoices for them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub full_name: String,
    /// Receipt and invoice address; clients without one get no email
    pub email: Option<String>,
    pub phone: Option<String>,
    pub billing_address: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    pub fn new(full_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ClientId::new_v7(),
            full_name: full_name.into(),
            email: None,
            phone: None,
            billing_address: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_billing_address(mut self, address: impl Into<String>) -> Self {
        self.billing_address = Some(address.into());
        self
    }

    /// Email address usable for delivery, ignoring blank values
    pub fn contact_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}
