//! Invoice delivery
//!
//! Renders an invoice as an email to the client and stamps it as sent.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use core_kernel::InvoiceId;

use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceStatus};
use crate::notification::EmailTemplates;
use crate::ports::{BillingStore, Notifier};

/// Confirmation of an emailed invoice
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDelivery {
    pub invoice: Invoice,
    pub recipient: String,
    pub sent_at: DateTime<Utc>,
    /// False when the email went out but the invoice could not be marked sent
    pub stamped: bool,
}

/// Emails invoices to clients
#[derive(Clone)]
pub struct InvoiceMailer {
    store: Arc<dyn BillingStore>,
    notifier: Arc<dyn Notifier>,
    templates: EmailTemplates,
}

impl InvoiceMailer {
    pub fn new(
        store: Arc<dyn BillingStore>,
        notifier: Arc<dyn Notifier>,
        templates: EmailTemplates,
    ) -> Self {
        Self {
            store,
            notifier,
            templates,
        }
    }

    /// Emails the invoice to its client; drafts become `Sent`
    ///
    /// The invoice is only stamped once the relay accepted the message. If
    /// the stamp cannot be written the delivery still succeeds with
    /// `stamped: false`, so a retry does not email the client twice.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn send_invoice(&self, invoice_id: InvoiceId) -> Result<InvoiceDelivery, BillingError> {
        let invoice = self.store.get_invoice(invoice_id).await?;
        if invoice.status == InvoiceStatus::Cancelled {
            return Err(BillingError::invalid_request(format!(
                "invoice {} is cancelled",
                invoice.invoice_number
            )));
        }

        let client = self.store.get_client(invoice.client_id).await?;
        let recipient = client
            .contact_email()
            .ok_or_else(|| {
                BillingError::invalid_request(format!("client {} has no email address", client.id))
            })?
            .to_string();

        let sent_at = Utc::now();
        let message = self.templates.invoice(&recipient, &client, &invoice, sent_at)?;
        self.notifier
            .send(&message)
            .await
            .map_err(BillingError::Notification)?;

        // The email is already out; a stamping failure must not invite a resend
        let (invoice, stamped) = match self.store.mark_invoice_sent(invoice.id, sent_at).await {
            Ok(stamped) => (stamped, true),
            Err(e) => {
                warn!(
                    error = %e,
                    invoice = %invoice.invoice_number,
                    "Invoice emailed but could not be marked sent"
                );
                (invoice, false)
            }
        };
        info!(
            invoice = %invoice.invoice_number,
            status = invoice.status.as_str(),
            stamped,
            "Invoice emailed"
        );

        Ok(InvoiceDelivery {
            invoice,
            recipient,
            sent_at,
            stamped,
        })
    }
}
