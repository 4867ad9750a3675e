//! Stripe Payment Gateway Adapter
//!
//! Charges are created as confirmed PaymentIntents through the Stripe REST
//! API (form-encoded, bearer auth with the secret key). The idempotency key
//! travels in the `Idempotency-Key` header, so Stripe replays the original
//! verdict when the same attempt is submitted twice.
//!
//! # Error Handling
//!
//! Responses that carry a verdict become a [`ChargeOutcome`]:
//! - 2xx -> PaymentIntent status as reported
//! - 402 card errors -> `Declined`, with the decline code as the message
//!
//! Everything else is a `PortError` and means no verdict was obtained:
//! - 400 `idempotency_error` / 409 -> `PortError::Conflict`
//! - other 400 -> `PortError::Validation`
//! - 401/403 -> `PortError::Unauthorized`
//! - 429 -> `PortError::RateLimited`
//! - 5xx -> `PortError::ServiceUnavailable`
//! - Timeouts -> `PortError::Timeout`

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use core_kernel::{
    AdapterHealth, CircuitBreakerConfig, DomainPort, HealthCheckResult, HealthCheckable, PortError,
};

use super::circuit_breaker::CircuitBreaker;
use crate::idempotency::IdempotencyKey;
use crate::payment::{GatewayStatus, PaymentMethod};
use crate::ports::{ChargeOutcome, ChargeRequest, PaymentGateway};

const SERVICE: &str = "stripe";

/// Configuration for the Stripe adapter
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Secret API key (`sk_live_...` / `sk_test_...`)
    pub secret_key: String,

    /// API root, overridable for testing
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            base_url: "https://api.stripe.com".to_string(),
            timeout_secs: 30,
            circuit_breaker: Some(CircuitBreakerConfig::default()),
        }
    }
}

impl StripeConfig {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// `PaymentGateway` backed by Stripe PaymentIntents
#[derive(Debug)]
pub struct StripeGateway {
    config: StripeConfig,
    http: reqwest::Client,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Result<Self, PortError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PortError::Internal {
                message: "failed to build HTTP client".to_string(),
                source: Some(Box::new(e)),
            })?;
        let circuit_breaker = config
            .circuit_breaker
            .clone()
            .map(|cb| Arc::new(CircuitBreaker::new(SERVICE, cb)));

        Ok(Self {
            config,
            http,
            circuit_breaker,
        })
    }

    pub async fn is_circuit_open(&self) -> bool {
        match &self.circuit_breaker {
            Some(cb) => !cb.is_available().await,
            None => false,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post_form(
        &self,
        operation: &'static str,
        path: &str,
        key: &IdempotencyKey,
        form: &[(String, String)],
    ) -> Result<Response, PortError> {
        if let Some(cb) = &self.circuit_breaker {
            cb.guard().await?;
        }

        self.http
            .post(self.url(path))
            .bearer_auth(&self.config.secret_key)
            .header("Idempotency-Key", key.as_str())
            .form(form)
            .send()
            .await
            .map_err(|e| self.transport_error(operation, e))
    }

    fn transport_error(&self, operation: &'static str, err: reqwest::Error) -> PortError {
        if err.is_timeout() {
            PortError::Timeout {
                operation: operation.to_string(),
                duration_ms: self.config.timeout_secs * 1000,
            }
        } else {
            PortError::Connection {
                message: format!("Stripe {} request failed", operation),
                source: Some(Box::new(err)),
            }
        }
    }

    async fn observe<T>(&self, result: &Result<T, PortError>) {
        if let Some(cb) = &self.circuit_breaker {
            cb.observe(result).await;
        }
    }

    async fn charge_outcome(response: Response) -> Result<ChargeOutcome, PortError> {
        let status = response.status();
        if status.is_success() {
            let intent: PaymentIntent = response
                .json()
                .await
                .map_err(|e| PortError::transformation(format!("unreadable PaymentIntent: {}", e)))?;
            return Ok(intent.into_outcome(None));
        }

        let retry_after = retry_after_secs(&response);
        let body = response.text().await.unwrap_or_default();
        let error = serde_json::from_str::<ErrorEnvelope>(&body).ok().map(|e| e.error);

        match (status, error) {
            (StatusCode::PAYMENT_REQUIRED, Some(error)) => Ok(error.into_declined()),
            (StatusCode::BAD_REQUEST, Some(error)) if error.is_idempotency_error() => {
                Err(PortError::conflict(error.describe()))
            }
            // A confirmation failure on an existing intent still carries a verdict
            (StatusCode::BAD_REQUEST, Some(error)) if error.payment_intent.is_some() => {
                let message = error.describe();
                match error.payment_intent {
                    Some(intent) => Ok(intent.into_outcome(Some(message))),
                    None => Err(PortError::validation(message)),
                }
            }
            (other, error) => Err(status_error(other, error, retry_after)),
        }
    }
}

/// Maps a non-verdict HTTP status to a `PortError`
fn status_error(status: StatusCode, error: Option<StripeError>, retry_after: u64) -> PortError {
    let message = error
        .map(|e| e.describe())
        .unwrap_or_else(|| format!("Stripe returned {}", status));

    match status {
        StatusCode::BAD_REQUEST | StatusCode::PAYMENT_REQUIRED | StatusCode::NOT_FOUND => {
            PortError::validation(message)
        }
        StatusCode::CONFLICT => PortError::conflict(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized { message },
        StatusCode::TOO_MANY_REQUESTS => PortError::RateLimited {
            retry_after_secs: retry_after,
        },
        s if s.is_server_error() => PortError::ServiceUnavailable {
            service: format!("{} ({})", SERVICE, s),
        },
        _ => PortError::internal(message),
    }
}

fn retry_after_secs(response: &Response) -> u64 {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(1)
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    status: String,
    #[serde(default)]
    payment_method_types: Vec<String>,
    last_payment_error: Option<StripeError>,
}

impl PaymentIntent {
    fn into_outcome(self, message: Option<String>) -> ChargeOutcome {
        let method = self
            .payment_method_types
            .first()
            .map(|m| PaymentMethod::parse(m))
            .unwrap_or(PaymentMethod::Card);
        let failure_message = message.or_else(|| self.last_payment_error.map(|e| e.describe()));

        ChargeOutcome {
            status: GatewayStatus::from(self.status),
            reference: Some(self.id),
            method,
            failure_message,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<String>,
    decline_code: Option<String>,
    message: Option<String>,
    payment_intent: Option<Box<PaymentIntent>>,
}

impl StripeError {
    fn is_idempotency_error(&self) -> bool {
        self.kind.as_deref() == Some("idempotency_error")
    }

    fn describe(&self) -> String {
        let code = self.decline_code.as_deref().or(self.code.as_deref());
        match (self.message.as_deref(), code) {
            (Some(message), Some(code)) => format!("{} ({})", message, code),
            (Some(message), None) => message.to_string(),
            (None, Some(code)) => code.to_string(),
            (None, None) => "unknown Stripe error".to_string(),
        }
    }

    fn into_declined(self) -> ChargeOutcome {
        let message = self.describe();
        ChargeOutcome::declined(self.payment_intent.map(|pi| pi.id), message)
    }
}

#[derive(Debug, Deserialize)]
struct Refund {
    id: String,
    status: String,
}

impl DomainPort for StripeGateway {}

#[async_trait]
impl HealthCheckable for StripeGateway {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();

        if self.is_circuit_open().await {
            return HealthCheckResult {
                adapter_id: "stripe-gateway".to_string(),
                status: AdapterHealth::Degraded,
                latency_ms: 0,
                message: Some("Circuit breaker is open".to_string()),
                checked_at: Utc::now(),
            };
        }

        let result = self
            .http
            .get(self.url("v1/balance"))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (status, message) = match result {
            Ok(r) if r.status().is_success() => (AdapterHealth::Healthy, None),
            Ok(r) => (
                AdapterHealth::Unhealthy,
                Some(format!("Stripe returned {}", r.status())),
            ),
            Err(e) => (AdapterHealth::Unhealthy, Some(e.to_string())),
        };

        HealthCheckResult {
            adapter_id: "stripe-gateway".to_string(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(
        skip(self, request),
        fields(invoice_id = %request.invoice_id, attempt = request.attempt_number)
    )]
    async fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, PortError> {
        let amount = request
            .amount
            .to_minor_units()
            .map_err(|e| PortError::validation_field(e.to_string(), "amount"))?;

        let mut form = vec![
            ("amount".to_string(), amount.to_string()),
            ("currency".to_string(), request.amount.currency().code().to_lowercase()),
            ("payment_method".to_string(), request.payment_method_id.clone()),
            ("confirm".to_string(), "true".to_string()),
            ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
            ("automatic_payment_methods[allow_redirects]".to_string(), "never".to_string()),
            ("description".to_string(), request.description.clone()),
            ("metadata[invoice_id]".to_string(), request.invoice_id.to_string()),
            ("metadata[client_id]".to_string(), request.client_id.to_string()),
            ("metadata[attempt_number]".to_string(), request.attempt_number.to_string()),
        ];
        if let Some(email) = &request.receipt_email {
            form.push(("receipt_email".to_string(), email.clone()));
        }

        let result = match self
            .post_form("create_charge", "v1/payment_intents", &request.idempotency_key, &form)
            .await
        {
            Ok(response) => Self::charge_outcome(response).await,
            Err(e) => Err(e),
        };
        self.observe(&result).await;

        match &result {
            Ok(outcome) => debug!(status = %outcome.status, reference = ?outcome.reference, "Stripe verdict"),
            Err(e) => warn!(error = %e, "Stripe charge gave no verdict"),
        }
        result
    }

    #[instrument(skip(self, idempotency_key))]
    async fn refund_charge(
        &self,
        reference: &str,
        idempotency_key: &IdempotencyKey,
    ) -> Result<(), PortError> {
        let form = vec![("payment_intent".to_string(), reference.to_string())];

        let result = match self
            .post_form("refund_charge", "v1/refunds", idempotency_key, &form)
            .await
        {
            Ok(response) if response.status().is_success() => response
                .json::<Refund>()
                .await
                .map(|refund| debug!(refund_id = %refund.id, status = %refund.status, "Refund created"))
                .map_err(|e| PortError::transformation(format!("unreadable Refund: {}", e))),
            Ok(response) => {
                let status = response.status();
                let retry_after = retry_after_secs(&response);
                let body = response.text().await.unwrap_or_default();
                let error = serde_json::from_str::<ErrorEnvelope>(&body).ok().map(|e| e.error);
                Err(status_error(status, error, retry_after))
            }
            Err(e) => Err(e),
        };
        self.observe(&result).await;
        result
    }
}
