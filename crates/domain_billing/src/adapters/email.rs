//! HTTP Email Relay Adapter
//!
//! Posts each message as JSON (`{from, to, subject, body}`) to a
//! transactional-email relay authenticated with a bearer API key.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

use core_kernel::{
    AdapterHealth, CircuitBreakerConfig, DomainPort, HealthCheckResult, HealthCheckable, PortError,
};

use super::circuit_breaker::CircuitBreaker;
use crate::ports::{EmailMessage, Notifier};

/// Configuration for the email relay
#[derive(Debug, Clone)]
pub struct EmailRelayConfig {
    /// Full URL messages are POSTed to
    pub endpoint: String,
    pub api_key: String,
    /// Sender address, e.g. `"Sunrise Home Care <billing@sunrise.example>"`
    pub from: String,
    pub timeout_secs: u64,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl Default for EmailRelayConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            from: String::new(),
            timeout_secs: 10,
            circuit_breaker: Some(CircuitBreakerConfig::default()),
        }
    }
}

#[derive(Debug, Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// `Notifier` that delivers through an HTTP email relay
#[derive(Debug)]
pub struct HttpEmailNotifier {
    config: EmailRelayConfig,
    http: reqwest::Client,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl HttpEmailNotifier {
    pub fn new(config: EmailRelayConfig) -> Result<Self, PortError> {
        if config.endpoint.is_empty() {
            return Err(PortError::validation_field("email relay endpoint is required", "endpoint"));
        }
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
            .map(|cb| Arc::new(CircuitBreaker::new("email-relay", cb)));

        Ok(Self {
            config,
            http,
            circuit_breaker,
        })
    }

    async fn deliver(&self, message: &EmailMessage) -> Result<(), PortError> {
        let payload = RelayPayload {
            from: &self.config.from,
            to: &message.to,
            subject: &message.subject,
            body: &message.body,
        };

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PortError::Timeout {
                        operation: "send_email".to_string(),
                        duration_ms: self.config.timeout_secs * 1000,
                    }
                } else {
                    PortError::Connection {
                        message: "email relay request failed".to_string(),
                        source: Some(Box::new(e)),
                    }
                }
            })?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PortError::Unauthorized {
                message: "email relay rejected the API key".to_string(),
            }),
            StatusCode::TOO_MANY_REQUESTS => Err(PortError::RateLimited { retry_after_secs: 1 }),
            s if s.is_server_error() => Err(PortError::ServiceUnavailable {
                service: format!("email relay ({})", s),
            }),
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(PortError::validation(format!("email relay returned {}: {}", s, body)))
            }
        }
    }
}

impl DomainPort for HttpEmailNotifier {}

#[async_trait]
impl HealthCheckable for HttpEmailNotifier {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let open = match &self.circuit_breaker {
            Some(cb) => !cb.is_available().await,
            None => false,
        };

        HealthCheckResult {
            adapter_id: "email-relay".to_string(),
            status: if open {
                AdapterHealth::Degraded
            } else {
                AdapterHealth::Healthy
            },
            latency_ms: start.elapsed().as_millis() as u64,
            message: open.then(|| "Circuit breaker is open".to_string()),
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl Notifier for HttpEmailNotifier {
    #[instrument(skip(self, message), fields(subject = %message.subject))]
    async fn send(&self, message: &EmailMessage) -> Result<(), PortError> {
        if let Some(cb) = &self.circuit_breaker {
            cb.guard().await?;
        }

        let result = self.deliver(message).await;
        if let Some(cb) = &self.circuit_breaker {
            cb.observe(&result).await;
        }
        if result.is_ok() {
            debug!("Email accepted by relay");
        }
        result
    }
}
