//! External Adapters for the Billing Domain
//!
//! HTTP implementations of the outbound billing ports:
//!
//! - **StripeGateway**: `PaymentGateway` over the Stripe PaymentIntents API
//! - **HttpEmailNotifier**: `Notifier` over a JSON email relay
//!
//! Both share a circuit breaker so a failing provider is not hammered while
//! requests are piling up.
//!
//! ```rust,ignore
//! use domain_billing::adapters::{StripeConfig, StripeGateway};
//! use domain_billing::PaymentGateway;
//! use std::sync::Arc;
//!
//! let gateway: Arc<dyn PaymentGateway> =
//!     Arc::new(StripeGateway::new(StripeConfig::new(secret_key))?);
//! ```

mod circuit_breaker;
pub mod email;
pub mod stripe;

pub use email::{EmailRelayConfig, HttpEmailNotifier};
pub use stripe::{StripeConfig, StripeGateway};
