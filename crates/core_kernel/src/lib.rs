//! Core Kernel - Foundational types shared by the agency backend
//!
//! - Money types with precise decimal arithmetic
//! - Strongly-typed identifiers
//! - The ports/adapters vocabulary (`PortError`, health checks)
//! - Agency-local timezone handling

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod ports;
pub mod error;

pub use money::{Money, Currency, MoneyError};
pub use temporal::Timezone;
pub use identifiers::{ClientId, InvoiceId, PaymentId, UserId, CaregiverId, VisitNoteId};
pub use ports::{
    PortError, DomainPort, CircuitBreakerConfig, AdapterHealth,
    HealthCheckResult, HealthCheckable,
};
pub use error::CoreError;
