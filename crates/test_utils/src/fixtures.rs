//! Pre-built Test Fixtures
//!
//! Ready-to-use data for clients, staff and visits. Values are fixed so
//! assertions in different crates can rely on them.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use core_kernel::{CaregiverId, ClientId, Currency, Money, Timezone, UserId};
use domain_billing::{Client, Role, StaffUser};
use rust_decimal_macros::dec;
use uuid::Uuid;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// Hourly rate for personal care visits
    pub fn hourly_rate() -> Money {
        Money::new(dec!(40.00), Currency::USD)
    }

    /// A typical partial payment
    pub fn usd_50() -> Money {
        Money::new(dec!(50.00), Currency::USD)
    }

    pub fn usd_zero() -> Money {
        Money::zero(Currency::USD)
    }

    /// Creates a CAD amount for currency mismatch tests
    pub fn cad_50() -> Money {
        Money::new(dec!(50.00), Currency::CAD)
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    pub fn issue_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    /// Net 30 from the issue date
    pub fn due_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()
    }

    pub fn visit_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    pub fn visit_start() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    pub fn visit_end() -> NaiveTime {
        NaiveTime::from_hms_opt(11, 30, 0).unwrap()
    }

    /// 2025-03-14 18:30 UTC, which is 14:30 in New York
    pub fn submitted_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 18, 30, 0).unwrap()
    }

    pub fn agency_timezone() -> Timezone {
        Timezone::new(chrono_tz::America::New_York)
    }
}

/// Fixture for identifier test data
pub struct IdFixtures;

impl IdFixtures {
    /// Creates a deterministic client ID for testing
    pub fn client_id() -> ClientId {
        ClientId::from(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440001").unwrap())
    }

    /// Creates a deterministic caregiver ID for testing
    pub fn caregiver_id() -> CaregiverId {
        CaregiverId::from(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440002").unwrap())
    }

    /// Creates a deterministic staff user ID for testing
    pub fn admin_id() -> UserId {
        UserId::from(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440003").unwrap())
    }
}

/// Fixture for clients and portal users
pub struct PeopleFixtures;

impl PeopleFixtures {
    /// A client with an email address on file
    pub fn client() -> Client {
        let mut client = Client::new("Walter Brennan")
            .with_email("walter@example.com")
            .with_phone("+1 555 0100")
            .with_billing_address("12 Elm Street, Springfield");
        client.id = IdFixtures::client_id();
        client
    }

    /// A client with no email, so receipts cannot be sent
    pub fn client_without_email() -> Client {
        Client::new("Edith Crane")
    }

    pub fn admin() -> StaffUser {
        StaffUser {
            id: IdFixtures::admin_id(),
            full_name: "Dana Ortiz".to_string(),
            email: "dana@agency.example".to_string(),
            role: Role::Admin,
        }
    }

    pub fn billing_clerk() -> StaffUser {
        StaffUser {
            id: UserId::new(),
            full_name: "Sam Lee".to_string(),
            email: "sam@agency.example".to_string(),
            role: Role::Billing,
        }
    }
}

/// Fixture for string test data
pub struct StringFixtures;

impl StringFixtures {
    pub fn payment_method_id() -> &'static str {
        "pm_card_visa"
    }

    pub fn gateway_reference() -> &'static str {
        "pi_3Pq2Yt2eZvKYlo2C0n1xRk7a"
    }

    pub fn tasks() -> Vec<String> {
        vec![
            "Medication reminder".to_string(),
            "Meal preparation".to_string(),
            "Light housekeeping".to_string(),
        ]
    }
}
