//! PostgreSQL adapter integration tests
//!
//! Each test starts its own container, so these need Docker:
//!
//! ```bash
//! cargo test -p test_utils --test postgres_adapters -- --ignored
//! ```

use chrono::Utc;
use core_kernel::{CaregiverId, PortError};
use domain_billing::{
    reconcile, BillingStore, IdempotencyKey, InvoiceStatus, Role, StaffDirectory,
};
use domain_care::{VisitNote, VisitNoteDraft, VisitNoteStore};
use infra_db::{PostgresBillingStore, PostgresStaffDirectory, PostgresVisitNoteStore};
use rust_decimal_macros::dec;
use serde_json::json;

use test_utils::{
    assert_invoice_balanced, assert_paid_matches_payments, create_isolated_test_database,
    PeopleFixtures, TemporalFixtures, TestInvoiceBuilder, TestPaymentBuilder,
    VisitNoteInputBuilder,
};

mod billing_store {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_settlement_updates_totals_and_version() {
        let db = create_isolated_test_database().await.unwrap();
        let store = PostgresBillingStore::new(db.pool().clone());

        let client = PeopleFixtures::client();
        store.save_client(&client).await.unwrap();
        let invoice = TestInvoiceBuilder::new().for_client(client.id).build();
        store.create_invoice(&invoice).await.unwrap();

        let loaded = store.get_invoice(invoice.id).await.unwrap();
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.total_amount.amount(), dec!(200.00));

        let payment = TestPaymentBuilder::against(&loaded).with_amount(dec!(50.00)).build();
        let settlement = reconcile(&loaded, &payment.amount).unwrap();
        let mut settled = loaded.clone();
        settled.amount_paid = settlement.amount_paid;
        settled.balance_due = settlement.balance_due;
        settled.status = settlement.status;

        let stored = store.record_settlement(&payment, &settled).await.unwrap();
        assert_eq!(stored.version, loaded.version + 1);

        let reloaded = store.get_invoice(invoice.id).await.unwrap();
        assert_eq!(reloaded.amount_paid.amount(), dec!(50.00));
        assert_eq!(reloaded.balance_due.amount(), dec!(150.00));
        assert_eq!(reloaded.version, stored.version);
        assert_invoice_balanced(&reloaded);

        let payments = store.list_payments(invoice.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_paid_matches_payments(&reloaded, &payments);
        assert_eq!(store.count_attempts(invoice.id).await.unwrap(), 1);
        assert!(store
            .find_payment_by_key(&IdempotencyKey::for_attempt(invoice.id, 1))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_stale_version_is_rejected() {
        let db = create_isolated_test_database().await.unwrap();
        let store = PostgresBillingStore::new(db.pool().clone());

        let client = PeopleFixtures::client();
        store.save_client(&client).await.unwrap();
        let invoice = TestInvoiceBuilder::new().for_client(client.id).build();
        store.create_invoice(&invoice).await.unwrap();
        let loaded = store.get_invoice(invoice.id).await.unwrap();

        // Another writer moves the invoice on
        store.mark_invoice_sent(invoice.id, Utc::now()).await.unwrap();

        let payment = TestPaymentBuilder::against(&loaded).build();
        let result = store.record_settlement(&payment, &loaded).await;
        assert!(matches!(result, Err(PortError::Conflict { .. })));

        // The payment insert rolled back with the version check
        assert!(store.list_payments(invoice.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_duplicate_idempotency_key_conflicts() {
        let db = create_isolated_test_database().await.unwrap();
        let store = PostgresBillingStore::new(db.pool().clone());

        let client = PeopleFixtures::client();
        store.save_client(&client).await.unwrap();
        let invoice = TestInvoiceBuilder::new().for_client(client.id).build();
        store.create_invoice(&invoice).await.unwrap();

        let declined = TestPaymentBuilder::against(&invoice).declined().build();
        store.record_failed_attempt(&declined).await.unwrap();

        let replay = TestPaymentBuilder::against(&invoice).declined().build();
        let result = store.record_failed_attempt(&replay).await;
        assert!(matches!(result, Err(PortError::Conflict { .. })));

        let unchanged = store.get_invoice(invoice.id).await.unwrap();
        assert_eq!(unchanged.amount_paid.amount(), dec!(0));
        assert_eq!(store.count_attempts(invoice.id).await.unwrap(), 1);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_mark_sent_moves_draft_to_sent() {
        let db = create_isolated_test_database().await.unwrap();
        let store = PostgresBillingStore::new(db.pool().clone());

        let client = PeopleFixtures::client();
        store.save_client(&client).await.unwrap();
        let invoice = TestInvoiceBuilder::new().for_client(client.id).build();
        store.create_invoice(&invoice).await.unwrap();

        let sent = store.mark_invoice_sent(invoice.id, Utc::now()).await.unwrap();
        assert_eq!(sent.status, InvoiceStatus::Sent);
        assert!(sent.sent_at.is_some());
        assert_eq!(sent.version, invoice.version + 1);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_unknown_invoice_is_not_found() {
        let db = create_isolated_test_database().await.unwrap();
        let store = PostgresBillingStore::new(db.pool().clone());

        let result = store.get_invoice(TestInvoiceBuilder::new().build().id).await;
        assert!(matches!(result, Err(PortError::NotFound { .. })));
    }
}

mod staff_directory {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_users_with_role() {
        let db = create_isolated_test_database().await.unwrap();
        let directory = PostgresStaffDirectory::new(db.pool().clone());

        directory.add_user(&PeopleFixtures::admin()).await.unwrap();
        directory.add_user(&PeopleFixtures::billing_clerk()).await.unwrap();

        let admins = directory.users_with_role(Role::Admin).await.unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].email, "dana@agency.example");
        assert!(directory
            .users_with_role(Role::Caregiver)
            .await
            .unwrap()
            .is_empty());
    }
}

mod visit_note_store {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_submission_replaces_draft() {
        let db = create_isolated_test_database().await.unwrap();
        PostgresBillingStore::new(db.pool().clone())
            .save_client(&PeopleFixtures::client())
            .await
            .unwrap();
        let store = PostgresVisitNoteStore::new(db.pool().clone());

        let caregiver = CaregiverId::new();
        let client_id = PeopleFixtures::client().id;
        let draft = VisitNoteDraft {
            caregiver_id: caregiver,
            client_id,
            form: json!({ "tasks_performed": ["Meal preparation"] }),
            saved_at: Utc::now(),
        };
        store.upsert_draft(&draft).await.unwrap();

        let updated = VisitNoteDraft {
            form: json!({ "tasks_performed": ["Meal preparation", "Bathing"] }),
            ..draft.clone()
        };
        store.upsert_draft(&updated).await.unwrap();
        let loaded = store.get_draft(caregiver, client_id).await.unwrap().unwrap();
        assert_eq!(loaded.form, updated.form);

        let input = VisitNoteInputBuilder::new()
            .for_client(client_id)
            .with_vitals("120/80", 72, 98.6)
            .build();
        let note = VisitNote::submitted(caregiver, input, TemporalFixtures::submitted_at());
        store.record_submission(&note).await.unwrap();

        assert!(store.get_draft(caregiver, client_id).await.unwrap().is_none());
        assert!(!store.delete_draft(caregiver, client_id).await.unwrap());

        let stored = store.get_note(note.id).await.unwrap();
        assert_eq!(stored.tasks_performed, note.tasks_performed);
        assert_eq!(stored.vitals, note.vitals);

        let history = store.notes_for_client(client_id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, note.id);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_note_for_unknown_client_is_rejected() {
        let db = create_isolated_test_database().await.unwrap();
        let store = PostgresVisitNoteStore::new(db.pool().clone());

        let input = VisitNoteInputBuilder::new().build();
        let note = VisitNote::submitted(CaregiverId::new(), input, Utc::now());
        let result = store.record_submission(&note).await;
        assert!(matches!(result, Err(PortError::Validation { .. })));
    }
}
