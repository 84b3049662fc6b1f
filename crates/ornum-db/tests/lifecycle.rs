//! Issued number lifecycle through the public API.

mod common;

use common::{date, memory_db_with_series};
use ornum_core::{CoreError, GenerationMethod, IssuedNumberStatus, ValidationError};
use ornum_db::{AllocatorConfig, DbError};

#[tokio::test]
async fn allocate_then_mark_used() {
    let (db, series) = memory_db_with_series(None).await;
    let n = db
        .allocator(AllocatorConfig::default())
        .allocate(&series.id, "cashier-a", date(2025, 4, 2), GenerationMethod::Manual)
        .await
        .unwrap();

    db.issued_numbers().mark_used(&n.id, "TXN-1001").await.unwrap();

    let stored = db.issued_numbers().require(&n.id).await.unwrap();
    assert_eq!(stored.status, IssuedNumberStatus::Used);
    assert_eq!(stored.transaction_ref.as_deref(), Some("TXN-1001"));
    assert!(stored.used_at.is_some());
}

#[tokio::test]
async fn used_number_cannot_be_voided() {
    let (db, series) = memory_db_with_series(None).await;
    let issued = db.issued_numbers();
    let n = db
        .allocator(AllocatorConfig::default())
        .allocate(&series.id, "cashier-a", date(2025, 4, 2), GenerationMethod::Automatic)
        .await
        .unwrap();

    issued.mark_used(&n.id, "TXN-1002").await.unwrap();
    let err = issued
        .mark_voided(&n.id, "supervisor", "Customer cancelled")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DbError::Domain(CoreError::InvalidTransition {
            from: IssuedNumberStatus::Used,
            to: IssuedNumberStatus::Voided,
            ..
        })
    ));
    assert_eq!(
        issued.require(&n.id).await.unwrap().status,
        IssuedNumberStatus::Used
    );
}

#[tokio::test]
async fn voiding_records_reason_and_never_frees_the_number() {
    let (db, series) = memory_db_with_series(None).await;
    let allocator = db.allocator(AllocatorConfig::default());
    let issued = db.issued_numbers();
    let d = date(2025, 4, 2);

    let first = allocator
        .allocate(&series.id, "cashier-a", d, GenerationMethod::Automatic)
        .await
        .unwrap();

    let err = issued.mark_voided(&first.id, "supervisor", "   ").await.unwrap_err();
    assert!(matches!(
        err,
        DbError::Domain(CoreError::Validation(ValidationError::Required { .. }))
    ));

    let voided = issued
        .mark_voided(&first.id, "supervisor", "  Printer jam ")
        .await
        .unwrap();
    assert_eq!(voided.status, IssuedNumberStatus::Voided);
    assert_eq!(voided.void_reason.as_deref(), Some("Printer jam"));
    assert_eq!(voided.voided_by.as_deref(), Some("supervisor"));
    assert!(voided.voided_at.is_some());

    let second = allocator
        .allocate(&series.id, "cashier-a", d, GenerationMethod::Automatic)
        .await
        .unwrap();
    assert_eq!(second.actual_number, first.actual_number + 1);

    let counts = issued.count_by_status(&series.id).await.unwrap();
    assert_eq!((counts.generated, counts.used, counts.voided), (1, 0, 1));
    assert_eq!(issued.voided(Some(&series.id)).await.unwrap().len(), 1);
    assert_eq!(issued.generated(Some(&series.id)).await.unwrap()[0].id, second.id);
}
