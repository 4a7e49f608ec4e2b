//! Dead letter store: recording, eligibility buckets, and operator actions.

use chrono::{Duration, Utc};
use serde_json::json;

use courseflow::jobs::{
    DeadLetterFilter, DeadLetterState, DeadLetterStore, MemoryDeadLetterStore, NewDeadLetter,
};

fn store() -> MemoryDeadLetterStore {
    MemoryDeadLetterStore::new()
}

#[tokio::test]
async fn add_records_the_failure_with_a_future_retry_time() {
    let store = store();
    let before = Utc::now();
    let id = store
        .add(
            NewDeadLetter::new("email_send", json!({"email": "a@b.com"}), "smtp refused")
                .retry_delay_minutes(30),
        )
        .await
        .unwrap();

    let entry = store.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(entry.job_type, "email_send");
    assert_eq!(entry.error, "smtp refused");
    assert_eq!(entry.retry_count, 0);
    assert_eq!(entry.max_retries, 3);
    assert!(entry.next_retry_at >= before + Duration::minutes(29));
}

#[tokio::test]
async fn pending_bucket_requires_a_due_entry_with_budget_left() {
    let store = store();

    // Due immediately with budget remaining: pending.
    let due = store
        .add(
            NewDeadLetter::new("email_send", json!({}), "boom").retry_delay_minutes(0),
        )
        .await
        .unwrap();
    // Scheduled far in the future: neither bucket.
    let scheduled = store
        .add(
            NewDeadLetter::new("email_send", json!({}), "boom").retry_delay_minutes(60),
        )
        .await
        .unwrap();
    // Budget exhausted: failed.
    let exhausted = store
        .add(
            NewDeadLetter::new("email_send", json!({}), "boom")
                .max_retries(0)
                .retry_delay_minutes(0),
        )
        .await
        .unwrap();

    let pending = store
        .list(
            &DeadLetterFilter {
                state: Some(DeadLetterState::Pending),
                ..DeadLetterFilter::default()
            },
            100,
        )
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, due);

    let failed = store
        .list(
            &DeadLetterFilter {
                state: Some(DeadLetterState::Failed),
                ..DeadLetterFilter::default()
            },
            100,
        )
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, exhausted);

    let all = store.list(&DeadLetterFilter::default(), 100).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().any(|e| e.id == scheduled));
}

#[tokio::test]
async fn list_filters_by_job_type() {
    let store = store();
    store
        .add(NewDeadLetter::new("email_send", json!({}), "boom"))
        .await
        .unwrap();
    store
        .add(NewDeadLetter::new("payment_verify", json!({}), "boom"))
        .await
        .unwrap();

    let rows = store
        .list(
            &DeadLetterFilter {
                job_type: Some("payment_verify".to_string()),
                ..DeadLetterFilter::default()
            },
            100,
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].job_type, "payment_verify");
}

#[tokio::test]
async fn retry_spends_budget_and_resets_eligibility() {
    let store = store();
    let id = store
        .add(
            NewDeadLetter::new("external_sync", json!({}), "lms down")
                .max_retries(2)
                .retry_delay_minutes(60),
        )
        .await
        .unwrap();

    assert!(store.retry(id).await.unwrap());
    let entry = store.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(entry.retry_count, 1);
    assert!(entry.next_retry_at <= Utc::now());

    assert!(store.retry(id).await.unwrap());
    // Budget exhausted: further retries are refused.
    assert!(!store.retry(id).await.unwrap());

    let entry = store.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(entry.retry_count, 2);
    assert!(entry.is_exhausted());
}

#[tokio::test]
async fn mark_failed_burns_budget_without_rescheduling() {
    let store = store();
    let id = store
        .add(
            NewDeadLetter::new("email_send", json!({}), "boom")
                .max_retries(1)
                .retry_delay_minutes(60),
        )
        .await
        .unwrap();

    assert!(store.mark_failed(id).await.unwrap());
    let entry = store.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(entry.retry_count, 1);
    assert!(entry.is_exhausted());
    // next_retry_at stays where add() put it.
    assert!(entry.next_retry_at > Utc::now());
}

#[tokio::test]
async fn remove_deletes_and_reports_presence() {
    let store = store();
    let id = store
        .add(NewDeadLetter::new("email_send", json!({}), "boom"))
        .await
        .unwrap();

    assert!(store.remove(id).await.unwrap());
    assert!(store.get_by_id(id).await.unwrap().is_none());
    assert!(!store.remove(id).await.unwrap());
}

#[tokio::test]
async fn stats_count_the_buckets() {
    let store = store();
    store
        .add(NewDeadLetter::new("email_send", json!({}), "boom").retry_delay_minutes(0))
        .await
        .unwrap();
    store
        .add(
            NewDeadLetter::new("email_send", json!({}), "boom")
                .max_retries(0)
                .retry_delay_minutes(0),
        )
        .await
        .unwrap();
    store
        .add(NewDeadLetter::new("email_send", json!({}), "boom").retry_delay_minutes(60))
        .await
        .unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn cleanup_only_touches_old_exhausted_entries() {
    let store = store();
    let fresh_exhausted = store
        .add(NewDeadLetter::new("email_send", json!({}), "boom").max_retries(0))
        .await
        .unwrap();
    let with_budget = store
        .add(NewDeadLetter::new("email_send", json!({}), "boom"))
        .await
        .unwrap();

    // Cutoff in the past: nothing is old enough yet.
    let removed = store.cleanup(Utc::now() - Duration::days(1)).await.unwrap();
    assert_eq!(removed, 0);

    // Cutoff in the future: exhausted entries go, others stay.
    let removed = store.cleanup(Utc::now() + Duration::seconds(1)).await.unwrap();
    assert_eq!(removed, 1);
    assert!(store.get_by_id(fresh_exhausted).await.unwrap().is_none());
    assert!(store.get_by_id(with_budget).await.unwrap().is_some());
}
