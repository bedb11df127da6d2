use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;

use super::common::*;
use crate::workflows::generation::{InMemoryJobStore, JobId, JobState, JobStore, StoreError};
use crate::workflows::intake::AnswerValue;
use crate::workflows::packets::PacketType;

#[test]
fn duplicate_enqueue_returns_in_flight_job() {
    let store = InMemoryJobStore::new();

    let first = store
        .enqueue(request("client-42", PacketType::Nutrition), start())
        .expect("enqueue");
    let second = store
        .enqueue(request("client-42", PacketType::Nutrition), start())
        .expect("enqueue");

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.job_id, second.job_id);
    assert_eq!(first.job_id, JobId::from("job-000001"));
    assert_eq!(store.counts(start()).expect("counts").pending, 1);
}

#[test]
fn different_keys_get_separate_jobs() {
    let store = InMemoryJobStore::new();

    let nutrition = store
        .enqueue(request("client-42", PacketType::Nutrition), start())
        .expect("enqueue");
    let training = store
        .enqueue(request("client-42", PacketType::Training), start())
        .expect("enqueue");
    let other_client = store
        .enqueue(request("client-7", PacketType::Nutrition), start())
        .expect("enqueue");

    assert_ne!(nutrition.job_id, training.job_id);
    assert_ne!(nutrition.job_id, other_client.job_id);
    assert_eq!(store.counts(start()).expect("counts").pending, 3);
}

#[test]
fn claim_takes_oldest_pending_exactly_once() {
    let store = InMemoryJobStore::new();
    let first = store
        .enqueue(request("a", PacketType::Nutrition), start())
        .expect("enqueue");
    store
        .enqueue(request("b", PacketType::Nutrition), start())
        .expect("enqueue");

    let claimed = store.claim_next(start()).expect("claim").expect("job");
    assert_eq!(claimed.id, first.job_id);
    assert_eq!(claimed.state, JobState::Active);

    let next = store.claim_next(start()).expect("claim").expect("job");
    assert_ne!(next.id, first.job_id);
    assert!(store.claim_next(start()).expect("claim").is_none());
}

#[test]
fn concurrent_claims_never_share_a_job() {
    let store = Arc::new(InMemoryJobStore::new());
    for index in 0..50 {
        store
            .enqueue(request(&format!("client-{index}"), PacketType::Training), start())
            .expect("enqueue");
    }

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                let mut claimed = Vec::new();
                while let Some(job) = store.claim_next(start()).expect("claim") {
                    claimed.push(job.id);
                }
                claimed
            })
        })
        .collect();

    let mut all: Vec<JobId> = handles
        .into_iter()
        .flat_map(|handle| handle.join().expect("claim thread"))
        .collect();
    all.sort();
    let before = all.len();
    all.dedup();

    assert_eq!(before, 50);
    assert_eq!(all.len(), 50);
}

#[test]
fn concurrent_enqueues_for_one_key_leave_one_job() {
    let store = Arc::new(InMemoryJobStore::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                store
                    .enqueue(request("client-42", PacketType::Nutrition), start())
                    .expect("enqueue")
                    .job_id
            })
        })
        .collect();

    let ids: Vec<JobId> = handles
        .into_iter()
        .map(|handle| handle.join().expect("enqueue thread"))
        .collect();

    assert!(ids.iter().all(|id| id == &ids[0]));
    let snapshot = store.snapshot().expect("snapshot");
    assert_eq!(snapshot.len(), 1);
}

#[test]
fn retry_scheduled_job_still_blocks_its_key() {
    let store = InMemoryJobStore::new();
    let first = store
        .enqueue(request("client-42", PacketType::Nutrition), start())
        .expect("enqueue");
    store.claim_next(start()).expect("claim");
    store
        .schedule_retry(&first.job_id, "boom".to_string(), start(), start())
        .expect("retry");

    let again = store
        .enqueue(request("client-42", PacketType::Nutrition), start())
        .expect("enqueue");

    assert_eq!(again.job_id, first.job_id);
    assert!(!again.created);
}

#[test]
fn revision_supersedes_waiting_job_but_not_active_one() {
    let store = InMemoryJobStore::new();
    let first = store
        .enqueue(request("client-42", PacketType::Nutrition), start())
        .expect("enqueue");

    let mut changed = request("client-42", PacketType::Nutrition);
    changed.answers = changed.answers.with("weight_kg", AnswerValue::Number(79.0));

    let revised = store
        .enqueue_revision(changed.clone(), start())
        .expect("revision");
    assert!(revised.created);
    assert_eq!(revised.superseded, Some(first.job_id.clone()));

    let old = store.get(&first.job_id).expect("get").expect("archived");
    assert_eq!(old.state, JobState::Superseded);
    assert_eq!(old.superseded_by, Some(revised.job_id.clone()));

    let counts = store.counts(start()).expect("counts");
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.superseded, 1);
    assert_eq!(counts.failed, 0);

    // Same answers: nothing to supersede.
    let same = store
        .enqueue_revision(changed.clone(), start())
        .expect("revision");
    assert_eq!(same.job_id, revised.job_id);
    assert!(!same.created);

    store.claim_next(start()).expect("claim");
    let mut newer = changed;
    newer.answers = newer.answers.with("weight_kg", AnswerValue::Number(75.0));
    let during_run = store.enqueue_revision(newer, start()).expect("revision");
    assert_eq!(during_run.job_id, revised.job_id);
    assert!(during_run.superseded.is_none());
}

#[test]
fn terminal_jobs_reject_further_transitions() {
    let store = InMemoryJobStore::new();
    let outcome = store
        .enqueue(request("client-42", PacketType::Nutrition), start())
        .expect("enqueue");
    store.claim_next(start()).expect("claim");
    store.complete(&outcome.job_id, start()).expect("complete");

    // Completed jobs leave the live table.
    assert_eq!(
        store.escalate(&outcome.job_id, "late".to_string(), start()),
        Err(StoreError::NotFound(outcome.job_id.clone()))
    );
    let archived = store.get(&outcome.job_id).expect("get").expect("archived");
    assert_eq!(archived.state, JobState::Completed);
    assert!(archived.finished_at.is_some());
}

#[test]
fn pending_job_cannot_complete_without_claim() {
    let store = InMemoryJobStore::new();
    let outcome = store
        .enqueue(request("client-42", PacketType::Nutrition), start())
        .expect("enqueue");

    assert!(matches!(
        store.complete(&outcome.job_id, start()),
        Err(StoreError::InvalidTransition {
            from: JobState::Pending,
            to: JobState::Completed,
            ..
        })
    ));
}

#[test]
fn promote_due_respects_backoff() {
    let store = InMemoryJobStore::new();
    let outcome = store
        .enqueue(request("client-42", PacketType::Nutrition), start())
        .expect("enqueue");
    store.claim_next(start()).expect("claim");
    let retry_at = start() + ChronoDuration::seconds(30);
    store
        .schedule_retry(&outcome.job_id, "boom".to_string(), retry_at, start())
        .expect("retry");

    assert!(store
        .promote_due(start() + ChronoDuration::seconds(10))
        .expect("promote")
        .is_empty());
    assert_eq!(
        store.promote_due(retry_at).expect("promote"),
        vec![outcome.job_id.clone()]
    );

    let job = store.get(&outcome.job_id).expect("get").expect("live");
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.last_error.as_deref(), Some("boom"));
}

#[test]
fn elapsed_retry_counts_as_pending_until_promoted() {
    let store = InMemoryJobStore::new();
    let outcome = store
        .enqueue(request("client-42", PacketType::Nutrition), start())
        .expect("enqueue");
    store.claim_next(start()).expect("claim");
    let retry_at = start() + ChronoDuration::seconds(2);
    store
        .schedule_retry(&outcome.job_id, "boom".to_string(), retry_at, start())
        .expect("retry");

    let waiting = store.counts(start()).expect("counts");
    assert_eq!((waiting.pending, waiting.retrying), (0, 1));
    assert_eq!(waiting.oldest_pending_since, None);

    let due = store
        .counts(start() + ChronoDuration::seconds(600))
        .expect("counts");
    assert_eq!((due.pending, due.retrying), (1, 0));
    assert_eq!(due.oldest_pending_since, Some(retry_at));
}

#[test]
fn archive_is_pruned_but_totals_survive() {
    let store = InMemoryJobStore::with_retention(Duration::from_secs(60));
    let first = store
        .enqueue(request("client-1", PacketType::Nutrition), start())
        .expect("enqueue");
    store.claim_next(start()).expect("claim");
    store.complete(&first.job_id, start()).expect("complete");

    let later = start() + ChronoDuration::seconds(120);
    let second = store
        .enqueue(request("client-2", PacketType::Nutrition), later)
        .expect("enqueue");
    store.claim_next(later).expect("claim");
    store
        .escalate(&second.job_id, "boom".to_string(), later)
        .expect("escalate");

    assert!(store.get(&first.job_id).expect("get").is_none());
    assert!(store.get(&second.job_id).expect("get").is_some());
    assert_eq!(store.snapshot().expect("snapshot").len(), 1);

    let counts = store.counts(later).expect("counts");
    assert_eq!((counts.completed, counts.failed), (1, 1));

    let tally = store
        .outcomes_since(later - ChronoDuration::seconds(30))
        .expect("tally");
    assert_eq!((tally.completed, tally.failed), (0, 1));
}

#[test]
fn abandoned_lists_only_stale_claims() {
    let store = InMemoryJobStore::new();
    let stale = store
        .enqueue(request("client-1", PacketType::Nutrition), start())
        .expect("enqueue");
    store
        .enqueue(request("client-2", PacketType::Nutrition), start())
        .expect("enqueue");
    store.claim_next(start()).expect("claim");
    store
        .claim_next(start() + ChronoDuration::seconds(30))
        .expect("claim");

    let abandoned = store
        .abandoned(start() + ChronoDuration::seconds(10))
        .expect("abandoned");

    assert_eq!(abandoned.len(), 1);
    assert_eq!(abandoned[0].id, stale.job_id);
}
