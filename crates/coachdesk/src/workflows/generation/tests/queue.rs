use std::time::Duration;

use super::common::*;
use crate::workflows::generation::{Clock, JobOutcome, JobState, JobStore};
use crate::workflows::intake::AnswerValue;
use crate::workflows::packets::{ContextResolver, ContextValue, PacketType, TemplateLibrary};

#[tokio::test]
async fn completed_job_is_archived_and_announced() {
    let harness = harness();
    let outcome = harness
        .queue
        .enqueue(request("client-42", PacketType::Nutrition))
        .expect("enqueue");

    let handled = harness.queue.run_next().await.expect("run").expect("job");

    assert_eq!(
        handled,
        JobOutcome::Completed {
            job_id: outcome.job_id.clone(),
            location: format!("memory://client-42/{}", outcome.job_id),
        }
    );

    let stored = harness.archive.stored();
    assert_eq!(stored.len(), 1);
    let (job_id, packet) = &stored[0];
    assert_eq!(job_id, &outcome.job_id);
    assert_eq!(packet.packet_type, PacketType::Nutrition);
    assert!(packet.to_text().contains("Jordan Reyes"));

    let ready = harness.notifier.ready();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].job_id, outcome.job_id);
    assert!(harness.notifier.escalations().is_empty());

    let job = harness
        .queue
        .job(&outcome.job_id)
        .expect("lookup")
        .expect("job");
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts, 0);
}

#[tokio::test]
async fn empty_queue_has_nothing_to_run() {
    let harness = harness();
    assert!(harness.queue.run_next().await.expect("run").is_none());
}

#[tokio::test]
async fn missing_field_schedules_retry_naming_the_path() {
    let harness = harness_with(
        RecordingArchive::default(),
        broken_templates(),
        generation_config(5),
    );
    let outcome = harness
        .queue
        .enqueue(request("client-42", PacketType::Nutrition))
        .expect("enqueue");

    let handled = harness.queue.run_next().await.expect("run").expect("job");

    assert_eq!(
        handled,
        JobOutcome::RetryScheduled {
            job_id: outcome.job_id.clone(),
            attempts: 1,
            delay: Duration::from_secs(2),
        }
    );
    let job = harness
        .queue
        .job(&outcome.job_id)
        .expect("lookup")
        .expect("job");
    assert_eq!(job.state, JobState::RetryScheduled);
    assert!(job
        .last_error
        .as_deref()
        .is_some_and(|error| error.contains("calculated.missingField")));
    assert!(harness.archive.stored().is_empty());

    // Backoff has not elapsed yet.
    assert!(harness.queue.run_next().await.expect("run").is_none());
}

#[tokio::test]
async fn exhausted_job_escalates_exactly_once() {
    let harness = harness_with(
        RecordingArchive::default(),
        broken_templates(),
        generation_config(5),
    );
    let outcome = harness
        .queue
        .enqueue(request("client-42", PacketType::Nutrition))
        .expect("enqueue");

    let mut outcomes = Vec::new();
    for _ in 0..5 {
        outcomes.push(harness.queue.run_next().await.expect("run").expect("job"));
        harness.clock.advance(Duration::from_secs(120));
    }

    let delays: Vec<Duration> = outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            JobOutcome::RetryScheduled { delay, .. } => Some(*delay),
            _ => None,
        })
        .collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8),
            Duration::from_secs(16),
        ]
    );
    assert_eq!(
        outcomes.last(),
        Some(&JobOutcome::Escalated {
            job_id: outcome.job_id.clone(),
            attempts: 5,
        })
    );

    // Terminal: nothing left to claim, no second escalation.
    assert!(harness.queue.run_next().await.expect("run").is_none());

    let escalations = harness.notifier.escalations();
    assert_eq!(escalations.len(), 1);
    let escalation = &escalations[0];
    assert_eq!(escalation.job_id, outcome.job_id);
    assert_eq!(escalation.retry_count, 5);
    assert_eq!(escalation.client_name, "Jordan Reyes");
    assert_eq!(escalation.client_email, "jordan@example.com");
    assert_eq!(
        escalation.missing_path.as_deref(),
        Some("calculated.missingField")
    );

    let job = harness
        .queue
        .job(&outcome.job_id)
        .expect("lookup")
        .expect("job");
    assert_eq!(job.state, JobState::FailedEscalated);
    assert_eq!(job.attempts, 5);
    assert_eq!(harness.queue.counts().expect("counts").failed, 1);
}

#[tokio::test]
async fn transient_archive_failure_recovers_on_retry() {
    let harness = harness_with(
        FlakyArchive::new(2),
        TemplateLibrary::standard(),
        generation_config(5),
    );
    let outcome = harness
        .queue
        .enqueue(request("client-42", PacketType::Training))
        .expect("enqueue");

    for _ in 0..2 {
        let handled = harness.queue.run_next().await.expect("run").expect("job");
        assert!(matches!(handled, JobOutcome::RetryScheduled { .. }));
        harness.clock.advance(Duration::from_secs(60));
    }
    let handled = harness.queue.run_next().await.expect("run").expect("job");

    assert!(matches!(handled, JobOutcome::Completed { .. }));
    assert_eq!(harness.archive.calls(), 3);
    let job = harness
        .queue
        .job(&outcome.job_id)
        .expect("lookup")
        .expect("job");
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts, 2);
    assert!(job.last_error.is_none());
    assert_eq!(harness.notifier.ready().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_attempt_times_out_and_counts_as_failure() {
    let mut config = generation_config(1);
    config.job_timeout = Duration::from_secs(5);
    let harness = harness_with(SlowArchive, TemplateLibrary::standard(), config);
    let outcome = harness
        .queue
        .enqueue(request("client-42", PacketType::Lifestyle))
        .expect("enqueue");

    let handled = harness.queue.run_next().await.expect("run").expect("job");

    assert_eq!(
        handled,
        JobOutcome::Escalated {
            job_id: outcome.job_id.clone(),
            attempts: 1,
        }
    );
    let escalations = harness.notifier.escalations();
    assert_eq!(escalations.len(), 1);
    assert!(escalations[0].error_message.contains("budget"));
    assert!(escalations[0].missing_path.is_none());
}

#[tokio::test]
async fn panicking_attempt_is_escalated_and_frees_its_key() {
    let harness = harness_with(
        PanickingArchive::new(1),
        TemplateLibrary::standard(),
        generation_config(1),
    );
    let first = harness
        .queue
        .enqueue(request("client-42", PacketType::Nutrition))
        .expect("enqueue");

    let handled = harness.queue.run_next().await.expect("run").expect("job");

    assert_eq!(
        handled,
        JobOutcome::Escalated {
            job_id: first.job_id.clone(),
            attempts: 1,
        }
    );
    let escalations = harness.notifier.escalations();
    assert_eq!(escalations.len(), 1);
    assert!(escalations[0].error_message.contains("archive backend crashed"));

    let second = harness
        .queue
        .enqueue(request("client-42", PacketType::Nutrition))
        .expect("enqueue");
    assert!(second.created);
    assert_ne!(second.job_id, first.job_id);

    let handled = harness.queue.run_next().await.expect("run").expect("job");
    assert!(matches!(handled, JobOutcome::Completed { .. }));
    assert_eq!(harness.archive.calls(), 2);
}

#[tokio::test]
async fn job_left_active_by_a_lost_worker_is_retried() {
    let harness = harness();
    let outcome = harness
        .queue
        .enqueue(request("client-42", PacketType::Nutrition))
        .expect("enqueue");
    // Claimed by a worker that never reports back.
    harness
        .store
        .claim_next(harness.clock.now())
        .expect("claim")
        .expect("job");

    harness.clock.advance(Duration::from_secs(5));
    assert!(harness.queue.run_next().await.expect("run").is_none());
    let job = harness
        .queue
        .job(&outcome.job_id)
        .expect("lookup")
        .expect("job");
    assert_eq!(job.state, JobState::Active);

    harness.clock.advance(Duration::from_secs(6));
    assert!(harness.queue.run_next().await.expect("run").is_none());
    let job = harness
        .queue
        .job(&outcome.job_id)
        .expect("lookup")
        .expect("job");
    assert_eq!(job.state, JobState::RetryScheduled);
    assert_eq!(job.attempts, 1);
    assert!(job
        .last_error
        .as_deref()
        .is_some_and(|error| error.contains("abandoned")));

    harness.clock.advance(Duration::from_secs(2));
    let handled = harness.queue.run_next().await.expect("run").expect("job");
    assert!(matches!(
        handled,
        JobOutcome::Completed { ref job_id, .. } if job_id == &outcome.job_id
    ));
}

#[tokio::test]
async fn new_answers_replace_a_waiting_job() {
    let harness = harness();
    let first = harness
        .queue
        .enqueue_revision(request("client-42", PacketType::Nutrition))
        .expect("enqueue");

    let mut revised = request("client-42", PacketType::Nutrition);
    revised.answers = revised
        .answers
        .with("weight_kg", AnswerValue::Number(76.0));
    let second = harness
        .queue
        .enqueue_revision(revised)
        .expect("enqueue");

    assert_eq!(second.superseded, Some(first.job_id.clone()));
    let outcomes = harness.queue.run_until_idle().await.expect("run");
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(
        &outcomes[0],
        JobOutcome::Completed { job_id, .. } if job_id == &second.job_id
    ));

    let stale = harness
        .queue
        .job(&first.job_id)
        .expect("lookup")
        .expect("job");
    assert_eq!(stale.state, JobState::Superseded);
    assert_eq!(harness.archive.stored().len(), 1);
}

#[tokio::test]
async fn context_exposes_client_and_packet_scopes() {
    let harness = harness();
    harness
        .queue
        .enqueue(request("client-42", PacketType::Nutrition))
        .expect("enqueue");
    let job = harness
        .store
        .claim_next(start())
        .expect("claim")
        .expect("job");

    let context = harness.queue.assemble_context(&job);

    assert_eq!(
        context.resolve("client.firstName"),
        Some(&ContextValue::from("Jordan"))
    );
    assert_eq!(
        context.resolve("packet.type"),
        Some(&ContextValue::from("NUTRITION"))
    );
    assert!(context.resolve("calculated.bmi").is_some());
    assert!(context.resolve("answers.weight_kg").is_some());
}
