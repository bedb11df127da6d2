use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::config::{GenerationConfig, MonitorConfig};
use crate::workflows::generation::{
    ArchiveError, ArchiveReceipt, ClientId, ClientProfile, FailureEscalation, GenerationNotifier,
    GenerationQueue, GenerationRequest, GenerationService, InMemoryJobStore, JobId, ManualClock,
    NotifyError, PacketArchive, PacketReady, QueueMonitor,
};
use crate::workflows::intake::{AnswerValue, HiddenAnswerPolicy, IntakeCatalog, IntakeResponses};
use crate::workflows::packets::{
    ContentBlock, ContentKind, PacketSection, PacketTemplate, PacketType, RenderedPacket,
    TemplateLibrary,
};

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0)
        .single()
        .expect("valid start time")
}

pub(super) fn client(id: &str) -> ClientProfile {
    ClientProfile {
        id: ClientId::from(id),
        full_name: "Jordan Reyes".to_string(),
        email: "jordan@example.com".to_string(),
        segment: None,
    }
}

pub(super) fn answers() -> IntakeResponses {
    IntakeResponses::new()
        .with("preferred_name", AnswerValue::text("Jordan"))
        .with("age", AnswerValue::Number(34.0))
        .with("sex", AnswerValue::text("male"))
        .with("height_cm", AnswerValue::Number(180.0))
        .with("weight_kg", AnswerValue::Number(82.0))
        .with("primary_goal", AnswerValue::text("maintain"))
        .with("activity_level", AnswerValue::text("moderate"))
        .with("training_days", AnswerValue::Number(4.0))
        .with("injuries", AnswerValue::text("no"))
        .with("cooking_frequency", AnswerValue::text("often"))
        .with("meal_prep_minutes", AnswerValue::Number(30.0))
        .with("sleep_hours", AnswerValue::Number(7.5))
        .with("stress_level", AnswerValue::Number(4.0))
}

pub(super) fn request(client_id: &str, packet_type: PacketType) -> GenerationRequest {
    GenerationRequest {
        client: client(client_id),
        packet_type,
        answers: answers(),
    }
}

pub(super) fn generation_config(max_attempts: u32) -> GenerationConfig {
    GenerationConfig {
        worker_count: 2,
        max_attempts,
        backoff_base: Duration::from_secs(2),
        backoff_max: Duration::from_secs(60),
        job_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
    }
}

/// Nutrition template that needs a calculated field the context never provides.
pub(super) fn broken_templates() -> TemplateLibrary {
    TemplateLibrary::new(vec![PacketTemplate {
        id: "nutrition-broken".to_string(),
        packet_type: PacketType::Nutrition,
        segment: None,
        is_default: true,
        sections: vec![PacketSection::new("main", "Main", &["target"])],
        blocks: vec![ContentBlock::new(
            "target",
            ContentKind::Text,
            "Target: {{calculated.missingField}}",
        )],
    }])
}

#[derive(Default)]
pub(super) struct RecordingArchive {
    stored: Mutex<Vec<(JobId, RenderedPacket)>>,
}

impl RecordingArchive {
    pub(super) fn stored(&self) -> Vec<(JobId, RenderedPacket)> {
        self.stored.lock().expect("archive mutex poisoned").clone()
    }
}

#[async_trait]
impl PacketArchive for RecordingArchive {
    async fn store(
        &self,
        job_id: &JobId,
        client_id: &ClientId,
        packet: &RenderedPacket,
    ) -> Result<ArchiveReceipt, ArchiveError> {
        self.stored
            .lock()
            .expect("archive mutex poisoned")
            .push((job_id.clone(), packet.clone()));
        Ok(ArchiveReceipt {
            location: format!("memory://{client_id}/{job_id}"),
        })
    }
}

/// Fails the first `failures` writes, then succeeds.
pub(super) struct FlakyArchive {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyArchive {
    pub(super) fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PacketArchive for FlakyArchive {
    async fn store(
        &self,
        job_id: &JobId,
        _client_id: &ClientId,
        _packet: &RenderedPacket,
    ) -> Result<ArchiveReceipt, ArchiveError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(ArchiveError::Unavailable("disk full".to_string()))
        } else {
            Ok(ArchiveReceipt {
                location: format!("memory://{job_id}"),
            })
        }
    }
}

/// Panics on the first `panics` writes, then succeeds.
pub(super) struct PanickingArchive {
    panics: usize,
    calls: AtomicUsize,
}

impl PanickingArchive {
    pub(super) fn new(panics: usize) -> Self {
        Self {
            panics,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PacketArchive for PanickingArchive {
    async fn store(
        &self,
        job_id: &JobId,
        _client_id: &ClientId,
        _packet: &RenderedPacket,
    ) -> Result<ArchiveReceipt, ArchiveError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.panics {
            panic!("archive backend crashed");
        }
        Ok(ArchiveReceipt {
            location: format!("memory://{job_id}"),
        })
    }
}

/// Never finishes a write within any sensible budget.
pub(super) struct SlowArchive;

#[async_trait]
impl PacketArchive for SlowArchive {
    async fn store(
        &self,
        _job_id: &JobId,
        _client_id: &ClientId,
        _packet: &RenderedPacket,
    ) -> Result<ArchiveReceipt, ArchiveError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(ArchiveError::Unavailable("unreachable".to_string()))
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    ready: Mutex<Vec<PacketReady>>,
    escalations: Mutex<Vec<FailureEscalation>>,
}

impl RecordingNotifier {
    pub(super) fn ready(&self) -> Vec<PacketReady> {
        self.ready.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn escalations(&self) -> Vec<FailureEscalation> {
        self.escalations
            .lock()
            .expect("notifier mutex poisoned")
            .clone()
    }
}

#[async_trait]
impl GenerationNotifier for RecordingNotifier {
    async fn packet_ready(&self, event: PacketReady) -> Result<(), NotifyError> {
        self.ready.lock().expect("notifier mutex poisoned").push(event);
        Ok(())
    }

    async fn escalate(&self, escalation: FailureEscalation) -> Result<(), NotifyError> {
        self.escalations
            .lock()
            .expect("notifier mutex poisoned")
            .push(escalation);
        Ok(())
    }
}

pub(super) struct Harness<A> {
    pub(super) store: Arc<InMemoryJobStore>,
    pub(super) archive: Arc<A>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) clock: Arc<ManualClock>,
    pub(super) queue: Arc<GenerationQueue<InMemoryJobStore>>,
}

pub(super) fn harness_with<A>(
    archive: A,
    templates: TemplateLibrary,
    config: GenerationConfig,
) -> Harness<A>
where
    A: PacketArchive + 'static,
{
    let store = Arc::new(InMemoryJobStore::new());
    let archive = Arc::new(archive);
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(ManualClock::new(start()));
    let queue = GenerationQueue::new(
        Arc::clone(&store),
        archive.clone(),
        notifier.clone(),
        &config,
    )
    .with_templates(Arc::new(templates))
    .with_clock(clock.clone());

    Harness {
        store,
        archive,
        notifier,
        clock,
        queue: Arc::new(queue),
    }
}

pub(super) fn harness() -> Harness<RecordingArchive> {
    harness_with(
        RecordingArchive::default(),
        TemplateLibrary::standard(),
        generation_config(5),
    )
}

pub(super) fn service_for<A>(
    harness: &Harness<A>,
    policy: HiddenAnswerPolicy,
) -> Arc<GenerationService<InMemoryJobStore>> {
    let monitor = QueueMonitor::new(
        Arc::clone(&harness.store),
        harness.clock.clone(),
        MonitorConfig::default(),
    );
    Arc::new(GenerationService::new(
        Arc::new(IntakeCatalog::standard()),
        Arc::clone(&harness.queue),
        Arc::new(monitor),
        policy,
    ))
}
