use crate::infra::{InMemoryPacketArchive, LoggingNotifier};
use chrono::Utc;
use clap::Args;
use coachdesk::config::{GenerationConfig, MonitorConfig};
use coachdesk::error::AppError;
use coachdesk::workflows::generation::{
    ClientId, ClientProfile, GenerationQueue, GenerationService, GenerationServiceError,
    InMemoryJobStore, JobOutcome, ManualClock, QueueMonitor, Requester,
};
use coachdesk::workflows::intake::{
    AnswerValue, HiddenAnswerPolicy, IntakeCatalog, IntakeError, IntakeResponses,
};
use coachdesk::workflows::packets::{
    ContentBlock, ContentKind, PacketSection, PacketTemplate, PacketType, TemplateLibrary,
};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Client name printed on the packets
    #[arg(long, default_value = "Jordan Reyes")]
    pub(crate) client_name: String,
    /// Client segment used for template selection (e.g. "athlete")
    #[arg(long)]
    pub(crate) segment: Option<String>,
    /// Self-reported stress level (1-10); above 6 adds the lifestyle packet
    #[arg(long, default_value_t = 4.0)]
    pub(crate) stress_level: f64,
    /// Self-reported nightly sleep in hours; below 6 adds the lifestyle packet
    #[arg(long, default_value_t = 7.5)]
    pub(crate) sleep_hours: f64,
    /// Use a nutrition template that needs data the intake never collects
    #[arg(long)]
    pub(crate) simulate_missing_data: bool,
    /// Print every generated packet in full
    #[arg(long)]
    pub(crate) show_packets: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        client_name,
        segment,
        stress_level,
        sleep_hours,
        simulate_missing_data,
        show_packets,
    } = args;

    println!("Coaching intake and packet generation demo");

    let generation = GenerationConfig::default();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let store = Arc::new(InMemoryJobStore::new());
    let archive = InMemoryPacketArchive::default();
    let notifier = LoggingNotifier::default();
    let templates = if simulate_missing_data {
        templates_with_missing_field()
    } else {
        TemplateLibrary::standard()
    };

    let queue = Arc::new(
        GenerationQueue::new(
            Arc::clone(&store),
            Arc::new(archive.clone()),
            Arc::new(notifier.clone()),
            &generation,
        )
        .with_templates(Arc::new(templates))
        .with_clock(clock.clone()),
    );
    let monitor = Arc::new(QueueMonitor::new(
        store,
        clock.clone(),
        MonitorConfig::default(),
    ));
    let service = GenerationService::new(
        Arc::new(IntakeCatalog::standard()),
        Arc::clone(&queue),
        monitor,
        HiddenAnswerPolicy::Retain,
    );

    let client = ClientProfile {
        id: ClientId::from("demo-client"),
        full_name: client_name,
        email: "demo-client@example.com".to_string(),
        segment,
    };
    let requester = Requester::Client(client.id.clone());
    let responses = sample_intake(stress_level, sleep_hours);

    let receipt = match service.submit_intake(&requester, client, responses) {
        Ok(receipt) => receipt,
        Err(GenerationServiceError::Intake(IntakeError::Invalid(report))) => {
            println!("  Intake rejected:");
            for error in &report.errors {
                println!("    - {}: {}", error.question_id, error.message);
            }
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    println!("- Intake accepted for {}", receipt.client_id);
    for job in &receipt.jobs {
        println!("  queued {} as {}", job.packet_type, job.job_id);
    }

    let policy = queue.policy();
    let mut rounds = 0;
    loop {
        let outcomes = queue
            .run_until_idle()
            .await
            .map_err(GenerationServiceError::from)?;
        for outcome in &outcomes {
            match outcome {
                JobOutcome::Completed { job_id, location } => {
                    println!("  {job_id} completed -> {location}");
                }
                JobOutcome::RetryScheduled {
                    job_id,
                    attempts,
                    delay,
                } => {
                    println!(
                        "  {job_id} failed attempt {attempts}, retrying in {}s",
                        delay.as_secs()
                    );
                }
                JobOutcome::Escalated { job_id, attempts } => {
                    println!("  {job_id} escalated after {attempts} attempts");
                }
            }
        }

        let counts = service.stats()?;
        rounds += 1;
        if counts.retrying == 0 || rounds > policy.max_attempts {
            break;
        }
        // Skip ahead past the longest possible backoff instead of sleeping.
        clock.advance(policy.max_delay);
    }

    let counts = service.stats()?;
    println!(
        "\nQueue stats: {} completed | {} failed | {} pending | {} retrying",
        counts.completed, counts.failed, counts.pending, counts.retrying
    );
    let health = service.health()?;
    println!("Queue health: {:?}", health.status);
    for issue in &health.issues {
        println!("  - {:?}: {}", issue.kind, issue.message);
    }

    for escalation in notifier.escalations() {
        println!(
            "\nEscalation for {} ({}): {} after {} attempts",
            escalation.client_name,
            escalation.packet_type,
            escalation.error_message,
            escalation.retry_count
        );
        if let Some(path) = &escalation.missing_path {
            println!("  Missing data: {path}");
        }
    }

    println!("\n{} packet(s) archived", archive.len());
    if show_packets {
        for job in &receipt.jobs {
            if let Some(packet) = archive.get(&job.job_id) {
                println!("\n# {} ({})\n", packet.packet_type.title(), job.job_id);
                print!("{}", packet.to_text());
            }
        }
    }

    Ok(())
}

fn sample_intake(stress_level: f64, sleep_hours: f64) -> IntakeResponses {
    IntakeResponses::new()
        .with("preferred_name", AnswerValue::text("Jordan"))
        .with("age", AnswerValue::Number(34.0))
        .with("sex", AnswerValue::text("male"))
        .with("height_cm", AnswerValue::Number(180.0))
        .with("weight_kg", AnswerValue::Number(86.0))
        .with("primary_goal", AnswerValue::text("lose_fat"))
        .with("target_weight_kg", AnswerValue::Number(80.0))
        .with("activity_level", AnswerValue::text("moderate"))
        .with("training_days", AnswerValue::Number(4.0))
        .with("equipment", AnswerValue::list(&["dumbbells", "bands"]))
        .with("injuries", AnswerValue::text("no"))
        .with("dietary_preferences", AnswerValue::list(&["omnivore"]))
        .with("cooking_frequency", AnswerValue::text("often"))
        .with("meal_prep_minutes", AnswerValue::Number(30.0))
        .with("sleep_hours", AnswerValue::Number(sleep_hours))
        .with("stress_level", AnswerValue::Number(stress_level))
}

fn templates_with_missing_field() -> TemplateLibrary {
    let mut templates: Vec<PacketTemplate> = TemplateLibrary::standard()
        .templates()
        .iter()
        .filter(|template| template.packet_type != PacketType::Nutrition)
        .cloned()
        .collect();
    templates.push(PacketTemplate {
        id: "nutrition-needs-lab-work".to_string(),
        packet_type: PacketType::Nutrition,
        segment: None,
        is_default: true,
        sections: vec![PacketSection::new("labs", "Lab targets", &["ferritin"])],
        blocks: vec![ContentBlock::new(
            "ferritin",
            ContentKind::Text,
            "Keep ferritin near {{calculated.ferritinTarget}} ng/mL.",
        )],
    });
    TemplateLibrary::new(templates)
}
