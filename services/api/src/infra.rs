use async_trait::async_trait;
use coachdesk::workflows::generation::{
    ArchiveError, ArchiveReceipt, ClientId, FailureEscalation, GenerationNotifier, JobId,
    NotifyError, PacketArchive, PacketReady,
};
use coachdesk::workflows::packets::RenderedPacket;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) packets: InMemoryPacketArchive,
}

/// Keeps rendered packets in process memory, keyed by job id.
#[derive(Default, Clone)]
pub(crate) struct InMemoryPacketArchive {
    packets: Arc<Mutex<HashMap<JobId, RenderedPacket>>>,
}

impl InMemoryPacketArchive {
    pub(crate) fn get(&self, job_id: &JobId) -> Option<RenderedPacket> {
        self.packets
            .lock()
            .ok()
            .and_then(|guard| guard.get(job_id).cloned())
    }

    pub(crate) fn len(&self) -> usize {
        self.packets.lock().map(|guard| guard.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PacketArchive for InMemoryPacketArchive {
    async fn store(
        &self,
        job_id: &JobId,
        client_id: &ClientId,
        packet: &RenderedPacket,
    ) -> Result<ArchiveReceipt, ArchiveError> {
        let mut guard = self
            .packets
            .lock()
            .map_err(|_| ArchiveError::Unavailable("archive mutex poisoned".to_string()))?;
        guard.insert(job_id.clone(), packet.clone());
        Ok(ArchiveReceipt {
            location: format!("memory://packets/{client_id}/{job_id}"),
        })
    }
}

/// Emits ready events and escalations as structured log lines.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotifier {
    escalations: Arc<Mutex<Vec<FailureEscalation>>>,
}

impl LoggingNotifier {
    pub(crate) fn escalations(&self) -> Vec<FailureEscalation> {
        self.escalations
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GenerationNotifier for LoggingNotifier {
    async fn packet_ready(&self, event: PacketReady) -> Result<(), NotifyError> {
        info!(
            job_id = %event.job_id,
            client_id = %event.client_id,
            packet_type = %event.packet_type,
            location = %event.location,
            "packet ready for delivery"
        );
        Ok(())
    }

    async fn escalate(&self, escalation: FailureEscalation) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(&escalation)
            .map_err(|err| NotifyError::Transport(err.to_string()))?;
        error!(
            job_id = %escalation.job_id,
            client_id = %escalation.client_id,
            retry_count = escalation.retry_count,
            payload = %payload,
            "packet generation needs operator attention"
        );
        self.escalations
            .lock()
            .map_err(|_| NotifyError::Transport("notifier mutex poisoned".to_string()))?
            .push(escalation);
        Ok(())
    }
}
