//! Outbound collaborators: packet persistence and operator/client notifications.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::{ClientId, JobId};
use crate::workflows::packets::{PacketType, RenderedPacket};

/// Where an archived packet ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveReceipt {
    pub location: String,
}

/// Persistence for rendered packets.
#[async_trait]
pub trait PacketArchive: Send + Sync {
    async fn store(
        &self,
        job_id: &JobId,
        client_id: &ClientId,
        packet: &RenderedPacket,
    ) -> Result<ArchiveReceipt, ArchiveError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArchiveError {
    #[error("packet archive unavailable: {0}")]
    Unavailable(String),
    #[error("packet archive rejected the write: {0}")]
    Rejected(String),
}

/// "Ready" event fired after a packet is archived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketReady {
    pub job_id: JobId,
    pub client_id: ClientId,
    pub packet_type: PacketType,
    pub location: String,
}

/// Payload sent to operators once a job has exhausted its retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEscalation {
    pub job_id: JobId,
    pub client_id: ClientId,
    pub client_name: String,
    pub client_email: String,
    pub packet_type: PacketType,
    pub error_message: String,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_path: Option<String>,
}

#[async_trait]
pub trait GenerationNotifier: Send + Sync {
    async fn packet_ready(&self, event: PacketReady) -> Result<(), NotifyError>;
    async fn escalate(&self, escalation: FailureEscalation) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
