use async_trait::async_trait;
use shared::{
    domain::{EventId, SessionId},
    error::TransportError,
    protocol::{Acknowledgment, View},
};

/// Messaging client that owns the session's visible message.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn edit_view(&self, session_id: &SessionId, view: &View) -> Result<(), TransportError>;

    async fn acknowledge(
        &self,
        event_id: &EventId,
        ack: &Acknowledgment,
    ) -> Result<(), TransportError>;
}
