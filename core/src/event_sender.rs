use crate::error::{Result, SyncError};
use sopcheck_protocol::OutboundEvent;
use tokio::sync::mpsc::UnboundedSender;

/// Destination for events the client sends to the server.
///
/// `emit` only hands the event off; it never waits for delivery.
pub trait EventSink {
    fn emit(&self, event: OutboundEvent) -> Result<()>;
}

#[derive(Clone, Debug, Default)]
pub struct EventSender(Option<UnboundedSender<OutboundEvent>>);

impl EventSender {
    pub fn new(tx: UnboundedSender<OutboundEvent>) -> Self {
        Self(Some(tx))
    }

    pub fn noop() -> Self {
        Self(None)
    }
}

impl EventSink for EventSender {
    fn emit(&self, event: OutboundEvent) -> Result<()> {
        match &self.0 {
            Some(tx) => tx.send(event).map_err(|_| SyncError::ChannelSend),
            None => Ok(()),
        }
    }
}

impl<S: EventSink + ?Sized> EventSink for &S {
    fn emit(&self, event: OutboundEvent) -> Result<()> {
        (**self).emit(event)
    }
}
