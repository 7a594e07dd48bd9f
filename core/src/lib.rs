//! Checklist synchronisation: the client widget, its transport, and the
//! in-memory dispatcher it talks to.

pub mod board;
pub mod error;
pub mod event_sender;
pub mod server;
pub mod transport;
pub mod widget;

pub use board::{SessionBoard, SopCatalog};
pub use error::{Result, SyncError};
pub use event_sender::{EventSender, EventSink};
pub use server::Server;
pub use transport::{Connection, LoopbackPeer};
pub use widget::{ChecklistContainer, ChecklistSyncWidget, StepRow, UpdateOutcome, CONTAINER_ID};
