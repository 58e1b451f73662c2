//! Persistent client connection subsystem.
//!
//! # Data Flow
//! ```text
//! Client opens push channel (websocket)
//!     → push.rs (PushHub::connect, keyed by push reference)
//!     → server pushes PushMessage JSON (test webhook received / expired / deleted)
//!
//! Termination (shutdown, protocol fault, reconnect):
//!     → close_code.rs (CloseReason → numeric close code)
//!     → close frame sent, connection unregistered on drop
//! ```
//!
//! # Design Decisions
//! - Shutdown closes with GoingAway so clients reconnect instead of reporting a fault
//! - Reserved codes (1005, 1006) are never written to the wire
//! - Each connection tracked RAII-style for draining at shutdown

pub mod close_code;
pub mod push;

pub use close_code::{map_close_reason, CloseReason};
pub use push::{ConnectionId, PushCommand, PushConnection, PushHub, PushMessage, TestWebhookData};
