//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace layer)
//!     → handlers.rs (health, test webhook sessions)
//!     → push.rs (websocket push channel)
//!     → response.rs (LifecycleError → status code + JSON body)
//! ```
//!
//! # Design Decisions
//! - New sessions and push connections are refused once shutdown has started
//! - Session notices reach the browser over the push channel, not the REST call

pub mod handlers;
pub mod push;
pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
