//! notifyfwd Receiver - Axum-based HTTP endpoint for forwarded notifications
//!
//! This crate provides the server side of the handshake: it reports its
//! version and displays whatever arrives on `/api/notify`, which is how the
//! operator sees a pairing code.

pub mod http;
pub mod state;

pub use http::{create_router, serve};
pub use state::{ReceivedNotification, ReceiverState};
