//! WebSocket transport layer.
//!
//! The `/ws` endpoint carries one long-lived bidirectional stream per
//! connected peer: command/fetch frames in, response and push frames out.

pub mod connection;
pub mod handler;
pub mod messages;
