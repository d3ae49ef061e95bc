//! # nimbus-broker
//!
//! Command broker and topic router for long-lived device streams.
//!
//! One server process multiplexes many bidirectional streams (one per
//! connected device or client), routes commands between them by topic,
//! and layers a request/response pattern on top of an otherwise
//! fire-and-forget stream.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket)
//!     │
//!     ├── WS transport (ws/)
//!     │
//!     ├── Workers (worker/)          ── Authenticator (auth)
//!     │
//!     ├── MessageBroker (service/)
//!     │
//!     ├── SubscriptionRegistry (domain/)
//!     ├── TopicForwarder (domain/)
//!     └── RequestCorrelator (domain/)
//! ```

pub mod app_state;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod worker;
pub mod ws;
