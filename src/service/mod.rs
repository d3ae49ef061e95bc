//! Service layer: the assembled messaging subsystem.
//!
//! [`MessageBroker`] bundles the registry, forwarder, and correlator into
//! one explicit instance for workers and the transport to share.

pub mod broker;

pub use broker::MessageBroker;
