//! Domain layer: the messaging core.
//!
//! Value objects (commands, envelopes, fetch requests), the stream handle
//! contract, the subscription registry, the topic forwarder, and the
//! pending-request correlator.

pub mod command;
pub mod correlator;
pub mod envelope;
pub mod fetch;
pub mod forwarder;
pub mod registry;
pub mod stream_handle;
pub mod stream_id;

pub use command::Command;
pub use correlator::{CorrelationKey, PendingRequest, RequestCorrelator};
pub use envelope::{ResponseEnvelope, ResultCode};
pub use fetch::FetchRequest;
pub use forwarder::{DEFAULT_RESPONSE_TIMEOUT, TopicForwarder};
pub use registry::{StreamInfo, StreamSubscription, SubscriptionRegistry, TopicSubscriber};
pub use stream_handle::{ChannelStreamHandle, StreamHandle};
pub use stream_id::StreamId;
