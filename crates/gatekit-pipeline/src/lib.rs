//! GateKit Pipeline - the delivery machinery between HTTP and adapters
//!
//! Three pipelines live here:
//! - **Outbound** (`outbound`): accept a send request, fan it out across
//!   targets, invoke the right adapter per target, persist per-target
//!   status, and distinguish permanent from transient failures.
//! - **Inbound** (`inbound`): consume envelopes off the event bus, persist
//!   messages/reactions, resolve identities, and emit subscriber events.
//!   Per-thread ordering comes from hashing envelopes onto shard workers.
//! - **Subscribers** (`subscribers`): HMAC-signed at-least-once delivery of
//!   gateway events to registered webhook endpoints, with capped
//!   exponential backoff and per-attempt records.

pub mod bus;
pub mod inbound;
pub mod outbound;
pub mod subscribers;

pub use bus::EventBus;
pub use inbound::InboundProcessor;
pub use outbound::{
    classify_send_error, is_permanent_marker, JobError, JobState, JobStatus, OutboundConfig,
    OutboundPipeline, SendRequest, SendResponse, PERMANENT_MARKERS,
};
pub use subscribers::{DeliveryConfig, EventDispatcher, WebhookDispatcher};
