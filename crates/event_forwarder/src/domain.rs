mod attribute_projector;
mod debounce_gate;
mod envelope_builder;
mod forwarder_config;
mod forwarder_state;
mod heartbeat;
mod idempotency_gate;
mod pending_queue;
mod stats;
mod trigger;
mod zone_resolver;

pub use attribute_projector::*;
pub use debounce_gate::*;
pub use envelope_builder::*;
pub use forwarder_config::*;
pub use forwarder_state::*;
pub use heartbeat::*;
pub use idempotency_gate::*;
pub use pending_queue::*;
pub use stats::*;
pub use trigger::*;
pub use zone_resolver::*;
