//! Capability traits defined in `labhub-core` and implemented by other
//! crates (or by the transport layer that embeds LabHub).

pub mod clock;
pub mod emitter;
pub mod pubsub;

pub use clock::{Clock, MonotonicClock, SystemClock};
pub use emitter::{CompletionCallback, ErrorCallback, EventEmitter};
pub use pubsub::{PubSub, Subscription};
