//! startline: wire protocol and start-time synchronization for networked
//! race start lights.
//!
//! A coordinator discovers light devices over a radio link, then sends each
//! one an addressed START carrying a sample of its own clock alongside the
//! future start time; every receiver translates that schedule into its own
//! clock domain and fires its light/sound sequence in lockstep with the
//! others. The byte transport, the hardware clock source, and the actual
//! lamps are seams supplied by the embedding application.

pub mod core;
pub mod protocol;
pub mod sync;
pub mod util;

// Re-export commonly used items
pub use self::core::{DeviceId, Error, Micros, Phase, ReceiverConfig, Result, StepSchedule};
pub use self::protocol::{Command, Message, StartLayout, WireCodec};
pub use self::sync::{Actuator, Coordinator, MonotonicClock, Receiver, StdClock};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
