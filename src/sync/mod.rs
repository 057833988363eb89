//! Synchronization module
//!
//! This module contains the clock translation that puts a coordinator's
//! schedule into a receiver's clock domain, the async drivers for both ends
//! of the protocol, and the coordinator-side address registry.

pub mod clock;
pub mod coordinator;
pub mod receiver;
pub mod registry;

pub use self::clock::{translate, MonotonicClock, StdClock, VirtualClock};
pub use self::coordinator::Coordinator;
pub use self::receiver::{Actuator, Receiver};
pub use self::registry::AddressRegistry;
