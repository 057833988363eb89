//! Protocol implementation module
//!
//! This module defines the startline wire messages, their packed binary
//! encoding, command dispatch, and the receiver state machine.

pub mod codec;
pub mod command;
pub mod message;
pub mod state;

pub use self::codec::{StartLayout, WireCodec};
pub use self::command::{dispatch, Action, Command};
pub use self::message::{Addressing, Message};
pub use self::state::{DeviceState, ReceiverState};

// Message type discriminators (first byte on the wire)
/// Start message, coordinator → receiver
pub const MSG_START: u8 = 0xA1;
/// Discover probe, coordinator → receiver
pub const MSG_DISCOVER: u8 = 0xA2;
/// Broadcast command, coordinator → all receivers
pub const MSG_BROADCAST: u8 = 0xA3;
/// Ready acknowledgement, receiver → coordinator
pub const MSG_READY: u8 = 0xB1;

// Exact encoded sizes; field order and width are part of the wire contract
/// Addressed Start size in bytes
pub const START_ADDRESSED_LEN: usize = 22;
/// Legacy unaddressed Start size in bytes
pub const START_LEGACY_LEN: usize = 17;
/// Discover size in bytes
pub const DISCOVER_LEN: usize = 4;
/// Broadcast size in bytes
pub const BROADCAST_LEN: usize = 4;
/// ReadyAck size in bytes
pub const READY_LEN: usize = 3;
