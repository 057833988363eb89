//! Core types for the start-light synchronization protocol
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod types;

pub use self::error::{Error, Result};
pub use self::types::{
    DeviceId,
    Micros,
    Phase,
    ReceiverConfig,
    StepSchedule,
};

/// Protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum speaker volume carried in a START message
pub const MAX_VOLUME: u8 = 30;

/// Microseconds per decisecond (the unit of schedule offsets)
pub const DS_MICROS: u32 = 100_000;

/// Phase offsets (deciseconds) of the default flash sequence run on a
/// broadcast flash command
pub const FLASH_T_DS: [u16; 4] = [0, 5, 10, 15];

/// Volume used by the default flash sequence
pub const FLASH_VOLUME: u8 = 15;
