use serde::{Deserialize, Serialize};

use super::error::{Error, Result};
use super::{DS_MICROS, FLASH_T_DS, FLASH_VOLUME, MAX_VOLUME};

/// Identity of a physical start-light device on the radio link.
///
/// Identities are provisioned out of band and never change at runtime;
/// id 0 is reserved as the wildcard target that every receiver accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub u8);

impl DeviceId {
    /// Reserved id addressing every receiver
    pub const WILDCARD: DeviceId = DeviceId(0);

    /// Creates a new device identity
    pub fn new(id: u8) -> Self {
        DeviceId(id)
    }

    /// Returns true if this is the reserved wildcard id
    pub fn is_wildcard(&self) -> bool {
        *self == Self::WILDCARD
    }

    /// Receiver-side accept rule for an addressed message.
    ///
    /// `None` means the message used the legacy unaddressed layout, which is
    /// accepted unconditionally for backward compatibility.
    pub fn matches(&self, target: Option<DeviceId>) -> bool {
        match target {
            None => true,
            Some(t) => t.is_wildcard() || t == *self,
        }
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DEV{:02}", self.0)
    }
}

/// A reading of a device's wrapping 32-bit microsecond clock.
///
/// Clocks on different devices are independent; values are only comparable
/// within one device's clock domain, and all arithmetic wraps at 2^32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Micros(pub u32);

impl Micros {
    /// Advances this reading by `delta` microseconds, wrapping
    pub fn wrapping_add(self, delta: u32) -> Micros {
        Micros(self.0.wrapping_add(delta))
    }

    /// Microseconds elapsed from `earlier` to `self`, wrapping
    pub fn wrapping_since(self, earlier: Micros) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }
}

/// One phase of the light/sound sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Red,
    Orange,
    Green,
    Off,
}

impl Phase {
    /// Phases in firing order; a 3-step schedule omits the trailing Off
    pub const SEQUENCE: [Phase; 4] = [Phase::Red, Phase::Orange, Phase::Green, Phase::Off];
}

/// Timeline of one light sequence, relative to the fire deadline.
///
/// `steps` selects how many of the four `t_ds` entries are meaningful; the
/// active entries are deciseconds from the deadline and must be
/// non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSchedule {
    /// Speaker volume, 0..=30
    pub volume: u8,
    /// Number of phases, 3 or 4
    pub steps: u8,
    /// Phase offsets in deciseconds from the fire deadline
    pub t_ds: [u16; 4],
}

impl StepSchedule {
    /// Creates a validated schedule. Volume is clamped to the protocol
    /// maximum rather than rejected, matching transmitter behavior.
    pub fn new(volume: u8, steps: u8, t_ds: [u16; 4]) -> Result<Self> {
        let schedule = StepSchedule {
            volume: volume.min(MAX_VOLUME),
            steps,
            t_ds,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    /// The default sequence run on a broadcast flash command
    pub fn flash() -> Self {
        StepSchedule {
            volume: FLASH_VOLUME,
            steps: 4,
            t_ds: FLASH_T_DS,
        }
    }

    /// Checks the schedule invariants: step count in {3, 4} and
    /// non-decreasing offsets over the active steps.
    pub fn validate(&self) -> Result<()> {
        if self.steps != 3 && self.steps != 4 {
            return Err(Error::InvalidStepCount(self.steps));
        }
        let active = &self.t_ds[..self.steps as usize];
        if active.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::malformed_schedule(format!(
                "offsets not non-decreasing: {:?}",
                active
            )));
        }
        Ok(())
    }

    /// Phases of this schedule in firing order
    pub fn phases(&self) -> &'static [Phase] {
        &Phase::SEQUENCE[..self.steps as usize]
    }

    /// Copy of this schedule with volume clamped to the protocol maximum.
    ///
    /// Decoded schedules carry the raw wire byte; receivers clamp before
    /// arming so an out-of-range volume never reaches the speaker.
    pub fn clamp_volume(self) -> Self {
        StepSchedule {
            volume: self.volume.min(MAX_VOLUME),
            ..self
        }
    }

    /// Offset of step `index` in microseconds from the fire deadline.
    ///
    /// Widened to u64: the largest wire offset (65535 ds) exceeds u32 when
    /// converted to microseconds.
    pub fn offset_micros(&self, index: usize) -> u64 {
        u64::from(self.t_ds[index]) * u64::from(DS_MICROS)
    }

    /// Offset of the final step, after which the sequence is over
    pub fn last_offset_micros(&self) -> u64 {
        self.offset_micros(self.steps as usize - 1)
    }
}

/// Configuration for a receiver device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// This device's provisioned identity (non-zero)
    pub device_id: DeviceId,
    /// Whether to accept the legacy unaddressed 17-byte Start layout
    pub accept_legacy: bool,
}

impl ReceiverConfig {
    /// Creates a configuration for the given identity.
    ///
    /// The wildcard id 0 cannot be provisioned to a device.
    pub fn new(device_id: DeviceId) -> Result<Self> {
        if device_id.is_wildcard() {
            return Err(Error::protocol("device id 0 is reserved as the wildcard target"));
        }
        Ok(ReceiverConfig {
            device_id,
            accept_legacy: true,
        })
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            device_id: DeviceId(1),
            accept_legacy: true,
        }
    }
}
