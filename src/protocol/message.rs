use crate::core::{DeviceId, Micros, StepSchedule};

use super::command::Command;
use super::{MSG_BROADCAST, MSG_DISCOVER, MSG_READY, MSG_START};

/// Addressing block carried only by the 22-byte Start layout.
///
/// `current_clock` is the coordinator's clock reading at send time and is
/// what lets the receiver translate `master_start` into its own clock
/// domain. The legacy 17-byte layout carries neither field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addressing {
    /// Device the Start is addressed to (0 = wildcard)
    pub target: DeviceId,
    /// Coordinator's clock at send time
    pub current_clock: Micros,
}

/// Protocol messages exchanged between coordinator and receivers.
///
/// Each variant maps to exactly one fixed-size packed wire record; see the
/// codec for the byte layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Schedule a light sequence to begin at `master_start`
    Start {
        /// Identifies this exchange; echoed by the READY ack
        seq: u16,
        /// Present in the addressed layout, absent in the legacy one
        addressing: Option<Addressing>,
        /// Coordinator clock value at which the sequence begins
        master_start: Micros,
        /// The sequence timeline and volume
        schedule: StepSchedule,
    },

    /// Liveness/addressability probe for one device
    Discover {
        /// Identifies this exchange; echoed by the READY ack
        seq: u16,
        /// Device being probed (0 = wildcard)
        target: DeviceId,
    },

    /// Unaddressed command for all receivers
    Broadcast {
        /// Identifies this exchange
        seq: u16,
        /// Open command enumeration; unknown codes are ignored by receivers
        command: Command,
    },

    /// Acknowledgement that a Discover was heard or a Start was committed
    ReadyAck {
        /// seq of the message being acknowledged
        seq: u16,
    },
}

impl Message {
    /// Creates an addressed Start (22-byte layout)
    pub fn addressed_start(
        seq: u16,
        target: DeviceId,
        current_clock: Micros,
        master_start: Micros,
        schedule: StepSchedule,
    ) -> Self {
        Message::Start {
            seq,
            addressing: Some(Addressing {
                target,
                current_clock,
            }),
            master_start,
            schedule,
        }
    }

    /// Creates a legacy unaddressed Start (17-byte layout)
    pub fn legacy_start(seq: u16, master_start: Micros, schedule: StepSchedule) -> Self {
        Message::Start {
            seq,
            addressing: None,
            master_start,
            schedule,
        }
    }

    /// The exchange this message belongs to
    pub fn seq(&self) -> u16 {
        match self {
            Message::Start { seq, .. }
            | Message::Discover { seq, .. }
            | Message::Broadcast { seq, .. }
            | Message::ReadyAck { seq } => *seq,
        }
    }

    /// The wire discriminator byte for this variant
    pub fn type_byte(&self) -> u8 {
        match self {
            Message::Start { .. } => MSG_START,
            Message::Discover { .. } => MSG_DISCOVER,
            Message::Broadcast { .. } => MSG_BROADCAST,
            Message::ReadyAck { .. } => MSG_READY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let schedule = StepSchedule::new(10, 4, [0, 10, 50, 100]).unwrap();

        let start = Message::addressed_start(
            7,
            DeviceId(5),
            Micros(900),
            Micros(2000),
            schedule,
        );
        assert_eq!(start.seq(), 7);
        assert_eq!(start.type_byte(), MSG_START);
        match start {
            Message::Start { addressing: Some(a), .. } => {
                assert_eq!(a.target, DeviceId(5));
                assert_eq!(a.current_clock, Micros(900));
            }
            _ => panic!("expected addressed Start"),
        }

        let legacy = Message::legacy_start(8, Micros(2000), schedule);
        match legacy {
            Message::Start { addressing: None, .. } => {}
            _ => panic!("expected legacy Start"),
        }
    }

    #[test]
    fn test_type_bytes() {
        let discover = Message::Discover { seq: 1, target: DeviceId(3) };
        let broadcast = Message::Broadcast { seq: 2, command: Command::Flash };
        let ready = Message::ReadyAck { seq: 1 };

        assert_eq!(discover.type_byte(), MSG_DISCOVER);
        assert_eq!(broadcast.type_byte(), MSG_BROADCAST);
        assert_eq!(ready.type_byte(), MSG_READY);
        assert_eq!(ready.seq(), 1);
    }
}
