use num_enum::{FromPrimitive, IntoPrimitive};

use crate::core::{Error, Result, StepSchedule};

/// Command codes carried in a Broadcast message.
///
/// The enumeration is open on the wire: codes this build does not know are
/// preserved as `Unknown` so that newer coordinators can add commands
/// without breaking older receivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum Command {
    /// Run the default flash sequence on every device
    Flash = 1,

    #[num_enum(catch_all)]
    Unknown(u8),
}

/// What a receiver should do in response to a broadcast command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Fire the given sequence immediately
    RunSequence(StepSchedule),
}

/// Maps a broadcast command to a receiver action.
///
/// Unknown codes yield `UnrecognizedCommand`; callers treat that as a
/// dropped message, never a failure of the device.
pub fn dispatch(command: Command) -> Result<Action> {
    match command {
        Command::Flash => Ok(Action::RunSequence(StepSchedule::flash())),
        Command::Unknown(code) => Err(Error::UnrecognizedCommand(code)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes() {
        assert_eq!(u8::from(Command::Flash), 1);
        assert_eq!(Command::from_primitive(1), Command::Flash);
        assert_eq!(Command::from_primitive(99), Command::Unknown(99));
        // Unknown codes survive a round-trip unchanged
        assert_eq!(u8::from(Command::Unknown(99)), 99);
    }

    #[test]
    fn test_dispatch_flash() {
        let action = dispatch(Command::Flash).unwrap();
        let Action::RunSequence(schedule) = action;
        assert!(schedule.validate().is_ok());
        assert_eq!(schedule.t_ds, crate::core::FLASH_T_DS);
    }

    #[test]
    fn test_dispatch_unknown() {
        let err = dispatch(Command::Unknown(99)).unwrap_err();
        assert!(matches!(err, Error::UnrecognizedCommand(99)));
        assert!(err.is_recoverable());
    }
}
