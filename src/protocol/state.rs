use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::{Micros, ReceiverConfig, Result, StepSchedule};
use crate::sync::clock::translate;
use crate::util::seq_newer;

use super::command::{dispatch, Action, Command};
use super::message::{Addressing, Message};

/// Represents the current state of a receiver device
#[derive(Debug)]
pub enum DeviceState {
    /// No pending schedule
    Idle,

    /// Acknowledged a Discover, waiting for an addressed Start
    AwaitingStart {
        /// seq of the Discover we acknowledged
        discover_seq: u16,
    },

    /// A schedule is committed and the single pending timer is set
    Armed {
        /// seq of the Start that armed this schedule
        seq: u16,
        /// Local clock value at which the sequence begins
        deadline: Micros,
        /// The committed sequence
        schedule: StepSchedule,
    },

    /// Driving the light sequence through its phases
    Firing {
        /// seq of the schedule being fired
        seq: u16,
        /// Local clock value the sequence began at
        deadline: Micros,
        /// The sequence being fired
        schedule: StepSchedule,
    },
}

impl DeviceState {
    /// Short name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            DeviceState::Idle => "Idle",
            DeviceState::AwaitingStart { .. } => "AwaitingStart",
            DeviceState::Armed { .. } => "Armed",
            DeviceState::Firing { .. } => "Firing",
        }
    }
}

/// Receiver-side protocol state machine.
///
/// Drives the Discover → Start → READY handshake and owns the single active
/// schedule for this device. All transitions are serialized: one message or
/// timer event is processed at a time. Validation failures drop the incoming
/// message and leave the state unchanged; nothing here is fatal to the
/// device.
pub struct ReceiverState {
    /// Fixed configuration (identity, legacy acceptance)
    config: ReceiverConfig,
    /// Current state
    state: DeviceState,
    /// seq of the last schedule we armed, for dedup and latest-wins
    last_armed_seq: Option<u16>,
    /// Channel for outbound acks
    message_tx: mpsc::Sender<Message>,
}

impl ReceiverState {
    /// Creates a new receiver state machine
    pub fn new(config: ReceiverConfig, message_tx: mpsc::Sender<Message>) -> Self {
        ReceiverState {
            config,
            state: DeviceState::Idle,
            last_armed_seq: None,
            message_tx,
        }
    }

    /// The current state
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// The deadline of the armed schedule, if any
    pub fn pending_deadline(&self) -> Option<Micros> {
        match self.state {
            DeviceState::Armed { deadline, .. } => Some(deadline),
            _ => None,
        }
    }

    /// Handles an incoming message.
    ///
    /// `now` is this device's clock reading at receipt; it anchors the clock
    /// translation for addressed Starts. Messages not for this device are
    /// silently dropped; malformed ones return a recoverable error.
    pub async fn handle_message(&mut self, message: Message, now: Micros) -> Result<()> {
        match message {
            Message::Discover { seq, target } => {
                if !self.config.device_id.matches(Some(target)) {
                    debug!(%target, "discover not addressed to us");
                    return Ok(());
                }
                self.handle_discover(seq).await
            }

            Message::Start {
                seq,
                addressing,
                master_start,
                schedule,
            } => self.handle_start(seq, addressing, master_start, schedule, now).await,

            Message::Broadcast { seq, command } => self.handle_broadcast(seq, command, now),

            Message::ReadyAck { seq } => {
                // Coordinator-side traffic; a receiver just overhears it
                debug!(seq, "ignoring READY ack");
                Ok(())
            }
        }
    }

    /// Acknowledges a Discover probe and, from Idle, moves to AwaitingStart.
    ///
    /// A probe while Armed or Firing is acknowledged without touching the
    /// committed schedule.
    async fn handle_discover(&mut self, seq: u16) -> Result<()> {
        self.send_ready(seq).await?;
        match self.state {
            DeviceState::Idle | DeviceState::AwaitingStart { .. } => {
                self.state = DeviceState::AwaitingStart { discover_seq: seq };
            }
            DeviceState::Armed { .. } | DeviceState::Firing { .. } => {
                debug!(state = self.state.name(), "probe acknowledged, schedule kept");
            }
        }
        Ok(())
    }

    async fn handle_start(
        &mut self,
        seq: u16,
        addressing: Option<Addressing>,
        master_start: Micros,
        schedule: StepSchedule,
        now: Micros,
    ) -> Result<()> {
        let target = addressing.map(|a| a.target);
        if !self.config.device_id.matches(target) {
            debug!(seq, ?target, "start not addressed to us");
            return Ok(());
        }
        if addressing.is_none() && !self.config.accept_legacy {
            debug!(seq, "legacy start rejected by configuration");
            return Ok(());
        }
        if !self.is_fresh(seq) {
            debug!(seq, last = ?self.last_armed_seq, "stale or duplicate start");
            return Ok(());
        }
        if matches!(self.state, DeviceState::Firing { .. }) {
            debug!(seq, "start ignored while firing");
            return Ok(());
        }

        schedule.validate()?;
        let schedule = schedule.clamp_volume();

        // Legacy starts carry no clock sample, so masterStart is already a
        // local deadline under the original single-clock assumption.
        let deadline = match addressing {
            Some(a) => translate(now, a.current_clock, master_start),
            None => master_start,
        };

        if let DeviceState::Armed { seq: old, .. } = self.state {
            debug!(old, new = seq, "newer start preempts armed schedule");
        }
        self.state = DeviceState::Armed {
            seq,
            deadline,
            schedule,
        };
        self.last_armed_seq = Some(seq);
        self.send_ready(seq).await
    }

    /// A broadcast command arms an immediate sequence, but only from Idle so
    /// a flash test cannot clobber a committed race schedule.
    fn handle_broadcast(&mut self, seq: u16, command: Command, now: Micros) -> Result<()> {
        if !matches!(self.state, DeviceState::Idle) {
            debug!(seq, state = self.state.name(), "broadcast ignored");
            return Ok(());
        }
        if !self.is_fresh(seq) {
            debug!(seq, last = ?self.last_armed_seq, "stale or duplicate broadcast");
            return Ok(());
        }
        let Action::RunSequence(schedule) = dispatch(command)?;
        self.state = DeviceState::Armed {
            seq,
            deadline: now,
            schedule,
        };
        self.last_armed_seq = Some(seq);
        Ok(())
    }

    /// Wraparound-safe freshness check against the last armed seq
    fn is_fresh(&self, seq: u16) -> bool {
        self.last_armed_seq.map_or(true, |last| seq_newer(seq, last))
    }

    async fn send_ready(&mut self, seq: u16) -> Result<()> {
        self.message_tx
            .send(Message::ReadyAck { seq })
            .await
            .map_err(|e| crate::core::Error::protocol(format!("failed to send READY: {}", e)))
    }

    /// Transitions Armed → Firing at the deadline, handing the committed
    /// schedule to the driver. Returns None if nothing is armed.
    pub fn begin_firing(&mut self) -> Option<(StepSchedule, Micros)> {
        match self.state {
            DeviceState::Armed {
                seq,
                deadline,
                schedule,
            } => {
                self.state = DeviceState::Firing {
                    seq,
                    deadline,
                    schedule,
                };
                Some((schedule, deadline))
            }
            _ => {
                warn!(state = self.state.name(), "fire requested with nothing armed");
                None
            }
        }
    }

    /// Transitions Firing → Idle once the last phase offset has elapsed
    pub fn finish_firing(&mut self) {
        if let DeviceState::Firing { seq, .. } = self.state {
            debug!(seq, "sequence complete");
            self.state = DeviceState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DeviceId, Error};

    fn machine(id: u8) -> (ReceiverState, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(32);
        let config = ReceiverConfig::new(DeviceId(id)).unwrap();
        (ReceiverState::new(config, tx), rx)
    }

    fn schedule() -> StepSchedule {
        StepSchedule::new(10, 4, [0, 10, 50, 100]).unwrap()
    }

    fn start(seq: u16, target: u8, current_clock: u32, master_start: u32) -> Message {
        Message::addressed_start(
            seq,
            DeviceId(target),
            Micros(current_clock),
            Micros(master_start),
            schedule(),
        )
    }

    #[tokio::test]
    async fn test_discover_handshake() {
        let (mut state, mut rx) = machine(5);

        let probe = Message::Discover { seq: 1, target: DeviceId(5) };
        state.handle_message(probe, Micros(0)).await.unwrap();

        assert!(matches!(state.state(), DeviceState::AwaitingStart { discover_seq: 1 }));
        assert_eq!(rx.recv().await, Some(Message::ReadyAck { seq: 1 }));
    }

    #[tokio::test]
    async fn test_discover_address_filter() {
        let (mut state, mut rx) = machine(5);

        let probe = Message::Discover { seq: 1, target: DeviceId(6) };
        state.handle_message(probe, Micros(0)).await.unwrap();
        assert!(matches!(state.state(), DeviceState::Idle));
        assert!(rx.try_recv().is_err());

        // The wildcard id probes everyone
        let probe = Message::Discover { seq: 2, target: DeviceId::WILDCARD };
        state.handle_message(probe, Micros(0)).await.unwrap();
        assert_eq!(rx.recv().await, Some(Message::ReadyAck { seq: 2 }));
    }

    #[tokio::test]
    async fn test_start_arms_translated_deadline() {
        let (mut state, mut rx) = machine(5);

        // local=1000, currentClock=900 → offset=100; deadline=2000+100
        state
            .handle_message(start(2, 5, 900, 2000), Micros(1000))
            .await
            .unwrap();

        assert_eq!(state.pending_deadline(), Some(Micros(2100)));
        assert_eq!(rx.recv().await, Some(Message::ReadyAck { seq: 2 }));
    }

    #[tokio::test]
    async fn test_start_accepted_from_idle() {
        // Legacy coordinators never probe first
        let (mut state, mut rx) = machine(5);
        let legacy = Message::legacy_start(3, Micros(5000), schedule());

        state.handle_message(legacy, Micros(1000)).await.unwrap();

        // No clock sample in the legacy layout: masterStart taken verbatim
        assert_eq!(state.pending_deadline(), Some(Micros(5000)));
        assert_eq!(rx.recv().await, Some(Message::ReadyAck { seq: 3 }));
    }

    #[tokio::test]
    async fn test_legacy_rejected_by_config() {
        let (tx, mut rx) = mpsc::channel(32);
        let mut config = ReceiverConfig::new(DeviceId(5)).unwrap();
        config.accept_legacy = false;
        let mut state = ReceiverState::new(config, tx);

        let legacy = Message::legacy_start(3, Micros(5000), schedule());
        state.handle_message(legacy, Micros(1000)).await.unwrap();
        assert!(matches!(state.state(), DeviceState::Idle));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_address_filter() {
        let (mut state, mut rx) = machine(5);

        state
            .handle_message(start(2, 6, 900, 2000), Micros(1000))
            .await
            .unwrap();
        assert!(matches!(state.state(), DeviceState::Idle));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_latest_wins_preemption() {
        let (mut state, mut rx) = machine(5);

        state.handle_message(start(5, 5, 900, 2000), Micros(1000)).await.unwrap();
        assert_eq!(state.pending_deadline(), Some(Micros(2100)));

        // Newer seq replaces the pending schedule
        state.handle_message(start(6, 5, 900, 9000), Micros(1000)).await.unwrap();
        assert_eq!(state.pending_deadline(), Some(Micros(9100)));

        // Stale seq is ignored
        state.handle_message(start(4, 5, 900, 3000), Micros(1000)).await.unwrap();
        assert_eq!(state.pending_deadline(), Some(Micros(9100)));

        // Duplicate of the armed seq is ignored too
        state.handle_message(start(6, 5, 900, 1234), Micros(1000)).await.unwrap();
        assert_eq!(state.pending_deadline(), Some(Micros(9100)));

        assert_eq!(rx.recv().await, Some(Message::ReadyAck { seq: 5 }));
        assert_eq!(rx.recv().await, Some(Message::ReadyAck { seq: 6 }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_seq_wraparound() {
        let (mut state, _rx) = machine(5);

        state
            .handle_message(start(65535, 5, 900, 2000), Micros(1000))
            .await
            .unwrap();
        // 0 is newer than 65535 across the wrap
        state.handle_message(start(0, 5, 900, 7000), Micros(1000)).await.unwrap();
        assert_eq!(state.pending_deadline(), Some(Micros(7100)));
    }

    #[tokio::test]
    async fn test_invalid_step_count_rejected() {
        let (mut state, mut rx) = machine(5);

        let bad = Message::addressed_start(
            2,
            DeviceId(5),
            Micros(900),
            Micros(2000),
            StepSchedule { volume: 10, steps: 5, t_ds: [0, 10, 50, 100] },
        );
        let err = state.handle_message(bad, Micros(1000)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidStepCount(5)));
        assert!(err.is_recoverable());

        // Rejected message commits nothing and acks nothing
        assert!(matches!(state.state(), DeviceState::Idle));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_overloud_start_clamped() {
        let (mut state, mut rx) = machine(5);

        // Volume byte off the wire exceeds the protocol maximum
        let loud = Message::addressed_start(
            2,
            DeviceId(5),
            Micros(900),
            Micros(2000),
            StepSchedule { volume: 200, steps: 4, t_ds: [0, 10, 50, 100] },
        );
        state.handle_message(loud, Micros(1000)).await.unwrap();

        match state.state() {
            DeviceState::Armed { schedule, .. } => {
                assert_eq!(schedule.volume, crate::core::MAX_VOLUME);
            }
            other => panic!("expected Armed, got {}", other.name()),
        }
        assert_eq!(rx.recv().await, Some(Message::ReadyAck { seq: 2 }));
    }

    #[tokio::test]
    async fn test_broadcast_flash() {
        let (mut state, mut rx) = machine(5);

        let flash = Message::Broadcast { seq: 9, command: Command::Flash };
        state.handle_message(flash, Micros(500)).await.unwrap();

        // Flash arms the default sequence for immediate firing, no ack
        assert_eq!(state.pending_deadline(), Some(Micros(500)));
        assert!(rx.try_recv().is_err());
        match state.state() {
            DeviceState::Armed { schedule, .. } => {
                assert_eq!(*schedule, StepSchedule::flash());
            }
            other => panic!("expected Armed, got {}", other.name()),
        }
    }

    #[tokio::test]
    async fn test_unknown_command_ignored() {
        let (mut state, _rx) = machine(5);

        let msg = Message::Broadcast { seq: 9, command: Command::Unknown(99) };
        let err = state.handle_message(msg, Micros(500)).await.unwrap_err();
        assert!(matches!(err, Error::UnrecognizedCommand(99)));

        // Device remains in its prior state
        assert!(matches!(state.state(), DeviceState::Idle));
    }

    #[tokio::test]
    async fn test_broadcast_does_not_clobber_armed() {
        let (mut state, _rx) = machine(5);

        state.handle_message(start(5, 5, 900, 2000), Micros(1000)).await.unwrap();
        let flash = Message::Broadcast { seq: 6, command: Command::Flash };
        state.handle_message(flash, Micros(1000)).await.unwrap();

        assert_eq!(state.pending_deadline(), Some(Micros(2100)));
    }

    #[tokio::test]
    async fn test_firing_lifecycle() {
        let (mut state, _rx) = machine(5);

        state.handle_message(start(5, 5, 900, 2000), Micros(1000)).await.unwrap();
        let (fired, deadline) = state.begin_firing().unwrap();
        assert_eq!(fired, schedule());
        assert_eq!(deadline, Micros(2100));
        assert!(matches!(state.state(), DeviceState::Firing { .. }));

        // Starts during Firing are dropped
        state.handle_message(start(6, 5, 900, 9000), Micros(1000)).await.unwrap();
        assert!(matches!(state.state(), DeviceState::Firing { .. }));

        state.finish_firing();
        assert!(matches!(state.state(), DeviceState::Idle));

        // Nothing armed: fire request is a no-op
        assert!(state.begin_firing().is_none());
    }

    #[tokio::test]
    async fn test_probe_while_armed_keeps_schedule() {
        let (mut state, mut rx) = machine(5);

        state.handle_message(start(5, 5, 900, 2000), Micros(1000)).await.unwrap();
        let probe = Message::Discover { seq: 6, target: DeviceId(5) };
        state.handle_message(probe, Micros(1500)).await.unwrap();

        assert_eq!(state.pending_deadline(), Some(Micros(2100)));
        assert_eq!(rx.recv().await, Some(Message::ReadyAck { seq: 5 }));
        assert_eq!(rx.recv().await, Some(Message::ReadyAck { seq: 6 }));
    }
}
