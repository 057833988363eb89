use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::core::{DeviceId, Error, Micros, Result, StepSchedule};
use crate::protocol::{Command, Message};

use super::clock::MonotonicClock;
use super::registry::AddressRegistry;

/// Transmitter side of the protocol.
///
/// Builds and sends Discover/Start/Broadcast exchanges, stamping each Start
/// with a sample of the local clock so receivers can translate the schedule
/// into their own clock domains, and folds READY acks into the address
/// registry. There is no retransmission here: the protocol is best-effort
/// and the registry only tells the caller which exchanges were acknowledged.
pub struct Coordinator<C> {
    clock: C,
    /// Last used sequence number; wraps at 65536
    seq: u16,
    /// Channel to the transport
    message_tx: mpsc::Sender<Message>,
    registry: AddressRegistry,
}

impl<C: MonotonicClock> Coordinator<C> {
    /// Creates a coordinator.
    ///
    /// The sequence counter starts at a random value so exchanges from a
    /// restarted coordinator are not mistaken for stale duplicates.
    pub fn new(clock: C, message_tx: mpsc::Sender<Message>) -> Self {
        Coordinator {
            clock,
            seq: rand::random(),
            message_tx,
            registry: AddressRegistry::new(),
        }
    }

    /// The address registry accumulated from READY acks
    pub fn registry(&self) -> &AddressRegistry {
        &self.registry
    }

    fn next_seq(&mut self) -> u16 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    /// Probes one device (or all, via the wildcard id) for liveness.
    ///
    /// Returns the seq of the exchange so the caller can watch for its ack.
    pub async fn discover(&mut self, target: DeviceId) -> Result<u16> {
        let seq = self.next_seq();
        self.registry.note_sent(seq, target);
        self.send(Message::Discover { seq, target }).await?;
        Ok(seq)
    }

    /// Schedules a sequence on one device, `lead_time` from now.
    ///
    /// The message carries both the current clock reading and the future
    /// start time, in this coordinator's clock domain.
    pub async fn start(
        &mut self,
        target: DeviceId,
        schedule: StepSchedule,
        lead_time: Duration,
    ) -> Result<u16> {
        schedule.validate()?;
        let seq = self.next_seq();
        let now = self.clock.now();
        let master_start = now.wrapping_add(lead_time.as_micros() as u32);
        self.registry.note_sent(seq, target);
        self.send(Message::addressed_start(seq, target, now, master_start, schedule))
            .await?;
        Ok(seq)
    }

    /// Schedules a sequence using the legacy unaddressed 17-byte layout.
    ///
    /// Legacy receivers share no clock sample, so `master_start` must
    /// already be meaningful in their clock domain; this exists only to
    /// drive pre-addressing firmware.
    pub async fn start_legacy(
        &mut self,
        master_start: Micros,
        schedule: StepSchedule,
    ) -> Result<u16> {
        schedule.validate()?;
        let seq = self.next_seq();
        self.registry.note_sent(seq, DeviceId::WILDCARD);
        self.send(Message::legacy_start(seq, master_start, schedule))
            .await?;
        Ok(seq)
    }

    /// Broadcasts a command to every receiver. Broadcasts are not
    /// acknowledged, so nothing is registered as pending.
    pub async fn broadcast(&mut self, command: Command) -> Result<u16> {
        let seq = self.next_seq();
        self.send(Message::Broadcast { seq, command }).await?;
        Ok(seq)
    }

    /// Feeds an inbound message from the transport into the coordinator.
    ///
    /// Returns the device a READY ack was attributed to, if any. Anything
    /// other than a READY is coordinator-bound noise and is dropped.
    pub fn handle_message(&mut self, message: Message) -> Option<DeviceId> {
        match message {
            Message::ReadyAck { seq } => {
                let now = self.clock.now();
                let target = self.registry.acknowledge(seq, now);
                if target.is_none() {
                    debug!(seq, "unsolicited READY ack");
                }
                target
            }
            other => {
                debug!(ty = other.type_byte(), "ignoring non-ack message");
                None
            }
        }
    }

    async fn send(&self, message: Message) -> Result<()> {
        self.message_tx
            .send(message)
            .await
            .map_err(|e| Error::protocol(format!("failed to send message: {}", e)))
    }
}
