use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::{Phase, ReceiverConfig, Result};
use crate::protocol::{Message, ReceiverState};
use crate::util::micros_until;

use super::clock::MonotonicClock;

/// Hardware seam for the light/sound head of a start device.
///
/// The driver calls this once per phase at that phase's scheduled offset;
/// implementations toggle LEDs and the speaker and must not block.
pub trait Actuator: Send {
    /// Applies one phase of the sequence at the given volume
    fn set_phase(&mut self, phase: Phase, volume: u8);
}

/// Async driver for one receiver device.
///
/// Owns the protocol state machine, the local clock, and the actuator, and
/// serializes all protocol events: inbound messages and the single pending
/// deadline are raced in one loop, so no two events for this device are ever
/// processed concurrently. Arming a new schedule simply replaces the
/// deadline the loop waits on, which is all the timer cancellation the
/// protocol needs.
pub struct Receiver<C, A> {
    state: ReceiverState,
    clock: C,
    actuator: A,
    inbound: mpsc::Receiver<Message>,
}

impl<C, A> Receiver<C, A>
where
    C: MonotonicClock,
    A: Actuator,
{
    /// Creates a receiver driver.
    ///
    /// `inbound` carries decoded messages from the transport; `outbound`
    /// carries READY acks back to it.
    pub fn new(
        config: ReceiverConfig,
        clock: C,
        actuator: A,
        inbound: mpsc::Receiver<Message>,
        outbound: mpsc::Sender<Message>,
    ) -> Self {
        Receiver {
            state: ReceiverState::new(config, outbound),
            clock,
            actuator,
            inbound,
        }
    }

    /// Runs the device until the inbound channel closes.
    ///
    /// Reception is event-driven: absence of a message leaves the state
    /// machine where it is. Malformed messages are logged and dropped.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let wait = self
                .state
                .pending_deadline()
                .map(|deadline| micros_until(self.clock.now(), deadline));

            tokio::select! {
                maybe = self.inbound.recv() => {
                    let Some(message) = maybe else {
                        debug!("inbound channel closed, receiver stopping");
                        return Ok(());
                    };
                    let now = self.clock.now();
                    if let Err(e) = self.state.handle_message(message, now).await {
                        if e.is_recoverable() {
                            warn!("dropping message: {}", e);
                        } else {
                            return Err(e);
                        }
                    }
                }
                _ = tokio::time::sleep(wait.unwrap_or_default()), if wait.is_some() => {
                    self.fire().await;
                }
            }
        }
    }

    /// Drives the committed sequence through its phases.
    ///
    /// Offsets are relative to the fire deadline, so only relative sleeps
    /// are needed from here on. Messages arriving meanwhile stay queued
    /// until the sequence ends, keeping the single-thread-of-control model.
    async fn fire(&mut self) {
        let Some((schedule, _deadline)) = self.state.begin_firing() else {
            return;
        };
        let mut elapsed = 0u64;
        for (index, phase) in schedule.phases().iter().enumerate() {
            let offset = schedule.offset_micros(index);
            if offset > elapsed {
                tokio::time::sleep(Duration::from_micros(offset - elapsed)).await;
                elapsed = offset;
            }
            self.actuator.set_phase(*phase, schedule.volume);
        }
        self.state.finish_firing();
    }
}
