//! Packed binary encoding of protocol messages
//!
//! Every record is laid out field-by-field, little-endian, with no padding;
//! the layout never depends on host struct representation. The leading byte
//! is the variant discriminator. The two Start layouts (22-byte addressed,
//! 17-byte legacy) share a discriminator and are told apart by exact length,
//! which is unambiguous on a datagram transport; on a byte stream the caller
//! declares the expected layout via [`StartLayout`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{DeviceId, Error, Micros, Result, StepSchedule};

use super::message::{Addressing, Message};
use super::{
    BROADCAST_LEN, DISCOVER_LEN, MSG_BROADCAST, MSG_DISCOVER, MSG_READY, MSG_START, READY_LEN,
    START_ADDRESSED_LEN, START_LEGACY_LEN,
};

impl Message {
    /// Exact size of this message on the wire
    pub fn encoded_len(&self) -> usize {
        match self {
            Message::Start { addressing: Some(_), .. } => START_ADDRESSED_LEN,
            Message::Start { addressing: None, .. } => START_LEGACY_LEN,
            Message::Discover { .. } => DISCOVER_LEN,
            Message::Broadcast { .. } => BROADCAST_LEN,
            Message::ReadyAck { .. } => READY_LEN,
        }
    }

    /// Encodes this message into a fixed-size buffer
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.write(&mut buf);
        buf.freeze()
    }

    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(self.type_byte());
        match self {
            Message::Start {
                seq,
                addressing,
                master_start,
                schedule,
            } => {
                dst.put_u16_le(*seq);
                if let Some(a) = addressing {
                    dst.put_u8(a.target.0);
                    dst.put_u32_le(a.current_clock.0);
                }
                dst.put_u32_le(master_start.0);
                dst.put_u8(schedule.volume);
                dst.put_u8(schedule.steps);
                for t in schedule.t_ds {
                    dst.put_u16_le(t);
                }
            }
            Message::Discover { seq, target } => {
                dst.put_u16_le(*seq);
                dst.put_u8(target.0);
            }
            Message::Broadcast { seq, command } => {
                dst.put_u16_le(*seq);
                dst.put_u8(u8::from(*command));
            }
            Message::ReadyAck { seq } => {
                dst.put_u16_le(*seq);
            }
        }
    }

    /// Decodes one complete datagram.
    ///
    /// The buffer must hold exactly one record; any length mismatch is a
    /// `Truncated` error and an unrecognized discriminator is
    /// `UnknownMessageType`. The codec decides neither drop nor log policy.
    pub fn decode(buf: &[u8]) -> Result<Message> {
        let ty = *buf.first().ok_or(Error::Truncated {
            expected: READY_LEN,
            actual: 0,
        })?;
        match ty {
            MSG_START => match buf.len() {
                START_ADDRESSED_LEN => {
                    let mut rest = &buf[1..];
                    let seq = rest.get_u16_le();
                    let target = DeviceId(rest.get_u8());
                    let current_clock = Micros(rest.get_u32_le());
                    let (master_start, schedule) = read_start_tail(&mut rest);
                    Ok(Message::Start {
                        seq,
                        addressing: Some(Addressing {
                            target,
                            current_clock,
                        }),
                        master_start,
                        schedule,
                    })
                }
                START_LEGACY_LEN => {
                    let mut rest = &buf[1..];
                    let seq = rest.get_u16_le();
                    let (master_start, schedule) = read_start_tail(&mut rest);
                    Ok(Message::Start {
                        seq,
                        addressing: None,
                        master_start,
                        schedule,
                    })
                }
                actual => Err(Error::Truncated {
                    expected: START_ADDRESSED_LEN,
                    actual,
                }),
            },
            MSG_DISCOVER => {
                let mut rest = exact(buf, DISCOVER_LEN)?;
                let seq = rest.get_u16_le();
                let target = DeviceId(rest.get_u8());
                Ok(Message::Discover { seq, target })
            }
            MSG_BROADCAST => {
                let mut rest = exact(buf, BROADCAST_LEN)?;
                let seq = rest.get_u16_le();
                let command = rest.get_u8().into();
                Ok(Message::Broadcast { seq, command })
            }
            MSG_READY => {
                let mut rest = exact(buf, READY_LEN)?;
                let seq = rest.get_u16_le();
                Ok(Message::ReadyAck { seq })
            }
            other => Err(Error::UnknownMessageType(other)),
        }
    }
}

fn exact(buf: &[u8], expected: usize) -> Result<&[u8]> {
    if buf.len() != expected {
        return Err(Error::Truncated {
            expected,
            actual: buf.len(),
        });
    }
    Ok(&buf[1..])
}

/// Reads the fields shared by both Start layouts: masterStart, volume,
/// steps, t_ds[4]. Length was checked by the caller.
fn read_start_tail(rest: &mut &[u8]) -> (Micros, StepSchedule) {
    let master_start = Micros(rest.get_u32_le());
    let volume = rest.get_u8();
    let steps = rest.get_u8();
    let mut t_ds = [0u16; 4];
    for t in &mut t_ds {
        *t = rest.get_u16_le();
    }
    (
        master_start,
        StepSchedule {
            volume,
            steps,
            t_ds,
        },
    )
}

/// Which Start layout a byte-stream peer speaks.
///
/// A stream has no datagram boundary to sniff, so the framing length of a
/// 0xA1 record must be declared up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartLayout {
    /// 22-byte Start carrying targetId and currentClock
    #[default]
    Addressed,
    /// Pre-addressing 17-byte Start
    Legacy,
}

impl StartLayout {
    fn start_len(self) -> usize {
        match self {
            StartLayout::Addressed => START_ADDRESSED_LEN,
            StartLayout::Legacy => START_LEGACY_LEN,
        }
    }
}

/// Protocol message codec for framing messages over a byte stream
#[derive(Debug, Clone, Default)]
pub struct WireCodec {
    start_layout: StartLayout,
}

impl WireCodec {
    /// Creates a codec expecting the addressed Start layout
    pub fn new() -> Self {
        WireCodec::default()
    }

    /// Creates a codec for the declared Start layout
    pub fn with_layout(start_layout: StartLayout) -> Self {
        WireCodec { start_layout }
    }

    fn frame_len(&self, ty: u8) -> Result<usize> {
        match ty {
            MSG_START => Ok(self.start_layout.start_len()),
            MSG_DISCOVER => Ok(DISCOVER_LEN),
            MSG_BROADCAST => Ok(BROADCAST_LEN),
            MSG_READY => Ok(READY_LEN),
            other => Err(Error::UnknownMessageType(other)),
        }
    }
}

impl Decoder for WireCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        let Some(&ty) = src.first() else {
            return Ok(None);
        };
        let len = self.frame_len(ty)?;
        if src.len() < len {
            // Need more data to read the full record
            src.reserve(len - src.len());
            return Ok(None);
        }
        let frame = src.split_to(len);
        Message::decode(&frame).map(Some)
    }
}

impl Encoder<Message> for WireCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(item.encoded_len());
        item.write(dst);
        Ok(())
    }
}
