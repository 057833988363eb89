use std::collections::HashMap;

use crate::core::{DeviceId, Micros};

/// What the coordinator knows about one device
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    /// seq of the most recent READY from this device
    pub last_ack_seq: u16,
    /// Coordinator clock reading when that READY arrived
    pub last_seen: Micros,
}

/// Coordinator-side registry of device identities.
///
/// Tracks which provisioned identities have answered a probe and correlates
/// READY acks (which carry only a seq) back to the device each exchange was
/// addressed to. Receiver-side address matching does not live here; that is
/// fixed configuration on the device itself.
#[derive(Debug, Default)]
pub struct AddressRegistry {
    /// Devices that have acknowledged at least one exchange
    devices: HashMap<DeviceId, DeviceRecord>,
    /// Outstanding exchanges awaiting a READY, keyed by seq
    pending: HashMap<u16, DeviceId>,
}

impl AddressRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        AddressRegistry::default()
    }

    /// Records an outbound exchange awaiting acknowledgement
    pub fn note_sent(&mut self, seq: u16, target: DeviceId) {
        self.pending.insert(seq, target);
    }

    /// Correlates a READY ack to the device it came from.
    ///
    /// Returns the target of the acknowledged exchange, or None for an
    /// unsolicited seq. A wildcard or legacy exchange cannot be attributed
    /// to a specific device (the ack carries no sender id), so only
    /// specifically addressed exchanges update the device table.
    pub fn acknowledge(&mut self, seq: u16, now: Micros) -> Option<DeviceId> {
        let target = self.pending.remove(&seq)?;
        if !target.is_wildcard() {
            self.devices.insert(
                target,
                DeviceRecord {
                    last_ack_seq: seq,
                    last_seen: now,
                },
            );
        }
        Some(target)
    }

    /// True if the exchange is still awaiting a READY
    pub fn is_pending(&self, seq: u16) -> bool {
        self.pending.contains_key(&seq)
    }

    /// Devices that have acknowledged, in id order
    pub fn discovered(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.devices.keys().copied().collect();
        ids.sort_by_key(|id| id.0);
        ids
    }

    /// Record for one device, if it has ever acknowledged
    pub fn record(&self, id: DeviceId) -> Option<&DeviceRecord> {
        self.devices.get(&id)
    }

    /// Number of devices that have acknowledged
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}
