//! Port counter kinds and the per-port counter record.
//!
//! [`CounterKind::ALL`] is the single table that drives reading counters from
//! sysfs and declaring/updating metric families in the exporter.

use std::fmt;

/// A port performance counter exposed under `ports/<n>/counters/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CounterKind {
    ReceiveData,
    TransmitData,
    ReceivePackets,
    TransmitPackets,
    ReceiveUnicastPackets,
    TransmitUnicastPackets,
    ReceiveMulticastPackets,
    TransmitMulticastPackets,
    ReceiveErrors,
    ReceiveDiscards,
    TransmitDiscards,
    ReceiveConstraintErrors,
    TransmitConstraintErrors,
    ReceiveRemotePhysicalErrors,
    ReceiveSwitchRelayErrors,
    TransmitWait,
}

impl CounterKind {
    /// Every counter kind, in declaration order.
    pub const ALL: [CounterKind; 16] = [
        CounterKind::ReceiveData,
        CounterKind::TransmitData,
        CounterKind::ReceivePackets,
        CounterKind::TransmitPackets,
        CounterKind::ReceiveUnicastPackets,
        CounterKind::TransmitUnicastPackets,
        CounterKind::ReceiveMulticastPackets,
        CounterKind::TransmitMulticastPackets,
        CounterKind::ReceiveErrors,
        CounterKind::ReceiveDiscards,
        CounterKind::TransmitDiscards,
        CounterKind::ReceiveConstraintErrors,
        CounterKind::TransmitConstraintErrors,
        CounterKind::ReceiveRemotePhysicalErrors,
        CounterKind::ReceiveSwitchRelayErrors,
        CounterKind::TransmitWait,
    ];

    /// File name of this counter inside a port's `counters` directory.
    pub fn file_name(self) -> &'static str {
        match self {
            CounterKind::ReceiveData => "port_rcv_data",
            CounterKind::TransmitData => "port_xmit_data",
            CounterKind::ReceivePackets => "port_rcv_packets",
            CounterKind::TransmitPackets => "port_xmit_packets",
            CounterKind::ReceiveUnicastPackets => "unicast_rcv_packets",
            CounterKind::TransmitUnicastPackets => "unicast_xmit_packets",
            CounterKind::ReceiveMulticastPackets => "multicast_rcv_packets",
            CounterKind::TransmitMulticastPackets => "multicast_xmit_packets",
            CounterKind::ReceiveErrors => "port_rcv_errors",
            CounterKind::ReceiveDiscards => "port_rcv_discards",
            CounterKind::TransmitDiscards => "port_xmit_discards",
            CounterKind::ReceiveConstraintErrors => "port_rcv_constraint_errors",
            CounterKind::TransmitConstraintErrors => "port_xmit_constraint_errors",
            CounterKind::ReceiveRemotePhysicalErrors => "port_rcv_remote_physical_errors",
            CounterKind::ReceiveSwitchRelayErrors => "port_rcv_switch_relay_errors",
            CounterKind::TransmitWait => "port_xmit_wait",
        }
    }

    /// Multiplier applied to the raw file value.
    ///
    /// The data counters count 4-octet words.
    pub fn scale(self) -> u64 {
        match self {
            CounterKind::ReceiveData | CounterKind::TransmitData => 4,
            _ => 1,
        }
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Counters read from one port. `None` means the port did not expose a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortCounters {
    pub receive_data: Option<u64>,
    pub transmit_data: Option<u64>,
    pub receive_packets: Option<u64>,
    pub transmit_packets: Option<u64>,
    pub receive_unicast_packets: Option<u64>,
    pub transmit_unicast_packets: Option<u64>,
    pub receive_multicast_packets: Option<u64>,
    pub transmit_multicast_packets: Option<u64>,
    pub receive_errors: Option<u64>,
    pub receive_discards: Option<u64>,
    pub transmit_discards: Option<u64>,
    pub receive_constraint_errors: Option<u64>,
    pub transmit_constraint_errors: Option<u64>,
    pub receive_remote_physical_errors: Option<u64>,
    pub receive_switch_relay_errors: Option<u64>,
    pub transmit_wait: Option<u64>,
}

impl PortCounters {
    fn slot(&mut self, kind: CounterKind) -> &mut Option<u64> {
        match kind {
            CounterKind::ReceiveData => &mut self.receive_data,
            CounterKind::TransmitData => &mut self.transmit_data,
            CounterKind::ReceivePackets => &mut self.receive_packets,
            CounterKind::TransmitPackets => &mut self.transmit_packets,
            CounterKind::ReceiveUnicastPackets => &mut self.receive_unicast_packets,
            CounterKind::TransmitUnicastPackets => &mut self.transmit_unicast_packets,
            CounterKind::ReceiveMulticastPackets => &mut self.receive_multicast_packets,
            CounterKind::TransmitMulticastPackets => &mut self.transmit_multicast_packets,
            CounterKind::ReceiveErrors => &mut self.receive_errors,
            CounterKind::ReceiveDiscards => &mut self.receive_discards,
            CounterKind::TransmitDiscards => &mut self.transmit_discards,
            CounterKind::ReceiveConstraintErrors => &mut self.receive_constraint_errors,
            CounterKind::TransmitConstraintErrors => &mut self.transmit_constraint_errors,
            CounterKind::ReceiveRemotePhysicalErrors => &mut self.receive_remote_physical_errors,
            CounterKind::ReceiveSwitchRelayErrors => &mut self.receive_switch_relay_errors,
            CounterKind::TransmitWait => &mut self.transmit_wait,
        }
    }

    /// Value of one counter, if present.
    pub fn get(&self, kind: CounterKind) -> Option<u64> {
        match kind {
            CounterKind::ReceiveData => self.receive_data,
            CounterKind::TransmitData => self.transmit_data,
            CounterKind::ReceivePackets => self.receive_packets,
            CounterKind::TransmitPackets => self.transmit_packets,
            CounterKind::ReceiveUnicastPackets => self.receive_unicast_packets,
            CounterKind::TransmitUnicastPackets => self.transmit_unicast_packets,
            CounterKind::ReceiveMulticastPackets => self.receive_multicast_packets,
            CounterKind::TransmitMulticastPackets => self.transmit_multicast_packets,
            CounterKind::ReceiveErrors => self.receive_errors,
            CounterKind::ReceiveDiscards => self.receive_discards,
            CounterKind::TransmitDiscards => self.transmit_discards,
            CounterKind::ReceiveConstraintErrors => self.receive_constraint_errors,
            CounterKind::TransmitConstraintErrors => self.transmit_constraint_errors,
            CounterKind::ReceiveRemotePhysicalErrors => self.receive_remote_physical_errors,
            CounterKind::ReceiveSwitchRelayErrors => self.receive_switch_relay_errors,
            CounterKind::TransmitWait => self.transmit_wait,
        }
    }

    /// Set (or clear) one counter.
    pub fn set(&mut self, kind: CounterKind, value: Option<u64>) {
        *self.slot(kind) = value;
    }

    /// Builder-style setter, mostly for tests and fixtures.
    pub fn with(mut self, kind: CounterKind, value: u64) -> Self {
        self.set(kind, Some(value));
        self
    }

    /// Iterate over the counters that have a value.
    pub fn present(&self) -> impl Iterator<Item = (CounterKind, u64)> + '_ {
        CounterKind::ALL
            .into_iter()
            .filter_map(|kind| self.get(kind).map(|v| (kind, v)))
    }

    /// True when no counter has a value.
    pub fn is_empty(&self) -> bool {
        self.present().next().is_none()
    }
}
