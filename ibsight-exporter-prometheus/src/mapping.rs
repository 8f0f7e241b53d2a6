//! Mapping from InfiniBand counters to Prometheus metric families.

use ibsight_common::{CounterKind, InfiniBandDevice};
use prometheus_client::encoding::EncodeLabelSet;

/// Labels shared by every per-port family.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PortLabels {
    pub device: String,
    pub port: String,
}

impl PortLabels {
    /// Build labels for a device/port pair. The port is rendered in base 10.
    pub fn new(device: &str, port: u32) -> Self {
        Self {
            device: device.to_string(),
            port: port.to_string(),
        }
    }
}

/// Labels of the per-device info family.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DeviceInfoLabels {
    pub device: String,
    pub board_id: String,
    pub firmware_version: String,
    pub hca_type: String,
}

impl From<&InfiniBandDevice> for DeviceInfoLabels {
    fn from(device: &InfiniBandDevice) -> Self {
        Self {
            device: device.name.clone(),
            board_id: device.board_id.clone().unwrap_or_default(),
            firmware_version: device.firmware_version.clone().unwrap_or_default(),
            hca_type: device.hca_type.clone().unwrap_or_default(),
        }
    }
}

/// Metric family name for a counter.
///
/// Format: `infiniband_port_{direction}_{quantity}_total`
pub fn metric_name(kind: CounterKind) -> &'static str {
    match kind {
        CounterKind::ReceiveData => "infiniband_port_receive_data_total",
        CounterKind::TransmitData => "infiniband_port_transmit_data_total",
        CounterKind::ReceivePackets => "infiniband_port_receive_packets_total",
        CounterKind::TransmitPackets => "infiniband_port_transmit_packets_total",
        CounterKind::ReceiveUnicastPackets => "infiniband_port_receive_unicast_packets_total",
        CounterKind::TransmitUnicastPackets => "infiniband_port_transmit_unicast_packets_total",
        CounterKind::ReceiveMulticastPackets => "infiniband_port_receive_multicast_packets_total",
        CounterKind::TransmitMulticastPackets => {
            "infiniband_port_transmit_multicast_packets_total"
        }
        CounterKind::ReceiveErrors => "infiniband_port_receive_errors_total",
        CounterKind::ReceiveDiscards => "infiniband_port_receive_discards_total",
        CounterKind::TransmitDiscards => "infiniband_port_transmit_discards_total",
        CounterKind::ReceiveConstraintErrors => "infiniband_port_receive_constraint_errors_total",
        CounterKind::TransmitConstraintErrors => {
            "infiniband_port_transmit_constraint_errors_total"
        }
        CounterKind::ReceiveRemotePhysicalErrors => {
            "infiniband_port_receive_remote_physical_errors_total"
        }
        CounterKind::ReceiveSwitchRelayErrors => {
            "infiniband_port_receive_switch_relay_errors_total"
        }
        CounterKind::TransmitWait => "infiniband_port_transmit_wait_total",
    }
}

/// Help text for a counter family.
///
/// `prometheus_client` appends the trailing period itself.
pub fn help(kind: CounterKind) -> &'static str {
    match kind {
        CounterKind::ReceiveData => "Total number of received data on InfiniBand port",
        CounterKind::TransmitData => "Total number of transmitted data on InfiniBand port",
        CounterKind::ReceivePackets => {
            "Total number of packets received on all VLs by the InfiniBand port"
        }
        CounterKind::TransmitPackets => {
            "Total number of packets transmitted on all VLs from the InfiniBand port"
        }
        CounterKind::ReceiveUnicastPackets => "Total number of unicast packets received",
        CounterKind::TransmitUnicastPackets => "Total number of unicast packets transmitted",
        CounterKind::ReceiveMulticastPackets => "Total number of multicast packets received",
        CounterKind::TransmitMulticastPackets => "Total number of multicast packets transmitted",
        CounterKind::ReceiveErrors => "Total number of packets containing an error received",
        CounterKind::ReceiveDiscards => {
            "Total number of inbound packets discarded because the port is down or congested"
        }
        CounterKind::TransmitDiscards => {
            "Total number of outbound packets discarded because the port is down or congested"
        }
        CounterKind::ReceiveConstraintErrors => {
            "Total number of packets received on the switch physical port that are discarded"
        }
        CounterKind::TransmitConstraintErrors => {
            "Total number of packets not transmitted from the switch physical port"
        }
        CounterKind::ReceiveRemotePhysicalErrors => {
            "Total number of packets marked with the EBP delimiter received on the port"
        }
        CounterKind::ReceiveSwitchRelayErrors => {
            "Total number of packets that could not be forwarded by the switch"
        }
        CounterKind::TransmitWait => {
            "Total number of ticks during which the port had data to transmit but sent none"
        }
    }
}

/// Convert a raw counter to the gauge's value type, saturating at `i64::MAX`.
pub fn gauge_value(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
