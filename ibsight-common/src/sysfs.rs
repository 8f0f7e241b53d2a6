//! InfiniBand counter reader for the kernel sysfs tree.
//!
//! Layout read by [`SysFs::infiniband_class`]:
//!
//! ```text
//! <root>/class/infiniband/<device>/fw_ver
//! <root>/class/infiniband/<device>/board_id
//! <root>/class/infiniband/<device>/hca_type
//! <root>/class/infiniband/<device>/ports/<n>/state
//! <root>/class/infiniband/<device>/ports/<n>/phys_state
//! <root>/class/infiniband/<device>/ports/<n>/rate
//! <root>/class/infiniband/<device>/ports/<n>/counters/<counter>
//! ```
//!
//! Every read produces a fresh snapshot; nothing is cached between calls.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use crate::counters::{CounterKind, PortCounters};
use crate::error::{Error, Result};

/// Path of the InfiniBand class relative to the sysfs mount point.
pub const INFINIBAND_CLASS_PATH: &str = "class/infiniband";

/// Value written by drivers for counters without a performance management agent.
const NO_PMA: &str = "N/A (no PMA)";

/// Bytes per second for one Gb/s of signalling rate.
const BYTES_PER_GBIT: f64 = 125_000_000.0;

/// A numeric state with its textual name, e.g. `4: ACTIVE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortState {
    pub id: u32,
    pub name: String,
}

/// One port of an InfiniBand device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfiniBandPort {
    /// Owning device name.
    pub name: String,
    /// Port number.
    pub port: u32,
    /// Logical port state.
    pub state: Option<PortState>,
    /// Physical port state.
    pub phys_state: Option<PortState>,
    /// Signalling rate in bytes per second.
    pub rate: Option<u64>,
    /// Performance counters.
    pub counters: PortCounters,
}

/// One InfiniBand device (HCA) and its ports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfiniBandDevice {
    pub name: String,
    pub firmware_version: Option<String>,
    pub board_id: Option<String>,
    pub hca_type: Option<String>,
    /// Ports ordered by port number.
    pub ports: BTreeMap<u32, InfiniBandPort>,
}

/// Snapshot of every InfiniBand device, keyed by device name.
pub type InfiniBandClass = BTreeMap<String, InfiniBandDevice>;

/// Anything that can produce a fresh InfiniBand snapshot.
pub trait CounterSource: Send + Sync {
    /// Read the current state of all devices and ports.
    fn read_class(&self) -> Result<InfiniBandClass>;
}

/// Reader rooted at a sysfs mount point.
#[derive(Debug, Clone)]
pub struct SysFs {
    root: PathBuf,
}

impl SysFs {
    /// Create a reader for the sysfs tree mounted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The sysfs mount point this reader uses.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn class_path(&self) -> PathBuf {
        self.root.join(INFINIBAND_CLASS_PATH)
    }

    /// Read every device under `class/infiniband`.
    ///
    /// Fails when the class directory, or a device's `ports` directory,
    /// cannot be enumerated. Missing individual counters are not errors.
    pub fn infiniband_class(&self) -> Result<InfiniBandClass> {
        let class_path = self.class_path();
        let entries = std::fs::read_dir(&class_path).map_err(|e| Error::io(&class_path, e))?;

        let mut class = InfiniBandClass::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&class_path, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let device = self.parse_device(&name)?;
            class.insert(name, device);
        }

        trace!(devices = class.len(), "Read InfiniBand class");
        Ok(class)
    }

    fn parse_device(&self, name: &str) -> Result<InfiniBandDevice> {
        let path = self.class_path().join(name);

        let mut device = InfiniBandDevice {
            name: name.to_string(),
            firmware_version: read_attribute(&path.join("fw_ver")),
            board_id: read_attribute(&path.join("board_id")),
            hca_type: read_attribute(&path.join("hca_type")),
            ports: BTreeMap::new(),
        };

        let ports_path = path.join("ports");
        let ports = std::fs::read_dir(&ports_path).map_err(|e| Error::io(&ports_path, e))?;

        for entry in ports {
            let entry = entry.map_err(|e| Error::io(&ports_path, e))?;
            let dir_name = entry.file_name().to_string_lossy().to_string();
            let port_number: u32 = dir_name.parse().map_err(|_| {
                Error::InvalidData(format!(
                    "port directory '{}' of device '{}' is not a port number",
                    dir_name, name
                ))
            })?;

            let port = parse_port(name, port_number, &entry.path());
            device.ports.insert(port_number, port);
        }

        Ok(device)
    }
}

impl CounterSource for SysFs {
    fn read_class(&self) -> Result<InfiniBandClass> {
        self.infiniband_class()
    }
}

fn parse_port(device: &str, port: u32, path: &Path) -> InfiniBandPort {
    let state = read_attribute(&path.join("state")).and_then(|s| parse_state(&s));
    let phys_state = read_attribute(&path.join("phys_state")).and_then(|s| parse_state(&s));
    let rate = read_attribute(&path.join("rate")).and_then(|s| parse_rate(&s));

    // irdma devices only publish hw_counters, not the standard PMA counters.
    let counters = if device.starts_with("irdma") {
        PortCounters::default()
    } else {
        parse_counters(&path.join("counters"))
    };

    InfiniBandPort {
        name: device.to_string(),
        port,
        state,
        phys_state,
        rate,
        counters,
    }
}

/// Read every known counter from a port's `counters` directory.
fn parse_counters(dir: &Path) -> PortCounters {
    let mut counters = PortCounters::default();

    for kind in CounterKind::ALL {
        let value = read_counter(&dir.join(kind.file_name()))
            .map(|raw| raw.saturating_mul(kind.scale()));
        counters.set(kind, value);
    }

    counters
}

/// Read a single counter file. Absent or unsupported counters yield `None`.
fn read_counter(path: &Path) -> Option<u64> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if is_absent(&e) => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read counter");
            return None;
        }
    };

    let value = content.trim();
    if value == NO_PMA {
        return None;
    }

    match value.parse::<u64>() {
        Ok(v) => Some(v),
        Err(_) => {
            debug!(path = %path.display(), value, "Ignoring non-numeric counter value");
            None
        }
    }
}

/// Errors that mean "this counter is not exposed here".
fn is_absent(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::NotFound
            | ErrorKind::PermissionDenied
            | ErrorKind::InvalidInput
            | ErrorKind::Unsupported
    )
}

/// Read a trimmed text attribute, `None` if missing or empty.
fn read_attribute(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse an `ID: NAME` state line such as `4: ACTIVE` or `5: LinkUp`.
pub fn parse_state(s: &str) -> Option<PortState> {
    let Some((id, name)) = s.split_once(':') else {
        debug!(value = s, "Malformed port state");
        return None;
    };
    let id = id.trim().parse().ok()?;
    Some(PortState {
        id,
        name: name.trim().to_string(),
    })
}

/// Parse a rate line such as `100 Gb/sec (4X EDR)` into bytes per second.
pub fn parse_rate(s: &str) -> Option<u64> {
    let mut parts = s.split_whitespace();
    let value: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_none() {
        debug!(value = s, "Malformed port rate");
        return None;
    }
    Some((value * BYTES_PER_GBIT) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn port_dir(root: &Path, device: &str, port: u32) -> PathBuf {
        let dir = root
            .join(INFINIBAND_CLASS_PATH)
            .join(device)
            .join("ports")
            .join(port.to_string());
        fs::create_dir_all(dir.join("counters")).unwrap();
        dir
    }

    fn write_counter(port: &Path, name: &str, value: &str) {
        fs::write(port.join("counters").join(name), format!("{}\n", value)).unwrap();
    }

    #[test]
    fn test_parse_state() {
        assert_eq!(
            parse_state("4: ACTIVE"),
            Some(PortState {
                id: 4,
                name: "ACTIVE".to_string()
            })
        );
        assert_eq!(parse_state("5: LinkUp").map(|s| s.id), Some(5));
        assert_eq!(parse_state("ACTIVE"), None);
        assert_eq!(parse_state("x: ACTIVE"), None);
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("100 Gb/sec (4X EDR)"), Some(12_500_000_000));
        assert_eq!(parse_rate("2.5 Gb/sec (1X SDR)"), Some(312_500_000));
        assert_eq!(parse_rate("100"), None);
        assert_eq!(parse_rate("fast Gb/sec"), None);
    }

    #[test]
    fn test_missing_class_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = SysFs::new(tmp.path()).infiniband_class();
        assert!(matches!(result, Err(Error::Io { .. })));
    }

    #[test]
    fn test_empty_class() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(INFINIBAND_CLASS_PATH)).unwrap();

        let class = SysFs::new(tmp.path()).infiniband_class().unwrap();
        assert!(class.is_empty());
    }

    #[test]
    fn test_read_counters_and_attributes() {
        let tmp = TempDir::new().unwrap();
        let port = port_dir(tmp.path(), "mlx5_0", 1);
        let device = tmp.path().join(INFINIBAND_CLASS_PATH).join("mlx5_0");
        fs::write(device.join("fw_ver"), "16.35.1012\n").unwrap();
        fs::write(device.join("board_id"), "MT_0000000010\n").unwrap();
        fs::write(port.join("state"), "4: ACTIVE\n").unwrap();
        fs::write(port.join("phys_state"), "5: LinkUp\n").unwrap();
        fs::write(port.join("rate"), "100 Gb/sec (4X EDR)\n").unwrap();
        write_counter(&port, "port_rcv_data", "1000");
        write_counter(&port, "port_rcv_packets", "42");

        let class = SysFs::new(tmp.path()).infiniband_class().unwrap();
        let device = &class["mlx5_0"];
        assert_eq!(device.firmware_version.as_deref(), Some("16.35.1012"));
        assert_eq!(device.board_id.as_deref(), Some("MT_0000000010"));
        assert_eq!(device.hca_type, None);

        let port = &device.ports[&1];
        assert_eq!(port.name, "mlx5_0");
        assert_eq!(port.state.as_ref().map(|s| s.id), Some(4));
        assert_eq!(port.phys_state.as_ref().map(|s| s.name.as_str()), Some("LinkUp"));
        assert_eq!(port.rate, Some(12_500_000_000));

        // Data counters are in 4-octet words.
        assert_eq!(port.counters.receive_data, Some(4000));
        assert_eq!(port.counters.receive_packets, Some(42));
        assert_eq!(port.counters.transmit_data, None);
        assert_eq!(port.counters.transmit_packets, None);
    }

    #[test]
    fn test_unavailable_counters_are_absent() {
        let tmp = TempDir::new().unwrap();
        let port = port_dir(tmp.path(), "mlx4_0", 2);
        write_counter(&port, "port_xmit_data", "N/A (no PMA)");
        write_counter(&port, "port_xmit_packets", "garbage");
        write_counter(&port, "port_rcv_errors", "0");

        let class = SysFs::new(tmp.path()).infiniband_class().unwrap();
        let counters = &class["mlx4_0"].ports[&2].counters;
        assert_eq!(counters.transmit_data, None);
        assert_eq!(counters.transmit_packets, None);
        // Zero is a real observation, not absence.
        assert_eq!(counters.receive_errors, Some(0));
    }

    #[test]
    fn test_missing_counters_dir() {
        let tmp = TempDir::new().unwrap();
        let port = port_dir(tmp.path(), "mlx5_1", 1);
        fs::remove_dir(port.join("counters")).unwrap();

        let class = SysFs::new(tmp.path()).infiniband_class().unwrap();
        assert!(class["mlx5_1"].ports[&1].counters.is_empty());
    }

    #[test]
    fn test_irdma_skips_standard_counters() {
        let tmp = TempDir::new().unwrap();
        let port = port_dir(tmp.path(), "irdma0", 1);
        write_counter(&port, "port_rcv_data", "10");

        let class = SysFs::new(tmp.path()).infiniband_class().unwrap();
        assert!(class["irdma0"].ports[&1].counters.is_empty());
    }

    #[test]
    fn test_device_without_ports() {
        let tmp = TempDir::new().unwrap();
        let device = tmp.path().join(INFINIBAND_CLASS_PATH).join("mlx5_2");
        fs::create_dir_all(device.join("ports")).unwrap();

        let class = SysFs::new(tmp.path()).infiniband_class().unwrap();
        assert!(class["mlx5_2"].ports.is_empty());
    }

    #[test]
    fn test_device_missing_ports_dir_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(INFINIBAND_CLASS_PATH).join("mlx5_3")).unwrap();

        let result = SysFs::new(tmp.path()).infiniband_class();
        assert!(matches!(result, Err(Error::Io { .. })));
    }

    #[test]
    fn test_non_numeric_port_is_error() {
        let tmp = TempDir::new().unwrap();
        let ports = tmp
            .path()
            .join(INFINIBAND_CLASS_PATH)
            .join("mlx5_0")
            .join("ports");
        fs::create_dir_all(ports.join("uplink")).unwrap();

        let result = SysFs::new(tmp.path()).infiniband_class();
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_ports_are_ordered() {
        let tmp = TempDir::new().unwrap();
        for port in [2, 10, 1] {
            port_dir(tmp.path(), "mlx5_0", port);
        }

        let class = SysFs::new(tmp.path()).read_class().unwrap();
        let ports: Vec<u32> = class["mlx5_0"].ports.keys().copied().collect();
        assert_eq!(ports, vec![1, 2, 10]);
    }
}
