//! Prometheus registry holding the InfiniBand gauge families.
//!
//! Families are declared once in [`InfiniBandMetrics::new`]. Each scrape calls
//! [`InfiniBandMetrics::update`] with a fresh snapshot and then
//! [`InfiniBandMetrics::render`]. Every series value is an atomic inside its
//! family, so concurrent scrapes never tear a single value, but one rendered
//! response may mix values from different reads.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use ibsight_common::{CounterKind, InfiniBandClass};
use parking_lot::Mutex;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use tracing::{debug, warn};

use crate::config::AbsentSeriesPolicy;
use crate::mapping::{DeviceInfoLabels, PortLabels, gauge_value, help, metric_name};

/// A per-port family, used to track which series the last update published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PortFamily {
    Counter(CounterKind),
    State,
    PhysicalState,
    Rate,
}

/// Series written by one update.
#[derive(Debug, Default)]
struct Published {
    ports: HashMap<PortFamily, HashSet<PortLabels>>,
    devices: HashSet<DeviceInfoLabels>,
}

/// Summary of one registry update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Devices in the snapshot.
    pub devices: usize,
    /// Ports in the snapshot.
    pub ports: usize,
    /// Counter series set by this update.
    pub counter_series: usize,
    /// Series removed because their value vanished.
    pub removed_series: usize,
}

/// Registry of InfiniBand metric families.
pub struct InfiniBandMetrics {
    registry: Registry,
    counters: BTreeMap<CounterKind, Family<PortLabels, Gauge>>,
    port_state: Family<PortLabels, Gauge>,
    port_physical_state: Family<PortLabels, Gauge>,
    port_rate: Family<PortLabels, Gauge>,
    device_info: Family<DeviceInfoLabels, Gauge>,
    collector_success: Gauge,
    collector_duration: Gauge<f64, AtomicU64>,
    read_errors: Counter,
    published: Mutex<Published>,
}

impl InfiniBandMetrics {
    /// Declare every family in a fresh registry.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let mut counters = BTreeMap::new();
        for kind in CounterKind::ALL {
            let family = Family::<PortLabels, Gauge>::default();
            registry.register(metric_name(kind), help(kind), family.clone());
            counters.insert(kind, family);
        }

        macro_rules! port_family {
            ($name:literal, $help:literal) => {{
                let f = Family::<PortLabels, Gauge>::default();
                registry.register($name, $help, f.clone());
                f
            }};
        }

        let port_state = port_family!(
            "infiniband_port_state_id",
            "State of the InfiniBand port (0: no change, 1: down, 2: init, 3: armed, 4: active, 5: act defer)"
        );
        let port_physical_state = port_family!(
            "infiniband_port_physical_state_id",
            "Physical state of the InfiniBand port (1: sleep, 2: polling, 3: disabled, 4: port configuration training, 5: link up, 6: link error recovery, 7: phy test)"
        );
        let port_rate = port_family!(
            "infiniband_port_rate_bytes_per_second",
            "Maximum signal transfer rate of the InfiniBand port"
        );

        let device_info = Family::<DeviceInfoLabels, Gauge>::default();
        registry.register(
            "infiniband_device_info",
            "Non-numeric data from /sys/class/infiniband/<device>, value is always 1",
            device_info.clone(),
        );

        let collector_success: Gauge = Gauge::default();
        registry.register(
            "infiniband_exporter_collector_success",
            "Whether the latest read of the InfiniBand counter filesystem succeeded",
            collector_success.clone(),
        );

        let collector_duration = Gauge::<f64, AtomicU64>::default();
        registry.register(
            "infiniband_exporter_collector_duration_seconds",
            "Duration of the latest read of the InfiniBand counter filesystem",
            collector_duration.clone(),
        );

        let read_errors: Counter = Counter::default();
        registry.register(
            "infiniband_exporter_read_errors",
            "Reads of the InfiniBand counter filesystem that failed or timed out",
            read_errors.clone(),
        );

        Self {
            registry,
            counters,
            port_state,
            port_physical_state,
            port_rate,
            device_info,
            collector_success,
            collector_duration,
            read_errors,
            published: Mutex::new(Published::default()),
        }
    }

    fn port_family(&self, family: PortFamily) -> &Family<PortLabels, Gauge> {
        match family {
            PortFamily::Counter(kind) => &self.counters[&kind],
            PortFamily::State => &self.port_state,
            PortFamily::PhysicalState => &self.port_physical_state,
            PortFamily::Rate => &self.port_rate,
        }
    }

    fn set_port(
        &self,
        published: &mut Published,
        family: PortFamily,
        labels: &PortLabels,
        value: u64,
    ) {
        self.port_family(family)
            .get_or_create(labels)
            .set(gauge_value(value));
        published
            .ports
            .entry(family)
            .or_default()
            .insert(labels.clone());
    }

    /// Write every present value of `class` into the registry.
    ///
    /// Values absent from `class` are left untouched under
    /// [`AbsentSeriesPolicy::Retain`]. Under [`AbsentSeriesPolicy::Remove`]
    /// series published by the previous update but absent now are dropped.
    pub fn update(&self, class: &InfiniBandClass, policy: AbsentSeriesPolicy) -> UpdateSummary {
        let mut current = Published::default();
        let mut summary = UpdateSummary {
            devices: class.len(),
            ..Default::default()
        };

        for device in class.values() {
            let info = DeviceInfoLabels::from(device);
            self.device_info.get_or_create(&info).set(1);
            current.devices.insert(info);

            for port in device.ports.values() {
                summary.ports += 1;
                let labels = PortLabels::new(&device.name, port.port);

                for (kind, value) in port.counters.present() {
                    self.set_port(&mut current, PortFamily::Counter(kind), &labels, value);
                    summary.counter_series += 1;
                }

                if let Some(state) = &port.state {
                    self.set_port(&mut current, PortFamily::State, &labels, state.id.into());
                }
                if let Some(state) = &port.phys_state {
                    self.set_port(
                        &mut current,
                        PortFamily::PhysicalState,
                        &labels,
                        state.id.into(),
                    );
                }
                if let Some(rate) = port.rate {
                    self.set_port(&mut current, PortFamily::Rate, &labels, rate);
                }
            }
        }

        let mut published = self.published.lock();
        let previous = std::mem::replace(&mut *published, current);

        if policy == AbsentSeriesPolicy::Remove {
            summary.removed_series = self.remove_absent(&previous, &published);
        }

        summary
    }

    fn remove_absent(&self, previous: &Published, current: &Published) -> usize {
        let mut removed = 0;

        for (family, labels) in &previous.ports {
            let still_present = current.ports.get(family);
            for label in labels {
                if still_present.is_some_and(|set| set.contains(label)) {
                    continue;
                }
                if self.port_family(*family).remove(label) {
                    debug!(
                        device = %label.device,
                        port = %label.port,
                        family = ?family,
                        "Removed series for vanished value"
                    );
                    removed += 1;
                }
            }
        }

        for info in previous.devices.difference(&current.devices) {
            if self.device_info.remove(info) {
                removed += 1;
            }
        }

        removed
    }

    /// Record the outcome of a counter read.
    pub fn record_read(&self, success: bool, duration: Duration) {
        self.collector_success.set(i64::from(success));
        self.collector_duration.set(duration.as_secs_f64());
        if !success {
            self.read_errors.inc();
        }
    }

    /// Encode the full registry in the Prometheus text format.
    pub fn render(&self) -> String {
        let mut buf = String::new();
        if let Err(e) = encode(&mut buf, &self.registry) {
            warn!(error = %e, "Failed to encode metrics");
        }
        buf
    }
}

impl Default for InfiniBandMetrics {
    fn default() -> Self {
        Self::new()
    }
}
