//! Metric definitions and label helpers for the DMAMAC engine.
//!
//! Re-exports the `metrics` crate and declares every protocol metric as a
//! structured [`Metric`] constant, so call sites never spell metric names by
//! hand and exporters get descriptions and units for free.
//!
//! # Example
//!
//! ```rust,ignore
//! use dmamac_metrics::{NodeLabels, metric_defs, describe_metrics};
//!
//! describe_metrics();
//!
//! let labels = NodeLabels::new("node:3", "sensor");
//! metrics::counter!(metric_defs::TX_DATA.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use dmamac_mac::MacStats;
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// Declares a metric's name, description, unit and expected labels at compile
/// time, via the const constructors.
///
/// # Example
///
/// ```rust
/// use dmamac_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const TX_DATA: Metric = Metric::counter("dmamac.mac.tx_data")
///     .with_description("Data frames put on air")
///     .with_unit(Unit::Count)
///     .with_labels(&["node", "node_type"]);
///
/// assert_eq!(TX_DATA.name, "dmamac.mac.tx_data");
/// assert_eq!(TX_DATA.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "dmamac.mac.tx_data").
    pub name: &'static str,
    /// The kind of metric (counter, gauge, histogram).
    pub kind: MetricKind,
    /// Human-readable description of the metric.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
    /// Expected label keys for this metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Histogram,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys for the metric.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the metrics recorder.
    ///
    /// Call once at startup for each metric.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for the protocol engine.
///
/// Each metric is a const [`Metric`] with its name, kind, description, unit
/// and expected labels. Counter metrics mirror the fields of
/// [`MacStats`](dmamac_mac::MacStats) one-to-one; [`emit_stats`](crate::emit_stats)
/// publishes them in bulk at the end of a run.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Standard labels present on all node-scoped metrics.
    pub const STANDARD_LABELS: &[&str] = &["node", "node_type"];

    // ========================================================================
    // Transmit path
    // ========================================================================

    pub const TX_DATA: Metric = Metric::counter("dmamac.mac.tx_data")
        .with_description("Data frames put on air")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const TX_DATA_FAILURES: Metric = Metric::counter("dmamac.mac.tx_data_failures")
        .with_description("Data transmissions that saw no acknowledgement")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const TX_ACKS: Metric = Metric::counter("dmamac.mac.tx_acks")
        .with_description("Acknowledgements put on air")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const TX_ALERTS: Metric = Metric::counter("dmamac.mac.tx_alerts")
        .with_description("Alerts originated by this node")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const TX_SLOTS: Metric = Metric::counter("dmamac.mac.tx_slots")
        .with_description("Transmit slots entered")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const DROPPED_DATA_FRAMES: Metric = Metric::counter("dmamac.mac.dropped_data_frames")
        .with_description("Data frames dropped (queue overflow or exhausted retransmission)")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    // ========================================================================
    // Receive path
    // ========================================================================

    pub const RX_DATA: Metric = Metric::counter("dmamac.mac.rx_data")
        .with_description("Data frames accepted")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const RX_ACTUATOR_DATA: Metric = Metric::counter("dmamac.mac.rx_actuator_data")
        .with_description("Actuator commands relayed down the tree")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const RX_ACKS: Metric = Metric::counter("dmamac.mac.rx_acks")
        .with_description("Acknowledgements received")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const RX_ALERTS: Metric = Metric::counter("dmamac.mac.rx_alerts")
        .with_description("Child alerts accepted for forwarding")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const RX_NOTIFICATIONS: Metric = Metric::counter("dmamac.mac.rx_notifications")
        .with_description("Sink notifications received")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const COLLISIONS: Metric = Metric::counter("dmamac.mac.collisions")
        .with_description("Receptions corrupted by collision or bit errors")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const TIMEOUTS: Metric = Metric::counter("dmamac.mac.timeouts")
        .with_description("Receive slots that expired without a frame")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    // ========================================================================
    // Alert propagation
    // ========================================================================

    pub const ALERT_RX_SLOTS: Metric = Metric::counter("dmamac.alert.rx_slots")
        .with_description("Alert receive slots listened in")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const FORWARDED_ALERTS: Metric = Metric::counter("dmamac.alert.forwarded")
        .with_description("Child alerts forwarded toward the sink")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const SKIPPED_ALERTS: Metric = Metric::counter("dmamac.alert.skipped")
        .with_description("Alert transmissions skipped on a busy channel")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const DISCARDED_ALERTS: Metric = Metric::counter("dmamac.alert.discarded")
        .with_description("Alerts heard but not addressed to this node")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    // ========================================================================
    // Superframe and mode switching
    // ========================================================================

    pub const TRANSIENT_SUPERFRAMES: Metric = Metric::counter("dmamac.superframe.transient")
        .with_description("Transient superframes started")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const STEADY_SUPERFRAMES: Metric = Metric::counter("dmamac.superframe.steady")
        .with_description("Steady superframes started")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const SLEEP_SLOTS: Metric = Metric::counter("dmamac.superframe.sleep_slots")
        .with_description("Slots spent with the radio asleep")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const STEADY_TO_TRANSIENT: Metric = Metric::counter("dmamac.switch.steady_to_transient")
        .with_description("Steady-to-transient layout switches applied")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const TRANSIENT_TO_STEADY: Metric = Metric::counter("dmamac.switch.transient_to_steady")
        .with_description("Transient-to-steady layout switches applied")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const FAILED_SWITCHES: Metric = Metric::counter("dmamac.switch.failed")
        .with_description("Layout switches abandoned after a lost notification")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const MID_SUPERFRAME_SWITCHES: Metric = Metric::counter("dmamac.switch.mid_superframe")
        .with_description("Layout switches applied away from slot 0")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Returns a slice of all defined metrics.
    pub const ALL: &[&Metric] = &[
        // Transmit path
        &TX_DATA,
        &TX_DATA_FAILURES,
        &TX_ACKS,
        &TX_ALERTS,
        &TX_SLOTS,
        &DROPPED_DATA_FRAMES,
        // Receive path
        &RX_DATA,
        &RX_ACTUATOR_DATA,
        &RX_ACKS,
        &RX_ALERTS,
        &RX_NOTIFICATIONS,
        &COLLISIONS,
        &TIMEOUTS,
        // Alert propagation
        &ALERT_RX_SLOTS,
        &FORWARDED_ALERTS,
        &SKIPPED_ALERTS,
        &DISCARDED_ALERTS,
        // Superframe and mode switching
        &TRANSIENT_SUPERFRAMES,
        &STEADY_SUPERFRAMES,
        &SLEEP_SLOTS,
        &STEADY_TO_TRANSIENT,
        &TRANSIENT_TO_STEADY,
        &FAILED_SWITCHES,
        &MID_SUPERFRAME_SWITCHES,
    ];
}

/// Metric labels identifying a node.
///
/// # Example
///
/// ```rust
/// use dmamac_metrics::NodeLabels;
///
/// let labels = NodeLabels::new("node:3", "sensor");
/// assert_eq!(labels.to_labels().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct NodeLabels {
    /// Individual node identifier.
    pub node: String,
    /// Type of node (sensor, actuator, sink).
    pub node_type: String,
}

impl NodeLabels {
    pub fn new(node: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            node_type: node_type.into(),
        }
    }

    /// Converts the labels to the metrics crate label format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![
            ("node", self.node.clone()),
            ("node_type", self.node_type.clone()),
        ]
    }
}

/// Describes all metrics used by the engine.
///
/// Call once at startup, after installing a recorder, so exporters can
/// surface descriptions and units.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

/// Publishes a node's accumulated [`MacStats`] to the installed recorder.
pub fn emit_stats(labels: &NodeLabels, stats: &MacStats) {
    use metric_defs as m;
    let labels = labels.to_labels();
    let pairs: &[(&Metric, u64)] = &[
        (&m::TX_DATA, stats.tx_data),
        (&m::TX_DATA_FAILURES, stats.tx_data_failures),
        (&m::TX_ACKS, stats.tx_acks),
        (&m::TX_ALERTS, stats.tx_alerts),
        (&m::TX_SLOTS, stats.tx_slots),
        (&m::DROPPED_DATA_FRAMES, stats.dropped_data_frames),
        (&m::RX_DATA, stats.rx_data),
        (&m::RX_ACTUATOR_DATA, stats.rx_actuator_data),
        (&m::RX_ACKS, stats.rx_acks),
        (&m::RX_ALERTS, stats.rx_alerts),
        (&m::RX_NOTIFICATIONS, stats.rx_notifications),
        (&m::COLLISIONS, stats.collisions),
        (&m::TIMEOUTS, stats.timeouts),
        (&m::ALERT_RX_SLOTS, stats.alert_rx_slots),
        (&m::FORWARDED_ALERTS, stats.forwarded_alerts),
        (&m::SKIPPED_ALERTS, stats.skipped_alerts),
        (&m::DISCARDED_ALERTS, stats.discarded_alerts),
        (&m::TRANSIENT_SUPERFRAMES, stats.transient_superframes),
        (&m::STEADY_SUPERFRAMES, stats.steady_superframes),
        (&m::SLEEP_SLOTS, stats.sleep_slots),
        (&m::STEADY_TO_TRANSIENT, stats.steady_to_transient),
        (&m::TRANSIENT_TO_STEADY, stats.transient_to_steady),
        (&m::FAILED_SWITCHES, stats.failed_switches),
        (&m::MID_SUPERFRAME_SWITCHES, stats.mid_superframe_switches),
    ];
    for (metric, value) in pairs {
        metrics::counter!(metric.name, &labels).increment(*value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_labels_to_labels() {
        let labels = NodeLabels::new("node:3", "sensor");
        let label_vec = labels.to_labels();
        assert_eq!(label_vec.len(), 2);
        assert!(label_vec.contains(&("node", "node:3".to_string())));
        assert!(label_vec.contains(&("node_type", "sensor".to_string())));
    }

    #[test]
    fn metric_definitions() {
        assert_eq!(metric_defs::TX_DATA.name, "dmamac.mac.tx_data");
        assert_eq!(metric_defs::TX_DATA.kind, MetricKind::Counter);
        assert_eq!(metric_defs::TX_DATA.unit, Some(Unit::Count));
        assert_eq!(metric_defs::FAILED_SWITCHES.name, "dmamac.switch.failed");
        assert_eq!(metric_defs::SLEEP_SLOTS.labels, &["node", "node_type"]);
    }

    #[test]
    fn all_metrics_listed_once() {
        assert_eq!(metric_defs::ALL.len(), 24);
        let mut names: Vec<_> = metric_defs::ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), metric_defs::ALL.len());
    }

    #[test]
    fn metric_const_builders() {
        const TEST: Metric = Metric::counter("test.counter")
            .with_description("A test counter")
            .with_unit(Unit::Count)
            .with_labels(&["node"]);
        assert_eq!(TEST.name, "test.counter");
        assert_eq!(TEST.description, "A test counter");
        assert_eq!(TEST.labels, &["node"]);
    }

    #[test]
    fn emit_stats_accepts_defaults() {
        // No recorder installed: increments land in the no-op recorder.
        let stats = MacStats::default();
        emit_stats(&NodeLabels::new("node:1", "sensor"), &stats);
    }
}
