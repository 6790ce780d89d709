//! Per-run protocol counters.
//!
//! Every recoverable failure class of the protocol ends up here rather than
//! in an error path: timeouts, dropped frames, skipped alerts, failed
//! switches. The runner publishes these through `dmamac-metrics` at the end
//! of a run.

use serde::{Deserialize, Serialize};

/// Counters accumulated over one node's run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacStats {
    /// Data frames put on the air.
    pub tx_data: u64,
    /// Data transmissions abandoned after the retransmission window closed.
    pub tx_data_failures: u64,
    /// ACK frames sent.
    pub tx_acks: u64,
    /// Self-originated alert frames sent.
    pub tx_alerts: u64,
    /// Transmit slots entered.
    pub tx_slots: u64,
    /// Data frames received and accepted.
    pub rx_data: u64,
    /// Actuator data frames accepted for forwarding.
    pub rx_actuator_data: u64,
    /// ACK frames received.
    pub rx_acks: u64,
    /// Alert frames accepted from children.
    pub rx_alerts: u64,
    /// Notification frames received.
    pub rx_notifications: u64,
    /// Alert receive slots entered.
    pub alert_rx_slots: u64,
    /// Slots spent with the radio asleep.
    pub sleep_slots: u64,
    /// Frames dropped for bit errors / collisions.
    pub collisions: u64,
    /// Data frames dropped at a full queue.
    pub dropped_data_frames: u64,
    /// Transient superframes started.
    pub transient_superframes: u64,
    /// Steady superframes started.
    pub steady_superframes: u64,
    /// Completed steady-to-transient switches.
    pub steady_to_transient: u64,
    /// Completed transient-to-steady switches.
    pub transient_to_steady: u64,
    /// Switches suspected but never commanded (lost notification/alert).
    pub failed_switches: u64,
    /// Switches applied at a mid-superframe transient boundary.
    pub mid_superframe_switches: u64,
    /// Alerts skipped because the channel was busy (hybrid carrier sense).
    pub skipped_alerts: u64,
    /// Alerts relayed on behalf of children.
    pub forwarded_alerts: u64,
    /// Alerts heard but addressed to some other parent.
    pub discarded_alerts: u64,
    /// Expected receptions that timed out.
    pub timeouts: u64,
}
