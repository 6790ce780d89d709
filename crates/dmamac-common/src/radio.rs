//! The radio capability the MAC drives.
//!
//! The physical radio is an external collaborator. The MAC only needs mode
//! control, busy/idle visibility, and three asynchronous notifications:
//! mode changed, transmission state changed, reception state changed. The
//! simulated radio in `dmamac-runner` implements this surface; tests drive
//! the MAC with hand-built [`RadioEvent`]s.

use serde::{Deserialize, Serialize};

/// Operating mode of the radio front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioMode {
    /// Powered but neither receiving nor transmitting.
    Off,
    /// Low-power state, cannot receive.
    Sleep,
    /// Listening; inbound frames will be delivered.
    Receiver,
    /// Ready to transmit.
    Transmitter,
}

/// Whether the receiver currently observes energy on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceptionState {
    Idle,
    Receiving,
}

/// Whether the transmitter is currently on air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransmissionState {
    Idle,
    Transmitting,
}

/// Asynchronous notifications from the radio to the MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEvent {
    /// The mode change requested earlier has completed.
    ModeChanged(RadioMode),
    /// The transmitter went on air or finished a transmission.
    TransmissionStateChanged(TransmissionState),
    /// The receiver started or stopped observing a signal.
    ReceptionStateChanged(ReceptionState),
}
