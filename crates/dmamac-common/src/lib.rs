//! # dmamac-common
//!
//! Common types and traits shared across the DMAMAC crates.
//!
//! This crate defines the vocabulary the rest of the workspace speaks:
//! simulation time, node addressing, the MAC frame set, and the radio
//! capability the MAC engine drives. It deliberately contains no protocol
//! logic; the scheduling engine lives in `dmamac-mac` and the simulated
//! harness in `dmamac-runner`.

pub mod address;
pub mod frame;
pub mod radio;
pub mod time;

pub use address::MacAddress;
pub use frame::{DataKind, Frame, FramePayload, ReceivedFrame};
pub use radio::{RadioEvent, RadioMode, ReceptionState, TransmissionState};
pub use time::SimTime;
