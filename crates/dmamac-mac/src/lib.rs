//! # dmamac-mac
//!
//! The DMAMAC slot/superframe scheduling engine.
//!
//! DMAMAC is a dual-mode TDMA/hybrid medium-access protocol for wireless
//! sensor/actuator networks. Time is divided into repeating superframes of
//! fixed-duration slots; each node owns one transmit slot and one or more
//! receive slots, a designated sink can switch the whole network between a
//! steady and a transient superframe layout, and urgent alerts travel hop by
//! hop up a static forwarding tree toward the sink.
//!
//! This crate is the protocol core: the per-slot state machine
//! ([`DmaMac`]), the bounded outgoing queue with schedule-bounded
//! retransmission, the deferred mode switch, the alert forwarding decision
//! logic, and the embedded deterministic generator used for channel hopping
//! and alert timing. The physical radio, the frame wire format and the event
//! loop are external collaborators reached through the [`MacContext`]
//! capability; `dmamac-runner` provides the simulated versions.

pub mod channel;
pub mod mac;
pub mod mode_switch;
pub mod queue;
pub mod rng;
pub mod schedule;
pub mod stats;
pub mod topology;

pub use mac::{DmaMac, MacConfig, MacContext, MacError, MacState, MacType, TimerKind};
pub use mode_switch::{ModeSwitch, SwitchOutcome};
pub use queue::{EnqueueResult, OutgoingQueue};
pub use rng::MotherRng;
pub use schedule::{
    NodeIdentity, Schedule, ScheduleError, SlotAssignment, SlotEvent, SlotPhase, SlotRole,
    SlotTable, Superframe, SuperframeMode,
};
pub use stats::MacStats;
pub use topology::{DownstreamBranch, ForwardingTree};
