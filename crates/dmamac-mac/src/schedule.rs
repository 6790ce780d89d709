//! Slot schedule tables and lookahead.
//!
//! A superframe is a repeating cycle of fixed-duration slots. For each mode
//! (transient/steady) the model provides two parallel tables: one naming the
//! transmitting party per slot and one naming the receiving party. A slot can
//! carry both a transmit and a receive assignment for different nodes, which
//! is how the schedule multiplexes a sender and its parent into one slot.
//!
//! A node resolves the raw assignment pair against its own identity (slot
//! number, alert level, actuator flag) into a [`SlotRole`]. Transmit roles
//! win over receive roles; alert transmit slots are only eligible for
//! non-actuator nodes, since actuators never originate alerts.
//!
//! Two lookahead algorithms drive the state machine:
//!
//! - [`Schedule::immediate_next`] inspects exactly the following slot and
//!   yields the single event to arm there.
//! - [`Schedule::distant_next`] is used when entering sleep: it scans forward
//!   for the first slot relevant to this node and yields the distance plus
//!   the event to arm on wake. Actuators additionally wake for every
//!   receive-class slot so they can relay traffic for their descendants.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors in schedule construction or lookup.
///
/// These indicate a malformed static schedule and are the one fatal error
/// class of the protocol: a node cannot operate on tables it cannot trust.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("slot {slot} out of range (superframe has {num_slots} slots)")]
    SlotOutOfRange { slot: u16, num_slots: u16 },

    #[error("transmit table has {transmit} slots but receive table has {receive}")]
    TableLengthMismatch { transmit: usize, receive: usize },

    #[error("superframe has no slot relevant to this node")]
    NoRelevantSlot,

    #[error("slot table is empty")]
    EmptyTable,
}

/// Raw per-slot assignment as loaded from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotAssignment {
    /// Nobody is scheduled.
    Idle,
    /// The node owning this slot number.
    Node(u16),
    /// Every node at the given tree level, for alert traffic.
    AlertLevel(u8),
    /// All nodes, for the sink's notification broadcast.
    Broadcast,
}

/// The two superframe layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuperframeMode {
    /// Short superframe used while the network state is changing.
    Transient,
    /// Long superframe with an alert phase, used in quiescence.
    Steady,
}

impl SuperframeMode {
    /// The layout the network moves to on a switch.
    pub fn other(self) -> SuperframeMode {
        match self {
            SuperframeMode::Transient => SuperframeMode::Steady,
            SuperframeMode::Steady => SuperframeMode::Transient,
        }
    }
}

/// Whether a slot sits in the data part or the alert part of the superframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPhase {
    Data,
    Alert,
}

/// What this node does in a given slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRole {
    Idle,
    MyTransmit,
    MyReceive,
    AlertTransmit,
    AlertReceive,
    BroadcastReceive,
}

/// The single event the lookahead arms for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotEvent {
    SendData,
    ScheduleAlert,
    WaitData,
    WaitAlert,
    WaitNotification,
    Sleep,
}

/// The identity a node resolves schedule assignments against.
#[derive(Debug, Clone, Copy)]
pub struct NodeIdentity {
    /// Transmit slot owned by this node (equals its short address).
    pub slot: u16,
    /// Depth level in the forwarding tree, for alert slots.
    pub alert_level: u8,
    /// Actuators relay downward traffic and never originate alerts.
    pub is_actuator: bool,
}

/// Parallel transmit/receive assignment tables for one superframe mode.
#[derive(Debug, Clone)]
pub struct SlotTable {
    transmit: Vec<SlotAssignment>,
    receive: Vec<SlotAssignment>,
}

impl SlotTable {
    /// Build a table from parallel assignment vectors.
    pub fn new(
        transmit: Vec<SlotAssignment>,
        receive: Vec<SlotAssignment>,
    ) -> Result<Self, ScheduleError> {
        if transmit.is_empty() {
            return Err(ScheduleError::EmptyTable);
        }
        if transmit.len() != receive.len() {
            return Err(ScheduleError::TableLengthMismatch {
                transmit: transmit.len(),
                receive: receive.len(),
            });
        }
        Ok(SlotTable { transmit, receive })
    }

    /// Number of slots in this superframe layout.
    pub fn num_slots(&self) -> u16 {
        self.transmit.len() as u16
    }

    fn check(&self, slot: u16) -> Result<usize, ScheduleError> {
        if slot >= self.num_slots() {
            return Err(ScheduleError::SlotOutOfRange {
                slot,
                num_slots: self.num_slots(),
            });
        }
        Ok(usize::from(slot))
    }

    /// Transmit assignment for a slot, bounds-checked.
    pub fn transmit_at(&self, slot: u16) -> Result<SlotAssignment, ScheduleError> {
        Ok(self.transmit[self.check(slot)?])
    }

    /// Receive assignment for a slot, bounds-checked.
    pub fn receive_at(&self, slot: u16) -> Result<SlotAssignment, ScheduleError> {
        Ok(self.receive[self.check(slot)?])
    }
}

/// Both superframe layouts plus the data/alert phase boundary.
///
/// The active layout is always selected by [`SuperframeMode`] tag; the
/// tables themselves are never copied or swapped.
#[derive(Debug, Clone)]
pub struct Schedule {
    transient: SlotTable,
    steady: SlotTable,
    /// Slots at or past this index are the alert phase.
    num_slots_transient: u16,
}

impl Schedule {
    pub fn new(transient: SlotTable, steady: SlotTable) -> Self {
        let num_slots_transient = transient.num_slots();
        Schedule {
            transient,
            steady,
            num_slots_transient,
        }
    }

    /// Table for a mode.
    pub fn table(&self, mode: SuperframeMode) -> &SlotTable {
        match mode {
            SuperframeMode::Transient => &self.transient,
            SuperframeMode::Steady => &self.steady,
        }
    }

    /// Slot count of a mode's superframe.
    pub fn num_slots(&self, mode: SuperframeMode) -> u16 {
        self.table(mode).num_slots()
    }

    /// Index of the first alert-phase slot.
    pub fn alert_phase_start(&self) -> u16 {
        self.num_slots_transient
    }

    /// Data or alert phase of a slot index.
    pub fn phase_of(&self, slot: u16) -> SlotPhase {
        if slot >= self.num_slots_transient {
            SlotPhase::Alert
        } else {
            SlotPhase::Data
        }
    }

    /// Resolve the assignment pair at `slot` against `id`.
    ///
    /// Transmit roles take priority over receive roles when a slot is
    /// eligible under both.
    pub fn role_at(
        &self,
        mode: SuperframeMode,
        slot: u16,
        id: &NodeIdentity,
    ) -> Result<SlotRole, ScheduleError> {
        let table = self.table(mode);
        let tx = table.transmit_at(slot)?;
        let rx = table.receive_at(slot)?;

        match tx {
            SlotAssignment::Node(owner) if owner == id.slot => return Ok(SlotRole::MyTransmit),
            SlotAssignment::AlertLevel(level)
                if level == id.alert_level && !id.is_actuator =>
            {
                return Ok(SlotRole::AlertTransmit)
            }
            _ => {}
        }
        match rx {
            SlotAssignment::Node(owner) if owner == id.slot => Ok(SlotRole::MyReceive),
            SlotAssignment::AlertLevel(level) if level == id.alert_level => {
                Ok(SlotRole::AlertReceive)
            }
            SlotAssignment::Broadcast => Ok(SlotRole::BroadcastReceive),
            _ => Ok(SlotRole::Idle),
        }
    }

    /// Map a resolved role to the single event armed for that slot.
    fn event_for(&self, role: SlotRole, slot: u16) -> SlotEvent {
        match (role, self.phase_of(slot)) {
            (SlotRole::MyTransmit, SlotPhase::Data) => SlotEvent::SendData,
            (SlotRole::MyTransmit, SlotPhase::Alert) => SlotEvent::ScheduleAlert,
            (SlotRole::AlertTransmit, _) => SlotEvent::ScheduleAlert,
            (SlotRole::MyReceive, SlotPhase::Data) => SlotEvent::WaitData,
            (SlotRole::MyReceive, SlotPhase::Alert) => SlotEvent::WaitAlert,
            (SlotRole::AlertReceive, _) => SlotEvent::WaitAlert,
            (SlotRole::BroadcastReceive, _) => SlotEvent::WaitNotification,
            (SlotRole::Idle, _) => SlotEvent::Sleep,
        }
    }

    /// Inspect the slot following `slot` and return the one event to arm
    /// there, one slot duration ahead.
    pub fn immediate_next(
        &self,
        mode: SuperframeMode,
        slot: u16,
        id: &NodeIdentity,
    ) -> Result<SlotEvent, ScheduleError> {
        let next = (slot + 1) % self.num_slots(mode);
        let role = self.role_at(mode, next, id)?;
        Ok(self.event_for(role, next))
    }

    /// Scan forward from `slot` for the first slot relevant to this node.
    ///
    /// Returns the distance in slots (>= 1) and the event to arm on wake.
    /// Relevance: own transmit/receive slots, broadcast slots, alert receive
    /// slots; non-actuators also wake for their alert transmit slots.
    pub fn distant_next(
        &self,
        mode: SuperframeMode,
        slot: u16,
        id: &NodeIdentity,
    ) -> Result<(u16, SlotEvent), ScheduleError> {
        let num_slots = self.num_slots(mode);
        for distance in 1..=num_slots {
            let probe = (slot + distance) % num_slots;
            let role = self.role_at(mode, probe, id)?;
            if role == SlotRole::Idle {
                continue;
            }
            return Ok((distance, self.event_for(role, probe)));
        }
        Err(ScheduleError::NoRelevantSlot)
    }
}

/// The node's position within the repeating superframe cycle.
#[derive(Debug, Clone, Copy)]
pub struct Superframe {
    mode: SuperframeMode,
    current_slot: u16,
}

impl Superframe {
    /// Nodes start in transient mode at slot 0.
    pub fn new() -> Self {
        Superframe {
            mode: SuperframeMode::Transient,
            current_slot: 0,
        }
    }

    pub fn mode(&self) -> SuperframeMode {
        self.mode
    }

    pub fn current_slot(&self) -> u16 {
        self.current_slot
    }

    pub fn is_slot_zero(&self) -> bool {
        self.current_slot == 0
    }

    /// Advance by `slots` within a superframe of `num_slots` slots.
    pub fn advance(&mut self, slots: u16, num_slots: u16) {
        self.current_slot = (self.current_slot + slots) % num_slots;
    }

    /// Swap the layout and restart the cycle at slot 0.
    pub fn switch_mode(&mut self) {
        self.mode = self.mode.other();
        self.current_slot = 0;
    }

    /// Adopt slot position advertised by a sync frame.
    pub fn resync(&mut self, slot: u16, num_slots: u16) {
        self.current_slot = slot % num_slots.max(1);
    }
}

impl Default for Superframe {
    fn default() -> Self {
        Superframe::new()
    }
}
