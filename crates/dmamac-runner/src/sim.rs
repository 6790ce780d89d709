//! Discrete-event simulation harness.
//!
//! Drives one [`DmaMac`] engine per node over a shared broadcast channel. A
//! global min-heap of events ordered by `(time, insertion order)` carries
//! node timers, transmission completions and per-link frame deliveries, so a
//! run is fully deterministic for a given model and seed.
//!
//! The sink is not an engine instance: it is a small controller that
//! broadcasts notifications on the superframe boundary cadence,
//! acknowledges data, and decides mode switches from the alerts it hears.
//! It defers its own layout flip by one boundary, the same discipline the
//! engines apply to a received directive, so sink and network switch on the
//! same boundary. Like every other station it follows the slot schedule:
//! it only receives (and acknowledges) in slots where the receive table
//! names it.
//!
//! The channel applies an independent per-link loss draw and marks
//! overlapping receptions as corrupted, which is what the engines see as a
//! collision. A station whose radio is not in receiver mode registers no
//! reception at all: frames on air while it sleeps or transmits pass it by.

use crate::model::Model;
use dmamac_common::{
    Frame, FramePayload, MacAddress, RadioEvent, RadioMode, ReceivedFrame, ReceptionState,
    SimTime, TransmissionState,
};
use dmamac_mac::{
    DmaMac, MacContext, MacError, ModeSwitch, MotherRng, NodeIdentity, Schedule, SlotRole,
    SuperframeMode, SwitchOutcome, TimerKind,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Fatal simulation errors.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Mac(#[from] MacError),

    #[error(transparent)]
    Model(#[from] crate::model::ModelError),
}

// ============================================================================
// Event queue
// ============================================================================

#[derive(Debug)]
enum EventPayload {
    /// A node timer deadline. Stale entries (canceled or re-armed timers)
    /// are recognized by generation mismatch and skipped.
    Timer {
        node: usize,
        kind: TimerKind,
        generation: u64,
    },
    /// A node's transmitter leaves the air.
    TxEnd { node: usize },
    /// Reception energy appears at a destination.
    RxStart { dest: Dest, end: SimTime },
    /// A frame finishes arriving at a destination.
    Delivery {
        dest: Dest,
        frame: Frame,
        start: SimTime,
    },
    /// Superframe boundary at the sink.
    SinkBoundary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dest {
    Node(usize),
    Sink,
}

struct Event {
    time: SimTime,
    seq: u64,
    payload: EventPayload,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for a min-heap: earliest time first, insertion
        // order as the tie-break.
        (other.time, other.seq).cmp(&(self.time, self.seq))
    }
}

// ============================================================================
// Node harness
// ============================================================================

/// Per-node [`MacContext`] implementation.
///
/// Engine calls record their side effects here; the event loop drains them
/// into heap events and radio notifications after each engine call.
struct NodeCtx {
    now: SimTime,
    timers: HashMap<TimerKind, (SimTime, u64)>,
    next_generation: u64,
    /// Timers armed since the last drain.
    armed: Vec<(TimerKind, SimTime, u64)>,
    radio_mode: RadioMode,
    /// Mode changes to feed back as [`RadioEvent::ModeChanged`].
    pending_modes: Vec<RadioMode>,
    reception: ReceptionState,
    transmission: TransmissionState,
    /// Frames handed to the radio since the last drain.
    outgoing: Vec<(Frame, SimTime)>,
    delivered: u64,
    channel: u8,
}

impl NodeCtx {
    fn new(channel: u8) -> Self {
        NodeCtx {
            now: SimTime::ZERO,
            timers: HashMap::new(),
            next_generation: 0,
            armed: Vec::new(),
            radio_mode: RadioMode::Off,
            pending_modes: Vec::new(),
            reception: ReceptionState::Idle,
            transmission: TransmissionState::Idle,
            outgoing: Vec::new(),
            delivered: 0,
            channel,
        }
    }
}

impl MacContext for NodeCtx {
    fn now(&self) -> SimTime {
        self.now
    }

    fn arm_timer(&mut self, kind: TimerKind, at: SimTime) {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.timers.insert(kind, (at, generation));
        self.armed.push((kind, at, generation));
    }

    fn cancel_timer(&mut self, kind: TimerKind) {
        self.timers.remove(&kind);
    }

    fn timer_deadline(&self, kind: TimerKind) -> Option<SimTime> {
        self.timers.get(&kind).map(|(at, _)| *at)
    }

    fn set_radio_mode(&mut self, mode: RadioMode) {
        if self.radio_mode != mode {
            self.radio_mode = mode;
            self.pending_modes.push(mode);
        }
    }

    fn radio_mode(&self) -> RadioMode {
        self.radio_mode
    }

    fn reception_state(&self) -> ReceptionState {
        self.reception
    }

    fn transmission_state(&self) -> TransmissionState {
        self.transmission
    }

    fn transmit(&mut self, frame: Frame, duration: SimTime) {
        self.outgoing.push((frame, duration));
    }

    fn deliver_up(&mut self, _frame: Frame) {
        self.delivered += 1;
    }

    fn set_channel(&mut self, channel: u8) {
        self.channel = channel;
    }
}

struct Node {
    name: String,
    node_type: &'static str,
    mac: DmaMac,
    ctx: NodeCtx,
    /// Reception windows currently or recently on air, for collision marking.
    windows: Vec<(SimTime, SimTime)>,
}

// ============================================================================
// Sink controller
// ============================================================================

/// The network root. Broadcasts notifications, acknowledges data, commands
/// mode switches.
struct SinkController {
    address: MacAddress,
    identity: NodeIdentity,
    schedule: Schedule,
    mode: SuperframeMode,
    mode_switch: ModeSwitch,
    /// A pending switch has been broadcast; flip at the next boundary.
    announced: bool,
    /// Slot index of the upcoming boundary within the current superframe.
    boundary_slot: u16,
    /// Slot index and instant of the most recent boundary, for slot lookup
    /// between boundaries.
    slot_base: u16,
    slot_base_time: SimTime,
    num_slots_transient: u16,
    num_slots_steady: u16,
    steady_after_quiet: u32,
    quiet_superframes: u32,
    windows: Vec<(SimTime, SimTime)>,
    data_received: u64,
    alerts_received: u64,
}

impl SinkController {
    fn num_slots(&self) -> u16 {
        match self.mode {
            SuperframeMode::Transient => self.num_slots_transient,
            SuperframeMode::Steady => self.num_slots_steady,
        }
    }

    /// Slot the sink sits in at `now`, counted from the last boundary.
    fn slot_at(&self, now: SimTime, slot_duration: SimTime) -> u16 {
        let elapsed = now
            .as_micros()
            .saturating_sub(self.slot_base_time.as_micros())
            / slot_duration.as_micros();
        (self.slot_base + elapsed as u16) % self.num_slots()
    }

    /// The sink's radio is tuned in only during its scheduled receive and
    /// alert-receive slots; in every other slot it is transmitting or asleep.
    fn is_listening(&self, now: SimTime, slot_duration: SimTime) -> bool {
        let slot = self.slot_at(now, slot_duration);
        matches!(
            self.schedule.role_at(self.mode, slot, &self.identity),
            Ok(SlotRole::MyReceive | SlotRole::AlertReceive)
        )
    }

    /// Boundary housekeeping; returns the change directive to broadcast.
    ///
    /// A pending switch is broadcast at one boundary and applied at the
    /// next, the same deferral the engines use, so the whole network flips
    /// layouts together.
    fn on_boundary(&mut self) -> bool {
        if self.announced {
            match self
                .mode_switch
                .apply_if_due(self.boundary_slot, self.num_slots_transient)
            {
                SwitchOutcome::Apply => {
                    self.mode = self.mode.other();
                    self.boundary_slot = 0;
                    self.announced = false;
                    self.quiet_superframes = 0;
                    debug!(mode = ?self.mode, "sink switched superframe layout");
                }
                SwitchOutcome::Failed | SwitchOutcome::Idle => {}
            }
        }

        // Quiet transient superframes accumulate toward a steady command.
        if self.mode == SuperframeMode::Transient
            && self.boundary_slot == 0
            && !self.mode_switch.is_pending()
        {
            self.quiet_superframes += 1;
            if self.quiet_superframes > self.steady_after_quiet {
                debug!(
                    quiet = self.quiet_superframes,
                    "sink commands switch to steady"
                );
                self.mode_switch.request_switch();
            }
        }

        let change = self.mode_switch.is_pending() && !self.announced;
        if change {
            self.announced = true;
        }
        change
    }

    fn on_alert(&mut self) {
        self.alerts_received += 1;
        self.quiet_superframes = 0;
        if self.mode == SuperframeMode::Steady && !self.mode_switch.is_pending() {
            debug!("sink commands switch to transient");
            self.mode_switch.request_switch();
        }
    }
}

// ============================================================================
// Simulation
// ============================================================================

/// Aggregate counters over one run, for determinism comparison and output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulationStats {
    /// Events processed by the loop.
    pub total_events: u64,
    /// Frames put on air (nodes and sink).
    pub frames_transmitted: u64,
    /// Per-link deliveries that arrived clean.
    pub frames_delivered: u64,
    /// Per-link deliveries lost outright.
    pub frames_lost: u64,
    /// Per-link deliveries corrupted by overlap.
    pub frames_collided: u64,
    /// Data frames accepted by the sink.
    pub data_at_sink: u64,
    /// Alert frames accepted by the sink.
    pub alerts_at_sink: u64,
    /// Time of the last processed event in microseconds.
    pub simulation_time_us: u64,
}

/// Per-node result row.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub node_type: String,
    pub address: u16,
    /// Frames handed to the layer above (actuator commands, for actuators).
    pub delivered_up: u64,
    pub stats: dmamac_mac::MacStats,
}

pub struct Simulation {
    nodes: Vec<Node>,
    sink: SinkController,
    heap: BinaryHeap<Event>,
    next_seq: u64,
    channel_rng: MotherRng,
    loss: f64,
    slot_duration: SimTime,
    bitrate: f64,
    stats: SimulationStats,
    now: SimTime,
}

/// Build a simulation from a validated model.
pub fn build_simulation(model: &Model, seed: i32) -> Result<Simulation, SimError> {
    let schedule = model.schedule()?;
    let num_slots_transient = schedule.alert_phase_start();
    let num_slots_steady = schedule.num_slots(SuperframeMode::Steady);

    let mut nodes = Vec::with_capacity(model.nodes.len());
    for spec in &model.nodes {
        let config = model.mac_config(spec, seed);
        let tree = Arc::new(model.forwarding_tree(spec));
        let mac = DmaMac::new(config, schedule.clone(), tree);
        nodes.push(Node {
            name: spec.name.clone(),
            node_type: spec.kind.as_str(),
            mac,
            ctx: NodeCtx::new(model.mac.initial_channel),
            windows: Vec::new(),
        });
    }

    let sink = SinkController {
        address: MacAddress::new(model.sink.address),
        identity: NodeIdentity {
            slot: model.sink.address,
            alert_level: 0,
            is_actuator: false,
        },
        schedule,
        mode: SuperframeMode::Transient,
        mode_switch: ModeSwitch::new(),
        announced: false,
        boundary_slot: 0,
        slot_base: 0,
        slot_base_time: SimTime::ZERO,
        num_slots_transient,
        num_slots_steady,
        steady_after_quiet: model.sink.steady_after_quiet,
        quiet_superframes: 0,
        windows: Vec::new(),
        data_received: 0,
        alerts_received: 0,
    };

    let mut sim = Simulation {
        nodes,
        sink,
        heap: BinaryHeap::new(),
        next_seq: 0,
        channel_rng: MotherRng::new(seed.wrapping_mul(31).wrapping_add(7)),
        loss: model.channel.loss,
        slot_duration: SimTime::from_micros(model.mac.slot_duration_us),
        bitrate: model.mac.bitrate,
        stats: SimulationStats::default(),
        now: SimTime::ZERO,
    };

    for idx in 0..sim.nodes.len() {
        let node = &mut sim.nodes[idx];
        node.mac.start(&mut node.ctx);
        sim.drain_node(idx);
    }
    sim.push(SimTime::ZERO, EventPayload::SinkBoundary);
    Ok(sim)
}

impl Simulation {
    /// Run until the event queue drains or `duration` is reached.
    pub fn run(&mut self, duration: SimTime) -> Result<SimulationStats, SimError> {
        while let Some(event) = self.heap.pop() {
            if event.time > duration {
                break;
            }
            self.now = event.time;
            self.dispatch(event)?;
        }
        self.stats.simulation_time_us = self.now.as_micros();
        self.stats.data_at_sink = self.sink.data_received;
        self.stats.alerts_at_sink = self.sink.alerts_received;
        info!(
            events = self.stats.total_events,
            transmitted = self.stats.frames_transmitted,
            delivered = self.stats.frames_delivered,
            data_at_sink = self.stats.data_at_sink,
            "run complete"
        );
        Ok(self.stats.clone())
    }

    /// Per-node stats after a run.
    pub fn node_summaries(&self) -> Vec<NodeSummary> {
        self.nodes
            .iter()
            .map(|n| NodeSummary {
                name: n.name.clone(),
                node_type: n.node_type.to_string(),
                address: n.mac.address().as_u16(),
                delivered_up: n.ctx.delivered,
                stats: n.mac.stats().clone(),
            })
            .collect()
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    fn dispatch(&mut self, event: Event) -> Result<(), SimError> {
        match event.payload {
            EventPayload::Timer {
                node,
                kind,
                generation,
            } => {
                // Stale if the kind was canceled or re-armed since.
                let valid = self.nodes[node].ctx.timers.get(&kind)
                    == Some(&(event.time, generation));
                if !valid {
                    return Ok(());
                }
                self.stats.total_events += 1;
                let n = &mut self.nodes[node];
                n.ctx.timers.remove(&kind);
                n.ctx.now = event.time;
                n.mac.handle_timer(kind, &mut n.ctx)?;
                self.drain_node(node);
            }
            EventPayload::TxEnd { node } => {
                self.stats.total_events += 1;
                let n = &mut self.nodes[node];
                n.ctx.now = event.time;
                n.ctx.transmission = TransmissionState::Idle;
                n.mac.handle_radio_event(
                    RadioEvent::TransmissionStateChanged(TransmissionState::Idle),
                    &mut n.ctx,
                );
                self.drain_node(node);
            }
            EventPayload::RxStart { dest, end } => {
                self.stats.total_events += 1;
                self.on_rx_start(dest, end);
            }
            EventPayload::Delivery { dest, frame, start } => {
                self.stats.total_events += 1;
                self.on_delivery(dest, frame, start);
            }
            EventPayload::SinkBoundary => {
                self.stats.total_events += 1;
                self.on_sink_boundary();
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Node side effects
    // ------------------------------------------------------------------

    /// Drain a node's recorded side effects into heap events and feedback
    /// notifications, until quiescent.
    fn drain_node(&mut self, idx: usize) {
        loop {
            let n = &mut self.nodes[idx];
            if n.ctx.pending_modes.is_empty()
                && n.ctx.outgoing.is_empty()
                && n.ctx.armed.is_empty()
            {
                break;
            }

            for (kind, at, generation) in std::mem::take(&mut self.nodes[idx].ctx.armed) {
                self.push(
                    at,
                    EventPayload::Timer {
                        node: idx,
                        kind,
                        generation,
                    },
                );
            }

            let modes = std::mem::take(&mut self.nodes[idx].ctx.pending_modes);
            for mode in modes {
                let n = &mut self.nodes[idx];
                n.mac.handle_radio_event(RadioEvent::ModeChanged(mode), &mut n.ctx);
            }

            let outgoing = std::mem::take(&mut self.nodes[idx].ctx.outgoing);
            for (frame, duration) in outgoing {
                let now = self.nodes[idx].ctx.now;
                trace!(node = %self.nodes[idx].name, kind = frame.payload.kind_str(), "on air");
                let n = &mut self.nodes[idx];
                n.ctx.transmission = TransmissionState::Transmitting;
                n.mac.handle_radio_event(
                    RadioEvent::TransmissionStateChanged(TransmissionState::Transmitting),
                    &mut n.ctx,
                );
                self.push(now + duration, EventPayload::TxEnd { node: idx });
                self.broadcast(Some(idx), frame, duration, now);
            }
        }
    }

    /// Fan a transmission out to every other station, applying the loss draw
    /// per link. `from` is `None` for sink transmissions.
    fn broadcast(&mut self, from: Option<usize>, frame: Frame, duration: SimTime, now: SimTime) {
        self.stats.frames_transmitted += 1;
        let end = now + duration;
        for idx in 0..self.nodes.len() {
            if Some(idx) == from {
                continue;
            }
            if self.link_lost() {
                continue;
            }
            self.push(now, EventPayload::RxStart { dest: Dest::Node(idx), end });
            self.push(
                end,
                EventPayload::Delivery {
                    dest: Dest::Node(idx),
                    frame: frame.clone(),
                    start: now,
                },
            );
        }
        if from.is_some() {
            if self.link_lost() {
                return;
            }
            self.push(now, EventPayload::RxStart { dest: Dest::Sink, end });
            self.push(
                end,
                EventPayload::Delivery {
                    dest: Dest::Sink,
                    frame,
                    start: now,
                },
            );
        }
    }

    fn link_lost(&mut self) -> bool {
        if self.loss <= 0.0 {
            return false;
        }
        let lost = self.channel_rng.uniform_real01() < self.loss;
        if lost {
            self.stats.frames_lost += 1;
        }
        lost
    }

    fn on_rx_start(&mut self, dest: Dest, end: SimTime) {
        let now = self.now;
        match dest {
            Dest::Sink => {
                if self.sink.is_listening(now, self.slot_duration) {
                    self.sink.windows.push((now, end));
                }
            }
            Dest::Node(idx) => {
                let n = &mut self.nodes[idx];
                // A sleeping or transmitting radio registers nothing.
                if n.ctx.radio_mode != RadioMode::Receiver {
                    return;
                }
                n.windows.push((now, end));
                n.ctx.now = now;
                n.ctx.reception = ReceptionState::Receiving;
                n.mac.handle_radio_event(
                    RadioEvent::ReceptionStateChanged(ReceptionState::Receiving),
                    &mut n.ctx,
                );
                self.drain_node(idx);
            }
        }
    }

    fn on_delivery(&mut self, dest: Dest, frame: Frame, start: SimTime) {
        let now = self.now;
        let windows = match dest {
            Dest::Sink => &mut self.sink.windows,
            Dest::Node(idx) => &mut self.nodes[idx].windows,
        };
        // No window means the radio was not listening when the frame hit
        // the air; the frame passes the station by entirely.
        let Some(pos) = windows.iter().position(|w| *w == (start, now)) else {
            return;
        };
        // Corrupted when any other reception overlapped this one's window.
        let overlapping = windows
            .iter()
            .filter(|(s, e)| *s < now && *e > start)
            .count();
        let corrupted = overlapping > 1;
        windows.remove(pos);
        let still_busy = windows.iter().any(|(s, e)| *s <= now && *e > now);

        if corrupted {
            self.stats.frames_collided += 1;
        } else {
            self.stats.frames_delivered += 1;
        }

        match dest {
            Dest::Sink => {
                if !corrupted {
                    self.on_sink_frame(frame, now);
                }
            }
            Dest::Node(idx) => {
                let n = &mut self.nodes[idx];
                n.ctx.now = now;
                n.mac
                    .handle_frame(ReceivedFrame { frame, bit_error: corrupted }, &mut n.ctx);
                if !still_busy {
                    n.ctx.reception = ReceptionState::Idle;
                    n.mac.handle_radio_event(
                        RadioEvent::ReceptionStateChanged(ReceptionState::Idle),
                        &mut n.ctx,
                    );
                }
                self.drain_node(idx);
            }
        }
    }

    // ------------------------------------------------------------------
    // Sink behavior
    // ------------------------------------------------------------------

    fn on_sink_boundary(&mut self) {
        let change = self.sink.on_boundary();
        self.sink.slot_base = self.sink.boundary_slot;
        self.sink.slot_base_time = self.now;
        let notification = Frame::notification(self.sink.address, change);
        let duration = self.frame_duration(&notification);
        self.broadcast(None, notification, duration, self.now);

        self.sink.boundary_slot =
            (self.sink.boundary_slot + self.sink.num_slots_transient) % self.sink.num_slots();
        let next = self.now
            + SimTime::from_micros(
                self.slot_duration.as_micros() * u64::from(self.sink.num_slots_transient),
            );
        self.push(next, EventPayload::SinkBoundary);
    }

    fn on_sink_frame(&mut self, frame: Frame, now: SimTime) {
        if frame.dst != self.sink.address {
            return;
        }
        match frame.payload {
            FramePayload::Data { .. } => {
                self.sink.data_received += 1;
                let ack = Frame::ack(self.sink.address, frame.src, 0);
                let duration = self.frame_duration(&ack);
                self.broadcast(None, ack, duration, now);
            }
            FramePayload::Alert => self.sink.on_alert(),
            _ => {}
        }
    }

    fn frame_duration(&self, frame: &Frame) -> SimTime {
        SimTime::from_secs(f64::from(frame.bit_length()) / self.bitrate)
    }

    fn push(&mut self, time: SimTime, payload: EventPayload) {
        self.next_seq += 1;
        self.heap.push(Event {
            time,
            seq: self.next_seq,
            payload,
        });
    }
}
