//! The superframe/slot state machine.
//!
//! [`DmaMac`] is the per-node protocol engine. It owns the schedule, the
//! outgoing queue, the alert flags, the mode-switch state and the protocol
//! RNG, and is driven entirely from the outside through three entry points:
//! timer firings ([`DmaMac::handle_timer`]), frames delivered by the radio
//! ([`DmaMac::handle_frame`]) and the radio's asynchronous state
//! notifications ([`DmaMac::handle_radio_event`]). All side effects go
//! through the [`MacContext`] capability: arming and canceling timers,
//! driving the radio, transmitting frames, delivering received data upward.
//!
//! On every slot-role timer the engine performs the slot-0 bookkeeping
//! (failed-switch detection, deferred mode switch, channel hop, superframe
//! counters), handles the slot's role, then looks ahead exactly one slot and
//! arms the single timer due there. Entering sleep instead scans forward for
//! the next relevant slot and arms one wake-up timer across the whole span.
//!
//! Recoverable failures (lost ACKs, lost alerts, collisions, queue overflow)
//! are absorbed into [`MacStats`]. The only fatal class is a malformed
//! schedule, surfaced as [`MacError`].

use crate::channel;
use crate::mode_switch::{ModeSwitch, SwitchOutcome};
use crate::queue::{EnqueueResult, OutgoingQueue};
use crate::rng::MotherRng;
use crate::schedule::{
    NodeIdentity, Schedule, ScheduleError, SlotEvent, SlotRole, Superframe, SuperframeMode,
};
use crate::stats::MacStats;
use crate::topology::ForwardingTree;
use dmamac_common::{
    DataKind, Frame, FramePayload, MacAddress, RadioEvent, RadioMode, ReceivedFrame,
    ReceptionState, SimTime, TransmissionState,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Strict TDMA or hybrid (contention-based alerts) operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacType {
    /// Alerts sent on a strict per-slot schedule, receive side arms a timeout.
    Tdma,
    /// Alerts sent opportunistically with carrier sense and random jitter.
    Hybrid,
}

/// The node's current activity. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacState {
    Startup,
    Sleep,
    WaitData,
    WaitAck,
    WaitAlert,
    WaitNotification,
    SendData,
    SendAck,
    ScheduleAlert,
    SendAlert,
}

/// The timers the engine arms. At most one instance of each kind is armed
/// at any time; canceling an unarmed kind is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Startup,
    Sleep,
    SendData,
    SendAck,
    ScheduleAlert,
    SendAlert,
    WaitData,
    WaitAck,
    WaitAlert,
    WaitNotification,
    DataTimeout,
    AckTimeout,
    AlertTimeout,
    AckReceived,
}

/// Capability surface the engine drives.
///
/// The simulated harness implements this against its event queue and radio
/// model; tests implement it with a recording mock.
pub trait MacContext {
    /// Current simulated time.
    fn now(&self) -> SimTime;

    /// Arm a timer of the given kind. Re-arming an already armed kind
    /// replaces its deadline.
    fn arm_timer(&mut self, kind: TimerKind, at: SimTime);

    /// Cancel an armed timer. Canceling a non-armed or already-fired timer
    /// is a no-op, never an error.
    fn cancel_timer(&mut self, kind: TimerKind);

    /// Deadline of an armed timer, if armed.
    fn timer_deadline(&self, kind: TimerKind) -> Option<SimTime>;

    /// Request a radio mode change; completion arrives as a
    /// [`RadioEvent::ModeChanged`] notification.
    fn set_radio_mode(&mut self, mode: RadioMode);

    /// Current radio mode.
    fn radio_mode(&self) -> RadioMode;

    /// Whether the receiver observes energy on the channel (carrier sense).
    fn reception_state(&self) -> ReceptionState;

    /// Whether the transmitter is on air.
    fn transmission_state(&self) -> TransmissionState;

    /// Hand a frame to the radio for transmission over `duration`.
    fn transmit(&mut self, frame: Frame, duration: SimTime);

    /// Deliver a received, addressed-to-us frame to the layer above.
    fn deliver_up(&mut self, frame: Frame);

    /// Retune the radio to a channel (frequency hopping).
    fn set_channel(&mut self, channel: u8);
}

/// Fatal configuration errors. Everything recoverable lands in stats.
#[derive(Debug, Error)]
pub enum MacError {
    #[error("schedule inconsistency: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("send-data timer fired in slot {slot}, which is not this node's transmit slot")]
    NotMyTransmitSlot { slot: u16 },
}

/// Static per-node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacConfig {
    /// This node's short address (also its transmit slot number).
    pub address: MacAddress,
    /// The network's root node, destination of all sensor data.
    pub sink_address: MacAddress,
    pub mac_type: MacType,
    pub slot_duration: SimTime,
    /// Bits per second, for transmit duration computation.
    pub bitrate: f64,
    /// Outgoing queue capacity.
    pub queue_length: usize,
    pub ack_timeout: SimTime,
    pub data_timeout: SimTime,
    pub alert_timeout: SimTime,
    /// Self-alert threshold against a uniform draw in [0, 1000).
    pub alert_probability: i32,
    /// Bound on the hybrid alert jitter draw; jitter is draw / 10000 seconds.
    pub alert_delay_max: i32,
    pub is_actuator: bool,
    /// Nodes without sensor children skip alert receive slots entirely.
    pub has_sensor_child: bool,
    /// Depth level in the forwarding tree, matched against alert slots.
    pub alert_level: u8,
    /// Network-wide seed. The hop RNG uses it as-is so all nodes follow the
    /// same channel sequence; the draw RNG mixes in the node address.
    pub seed: i32,
    /// Hop channels at each superframe boundary.
    pub channel_hopping: bool,
    /// Channel used when hopping is disabled (and before the first hop).
    pub initial_channel: u8,
}

impl MacConfig {
    fn identity(&self) -> NodeIdentity {
        NodeIdentity {
            slot: self.address.as_u16(),
            alert_level: self.alert_level,
            is_actuator: self.is_actuator,
        }
    }
}

/// The per-node DMAMAC engine.
pub struct DmaMac {
    config: MacConfig,
    identity: NodeIdentity,
    schedule: Schedule,
    superframe: Superframe,
    queue: OutgoingQueue,
    mode_switch: ModeSwitch,
    tree: Arc<ForwardingTree>,
    /// Channel hop sequence, identical on every node.
    hop_rng: MotherRng,
    /// Alert probability and jitter draws, diverging per node.
    draw_rng: MotherRng,
    state: MacState,
    /// Alert received from a child, awaiting forward.
    alert_pending: bool,
    /// This node decided to originate an alert this superframe.
    alert_self: bool,
    /// An alert transmission went out; flags clear at the next slot 0.
    alert_acted: bool,
    /// Slot-0 housekeeping already ran for the current superframe. Several
    /// timers can fire while the slot counter still reads 0 (ACK chains
    /// after a last-slot transmit); the hop draw must happen exactly once.
    superframe_started: bool,
    /// Source of the last accepted data frame, for the ACK.
    last_data_src: MacAddress,
    /// Last observed transmitter state, to detect the on-air -> idle edge.
    transmission_state: TransmissionState,
    stats: MacStats,
}

impl DmaMac {
    pub fn new(config: MacConfig, schedule: Schedule, tree: Arc<ForwardingTree>) -> Self {
        let identity = config.identity();
        let hop_rng = MotherRng::new(config.seed);
        let draw_rng = MotherRng::new(config.seed.wrapping_add(i32::from(config.address.as_u16())));
        let queue = OutgoingQueue::new(config.queue_length);
        DmaMac {
            config,
            identity,
            schedule,
            superframe: Superframe::new(),
            queue,
            mode_switch: ModeSwitch::new(),
            tree,
            hop_rng,
            draw_rng,
            state: MacState::Startup,
            alert_pending: false,
            alert_self: false,
            alert_acted: false,
            superframe_started: false,
            last_data_src: MacAddress::BROADCAST,
            transmission_state: TransmissionState::Idle,
            stats: MacStats::default(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> MacState {
        self.state
    }

    pub fn mode(&self) -> SuperframeMode {
        self.superframe.mode()
    }

    pub fn current_slot(&self) -> u16 {
        self.superframe.current_slot()
    }

    pub fn num_slots(&self) -> u16 {
        self.schedule.num_slots(self.superframe.mode())
    }

    pub fn stats(&self) -> &MacStats {
        &self.stats
    }

    pub fn alert_pending(&self) -> bool {
        self.alert_pending
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn address(&self) -> MacAddress {
        self.config.address
    }

    /// Current protocol RNG state, advertised in sync frames.
    pub fn rng_state(&self) -> [u32; 5] {
        self.hop_rng.state()
    }

    // ------------------------------------------------------------------
    // Upper layer
    // ------------------------------------------------------------------

    /// Accept a data frame from the layer above.
    ///
    /// Sensor data must be addressed to the sink; anything else is refused
    /// and counted as dropped. A full queue also drops (no backpressure
    /// exists in this protocol).
    pub fn handle_upper_frame(&mut self, mut frame: Frame) -> EnqueueResult {
        if let FramePayload::Data { source_slot, .. } = &mut frame.payload {
            *source_slot = self.config.address.as_u16();
        } else {
            warn!(kind = frame.payload.kind_str(), "upper layer handed a non-data frame");
            self.stats.dropped_data_frames += 1;
            return EnqueueResult::Dropped;
        }
        if frame.dst != self.config.sink_address {
            warn!(dst = %frame.dst, "sensor data not addressed to the sink, dropping");
            self.stats.dropped_data_frames += 1;
            return EnqueueResult::Dropped;
        }
        let result = self.queue.enqueue(frame);
        if result == EnqueueResult::Dropped {
            debug!(queue = self.queue.len(), "queue full, dropping upper frame");
            self.stats.dropped_data_frames += 1;
        }
        result
    }

    // ------------------------------------------------------------------
    // Startup
    // ------------------------------------------------------------------

    /// Arm the startup timer; the protocol begins when it fires.
    pub fn start(&mut self, ctx: &mut dyn MacContext) {
        ctx.arm_timer(TimerKind::Startup, ctx.now());
    }

    // ------------------------------------------------------------------
    // Timer dispatch
    // ------------------------------------------------------------------

    /// Central dispatcher for timer firings.
    pub fn handle_timer(
        &mut self,
        kind: TimerKind,
        ctx: &mut dyn MacContext,
    ) -> Result<(), MacError> {
        if kind == TimerKind::Startup {
            self.state = MacState::Startup;
            self.superframe = Superframe::new();
            self.superframe_started = true;
            self.superframe_start(ctx);
            ctx.arm_timer(TimerKind::WaitNotification, ctx.now());
            return Ok(());
        }

        self.slot_boundary_bookkeeping(ctx);

        trace!(
            state = ?self.state,
            timer = ?kind,
            slot = self.superframe.current_slot(),
            mode = ?self.superframe.mode(),
            "timer"
        );

        match kind {
            TimerKind::Startup => unreachable!("handled above"),
            TimerKind::Sleep => self.on_sleep(ctx)?,
            TimerKind::WaitData => self.on_wait_data(ctx)?,
            TimerKind::WaitAck => self.on_wait_ack(ctx),
            TimerKind::WaitAlert => self.on_wait_alert(ctx)?,
            TimerKind::WaitNotification => self.on_wait_notification(ctx)?,
            TimerKind::SendData => self.on_send_data(ctx)?,
            TimerKind::SendAck => self.on_send_ack(ctx),
            TimerKind::ScheduleAlert => self.on_schedule_alert(ctx)?,
            TimerKind::SendAlert => self.on_send_alert(ctx),
            TimerKind::AckReceived => self.on_ack_received(ctx),
            TimerKind::AckTimeout => self.on_ack_timeout(ctx)?,
            TimerKind::DataTimeout => self.on_data_timeout(ctx),
            TimerKind::AlertTimeout => self.on_alert_timeout(ctx),
        }
        Ok(())
    }

    /// Deferred-switch and superframe-boundary bookkeeping, run at the top
    /// of every timer dispatch.
    ///
    /// Running it unconditionally makes the alert-timeout/superframe-change
    /// race at slot 0 explicit: whichever timer fires on the boundary first
    /// performs the switch bookkeeping before its own handling.
    fn slot_boundary_bookkeeping(&mut self, ctx: &mut dyn MacContext) {
        let slot = self.superframe.current_slot();
        match self
            .mode_switch
            .apply_if_due(slot, self.schedule.alert_phase_start())
        {
            SwitchOutcome::Idle => {}
            SwitchOutcome::Failed => {
                debug!(slot, "superframe switch failed (notification lost)");
                self.stats.failed_switches += 1;
            }
            SwitchOutcome::Apply => {
                let from = self.superframe.mode();
                self.superframe.switch_mode();
                self.superframe_started = false;
                match from {
                    SuperframeMode::Steady => self.stats.steady_to_transient += 1,
                    SuperframeMode::Transient => self.stats.transient_to_steady += 1,
                }
                if slot != 0 {
                    self.stats.mid_superframe_switches += 1;
                }
                debug!(
                    from = ?from,
                    to = ?self.superframe.mode(),
                    slot,
                    "superframe layout switched"
                );
            }
        }

        if self.superframe.is_slot_zero() {
            if !self.superframe_started {
                self.superframe_started = true;
                self.superframe_start(ctx);
            }
        } else {
            self.superframe_started = false;
        }
    }

    /// New-superframe housekeeping at slot 0.
    fn superframe_start(&mut self, ctx: &mut dyn MacContext) {
        if self.config.channel_hopping {
            let ch = channel::next_hop_channel(&mut self.hop_rng);
            ctx.set_channel(ch);
        }

        match self.superframe.mode() {
            SuperframeMode::Transient => self.stats.transient_superframes += 1,
            SuperframeMode::Steady => self.stats.steady_superframes += 1,
        }

        if self.alert_acted {
            self.alert_pending = false;
            self.alert_self = false;
            self.alert_acted = false;
        }

        // Sensor nodes produce one reading per superframe.
        if !self.config.is_actuator && self.queue.is_empty() {
            let frame = Frame::data(
                self.config.address,
                self.config.sink_address,
                DataKind::Sensor,
                self.config.address.as_u16(),
            );
            self.queue.enqueue(frame);
        }
    }

    // ------------------------------------------------------------------
    // Slot-role handlers
    // ------------------------------------------------------------------

    fn on_sleep(&mut self, ctx: &mut dyn MacContext) -> Result<(), MacError> {
        self.state = MacState::Sleep;
        let mode = self.superframe.mode();
        let (distance, event) =
            self.schedule
                .distant_next(mode, self.superframe.current_slot(), &self.identity)?;

        if ctx.radio_mode() != RadioMode::Sleep {
            ctx.set_radio_mode(RadioMode::Sleep);
        }

        self.stats.sleep_slots += u64::from(distance);
        self.superframe.advance(distance, self.schedule.num_slots(mode));

        let wake = ctx.now() + Self::slots(self.config.slot_duration, distance);
        trace!(distance, ?event, "sleeping until next relevant slot");
        ctx.arm_timer(Self::timer_for(event), wake);
        Ok(())
    }

    fn on_wait_data(&mut self, ctx: &mut dyn MacContext) -> Result<(), MacError> {
        self.state = MacState::WaitData;
        ctx.arm_timer(TimerKind::DataTimeout, ctx.now() + self.config.data_timeout);
        if ctx.radio_mode() != RadioMode::Receiver {
            ctx.set_radio_mode(RadioMode::Receiver);
        }
        self.advance_after_slot(ctx)
    }

    fn on_wait_ack(&mut self, ctx: &mut dyn MacContext) {
        self.state = MacState::WaitAck;
        ctx.set_radio_mode(RadioMode::Receiver);
        ctx.arm_timer(TimerKind::AckTimeout, ctx.now() + self.config.ack_timeout);
    }

    fn on_wait_alert(&mut self, ctx: &mut dyn MacContext) -> Result<(), MacError> {
        self.state = MacState::WaitAlert;
        if self.config.has_sensor_child {
            self.stats.alert_rx_slots += 1;
            // Hybrid relies on carrier sense instead of a timeout.
            if self.config.mac_type == MacType::Tdma {
                ctx.arm_timer(
                    TimerKind::AlertTimeout,
                    ctx.now() + self.config.alert_timeout,
                );
            }
            if ctx.radio_mode() != RadioMode::Receiver {
                ctx.set_radio_mode(RadioMode::Receiver);
            }
        }
        self.advance_after_slot(ctx)
    }

    fn on_wait_notification(&mut self, ctx: &mut dyn MacContext) -> Result<(), MacError> {
        self.state = MacState::WaitNotification;
        if ctx.radio_mode() != RadioMode::Receiver {
            ctx.set_radio_mode(RadioMode::Receiver);
        }
        self.advance_after_slot(ctx)
    }

    fn on_send_data(&mut self, ctx: &mut dyn MacContext) -> Result<(), MacError> {
        self.state = MacState::SendData;
        self.stats.tx_slots += 1;

        let slot = self.superframe.current_slot();
        let role = self
            .schedule
            .role_at(self.superframe.mode(), slot, &self.identity)?;
        if role != SlotRole::MyTransmit {
            return Err(MacError::NotMyTransmitSlot { slot });
        }

        if self.queue.is_empty() {
            trace!(slot, "transmit slot with empty queue");
        } else if ctx.radio_mode() != RadioMode::Transmitter {
            ctx.set_radio_mode(RadioMode::Transmitter);
        }
        self.advance_after_slot(ctx)
    }

    fn on_send_ack(&mut self, ctx: &mut dyn MacContext) {
        self.state = MacState::SendAck;
        ctx.set_radio_mode(RadioMode::Transmitter);
    }

    fn on_schedule_alert(&mut self, ctx: &mut dyn MacContext) -> Result<(), MacError> {
        self.state = MacState::ScheduleAlert;
        // Radio parked while deciding, to avoid catching a stray reception
        // mid mode switch.
        if matches!(
            ctx.radio_mode(),
            RadioMode::Receiver | RadioMode::Transmitter
        ) {
            ctx.set_radio_mode(RadioMode::Sleep);
        }

        let draw = self.draw_rng.uniform_int(0, 999);
        let mut send = false;
        if self.alert_pending {
            debug!("forwarding pending child alert");
            send = true;
        } else if draw < self.config.alert_probability {
            debug!(draw, "originating alert");
            self.alert_self = true;
            send = true;
        }

        if send {
            let at = match self.config.mac_type {
                MacType::Hybrid => {
                    let jitter = if self.config.alert_delay_max > 1 {
                        let d = self.draw_rng.uniform_int(0, self.config.alert_delay_max - 1);
                        SimTime::from_secs(f64::from(d) / 10_000.0)
                    } else {
                        SimTime::ZERO
                    };
                    ctx.now() + jitter
                }
                MacType::Tdma => ctx.now(),
            };
            ctx.arm_timer(TimerKind::SendAlert, at);
        } else if ctx.radio_mode() != RadioMode::Sleep {
            ctx.set_radio_mode(RadioMode::Sleep);
        }

        self.advance_after_slot(ctx)
    }

    fn on_send_alert(&mut self, ctx: &mut dyn MacContext) {
        self.state = MacState::SendAlert;
        match self.config.mac_type {
            MacType::Hybrid => {
                // Carrier sense: a busy channel means a sibling's alert is
                // already on its way up; skip, keep the flag.
                if ctx.reception_state() == ReceptionState::Idle {
                    ctx.set_radio_mode(RadioMode::Transmitter);
                } else {
                    debug!("channel busy, skipping alert this superframe");
                    self.stats.skipped_alerts += 1;
                }
            }
            MacType::Tdma => {
                if ctx.radio_mode() != RadioMode::Transmitter {
                    ctx.set_radio_mode(RadioMode::Transmitter);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Timeout handlers
    // ------------------------------------------------------------------

    fn on_ack_received(&mut self, ctx: &mut dyn MacContext) {
        if ctx.radio_mode() == RadioMode::Receiver {
            ctx.set_radio_mode(RadioMode::Sleep);
        }
    }

    fn on_ack_timeout(&mut self, ctx: &mut dyn MacContext) -> Result<(), MacError> {
        self.stats.tx_data_failures += 1;
        if ctx.radio_mode() == RadioMode::Receiver {
            ctx.set_radio_mode(RadioMode::Sleep);
        }

        // The schedule bounds retransmission: keep the head only if the
        // upcoming slot is another transmit opportunity of ours.
        let upcoming = self.superframe.current_slot();
        let role = self
            .schedule
            .role_at(self.superframe.mode(), upcoming, &self.identity)?;
        if role == SlotRole::MyTransmit {
            debug!(slot = upcoming, "ACK timeout, retrying in next transmit slot");
        } else {
            debug!("ACK timeout, no retransmission slot left, dropping head frame");
            self.queue.dequeue_head();
        }
        Ok(())
    }

    fn on_data_timeout(&mut self, ctx: &mut dyn MacContext) {
        self.stats.timeouts += 1;
        if ctx.radio_mode() == RadioMode::Receiver {
            ctx.set_radio_mode(RadioMode::Sleep);
        }
    }

    fn on_alert_timeout(&mut self, ctx: &mut dyn MacContext) {
        if ctx.radio_mode() == RadioMode::Receiver {
            ctx.set_radio_mode(RadioMode::Sleep);
        }
    }

    // ------------------------------------------------------------------
    // Radio notifications
    // ------------------------------------------------------------------

    /// React to the radio's asynchronous notifications.
    pub fn handle_radio_event(&mut self, event: RadioEvent, ctx: &mut dyn MacContext) {
        match event {
            RadioEvent::ModeChanged(RadioMode::Transmitter) => self.on_radio_tx_ready(ctx),
            RadioEvent::ModeChanged(_) => {}
            RadioEvent::TransmissionStateChanged(new_state) => {
                if self.transmission_state == TransmissionState::Transmitting
                    && new_state == TransmissionState::Idle
                {
                    self.on_transmission_complete(ctx);
                }
                self.transmission_state = new_state;
            }
            RadioEvent::ReceptionStateChanged(ReceptionState::Receiving) => {
                // The matching timeout races against the incoming frame;
                // cancellation is idempotent, so a late notification after
                // the timeout already fired is harmless.
                match self.state {
                    MacState::WaitData => ctx.cancel_timer(TimerKind::DataTimeout),
                    MacState::WaitAck => ctx.cancel_timer(TimerKind::AckTimeout),
                    MacState::WaitAlert => ctx.cancel_timer(TimerKind::AlertTimeout),
                    _ => {}
                }
            }
            RadioEvent::ReceptionStateChanged(ReceptionState::Idle) => {}
        }
    }

    /// Radio reached transmit mode: put the frame for the current state on air.
    fn on_radio_tx_ready(&mut self, ctx: &mut dyn MacContext) {
        match self.state {
            MacState::SendData => {
                if let Some(head) = self.queue.peek_head() {
                    let frame = head.clone();
                    self.stats.tx_data += 1;
                    self.transmit_frame(frame, ctx);
                }
            }
            MacState::SendAck => {
                let ack = Frame::ack(
                    self.config.address,
                    self.last_data_src,
                    self.config.address.as_u16(),
                );
                self.stats.tx_acks += 1;
                self.transmit_frame(ack, ctx);
            }
            MacState::SendAlert => {
                let Some(parent) = self.tree.parent else {
                    warn!("alert to send but no parent configured");
                    return;
                };
                if self.alert_pending {
                    self.stats.forwarded_alerts += 1;
                } else {
                    self.stats.tx_alerts += 1;
                }
                self.alert_acted = true;
                let alert = Frame::alert(self.config.address, parent);
                self.transmit_frame(alert, ctx);
            }
            _ => {}
        }
    }

    /// Transmitter left the air: chain the post-transmission step.
    fn on_transmission_complete(&mut self, ctx: &mut dyn MacContext) {
        match self.state {
            MacState::SendData => {
                ctx.arm_timer(TimerKind::WaitAck, ctx.now());
            }
            MacState::SendAck | MacState::SendAlert => {
                if ctx.radio_mode() == RadioMode::Transmitter {
                    ctx.set_radio_mode(RadioMode::Sleep);
                }
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Frame handling
    // ------------------------------------------------------------------

    /// Process a frame delivered by the radio.
    pub fn handle_frame(&mut self, received: ReceivedFrame, ctx: &mut dyn MacContext) {
        if received.bit_error {
            self.stats.collisions += 1;
            // In steady mode a corrupted frame may have been the switch
            // notification; remember to check at the next slot 0.
            if self.superframe.mode() == SuperframeMode::Steady {
                self.mode_switch.suspect_lost_switch();
            }
            return;
        }
        let frame = received.frame;

        if let FramePayload::Sync { slot, num_slots } = frame.payload {
            self.superframe.resync(slot, num_slots);
            return;
        }

        match self.state {
            MacState::WaitData => self.on_rx_data(frame, ctx),
            MacState::WaitAck => self.on_rx_ack(frame, ctx),
            MacState::WaitNotification => self.on_rx_notification(frame, ctx),
            MacState::WaitAlert => self.on_rx_alert(frame, ctx),
            _ => {
                trace!(
                    kind = frame.payload.kind_str(),
                    state = ?self.state,
                    "frame outside a wait state, ignoring"
                );
            }
        }
    }

    fn on_rx_data(&mut self, frame: Frame, ctx: &mut dyn MacContext) {
        let FramePayload::Data { kind, .. } = frame.payload else {
            return;
        };

        let for_descendant = kind == DataKind::Actuator && self.tree.is_descendant(frame.dst);
        let for_me = frame.dst == self.config.address;
        if !(for_me || frame.dst == self.config.sink_address || for_descendant) {
            trace!(dst = %frame.dst, "data frame not for this subtree, dropping");
            return;
        }

        self.last_data_src = frame.src;
        if for_me {
            self.stats.rx_data += 1;
            ctx.deliver_up(frame);
        } else if for_descendant {
            self.stats.rx_actuator_data += 1;
            // Actuator commands preempt queued sensor readings.
            self.queue.enqueue_evicting(frame);
        } else {
            self.stats.rx_data += 1;
            if self.queue.enqueue(frame) == EnqueueResult::Dropped {
                self.stats.dropped_data_frames += 1;
            }
        }

        ctx.arm_timer(TimerKind::SendAck, ctx.now());
    }

    fn on_rx_ack(&mut self, frame: Frame, ctx: &mut dyn MacContext) {
        if !matches!(frame.payload, FramePayload::Ack { .. }) {
            return;
        }
        self.stats.rx_acks += 1;
        self.queue.dequeue_head();
        ctx.arm_timer(TimerKind::AckReceived, ctx.now());
    }

    fn on_rx_notification(&mut self, frame: Frame, ctx: &mut dyn MacContext) {
        let FramePayload::Notification { change_mode } = frame.payload else {
            return;
        };
        self.stats.rx_notifications += 1;

        if change_mode {
            self.mode_switch.request_switch();

            if self.superframe.mode() == SuperframeMode::Steady {
                // The alert made it to the sink; nothing left to forward.
                self.alert_pending = false;

                // An emergency steady-to-transient switch mid-superframe:
                // the next armed event is a sleep, replace it with a
                // notification wait at the same deadline so the node hears
                // the transient superframe start.
                if self.superframe.current_slot() != 0 {
                    if let Some(deadline) = ctx.timer_deadline(TimerKind::Sleep) {
                        ctx.arm_timer(TimerKind::WaitNotification, deadline);
                        ctx.cancel_timer(TimerKind::Sleep);
                    }
                }
            }
        }

        if ctx.radio_mode() == RadioMode::Receiver {
            ctx.set_radio_mode(RadioMode::Sleep);
        }
    }

    fn on_rx_alert(&mut self, frame: Frame, ctx: &mut dyn MacContext) {
        if frame.payload != FramePayload::Alert {
            return;
        }
        if !self.alert_pending && frame.dst == self.config.address {
            debug!(src = %frame.src, "alert from child, will forward");
            self.alert_pending = true;
            self.stats.rx_alerts += 1;
        } else {
            self.stats.discarded_alerts += 1;
        }
        if ctx.radio_mode() == RadioMode::Receiver {
            ctx.set_radio_mode(RadioMode::Sleep);
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Arm the one event due in the following slot, then advance the slot
    /// counter.
    fn advance_after_slot(&mut self, ctx: &mut dyn MacContext) -> Result<(), MacError> {
        let mode = self.superframe.mode();
        let event =
            self.schedule
                .immediate_next(mode, self.superframe.current_slot(), &self.identity)?;
        ctx.arm_timer(
            Self::timer_for(event),
            ctx.now() + self.config.slot_duration,
        );
        self.superframe.advance(1, self.schedule.num_slots(mode));
        Ok(())
    }

    fn transmit_frame(&mut self, frame: Frame, ctx: &mut dyn MacContext) {
        let duration = SimTime::from_secs(f64::from(frame.bit_length()) / self.config.bitrate);
        ctx.transmit(frame, duration);
    }

    fn timer_for(event: SlotEvent) -> TimerKind {
        match event {
            SlotEvent::SendData => TimerKind::SendData,
            SlotEvent::ScheduleAlert => TimerKind::ScheduleAlert,
            SlotEvent::WaitData => TimerKind::WaitData,
            SlotEvent::WaitAlert => TimerKind::WaitAlert,
            SlotEvent::WaitNotification => TimerKind::WaitNotification,
            SlotEvent::Sleep => TimerKind::Sleep,
        }
    }

    fn slots(slot_duration: SimTime, n: u16) -> SimTime {
        SimTime::from_micros(slot_duration.as_micros() * u64::from(n))
    }
}
