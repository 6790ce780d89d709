//! State machine tests driven through a recording mock context.
//!
//! The mock implements [`MacContext`] over a sorted timer set, which lets a
//! test fire armed timers in deadline order exactly as the simulated event
//! loop would, while radio notifications and frame arrivals are injected by
//! hand at the interesting moments.

use dmamac_common::{
    DataKind, Frame, FramePayload, MacAddress, RadioEvent, RadioMode, ReceivedFrame,
    ReceptionState, SimTime, TransmissionState,
};
use dmamac_mac::{
    DmaMac, DownstreamBranch, ForwardingTree, MacConfig, MacContext, MacType, Schedule,
    SlotAssignment, SlotTable, SuperframeMode, TimerKind,
};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Mock context
// ============================================================================

struct MockCtx {
    now: SimTime,
    timers: HashMap<TimerKind, (SimTime, u64)>,
    seq: u64,
    radio_mode: RadioMode,
    reception: ReceptionState,
    transmission: TransmissionState,
    transmitted: Vec<(Frame, SimTime)>,
    delivered: Vec<Frame>,
    channels: Vec<u8>,
}

impl MockCtx {
    fn new() -> Self {
        MockCtx {
            now: SimTime::ZERO,
            timers: HashMap::new(),
            seq: 0,
            radio_mode: RadioMode::Off,
            reception: ReceptionState::Idle,
            transmission: TransmissionState::Idle,
            transmitted: Vec::new(),
            delivered: Vec::new(),
            channels: Vec::new(),
        }
    }

    /// Earliest armed timer, by (deadline, arm order).
    fn next_timer(&self) -> Option<TimerKind> {
        self.timers
            .iter()
            .min_by_key(|(_, (at, seq))| (*at, *seq))
            .map(|(kind, _)| *kind)
    }
}

impl MacContext for MockCtx {
    fn now(&self) -> SimTime {
        self.now
    }

    fn arm_timer(&mut self, kind: TimerKind, at: SimTime) {
        self.seq += 1;
        self.timers.insert(kind, (at, self.seq));
    }

    fn cancel_timer(&mut self, kind: TimerKind) {
        self.timers.remove(&kind);
    }

    fn timer_deadline(&self, kind: TimerKind) -> Option<SimTime> {
        self.timers.get(&kind).map(|(at, _)| *at)
    }

    fn set_radio_mode(&mut self, mode: RadioMode) {
        self.radio_mode = mode;
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

    fn transmit(&mut self, frame: Frame, _duration: SimTime) {
        self.transmitted.push((frame, self.now));
    }

    fn deliver_up(&mut self, frame: Frame) {
        self.delivered.push(frame);
    }

    fn set_channel(&mut self, channel: u8) {
        self.channels.push(channel);
    }
}

/// Fire the earliest armed timer.
fn step(mac: &mut DmaMac, ctx: &mut MockCtx) -> TimerKind {
    let kind = ctx.next_timer().expect("no timer armed");
    let (at, _) = ctx.timers.remove(&kind).unwrap();
    assert!(at >= ctx.now, "timer armed in the past");
    ctx.now = at;
    mac.handle_timer(kind, ctx).expect("fatal MAC error");
    kind
}

/// Step until the given timer kind has just been handled.
fn step_until(mac: &mut DmaMac, ctx: &mut MockCtx, kind: TimerKind) {
    for _ in 0..64 {
        if step(mac, ctx) == kind {
            return;
        }
    }
    panic!("timer {kind:?} never fired");
}

// ============================================================================
// Fixtures
// ============================================================================

fn addr(n: u16) -> MacAddress {
    MacAddress::new(n)
}

fn config(address: u16) -> MacConfig {
    MacConfig {
        address: addr(address),
        sink_address: addr(0),
        mac_type: MacType::Hybrid,
        slot_duration: SimTime::from_micros(100_000),
        bitrate: 250_000.0,
        queue_length: 4,
        ack_timeout: SimTime::from_micros(20_000),
        data_timeout: SimTime::from_micros(20_000),
        alert_timeout: SimTime::from_micros(20_000),
        alert_probability: 0,
        alert_delay_max: 1,
        is_actuator: false,
        has_sensor_child: true,
        alert_level: 1,
        seed: 42,
        channel_hopping: false,
        initial_channel: 11,
    }
}

fn tree() -> Arc<ForwardingTree> {
    Arc::new(ForwardingTree {
        parent: Some(addr(0)),
        branches: vec![DownstreamBranch {
            next_hop: addr(5),
            reachable: vec![addr(5)],
        }],
    })
}

fn table(tx: Vec<SlotAssignment>, rx: Vec<SlotAssignment>) -> SlotTable {
    SlotTable::new(tx, rx).unwrap()
}

fn mac_with(cfg: MacConfig, schedule: Schedule) -> (DmaMac, MockCtx) {
    let mut mac = DmaMac::new(cfg, schedule, tree());
    let mut ctx = MockCtx::new();
    mac.start(&mut ctx);
    (mac, ctx)
}

// ============================================================================
// Startup and slot advance
// ============================================================================

#[test]
fn startup_waits_for_notification() {
    use SlotAssignment::*;
    let t = table(vec![Node(0), Node(1)], vec![Broadcast, Node(0)]);
    let s = Schedule::new(t.clone(), t);
    let (mut mac, mut ctx) = mac_with(config(1), s);

    assert_eq!(step(&mut mac, &mut ctx), TimerKind::Startup);
    assert_eq!(ctx.timer_deadline(TimerKind::WaitNotification), Some(SimTime::ZERO));
    assert_eq!(mac.current_slot(), 0);
    assert_eq!(mac.mode(), SuperframeMode::Transient);
}

#[test]
fn notification_slot_moves_to_receive_and_advances() {
    use SlotAssignment::*;
    let t = table(vec![Node(0), Node(1)], vec![Broadcast, Node(0)]);
    let s = Schedule::new(t.clone(), t);
    let (mut mac, mut ctx) = mac_with(config(1), s);

    step_until(&mut mac, &mut ctx, TimerKind::WaitNotification);
    assert_eq!(ctx.radio_mode, RadioMode::Receiver);
    assert_eq!(mac.current_slot(), 1);
    // Next slot is this node's transmit slot, one slot duration ahead.
    assert_eq!(
        ctx.timer_deadline(TimerKind::SendData),
        Some(SimTime::from_micros(100_000))
    );
}

// ============================================================================
// Data transmission and retransmission, end to end
// ============================================================================

/// Drive a node through its transmit slot without delivering an ACK.
fn drive_to_ack_timeout(schedule: Schedule) -> (DmaMac, MockCtx) {
    let mut cfg = config(1);
    cfg.queue_length = 1;
    let (mut mac, mut ctx) = mac_with(cfg, schedule);

    step_until(&mut mac, &mut ctx, TimerKind::SendData);
    assert_eq!(ctx.radio_mode, RadioMode::Transmitter);
    assert_eq!(mac.queue_len(), 1); // the superframe's fabricated reading

    mac.handle_radio_event(RadioEvent::ModeChanged(RadioMode::Transmitter), &mut ctx);
    assert_eq!(ctx.transmitted.len(), 1);
    mac.handle_radio_event(
        RadioEvent::TransmissionStateChanged(TransmissionState::Transmitting),
        &mut ctx,
    );
    mac.handle_radio_event(
        RadioEvent::TransmissionStateChanged(TransmissionState::Idle),
        &mut ctx,
    );

    step_until(&mut mac, &mut ctx, TimerKind::WaitAck);
    step_until(&mut mac, &mut ctx, TimerKind::AckTimeout);
    (mac, ctx)
}

#[test]
fn ack_timeout_retries_when_schedule_has_another_slot() {
    use SlotAssignment::*;
    // Node 1 owns transmit slots 1 and 2: slot 2 is the retransmission window.
    let t = table(
        vec![Node(0), Node(1), Node(1), Idle],
        vec![Broadcast, Node(0), Node(0), Idle],
    );
    let s = Schedule::new(t.clone(), t);
    let (mac, _ctx) = drive_to_ack_timeout(s);

    assert_eq!(mac.stats().tx_data_failures, 1);
    assert_eq!(mac.queue_len(), 1, "head must be retained for the retry");
}

#[test]
fn ack_timeout_drops_head_when_no_slot_left() {
    use SlotAssignment::*;
    let t = table(
        vec![Node(0), Node(1), Idle, Idle],
        vec![Broadcast, Node(0), Idle, Idle],
    );
    let s = Schedule::new(t.clone(), t);
    let (mac, _ctx) = drive_to_ack_timeout(s);

    assert_eq!(mac.stats().tx_data_failures, 1);
    assert_eq!(mac.queue_len(), 0, "head must be dropped, no slot left");
}

#[test]
fn ack_reception_clears_head() {
    use SlotAssignment::*;
    let t = table(
        vec![Node(0), Node(1), Idle, Idle],
        vec![Broadcast, Node(0), Idle, Idle],
    );
    let s = Schedule::new(t.clone(), t);
    let mut cfg = config(1);
    cfg.queue_length = 1;
    let (mut mac, mut ctx) = mac_with(cfg, s);

    step_until(&mut mac, &mut ctx, TimerKind::SendData);
    mac.handle_radio_event(RadioEvent::ModeChanged(RadioMode::Transmitter), &mut ctx);
    mac.handle_radio_event(
        RadioEvent::TransmissionStateChanged(TransmissionState::Transmitting),
        &mut ctx,
    );
    mac.handle_radio_event(
        RadioEvent::TransmissionStateChanged(TransmissionState::Idle),
        &mut ctx,
    );
    step_until(&mut mac, &mut ctx, TimerKind::WaitAck);

    // The ACK races the timeout: reception starts, timeout canceled.
    mac.handle_radio_event(
        RadioEvent::ReceptionStateChanged(ReceptionState::Receiving),
        &mut ctx,
    );
    assert_eq!(ctx.timer_deadline(TimerKind::AckTimeout), None);

    mac.handle_frame(ReceivedFrame::clean(Frame::ack(addr(0), addr(1), 0)), &mut ctx);
    assert_eq!(mac.queue_len(), 0);
    assert_eq!(mac.stats().rx_acks, 1);
    assert_eq!(mac.stats().tx_data_failures, 0);
}

// ============================================================================
// Data reception
// ============================================================================

fn receive_schedule() -> Schedule {
    use SlotAssignment::*;
    let t = table(
        vec![Node(0), Node(2), Idle, Idle],
        vec![Broadcast, Node(1), Idle, Idle],
    );
    Schedule::new(t.clone(), t)
}

#[test]
fn data_for_me_is_delivered_and_acked() {
    let (mut mac, mut ctx) = mac_with(config(1), receive_schedule());
    step_until(&mut mac, &mut ctx, TimerKind::WaitData);
    assert!(ctx.timer_deadline(TimerKind::DataTimeout).is_some());

    mac.handle_radio_event(
        RadioEvent::ReceptionStateChanged(ReceptionState::Receiving),
        &mut ctx,
    );
    assert_eq!(ctx.timer_deadline(TimerKind::DataTimeout), None);

    let frame = Frame::data(addr(2), addr(1), DataKind::Sensor, 2);
    mac.handle_frame(ReceivedFrame::clean(frame.clone()), &mut ctx);
    assert_eq!(ctx.delivered, vec![frame]);
    assert_eq!(mac.stats().rx_data, 1);

    // ACK goes back to the data source.
    step_until(&mut mac, &mut ctx, TimerKind::SendAck);
    mac.handle_radio_event(RadioEvent::ModeChanged(RadioMode::Transmitter), &mut ctx);
    let (ack, _) = ctx.transmitted.last().unwrap();
    assert!(matches!(ack.payload, FramePayload::Ack { .. }));
    assert_eq!(ack.dst, addr(2));
    assert_eq!(mac.stats().tx_acks, 1);
}

#[test]
fn foreign_data_is_dropped_silently() {
    let (mut mac, mut ctx) = mac_with(config(1), receive_schedule());
    step_until(&mut mac, &mut ctx, TimerKind::WaitData);

    let frame = Frame::data(addr(2), addr(9), DataKind::Sensor, 2);
    mac.handle_frame(ReceivedFrame::clean(frame), &mut ctx);
    assert!(ctx.delivered.is_empty());
    assert_eq!(ctx.timer_deadline(TimerKind::SendAck), None);
    assert_eq!(mac.stats().rx_data, 0);
}

#[test]
fn actuator_relays_descendant_data() {
    let mut cfg = config(1);
    cfg.is_actuator = true;
    let (mut mac, mut ctx) = mac_with(cfg, receive_schedule());
    step_until(&mut mac, &mut ctx, TimerKind::WaitData);

    // Actuators fabricate no readings, so the queue starts empty.
    assert_eq!(mac.queue_len(), 0);
    let frame = Frame::data(addr(0), addr(5), DataKind::Actuator, 0);
    mac.handle_frame(ReceivedFrame::clean(frame), &mut ctx);
    assert_eq!(mac.stats().rx_actuator_data, 1);
    assert_eq!(mac.queue_len(), 1, "descendant data queued for forwarding");
    assert!(ctx.timer_deadline(TimerKind::SendAck).is_some());
}

#[test]
fn data_timeout_sleeps_radio_and_counts() {
    let (mut mac, mut ctx) = mac_with(config(1), receive_schedule());
    step_until(&mut mac, &mut ctx, TimerKind::WaitData);
    step_until(&mut mac, &mut ctx, TimerKind::DataTimeout);
    assert_eq!(ctx.radio_mode, RadioMode::Sleep);
    assert_eq!(mac.stats().timeouts, 1);
}

// ============================================================================
// Alert forwarding
// ============================================================================

/// Slot 1 receives child alerts, slot 2 transmits this node's alerts up.
fn alert_schedule() -> Schedule {
    use SlotAssignment::*;
    let t = table(
        vec![Node(0), Idle, AlertLevel(1), Idle],
        vec![Broadcast, AlertLevel(1), Idle, Idle],
    );
    Schedule::new(t.clone(), t)
}

fn drive_pending_alert(mac: &mut DmaMac, ctx: &mut MockCtx) {
    step_until(mac, ctx, TimerKind::WaitAlert);
    assert_eq!(mac.stats().alert_rx_slots, 1);
    mac.handle_frame(ReceivedFrame::clean(Frame::alert(addr(7), addr(1))), ctx);
    assert!(mac.alert_pending());
    assert_eq!(mac.stats().rx_alerts, 1);
    step_until(mac, ctx, TimerKind::ScheduleAlert);
}

#[test]
fn busy_channel_skips_alert_and_keeps_flag() {
    let (mut mac, mut ctx) = mac_with(config(1), alert_schedule());
    drive_pending_alert(&mut mac, &mut ctx);

    ctx.reception = ReceptionState::Receiving;
    step_until(&mut mac, &mut ctx, TimerKind::SendAlert);
    assert_eq!(mac.stats().skipped_alerts, 1);
    assert_ne!(ctx.radio_mode, RadioMode::Transmitter);
    assert!(mac.alert_pending(), "skipped alert must stay pending");
}

#[test]
fn idle_channel_forwards_alert_to_parent() {
    let (mut mac, mut ctx) = mac_with(config(1), alert_schedule());
    drive_pending_alert(&mut mac, &mut ctx);

    step_until(&mut mac, &mut ctx, TimerKind::SendAlert);
    assert_eq!(ctx.radio_mode, RadioMode::Transmitter);
    mac.handle_radio_event(RadioEvent::ModeChanged(RadioMode::Transmitter), &mut ctx);
    let (alert, _) = ctx.transmitted.last().unwrap();
    assert_eq!(alert.payload, FramePayload::Alert);
    assert_eq!(alert.dst, addr(0), "alert goes to the parent");
    assert_eq!(mac.stats().forwarded_alerts, 1);

    // Acted-on flags clear at the next superframe boundary.
    step_until(&mut mac, &mut ctx, TimerKind::WaitNotification);
    assert!(!mac.alert_pending());
}

#[test]
fn self_alert_originates_from_probability_draw() {
    let mut cfg = config(1);
    cfg.alert_probability = 1000; // every draw in [0,1000) qualifies
    let (mut mac, mut ctx) = mac_with(cfg, alert_schedule());

    step_until(&mut mac, &mut ctx, TimerKind::ScheduleAlert);
    step_until(&mut mac, &mut ctx, TimerKind::SendAlert);
    mac.handle_radio_event(RadioEvent::ModeChanged(RadioMode::Transmitter), &mut ctx);
    assert_eq!(mac.stats().tx_alerts, 1);
    assert_eq!(mac.stats().forwarded_alerts, 0);
}

#[test]
fn alert_for_other_parent_is_discarded() {
    let (mut mac, mut ctx) = mac_with(config(1), alert_schedule());
    step_until(&mut mac, &mut ctx, TimerKind::WaitAlert);
    mac.handle_frame(ReceivedFrame::clean(Frame::alert(addr(7), addr(3))), &mut ctx);
    assert!(!mac.alert_pending());
    assert_eq!(mac.stats().discarded_alerts, 1);
}

// ============================================================================
// Mode switch
// ============================================================================

fn switch_schedule() -> Schedule {
    use SlotAssignment::*;
    // Transient: 10 slots, notification slots at 0 and 5. Steady: 12 slots.
    let mut tx = vec![Idle; 10];
    tx[0] = Node(0);
    let mut rx = vec![Idle; 10];
    rx[0] = Broadcast;
    rx[5] = Broadcast;
    let transient = table(tx, rx);

    let mut tx = vec![Idle; 12];
    tx[0] = Node(0);
    let mut rx = vec![Idle; 12];
    rx[0] = Broadcast;
    let steady = table(tx, rx);
    Schedule::new(transient, steady)
}

#[test]
fn switch_defers_until_slot_zero() {
    let (mut mac, mut ctx) = mac_with(config(1), switch_schedule());

    // First notification slot passes without a directive.
    step_until(&mut mac, &mut ctx, TimerKind::WaitNotification);
    // Sleep to slot 5, receive the switch directive there.
    step_until(&mut mac, &mut ctx, TimerKind::WaitNotification);
    assert_eq!(mac.current_slot(), 6);
    mac.handle_frame(
        ReceivedFrame::clean(Frame::notification(addr(0), true)),
        &mut ctx,
    );

    // Slots 6..9: layout untouched.
    assert_eq!(mac.mode(), SuperframeMode::Transient);
    assert_eq!(mac.num_slots(), 10);
    step(&mut mac, &mut ctx); // sleep through to the wrap
    assert_eq!(mac.mode(), SuperframeMode::Transient);
    assert_eq!(mac.num_slots(), 10);

    // Slot 0 recurs: the swap happens.
    step_until(&mut mac, &mut ctx, TimerKind::WaitNotification);
    assert_eq!(mac.mode(), SuperframeMode::Steady);
    assert_eq!(mac.num_slots(), 12);
    assert_eq!(mac.stats().transient_to_steady, 1);
}

#[test]
fn lost_switch_in_steady_counts_failed() {
    let (mut mac, mut ctx) = mac_with(config(1), switch_schedule());

    // Reach steady mode via a legitimate switch.
    step_until(&mut mac, &mut ctx, TimerKind::WaitNotification);
    step_until(&mut mac, &mut ctx, TimerKind::WaitNotification);
    mac.handle_frame(
        ReceivedFrame::clean(Frame::notification(addr(0), true)),
        &mut ctx,
    );
    step_until(&mut mac, &mut ctx, TimerKind::WaitNotification);
    assert_eq!(mac.mode(), SuperframeMode::Steady);

    // A collision eats what might have been the next switch notification.
    mac.handle_frame(
        ReceivedFrame::corrupted(Frame::notification(addr(0), true)),
        &mut ctx,
    );
    assert_eq!(mac.stats().collisions, 1);

    // Next slot 0 with nothing pending: abandoned, counted, mode unchanged.
    step_until(&mut mac, &mut ctx, TimerKind::WaitNotification);
    assert_eq!(mac.stats().failed_switches, 1);
    assert_eq!(mac.mode(), SuperframeMode::Steady);
}

#[test]
fn steady_notification_replaces_sleep_with_wait() {
    let (mut mac, mut ctx) = mac_with(config(1), switch_schedule());

    // Into steady mode first.
    step_until(&mut mac, &mut ctx, TimerKind::WaitNotification);
    step_until(&mut mac, &mut ctx, TimerKind::WaitNotification);
    mac.handle_frame(
        ReceivedFrame::clean(Frame::notification(addr(0), true)),
        &mut ctx,
    );
    step_until(&mut mac, &mut ctx, TimerKind::WaitNotification);
    assert_eq!(mac.mode(), SuperframeMode::Steady);
    assert_eq!(mac.current_slot(), 1);

    // An emergency steady-to-transient directive arrives mid-superframe: the
    // armed sleep is replaced by a notification wait at the same deadline.
    let sleep_deadline = ctx.timer_deadline(TimerKind::Sleep).unwrap();
    mac.handle_frame(
        ReceivedFrame::clean(Frame::notification(addr(0), true)),
        &mut ctx,
    );
    assert_eq!(ctx.timer_deadline(TimerKind::Sleep), None);
    assert_eq!(
        ctx.timer_deadline(TimerKind::WaitNotification),
        Some(sleep_deadline)
    );
}

#[test]
fn alert_timeout_races_mode_switch_at_slot_zero() {
    use SlotAssignment::*;
    // 3-slot transient: notification, idle, alert receive. TDMA so the alert
    // slot arms a timeout, which then fires on the slot-0 boundary.
    let transient = table(
        vec![Node(0), Idle, Idle],
        vec![Broadcast, Idle, AlertLevel(1)],
    );
    let steady = table(
        vec![Node(0), Idle, Idle, Idle],
        vec![Broadcast, Idle, Idle, Idle],
    );
    let mut cfg = config(1);
    cfg.mac_type = MacType::Tdma;
    let (mut mac, mut ctx) = mac_with(cfg, Schedule::new(transient, steady));

    step_until(&mut mac, &mut ctx, TimerKind::WaitNotification);
    mac.handle_frame(
        ReceivedFrame::clean(Frame::notification(addr(0), true)),
        &mut ctx,
    );
    step_until(&mut mac, &mut ctx, TimerKind::WaitAlert);
    assert!(ctx.timer_deadline(TimerKind::AlertTimeout).is_some());
    assert_eq!(mac.current_slot(), 0, "alert slot wraps to the boundary");

    // The alert timeout fires first and performs the switch bookkeeping
    // before its own handling.
    step_until(&mut mac, &mut ctx, TimerKind::AlertTimeout);
    assert_eq!(mac.mode(), SuperframeMode::Steady);
    assert_eq!(mac.stats().transient_to_steady, 1);
}

// ============================================================================
// Sync and upper layer
// ============================================================================

#[test]
fn sync_frame_adopts_slot_position() {
    use SlotAssignment::*;
    let t = table(vec![Node(0), Idle, Idle], vec![Broadcast, Idle, Idle]);
    let s = Schedule::new(t.clone(), t);
    let (mut mac, mut ctx) = mac_with(config(1), s);
    step_until(&mut mac, &mut ctx, TimerKind::WaitNotification);

    let sync = Frame {
        src: addr(0),
        dst: MacAddress::BROADCAST,
        payload: FramePayload::Sync {
            slot: 2,
            num_slots: 3,
        },
    };
    mac.handle_frame(ReceivedFrame::clean(sync), &mut ctx);
    assert_eq!(mac.current_slot(), 2);
}

#[test]
fn upper_frame_overflow_drops_and_counts() {
    use SlotAssignment::*;
    let t = table(vec![Node(0), Node(1)], vec![Broadcast, Node(0)]);
    let s = Schedule::new(t.clone(), t);
    let mut cfg = config(1);
    cfg.queue_length = 2;
    let mut mac = DmaMac::new(cfg, s, tree());

    for _ in 0..3 {
        mac.handle_upper_frame(Frame::data(addr(1), addr(0), DataKind::Sensor, 1));
    }
    assert_eq!(mac.queue_len(), 2);
    assert_eq!(mac.stats().dropped_data_frames, 1);
}

#[test]
fn upper_frame_must_target_sink() {
    use SlotAssignment::*;
    let t = table(vec![Node(0), Node(1)], vec![Broadcast, Node(0)]);
    let s = Schedule::new(t.clone(), t);
    let mut mac = DmaMac::new(config(1), s, tree());

    mac.handle_upper_frame(Frame::data(addr(1), addr(9), DataKind::Sensor, 1));
    assert_eq!(mac.queue_len(), 0);
    assert_eq!(mac.stats().dropped_data_frames, 1);
}
