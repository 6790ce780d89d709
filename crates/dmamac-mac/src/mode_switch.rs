//! Deferred superframe-mode switching.
//!
//! The sink authorizes a layout switch through its notification broadcast.
//! Every node defers the actual swap to the next slot-0 boundary (or, inside
//! the steady superframe's repeated transient-width sections, to the next
//! multiple of the transient slot count), so the whole network changes
//! layout at the same relative point.
//!
//! A switch can be lost on the air: a collision eats the notification and
//! the node only sees a corrupted frame. The `expect_switch` flag records
//! that suspicion; if slot 0 arrives with the suspicion still standing and
//! no switch pending, the attempt is abandoned and counted as failed, never
//! silently retried mid-superframe. There is no timeout on the deferral
//! itself.

/// Outcome of the slot-boundary check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// Nothing pending, nothing suspected.
    Idle,
    /// A pending switch is due at this boundary; the caller swaps the layout.
    Apply,
    /// A suspected switch never materialized; counted as failed.
    Failed,
}

/// Pending-switch state, owned by the state machine.
#[derive(Debug, Default)]
pub struct ModeSwitch {
    pending: bool,
    expect_switch: bool,
}

impl ModeSwitch {
    pub fn new() -> Self {
        ModeSwitch::default()
    }

    /// Record a sink directive. Idempotent.
    pub fn request_switch(&mut self) {
        self.pending = true;
    }

    /// Record that a corrupted frame may have hidden a switch notification.
    pub fn suspect_lost_switch(&mut self) {
        self.expect_switch = true;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Evaluate the boundary at `current_slot`.
    ///
    /// `boundary_width` is the transient slot count; slot 0 and its
    /// multiples inside the steady superframe are legal switch points.
    /// Calling this with nothing pending is a no-op returning
    /// [`SwitchOutcome::Idle`].
    pub fn apply_if_due(&mut self, current_slot: u16, boundary_width: u16) -> SwitchOutcome {
        let at_boundary =
            current_slot == 0 || (boundary_width > 0 && current_slot % boundary_width == 0);
        if !at_boundary {
            return SwitchOutcome::Idle;
        }
        if current_slot == 0 && self.expect_switch {
            self.expect_switch = false;
            if !self.pending {
                return SwitchOutcome::Failed;
            }
        }
        if self.pending {
            self.pending = false;
            return SwitchOutcome::Apply;
        }
        SwitchOutcome::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_pending_is_noop() {
        let mut ms = ModeSwitch::new();
        assert_eq!(ms.apply_if_due(0, 4), SwitchOutcome::Idle);
        assert_eq!(ms.apply_if_due(0, 4), SwitchOutcome::Idle);
    }

    #[test]
    fn switch_defers_to_slot_zero() {
        let mut ms = ModeSwitch::new();
        ms.request_switch();
        for slot in [5, 6, 7, 9] {
            assert_eq!(ms.apply_if_due(slot, 10), SwitchOutcome::Idle);
            assert!(ms.is_pending());
        }
        assert_eq!(ms.apply_if_due(0, 10), SwitchOutcome::Apply);
        assert!(!ms.is_pending());
    }

    #[test]
    fn switch_applies_at_transient_width_boundary() {
        let mut ms = ModeSwitch::new();
        ms.request_switch();
        assert_eq!(ms.apply_if_due(3, 4), SwitchOutcome::Idle);
        assert_eq!(ms.apply_if_due(8, 4), SwitchOutcome::Apply);
    }

    #[test]
    fn lost_switch_counts_as_failed_once() {
        let mut ms = ModeSwitch::new();
        ms.suspect_lost_switch();
        // Mid-superframe boundaries do not resolve the suspicion.
        assert_eq!(ms.apply_if_due(4, 4), SwitchOutcome::Idle);
        assert_eq!(ms.apply_if_due(0, 4), SwitchOutcome::Failed);
        // Resolved; the next superframe is clean.
        assert_eq!(ms.apply_if_due(0, 4), SwitchOutcome::Idle);
    }

    #[test]
    fn suspicion_with_pending_switch_is_not_a_failure() {
        let mut ms = ModeSwitch::new();
        ms.suspect_lost_switch();
        ms.request_switch();
        assert_eq!(ms.apply_if_due(0, 4), SwitchOutcome::Apply);
    }
}
