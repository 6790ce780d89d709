//! MAC frame set.
//!
//! Five frame kinds travel over the air:
//!
//! - **Data**: sensor readings headed to the sink, or actuator commands headed
//!   down the tree. 44 bytes on air.
//! - **Ack**: per-slot acknowledgement of a data frame. 11 bytes.
//! - **Notification**: broadcast from the sink at superframe boundaries,
//!   carrying the switch-superframe directive. 11 bytes.
//! - **Alert**: urgent event relayed hop by hop toward the sink. 11 bytes.
//! - **Sync**: slot/slot-count resynchronization hint for late joiners.
//!
//! Frame encoding/decoding to a physical byte format is out of scope; the
//! simulated channel delivers `Frame` values directly, with a bit-error flag
//! standing in for collision/corruption detection by the PHY.

use crate::address::MacAddress;
use serde::{Deserialize, Serialize};

/// On-air length of a data frame, bytes.
pub const DATA_FRAME_BYTES: u32 = 44;
/// On-air length of an ack frame, bytes.
pub const ACK_FRAME_BYTES: u32 = 11;
/// On-air length of an alert frame, bytes.
pub const ALERT_FRAME_BYTES: u32 = 11;
/// On-air length of a notification frame, bytes.
pub const NOTIFICATION_FRAME_BYTES: u32 = 11;

/// Distinguishes upward sensor data from downward actuator commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataKind {
    /// Sensor reading, routed up the tree to the sink.
    Sensor,
    /// Actuator command, routed down the tree to a descendant.
    Actuator,
}

/// Kind-specific frame contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FramePayload {
    Data {
        kind: DataKind,
        /// Transmit slot owned by the originating node.
        source_slot: u16,
    },
    Ack {
        /// Transmit slot owned by the acknowledging node.
        source_slot: u16,
    },
    Notification {
        /// Sink directive: switch superframe layout at the next boundary.
        change_mode: bool,
    },
    Alert,
    Sync {
        /// Slot index the network is currently in.
        slot: u16,
        /// Active superframe slot count.
        num_slots: u16,
    },
}

impl FramePayload {
    /// Short tag for logging.
    pub fn kind_str(&self) -> &'static str {
        match self {
            FramePayload::Data { .. } => "data",
            FramePayload::Ack { .. } => "ack",
            FramePayload::Notification { .. } => "notification",
            FramePayload::Alert => "alert",
            FramePayload::Sync { .. } => "sync",
        }
    }
}

/// A MAC frame as it travels between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub src: MacAddress,
    pub dst: MacAddress,
    pub payload: FramePayload,
}

impl Frame {
    pub fn data(src: MacAddress, dst: MacAddress, kind: DataKind, source_slot: u16) -> Self {
        Frame {
            src,
            dst,
            payload: FramePayload::Data { kind, source_slot },
        }
    }

    pub fn ack(src: MacAddress, dst: MacAddress, source_slot: u16) -> Self {
        Frame {
            src,
            dst,
            payload: FramePayload::Ack { source_slot },
        }
    }

    pub fn notification(src: MacAddress, change_mode: bool) -> Self {
        Frame {
            src,
            dst: MacAddress::BROADCAST,
            payload: FramePayload::Notification { change_mode },
        }
    }

    pub fn alert(src: MacAddress, dst: MacAddress) -> Self {
        Frame {
            src,
            dst,
            payload: FramePayload::Alert,
        }
    }

    /// On-air length in bytes, used for transmit duration computation.
    pub fn byte_length(&self) -> u32 {
        match self.payload {
            FramePayload::Data { .. } => DATA_FRAME_BYTES,
            FramePayload::Ack { .. } => ACK_FRAME_BYTES,
            FramePayload::Notification { .. } => NOTIFICATION_FRAME_BYTES,
            FramePayload::Alert => ALERT_FRAME_BYTES,
            FramePayload::Sync { .. } => NOTIFICATION_FRAME_BYTES,
        }
    }

    /// On-air length in bits.
    pub fn bit_length(&self) -> u32 {
        self.byte_length() * 8
    }
}

/// A frame as delivered to a receiver, with PHY-level reception status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    pub frame: Frame,
    /// Set when a collision or bit error corrupted the reception. The frame
    /// contents must not be trusted when this is set.
    pub bit_error: bool,
}

impl ReceivedFrame {
    pub fn clean(frame: Frame) -> Self {
        ReceivedFrame {
            frame,
            bit_error: false,
        }
    }

    pub fn corrupted(frame: Frame) -> Self {
        ReceivedFrame {
            frame,
            bit_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_air_lengths() {
        let a = MacAddress::new(1);
        let b = MacAddress::new(2);
        assert_eq!(Frame::data(a, b, DataKind::Sensor, 1).byte_length(), 44);
        assert_eq!(Frame::ack(a, b, 1).byte_length(), 11);
        assert_eq!(Frame::alert(a, b).byte_length(), 11);
        assert_eq!(Frame::notification(a, true).byte_length(), 11);
    }

    #[test]
    fn notification_is_broadcast() {
        let n = Frame::notification(MacAddress::new(0), false);
        assert!(n.dst.is_broadcast());
    }
}
