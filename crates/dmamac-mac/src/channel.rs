//! IEEE 802.15.4 2.4 GHz channel plan and per-superframe hopping.
//!
//! Channels 11..=26 sit on a 5 MHz raster starting at 2405 MHz, 2 MHz wide.
//! At each superframe boundary every node draws the next channel from its
//! protocol RNG; identically seeded nodes land on the same channel without
//! any over-the-air coordination.

use crate::rng::MotherRng;

/// Lowest valid channel number.
pub const CHANNEL_MIN: u8 = 11;
/// Highest valid channel number.
pub const CHANNEL_MAX: u8 = 26;
/// Hopping only uses the bottom of the band.
pub const HOP_CHANNEL_MAX: u8 = 16;

/// Centre frequency of a channel in Hz, or `None` if out of range.
pub fn carrier_frequency(channel: u8) -> Option<f64> {
    if !(CHANNEL_MIN..=CHANNEL_MAX).contains(&channel) {
        return None;
    }
    Some((2405.0 + 5.0 * f64::from(channel - CHANNEL_MIN)) * 1e6)
}

/// Channel bandwidth in Hz, or `None` if out of range.
pub fn bandwidth(channel: u8) -> Option<f64> {
    if !(CHANNEL_MIN..=CHANNEL_MAX).contains(&channel) {
        return None;
    }
    Some(2e6)
}

/// Draw the channel for the next superframe from the protocol RNG.
pub fn next_hop_channel(rng: &mut MotherRng) -> u8 {
    rng.uniform_int(i32::from(CHANNEL_MIN), i32::from(HOP_CHANNEL_MAX)) as u8
}

/// Draw the channel a peer will hop to from its advertised RNG state.
pub fn hop_channel_from(state: &[u32; 5]) -> u8 {
    MotherRng::uniform_int_from(i32::from(CHANNEL_MIN), i32::from(HOP_CHANNEL_MAX), state) as u8
}
