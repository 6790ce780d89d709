//! Node addressing.
//!
//! DMAMAC networks are small (tens of nodes) and statically configured, so a
//! 16-bit short address is enough. Address `n` owns transmit slot `n` in the
//! slot tables, which is why the schedule code also treats addresses as slot
//! owner identities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 16-bit node short address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacAddress(u16);

impl MacAddress {
    /// The all-ones broadcast address.
    pub const BROADCAST: MacAddress = MacAddress(u16::MAX);

    pub const fn new(addr: u16) -> Self {
        MacAddress(addr)
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == MacAddress::BROADCAST
    }
}

impl From<u16> for MacAddress {
    fn from(addr: u16) -> Self {
        MacAddress(addr)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_broadcast() {
            write!(f, "node:*")
        } else {
            write!(f, "node:{}", self.0)
        }
    }
}
