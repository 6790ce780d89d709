//! Static forwarding tree.
//!
//! The tree is loaded once from the model descriptor and read-only for the
//! lifetime of the node: parent for upward alert/data forwarding, and per
//! next-hop lists of reachable descendants so actuator relays can tell which
//! downward frames concern their subtree.

use dmamac_common::MacAddress;
use serde::{Deserialize, Serialize};

/// Descendants reachable through one child.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownstreamBranch {
    /// The child this branch routes through.
    pub next_hop: MacAddress,
    /// Every node in the child's subtree, including the child itself.
    pub reachable: Vec<MacAddress>,
}

/// This node's slice of the static forwarding tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardingTree {
    /// Upward next hop; `None` only for the sink.
    pub parent: Option<MacAddress>,
    /// Downward branches, one per child.
    pub branches: Vec<DownstreamBranch>,
}

impl ForwardingTree {
    /// A leaf with no children.
    pub fn leaf(parent: MacAddress) -> Self {
        ForwardingTree {
            parent: Some(parent),
            branches: Vec::new(),
        }
    }

    /// Whether `addr` lies somewhere below this node.
    pub fn is_descendant(&self, addr: MacAddress) -> bool {
        self.branches
            .iter()
            .any(|b| b.reachable.contains(&addr))
    }

    /// The child to forward through to reach `addr`, if any.
    pub fn next_hop_for(&self, addr: MacAddress) -> Option<MacAddress> {
        self.branches
            .iter()
            .find(|b| b.reachable.contains(&addr))
            .map(|b| b.next_hop)
    }

    pub fn has_children(&self) -> bool {
        !self.branches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(n: u16) -> MacAddress {
        MacAddress::new(n)
    }

    #[test]
    fn descendant_lookup() {
        let tree = ForwardingTree {
            parent: Some(a(0)),
            branches: vec![
                DownstreamBranch {
                    next_hop: a(3),
                    reachable: vec![a(3), a(5), a(6)],
                },
                DownstreamBranch {
                    next_hop: a(4),
                    reachable: vec![a(4)],
                },
            ],
        };
        assert!(tree.is_descendant(a(5)));
        assert!(tree.is_descendant(a(4)));
        assert!(!tree.is_descendant(a(9)));
        assert_eq!(tree.next_hop_for(a(6)), Some(a(3)));
        assert_eq!(tree.next_hop_for(a(4)), Some(a(4)));
        assert_eq!(tree.next_hop_for(a(9)), None);
    }

    #[test]
    fn leaf_has_no_children() {
        let tree = ForwardingTree::leaf(a(1));
        assert!(!tree.has_children());
        assert!(!tree.is_descendant(a(1)));
        assert_eq!(tree.parent, Some(a(1)));
    }
}
