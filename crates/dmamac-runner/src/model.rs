//! Network model loading from YAML.
//!
//! A model file describes one network: the shared MAC parameters, the two
//! superframe layouts, the channel characteristics, the sink, and the node
//! roster with its forwarding tree. Slot assignments are written as compact
//! strings (`idle`, `broadcast`, `node:3`, `alert:1`) and parsed into the
//! engine's [`SlotAssignment`] type during validation.

use dmamac_common::{MacAddress, SimTime};
use dmamac_mac::{
    DownstreamBranch, ForwardingTree, MacConfig, MacType, Schedule, ScheduleError,
    SlotAssignment, SlotTable, SuperframeMode,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading or validating a model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unknown slot assignment {0:?} (expected idle, broadcast, node:N or alert:L)")]
    BadSlot(String),

    #[error("node {name:?}: {reason}")]
    BadNode { name: String, reason: String },

    #[error("duplicate node address {0}")]
    DuplicateAddress(u16),

    #[error("node address {0} collides with the sink")]
    AddressIsSink(u16),

    #[error("model has no nodes")]
    NoNodes,

    #[error("steady superframe length {steady} is not a multiple of the transient length {transient}")]
    SteadyNotMultiple { steady: u16, transient: u16 },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

// ============================================================================
// YAML schema
// ============================================================================

/// Root of a model file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Model {
    /// Human-readable network name, for logs.
    pub name: String,
    pub mac: MacParams,
    #[serde(default)]
    pub channel: ChannelParams,
    pub sink: SinkParams,
    pub superframes: SuperframeSpec,
    pub nodes: Vec<NodeSpec>,
}

/// MAC parameters shared by every node.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MacParams {
    #[serde(rename = "type")]
    pub mac_type: MacType,
    pub slot_duration_us: u64,
    pub bitrate: f64,
    pub queue_length: usize,
    pub ack_timeout_us: u64,
    pub data_timeout_us: u64,
    pub alert_timeout_us: u64,
    /// Self-alert threshold against a uniform draw in [0, 1000).
    #[serde(default)]
    pub alert_probability: i32,
    /// Bound on the hybrid alert jitter draw.
    #[serde(default = "default_alert_delay_max")]
    pub alert_delay_max: i32,
    #[serde(default)]
    pub channel_hopping: bool,
    #[serde(default = "default_initial_channel")]
    pub initial_channel: u8,
}

fn default_alert_delay_max() -> i32 {
    1
}

fn default_initial_channel() -> u8 {
    11
}

/// Channel characteristics.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelParams {
    /// Independent per-link loss probability in [0, 1].
    #[serde(default)]
    pub loss: f64,
}

impl Default for ChannelParams {
    fn default() -> Self {
        ChannelParams { loss: 0.0 }
    }
}

/// Sink configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SinkParams {
    pub address: u16,
    /// Quiet transient superframes before the sink commands steady mode.
    #[serde(default = "default_steady_after_quiet")]
    pub steady_after_quiet: u32,
}

fn default_steady_after_quiet() -> u32 {
    2
}

/// The two superframe layouts, slot assignments as strings.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuperframeSpec {
    pub transient: TableSpec,
    pub steady: TableSpec,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableSpec {
    pub transmit: Vec<String>,
    pub receive: Vec<String>,
}

/// One node of the roster.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSpec {
    pub name: String,
    /// Short address; also the node's transmit slot number.
    pub address: u16,
    pub kind: NodeKind,
    /// Next hop toward the sink.
    pub parent: u16,
    /// Depth level in the forwarding tree, matched against alert slots.
    pub alert_level: u8,
    #[serde(default)]
    pub has_sensor_child: bool,
    /// Downstream branches; empty for leaves.
    #[serde(default)]
    pub branches: Vec<BranchSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Sensor,
    Actuator,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Sensor => "sensor",
            NodeKind::Actuator => "actuator",
        }
    }
}

/// A downstream branch of the forwarding tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BranchSpec {
    /// Child this branch goes through.
    pub next_hop: u16,
    /// Every address reachable through that child, the child included.
    pub reachable: Vec<u16>,
}

// ============================================================================
// Loading and validation
// ============================================================================

/// Load and validate a model from a YAML file.
pub fn load_model(path: &Path) -> Result<Model, ModelError> {
    let text = std::fs::read_to_string(path)?;
    load_model_from_str(&text)
}

/// Load and validate a model from YAML text.
pub fn load_model_from_str(text: &str) -> Result<Model, ModelError> {
    let model: Model = serde_yaml::from_str(text)?;
    model.validate()?;
    Ok(model)
}

impl Model {
    fn validate(&self) -> Result<(), ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::NoNodes);
        }

        // Parsing the tables catches malformed slot strings and length
        // mismatches up front.
        let schedule = self.schedule()?;

        // The sink broadcasts its notification every transient-length worth
        // of slots, so the steady layout must tile into that cadence.
        let transient = schedule.alert_phase_start();
        let steady = schedule.num_slots(SuperframeMode::Steady);
        if transient == 0 || steady % transient != 0 {
            return Err(ModelError::SteadyNotMultiple { steady, transient });
        }

        let mut seen = HashSet::new();
        let addresses: HashSet<u16> = self.nodes.iter().map(|n| n.address).collect();
        for node in &self.nodes {
            if node.address == self.sink.address {
                return Err(ModelError::AddressIsSink(node.address));
            }
            if !seen.insert(node.address) {
                return Err(ModelError::DuplicateAddress(node.address));
            }
            if node.parent != self.sink.address && !addresses.contains(&node.parent) {
                return Err(ModelError::BadNode {
                    name: node.name.clone(),
                    reason: format!("parent {} is not in the roster", node.parent),
                });
            }
            for branch in &node.branches {
                if !addresses.contains(&branch.next_hop) {
                    return Err(ModelError::BadNode {
                        name: node.name.clone(),
                        reason: format!("branch next hop {} is not in the roster", branch.next_hop),
                    });
                }
                if !branch.reachable.contains(&branch.next_hop) {
                    return Err(ModelError::BadNode {
                        name: node.name.clone(),
                        reason: format!(
                            "branch through {} does not list it as reachable",
                            branch.next_hop
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Parse the superframe tables into a bounds-checked [`Schedule`].
    pub fn schedule(&self) -> Result<Schedule, ModelError> {
        let transient = parse_table(&self.superframes.transient)?;
        let steady = parse_table(&self.superframes.steady)?;
        Ok(Schedule::new(transient, steady))
    }

    /// MAC configuration for one node of the roster.
    pub fn mac_config(&self, node: &NodeSpec, seed: i32) -> MacConfig {
        MacConfig {
            address: MacAddress::new(node.address),
            sink_address: MacAddress::new(self.sink.address),
            mac_type: self.mac.mac_type,
            slot_duration: SimTime::from_micros(self.mac.slot_duration_us),
            bitrate: self.mac.bitrate,
            queue_length: self.mac.queue_length,
            ack_timeout: SimTime::from_micros(self.mac.ack_timeout_us),
            data_timeout: SimTime::from_micros(self.mac.data_timeout_us),
            alert_timeout: SimTime::from_micros(self.mac.alert_timeout_us),
            alert_probability: self.mac.alert_probability,
            alert_delay_max: self.mac.alert_delay_max,
            is_actuator: node.kind == NodeKind::Actuator,
            has_sensor_child: node.has_sensor_child,
            alert_level: node.alert_level,
            seed,
            channel_hopping: self.mac.channel_hopping,
            initial_channel: self.mac.initial_channel,
        }
    }

    /// Forwarding tree for one node of the roster.
    pub fn forwarding_tree(&self, node: &NodeSpec) -> ForwardingTree {
        ForwardingTree {
            parent: Some(MacAddress::new(node.parent)),
            branches: node
                .branches
                .iter()
                .map(|b| DownstreamBranch {
                    next_hop: MacAddress::new(b.next_hop),
                    reachable: b.reachable.iter().copied().map(MacAddress::new).collect(),
                })
                .collect(),
        }
    }
}

fn parse_table(spec: &TableSpec) -> Result<SlotTable, ModelError> {
    let transmit = spec
        .transmit
        .iter()
        .map(|s| parse_slot(s))
        .collect::<Result<Vec<_>, _>>()?;
    let receive = spec
        .receive
        .iter()
        .map(|s| parse_slot(s))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SlotTable::new(transmit, receive)?)
}

fn parse_slot(s: &str) -> Result<SlotAssignment, ModelError> {
    match s {
        "idle" => return Ok(SlotAssignment::Idle),
        "broadcast" => return Ok(SlotAssignment::Broadcast),
        _ => {}
    }
    if let Some(n) = s.strip_prefix("node:") {
        let n = n.parse().map_err(|_| ModelError::BadSlot(s.to_string()))?;
        return Ok(SlotAssignment::Node(n));
    }
    if let Some(l) = s.strip_prefix("alert:") {
        let l = l.parse().map_err(|_| ModelError::BadSlot(s.to_string()))?;
        return Ok(SlotAssignment::AlertLevel(l));
    }
    Err(ModelError::BadSlot(s.to_string()))
}
