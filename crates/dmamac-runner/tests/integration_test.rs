//! End-to-end runs over the line-network model: data collection, the
//! quiet-network switch to the steady layout, and alert-driven switches back.

use std::path::Path;

use dmamac_runner::{build_simulation, load_model, load_model_from_str, NodeSummary, SimTime};

fn summary<'a>(nodes: &'a [NodeSummary], name: &str) -> &'a NodeSummary {
    nodes
        .iter()
        .find(|n| n.name == name)
        .unwrap_or_else(|| panic!("no node named {name}"))
}

#[test]
fn data_flows_up_the_line() {
    let model = load_model(Path::new("tests/line_network.yaml")).expect("model must load");
    let mut sim = build_simulation(&model, 7).expect("simulation must build");
    let stats = sim.run(SimTime::from_secs(30.0)).expect("run must complete");
    let nodes = sim.node_summaries();

    assert!(stats.total_events > 0);
    assert!(stats.frames_transmitted > 0);
    assert_eq!(stats.frames_lost, 0, "lossless channel must lose nothing");
    assert!(
        stats.data_at_sink > 0,
        "sensor readings must reach the sink: {stats:?}"
    );

    // The relay sits between both leaves and the sink, so it must have
    // accepted data for forwarding and acknowledged it.
    let relay = summary(&nodes, "relay");
    assert!(relay.stats.rx_data > 0);
    assert!(relay.stats.tx_acks > 0);
    assert!(relay.stats.tx_data > relay.stats.rx_data / 2);

    let leaf = summary(&nodes, "leaf-a");
    assert!(leaf.stats.tx_data > 0);
    assert!(leaf.stats.rx_acks > 0);
    assert_eq!(leaf.stats.tx_data_failures, 0);
}

#[test]
fn quiet_network_settles_into_steady() {
    let model = load_model(Path::new("tests/line_network.yaml")).expect("model must load");
    let mut sim = build_simulation(&model, 7).expect("simulation must build");
    let stats = sim.run(SimTime::from_secs(30.0)).expect("run must complete");
    let nodes = sim.node_summaries();

    // alert_probability is zero, so the sink commands exactly one switch to
    // the steady layout and the network never leaves it again.
    assert_eq!(stats.alerts_at_sink, 0);
    for node in &nodes {
        assert_eq!(node.stats.transient_to_steady, 1, "node {}", node.name);
        assert_eq!(node.stats.steady_to_transient, 0, "node {}", node.name);
        assert_eq!(node.stats.failed_switches, 0, "node {}", node.name);
        assert!(node.stats.steady_superframes > 0, "node {}", node.name);
        assert!(node.stats.transient_superframes > 0, "node {}", node.name);
    }
}

#[test]
fn scheduled_slots_keep_the_channel_collision_free() {
    // Lossless and alert-free, every transmission sits alone in its slot:
    // no listening radio may ever see two frames overlap. A nonzero count
    // here means some station transmitted or listened out of turn.
    let model = load_model(Path::new("tests/line_network.yaml")).expect("model must load");
    let mut sim = build_simulation(&model, 7).expect("simulation must build");
    let stats = sim.run(SimTime::from_secs(60.0)).expect("run must complete");
    let nodes = sim.node_summaries();

    assert_eq!(stats.frames_collided, 0, "{stats:?}");
    for node in &nodes {
        assert_eq!(node.stats.collisions, 0, "node {}", node.name);
    }
}

/// Lossless line network where every alert slot raises an alert, so the
/// steady phase keeps getting interrupted by alert traffic.
const ALERTING_LINE: &str = r#"
name: alerting-line
mac:
  type: hybrid
  slot_duration_us: 100000
  bitrate: 250000
  queue_length: 4
  ack_timeout_us: 20000
  data_timeout_us: 20000
  alert_timeout_us: 20000
  alert_probability: 1000
  alert_delay_max: 30
channel:
  loss: 0.0
sink:
  address: 0
  steady_after_quiet: 2
superframes:
  transient:
    transmit: [node:0, node:2, node:3, node:1, node:1, node:1]
    receive: [broadcast, node:1, node:1, node:0, node:0, node:0]
  steady:
    transmit: [node:0, node:2, node:3, node:1, node:1, node:1, idle, alert:2, alert:1, idle, idle, idle]
    receive: [broadcast, node:1, node:1, node:0, node:0, node:0, broadcast, alert:1, alert:0, idle, idle, idle]
nodes:
  - name: relay
    address: 1
    kind: sensor
    parent: 0
    alert_level: 1
    has_sensor_child: true
    branches:
      - next_hop: 2
        reachable: [2]
      - next_hop: 3
        reachable: [3]
  - name: leaf-a
    address: 2
    kind: sensor
    parent: 1
    alert_level: 2
  - name: leaf-b
    address: 3
    kind: sensor
    parent: 1
    alert_level: 2
"#;

#[test]
fn alerts_propagate_and_revert_the_layout() {
    let model = load_model_from_str(ALERTING_LINE).expect("model must load");
    let mut sim = build_simulation(&model, 3).expect("simulation must build");
    let stats = sim.run(SimTime::from_secs(120.0)).expect("run must complete");
    let nodes = sim.node_summaries();

    assert!(
        stats.alerts_at_sink > 0,
        "alerts must reach the sink: {stats:?}"
    );
    // Still collecting data throughout.
    assert!(stats.data_at_sink > 0);

    // Leaf alerts travel up through the relay.
    let relay = summary(&nodes, "relay");
    assert!(relay.stats.rx_alerts > 0);
    assert!(relay.stats.forwarded_alerts > 0);

    let leaf_alerts: u64 = [summary(&nodes, "leaf-a"), summary(&nodes, "leaf-b")]
        .iter()
        .map(|n| n.stats.tx_alerts)
        .sum();
    assert!(leaf_alerts > 0);

    // Each alert that reaches the sink during the steady phase commands a
    // switch back to the transient layout.
    for node in &nodes {
        assert!(node.stats.transient_to_steady >= 1, "node {}", node.name);
        assert!(node.stats.steady_to_transient >= 1, "node {}", node.name);
    }
}

#[test]
fn summaries_cover_every_node() {
    let model = load_model(Path::new("tests/line_network.yaml")).expect("model must load");
    let mut sim = build_simulation(&model, 1).expect("simulation must build");
    sim.run(SimTime::from_secs(5.0)).expect("run must complete");
    let nodes = sim.node_summaries();

    assert_eq!(nodes.len(), 3);
    let relay = summary(&nodes, "relay");
    assert_eq!(relay.address, 1);
    assert_eq!(relay.node_type, "sensor");
}
