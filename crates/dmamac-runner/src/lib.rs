//! Simulation runner for the DMAMAC protocol engine.
//!
//! Loads a YAML network model, instantiates one engine per node over a
//! shared broadcast channel with a sink controller, and runs the
//! discrete-event loop deterministically for a given seed.

pub mod model;
pub mod sim;

pub use dmamac_common::SimTime;
pub use model::{load_model, load_model_from_str, Model, ModelError};
pub use sim::{build_simulation, NodeSummary, SimError, Simulation, SimulationStats};
