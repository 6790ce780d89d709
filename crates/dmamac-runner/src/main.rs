//! `dmamac` command line entry point.

use clap::Parser;
use dmamac_metrics::{describe_metrics, emit_stats, NodeLabels};
use dmamac_runner::{build_simulation, load_model, SimTime};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Simulate a DMAMAC sensor/actuator network.
#[derive(Debug, Parser)]
#[command(name = "dmamac", version, about)]
struct Args {
    /// Path to the YAML network model.
    model: PathBuf,

    /// Network-wide seed for the protocol and channel RNGs.
    #[arg(long, default_value_t = 1)]
    seed: i32,

    /// Simulated duration in seconds.
    #[arg(long, default_value_t = 60.0)]
    duration: f64,

    /// Log filter (overrides RUST_LOG), e.g. "info" or "dmamac_mac=trace".
    #[arg(long)]
    log: Option<String>,

    /// Print run and per-node stats as JSON instead of the text summary.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = match &args.log {
        Some(spec) => EnvFilter::new(spec),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    describe_metrics();

    let model = load_model(&args.model)?;
    info!(
        network = %model.name,
        nodes = model.nodes.len(),
        seed = args.seed,
        duration_secs = args.duration,
        "starting run"
    );

    let mut simulation = build_simulation(&model, args.seed)?;
    let stats = simulation.run(SimTime::from_secs(args.duration))?;
    let summaries = simulation.node_summaries();

    for summary in &summaries {
        emit_stats(
            &NodeLabels::new(summary.name.clone(), summary.node_type.clone()),
            &summary.stats,
        );
    }

    if args.json {
        let output = serde_json::json!({
            "run": stats,
            "nodes": summaries,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("run: {}", model.name);
    println!("  events:        {}", stats.total_events);
    println!("  transmitted:   {}", stats.frames_transmitted);
    println!("  delivered:     {}", stats.frames_delivered);
    println!("  lost:          {}", stats.frames_lost);
    println!("  collided:      {}", stats.frames_collided);
    println!("  data at sink:  {}", stats.data_at_sink);
    println!("  alerts at sink:{}", stats.alerts_at_sink);
    for summary in &summaries {
        let s = &summary.stats;
        println!(
            "node {} ({}): tx {} / acked {} / failed {} / alerts fwd {} / sleep slots {}",
            summary.name,
            summary.node_type,
            s.tx_data,
            s.rx_acks,
            s.tx_data_failures,
            s.forwarded_alerts,
            s.sleep_slots
        );
    }
    Ok(())
}
