//! scenario-runner: load a map and a scenario, serve RPC, run to completion
//!
//! Exit codes: 0 on normal scenario completion, 1 on load errors, 2 on a
//! fatal runtime error during evaluation.

use clap::Parser;
use scenario_simulator_rs::rpc::server::{request_channel, RpcServer};
use scenario_simulator_rs::{Interpreter, LaneletMap, RunOutcome};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "scenario-runner",
    about = "OpenSCENARIO interpreter and traffic simulator"
)]
struct Args {
    /// OpenSCENARIO file to execute
    #[arg(long)]
    scenario: PathBuf,

    /// Lanelet network file (JSON) produced by the map provider
    #[arg(long)]
    map: PathBuf,

    /// RPC port for external controllers
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Simulation-time seconds per wall-clock second
    #[arg(long, default_value_t = 1.0)]
    realtime_factor: f64,

    /// Simulation step, in seconds
    #[arg(long, default_value_t = 0.05)]
    step_time: f64,

    /// Log filter (tracing EnvFilter syntax)
    #[arg(long, default_value = "info")]
    log_filter: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log_filter))
        .init();

    let map = match LaneletMap::load_json_file(&args.map) {
        Ok(map) => Arc::new(map),
        Err(e) => {
            tracing::error!(error = %e, "map load failed");
            return ExitCode::from(1);
        }
    };
    let mut interpreter = match Interpreter::load(&args.scenario, map) {
        Ok(interpreter) => interpreter,
        Err(e) => {
            tracing::error!(error = %e, "scenario load failed");
            return ExitCode::from(1);
        }
    };
    interpreter
        .simulator
        .clock
        .initialize(args.realtime_factor, args.step_time);

    let (queue_tx, queue_rx) = request_channel();
    let server = match RpcServer::spawn_tcp(args.port, queue_tx) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "rpc server start failed");
            return ExitCode::from(1);
        }
    };

    let shutdown = AtomicBool::new(false);
    let outcome = interpreter.run(Some(&queue_rx), &shutdown);
    server.shutdown();
    match outcome {
        Ok(RunOutcome::ScenarioComplete) | Ok(RunOutcome::Interrupted) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "scenario evaluation failed");
            ExitCode::from(2)
        }
    }
}
