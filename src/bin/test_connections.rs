// Reachability check for the URSim service ports. Run this before the
// teleop binary; it exits non-zero if any port is unreachable.

use clap::Parser;
use log::{error, info};
use std::process::ExitCode;
use std::time::Duration;
use ur10_teleop::init_logging;
use ur10_teleop::probe::probe_host;

#[derive(Parser, Debug)]
#[command(name = "test-connections", about = "Check reachability of the URSim service ports")]
struct Args {
    /// Robot hostname or IP, e.g. the URSim container address.
    #[arg(long, env = "UR_ROBOT_HOST")]
    robot: String,

    /// Per-port connect timeout in milliseconds.
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,
}

fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();

    info!("Probing robot ports on {}...", args.robot);
    let probes = probe_host(&args.robot, Duration::from_millis(args.timeout_ms));

    for probe in &probes {
        match &probe.result {
            Ok(()) => info!("port {:>5} ({:<9}) OK", probe.port, probe.service),
            Err(reason) => {
                error!("port {:>5} ({:<9}) FAILED: {}", probe.port, probe.service, reason);
            }
        }
    }
    let failures = probes.iter().filter(|p| !p.is_reachable()).count();

    if failures == 0 {
        info!("All ports reachable, ready for teleoperation");
        ExitCode::SUCCESS
    } else {
        error!("{} of {} ports unreachable", failures, probes.len());
        error!("Check that the URSim container is running and the robot IP is correct");
        ExitCode::FAILURE
    }
}
