// DS4 -> UR10 teleoperation over RTDE.

use clap::Parser;
use log::info;
use ur10_teleop::control::Control;
use ur10_teleop::gamepad::Gamepad;
use ur10_teleop::init_logging;
use ur10_teleop::teleop::{self, TeleopConfig};

#[derive(Parser, Debug)]
#[command(name = "ur10-teleop", about = "DualShock 4 teleoperation for a UR10 arm (URSim)")]
struct Args {
    /// Robot hostname or IP, e.g. the URSim container address.
    #[arg(long, env = "UR_ROBOT_HOST")]
    robot: String,

    /// Cap on each linear velocity component, m/s.
    #[arg(long, default_value_t = 0.1)]
    max_linear: f64,

    /// Cap on each angular velocity component, rad/s.
    #[arg(long, default_value_t = 0.1)]
    max_angular: f64,

    /// Stick deadzone, fraction of full deflection.
    #[arg(long, default_value_t = 0.1)]
    deadzone: f64,

    /// Tool acceleration, m/s^2.
    #[arg(long, default_value_t = 0.2)]
    acceleration: f64,

    /// Control loop rate, Hz.
    #[arg(long, default_value_t = 125.0)]
    rate: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let args = Args::parse();

    if !(0.0..1.0).contains(&args.deadzone) {
        return Err(format!("deadzone must be in 0.0..1.0, got {}", args.deadzone).into());
    }
    if args.max_linear <= 0.0 || args.max_angular <= 0.0 || args.rate <= 0.0 {
        return Err("velocity limits and rate must be positive".into());
    }

    let config = TeleopConfig {
        deadzone: args.deadzone,
        max_linear: args.max_linear,
        max_angular: args.max_angular,
        acceleration: args.acceleration,
        rate_hz: args.rate,
        ..Default::default()
    };

    let mut gamepad = Gamepad::new()?;

    info!("Connecting to UR10 at {}...", args.robot);
    let mut control = Control::connect(&args.robot, config.acceleration).await?;

    let result = teleop::run(&mut control, &mut gamepad, &config).await;
    control.shutdown().await.ok();

    result.map_err(Into::into)
}
