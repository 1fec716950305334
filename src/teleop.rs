// DS4 -> Cartesian velocity mapping and the fixed-rate teleop loop.
//
// Mapping (base frame, X forward / Y left / Z up):
//   Left stick   X-Y translation (stick forward is +X, stick right is -Y)
//   L1 / L2      Z up / down
//   Right stick  roll / pitch
//   R1 / R2      yaw CCW / CW
//   Triangle     movej to the home pose
//   Square       stop and exit
//   Options      exit

use crate::control::Control;
use crate::gamepad::{Gamepad, PadRequest};
use crate::rtde::RTDEError;
use log::{error, info, warn};
use nalgebra::Vector3;
use tokio::signal;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Commands with every component below this are sent as an explicit stop.
const MIN_COMMAND: f64 = 1e-3;

/// Consecutive transmission failures tolerated before the loop bails out.
const MAX_SEND_FAILURES: u32 = 3;

/// Counter of consecutive transmission failures; a success resets it.
#[derive(Debug, Default)]
struct SendFailures(u32);

impl SendFailures {
    fn success(&mut self) {
        self.0 = 0;
    }

    /// Record one failure. Returns true once the budget is exhausted.
    fn failure(&mut self) -> bool {
        self.0 += 1;
        self.0 >= MAX_SEND_FAILURES
    }

    fn count(&self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct TeleopConfig {
    /// Stick deadzone, fraction of full deflection.
    pub deadzone: f64,
    /// Cap on each linear velocity component, m/s.
    pub max_linear: f64,
    /// Cap on each angular velocity component, rad/s.
    pub max_angular: f64,
    /// Tool acceleration passed to speedl, m/s^2.
    pub acceleration: f64,
    /// Loop rate, Hz.
    pub rate_hz: f64,
    /// Home joint pose for the Triangle button, rad.
    pub home_q: [f64; 6],
}

impl Default for TeleopConfig {
    fn default() -> Self {
        Self {
            deadzone: 0.1,
            max_linear: 0.1,
            max_angular: 0.1,
            acceleration: 0.2,
            rate_hz: 125.0,
            home_q: [-1.57, -1.57, -1.57, -1.57, 1.57, 0.0],
        }
    }
}

/// Controller snapshot, refreshed as events drain each tick. Sticks are in
/// -1.0..1.0, triggers in 0.0..1.0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PadState {
    pub left_x: f64,
    pub left_y: f64,
    pub right_x: f64,
    pub right_y: f64,
    pub l1: f64,
    pub l2: f64,
    pub r1: f64,
    pub r2: f64,
}

/// Deadzone with rescale: output is exactly zero inside the threshold and
/// spans the full 0..1 range outside it, so there is no jump at the edge.
pub fn apply_deadzone(value: f64, deadzone: f64) -> f64 {
    if value.abs() < deadzone {
        return 0.0;
    }
    value.signum() * (value.abs() - deadzone) / (1.0 - deadzone)
}

/// Map a pad snapshot to `[vx, vy, vz, wx, wy, wz]`, each linear component
/// clamped to `max_linear` and each angular one to `max_angular`.
pub fn velocity_command(pad: &PadState, config: &TeleopConfig) -> [f64; 6] {
    let dz = config.deadzone;
    let left_x = apply_deadzone(pad.left_x, dz);
    let left_y = apply_deadzone(pad.left_y, dz);
    let right_x = apply_deadzone(pad.right_x, dz);
    let right_y = apply_deadzone(pad.right_y, dz);
    let l1 = apply_deadzone(pad.l1, dz);
    let l2 = apply_deadzone(pad.l2, dz);
    let r1 = apply_deadzone(pad.r1, dz);
    let r2 = apply_deadzone(pad.r2, dz);

    let linear = Vector3::new(left_y, -left_x, l1 - l2) * config.max_linear;
    let angular = Vector3::new(right_y, -right_x, r1 - r2) * config.max_angular;

    let linear = linear.map(|c| c.clamp(-config.max_linear, config.max_linear));
    let angular = angular.map(|c| c.clamp(-config.max_angular, config.max_angular));

    [linear.x, linear.y, linear.z, angular.x, angular.y, angular.z]
}

pub fn is_stop_command(command: &[f64; 6]) -> bool {
    command.iter().all(|c| c.abs() < MIN_COMMAND)
}

fn log_controls() {
    info!("Left stick:   X-Y translation");
    info!("L1 / L2:      move up / down (Z)");
    info!("Right stick:  roll / pitch");
    info!("R1 / R2:      yaw CCW / CW");
    info!("Triangle:     move to home pose");
    info!("Square:       stop and exit");
    info!("Options:      exit");
}

/// Run the teleop loop until the stop/exit button, controller disconnect,
/// Ctrl-C, a safety stop, or repeated transmission failures end it. The last
/// command issued on every exit path is a stop.
pub async fn run(
    control: &mut Control,
    gamepad: &mut Gamepad,
    config: &TeleopConfig,
) -> Result<(), RTDEError> {
    log_controls();
    info!("Teleop active at {} Hz, press Ctrl-C to exit", config.rate_hz);

    let mut ticker = interval(Duration::from_secs_f64(1.0 / config.rate_hz));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut send_failures = SendFailures::default();
    let mut result = Ok(());

    // One listener for the whole loop, so a signal delivered while the tick
    // branch runs (e.g. during a home move) is still picked up.
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    'teleop: loop {
        tokio::select! {
            _ = ticker.tick() => {
                for request in gamepad.pump() {
                    match request {
                        PadRequest::Stop => {
                            warn!("Stop button pressed");
                            break 'teleop;
                        }
                        PadRequest::Exit => {
                            info!("Exit button pressed");
                            break 'teleop;
                        }
                        PadRequest::Home => {
                            info!("Moving to home pose");
                            if let Err(e) = control.move_home(&config.home_q).await {
                                error!("Home move failed: {}", e);
                                result = Err(e);
                                break 'teleop;
                            }
                            info!("Reached home pose");
                        }
                    }
                }

                if !gamepad.is_connected() {
                    warn!("Controller disconnected, stopping robot");
                    break 'teleop;
                }

                if let Err(e) = control.poll_state() {
                    error!("Lost robot state stream: {}", e);
                    result = Err(e);
                    break 'teleop;
                }
                if control.is_protective_stopped() || control.is_emergency_stopped() {
                    error!("Robot reported a safety stop, halting teleop");
                    break 'teleop;
                }
                if !control.is_program_running() {
                    error!("Control script is no longer running, halting teleop");
                    break 'teleop;
                }

                let command = velocity_command(gamepad.state(), config);
                let sent = if is_stop_command(&command) {
                    control.speed_stop().await
                } else {
                    control.speed_l(&command).await
                };

                match sent {
                    Ok(()) => send_failures.success(),
                    Err(e) => {
                        let exhausted = send_failures.failure();
                        error!("Failed to send command ({}/{}): {}", send_failures.count(), MAX_SEND_FAILURES, e);
                        if exhausted {
                            result = Err(e);
                            break 'teleop;
                        }
                    }
                }
            }

            signal = &mut ctrl_c => {
                match signal {
                    Ok(()) => info!("Interrupted, stopping robot"),
                    Err(e) => error!("Signal handler failed: {}", e),
                }
                break 'teleop;
            }
        }
    }

    if let Err(e) = control.speed_stop().await {
        warn!("Failed to send final stop command: {}", e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_inside_deadzone_give_exactly_zero() {
        let config = TeleopConfig::default();
        let pad = PadState {
            left_x: 0.09,
            left_y: -0.05,
            right_x: 0.02,
            right_y: -0.099,
            l1: 0.05,
            l2: 0.0,
            r1: 0.0,
            r2: 0.08,
        };
        assert_eq!(velocity_command(&pad, &config), [0.0; 6]);
    }

    #[test]
    fn components_never_exceed_configured_limits() {
        let config = TeleopConfig { max_linear: 0.25, max_angular: 0.5, ..Default::default() };
        // Includes values past the nominal axis range.
        let pad = PadState {
            left_x: 1.0,
            left_y: -1.5,
            right_x: -1.0,
            right_y: 1.2,
            l1: 1.0,
            l2: 0.0,
            r1: 0.0,
            r2: 1.0,
        };
        let cmd = velocity_command(&pad, &config);
        for (i, c) in cmd.iter().enumerate() {
            let max = if i < 3 { config.max_linear } else { config.max_angular };
            assert!(c.abs() <= max + 1e-12, "component {} = {} exceeds {}", i, c, max);
        }
    }

    #[test]
    fn deadzone_rescale_is_continuous_and_spans_full_range() {
        assert_eq!(apply_deadzone(0.1, 0.1), 0.0);
        assert!((apply_deadzone(1.0, 0.1) - 1.0).abs() < 1e-12);
        assert!((apply_deadzone(-1.0, 0.1) + 1.0).abs() < 1e-12);
        // Just past the edge stays close to zero.
        assert!(apply_deadzone(0.11, 0.1).abs() < 0.02);
    }

    #[test]
    fn idle_pad_maps_to_the_stop_command() {
        let config = TeleopConfig::default();
        let cmd = velocity_command(&PadState::default(), &config);
        assert_eq!(cmd, [0.0; 6]);
        assert!(is_stop_command(&cmd));
    }

    #[test]
    fn opposing_triggers_cancel() {
        let config = TeleopConfig::default();
        let pad = PadState { l1: 1.0, l2: 1.0, r1: 0.7, r2: 0.7, ..Default::default() };
        let cmd = velocity_command(&pad, &config);
        assert_eq!(cmd[2], 0.0);
        assert_eq!(cmd[5], 0.0);
    }

    #[test]
    fn send_failure_budget_trips_after_consecutive_failures() {
        let mut budget = SendFailures::default();
        assert!(!budget.failure());
        assert!(!budget.failure());
        assert!(budget.failure());
    }

    #[test]
    fn send_failure_budget_resets_on_success() {
        let mut budget = SendFailures::default();
        budget.failure();
        budget.failure();
        budget.success();
        assert_eq!(budget.count(), 0);
        assert!(!budget.failure());
        assert!(!budget.failure());
        assert!(budget.failure());
    }

    #[test]
    fn stick_axes_map_to_expected_components() {
        let config = TeleopConfig::default();
        let pad = PadState { left_y: 1.0, ..Default::default() };
        let cmd = velocity_command(&pad, &config);
        // Stick forward is +X in the base frame.
        assert!((cmd[0] - config.max_linear).abs() < 1e-12);
        assert_eq!(&cmd[1..], &[0.0; 5]);
    }
}
