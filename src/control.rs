// Teleop control session: owns the dashboard, RTDE and script connections
// plus the mirrored robot state, and exposes the few motion operations the
// teleop loop needs.

use crate::control_script::{CMD_EXIT, CMD_HOLD, CMD_HOME, CMD_SPEED, SCRIPT_BUSY, SCRIPT_READY};
use crate::dashboard::DashboardClient;
use crate::robot_state::{RobotState, RuntimeState, SafetyStatusBits};
use crate::rtde::{RTDEError, RTDE};
use crate::script_client::ScriptClient;
use log::{debug, info, warn};
use tokio::time::{timeout, Duration};

/// Rate at which the robot streams output packages to us.
pub const CONTROL_FREQUENCY: f64 = 125.0;

const OUTPUT_RECIPE: &[&str] = &[
    "timestamp",
    "robot_status_bits",
    "safety_status_bits",
    "runtime_state",
    "robot_mode",
    "actual_q",
    "actual_TCP_pose",
    "output_int_register_0",
];

const INPUT_RECIPE: &[&str] = &[
    "input_int_register_0",
    "input_double_register_0",
    "input_double_register_1",
    "input_double_register_2",
    "input_double_register_3",
    "input_double_register_4",
    "input_double_register_5",
    "input_double_register_6",
];

/// Number of double registers in the input recipe: 6 vector components plus
/// the acceleration.
const INPUT_REGISTERS: usize = 7;

pub struct Control {
    dashboard: DashboardClient,
    rtde: RTDE,
    script: ScriptClient,
    state: RobotState,
    acceleration: f64,
}

impl Control {
    /// Connect to the robot, upload the control script and wait until it
    /// reports ready. Fails with operator-readable errors when the robot is
    /// off, braked, or not in remote control.
    pub async fn connect(hostname: &str, acceleration: f64) -> Result<Self, RTDEError> {
        let mut dashboard = DashboardClient::new(hostname);
        dashboard.connect().await?;

        if !dashboard.is_in_remote_control().await? {
            return Err(RTDEError::RobotNotInRemoteControl(format!(
                "{}: enable remote control in Polyscope (Settings > System > Remote Control)",
                hostname
            )));
        }

        let mode = dashboard.robot_mode().await?;
        if mode != "RUNNING" {
            return Err(RTDEError::StateError(format!(
                "robot is in mode {} - power it on and release the brakes via the web UI first",
                mode
            )));
        }
        info!("Robot at {} is powered on and in remote control", hostname);

        let mut rtde = RTDE::new(hostname);
        rtde.connect().await?;
        rtde.negotiate_protocol_version().await?;
        let (major, minor, bugfix, build) = rtde.controller_version().await?;
        debug!("URControl version {}.{}.{}.{}", major, minor, bugfix, build);

        rtde.setup_outputs(OUTPUT_RECIPE, CONTROL_FREQUENCY).await?;
        rtde.setup_inputs(INPUT_RECIPE).await?;
        rtde.start().await?;

        let mut script = ScriptClient::new(hostname);
        script.connect().await?;
        script.send_script().await?;

        let state = RobotState::new(OUTPUT_RECIPE);
        let mut control = Self { dashboard, rtde, script, state, acceleration };

        control.wait_for_handshake(SCRIPT_READY, Duration::from_secs(10)).await?;
        control.rtde.send_input_package(CMD_HOLD, &[0.0; INPUT_REGISTERS]).await?;
        debug!(
            "Initial joint pose {:?}, TCP pose {:?} at t={:.3}",
            control.state.get("actual_q")?.as_vec_double(),
            control.state.get("actual_TCP_pose")?.as_vec_double(),
            control.state.get("timestamp")?.as_double()
        );
        info!("Control script is running, session ready");

        Ok(control)
    }

    pub fn state(&self) -> &RobotState {
        &self.state
    }

    /// Drain pending RTDE packages into the robot state without blocking.
    pub fn poll_state(&mut self) -> Result<usize, RTDEError> {
        self.rtde.poll_data(&mut self.state)
    }

    /// Stream one Cartesian velocity command `[vx, vy, vz, wx, wy, wz]`.
    pub async fn speed_l(&mut self, velocity: &[f64; 6]) -> Result<(), RTDEError> {
        let mut regs = [0.0; INPUT_REGISTERS];
        regs[..6].copy_from_slice(velocity);
        regs[6] = self.acceleration;
        self.rtde.send_input_package(CMD_SPEED, &regs).await
    }

    /// Command the script back to its decelerate-and-hold branch.
    pub async fn speed_stop(&mut self) -> Result<(), RTDEError> {
        self.rtde.send_input_package(CMD_HOLD, &[0.0; INPUT_REGISTERS]).await
    }

    /// Blocking `movej` to the given joint pose, via the busy/ready register
    /// handshake with the control script.
    pub async fn move_home(&mut self, home_q: &[f64; 6]) -> Result<(), RTDEError> {
        let mut regs = [0.0; INPUT_REGISTERS];
        regs[..6].copy_from_slice(home_q);
        self.rtde.send_input_package(CMD_HOME, &regs).await?;

        self.wait_for_handshake(SCRIPT_BUSY, Duration::from_secs(2)).await?;
        // Clear the command word so the move is not re-triggered once done.
        self.rtde.send_input_package(CMD_HOLD, &[0.0; INPUT_REGISTERS]).await?;
        self.wait_for_handshake(SCRIPT_READY, Duration::from_secs(30)).await
    }

    pub fn is_program_running(&self) -> bool {
        matches!(self.state.runtime_state(), Ok(RuntimeState::Playing))
    }

    pub fn is_protective_stopped(&self) -> bool {
        self.state.safety_bit_set(SafetyStatusBits::ProtectiveStopped)
    }

    pub fn is_emergency_stopped(&self) -> bool {
        self.state.safety_bit_set(SafetyStatusBits::EmergencyStopped)
            || self.state.safety_bit_set(SafetyStatusBits::RobotEmergencyStopped)
    }

    /// Stop the robot, terminate the control script and close every
    /// connection. Safe to call on any exit path.
    pub async fn shutdown(&mut self) -> Result<(), RTDEError> {
        if let Err(e) = self.rtde.send_input_package(CMD_HOLD, &[0.0; INPUT_REGISTERS]).await {
            warn!("Failed to send final stop command: {}", e);
        }
        if let Err(e) = self.rtde.send_input_package(CMD_EXIT, &[0.0; INPUT_REGISTERS]).await {
            warn!("Failed to terminate control script: {}", e);
            if let Err(e) = self.dashboard.stop().await {
                warn!("Failed to stop program via dashboard: {}", e);
            }
        }

        self.rtde.disconnect(true).await.ok();
        self.script.disconnect().await.ok();
        self.dashboard.disconnect().await.ok();
        info!("Teleop session closed");
        Ok(())
    }

    async fn wait_for_handshake(
        &mut self,
        expected: i32,
        deadline: Duration,
    ) -> Result<(), RTDEError> {
        let rtde = &mut self.rtde;
        let state = &mut self.state;
        let fut = async {
            loop {
                rtde.wait_for_data(state).await?;
                if state.get("output_int_register_0")?.as_int32() == expected {
                    return Ok(());
                }
            }
        };
        timeout(deadline, fut).await.map_err(|_| {
            RTDEError::RobotConnectionTimeout(format!(
                "control script did not report state {}",
                expected
            ))
        })?
    }
}
