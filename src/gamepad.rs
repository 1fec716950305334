// DS4 input via gilrs. Translates the event stream into the PadState
// snapshot the mapping consumes, plus discrete button requests.

use crate::teleop::PadState;
use gilrs::{Axis, Button, Event, EventType, GamepadId, Gilrs};
use log::{debug, info, warn};

/// Discrete button actions surfaced to the teleop loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadRequest {
    /// Square: stop the robot and exit.
    Stop,
    /// Options: exit.
    Exit,
    /// Triangle: movej to the home pose.
    Home,
}

#[derive(Debug)]
pub struct GamepadError(String);

impl std::error::Error for GamepadError {}

impl std::fmt::Display for GamepadError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Gamepad error: {}", self.0)
    }
}

pub struct Gamepad {
    gilrs: Gilrs,
    id: GamepadId,
    state: PadState,
    connected: bool,
}

impl Gamepad {
    /// Attach to the first connected gamepad.
    pub fn new() -> Result<Self, GamepadError> {
        let gilrs = Gilrs::new()
            .map_err(|e| GamepadError(format!("failed to initialize gamepad backend: {}", e)))?;

        let (id, name) = match gilrs.gamepads().next() {
            Some((id, pad)) => (id, pad.name().to_string()),
            None => {
                return Err(GamepadError(
                    "no gamepad detected - connect the DS4 via USB and check /dev/input/js*"
                        .into(),
                ))
            }
        };
        info!("Using gamepad \"{}\"", name);

        Ok(Self { gilrs, id, state: PadState::default(), connected: true })
    }

    /// Drain pending events into the snapshot and collect button requests.
    /// gilrs only reports changes, so the snapshot holds the last value of
    /// every axis between events.
    pub fn pump(&mut self) -> Vec<PadRequest> {
        let mut requests = Vec::new();

        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            if id != self.id {
                continue;
            }
            match event {
                EventType::Disconnected => {
                    warn!("Gamepad disconnected");
                    self.connected = false;
                    self.state = PadState::default();
                }
                EventType::Connected => {
                    info!("Gamepad reconnected");
                    self.connected = true;
                }
                EventType::AxisChanged(axis, value, _) => match axis {
                    Axis::LeftStickX => self.state.left_x = value as f64,
                    Axis::LeftStickY => self.state.left_y = value as f64,
                    Axis::RightStickX => self.state.right_x = value as f64,
                    Axis::RightStickY => self.state.right_y = value as f64,
                    _ => {}
                },
                // Analog triggers (L2/R2) arrive as button value changes.
                EventType::ButtonChanged(button, value, _) => match button {
                    Button::LeftTrigger2 => self.state.l2 = value as f64,
                    Button::RightTrigger2 => self.state.r2 = value as f64,
                    _ => {}
                },
                EventType::ButtonPressed(button, _) => match button {
                    Button::LeftTrigger => self.state.l1 = 1.0,
                    Button::RightTrigger => self.state.r1 = 1.0,
                    Button::West => requests.push(PadRequest::Stop),
                    Button::Start => requests.push(PadRequest::Exit),
                    Button::North => requests.push(PadRequest::Home),
                    other => debug!("Unmapped button {:?}", other),
                },
                EventType::ButtonReleased(button, _) => match button {
                    Button::LeftTrigger => self.state.l1 = 0.0,
                    Button::RightTrigger => self.state.r1 = 0.0,
                    _ => {}
                },
                _ => {}
            }
        }

        requests
    }

    pub fn state(&self) -> &PadState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}
