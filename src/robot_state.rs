// Robot state mirrored from the RTDE output stream.

use num_enum::TryFromPrimitive;
use phf::phf_map;
use std::collections::HashMap;

use crate::rtde::RTDEError;
use crate::utils::{get_double, get_i32, get_u32, get_u64, get_vector6_i32, get_vector6d};

/// Value of a single RTDE output variable.
#[derive(Debug, Clone, PartialEq)]
pub enum StateData {
    VectorDouble(Vec<f64>),
    VectorInt(Vec<i32>),
    Uint32(u32),
    Uint64(u64),
    Int32(i32),
    Double(f64),
}

impl StateData {
    pub fn as_vec_double(&self) -> Vec<f64> {
        match self {
            StateData::VectorDouble(x) => x.clone(),
            _ => Vec::new(),
        }
    }

    pub fn as_uint32(&self) -> u32 {
        match self {
            StateData::Uint32(x) => *x,
            _ => 0,
        }
    }

    pub fn as_int32(&self) -> i32 {
        match self {
            StateData::Int32(x) => *x,
            _ => 0,
        }
    }

    pub fn as_double(&self) -> f64 {
        match self {
            StateData::Double(x) => *x,
            _ => 0.0,
        }
    }

    /// RTDE type name for this variable, as used in setup replies.
    pub fn type_name(&self) -> &'static str {
        match self {
            StateData::VectorDouble(_) => "VECTOR6D",
            StateData::VectorInt(_) => "VECTOR6INT32",
            StateData::Uint32(_) => "UINT32",
            StateData::Uint64(_) => "UINT64",
            StateData::Int32(_) => "INT32",
            StateData::Double(_) => "DOUBLE",
        }
    }

    /// Encoded size of this variable in a data package, bytes.
    pub fn wire_size(&self) -> usize {
        match self {
            StateData::VectorDouble(_) => 48,
            StateData::VectorInt(_) => 24,
            StateData::Uint32(_) => 4,
            StateData::Uint64(_) => 8,
            StateData::Int32(_) => 4,
            StateData::Double(_) => 8,
        }
    }

    /// Parse a value of the same variant as `self` from a data package payload.
    ///
    /// The caller checks that `wire_size` bytes remain at `offset`.
    pub fn parse_from(&self, data: &[u8], offset: &mut usize) -> StateData {
        match self {
            StateData::VectorDouble(_) => StateData::VectorDouble(get_vector6d(data, offset)),
            StateData::VectorInt(_) => StateData::VectorInt(get_vector6_i32(data, offset)),
            StateData::Uint32(_) => StateData::Uint32(get_u32(data, offset)),
            StateData::Uint64(_) => StateData::Uint64(get_u64(data, offset)),
            StateData::Int32(_) => StateData::Int32(get_i32(data, offset)),
            StateData::Double(_) => StateData::Double(get_double(data, offset)),
        }
    }
}

// Template values for the output variables the teleop session subscribes to.
static STATE_DATA_TEMPLATES: phf::Map<&str, StateData> = phf_map! {
    "timestamp" => StateData::Double(0.0),
    "actual_q" => StateData::VectorDouble(Vec::new()),
    "actual_qd" => StateData::VectorDouble(Vec::new()),
    "actual_TCP_pose" => StateData::VectorDouble(Vec::new()),
    "actual_TCP_speed" => StateData::VectorDouble(Vec::new()),
    "joint_mode" => StateData::VectorInt(Vec::new()),
    "robot_mode" => StateData::Int32(0),
    "safety_mode" => StateData::Uint32(0),
    "runtime_state" => StateData::Uint32(0),
    "robot_status_bits" => StateData::Uint32(0),
    "safety_status_bits" => StateData::Uint32(0),
    "actual_digital_input_bits" => StateData::Uint64(0),
    "speed_scaling" => StateData::Double(0.0),
    "output_int_register_0" => StateData::Int32(0),
    "output_int_register_1" => StateData::Int32(0),
    "output_double_register_0" => StateData::Double(0.0),
    "output_double_register_1" => StateData::Double(0.0),
};

/// Template (and thus wire type) for a subscribable output variable.
pub(crate) fn template(field: &str) -> Option<&'static StateData> {
    STATE_DATA_TEMPLATES.get(field)
}

/// Robot mode as reported in the `robot_mode` output variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(i32)]
pub enum RobotMode {
    NoController = -1,
    Disconnected = 0,
    ConfirmSafety = 1,
    Booting = 2,
    PowerOff = 3,
    PowerOn = 4,
    Idle = 5,
    Backdrive = 6,
    Running = 7,
    UpdatingFirmware = 8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum RuntimeState {
    Stopping = 0,
    Stopped = 1,
    Playing = 2,
    Pausing = 3,
    Paused = 4,
    Resuming = 5,
}

/// Bit positions in the `safety_status_bits` output variable.
#[derive(Debug, Clone, Copy)]
#[repr(u32)]
pub enum SafetyStatusBits {
    NormalMode = 0,
    ReducedMode = 1,
    ProtectiveStopped = 2,
    RecoveryMode = 3,
    SafeguardStopped = 4,
    SystemEmergencyStopped = 5,
    RobotEmergencyStopped = 6,
    EmergencyStopped = 7,
    Violation = 8,
    Fault = 9,
}

pub struct RobotState {
    state_data: HashMap<String, StateData>,
    first_state_received: bool,
}

impl RobotState {
    /// Create a state store for the given output recipe fields.
    ///
    /// Panics if a field is not in the template table; the subscription set
    /// is fixed at compile time.
    pub fn new(fields: &[&str]) -> Self {
        let mut state_data = HashMap::new();
        for field in fields {
            let template = STATE_DATA_TEMPLATES
                .get(field)
                .unwrap_or_else(|| panic!("unknown RTDE output variable: {}", field));
            state_data.insert(field.to_string(), template.clone());
        }
        Self { state_data, first_state_received: false }
    }

    pub fn first_state_received(&self) -> bool {
        self.first_state_received
    }

    pub fn set_first_state_received(&mut self) {
        self.first_state_received = true;
    }

    pub fn get(&self, field: &str) -> Result<&StateData, RTDEError> {
        self.state_data
            .get(field)
            .ok_or_else(|| RTDEError::NoDataAvailable(format!("state field not found: {}", field)))
    }

    pub fn set(&mut self, field: &str, data: StateData) -> Result<(), RTDEError> {
        match self.state_data.get_mut(field) {
            Some(slot) => {
                *slot = data;
                Ok(())
            }
            None => Err(RTDEError::StateError(format!("state field not found: {}", field))),
        }
    }

    pub fn robot_mode(&self) -> Result<RobotMode, RTDEError> {
        let raw = self.get("robot_mode")?.as_int32();
        RobotMode::try_from(raw)
            .map_err(|_| RTDEError::StateError(format!("unknown robot mode: {}", raw)))
    }

    pub fn runtime_state(&self) -> Result<RuntimeState, RTDEError> {
        let raw = self.get("runtime_state")?.as_uint32();
        RuntimeState::try_from(raw)
            .map_err(|_| RTDEError::StateError(format!("unknown runtime state: {}", raw)))
    }

    pub fn safety_bit_set(&self, bit: SafetyStatusBits) -> bool {
        match self.get("safety_status_bits") {
            Ok(data) => data.as_uint32() & (1 << bit as u32) != 0,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{put_double, put_i32};

    #[test]
    fn parses_fields_with_template_types() {
        let mut payload = Vec::new();
        put_double(&mut payload, 42.5);
        put_i32(&mut payload, 7);

        let mut offset = 0;
        let ts = StateData::Double(0.0).parse_from(&payload, &mut offset);
        let reg = StateData::Int32(0).parse_from(&payload, &mut offset);

        assert_eq!(ts, StateData::Double(42.5));
        assert_eq!(reg, StateData::Int32(7));
        assert_eq!(offset, payload.len());
    }

    #[test]
    fn parse_advances_offset_by_wire_size() {
        let payload = [0u8; 48];
        let templates = [
            StateData::VectorDouble(Vec::new()),
            StateData::VectorInt(Vec::new()),
            StateData::Uint32(0),
            StateData::Uint64(0),
            StateData::Int32(0),
            StateData::Double(0.0),
        ];
        for tmpl in &templates {
            let mut offset = 0;
            tmpl.parse_from(&payload, &mut offset);
            assert_eq!(offset, tmpl.wire_size(), "{:?}", tmpl);
        }
    }

    #[test]
    fn rejects_unknown_fields() {
        let mut state = RobotState::new(&["robot_mode"]);
        assert!(state.get("timestamp").is_err());
        assert!(state.set("timestamp", StateData::Double(1.0)).is_err());
    }

    #[test]
    fn decodes_robot_mode() {
        let mut state = RobotState::new(&["robot_mode"]);
        state.set("robot_mode", StateData::Int32(7)).unwrap();
        assert_eq!(state.robot_mode().unwrap(), RobotMode::Running);

        state.set("robot_mode", StateData::Int32(99)).unwrap();
        assert!(state.robot_mode().is_err());
    }

    #[test]
    fn reads_safety_bits() {
        let mut state = RobotState::new(&["safety_status_bits"]);
        state
            .set(
                "safety_status_bits",
                StateData::Uint32(1 << SafetyStatusBits::ProtectiveStopped as u32),
            )
            .unwrap();
        assert!(state.safety_bit_set(SafetyStatusBits::ProtectiveStopped));
        assert!(!state.safety_bit_set(SafetyStatusBits::EmergencyStopped));
    }
}
