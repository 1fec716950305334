/* RTDE protocol session (port 30004) */

use crate::robot_state::{template, RobotState};
use crate::utils::{get_u16, get_u8, put_double, put_i32, put_u16, put_u8};
use log::{debug, warn};
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

const RTDE_PROTOCOL_VERSION: u16 = 2;
const RTDE_PORT: u16 = 30004;
const HEADER_SIZE: usize = 3;
const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(u8)]
enum RTDECommand {
    RequestProtocolVersion = 86,
    GetUrcontrolVersion = 118,
    TextMessage = 77,
    DataPackage = 85,
    SetupOutputs = 79,
    SetupInputs = 73,
    Start = 83,
    Pause = 80,
}

#[derive(Debug, PartialEq)]
enum ConnectionState {
    Disconnected,
    Connected,
    Started,
}

#[derive(Debug)]
pub enum RTDEError {
    ConnectionError(String),
    ProtocolError(String),
    StateError(String),
    NoDataAvailable(String),
    DashboardError(String),
    ScriptClientError(String),
    RobotNotInRemoteControl(String),
    RobotConnectionTimeout(String),
}

impl std::error::Error for RTDEError {}

impl std::fmt::Display for RTDEError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            Self::ProtocolError(msg) => write!(f, "Protocol error: {}", msg),
            Self::StateError(msg) => write!(f, "State error: {}", msg),
            Self::NoDataAvailable(msg) => write!(f, "No data available: {}", msg),
            Self::DashboardError(msg) => write!(f, "Dashboard error: {}", msg),
            Self::ScriptClientError(msg) => write!(f, "Script client error: {}", msg),
            Self::RobotNotInRemoteControl(msg) => write!(f, "Robot not in remote control: {}", msg),
            Self::RobotConnectionTimeout(msg) => write!(f, "Robot connection timeout: {}", msg),
        }
    }
}

impl From<std::io::Error> for RTDEError {
    fn from(err: std::io::Error) -> Self {
        RTDEError::ConnectionError(err.to_string())
    }
}

pub struct RTDE {
    hostname: String,
    port: u16,
    conn_state: ConnectionState,
    stream: Option<TcpStream>,
    rx: Vec<u8>,
    output_fields: Vec<String>,
    output_recipe_id: Option<u8>,
    input_fields: Vec<String>,
    input_recipe_id: Option<u8>,
}

impl RTDE {
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            port: RTDE_PORT,
            conn_state: ConnectionState::Disconnected,
            stream: None,
            rx: Vec::new(),
            output_fields: Vec::new(),
            output_recipe_id: None,
            input_fields: Vec::new(),
            input_recipe_id: None,
        }
    }

    pub async fn connect(&mut self) -> Result<(), RTDEError> {
        self.rx.clear();

        let stream = TcpStream::connect((self.hostname.as_str(), self.port)).await?;
        stream.set_nodelay(true)?;

        let sock = SockRef::from(&stream);
        sock.set_tcp_keepalive(&TcpKeepalive::new().with_time(Duration::from_secs(30)))?;

        self.stream = Some(stream);
        self.conn_state = ConnectionState::Connected;
        debug!("Connected to RTDE at {}:{}", self.hostname, self.port);

        Ok(())
    }

    pub async fn disconnect(&mut self, send_pause: bool) -> Result<(), RTDEError> {
        if self.conn_state == ConnectionState::Started && send_pause {
            if let Err(e) = self.pause().await {
                warn!("Failed to pause RTDE transmission on disconnect: {}", e);
            }
        }

        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await.ok();
        }
        self.conn_state = ConnectionState::Disconnected;
        debug!("Disconnected from RTDE");

        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.conn_state != ConnectionState::Disconnected
    }

    pub fn is_started(&self) -> bool {
        self.conn_state == ConnectionState::Started
    }

    pub async fn negotiate_protocol_version(&mut self) -> Result<(), RTDEError> {
        let mut payload = Vec::new();
        put_u16(&mut payload, RTDE_PROTOCOL_VERSION);
        self.send_packet(RTDECommand::RequestProtocolVersion, &payload).await?;

        let reply = self.await_reply(RTDECommand::RequestProtocolVersion).await?;
        if reply.first() != Some(&1) {
            return Err(RTDEError::ProtocolError(format!(
                "robot rejected RTDE protocol version {}",
                RTDE_PROTOCOL_VERSION
            )));
        }
        debug!("Negotiated RTDE protocol version {}", RTDE_PROTOCOL_VERSION);
        Ok(())
    }

    pub async fn controller_version(&mut self) -> Result<(i32, i32, i32, i32), RTDEError> {
        self.send_packet(RTDECommand::GetUrcontrolVersion, &[]).await?;
        let reply = self.await_reply(RTDECommand::GetUrcontrolVersion).await?;
        if reply.len() < 16 {
            return Err(RTDEError::ProtocolError("controller version reply too short".into()));
        }
        let mut offset = 0;
        let major = crate::utils::get_i32(&reply, &mut offset);
        let minor = crate::utils::get_i32(&reply, &mut offset);
        let bugfix = crate::utils::get_i32(&reply, &mut offset);
        let build = crate::utils::get_i32(&reply, &mut offset);
        Ok((major, minor, bugfix, build))
    }

    /// Configure the variables the robot streams to us, at `frequency` Hz.
    pub async fn setup_outputs(
        &mut self,
        fields: &[&str],
        frequency: f64,
    ) -> Result<(), RTDEError> {
        let mut payload = Vec::new();
        put_double(&mut payload, frequency);
        payload.extend_from_slice(fields.join(",").as_bytes());
        self.send_packet(RTDECommand::SetupOutputs, &payload).await?;

        let reply = self.await_reply(RTDECommand::SetupOutputs).await?;
        let (recipe_id, type_names) = decode_setup_reply(&reply, fields)?;

        for (field, type_name) in fields.iter().zip(type_names.iter()) {
            let expected = template(field)
                .ok_or_else(|| RTDEError::StateError(format!("unknown output field: {}", field)))?
                .type_name();
            if type_name != expected {
                return Err(RTDEError::ProtocolError(format!(
                    "robot reports type {} for {}, expected {}",
                    type_name, field, expected
                )));
            }
        }

        self.output_fields = fields.iter().map(|s| s.to_string()).collect();
        self.output_recipe_id = Some(recipe_id);
        debug!("Output recipe {} set up at {} Hz", recipe_id, frequency);
        Ok(())
    }

    /// Configure the variables we write to the robot.
    pub async fn setup_inputs(&mut self, fields: &[&str]) -> Result<(), RTDEError> {
        let payload = fields.join(",").into_bytes();
        self.send_packet(RTDECommand::SetupInputs, &payload).await?;

        let reply = self.await_reply(RTDECommand::SetupInputs).await?;
        let (recipe_id, _type_names) = decode_setup_reply(&reply, fields)?;

        self.input_fields = fields.iter().map(|s| s.to_string()).collect();
        self.input_recipe_id = Some(recipe_id);
        debug!("Input recipe {} set up", recipe_id);
        Ok(())
    }

    pub async fn start(&mut self) -> Result<(), RTDEError> {
        self.send_packet(RTDECommand::Start, &[]).await?;
        let reply = self.await_reply(RTDECommand::Start).await?;
        if reply.first() != Some(&1) {
            return Err(RTDEError::ProtocolError("robot refused to start transmission".into()));
        }
        self.conn_state = ConnectionState::Started;
        debug!("RTDE transmission started");
        Ok(())
    }

    pub async fn pause(&mut self) -> Result<(), RTDEError> {
        self.send_packet(RTDECommand::Pause, &[]).await?;
        let reply = self.await_reply(RTDECommand::Pause).await?;
        if reply.first() != Some(&1) {
            return Err(RTDEError::ProtocolError("robot refused to pause transmission".into()));
        }
        self.conn_state = ConnectionState::Connected;
        Ok(())
    }

    /// Send one input data package: the command word followed by the double
    /// registers of the input recipe.
    pub async fn send_input_package(
        &mut self,
        command: i32,
        registers: &[f64],
    ) -> Result<(), RTDEError> {
        let recipe_id = self.input_recipe_id.ok_or_else(|| {
            RTDEError::StateError("input recipe not configured".into())
        })?;
        if self.input_fields.len() != 1 + registers.len() {
            return Err(RTDEError::StateError(format!(
                "input package has {} registers, recipe expects {}",
                registers.len(),
                self.input_fields.len() - 1
            )));
        }

        let mut payload = Vec::with_capacity(1 + 4 + registers.len() * 8);
        put_u8(&mut payload, recipe_id);
        put_i32(&mut payload, command);
        for reg in registers {
            put_double(&mut payload, *reg);
        }
        self.send_packet(RTDECommand::DataPackage, &payload).await
    }

    /// Drain every complete packet already buffered or readable without
    /// blocking, applying data packages to `state`. Returns how many data
    /// packages were applied.
    pub fn poll_data(&mut self, state: &mut RobotState) -> Result<usize, RTDEError> {
        let mut applied = 0;
        loop {
            while let Some((cmd, payload)) = self.take_frame()? {
                if cmd == RTDECommand::DataPackage as u8 {
                    self.apply_data_package(&payload, state)?;
                    applied += 1;
                } else {
                    debug!("Ignoring RTDE packet {} outside handshake", cmd);
                }
            }
            if !self.try_read_more()? {
                return Ok(applied);
            }
        }
    }

    /// Wait until at least one data package has been applied to `state`.
    pub async fn wait_for_data(&mut self, state: &mut RobotState) -> Result<(), RTDEError> {
        let deadline = Duration::from_secs(5);
        let fut = async {
            loop {
                let (cmd, payload) = self.read_packet().await?;
                if cmd == RTDECommand::DataPackage as u8 {
                    self.apply_data_package(&payload, state)?;
                    return Ok(());
                }
            }
        };
        timeout(deadline, fut).await.map_err(|_| {
            RTDEError::RobotConnectionTimeout("no RTDE data package received".into())
        })?
    }

    fn apply_data_package(
        &self,
        payload: &[u8],
        state: &mut RobotState,
    ) -> Result<(), RTDEError> {
        let recipe_id = self.output_recipe_id.ok_or_else(|| {
            RTDEError::StateError("output recipe not configured".into())
        })?;
        apply_data_package(recipe_id, &self.output_fields, payload, state)
    }

    async fn send_packet(&mut self, cmd: RTDECommand, payload: &[u8]) -> Result<(), RTDEError> {
        let frame = encode_packet(cmd as u8, payload)?;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| RTDEError::ConnectionError("RTDE stream is not connected".into()))?;
        stream.write_all(&frame).await?;
        Ok(())
    }

    /// Await the reply to `cmd`, skipping interleaved data packages and
    /// text messages.
    async fn await_reply(&mut self, cmd: RTDECommand) -> Result<Vec<u8>, RTDEError> {
        let fut = async {
            loop {
                let (got, payload) = self.read_packet().await?;
                if got == cmd as u8 {
                    return Ok(payload);
                } else if got == RTDECommand::DataPackage as u8 {
                    continue;
                } else if got == RTDECommand::TextMessage as u8 {
                    debug!("RTDE text message: {}", String::from_utf8_lossy(&payload));
                } else {
                    return Err(RTDEError::ProtocolError(format!(
                        "unexpected RTDE packet {} while waiting for {}",
                        got, cmd as u8
                    )));
                }
            }
        };
        timeout(REPLY_TIMEOUT, fut).await.map_err(|_| {
            RTDEError::RobotConnectionTimeout(format!("no reply to RTDE command {}", cmd as u8))
        })?
    }

    async fn read_packet(&mut self) -> Result<(u8, Vec<u8>), RTDEError> {
        loop {
            if let Some(frame) = self.take_frame()? {
                return Ok(frame);
            }
            let stream = self.stream.as_mut().ok_or_else(|| {
                RTDEError::ConnectionError("RTDE stream is not connected".into())
            })?;
            let n = stream.read_buf(&mut self.rx).await?;
            if n == 0 {
                return Err(RTDEError::ConnectionError("connection closed by robot".into()));
            }
        }
    }

    /// One non-blocking read into the buffer. Returns whether bytes arrived.
    fn try_read_more(&mut self) -> Result<bool, RTDEError> {
        let stream = match self.stream.as_mut() {
            Some(s) => s,
            None => return Ok(false),
        };
        match stream.try_read_buf(&mut self.rx) {
            Ok(0) => Err(RTDEError::ConnectionError("connection closed by robot".into())),
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn take_frame(&mut self) -> Result<Option<(u8, Vec<u8>)>, RTDEError> {
        if self.rx.len() < HEADER_SIZE {
            return Ok(None);
        }
        let mut offset = 0;
        let size = get_u16(&self.rx, &mut offset) as usize;
        let cmd = get_u8(&self.rx, &mut offset);
        if size < HEADER_SIZE {
            return Err(RTDEError::ProtocolError(format!("illegal RTDE packet size {}", size)));
        }
        if self.rx.len() < size {
            return Ok(None);
        }
        let payload = self.rx[HEADER_SIZE..size].to_vec();
        self.rx.drain(..size);
        Ok(Some((cmd, payload)))
    }
}

fn encode_packet(cmd: u8, payload: &[u8]) -> Result<Vec<u8>, RTDEError> {
    let size: u16 = (HEADER_SIZE + payload.len())
        .try_into()
        .map_err(|_| RTDEError::ProtocolError("RTDE payload too large".into()))?;
    let mut frame = Vec::with_capacity(size as usize);
    put_u16(&mut frame, size);
    put_u8(&mut frame, cmd);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Decode a setup-inputs/outputs reply: recipe id plus comma-separated
/// variable type names. `NOT_FOUND` and `IN_USE` mark rejected variables.
fn decode_setup_reply(reply: &[u8], fields: &[&str]) -> Result<(u8, Vec<String>), RTDEError> {
    if reply.is_empty() {
        return Err(RTDEError::ProtocolError("empty recipe setup reply".into()));
    }
    let recipe_id = reply[0];
    let names = String::from_utf8_lossy(&reply[1..]);
    let type_names: Vec<String> = names.split(',').map(|s| s.to_string()).collect();

    if type_names.len() != fields.len() {
        return Err(RTDEError::ProtocolError(format!(
            "recipe setup reply lists {} variables, requested {}",
            type_names.len(),
            fields.len()
        )));
    }
    if let Some(i) = type_names.iter().position(|t| t == "NOT_FOUND") {
        return Err(RTDEError::ProtocolError(format!("variable not found: {}", fields[i])));
    }
    if let Some(i) = type_names.iter().position(|t| t == "IN_USE") {
        return Err(RTDEError::ProtocolError(format!(
            "variable already claimed by another RTDE connection: {}",
            fields[i]
        )));
    }
    Ok((recipe_id, type_names))
}

fn apply_data_package(
    recipe_id: u8,
    fields: &[String],
    payload: &[u8],
    state: &mut RobotState,
) -> Result<(), RTDEError> {
    if payload.first() != Some(&recipe_id) {
        return Err(RTDEError::ProtocolError(format!(
            "data package for recipe {:?}, expected {}",
            payload.first(),
            recipe_id
        )));
    }

    let mut offset = 1;
    for field in fields {
        let tmpl = template(field)
            .ok_or_else(|| RTDEError::StateError(format!("unknown output field: {}", field)))?;
        if payload.len() < offset + tmpl.wire_size() {
            return Err(RTDEError::ProtocolError(format!(
                "data package too short for {}",
                field
            )));
        }
        let value = tmpl.parse_from(payload, &mut offset);
        state.set(field, value)?;
    }
    state.set_first_state_received();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot_state::StateData;
    use crate::utils::{put_double, put_i32, put_u8};

    #[test]
    fn encodes_packet_with_header() {
        let frame = encode_packet(86, &[0, 2]).unwrap();
        assert_eq!(frame, vec![0, 5, 86, 0, 2]);
    }

    #[test]
    fn decodes_setup_reply() {
        let mut reply = vec![3u8];
        reply.extend_from_slice(b"INT32,DOUBLE");
        let (recipe, types) = decode_setup_reply(&reply, &["a", "b"]).unwrap();
        assert_eq!(recipe, 3);
        assert_eq!(types, vec!["INT32", "DOUBLE"]);
    }

    #[test]
    fn setup_reply_reports_offending_variable() {
        let mut reply = vec![1u8];
        reply.extend_from_slice(b"INT32,NOT_FOUND");
        let err = decode_setup_reply(&reply, &["a", "bogus"]).unwrap_err();
        assert!(err.to_string().contains("bogus"), "{}", err);

        let mut reply = vec![1u8];
        reply.extend_from_slice(b"IN_USE,DOUBLE");
        let err = decode_setup_reply(&reply, &["claimed", "b"]).unwrap_err();
        assert!(err.to_string().contains("claimed"), "{}", err);
    }

    #[test]
    fn applies_data_package_in_recipe_order() {
        let fields = vec!["robot_mode".to_string(), "timestamp".to_string()];
        let mut state = RobotState::new(&["robot_mode", "timestamp"]);

        let mut payload = Vec::new();
        put_u8(&mut payload, 9); // recipe id
        put_i32(&mut payload, 7);
        put_double(&mut payload, 3.25);

        apply_data_package(9, &fields, &payload, &mut state).unwrap();
        assert_eq!(state.get("robot_mode").unwrap(), &StateData::Int32(7));
        assert_eq!(state.get("timestamp").unwrap(), &StateData::Double(3.25));
        assert!(state.first_state_received());
    }

    #[test]
    fn truncated_data_package_is_a_protocol_error() {
        let fields = vec!["timestamp".to_string()];
        let mut state = RobotState::new(&["timestamp"]);

        // Recipe id plus half of the 8 bytes a DOUBLE needs.
        let payload = vec![9u8, 64, 95, 64, 0];
        let err = apply_data_package(9, &fields, &payload, &mut state).unwrap_err();
        assert!(matches!(err, RTDEError::ProtocolError(_)), "{}", err);
        assert!(!state.first_state_received());
    }

    #[test]
    fn rejects_data_package_for_other_recipe() {
        let fields = vec!["timestamp".to_string()];
        let mut state = RobotState::new(&["timestamp"]);
        let payload = vec![4u8];
        assert!(apply_data_package(9, &fields, &payload, &mut state).is_err());
    }
}
