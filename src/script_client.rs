// Uploads the control script over the secondary interface (port 30002).

use crate::control_script::CONTROL_SCRIPT;
use crate::rtde::RTDEError;
use log::debug;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

const SECONDARY_PORT: u16 = 30002;

#[derive(Debug, PartialEq, Eq)]
enum ConnectionState {
    Disconnected,
    Connected,
}

pub struct ScriptClient {
    hostname: String,
    port: u16,
    conn_state: ConnectionState,
    stream: Option<TcpStream>,
}

impl ScriptClient {
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            port: SECONDARY_PORT,
            conn_state: ConnectionState::Disconnected,
            stream: None,
        }
    }

    pub async fn connect(&mut self) -> Result<(), RTDEError> {
        let stream = TcpStream::connect((self.hostname.as_str(), self.port)).await?;
        stream.set_nodelay(true)?;

        self.stream = Some(stream);
        self.conn_state = ConnectionState::Connected;
        debug!("Connected to secondary interface at {}:{}", self.hostname, self.port);
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<(), RTDEError> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await.ok();
        }
        self.conn_state = ConnectionState::Disconnected;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.conn_state == ConnectionState::Connected
    }

    /// Send the teleop control script. A program received on the secondary
    /// interface replaces whatever program is currently loaded.
    pub async fn send_script(&mut self) -> Result<(), RTDEError> {
        match self.stream.as_mut() {
            Some(stream) => {
                stream.write_all(CONTROL_SCRIPT.as_bytes()).await?;
                debug!("Control script uploaded ({} bytes)", CONTROL_SCRIPT.len());
                Ok(())
            }
            None => Err(RTDEError::ScriptClientError("script stream is not connected".into())),
        }
    }
}
