// Dashboard server client (port 29999), line oriented.

use crate::rtde::RTDEError;
use log::debug;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const DASHBOARD_PORT: u16 = 29999;

#[derive(Debug, PartialEq, Eq)]
enum ConnectionState {
    Disconnected,
    Connected,
}

pub struct DashboardClient {
    hostname: String,
    port: u16,
    conn_state: ConnectionState,
    reader: Option<BufReader<TcpStream>>,
}

impl DashboardClient {
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            port: DASHBOARD_PORT,
            conn_state: ConnectionState::Disconnected,
            reader: None,
        }
    }

    pub async fn connect(&mut self) -> Result<(), RTDEError> {
        let stream = TcpStream::connect((self.hostname.as_str(), self.port)).await?;
        stream.set_nodelay(true)?;

        self.conn_state = ConnectionState::Connected;
        self.reader = Some(BufReader::new(stream));

        // The server greets with a banner line on connect.
        let banner = self.receive().await?;
        debug!("Dashboard banner: {}", banner.trim_end());
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.conn_state == ConnectionState::Connected
    }

    pub async fn disconnect(&mut self) -> Result<(), RTDEError> {
        if let Some(reader) = self.reader.take() {
            let mut stream = reader.into_inner();
            stream.shutdown().await.ok();
        }
        self.conn_state = ConnectionState::Disconnected;
        Ok(())
    }

    async fn send(&mut self, line: &str) -> Result<(), RTDEError> {
        if let Some(reader) = &mut self.reader {
            let stream = reader.get_mut();
            stream.write_all(line.as_bytes()).await?;
            return Ok(());
        }
        Err(RTDEError::DashboardError("dashboard stream is not connected".into()))
    }

    async fn receive(&mut self) -> Result<String, RTDEError> {
        if let Some(reader) = &mut self.reader {
            let mut line = String::new();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                return Err(RTDEError::DashboardError("dashboard closed the connection".into()));
            }
            return Ok(line);
        }
        Err(RTDEError::DashboardError("dashboard stream is not connected".into()))
    }

    async fn query(&mut self, command: &str) -> Result<String, RTDEError> {
        self.send(command).await?;
        let reply = self.receive().await?;
        debug!("Dashboard {:?} -> {:?}", command.trim_end(), reply.trim_end());
        Ok(reply)
    }

    // Dashboard commands

    pub async fn is_in_remote_control(&mut self) -> Result<bool, RTDEError> {
        let reply = self.query("is in remote control\n").await?;
        Ok(reply.trim_end() == "true")
    }

    /// Robot mode as reported by the dashboard, e.g. "RUNNING" or "POWER_OFF".
    pub async fn robot_mode(&mut self) -> Result<String, RTDEError> {
        let reply = self.query("robotmode\n").await?;
        match reply.trim_end().strip_prefix("Robotmode: ") {
            Some(mode) => Ok(mode.to_string()),
            None => Err(RTDEError::DashboardError(format!("unexpected robotmode reply: {}", reply))),
        }
    }

    /// Stop the running program.
    pub async fn stop(&mut self) -> Result<(), RTDEError> {
        let reply = self.query("stop\n").await?;
        if reply.trim_end() != "Stopped" {
            return Err(RTDEError::DashboardError(format!("failed to stop program: {}", reply)));
        }
        Ok(())
    }
}
