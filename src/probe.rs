// Single-pass reachability probe of the URSim service ports.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Ports a running URSim container is expected to expose.
pub const ROBOT_PORTS: &[(u16, &str)] = &[
    (29999, "dashboard"),
    (30001, "primary"),
    (30002, "secondary"),
    (30003, "real-time"),
    (30004, "RTDE"),
    (6080, "web UI"),
];

#[derive(Debug)]
pub struct PortProbe {
    pub port: u16,
    pub service: &'static str,
    pub result: Result<(), String>,
}

impl PortProbe {
    pub fn is_reachable(&self) -> bool {
        self.result.is_ok()
    }
}

/// Attempt a TCP connection to `host:port` within `timeout`.
pub fn probe_port(host: &str, port: u16, timeout: Duration) -> Result<(), String> {
    let addrs: Vec<_> = (host, port)
        .to_socket_addrs()
        .map_err(|e| format!("cannot resolve {}: {}", host, e))?
        .collect();
    let addr = addrs.first().ok_or_else(|| format!("no address for {}", host))?;

    TcpStream::connect_timeout(addr, timeout).map(|_| ()).map_err(|e| e.to_string())
}

/// Probe every robot port once. No retries; a single pass/fail per port.
pub fn probe_host(host: &str, timeout: Duration) -> Vec<PortProbe> {
    ROBOT_PORTS
        .iter()
        .map(|&(port, service)| PortProbe {
            port,
            service,
            result: probe_port(host, port, timeout),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn reports_listening_port_as_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let result = probe_port("127.0.0.1", port, Duration::from_millis(500));
        assert!(result.is_ok(), "{:?}", result);
    }

    #[test]
    fn reports_closed_port_as_unreachable() {
        // Bind and drop to find a port with nothing listening on it.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = probe_port("127.0.0.1", port, Duration::from_millis(500));
        assert!(result.is_err());
    }

    #[test]
    fn reports_unresolvable_host() {
        let result = probe_port("host.invalid", 30004, Duration::from_millis(500));
        assert!(result.is_err());
    }

    #[test]
    fn probe_host_covers_every_robot_port() {
        let probes = probe_host("127.0.0.1", Duration::from_millis(50));
        assert_eq!(probes.len(), ROBOT_PORTS.len());
        for (probe, &(port, service)) in probes.iter().zip(ROBOT_PORTS) {
            assert_eq!(probe.port, port);
            assert_eq!(probe.service, service);
        }
    }
}
