//! Connection diagnostics.
//!
//! [`diagnose`] probes the host once and explains what it found. It never
//! fails: every problem ends up in the report as a classification plus
//! ordered remediation hints. The explanation step is the pure
//! [`DiagnosticReport::from_outcome`], so it can be exercised without a
//! network.

use crate::error::TransportError;
use klipperdeck_core::{ErrorKind, SSH_PORT, normalize_port};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::net::UdpSocket;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const ADDRESS_TIMEOUT: Duration = Duration::from_secs(2);
const PUBLIC_ADDRESS_URL: &str = "https://api.ipify.org?format=json";

/// What the probe learned about one host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub host: String,
    pub port: u16,
    /// Something answered at the address.
    pub reachable: bool,
    /// The answer came from Moonraker.
    pub service_running: bool,
    /// The host accepted this client's origin.
    pub cors_allowed: bool,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    pub detail: Option<String>,
    pub suggestions: Vec<String>,
    pub caller_address: Option<IpAddr>,
}

/// Result of the single probe request.
#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    /// The host answered with this status and reason phrase.
    Status(u16, String),
    /// No usable answer.
    Failed(TransportError),
}

impl DiagnosticReport {
    fn empty(host: &str, port: u16, caller_address: Option<IpAddr>) -> Self {
        Self {
            host: host.to_string(),
            port,
            reachable: false,
            service_running: false,
            cors_allowed: false,
            error_kind: None,
            error: None,
            detail: None,
            suggestions: Vec::new(),
            caller_address,
        }
    }

    /// Report for a host configured with the SSH port. No I/O happens.
    pub fn ssh_port(host: &str) -> Self {
        let mut report = Self::empty(host, SSH_PORT, None);
        report.error_kind = Some(ErrorKind::Configuration);
        report.error = Some("port 22 is SSH, Moonraker listens on 7125".to_string());
        report.suggestions = vec![
            "Wrong port: change 22 to 7125".to_string(),
            "Port 22 belongs to SSH; Moonraker's API is on 7125".to_string(),
            "Check the port in the connection settings".to_string(),
        ];
        report
    }

    /// Explain a probe outcome.
    pub fn from_outcome(
        host: &str,
        port: u16,
        outcome: ProbeOutcome,
        caller_address: Option<IpAddr>,
    ) -> Self {
        let mut report = Self::empty(host, port, caller_address);

        match outcome {
            ProbeOutcome::Status(status, _) if (200..300).contains(&status) => {
                report.reachable = true;
                report.service_running = true;
                report.cors_allowed = true;
                return report;
            }
            ProbeOutcome::Status(status, reason) => {
                report.reachable = true;
                report.service_running = true;
                report.error = Some(format!("HTTP {status}: {reason}"));
                report.detail = Some(format!("the server answered with status {status}"));
                report.error_kind = Some(if status == 403 {
                    ErrorKind::Cors
                } else {
                    ErrorKind::Server(status)
                });
                report.suggestions.extend(status_hints(status, port));
            }
            ProbeOutcome::Failed(err) => {
                let kind = err.kind();
                report.reachable = kind.host_answered();
                report.service_running = kind.host_answered();
                report.error_kind = Some(kind);
                report.error = Some(err.to_string());
                report.detail = Some(format!("{kind} | http://{host}:{port}"));
                report.suggestions.extend(failure_hints(kind, host, port));
            }
        }

        if !report.cors_allowed {
            report.suggestions.push(String::new());
            report
                .suggestions
                .push("Cross-origin access is not confirmed".to_string());
            report.suggestions.push(
                "moonraker.conf may only allow specific origins in cors_domains".to_string(),
            );
            if let Some(caller) = caller_address {
                report
                    .suggestions
                    .push(format!("Your address appears to be {caller}"));
                match same_subnet(caller, host) {
                    Some(true) => report.suggestions.push(format!(
                        "{caller} shares a /24 with {host}; make sure it is listed in trusted_clients"
                    )),
                    Some(false) => report
                        .suggestions
                        .push(format!("{caller} is not in the same /24 as {host}")),
                    None => {}
                }
            }
            report.suggestions.push(
                "Fix: widen cors_domains and trusted_clients in moonraker.conf (for example 192.168.0.0/16)"
                    .to_string(),
            );
        }

        if !report.reachable {
            report.suggestions.push(String::new());
            report.suggestions.push("Basic checks:".to_string());
            report
                .suggestions
                .push(format!("1. Open the web interface: http://{host}"));
            report
                .suggestions
                .push("2. Check Moonraker: sudo systemctl status moonraker".to_string());
            report
                .suggestions
                .push(format!("3. Check the network: ping {host}"));
            report
                .suggestions
                .push("4. Use demo mode while you fix the connection".to_string());
        }

        report
    }

    pub fn is_healthy(&self) -> bool {
        self.reachable && self.service_running && self.cors_allowed
    }
}

fn status_hints(status: u16, port: u16) -> Vec<String> {
    match status {
        500.. => vec![
            "Server error: Moonraker may be failing".to_string(),
            "Restart it: sudo systemctl restart moonraker".to_string(),
        ],
        404 => vec![
            "Endpoint not found: check the Moonraker version".to_string(),
            format!("Is Moonraker really listening on port {port}?"),
        ],
        403 => vec!["Access denied: cross-origin or authorization problem".to_string()],
        other => vec![format!("HTTP {other}: check the host configuration")],
    }
}

fn failure_hints(kind: ErrorKind, host: &str, port: u16) -> Vec<String> {
    match kind {
        ErrorKind::Timeout => vec![
            "Connection timed out: the host did not answer in time".to_string(),
            format!("Check the address: {host}"),
            format!("Check the port: {port}"),
            "Is the printer host powered on?".to_string(),
            "Are you on the same network?".to_string(),
        ],
        ErrorKind::Network => vec![
            "Network error: the host cannot be reached".to_string(),
            format!("Make sure you are on the same network as {host}"),
            format!("Try: ping {host}"),
            "Has the printer host's address changed?".to_string(),
            format!("Look for it: nmap -sn {}", scan_range(host)),
        ],
        ErrorKind::Cors => vec![
            "Cross-origin error: the host refused this client".to_string(),
            "cors_domains in moonraker.conf is too restrictive".to_string(),
            "Update cors_domains and trusted_clients in moonraker.conf".to_string(),
        ],
        ErrorKind::Server(_) => vec![
            "Server error: Moonraker is having problems".to_string(),
            "Read the log: tail -f ~/printer_data/logs/moonraker.log".to_string(),
            "Restart it: sudo systemctl restart moonraker".to_string(),
        ],
        ErrorKind::Configuration | ErrorKind::Unknown => vec![
            "Unknown error".to_string(),
            "Run with RUST_LOG=klipperdeck=debug for details".to_string(),
        ],
    }
}

fn scan_range(host: &str) -> String {
    match host.parse::<Ipv4Addr>() {
        Ok(ip) => {
            let [a, b, c, _] = ip.octets();
            format!("{a}.{b}.{c}.0/24")
        }
        Err(_) => "192.168.1.0/24".to_string(),
    }
}

/// Whether `caller` and `host` share a /24. `None` when either side is not
/// an IPv4 literal.
fn same_subnet(caller: IpAddr, host: &str) -> Option<bool> {
    let IpAddr::V4(caller) = caller else {
        return None;
    };
    let host: Ipv4Addr = host.parse().ok()?;
    Some(caller.octets()[..3] == host.octets()[..3])
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        writeln!(f, "Target:           {}:{}", self.host, self.port)?;
        writeln!(f, "Reachable:        {}", yes_no(self.reachable))?;
        writeln!(f, "Moonraker:        {}", yes_no(self.service_running))?;
        writeln!(f, "Cross-origin ok:  {}", yes_no(self.cors_allowed))?;
        if let Some(caller) = self.caller_address {
            writeln!(f, "Your address:     {caller}")?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "Error:            {error}")?;
        }
        if let Some(detail) = &self.detail {
            writeln!(f, "Detail:           {detail}")?;
        }
        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for line in &self.suggestions {
                writeln!(f, "{line}")?;
            }
        }
        Ok(())
    }
}

/// Probe a host and explain the result.
pub async fn diagnose(host: &str, port: u16) -> DiagnosticReport {
    if port == SSH_PORT {
        return DiagnosticReport::ssh_port(host);
    }
    let (port, correction) = normalize_port(port);
    if let Some(correction) = correction {
        tracing::warn!("{}", correction);
    }

    let http = reqwest::Client::new();
    let caller = caller_address(&http, host, port).await;

    let url = format!("http://{host}:{port}/server/info");
    tracing::info!("Diagnosing {}", url);
    let outcome = match http
        .get(&url)
        .timeout(PROBE_TIMEOUT)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
    {
        Ok(resp) => {
            let status = resp.status();
            ProbeOutcome::Status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("").to_string(),
            )
        }
        Err(e) => ProbeOutcome::Failed(TransportError::from_reqwest(&url, e, PROBE_TIMEOUT)),
    };

    DiagnosticReport::from_outcome(host, port, outcome, caller)
}

async fn caller_address(http: &reqwest::Client, host: &str, port: u16) -> Option<IpAddr> {
    if let Some(local) = local_route_address(host, port).await {
        return Some(local);
    }
    public_address(http).await
}

/// Source address the OS would use to reach the host. No packet is sent.
async fn local_route_address(host: &str, port: u16) -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").await.ok()?;
    let connect = socket.connect((host, port));
    tokio::time::timeout(ADDRESS_TIMEOUT, connect).await.ok()?.ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

async fn public_address(http: &reqwest::Client) -> Option<IpAddr> {
    #[derive(Deserialize)]
    struct Answer {
        ip: IpAddr,
    }

    let resp = http
        .get(PUBLIC_ADDRESS_URL)
        .timeout(ADDRESS_TIMEOUT)
        .send()
        .await
        .ok()?;
    let answer: Answer = resp.json().await.ok()?;
    Some(answer.ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refused() -> ProbeOutcome {
        ProbeOutcome::Failed(TransportError::Network {
            url: "http://192.168.1.8:7125/server/info".into(),
            message: "connection refused".into(),
        })
    }

    #[tokio::test]
    async fn ssh_port_short_circuits() {
        let report = diagnose("192.168.1.8", 22).await;
        assert!(!report.reachable);
        assert_eq!(report.port, 22);
        assert_eq!(report.error_kind, Some(ErrorKind::Configuration));
        assert!(report.suggestions[0].contains("7125"));
        assert!(report.caller_address.is_none());
    }

    #[test]
    fn healthy_host_has_no_suggestions() {
        let report =
            DiagnosticReport::from_outcome("192.168.1.8", 7125, ProbeOutcome::Status(200, "OK".into()), None);
        assert!(report.is_healthy());
        assert!(report.suggestions.is_empty());
        assert!(report.error.is_none());
    }

    #[test]
    fn unreachable_host_gets_network_and_baseline_hints() {
        let caller = Some(IpAddr::V4(Ipv4Addr::new(192, 168, 0, 20)));
        let report = DiagnosticReport::from_outcome("192.168.1.8", 7125, refused(), caller);

        assert!(!report.reachable);
        assert!(!report.service_running);
        assert_eq!(report.error_kind, Some(ErrorKind::Network));
        assert!(report.suggestions[0].starts_with("Network error"));
        assert!(report.suggestions.iter().any(|s| s.contains("nmap -sn 192.168.1.0/24")));
        assert!(
            report
                .suggestions
                .iter()
                .any(|s| s == "192.168.0.20 is not in the same /24 as 192.168.1.8")
        );
        assert_eq!(
            report.suggestions.last().map(String::as_str),
            Some("4. Use demo mode while you fix the connection")
        );
    }

    #[test]
    fn forbidden_clears_cross_origin() {
        let report = DiagnosticReport::from_outcome(
            "printer.local",
            7125,
            ProbeOutcome::Status(403, "Forbidden".into()),
            None,
        );
        assert!(report.reachable);
        assert!(!report.cors_allowed);
        assert_eq!(report.error_kind, Some(ErrorKind::Cors));
        assert!(report.suggestions.iter().any(|s| s.contains("cors_domains")));
        // Reachable hosts skip the baseline checklist.
        assert!(!report.suggestions.iter().any(|s| s == "Basic checks:"));
    }

    #[test]
    fn non_success_status_leaves_cross_origin_unconfirmed() {
        for (status, reason) in [(503, "Service Unavailable"), (404, "Not Found"), (401, "Unauthorized")] {
            let report = DiagnosticReport::from_outcome(
                "192.168.1.8",
                7125,
                ProbeOutcome::Status(status, reason.into()),
                None,
            );
            assert!(report.reachable);
            assert!(report.service_running);
            assert!(!report.cors_allowed, "HTTP {status}");
            assert_eq!(report.error.as_deref(), Some(format!("HTTP {status}: {reason}").as_str()));
            assert!(
                report.suggestions.iter().any(|s| s == "Cross-origin access is not confirmed"),
                "HTTP {status}"
            );
            assert!(!report.suggestions.iter().any(|s| s == "Basic checks:"));
        }
    }

    #[test]
    fn cross_origin_failure_counts_as_reachable() {
        let outcome = ProbeOutcome::Failed(TransportError::Cors {
            url: "http://192.168.1.8:7125/server/info".into(),
        });
        let report = DiagnosticReport::from_outcome("192.168.1.8", 7125, outcome, None);
        assert!(report.reachable);
        assert_eq!(report.error_kind, Some(ErrorKind::Cors));
        assert!(report.suggestions[0].starts_with("Cross-origin error"));
        assert!(!report.suggestions.iter().any(|s| s == "Basic checks:"));
    }

    #[test]
    fn subnet_comparison() {
        let caller = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 30));
        assert_eq!(same_subnet(caller, "192.168.1.8"), Some(true));
        assert_eq!(same_subnet(caller, "10.0.0.2"), Some(false));
        assert_eq!(same_subnet(caller, "printer.local"), None);
    }
}
