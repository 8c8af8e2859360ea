//! Liveness probing of Redis endpoints

use crate::replication::RedisConnector;
use serde::{Deserialize, Serialize};

/// Why a probe failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeFailureKind {
    /// Could not reach the server
    Connection,
    /// Server rejected the credentials
    Authentication,
    /// Server answered with something unexpected
    Protocol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub kind: ProbeFailureKind,
    /// Transport error text, verbatim
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(ProbeFailure),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

pub trait Probe: Send + Sync {
    fn probe(&self, host: &str, port: u16, password: Option<&str>) -> HealthStatus;
}

/// Connects and sends `PING`
#[derive(Debug, Clone, Default)]
pub struct RedisProbe;

impl Probe for RedisProbe {
    fn probe(&self, host: &str, port: u16, password: Option<&str>) -> HealthStatus {
        let outcome = RedisConnector::connect(host, port, password)
            .and_then(|mut con| redis::cmd("PING").query::<String>(&mut con));
        match outcome {
            Ok(_) => HealthStatus::Healthy,
            Err(e) => {
                tracing::debug!(host, port, error = %e, "Probe failed");
                HealthStatus::Unhealthy(ProbeFailure {
                    kind: failure_kind(&e),
                    message: e.to_string(),
                })
            }
        }
    }
}

fn failure_kind(err: &redis::RedisError) -> ProbeFailureKind {
    match err.kind() {
        redis::ErrorKind::AuthenticationFailed => ProbeFailureKind::Authentication,
        redis::ErrorKind::IoError => ProbeFailureKind::Connection,
        // Servers with requirepass answer NOAUTH to unauthenticated commands
        _ if err.code() == Some("NOAUTH") => ProbeFailureKind::Authentication,
        _ if err.is_connection_refusal() || err.is_timeout() => ProbeFailureKind::Connection,
        _ => ProbeFailureKind::Protocol,
    }
}
