//! Service instance model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Plan;

/// One running Redis process backing an instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Empty for endpoints that are not backed by a broker-managed container
    #[serde(default)]
    pub container_id: String,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, container_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            container_id: container_id.into(),
        }
    }

    /// `host:port`, as handed to topology-aware clients
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A provisioned Redis service instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Unique name chosen by the platform
    pub name: String,
    /// Plan the instance was provisioned with; never changes
    pub plan: Plan,
    /// Backing endpoints. For HA instances index 0 is the master.
    pub endpoints: Vec<Endpoint>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Instance {
    pub fn new(name: impl Into<String>, plan: Plan, endpoints: Vec<Endpoint>) -> Self {
        Self {
            name: name.into(),
            plan,
            endpoints,
            created_at: Utc::now(),
        }
    }

    /// Write master (first endpoint)
    pub fn master(&self) -> Option<&Endpoint> {
        self.endpoints.first()
    }

    /// Whether any endpoint lives on `host`
    pub fn has_host(&self, host: &str) -> bool {
        self.endpoints.iter().any(|e| e.host == host)
    }

    /// Ports this instance occupies on `host`
    pub fn ports_on(&self, host: &str) -> impl Iterator<Item = u16> + '_ {
        let host = host.to_string();
        self.endpoints
            .iter()
            .filter(move |e| e.host == host)
            .map(|e| e.port)
    }
}
