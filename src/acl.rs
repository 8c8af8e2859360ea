//! Network access grants for application units

use crate::config::{AccessManagerConfig, AclApiConfig};
use crate::models::Instance;
use crate::{Error, Result};
use parking_lot::RwLock;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Opens and closes network paths from a unit to an instance's endpoints
pub trait AccessManager: Send + Sync {
    fn grant_access(&self, instance: &Instance, unit_host: &str) -> Result<()>;
    fn revoke_access(&self, instance: &Instance, unit_host: &str) -> Result<()>;
}

pub fn build_access_manager(config: &AccessManagerConfig) -> Arc<dyn AccessManager> {
    match config {
        AccessManagerConfig::InMemory => Arc::new(InMemoryAccessManager::new()),
        AccessManagerConfig::AclApi(api) => Arc::new(AclApiManager::new(api.clone())),
    }
}

/// Keeps permits in memory only
#[derive(Debug, Default)]
pub struct InMemoryAccessManager {
    permits: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryAccessManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unit hosts currently granted on `instance_name`
    pub fn permits(&self, instance_name: &str) -> Vec<String> {
        self.permits
            .read()
            .get(instance_name)
            .cloned()
            .unwrap_or_default()
    }
}

impl AccessManager for InMemoryAccessManager {
    fn grant_access(&self, instance: &Instance, unit_host: &str) -> Result<()> {
        self.permits
            .write()
            .entry(instance.name.clone())
            .or_default()
            .push(unit_host.to_string());
        Ok(())
    }

    fn revoke_access(&self, instance: &Instance, unit_host: &str) -> Result<()> {
        let mut permits = self.permits.write();
        if let Some(hosts) = permits.get_mut(&instance.name) {
            if let Some(pos) = hosts.iter().position(|h| h == unit_host) {
                hosts.remove(pos);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L4Options {
    pub operator: String,
    pub port: String,
    pub target: String,
}

/// One TCP permit from a unit to an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitRule {
    pub description: String,
    pub source: String,
    pub destination: String,
    pub protocol: String,
    pub l4_options: L4Options,
}

/// Rules that open every endpoint of `instance` to `unit_host`
pub fn permit_rules(instance: &Instance, unit_host: &str) -> Vec<PermitRule> {
    instance
        .endpoints
        .iter()
        .map(|endpoint| PermitRule {
            description: format!(
                "redis-api instance \"{}\" access from {}/32 to {}/32",
                instance.name, unit_host, endpoint.host
            ),
            source: format!("{}/32", unit_host),
            destination: format!("{}/32", endpoint.host),
            protocol: "tcp".to_string(),
            l4_options: L4Options {
                operator: "eq".to_string(),
                port: endpoint.port.to_string(),
                target: "dest".to_string(),
            },
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct Commit<'a> {
    rules: &'a [PermitRule],
}

/// Client for the external ACL service
pub struct AclApiManager {
    config: AclApiConfig,
    client: Client,
}

impl AclApiManager {
    pub fn new(config: AclApiConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn permits_url(&self) -> String {
        format!("{}/api/tcp/permits", self.config.endpoint.trim_end_matches('/'))
    }

    /// Send every staged rule in a single commit
    fn commit(&self, method: reqwest::Method, rules: &[PermitRule]) -> Result<()> {
        let resp = self
            .client
            .request(method.clone(), self.permits_url())
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(&Commit { rules })
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(Error::Acl(format!("{} {} returned {}: {}", method, self.permits_url(), status, body.trim())));
        }
        Ok(())
    }
}

impl AccessManager for AclApiManager {
    fn grant_access(&self, instance: &Instance, unit_host: &str) -> Result<()> {
        let rules = permit_rules(instance, unit_host);
        self.commit(reqwest::Method::POST, &rules)?;
        tracing::info!(instance = %instance.name, unit = unit_host, rules = rules.len(), "Access granted");
        Ok(())
    }

    fn revoke_access(&self, instance: &Instance, unit_host: &str) -> Result<()> {
        let rules = permit_rules(instance, unit_host);
        self.commit(reqwest::Method::DELETE, &rules)?;
        tracing::info!(instance = %instance.name, unit = unit_host, rules = rules.len(), "Access revoked");
        Ok(())
    }
}
