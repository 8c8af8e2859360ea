//! Development plan: databases on one externally managed server

use std::sync::Arc;

use crate::config::SharedServerConfig;
use crate::models::{Endpoint, Instance, Plan};
use crate::probe::{HealthStatus, Probe};
use crate::{Error, Result};

use super::BindEnv;

pub struct SharedManager {
    server: SharedServerConfig,
    probe: Arc<dyn Probe>,
}

impl SharedManager {
    pub fn new(server: SharedServerConfig, probe: Arc<dyn Probe>) -> Self {
        Self { server, probe }
    }

    /// No container is created; the instance points at the shared server
    pub fn add_instance(&self, name: &str) -> Result<Instance> {
        let endpoint = Endpoint::new(self.server.public_host(), self.server.port, "");
        Ok(Instance::new(name, Plan::Development, vec![endpoint]))
    }

    pub fn bind(&self, instance: &Instance) -> Result<BindEnv> {
        let endpoint = instance
            .master()
            .ok_or_else(|| Error::Other(format!("instance {} has no endpoint", instance.name)))?;

        let mut env = BindEnv::new();
        env.insert("REDIS_HOST".into(), endpoint.host.clone());
        env.insert("REDIS_PORT".into(), endpoint.port.to_string());
        if let Some(password) = &self.server.password {
            env.insert("REDIS_PASSWORD".into(), password.clone());
        }
        Ok(env)
    }

    pub fn unbind(&self, _instance: &Instance) -> Result<()> {
        Ok(())
    }

    /// The shared server outlives its instances
    pub fn remove_instance(&self, _instance: &Instance) -> Result<()> {
        Ok(())
    }

    pub fn status(&self) -> HealthStatus {
        self.probe
            .probe(&self.server.host, self.server.port, self.server.password.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::tests::FixedProbe;
    use crate::probe::{ProbeFailure, ProbeFailureKind};

    fn server(password: Option<&str>) -> SharedServerConfig {
        SharedServerConfig {
            host: "localhost".into(),
            port: 6379,
            public_host: None,
            password: password.map(str::to_string),
        }
    }

    #[test]
    fn test_add_instance() {
        let manager = SharedManager::new(server(None), Arc::new(FixedProbe::healthy()));
        let instance = manager.add_instance("ble").unwrap();
        assert_eq!(instance.name, "ble");
        assert_eq!(instance.plan, Plan::Development);
        assert_eq!(instance.endpoints, vec![Endpoint::new("localhost", 6379, "")]);
    }

    #[test]
    fn test_add_instance_uses_public_host() {
        let mut config = server(None);
        config.public_host = Some("redis.tsuru.io".into());
        let manager = SharedManager::new(config, Arc::new(FixedProbe::healthy()));
        let instance = manager.add_instance("ble").unwrap();
        assert_eq!(instance.endpoints[0].host, "redis.tsuru.io");
    }

    #[test]
    fn test_bind_without_password() {
        let manager = SharedManager::new(server(None), Arc::new(FixedProbe::healthy()));
        let instance = manager.add_instance("ble").unwrap();

        let env = manager.bind(&instance).unwrap();
        let json = serde_json::to_string(&env).unwrap();
        assert_eq!(json, r#"{"REDIS_HOST":"localhost","REDIS_PORT":"6379"}"#);

        // Binding again yields the same map
        assert_eq!(manager.bind(&instance).unwrap(), env);
    }

    #[test]
    fn test_bind_with_password() {
        let manager = SharedManager::new(server(Some("s3cr3t")), Arc::new(FixedProbe::healthy()));
        let instance = manager.add_instance("ble").unwrap();
        let env = manager.bind(&instance).unwrap();
        assert_eq!(env.get("REDIS_PASSWORD").map(String::as_str), Some("s3cr3t"));
        assert_eq!(env.len(), 3);
    }

    #[test]
    fn test_status_probes_server_with_password() {
        let probe = Arc::new(FixedProbe::healthy());
        let manager = SharedManager::new(server(Some("s3cr3t")), probe.clone());
        assert!(manager.status().is_healthy());
        assert_eq!(
            probe.calls(),
            vec![("localhost".to_string(), 6379, Some("s3cr3t".to_string()))]
        );
    }

    #[test]
    fn test_status_reports_failure_message() {
        let failure = ProbeFailure {
            kind: ProbeFailureKind::Connection,
            message: "Connection refused (os error 111)".into(),
        };
        let manager = SharedManager::new(
            server(None),
            Arc::new(FixedProbe::new(HealthStatus::Unhealthy(failure.clone()))),
        );
        assert_eq!(manager.status(), HealthStatus::Unhealthy(failure));
    }
}
