//! Basic plan: one container per instance

use std::sync::Arc;

use crate::models::{Instance, Plan};
use crate::probe::{HealthStatus, Probe};
use crate::replication::ReplicationConfigurator;
use crate::{Error, Result};

use super::topology::{topology_env, ContainerProvisioner};
use super::BindEnv;

pub struct DedicatedManager {
    provisioner: Arc<ContainerProvisioner>,
    replication: Arc<ReplicationConfigurator>,
    sentinel_urls: Vec<String>,
    probe: Arc<dyn Probe>,
}

impl DedicatedManager {
    pub fn new(
        provisioner: Arc<ContainerProvisioner>,
        replication: Arc<ReplicationConfigurator>,
        sentinel_urls: Vec<String>,
        probe: Arc<dyn Probe>,
    ) -> Self {
        Self {
            provisioner,
            replication,
            sentinel_urls,
            probe,
        }
    }

    pub fn add_instance(&self, name: &str) -> Result<Instance> {
        let daemon = self.provisioner.pool().random()?;
        tracing::info!(instance = %name, daemon = %daemon.url, "Provisioning dedicated instance");

        let endpoint = self.provisioner.provision(daemon)?;
        if self.replication.has_sentinels() {
            self.replication.config_master(name, &endpoint)?;
        }
        Ok(Instance::new(name, Plan::Basic, vec![endpoint]))
    }

    pub fn bind(&self, instance: &Instance) -> Result<BindEnv> {
        let endpoint = instance
            .master()
            .ok_or_else(|| Error::Other(format!("instance {} has no endpoint", instance.name)))?;

        let mut env = topology_env(&self.sentinel_urls, instance)?;
        env.insert("REDIS_HOST".into(), endpoint.host.clone());
        env.insert("REDIS_PORT".into(), endpoint.port.to_string());
        Ok(env)
    }

    pub fn unbind(&self, _instance: &Instance) -> Result<()> {
        Ok(())
    }

    pub fn remove_instance(&self, instance: &Instance) -> Result<()> {
        tracing::info!(instance = %instance.name, "Removing dedicated instance");
        for endpoint in &instance.endpoints {
            self.provisioner.teardown(endpoint)?;
        }
        if self.replication.has_sentinels() {
            self.replication.remove(&instance.name)?;
        }
        Ok(())
    }

    pub fn status(&self, instance: &Instance) -> HealthStatus {
        match instance.master() {
            Some(endpoint) => self.probe.probe(&endpoint.host, endpoint.port, None),
            None => super::no_endpoint(instance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortAllocation;
    use crate::db::Database;
    use crate::docker::{DaemonPool, MockContainerRuntime};
    use crate::health::MockHealthChecker;
    use crate::managers::tests::FixedProbe;
    use crate::models::Endpoint;
    use crate::ports::PortAllocator;
    use crate::replication::tests::RecordingCommander;

    const DAEMONS: [&str; 2] = ["http://host1.com:4243", "http://localhost:4243"];

    fn manager(
        runtime: MockContainerRuntime,
        health: MockHealthChecker,
        commander: Arc<RecordingCommander>,
        sentinels: &[&str],
        probe: Arc<FixedProbe>,
    ) -> DedicatedManager {
        let ports = Arc::new(PortAllocator::new(PortAllocation::Runtime, Database::in_memory().unwrap()));
        let provisioner = ContainerProvisioner::new(
            Arc::new(runtime),
            Arc::new(health),
            ports,
            DaemonPool::from_urls(&DAEMONS).unwrap(),
            "redisapi",
        );
        let sentinel_urls: Vec<String> = sentinels.iter().map(|s| s.to_string()).collect();
        let replication = ReplicationConfigurator::from_urls(&sentinel_urls, commander).unwrap();
        DedicatedManager::new(Arc::new(provisioner), Arc::new(replication), sentinel_urls, probe)
    }

    #[test]
    fn test_add_instance_creates_one_container() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_create_container()
            .withf(|daemon, spec| DAEMONS.contains(&daemon) && spec.image == "redisapi")
            .times(1)
            .returning(|_, _| Ok("abc123".to_string()));
        runtime.expect_start_container().times(1).returning(|_, _| Ok(()));
        runtime
            .expect_inspect_host_port()
            .withf(|_, id| id == "abc123")
            .times(1)
            .returning(|_, _| Ok(49153));

        let mut health = MockHealthChecker::new();
        health.expect_add().times(1).returning(|_, _| Ok(()));

        let commander = Arc::new(RecordingCommander::default());
        let manager = manager(
            runtime,
            health,
            commander.clone(),
            &["http://host1.com:26379"],
            Arc::new(FixedProbe::healthy()),
        );

        let instance = manager.add_instance("myinstance").unwrap();
        assert_eq!(instance.plan, Plan::Basic);
        assert_eq!(instance.endpoints.len(), 1);
        assert_eq!(instance.endpoints[0].container_id, "abc123");
        assert_eq!(instance.endpoints[0].port, 49153);
        assert!(["host1.com", "localhost"].contains(&instance.endpoints[0].host.as_str()));

        // Registered as a standalone master with the one sentinel
        let calls = commander.calls.lock();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0].2[..3], ["SENTINEL", "MONITOR", "myinstance"]);
    }

    #[test]
    fn test_add_instance_without_sentinels() {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_create_container().returning(|_, _| Ok("abc".to_string()));
        runtime.expect_start_container().returning(|_, _| Ok(()));
        runtime.expect_inspect_host_port().returning(|_, _| Ok(49153));
        let mut health = MockHealthChecker::new();
        health.expect_add().returning(|_, _| Ok(()));

        let commander = Arc::new(RecordingCommander::default());
        let manager = manager(runtime, health, commander.clone(), &[], Arc::new(FixedProbe::healthy()));

        manager.add_instance("myinstance").unwrap();
        assert!(commander.calls.lock().is_empty());
    }

    #[test]
    fn test_create_failure_propagates() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_create_container()
            .returning(|_, _| Err(Error::Docker("image not found".into())));
        let manager = manager(
            runtime,
            MockHealthChecker::new(),
            Arc::new(RecordingCommander::default()),
            &[],
            Arc::new(FixedProbe::healthy()),
        );
        let err = manager.add_instance("myinstance").unwrap_err();
        assert!(matches!(err, Error::Docker(_)));
    }

    #[test]
    fn test_remove_instance() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_stop_container()
            .withf(|daemon, id| daemon == "http://localhost:4243" && id == "abc123")
            .times(1)
            .returning(|_, _| Ok(()));
        runtime
            .expect_remove_container()
            .withf(|daemon, id| daemon == "http://localhost:4243" && id == "abc123")
            .times(1)
            .returning(|_, _| Ok(()));
        let mut health = MockHealthChecker::new();
        health
            .expect_remove()
            .withf(|host, port| host == "localhost" && *port == 49153)
            .times(1)
            .returning(|_, _| Ok(()));

        let commander = Arc::new(RecordingCommander::default());
        let manager = manager(
            runtime,
            health,
            commander.clone(),
            &["http://host1.com:26379"],
            Arc::new(FixedProbe::healthy()),
        );

        let instance = Instance::new("myinstance", Plan::Basic, vec![Endpoint::new("localhost", 49153, "abc123")]);
        manager.remove_instance(&instance).unwrap();

        let calls = commander.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].2, vec!["SENTINEL", "REMOVE", "myinstance"]);
    }

    #[test]
    fn test_bind() {
        let manager = manager(
            MockContainerRuntime::new(),
            MockHealthChecker::new(),
            Arc::new(RecordingCommander::default()),
            &["http://host1.com:26379"],
            Arc::new(FixedProbe::healthy()),
        );
        let instance = Instance::new("myinstance", Plan::Basic, vec![Endpoint::new("localhost", 49153, "abc")]);

        let env = manager.bind(&instance).unwrap();
        assert_eq!(env["REDIS_HOST"], "localhost");
        assert_eq!(env["REDIS_PORT"], "49153");
        assert_eq!(env["REDIS_MASTER"], "myinstance");
        assert_eq!(env["REDIS_HOSTS"], r#"["localhost:49153"]"#);
        assert_eq!(env["SENTINEL_HOSTS"], r#"["http://host1.com:26379"]"#);
    }

    #[test]
    fn test_status_probes_endpoint() {
        let probe = Arc::new(FixedProbe::healthy());
        let manager = manager(
            MockContainerRuntime::new(),
            MockHealthChecker::new(),
            Arc::new(RecordingCommander::default()),
            &[],
            probe.clone(),
        );
        let instance = Instance::new("myinstance", Plan::Basic, vec![Endpoint::new("localhost", 49153, "abc")]);
        assert!(manager.status(&instance).is_healthy());
        assert_eq!(probe.calls(), vec![("localhost".to_string(), 49153, None)]);
    }
}
