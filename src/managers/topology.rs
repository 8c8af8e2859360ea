//! Pieces shared by the container-backed strategies

use std::sync::Arc;

use crate::docker::{ContainerRuntime, ContainerSpec, DaemonHost, DaemonPool};
use crate::health::HealthChecker;
use crate::models::{Endpoint, Instance};
use crate::ports::PortAllocator;
use crate::Result;

use super::BindEnv;

/// Environment every topology-aware client gets: monitor URLs, every
/// endpoint address, and the master name
pub fn topology_env(sentinel_urls: &[String], instance: &Instance) -> Result<BindEnv> {
    let addresses: Vec<String> = instance.endpoints.iter().map(Endpoint::address).collect();

    let mut env = BindEnv::new();
    env.insert("SENTINEL_HOSTS".into(), serde_json::to_string(sentinel_urls)?);
    env.insert("REDIS_HOSTS".into(), serde_json::to_string(&addresses)?);
    env.insert("REDIS_MASTER".into(), instance.name.clone());
    Ok(env)
}

/// Creates and destroys Redis containers on the daemon pool, with their
/// health checks
pub struct ContainerProvisioner {
    runtime: Arc<dyn ContainerRuntime>,
    health: Arc<dyn HealthChecker>,
    ports: Arc<PortAllocator>,
    pool: DaemonPool,
    image: String,
}

impl ContainerProvisioner {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        health: Arc<dyn HealthChecker>,
        ports: Arc<PortAllocator>,
        pool: DaemonPool,
        image: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            health,
            ports,
            pool,
            image: image.into(),
        }
    }

    pub fn pool(&self) -> &DaemonPool {
        &self.pool
    }

    /// Run a container on `daemon` and register its health check
    pub fn provision(&self, daemon: &DaemonHost) -> Result<Endpoint> {
        let port = self.ports.allocate(&daemon.hostname)?;
        let spec = ContainerSpec::new(&self.image, port);

        let endpoint = match self.run_container(daemon, &spec) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                if let Some(port) = port {
                    self.ports.release(&daemon.hostname, port);
                }
                return Err(e);
            }
        };

        self.health.add(&endpoint.host, endpoint.port)?;
        Ok(endpoint)
    }

    fn run_container(&self, daemon: &DaemonHost, spec: &ContainerSpec) -> Result<Endpoint> {
        let id = self.runtime.create_container(&daemon.url, spec)?;
        self.runtime.start_container(&daemon.url, &id)?;
        let port = self.runtime.inspect_host_port(&daemon.url, &id)?;

        tracing::info!(daemon = %daemon.url, container = %id, port, "Container running");
        Ok(Endpoint::new(daemon.hostname.clone(), port, id))
    }

    /// Stop and remove the endpoint's container, then drop its health check
    pub fn teardown(&self, endpoint: &Endpoint) -> Result<()> {
        let daemon = self.pool.find_by_hostname(&endpoint.host)?;

        self.runtime.stop_container(&daemon.url, &endpoint.container_id)?;
        self.runtime.remove_container(&daemon.url, &endpoint.container_id)?;
        self.health.remove(&endpoint.host, endpoint.port)?;

        tracing::info!(daemon = %daemon.url, container = %endpoint.container_id, "Container removed");
        Ok(())
    }
}
