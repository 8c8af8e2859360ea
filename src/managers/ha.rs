//! Plus plan: master and replica on two daemons, watched by sentinel

use std::sync::Arc;

use crate::models::{Instance, Plan};
use crate::probe::{HealthStatus, Probe};
use crate::replication::ReplicationConfigurator;
use crate::{Error, Result};

use super::topology::{topology_env, ContainerProvisioner};
use super::BindEnv;

pub struct HaManager {
    provisioner: Arc<ContainerProvisioner>,
    replication: Arc<ReplicationConfigurator>,
    sentinel_urls: Vec<String>,
    probe: Arc<dyn Probe>,
}

impl HaManager {
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

    /// Master on one random daemon, replica on another
    pub fn add_instance(&self, name: &str) -> Result<Instance> {
        let daemons = self.provisioner.pool().shuffled();
        let [master_daemon, replica_daemon, ..] = daemons.as_slice() else {
            return Err(Error::NotEnoughHosts {
                plan: Plan::Plus.to_string(),
                needed: Plan::Plus.endpoint_count(),
                available: daemons.len(),
            });
        };
        tracing::info!(
            instance = %name,
            master = %master_daemon.url,
            replica = %replica_daemon.url,
            "Provisioning HA instance"
        );

        let master = self.provisioner.provision(master_daemon)?;
        let replica = self.provisioner.provision(replica_daemon)?;

        self.replication.config_master(name, &master)?;
        self.replication.link_replica(&master, &replica)?;

        Ok(Instance::new(name, Plan::Plus, vec![master, replica]))
    }

    pub fn bind(&self, instance: &Instance) -> Result<BindEnv> {
        topology_env(&self.sentinel_urls, instance)
    }

    pub fn unbind(&self, _instance: &Instance) -> Result<()> {
        Ok(())
    }

    pub fn remove_instance(&self, instance: &Instance) -> Result<()> {
        tracing::info!(instance = %instance.name, "Removing HA instance");
        for endpoint in &instance.endpoints {
            self.provisioner.teardown(endpoint)?;
        }
        self.replication.remove(&instance.name)
    }

    /// Probes the recorded master only
    pub fn status(&self, instance: &Instance) -> HealthStatus {
        match instance.master() {
            Some(master) => self.probe.probe(&master.host, master.port, None),
            None => super::no_endpoint(instance),
        }
    }
}
