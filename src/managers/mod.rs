//! Provisioning strategies and plan dispatch
//!
//! Each plan maps to exactly one strategy:
//!
//! | Plan          | Strategy    | Topology                                   |
//! |---------------|-------------|--------------------------------------------|
//! | `development` | `Shared`    | database on the shared server              |
//! | `basic`       | `Dedicated` | one container                              |
//! | `plus`        | `Ha`        | master + replica containers, sentinel      |

mod dedicated;
mod ha;
mod shared;
mod topology;

pub use dedicated::DedicatedManager;
pub use ha::HaManager;
pub use shared::SharedManager;
pub use topology::{topology_env, ContainerProvisioner};

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::BrokerConfig;
use crate::db::Database;
use crate::docker::{ContainerRuntime, DaemonPool, DockerClient};
use crate::error::ConfigError;
use crate::health::{build_health_checker, HealthChecker};
use crate::models::{Instance, Plan};
use crate::ports::PortAllocator;
use crate::probe::{HealthStatus, Probe, ProbeFailure, ProbeFailureKind, RedisProbe};
use crate::replication::{RedisCommander, RedisConnector, ReplicationConfigurator};
use crate::{Error, Result};

/// Connection environment handed to a bound application
pub type BindEnv = BTreeMap<String, String>;

/// A provisioning strategy
pub enum Strategy {
    Shared(SharedManager),
    Dedicated(DedicatedManager),
    Ha(HaManager),
}

impl Strategy {
    pub fn add_instance(&self, name: &str) -> Result<Instance> {
        match self {
            Strategy::Shared(m) => m.add_instance(name),
            Strategy::Dedicated(m) => m.add_instance(name),
            Strategy::Ha(m) => m.add_instance(name),
        }
    }

    pub fn bind(&self, instance: &Instance) -> Result<BindEnv> {
        match self {
            Strategy::Shared(m) => m.bind(instance),
            Strategy::Dedicated(m) => m.bind(instance),
            Strategy::Ha(m) => m.bind(instance),
        }
    }

    pub fn unbind(&self, instance: &Instance) -> Result<()> {
        match self {
            Strategy::Shared(m) => m.unbind(instance),
            Strategy::Dedicated(m) => m.unbind(instance),
            Strategy::Ha(m) => m.unbind(instance),
        }
    }

    pub fn remove_instance(&self, instance: &Instance) -> Result<()> {
        match self {
            Strategy::Shared(m) => m.remove_instance(instance),
            Strategy::Dedicated(m) => m.remove_instance(instance),
            Strategy::Ha(m) => m.remove_instance(instance),
        }
    }

    pub fn status(&self, instance: &Instance) -> HealthStatus {
        match self {
            Strategy::Shared(m) => m.status(),
            Strategy::Dedicated(m) => m.status(instance),
            Strategy::Ha(m) => m.status(instance),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Shared(_) => "shared",
            Strategy::Dedicated(_) => "dedicated",
            Strategy::Ha(_) => "ha",
        }
    }
}

/// Collaborators the strategies are built from
#[derive(Clone)]
pub struct ManagerDeps {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub health: Arc<dyn HealthChecker>,
    pub commander: Arc<dyn RedisCommander>,
    pub probe: Arc<dyn Probe>,
    pub db: Database,
}

impl ManagerDeps {
    /// Real Docker, Redis and monitoring clients
    pub fn from_config(config: &BrokerConfig, db: Database) -> Self {
        Self {
            runtime: Arc::new(DockerClient::new()),
            health: build_health_checker(&config.health_checker, db.clone()),
            commander: Arc::new(RedisConnector),
            probe: Arc::new(RedisProbe),
            db,
        }
    }
}

/// Fixed plan → strategy table. Container-backed strategies that could not be
/// configured keep the configuration error and report it on resolution.
pub struct Managers {
    shared: Strategy,
    dedicated: std::result::Result<Strategy, ConfigError>,
    ha: std::result::Result<Strategy, ConfigError>,
}

impl Managers {
    pub fn new(config: &BrokerConfig, deps: ManagerDeps) -> Result<Self> {
        let shared = Strategy::Shared(SharedManager::new(config.shared.clone(), deps.probe.clone()));

        let (dedicated, ha) = match config.docker() {
            Ok(docker) => {
                let ports = Arc::new(PortAllocator::new(docker.port_allocation, deps.db.clone()));
                let provisioner = Arc::new(ContainerProvisioner::new(
                    deps.runtime.clone(),
                    deps.health.clone(),
                    ports,
                    DaemonPool::from_urls(&docker.hosts)?,
                    docker.image.clone(),
                ));
                let replication = Arc::new(ReplicationConfigurator::from_urls(
                    &docker.sentinel_hosts,
                    deps.commander.clone(),
                )?);

                let dedicated = DedicatedManager::new(
                    provisioner.clone(),
                    replication.clone(),
                    docker.sentinel_hosts.clone(),
                    deps.probe.clone(),
                );
                let ha = HaManager::new(
                    provisioner,
                    replication,
                    docker.sentinel_hosts.clone(),
                    deps.probe.clone(),
                );
                (Ok(Strategy::Dedicated(dedicated)), Ok(Strategy::Ha(ha)))
            }
            Err(Error::Config(missing)) => (Err(missing.clone()), Err(missing)),
            Err(e) => return Err(e),
        };

        Ok(Self { shared, dedicated, ha })
    }

    pub fn from_config(config: &BrokerConfig, db: Database) -> Result<Self> {
        Self::new(config, ManagerDeps::from_config(config, db))
    }

    pub fn resolve(&self, plan: Plan) -> Result<&Strategy> {
        let slot = match plan {
            Plan::Development => return Ok(&self.shared),
            Plan::Basic => &self.dedicated,
            Plan::Plus => &self.ha,
        };
        slot.as_ref().map_err(|e| e.clone().into())
    }

    pub fn resolve_instance(&self, instance: &Instance) -> Result<&Strategy> {
        self.resolve(instance.plan)
    }
}

pub(crate) fn no_endpoint(instance: &Instance) -> HealthStatus {
    HealthStatus::Unhealthy(ProbeFailure {
        kind: ProbeFailureKind::Protocol,
        message: format!("instance {} has no endpoint", instance.name),
    })
}
