//! Broker service: plan dispatch, persistence and access grants

use std::sync::Arc;

use crate::acl::{build_access_manager, AccessManager};
use crate::config::BrokerConfig;
use crate::db::Database;
use crate::managers::{BindEnv, Managers};
use crate::models::{active_plans, Instance, Plan, PlanDescriptor};
use crate::probe::HealthStatus;
use crate::{Error, Result};

/// Entry point for every platform operation
pub struct Broker {
    config: BrokerConfig,
    db: Database,
    managers: Managers,
    access: Arc<dyn AccessManager>,
}

impl Broker {
    /// Build a broker with real clients, opening the configured database
    pub fn new(config: BrokerConfig) -> Result<Self> {
        let db = Database::open(&config.database_path)?;
        let managers = Managers::from_config(&config, db.clone())?;
        let access = build_access_manager(&config.access_manager);
        Ok(Self::with_parts(config, db, managers, access))
    }

    /// Build a broker from already constructed parts
    pub fn with_parts(
        config: BrokerConfig,
        db: Database,
        managers: Managers,
        access: Arc<dyn AccessManager>,
    ) -> Self {
        Self {
            config,
            db,
            managers,
            access,
        }
    }

    /// Provision a new instance of `plan_name`
    pub fn add_instance(&self, name: &str, plan_name: &str) -> Result<Instance> {
        if name.trim().is_empty() {
            return Err(Error::BadRequest("instance name is required".into()));
        }
        let plan: Plan = plan_name.parse()?;
        if self.db.find_instance_by_name(name)?.is_some() {
            return Err(Error::InstanceAlreadyExists(name.to_string()));
        }

        let strategy = self.managers.resolve(plan)?;
        tracing::info!(instance = %name, plan = %plan, strategy = strategy.name(), "Adding instance");
        let instance = strategy.add_instance(name)?;

        self.db.add_instance(&instance).map_err(|e| match e {
            Error::Database(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::InstanceAlreadyExists(name.to_string())
            }
            other => other,
        })?;
        tracing::info!(instance = %name, endpoints = instance.endpoints.len(), "Instance added");
        Ok(instance)
    }

    pub fn get_instance(&self, name: &str) -> Result<Instance> {
        self.db
            .find_instance_by_name(name)?
            .ok_or_else(|| Error::InstanceNotFound(name.to_string()))
    }

    /// Connection environment for `name`; grants access to `unit_host` when given
    pub fn bind(&self, name: &str, unit_host: Option<&str>) -> Result<BindEnv> {
        let instance = self.get_instance(name)?;
        let env = self.managers.resolve_instance(&instance)?.bind(&instance)?;

        if let Some(unit) = unit_host {
            self.access.grant_access(&instance, unit)?;
        }
        tracing::info!(instance = %name, unit = ?unit_host, "Instance bound");
        Ok(env)
    }

    pub fn unbind(&self, name: &str, unit_host: Option<&str>) -> Result<()> {
        let instance = self.get_instance(name)?;
        self.managers.resolve_instance(&instance)?.unbind(&instance)?;

        if let Some(unit) = unit_host {
            self.access.revoke_access(&instance, unit)?;
        }
        tracing::info!(instance = %name, unit = ?unit_host, "Instance unbound");
        Ok(())
    }

    /// Tear down every resource of `name`, then delete its record
    pub fn remove_instance(&self, name: &str) -> Result<()> {
        let instance = self.get_instance(name)?;
        self.managers.resolve_instance(&instance)?.remove_instance(&instance)?;
        self.db.remove_instance(name)?;
        tracing::info!(instance = %name, "Instance removed");
        Ok(())
    }

    pub fn status(&self, name: &str) -> Result<HealthStatus> {
        let instance = self.get_instance(name)?;
        Ok(self.managers.resolve_instance(&instance)?.status(&instance))
    }

    /// Catalog entries enabled by configuration
    pub fn plans(&self) -> Vec<PlanDescriptor> {
        active_plans(&self.config.active_plans)
    }

    pub fn list_instances(&self) -> Result<Vec<Instance>> {
        self.db.list_instances()
    }
}
