//! Service plans and the static plan catalog

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Provisioning tier; decides the topology of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    /// Database on the shared server
    Development,
    /// One dedicated container
    Basic,
    /// Master and replica containers watched by sentinel
    Plus,
}

impl Plan {
    pub const ALL: [Plan; 3] = [Plan::Development, Plan::Basic, Plan::Plus];

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Development => "development",
            Plan::Basic => "basic",
            Plan::Plus => "plus",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Plan::Development => "Is a shared instance.",
            Plan::Basic => "Is a dedicated instance. With 1GB of memory.",
            Plan::Plus => {
                "Is 2 dedicated instances. With 1GB of memory and HA and failover support via redis-sentinel."
            }
        }
    }

    /// Number of endpoints an instance of this plan has
    pub fn endpoint_count(&self) -> usize {
        match self {
            Plan::Development | Plan::Basic => 1,
            Plan::Plus => 2,
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Plan::Development),
            "basic" => Ok(Plan::Basic),
            "plus" => Ok(Plan::Plus),
            other => Err(crate::Error::UnknownPlan(other.to_string())),
        }
    }
}

/// Entry of the plan catalog served to the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDescriptor {
    pub name: String,
    pub description: String,
}

impl From<Plan> for PlanDescriptor {
    fn from(plan: Plan) -> Self {
        Self {
            name: plan.as_str().to_string(),
            description: plan.description().to_string(),
        }
    }
}

/// Full catalog, in display order
pub fn catalog() -> Vec<PlanDescriptor> {
    Plan::ALL.iter().copied().map(PlanDescriptor::from).collect()
}

/// Catalog entries whose name is in `active`, keeping catalog order.
/// Unknown names in `active` are ignored.
pub fn active_plans<S: AsRef<str>>(active: &[S]) -> Vec<PlanDescriptor> {
    catalog()
        .into_iter()
        .filter(|p| active.iter().any(|a| a.as_ref() == p.name))
        .collect()
}
