//! Monitoring item model

use serde::{Deserialize, Serialize};

/// Item and trigger registered with the monitoring system for one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckItem {
    pub host: String,
    pub port: u16,
    pub item_id: String,
    pub trigger_id: String,
}
