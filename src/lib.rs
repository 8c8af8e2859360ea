//! Redis service broker
//!
//! Provisions Redis instances for a platform-as-a-service and serves the
//! REST API its service catalog talks to. Each service plan maps to one
//! provisioning strategy:
//!
//! - `development`: a database on a shared, externally managed server
//! - `basic`: one dedicated container on a pool of Docker daemons
//! - `plus`: a master and a replica container monitored by sentinel
//!
//! # Example
//!
//! ```no_run
//! use redis_broker::{Broker, BrokerConfig};
//!
//! let config = BrokerConfig::from_env()?;
//! let broker = Broker::new(config)?;
//!
//! broker.add_instance("myredis", "development")?;
//! let env = broker.bind("myredis", None)?;
//! assert_eq!(env["REDIS_PORT"], "6379");
//!
//! broker.remove_instance("myredis")?;
//! # Ok::<(), redis_broker::Error>(())
//! ```

pub mod acl;
pub mod api;
pub mod broker;
pub mod config;
pub mod db;
pub mod docker;
pub mod error;
pub mod health;
pub mod managers;
pub mod models;
pub mod ports;
pub mod probe;
pub mod replication;

pub use api::Server;
pub use broker::Broker;
pub use config::BrokerConfig;
pub use db::Database;
pub use error::{ConfigError, Error, Result};
pub use managers::{BindEnv, Managers, Strategy};
pub use probe::{HealthStatus, ProbeFailure, ProbeFailureKind};
