//! Broker configuration, read once from the environment

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error};

pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_DATABASE_PATH: &str = "redis-broker.db";

/// Complete broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub shared: SharedServerConfig,
    /// Present when the dedicated/HA plans can be served
    pub docker: Option<DockerConfig>,
    pub health_checker: HealthCheckerConfig,
    pub access_manager: AccessManagerConfig,
    /// Plan names offered in the catalog
    pub active_plans: Vec<String>,
    pub database_path: PathBuf,
}

/// The externally managed server behind the development plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedServerConfig {
    pub host: String,
    pub port: u16,
    pub public_host: Option<String>,
    pub password: Option<String>,
}

impl SharedServerConfig {
    /// Host handed out to applications
    pub fn public_host(&self) -> &str {
        self.public_host.as_deref().unwrap_or(&self.host)
    }
}

/// Container-backed plans
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerConfig {
    pub image: String,
    /// Docker daemon URLs, e.g. `http://host1:4243`
    pub hosts: Vec<String>,
    /// Sentinel URLs, e.g. `http://host1:26379`
    pub sentinel_hosts: Vec<String>,
    pub port_allocation: PortAllocation,
}

/// How the host port of a new container is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortAllocation {
    /// The daemon picks a free port
    #[default]
    Runtime,
    /// The broker picks max(used ports on host) + 1
    Sequential,
}

impl std::str::FromStr for PortAllocation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "runtime" => Ok(PortAllocation::Runtime),
            "sequential" => Ok(PortAllocation::Sequential),
            other => Err(ConfigError::InvalidValue {
                key: "DOCKER_PORT_ALLOCATION".into(),
                reason: format!("expected 'runtime' or 'sequential', got '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HealthCheckerConfig {
    #[default]
    Fake,
    Zabbix(ZabbixConfig),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZabbixConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    /// Zabbix host the items are attached to
    pub host_name: String,
    pub host_id: String,
    pub interface_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccessManagerConfig {
    #[default]
    InMemory,
    AclApi(AclApiConfig),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclApiConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
}

impl BrokerConfig {
    pub fn builder(shared_host: impl Into<String>) -> BrokerConfigBuilder {
        BrokerConfigBuilder::new(shared_host)
    }

    /// Read configuration from the process environment
    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup function
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let shared = SharedServerConfig {
            host: env.required("REDIS_SERVER_HOST")?,
            port: env.parsed("REDIS_SERVER_PORT")?.unwrap_or(DEFAULT_REDIS_PORT),
            public_host: env.optional("REDIS_PUBLIC_HOST"),
            password: env.optional("REDIS_SERVER_PASSWORD"),
        };

        let docker_keys = ["REDIS_IMAGE", "DOCKER_HOSTS", "SENTINEL_HOSTS"];
        let docker = if docker_keys.iter().any(|k| env.optional(k).is_some()) {
            Some(DockerConfig {
                image: env.required("REDIS_IMAGE")?,
                hosts: env.json_list("DOCKER_HOSTS")?,
                sentinel_hosts: env.json_list("SENTINEL_HOSTS")?,
                port_allocation: env.parsed("DOCKER_PORT_ALLOCATION")?.unwrap_or_default(),
            })
        } else {
            None
        };

        let health_checker = match env.optional("HEALTH_CHECKER").as_deref() {
            None | Some("fake") => HealthCheckerConfig::Fake,
            Some("zabbix") => HealthCheckerConfig::Zabbix(ZabbixConfig {
                url: env.required("ZABBIX_URL")?,
                user: env.required("ZABBIX_USER")?,
                password: env.required("ZABBIX_PASSWORD")?,
                host_name: env.required("ZABBIX_HOST")?,
                host_id: env.required("ZABBIX_HOST_ID")?,
                interface_id: env.required("ZABBIX_INTERFACE_ID")?,
            }),
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "HEALTH_CHECKER".into(),
                    reason: format!("unknown health checker '{}'", other),
                }
                .into())
            }
        };

        let access_manager = match env.optional("ACL_MANAGER").as_deref() {
            None | Some("default") => AccessManagerConfig::InMemory,
            Some("globo-acl-api") => AccessManagerConfig::AclApi(AclApiConfig {
                endpoint: env.required("ACL_API_ENDPOINT")?,
                username: env.required("ACL_API_USERNAME")?,
                password: env.required("ACL_API_PASSWORD")?,
            }),
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "ACL_MANAGER".into(),
                    reason: format!("unknown access manager '{}'", other),
                }
                .into())
            }
        };

        let active_plans = match env.optional("REDIS_API_PLANS") {
            Some(_) => env.json_list("REDIS_API_PLANS")?,
            None => Vec::new(),
        };

        let config = BrokerConfig {
            shared,
            docker,
            health_checker,
            access_manager,
            active_plans,
            database_path: env
                .optional("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.shared.port == 0 {
            return Err(invalid("REDIS_SERVER_PORT", "port cannot be 0"));
        }
        if let Some(docker) = &self.docker {
            if docker.hosts.is_empty() {
                return Err(invalid("DOCKER_HOSTS", "at least one docker host is required"));
            }
        }
        Ok(())
    }

    /// Docker section, or the error a dedicated/HA plan reports without it
    pub fn docker(&self) -> crate::Result<&DockerConfig> {
        self.docker.as_ref().ok_or_else(|| Error::missing("REDIS_IMAGE"))
    }
}

fn invalid(key: &str, reason: &str) -> Error {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn required(&self, key: &str) -> crate::Result<String> {
        self.optional(key).ok_or_else(|| Error::missing(key))
    }

    fn parsed<T>(&self, key: &str) -> crate::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key)
            .map(|raw| raw.parse::<T>().map_err(|e| invalid(key, &e.to_string())))
            .transpose()
    }

    fn json_list(&self, key: &str) -> crate::Result<Vec<String>> {
        let raw = self.required(key)?;
        serde_json::from_str(&raw).map_err(|e| invalid(key, &format!("expected a JSON list of strings: {}", e)))
    }
}

/// Builder used by tests and embedders
pub struct BrokerConfigBuilder {
    config: BrokerConfig,
}

impl BrokerConfigBuilder {
    pub fn new(shared_host: impl Into<String>) -> Self {
        Self {
            config: BrokerConfig {
                shared: SharedServerConfig {
                    host: shared_host.into(),
                    port: DEFAULT_REDIS_PORT,
                    public_host: None,
                    password: None,
                },
                docker: None,
                health_checker: HealthCheckerConfig::Fake,
                access_manager: AccessManagerConfig::InMemory,
                active_plans: Vec::new(),
                database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            },
        }
    }

    pub fn shared_port(mut self, port: u16) -> Self {
        self.config.shared.port = port;
        self
    }

    pub fn public_host(mut self, host: impl Into<String>) -> Self {
        self.config.shared.public_host = Some(host.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.shared.password = Some(password.into());
        self
    }

    pub fn docker<H, S, T, U>(mut self, image: impl Into<String>, hosts: H, sentinel_hosts: S) -> Self
    where
        H: IntoIterator<Item = T>,
        T: Into<String>,
        S: IntoIterator<Item = U>,
        U: Into<String>,
    {
        self.config.docker = Some(DockerConfig {
            image: image.into(),
            hosts: hosts.into_iter().map(Into::into).collect(),
            sentinel_hosts: sentinel_hosts.into_iter().map(Into::into).collect(),
            port_allocation: PortAllocation::Runtime,
        });
        self
    }

    pub fn port_allocation(mut self, allocation: PortAllocation) -> Self {
        if let Some(docker) = self.config.docker.as_mut() {
            docker.port_allocation = allocation;
        }
        self
    }

    pub fn health_checker(mut self, hc: HealthCheckerConfig) -> Self {
        self.config.health_checker = hc;
        self
    }

    pub fn access_manager(mut self, am: AccessManagerConfig) -> Self {
        self.config.access_manager = am;
        self
    }

    pub fn active_plans<I, S>(mut self, plans: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.active_plans = plans.into_iter().map(Into::into).collect();
        self
    }

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = path.into();
        self
    }

    pub fn build(self) -> BrokerConfig {
        self.config
    }

    pub fn build_validated(self) -> crate::Result<BrokerConfig> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_minimal_environment() {
        let config = BrokerConfig::from_lookup(lookup(&[("REDIS_SERVER_HOST", "localhost")])).unwrap();
        assert_eq!(config.shared.host, "localhost");
        assert_eq!(config.shared.port, 6379);
        assert_eq!(config.shared.public_host(), "localhost");
        assert!(config.shared.password.is_none());
        assert!(config.docker.is_none());
        assert_eq!(config.health_checker, HealthCheckerConfig::Fake);
        assert_eq!(config.access_manager, AccessManagerConfig::InMemory);
        assert!(config.active_plans.is_empty());
        assert_eq!(config.database_path, PathBuf::from(DEFAULT_DATABASE_PATH));
    }

    #[test]
    fn test_missing_server_host() {
        let err = BrokerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "You must define the REDIS_SERVER_HOST environment variable."
        );
    }

    #[test]
    fn test_shared_overrides() {
        let config = BrokerConfig::from_lookup(lookup(&[
            ("REDIS_SERVER_HOST", "localhost"),
            ("REDIS_SERVER_PORT", "12345"),
            ("REDIS_PUBLIC_HOST", "redis.tsuru.io"),
            ("REDIS_SERVER_PASSWORD", "s3cr3t"),
        ]))
        .unwrap();
        assert_eq!(config.shared.port, 12345);
        assert_eq!(config.shared.public_host(), "redis.tsuru.io");
        assert_eq!(config.shared.password.as_deref(), Some("s3cr3t"));
    }

    #[test]
    fn test_invalid_port() {
        let err = BrokerConfig::from_lookup(lookup(&[
            ("REDIS_SERVER_HOST", "localhost"),
            ("REDIS_SERVER_PORT", "not-a-port"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::InvalidValue { ref key, .. }) if key == "REDIS_SERVER_PORT"));
    }

    #[test]
    fn test_docker_section() {
        let config = BrokerConfig::from_lookup(lookup(&[
            ("REDIS_SERVER_HOST", "localhost"),
            ("REDIS_IMAGE", "redisapi"),
            (
                "DOCKER_HOSTS",
                r#"["http://host1.com:4243", "http://localhost:4243", "http://host2.com:4243"]"#,
            ),
            ("SENTINEL_HOSTS", r#"["http://host1.com:26379"]"#),
            ("DOCKER_PORT_ALLOCATION", "sequential"),
        ]))
        .unwrap();

        let docker = config.docker().unwrap();
        assert_eq!(docker.image, "redisapi");
        assert_eq!(
            docker.hosts,
            vec!["http://host1.com:4243", "http://localhost:4243", "http://host2.com:4243"]
        );
        assert_eq!(docker.sentinel_hosts, vec!["http://host1.com:26379"]);
        assert_eq!(docker.port_allocation, PortAllocation::Sequential);
    }

    #[test]
    fn test_partial_docker_section_names_missing_variable() {
        let err = BrokerConfig::from_lookup(lookup(&[
            ("REDIS_SERVER_HOST", "localhost"),
            ("REDIS_IMAGE", "redisapi"),
            ("DOCKER_HOSTS", r#"["http://host1:4243"]"#),
        ]))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "You must define the SENTINEL_HOSTS environment variable."
        );
    }

    #[test]
    fn test_docker_accessor_without_section() {
        let config = BrokerConfig::builder("localhost").build();
        let err = config.docker().unwrap_err();
        assert_eq!(err.to_string(), "You must define the REDIS_IMAGE environment variable.");
    }

    #[test]
    fn test_docker_hosts_must_be_json() {
        let err = BrokerConfig::from_lookup(lookup(&[
            ("REDIS_SERVER_HOST", "localhost"),
            ("REDIS_IMAGE", "redisapi"),
            ("DOCKER_HOSTS", "host1,host2"),
            ("SENTINEL_HOSTS", "[]"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::InvalidValue { ref key, .. }) if key == "DOCKER_HOSTS"));
    }

    #[test]
    fn test_empty_docker_hosts_rejected() {
        let err = BrokerConfig::from_lookup(lookup(&[
            ("REDIS_SERVER_HOST", "localhost"),
            ("REDIS_IMAGE", "redisapi"),
            ("DOCKER_HOSTS", "[]"),
            ("SENTINEL_HOSTS", "[]"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_zabbix_requires_credentials() {
        let err = BrokerConfig::from_lookup(lookup(&[
            ("REDIS_SERVER_HOST", "localhost"),
            ("HEALTH_CHECKER", "zabbix"),
            ("ZABBIX_URL", "http://zabbix"),
        ]))
        .unwrap_err();
        assert_eq!(err.to_string(), "You must define the ZABBIX_USER environment variable.");
    }

    #[test]
    fn test_acl_manager_selection() {
        let config = BrokerConfig::from_lookup(lookup(&[
            ("REDIS_SERVER_HOST", "localhost"),
            ("ACL_MANAGER", "globo-acl-api"),
            ("ACL_API_ENDPOINT", "http://localhost"),
            ("ACL_API_USERNAME", "redis"),
            ("ACL_API_PASSWORD", "passw"),
        ]))
        .unwrap();
        assert_eq!(
            config.access_manager,
            AccessManagerConfig::AclApi(AclApiConfig {
                endpoint: "http://localhost".into(),
                username: "redis".into(),
                password: "passw".into(),
            })
        );
    }

    #[test]
    fn test_unknown_health_checker() {
        let err = BrokerConfig::from_lookup(lookup(&[
            ("REDIS_SERVER_HOST", "localhost"),
            ("HEALTH_CHECKER", "nagios"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::InvalidValue { ref key, .. }) if key == "HEALTH_CHECKER"));
    }

    #[test]
    fn test_active_plans() {
        let config = BrokerConfig::from_lookup(lookup(&[
            ("REDIS_SERVER_HOST", "localhost"),
            ("REDIS_API_PLANS", r#"["development", "basic", "plus"]"#),
        ]))
        .unwrap();
        assert_eq!(config.active_plans, vec!["development", "basic", "plus"]);
    }

    #[test]
    fn test_builder() {
        let config = BrokerConfig::builder("localhost")
            .shared_port(6380)
            .password("s3cr3t")
            .docker("redisapi", ["http://h1:4243", "http://h2:4243"], ["http://h1:26379"])
            .port_allocation(PortAllocation::Sequential)
            .active_plans(["basic"])
            .build_validated()
            .unwrap();

        assert_eq!(config.shared.port, 6380);
        let docker = config.docker().unwrap();
        assert_eq!(docker.hosts.len(), 2);
        assert_eq!(docker.port_allocation, PortAllocation::Sequential);
        assert_eq!(config.active_plans, vec!["basic"]);
    }
}
