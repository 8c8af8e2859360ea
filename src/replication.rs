//! Sentinel registration and master/replica linking

use crate::models::Endpoint;
use crate::{Error, Result};
use reqwest::Url;
use std::sync::Arc;

/// Sends one command to the Redis-protocol server at `host:port`
pub trait RedisCommander: Send + Sync {
    fn execute(&self, host: &str, port: u16, command: &[String]) -> Result<()>;
}

/// [`RedisCommander`] over a fresh `redis` connection per command
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisConnector;

impl RedisConnector {
    /// Open a synchronous connection, authenticating when a password is given
    pub fn connect(host: &str, port: u16, password: Option<&str>) -> redis::RedisResult<redis::Connection> {
        let info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(host.to_string(), port),
            redis: redis::RedisConnectionInfo {
                password: password.map(str::to_string),
                ..Default::default()
            },
        };
        redis::Client::open(info)?.get_connection()
    }
}

impl RedisCommander for RedisConnector {
    fn execute(&self, host: &str, port: u16, command: &[String]) -> Result<()> {
        let (name, args) = command
            .split_first()
            .ok_or_else(|| Error::Other("empty redis command".into()))?;

        let mut con = Self::connect(host, port, None)?;
        let mut cmd = redis::cmd(name);
        for arg in args {
            cmd.arg(arg);
        }
        cmd.query::<redis::Value>(&mut con)?;
        Ok(())
    }
}

/// A monitor (sentinel) node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelHost {
    pub host: String,
    pub port: u16,
}

impl SentinelHost {
    /// Parse `http://host:26379` style URLs
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = |reason: String| {
            Error::Config(crate::ConfigError::InvalidValue {
                key: "SENTINEL_HOSTS".into(),
                reason,
            })
        };
        let parsed = Url::parse(url).map_err(|e| invalid(format!("'{}': {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| invalid(format!("'{}' has no host", url)))?;
        let port = parsed
            .port()
            .ok_or_else(|| invalid(format!("'{}' has no port", url)))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

/// Registers masters with every configured sentinel and links replicas
pub struct ReplicationConfigurator {
    sentinels: Vec<SentinelHost>,
    commander: Arc<dyn RedisCommander>,
}

impl ReplicationConfigurator {
    pub fn new(sentinels: Vec<SentinelHost>, commander: Arc<dyn RedisCommander>) -> Self {
        Self { sentinels, commander }
    }

    pub fn from_urls<S: AsRef<str>>(urls: &[S], commander: Arc<dyn RedisCommander>) -> Result<Self> {
        let sentinels = urls
            .iter()
            .map(|u| SentinelHost::parse(u.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(sentinels, commander))
    }

    pub fn has_sentinels(&self) -> bool {
        !self.sentinels.is_empty()
    }

    /// Start monitoring `endpoint` as master `name` on every sentinel
    pub fn config_master(&self, name: &str, endpoint: &Endpoint) -> Result<()> {
        let port = endpoint.port.to_string();
        let commands = [
            sentinel(&["MONITOR", name, &endpoint.host, &port, "1"]),
            sentinel(&["SET", name, "down-after-milliseconds", "5000"]),
            sentinel(&["SET", name, "failover-timeout", "60000"]),
            sentinel(&["SET", name, "parallel-syncs", "1"]),
        ];
        tracing::info!(master = %name, endpoint = %endpoint, sentinels = self.sentinels.len(), "Registering master with sentinels");
        self.on_each_sentinel(&commands)
    }

    /// Stop monitoring master `name` on every sentinel
    pub fn remove(&self, name: &str) -> Result<()> {
        tracing::info!(master = %name, "Removing master from sentinels");
        self.on_each_sentinel(&[sentinel(&["REMOVE", name])])
    }

    /// Make `replica` replicate from `master`
    pub fn link_replica(&self, master: &Endpoint, replica: &Endpoint) -> Result<()> {
        tracing::info!(master = %master, replica = %replica, "Linking replica");
        let command = vec![
            "SLAVEOF".to_string(),
            master.host.clone(),
            master.port.to_string(),
        ];
        self.commander.execute(&replica.host, replica.port, &command)
    }

    /// Run `commands` against each sentinel in order. A failing sentinel is
    /// logged and skipped; the first failure is returned once all were tried.
    fn on_each_sentinel(&self, commands: &[Vec<String>]) -> Result<()> {
        let mut first_error = None;
        for node in &self.sentinels {
            let outcome = commands
                .iter()
                .try_for_each(|cmd| self.commander.execute(&node.host, node.port, cmd));
            if let Err(e) = outcome {
                tracing::warn!(host = %node.host, port = node.port, error = %e, "Sentinel command failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn sentinel(args: &[&str]) -> Vec<String> {
    std::iter::once("SENTINEL")
        .chain(args.iter().copied())
        .map(str::to_string)
        .collect()
}
