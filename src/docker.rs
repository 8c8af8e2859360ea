//! Docker Engine API client and the pool of container daemons

use crate::{Error, Result};
use rand::seq::SliceRandom;
use reqwest::blocking::{Client, Response};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

/// Redis port inside every container
const REDIS_PORT_KEY: &str = "6379/tcp";

/// What to run in a new container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    /// Fixed host port, or `None` to let the daemon pick one
    pub host_port: Option<u16>,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>, host_port: Option<u16>) -> Self {
        Self {
            image: image.into(),
            host_port,
        }
    }

    /// Body of `POST /containers/create`
    pub fn to_create_body(&self) -> serde_json::Value {
        let host_port = self.host_port.map(|p| p.to_string()).unwrap_or_default();
        json!({
            "Image": self.image,
            "ExposedPorts": { REDIS_PORT_KEY: {} },
            "HostConfig": {
                "PortBindings": {
                    REDIS_PORT_KEY: [{ "HostIp": "0.0.0.0", "HostPort": host_port }]
                }
            }
        })
    }
}

/// Operations the strategies need from a container daemon.
/// `daemon` is the daemon's base URL.
#[cfg_attr(test, mockall::automock)]
pub trait ContainerRuntime: Send + Sync {
    /// Create a container, returning its id
    fn create_container(&self, daemon: &str, spec: &ContainerSpec) -> Result<String>;

    fn start_container(&self, daemon: &str, id: &str) -> Result<()>;

    /// Host port bound to the container's Redis port
    fn inspect_host_port(&self, daemon: &str, id: &str) -> Result<u16>;

    fn stop_container(&self, daemon: &str, id: &str) -> Result<()>;

    fn remove_container(&self, daemon: &str, id: &str) -> Result<()>;
}

// ===== Engine API responses =====

#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectResponse {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "NetworkSettings")]
    pub network_settings: NetworkSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    #[serde(rename = "Ports", default)]
    pub ports: HashMap<String, Option<Vec<PortBinding>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortBinding {
    #[serde(rename = "HostIp", default)]
    pub host_ip: String,
    #[serde(rename = "HostPort")]
    pub host_port: String,
}

impl InspectResponse {
    /// First host port bound to the Redis port
    pub fn redis_host_port(&self) -> Result<u16> {
        let binding = self
            .network_settings
            .ports
            .get(REDIS_PORT_KEY)
            .and_then(|b| b.as_ref())
            .and_then(|b| b.first())
            .ok_or_else(|| Error::Docker(format!("container {} has no binding for {}", self.id, REDIS_PORT_KEY)))?;

        binding
            .host_port
            .parse()
            .map_err(|_| Error::Docker(format!("invalid host port '{}'", binding.host_port)))
    }
}

/// Blocking Docker Engine API client
pub struct DockerClient {
    client: Client,
}

impl DockerClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn url(daemon: &str, path: &str) -> String {
        format!("{}{}", daemon.trim_end_matches('/'), path)
    }

    fn check(resp: Response, what: &str) -> Result<Response> {
        let status = resp.status();
        // 304: container already started/stopped
        if status.is_success() || status == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(resp);
        }
        let body = resp.text().unwrap_or_default();
        Err(Error::Docker(format!("{} failed ({}): {}", what, status, body.trim())))
    }

    pub fn inspect(&self, daemon: &str, id: &str) -> Result<InspectResponse> {
        let resp = self
            .client
            .get(Self::url(daemon, &format!("/containers/{}/json", id)))
            .send()?;
        Ok(Self::check(resp, "inspect")?.json()?)
    }
}

impl Default for DockerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerRuntime for DockerClient {
    fn create_container(&self, daemon: &str, spec: &ContainerSpec) -> Result<String> {
        let resp = self
            .client
            .post(Self::url(daemon, "/containers/create"))
            .json(&spec.to_create_body())
            .send()?;
        let created: CreateResponse = Self::check(resp, "create")?.json()?;
        tracing::debug!(daemon, image = %spec.image, id = %created.id, "Container created");
        Ok(created.id)
    }

    fn start_container(&self, daemon: &str, id: &str) -> Result<()> {
        let resp = self
            .client
            .post(Self::url(daemon, &format!("/containers/{}/start", id)))
            .send()?;
        Self::check(resp, "start")?;
        Ok(())
    }

    fn inspect_host_port(&self, daemon: &str, id: &str) -> Result<u16> {
        self.inspect(daemon, id)?.redis_host_port()
    }

    fn stop_container(&self, daemon: &str, id: &str) -> Result<()> {
        let resp = self
            .client
            .post(Self::url(daemon, &format!("/containers/{}/stop", id)))
            .send()?;
        Self::check(resp, "stop")?;
        Ok(())
    }

    fn remove_container(&self, daemon: &str, id: &str) -> Result<()> {
        let resp = self
            .client
            .delete(Self::url(daemon, &format!("/containers/{}", id)))
            .send()?;
        Self::check(resp, "remove")?;
        Ok(())
    }
}

// ===== Daemon pool =====

/// A configured daemon: its URL and the hostname endpoints are recorded under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonHost {
    pub url: String,
    pub hostname: String,
}

impl DaemonHost {
    pub fn parse(url: &str) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::Config(crate::ConfigError::InvalidValue {
                key: "DOCKER_HOSTS".into(),
                reason: format!("'{}': {}", url, e),
            }))?;
        let hostname = parsed
            .host_str()
            .ok_or_else(|| Error::Config(crate::ConfigError::InvalidValue {
                key: "DOCKER_HOSTS".into(),
                reason: format!("'{}' has no host", url),
            }))?
            .to_string();
        Ok(Self {
            url: url.to_string(),
            hostname,
        })
    }
}

/// Daemons new containers can be placed on. Endpoints only record the
/// hostname, so each daemon must be on a distinct host.
#[derive(Debug, Clone)]
pub struct DaemonPool {
    hosts: Vec<DaemonHost>,
}

impl DaemonPool {
    pub fn from_urls<S: AsRef<str>>(urls: &[S]) -> Result<Self> {
        let mut hosts: Vec<DaemonHost> = Vec::with_capacity(urls.len());
        for url in urls {
            let host = DaemonHost::parse(url.as_ref())?;
            if let Some(other) = hosts.iter().find(|h| h.hostname == host.hostname) {
                return Err(crate::ConfigError::InvalidValue {
                    key: "DOCKER_HOSTS".into(),
                    reason: format!("'{}' and '{}' share host {}", other.url, host.url, host.hostname),
                }
                .into());
            }
            hosts.push(host);
        }
        Ok(Self { hosts })
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn hosts(&self) -> &[DaemonHost] {
        &self.hosts
    }

    /// One daemon chosen uniformly at random
    pub fn random(&self) -> Result<&DaemonHost> {
        self.hosts
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| Error::missing("DOCKER_HOSTS"))
    }

    /// Every daemon, in random order
    pub fn shuffled(&self) -> Vec<&DaemonHost> {
        let mut hosts: Vec<&DaemonHost> = self.hosts.iter().collect();
        hosts.shuffle(&mut rand::thread_rng());
        hosts
    }

    /// Daemon whose URL hostname equals `hostname`
    pub fn find_by_hostname(&self, hostname: &str) -> Result<&DaemonHost> {
        self.hosts
            .iter()
            .find(|h| h.hostname == hostname)
            .ok_or_else(|| Error::UnknownContainerHost(hostname.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{DELETE, GET, POST},
        MockServer,
    };

    #[test]
    fn test_create_body_runtime_port() {
        let body = ContainerSpec::new("redisapi", None).to_create_body();
        assert_eq!(body["Image"], "redisapi");
        assert!(body["ExposedPorts"]["6379/tcp"].is_object());
        let binding = &body["HostConfig"]["PortBindings"]["6379/tcp"][0];
        assert_eq!(binding["HostIp"], "0.0.0.0");
        assert_eq!(binding["HostPort"], "");
    }

    #[test]
    fn test_create_body_fixed_port() {
        let body = ContainerSpec::new("redisapi", Some(49153)).to_create_body();
        assert_eq!(body["HostConfig"]["PortBindings"]["6379/tcp"][0]["HostPort"], "49153");
    }

    #[test]
    fn test_inspect_host_port() {
        let raw = r#"{
            "Id": "abc123",
            "State": {"Running": true},
            "NetworkSettings": {
                "Ports": {
                    "6379/tcp": [{"HostIp": "0.0.0.0", "HostPort": "49154"}]
                }
            }
        }"#;
        let inspect: InspectResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(inspect.redis_host_port().unwrap(), 49154);
    }

    #[test]
    fn test_inspect_without_binding() {
        let raw = r#"{"Id": "abc123", "NetworkSettings": {"Ports": {"6379/tcp": null}}}"#;
        let inspect: InspectResponse = serde_json::from_str(raw).unwrap();
        assert!(matches!(inspect.redis_host_port(), Err(Error::Docker(_))));
    }

    #[test]
    fn test_daemon_host_parse() {
        let host = DaemonHost::parse("http://host1.com:4243").unwrap();
        assert_eq!(host.hostname, "host1.com");
        assert_eq!(host.url, "http://host1.com:4243");

        assert!(DaemonHost::parse("not a url").is_err());
    }

    #[test]
    fn test_pool_find_by_hostname() {
        let pool = DaemonPool::from_urls(&["http://host1.com:4243", "http://localhost:4243"]).unwrap();
        assert_eq!(pool.find_by_hostname("localhost").unwrap().url, "http://localhost:4243");
        assert!(matches!(
            pool.find_by_hostname("host9.com"),
            Err(Error::UnknownContainerHost(ref h)) if h == "host9.com"
        ));
    }

    #[test]
    fn test_pool_random_and_shuffle() {
        let urls = ["http://a:4243", "http://b:4243", "http://c:4243"];
        let pool = DaemonPool::from_urls(&urls).unwrap();

        let chosen = pool.random().unwrap();
        assert!(urls.contains(&chosen.url.as_str()));

        let mut shuffled: Vec<_> = pool.shuffled().iter().map(|h| h.hostname.clone()).collect();
        shuffled.sort();
        assert_eq!(shuffled, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_pool_rejects_shared_hostname() {
        let err = DaemonPool::from_urls(&["http://h:4243", "http://h:4244"]).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(crate::ConfigError::InvalidValue { ref key, .. }) if key == "DOCKER_HOSTS"
        ));
    }

    #[test]
    fn test_client_container_lifecycle() {
        let server = MockServer::start();
        let daemon = server.base_url();
        let client = DockerClient::new();

        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/containers/create")
                .json_body_partial(r#"{"Image": "redisapi", "ExposedPorts": {"6379/tcp": {}}}"#);
            then.status(201)
                .header("content-type", "application/json")
                .json_body(json!({"Id": "abc123", "Warnings": []}));
        });
        let start = server.mock(|when, then| {
            when.method(POST).path("/containers/abc123/start");
            then.status(204);
        });
        let inspect = server.mock(|when, then| {
            when.method(GET).path("/containers/abc123/json");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "Id": "abc123",
                    "NetworkSettings": {
                        "Ports": {"6379/tcp": [{"HostIp": "0.0.0.0", "HostPort": "49155"}]}
                    }
                }));
        });

        let id = client
            .create_container(&daemon, &ContainerSpec::new("redisapi", None))
            .unwrap();
        assert_eq!(id, "abc123");
        client.start_container(&daemon, &id).unwrap();
        assert_eq!(client.inspect_host_port(&daemon, &id).unwrap(), 49155);

        create.assert_hits(1);
        start.assert_hits(1);
        inspect.assert_hits(1);
    }

    #[test]
    fn test_client_accepts_not_modified() {
        let server = MockServer::start();
        let daemon = server.base_url();
        let client = DockerClient::new();

        let start = server.mock(|when, then| {
            when.method(POST).path("/containers/abc123/start");
            then.status(304);
        });
        let stop = server.mock(|when, then| {
            when.method(POST).path("/containers/abc123/stop");
            then.status(304);
        });
        let remove = server.mock(|when, then| {
            when.method(DELETE).path("/containers/abc123");
            then.status(204);
        });

        client.start_container(&daemon, "abc123").unwrap();
        client.stop_container(&daemon, "abc123").unwrap();
        client.remove_container(&daemon, "abc123").unwrap();
        start.assert_hits(1);
        stop.assert_hits(1);
        remove.assert_hits(1);
    }

    #[test]
    fn test_client_reports_daemon_error_body() {
        let server = MockServer::start();
        let daemon = server.base_url();

        server.mock(|when, then| {
            when.method(POST).path("/containers/create");
            then.status(404)
                .header("content-type", "application/json")
                .json_body(json!({"message": "No such image: redisapi:latest"}));
        });

        let err = DockerClient::new()
            .create_container(&daemon, &ContainerSpec::new("redisapi", Some(49153)))
            .unwrap_err();
        match err {
            Error::Docker(message) => {
                assert!(message.starts_with("create failed (404"));
                assert!(message.contains("No such image: redisapi:latest"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_pool() {
        let pool = DaemonPool::from_urls::<&str>(&[]).unwrap();
        assert!(pool.is_empty());
        assert!(pool.random().is_err());
    }
}
