//! Health-check registration with the monitoring system

use crate::config::{HealthCheckerConfig, ZabbixConfig};
use crate::db::Database;
use crate::models::HealthCheckItem;
use crate::{Error, Result};
use parking_lot::Mutex;
use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::sync::Arc;

/// Registers and deregisters a liveness check for an endpoint
#[cfg_attr(test, mockall::automock)]
pub trait HealthChecker: Send + Sync {
    fn add(&self, host: &str, port: u16) -> Result<()>;
    fn remove(&self, host: &str, port: u16) -> Result<()>;
}

/// Build the checker selected by configuration
pub fn build_health_checker(config: &HealthCheckerConfig, db: Database) -> Arc<dyn HealthChecker> {
    match config {
        HealthCheckerConfig::Fake => Arc::new(NoopHealthCheck),
        HealthCheckerConfig::Zabbix(zabbix) => Arc::new(ZabbixHealthCheck::new(zabbix.clone(), db)),
    }
}

/// Accepts everything, registers nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHealthCheck;

impl HealthChecker for NoopHealthCheck {
    fn add(&self, host: &str, port: u16) -> Result<()> {
        tracing::debug!(host, port, "Health check add (noop)");
        Ok(())
    }

    fn remove(&self, host: &str, port: u16) -> Result<()> {
        tracing::debug!(host, port, "Health check remove (noop)");
        Ok(())
    }
}

/// Zabbix JSON-RPC checker: one TCP service item plus trigger per endpoint
pub struct ZabbixHealthCheck {
    config: ZabbixConfig,
    db: Database,
    client: Client,
    token: Mutex<Option<String>>,
}

impl ZabbixHealthCheck {
    pub fn new(config: ZabbixConfig, db: Database) -> Self {
        Self {
            config,
            db,
            client: Client::new(),
            token: Mutex::new(None),
        }
    }

    fn api_url(&self) -> String {
        format!("{}/api_jsonrpc.php", self.config.url.trim_end_matches('/'))
    }

    fn send(&self, method: &str, params: Value, auth: Option<&str>) -> Result<Value> {
        let body = rpc_request(method, params, auth);
        Ok(self
            .client
            .post(self.api_url())
            .json(&body)
            .send()?
            .error_for_status()?
            .json()?)
    }

    fn call(&self, method: &str, params: Value, auth: Option<&str>) -> Result<Value> {
        rpc_result(self.send(method, params, auth)?)
    }

    fn token(&self) -> Result<String> {
        let mut token = self.token.lock();
        if let Some(t) = token.as_ref() {
            return Ok(t.clone());
        }
        let result = self.call(
            "user.login",
            json!({ "user": self.config.user, "password": self.config.password }),
            None,
        )?;
        let t = result
            .as_str()
            .ok_or_else(|| Error::HealthCheck("user.login returned no token".into()))?
            .to_string();
        *token = Some(t.clone());
        Ok(t)
    }

    /// Call `method` with the session token, logging in again once if the
    /// server has ended the session
    fn authed(&self, method: &str, params: Value) -> Result<Value> {
        let token = self.token()?;
        let resp = self.send(method, params.clone(), Some(&token))?;
        if !session_expired(&resp) {
            return rpc_result(resp);
        }

        tracing::info!(method, "Zabbix session expired, logging in again");
        {
            let mut cached = self.token.lock();
            if cached.as_deref() == Some(token.as_str()) {
                *cached = None;
            }
        }
        let token = self.token()?;
        self.call(method, params, Some(&token))
    }
}

impl HealthChecker for ZabbixHealthCheck {
    fn add(&self, host: &str, port: u16) -> Result<()> {
        let item = self.authed("item.create", item_params(&self.config, host, port))?;
        let item_id = first_id(&item, "itemids")?;

        let trigger = self.authed("trigger.create", trigger_params(&self.config, host, port))?;
        let trigger_id = first_id(&trigger, "triggerids")?;

        self.db.add_health_check_item(&HealthCheckItem {
            host: host.to_string(),
            port,
            item_id: item_id.clone(),
            trigger_id: trigger_id.clone(),
        })?;
        tracing::info!(host, port, item_id = %item_id, trigger_id = %trigger_id, "Zabbix health check added");
        Ok(())
    }

    fn remove(&self, host: &str, port: u16) -> Result<()> {
        let Some(item) = self.db.find_health_check_item(host, port)? else {
            tracing::warn!(host, port, "No health check registered, nothing to remove");
            return Ok(());
        };

        self.authed("trigger.delete", json!([item.trigger_id]))?;
        self.authed("item.delete", json!([item.item_id]))?;
        self.db.remove_health_check_item(host, port)?;
        tracing::info!(host, port, "Zabbix health check removed");
        Ok(())
    }
}

fn item_key(host: &str, port: u16) -> String {
    format!("net.tcp.service[tcp,{},{}]", host, port)
}

fn rpc_request(method: &str, params: Value, auth: Option<&str>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "auth": auth,
        "id": 1,
    })
}

fn rpc_result(resp: Value) -> Result<Value> {
    if let Some(err) = resp.get("error") {
        let message = err.get("message").and_then(Value::as_str).unwrap_or("unknown error");
        let data = err.get("data").and_then(Value::as_str).unwrap_or("");
        return Err(Error::HealthCheck(format!("{} {}", message, data).trim().to_string()));
    }
    resp.get("result")
        .cloned()
        .ok_or_else(|| Error::HealthCheck("response has neither result nor error".into()))
}

/// Zabbix reports a dead or unknown session as an error whose text asks for a
/// new login
fn session_expired(resp: &Value) -> bool {
    let Some(err) = resp.get("error") else {
        return false;
    };
    let text = ["message", "data"]
        .iter()
        .filter_map(|f| err.get(*f).and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    ["session terminated", "re-login", "not authorised", "not authorized"]
        .iter()
        .any(|needle| text.contains(needle))
}

fn item_params(config: &ZabbixConfig, host: &str, port: u16) -> Value {
    json!({
        "name": format!("redis healthcheck for {}:{}", host, port),
        "key_": item_key(host, port),
        "hostid": config.host_id,
        "interfaceid": config.interface_id,
        "type": 3,
        "value_type": 3,
        "delay": 60,
    })
}

fn trigger_params(config: &ZabbixConfig, host: &str, port: u16) -> Value {
    json!({
        "description": format!("trigger hc for redis {}:{}", host, port),
        "expression": format!("{{{}:{}.last()}}=0", config.host_name, item_key(host, port)),
        "priority": 5,
    })
}

fn first_id(result: &Value, field: &str) -> Result<String> {
    result
        .get(field)
        .and_then(|ids| ids.get(0))
        .and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| Error::HealthCheck(format!("response has no {}", field)))
}
