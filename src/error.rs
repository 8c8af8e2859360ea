//! Error types for the broker

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Instance already exists: {0}")]
    InstanceAlreadyExists(String),

    #[error("Plan {plan} needs at least {needed} container hosts, {available} configured")]
    NotEnoughHosts {
        plan: String,
        needed: usize,
        available: usize,
    },

    #[error("No container host matches {0}")]
    UnknownContainerHost(String),

    #[error("Docker error: {0}")]
    Docker(String),

    #[error("Health check error: {0}")]
    HealthCheck(String),

    #[error("ACL API error: {0}")]
    Acl(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Problems found while reading configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("You must define the {0} environment variable.")]
    MissingValue(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

impl Error {
    /// Short machine-readable kind, used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "Config",
            Error::UnknownPlan(_) => "UnknownPlan",
            Error::InstanceNotFound(_) => "InstanceNotFound",
            Error::InstanceAlreadyExists(_) => "InstanceAlreadyExists",
            Error::NotEnoughHosts { .. } => "NotEnoughHosts",
            Error::UnknownContainerHost(_) => "UnknownContainerHost",
            Error::Docker(_) => "Docker",
            Error::HealthCheck(_) => "HealthCheck",
            Error::Acl(_) => "Acl",
            Error::BadRequest(_) => "BadRequest",
            Error::Redis(_) => "Redis",
            Error::Http(_) => "Http",
            Error::Database(_) => "Database",
            Error::Io(_) => "Io",
            Error::Json(_) => "Json",
            Error::Other(_) => "Other",
        }
    }

    pub fn missing(key: &str) -> Self {
        Error::Config(ConfigError::MissingValue(key.to_string()))
    }
}
