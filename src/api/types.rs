//! API request/response types

use serde::{Deserialize, Serialize};

// === Instances ===

/// Form body of `POST /resources`
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub plan: String,
}

/// Form body of `POST /resources/:name`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BindRequest {
    #[serde(default)]
    pub hostname: Option<String>,
}

/// Form body of the `bind-app` routes
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BindAppRequest {
    #[serde(rename = "app-host", default)]
    pub app_host: Option<String>,
}

/// Form body of the unit `bind` routes
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BindUnitRequest {
    #[serde(rename = "unit-host", default)]
    pub unit_host: Option<String>,
}

// === Generic ===

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
