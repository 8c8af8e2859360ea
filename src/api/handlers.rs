//! API request handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Form, Json,
};
use std::sync::Arc;

use crate::broker::Broker;
use crate::managers::BindEnv;
use crate::models::PlanDescriptor;
use crate::probe::HealthStatus;
use super::types::*;

pub type AppState = Arc<Broker>;

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

/// Run a broker call on the blocking pool
async fn blocking<T, F>(broker: AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Broker) -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&broker))
        .await
        .map_err(|e| to_api_error(crate::Error::Other(format!("worker failed: {}", e))))?
        .map_err(to_api_error)
}

// === Health ===

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// === Instances ===

pub async fn add_instance(
    State(broker): State<AppState>,
    Form(req): Form<CreateInstanceRequest>,
) -> ApiResult<StatusCode> {
    blocking(broker, move |b| b.add_instance(&req.name, &req.plan)).await?;
    Ok(StatusCode::CREATED)
}

pub async fn remove_instance(
    State(broker): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    blocking(broker, move |b| b.remove_instance(&name)).await?;
    Ok(StatusCode::OK)
}

pub async fn bind(
    State(broker): State<AppState>,
    Path(name): Path<String>,
    form: Option<Form<BindRequest>>,
) -> ApiResult<(StatusCode, Json<BindEnv>)> {
    let unit = form.and_then(|Form(f)| f.hostname);
    let env = blocking(broker, move |b| b.bind(&name, unit.as_deref())).await?;
    Ok((StatusCode::CREATED, Json(env)))
}

pub async fn bind_app(
    State(broker): State<AppState>,
    Path(name): Path<String>,
    form: Option<Form<BindAppRequest>>,
) -> ApiResult<(StatusCode, Json<BindEnv>)> {
    let app_host = form.and_then(|Form(f)| f.app_host);
    tracing::debug!(instance = %name, app_host = ?app_host, "Binding app");
    let env = blocking(broker, move |b| b.bind(&name, None)).await?;
    Ok((StatusCode::CREATED, Json(env)))
}

pub async fn bind_unit(
    State(broker): State<AppState>,
    Path(name): Path<String>,
    form: Option<Form<BindUnitRequest>>,
) -> ApiResult<(StatusCode, Json<BindEnv>)> {
    let unit = required_unit_host(form)?;
    let env = blocking(broker, move |b| b.bind(&name, Some(unit.as_str()))).await?;
    Ok((StatusCode::CREATED, Json(env)))
}

pub async fn unbind_hostname(
    State(broker): State<AppState>,
    Path((name, host)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    blocking(broker, move |b| b.unbind(&name, Some(host.as_str()))).await?;
    Ok(StatusCode::OK)
}

pub async fn unbind_app(
    State(broker): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    blocking(broker, move |b| b.unbind(&name, None)).await?;
    Ok(StatusCode::OK)
}

pub async fn unbind_unit(
    State(broker): State<AppState>,
    Path(name): Path<String>,
    form: Option<Form<BindUnitRequest>>,
) -> ApiResult<StatusCode> {
    let unit = required_unit_host(form)?;
    blocking(broker, move |b| b.unbind(&name, Some(unit.as_str()))).await?;
    Ok(StatusCode::OK)
}

/// 204 when the probe succeeds, 500 with the raw failure text otherwise
pub async fn status(
    State(broker): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let status = blocking(broker, move |b| b.status(&name)).await?;
    Ok(match status {
        HealthStatus::Healthy => StatusCode::NO_CONTENT.into_response(),
        HealthStatus::Unhealthy(failure) => {
            (StatusCode::INTERNAL_SERVER_ERROR, failure.message).into_response()
        }
    })
}

// === Plans ===

pub async fn plans(State(broker): State<AppState>) -> Json<Vec<PlanDescriptor>> {
    Json(broker.plans())
}

// === Helpers ===

fn required_unit_host(form: Option<Form<BindUnitRequest>>) -> ApiResult<String> {
    form.and_then(|Form(f)| f.unit_host)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| to_api_error(crate::Error::BadRequest("unit-host is required".into())))
}

fn to_api_error(e: crate::Error) -> (StatusCode, Json<ApiError>) {
    let status = match &e {
        crate::Error::UnknownPlan(_) | crate::Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        crate::Error::InstanceNotFound(_) => StatusCode::NOT_FOUND,
        crate::Error::InstanceAlreadyExists(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %e, "Request failed");
    }

    (status, Json(ApiError {
        error: e.kind().to_string(),
        message: e.to_string(),
    }))
}
