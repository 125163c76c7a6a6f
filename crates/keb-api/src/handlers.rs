//! REST API handlers.
//!
//! Each handler decodes the request, calls the broker façade and wraps the
//! outcome in [`ApiResponse`].

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, RawPathParams, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use keb_admission::{ProvisionRequest, UpdateRequest};
use keb_core::{BrokerError, CloudProvider};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::ApiState;

pub const PLATFORM_REGION_HEADER: &str = "x-broker-api-platform-region";
pub const PLATFORM_PROVIDER_HEADER: &str = "x-broker-api-platform-provider";

/// Response wrapper for consistent API format.
#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

/// Map a broker failure to its status. Internal details are logged, never
/// returned.
fn broker_error(e: BrokerError) -> Response {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(error = ?e, "request failed");
    } else {
        debug!(status = status.as_u16(), error = %e.message(), "request rejected");
    }
    error_response(e.message(), status)
}

fn body_error(rejection: JsonRejection) -> Response {
    error_response(&rejection.body_text(), StatusCode::BAD_REQUEST)
}

// ── Request shapes ─────────────────────────────────────────────

/// Platform the request came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub region: String,
    pub provider: Option<CloudProvider>,
}

/// The path region wins over the region header.
pub fn platform(path_region: Option<&str>, headers: &HeaderMap) -> Platform {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let region = path_region
        .map(str::to_string)
        .or_else(|| header(PLATFORM_REGION_HEADER))
        .unwrap_or_default();
    let provider = header(PLATFORM_PROVIDER_HEADER).map(|p| CloudProvider::from_name(&p));
    Platform { region, provider }
}

fn path_region<'a>(params: &'a RawPathParams) -> Option<&'a str> {
    params.iter().find(|(key, _)| *key == "region").map(|(_, value)| value)
}

#[derive(Debug, Deserialize)]
pub struct InstancePath {
    pub instance_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AsyncQuery {
    #[serde(default)]
    pub accepts_incomplete: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct LastOperationQuery {
    pub operation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProvisionBody {
    pub service_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub parameters: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub context: Option<Value>,
    #[serde(default)]
    pub parameters: Option<Value>,
}

#[derive(Debug, Serialize)]
struct LastOperationBody {
    operation: String,
    state: &'static str,
    description: String,
}

// ── Catalog ────────────────────────────────────────────────────

/// GET /v2/catalog
pub async fn catalog(State(state): State<ApiState>, params: RawPathParams, headers: HeaderMap) -> Response {
    let platform = platform(path_region(&params), &headers);
    let catalog = state
        .broker
        .catalog(&platform.region, platform.provider.unwrap_or(CloudProvider::Aws));
    ApiResponse::ok(catalog).into_response()
}

// ── Instances ──────────────────────────────────────────────────

/// PUT /v2/service_instances/{instance_id}
pub async fn provision(
    State(state): State<ApiState>,
    params: RawPathParams,
    Path(path): Path<InstancePath>,
    Query(query): Query<AsyncQuery>,
    headers: HeaderMap,
    body: Result<Json<ProvisionBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return body_error(rejection),
    };
    let platform = platform(path_region(&params), &headers);
    info!(instance = %path.instance_id, plan = %body.plan_id, region = %platform.region, "provisioning request");
    let request = ProvisionRequest {
        instance_id: path.instance_id,
        service_id: body.service_id,
        plan_id: body.plan_id,
        raw_parameters: body.parameters,
        raw_context: body.context,
        platform_region: platform.region,
        platform_provider: platform.provider,
        async_allowed: query.accepts_incomplete,
    };
    match state.broker.provision(request).await {
        Ok(response) => (StatusCode::ACCEPTED, ApiResponse::ok(response)).into_response(),
        Err(e) => broker_error(e),
    }
}

/// PATCH /v2/service_instances/{instance_id}
pub async fn update(
    State(state): State<ApiState>,
    Path(path): Path<InstancePath>,
    Query(query): Query<AsyncQuery>,
    body: Result<Json<UpdateBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return body_error(rejection),
    };
    info!(instance = %path.instance_id, plan = %body.plan_id, "update request");
    let request = UpdateRequest {
        instance_id: path.instance_id,
        service_id: body.service_id,
        plan_id: body.plan_id,
        raw_parameters: body.parameters,
        raw_context: body.context,
        async_allowed: query.accepts_incomplete,
    };
    match state.broker.update(request).await {
        Ok(response) => {
            let status = if response.is_async {
                StatusCode::ACCEPTED
            } else {
                StatusCode::OK
            };
            (status, ApiResponse::ok(response)).into_response()
        }
        Err(e) => broker_error(e),
    }
}

/// DELETE /v2/service_instances/{instance_id}
pub async fn deprovision(
    State(state): State<ApiState>,
    Path(path): Path<InstancePath>,
    Query(query): Query<AsyncQuery>,
) -> Response {
    info!(instance = %path.instance_id, "deprovisioning request");
    match state
        .broker
        .deprovision(&path.instance_id, query.accepts_incomplete)
        .await
    {
        Ok(response) => (StatusCode::ACCEPTED, ApiResponse::ok(response)).into_response(),
        Err(e) => broker_error(e),
    }
}

/// GET /v2/service_instances/{instance_id}/last_operation
pub async fn last_operation(
    State(state): State<ApiState>,
    Path(path): Path<InstancePath>,
    Query(query): Query<LastOperationQuery>,
) -> Response {
    match state
        .broker
        .last_operation(&path.instance_id, query.operation.as_deref())
    {
        Ok(op) => ApiResponse::ok(LastOperationBody {
            operation: op.operation_id,
            state: op.state.as_str(),
            description: op.description,
        })
        .into_response(),
        Err(e) => broker_error(e),
    }
}

/// GET /healthz
pub async fn healthz() -> Response {
    ApiResponse::ok("ok").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn path_region_wins_over_header() {
        let h = headers(&[(PLATFORM_REGION_HEADER, "cf-us10"), (PLATFORM_PROVIDER_HEADER, "azure")]);
        let p = platform(Some("cf-eu10"), &h);
        assert_eq!(p.region, "cf-eu10");
        assert_eq!(p.provider, Some(CloudProvider::Azure));

        let p = platform(None, &h);
        assert_eq!(p.region, "cf-us10");
    }

    #[test]
    fn missing_platform_is_empty() {
        let p = platform(None, &headers(&[(PLATFORM_REGION_HEADER, "  ")]));
        assert_eq!(p, Platform { region: String::new(), provider: None });
    }

    #[test]
    fn broker_errors_keep_status() {
        assert_eq!(broker_error(BrokerError::not_found("gone")).status(), StatusCode::NOT_FOUND);
        assert_eq!(broker_error(BrokerError::conflict("dup")).status(), StatusCode::CONFLICT);
        assert_eq!(
            broker_error(BrokerError::unprocessable("no")).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            broker_error(BrokerError::internal("boom", "secret detail")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        assert_eq!(healthz().await.status(), StatusCode::OK);
    }
}
