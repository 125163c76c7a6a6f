//! Values returned by the orchestrators.

use std::collections::BTreeMap;

use keb_state::OperationState;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionResponse {
    pub operation_id: String,
    pub dashboard_url: String,
    pub labels: BTreeMap<String, String>,
}

/// An update may finish synchronously, in which case no operation exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateResponse {
    pub is_async: bool,
    pub operation_id: Option<String>,
    pub dashboard_url: String,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeprovisionResponse {
    pub operation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastOperationResponse {
    pub operation_id: String,
    pub state: OperationState,
    pub description: String,
}
