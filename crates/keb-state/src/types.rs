//! Persisted records of the broker.
//!
//! Instances, operations, archived instances and audit actions. All types
//! serialize to JSON for storage in redb tables.

use chrono::{DateTime, Utc};
use keb_core::{CloudProvider, ProvisioningParameters};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Instance ───────────────────────────────────────────────────────

/// One managed cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    pub instance_id: String,
    /// Assigned by the provisioning backend once the cluster exists.
    #[serde(default)]
    pub runtime_id: String,
    pub global_account_id: String,
    /// Global account the instance was first subscribed in; set on the first
    /// account move and never changed afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_global_account_id: Option<String>,
    pub sub_account_id: String,
    pub service_id: String,
    pub service_name: String,
    pub service_plan_id: String,
    pub service_plan_name: String,
    pub dashboard_url: String,
    pub provider: CloudProvider,
    pub parameters: ProvisioningParameters,
    #[serde(default)]
    pub last_operation_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency counter, bumped by the store on every write.
    #[serde(default)]
    pub version: u64,
}

impl Instance {
    /// A fresh instance record for the given provisioning parameters.
    pub fn new(
        instance_id: &str,
        params: ProvisioningParameters,
        plan_name: &str,
        provider: CloudProvider,
        dashboard_url: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            instance_id: instance_id.to_string(),
            runtime_id: String::new(),
            global_account_id: params.ers_context.global_account_id.clone(),
            subscription_global_account_id: None,
            sub_account_id: params.ers_context.sub_account_id.clone(),
            service_id: params.service_id.clone(),
            service_name: keb_core::KYMA_SERVICE_NAME.to_string(),
            service_plan_id: params.plan_id.clone(),
            service_plan_name: plan_name.to_string(),
            dashboard_url: dashboard_url.to_string(),
            provider,
            parameters: params,
            last_operation_id: String::new(),
            created_at: now,
            updated_at: now,
            expired_at: None,
            version: 0,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expired_at.is_some()
    }
}

/// Criteria for listing instances. Empty lists match everything.
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    pub global_account_ids: Vec<String>,
    pub sub_account_ids: Vec<String>,
    pub plan_ids: Vec<String>,
    /// Matches the state of the instance's last operation.
    pub states: Vec<OperationState>,
    /// Never matched, whatever the other criteria say.
    pub exclude_instance_ids: Vec<String>,
}

impl InstanceFilter {
    pub fn matches(&self, instance: &Instance) -> bool {
        fn any_or_empty(list: &[String], value: &str) -> bool {
            list.is_empty() || list.iter().any(|v| v == value)
        }
        !self.exclude_instance_ids.contains(&instance.instance_id)
            && any_or_empty(&self.global_account_ids, &instance.global_account_id)
            && any_or_empty(&self.sub_account_ids, &instance.sub_account_id)
            && any_or_empty(&self.plan_ids, &instance.service_plan_id)
    }
}

// ── Operation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Provision,
    Deprovision,
    Update,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationState::Succeeded | OperationState::Failed)
    }

    /// State string reported by the last-operation endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            OperationState::Pending | OperationState::InProgress => "in progress",
            OperationState::Succeeded => "succeeded",
            OperationState::Failed => "failed",
        }
    }
}

/// One asynchronous unit of work against an instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    pub id: String,
    pub instance_id: String,
    pub kind: OperationKind,
    pub state: OperationState,
    #[serde(default)]
    pub description: String,
    /// Parameter snapshot that produced this operation. Never mutated.
    pub provisioning_parameters: ProvisioningParameters,
    /// Set only when the operation changes the plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_plan_id: Option<String>,
    /// True only for suspension-driven deprovisioning.
    #[serde(default)]
    pub temporary: bool,
    #[serde(default)]
    pub dashboard_url: String,
    /// Set on provisioning operations only.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub shoot_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub shoot_domain: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Per-instance insertion order, assigned by the store.
    #[serde(default)]
    pub sequence: u64,
}

impl Operation {
    fn new(instance_id: &str, kind: OperationKind, params: ProvisioningParameters) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            instance_id: instance_id.to_string(),
            kind,
            state: OperationState::Pending,
            description: String::new(),
            provisioning_parameters: params,
            updated_plan_id: None,
            temporary: false,
            dashboard_url: String::new(),
            shoot_name: String::new(),
            shoot_domain: String::new(),
            created_at: now,
            updated_at: now,
            sequence: 0,
        }
    }

    pub fn new_provisioning(instance_id: &str, params: ProvisioningParameters) -> Self {
        let mut op = Self::new(instance_id, OperationKind::Provision, params);
        op.description = "Operation created".to_string();
        op
    }

    pub fn new_deprovisioning(instance_id: &str, params: ProvisioningParameters, temporary: bool) -> Self {
        let mut op = Self::new(instance_id, OperationKind::Deprovision, params);
        op.temporary = temporary;
        op.description = if temporary {
            "Suspension operation created".to_string()
        } else {
            "Operation created".to_string()
        };
        op
    }

    pub fn new_update(instance_id: &str, params: ProvisioningParameters) -> Self {
        let mut op = Self::new(instance_id, OperationKind::Update, params);
        op.description = "Operation created".to_string();
        op
    }

    /// Whether this operation was stored before `other` for the same instance.
    pub fn stored_before(&self, other: &Operation) -> bool {
        (self.sequence, self.created_at) < (other.sequence, other.created_at)
    }
}

// ── Archive ────────────────────────────────────────────────────────

/// Summary kept after an instance has been fully removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceArchived {
    pub instance_id: String,
    pub global_account_id: String,
    pub sub_account_id: String,
    pub plan_id: String,
    pub plan_name: String,
    /// Final state of the instance's provisioning operation.
    pub provisioning_state: OperationState,
    pub created_at: DateTime<Utc>,
    pub archived_at: DateTime<Utc>,
}

// ── Actions ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    PlanUpdate,
    SubaccountMovement,
}

/// Audit trail entry for a plan change or account move.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    pub id: String,
    pub kind: ActionKind,
    pub instance_id: String,
    pub message: String,
    pub old_value: String,
    pub new_value: String,
    pub created_at: DateTime<Utc>,
}

impl Action {
    pub fn new(kind: ActionKind, instance_id: &str, message: &str, old_value: &str, new_value: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            instance_id: instance_id.to_string(),
            message: message.to_string(),
            old_value: old_value.to_string(),
            new_value: new_value.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn table_key(&self) -> String {
        format!("{}:{}", self.instance_id, self.id)
    }
}
