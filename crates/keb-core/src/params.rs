//! Request parameter DTOs and the normalized provisioning parameter set.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::context::ErsContext;
use crate::error::{BrokerError, BrokerResult};
use crate::oidc::OidcConnect;
use crate::plans::{CloudProvider, Plan};

pub const HA_AUTOSCALER_MINIMUM: i32 = 3;
pub const AUTOSCALER_MAXIMUM: i32 = 300;
pub const WORKER_POOL_NAME_MAX_LEN: usize = 15;
/// Name of the default worker pool; additional pools may not reuse it.
pub const RESERVED_POOL_NAME: &str = "cpu-worker-0";

static POOL_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("static pool name pattern")
});

const MASK: &str = "*****";

// ── Autoscaler ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoScalerParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_scaler_min: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_scaler_max: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_surge: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<i32>,
}

impl AutoScalerParameters {
    /// Check the effective min/max after applying plan defaults.
    pub fn validate(&self, plan_min: i32, plan_max: i32) -> Result<(), String> {
        let min = self.auto_scaler_min.unwrap_or(plan_min);
        let max = self.auto_scaler_max.unwrap_or(plan_max);
        if min > max {
            return Err(format!(
                "AutoScalerMax {max} should be larger than AutoScalerMin {min}. \
                 User provided values min:{}, max:{}; plan defaults min:{plan_min}, max:{plan_max}",
                display_opt(self.auto_scaler_min),
                display_opt(self.auto_scaler_max),
            ));
        }
        Ok(())
    }
}

fn display_opt(v: Option<i32>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "unset".to_string())
}

// ── Additional worker node pools ───────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalWorkerNodePool {
    pub name: String,
    pub machine_type: String,
    #[serde(default)]
    pub ha_zones: bool,
    pub auto_scaler_min: i32,
    pub auto_scaler_max: i32,
}

impl AdditionalWorkerNodePool {
    /// Autoscaler bounds for this pool.
    pub fn validate(&self) -> Result<(), String> {
        if self.auto_scaler_min > self.auto_scaler_max {
            return Err(format!(
                "AutoScalerMax value {} should be larger than AutoScalerMin value {} for {} additional worker node pool",
                self.auto_scaler_max, self.auto_scaler_min, self.name
            ));
        }
        if self.ha_zones && self.auto_scaler_min < HA_AUTOSCALER_MINIMUM {
            return Err(format!(
                "AutoScalerMin value {} should be at least {HA_AUTOSCALER_MINIMUM} when HA zones are enabled for {} additional worker node pool",
                self.auto_scaler_min, self.name
            ));
        }
        if self.auto_scaler_min < 0 {
            return Err(format!(
                "AutoScalerMin value cannot be lower than 0 for {} additional worker node pool",
                self.name
            ));
        }
        if self.auto_scaler_max > AUTOSCALER_MAXIMUM {
            return Err(format!(
                "AutoScalerMax value {} should not be greater than {AUTOSCALER_MAXIMUM} for {} additional worker node pool",
                self.auto_scaler_max, self.name
            ));
        }
        Ok(())
    }

    /// Lowercase alphanumerics and hyphens, at most 15 chars, not reserved.
    pub fn has_valid_name(&self) -> bool {
        self.name.len() <= WORKER_POOL_NAME_MAX_LEN
            && self.name != RESERVED_POOL_NAME
            && POOL_NAME_RE.is_match(&self.name)
    }

    /// False when a pool of the same name exists with a different HA setting.
    pub fn ha_zones_unchanged(&self, current: &[AdditionalWorkerNodePool]) -> bool {
        current
            .iter()
            .filter(|c| c.name == self.name)
            .all(|c| c.ha_zones == self.ha_zones)
    }

    /// Machine type may only move between general-purpose (`allowed`) types.
    pub fn validate_machine_type_change(
        &self,
        current: &[AdditionalWorkerNodePool],
        allowed: &[String],
    ) -> Result<(), String> {
        let Some(existing) = current.iter().find(|c| c.name == self.name) else {
            return Ok(());
        };
        if existing.machine_type == self.machine_type {
            return Ok(());
        }
        if !allowed.contains(&existing.machine_type) {
            return Err(format!(
                "You cannot update the {} machine type in the {} additional worker node pool. \
                 You cannot perform updates from compute-intensive machine types",
                existing.machine_type, self.name
            ));
        }
        if !allowed.contains(&self.machine_type) {
            return Err(format!(
                "You cannot update the machine type in the {} additional worker node pool to {}. \
                 You cannot perform updates to compute-intensive machine types",
                self.name, self.machine_type
            ));
        }
        Ok(())
    }
}

/// True when no two pools share a name.
pub fn pool_names_unique(pools: &[AdditionalWorkerNodePool]) -> bool {
    let mut seen = std::collections::HashSet::new();
    pools.iter().all(|p| seen.insert(p.name.as_str()))
}

// ── Networking & modules ───────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkingDto {
    #[serde(default)]
    pub nodes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDto {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_resource_policy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulesDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
    #[serde(default)]
    pub list: Vec<ModuleDto>,
}

// ── Provisioning parameters ────────────────────────────────────────

/// Top-level keys `ProvisioningParametersDto` decodes.
const PROVISIONING_KEYS: [&str; 21] = [
    "autoScalerMin",
    "autoScalerMax",
    "maxSurge",
    "maxUnavailable",
    "name",
    "machineType",
    "region",
    "purpose",
    "zones",
    "administrators",
    "provider",
    "kubeconfig",
    "shootName",
    "shootDomain",
    "oidc",
    "networking",
    "modules",
    "colocateControlPlane",
    "shootAndSeedSameRegion",
    "additionalWorkerNodePools",
    "ingressFiltering",
];

/// Client-supplied parameters of a provisioning request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningParametersDto {
    #[serde(flatten)]
    pub autoscaler: AutoScalerParameters,

    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zones: Vec<String>,
    #[serde(rename = "administrators", default, skip_serializing_if = "Vec::is_empty")]
    pub runtime_administrators: Vec<String>,
    /// Trial only: which provider to run on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<CloudProvider>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kubeconfig: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub shoot_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub shoot_domain: String,

    #[serde(default, skip_serializing_if = "OidcConnect::is_unset")]
    pub oidc: OidcConnect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networking: Option<NetworkingDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules: Option<ModulesDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colocate_control_plane: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shoot_and_seed_same_region: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_worker_node_pools: Vec<AdditionalWorkerNodePool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_filtering: Option<bool>,
}

impl ProvisioningParametersDto {
    /// Decode raw request parameters. Absent parameters decode to defaults.
    pub fn from_raw(raw: Option<&serde_json::Value>) -> BrokerResult<Self> {
        match raw {
            None | Some(serde_json::Value::Null) => Ok(Self::default()),
            Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
                BrokerError::bad_request(format!(
                    "while extracting input parameters: while unmarshaling raw parameters: {e}"
                ))
            }),
        }
    }

    /// Top-level keys of `raw` that decoding silently drops.
    pub fn unknown_keys(raw: Option<&serde_json::Value>) -> Vec<String> {
        let Some(serde_json::Value::Object(map)) = raw else {
            return Vec::new();
        };
        map.keys()
            .filter(|k| !PROVISIONING_KEYS.contains(&k.as_str()))
            .cloned()
            .collect()
    }

    /// Trial clusters always run with plan-fixed sizing.
    pub fn strip_trial_sizing(&mut self) {
        self.machine_type = None;
        self.autoscaler.auto_scaler_min = None;
        self.autoscaler.auto_scaler_max = None;
    }

    /// Copy safe to log: kubeconfig and OIDC secrets are hidden.
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        if !copy.kubeconfig.is_empty() {
            copy.kubeconfig = MASK.to_string();
        }
        copy.oidc = copy.oidc.masked();
        copy
    }
}

/// Parameters accepted on update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatingParametersDto {
    #[serde(flatten)]
    pub autoscaler: AutoScalerParameters,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    #[serde(default, skip_serializing_if = "OidcConnect::is_unset")]
    pub oidc: OidcConnect,
    #[serde(rename = "administrators", default, skip_serializing_if = "Option::is_none")]
    pub runtime_administrators: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_worker_node_pools: Option<Vec<AdditionalWorkerNodePool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_filtering: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,
}

impl UpdatingParametersDto {
    pub fn from_raw(raw: Option<&serde_json::Value>) -> BrokerResult<Self> {
        match raw {
            None | Some(serde_json::Value::Null) => Ok(Self::default()),
            Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
                BrokerError::bad_request(format!("while unmarshaling update parameters: {e}"))
            }),
        }
    }

    pub fn strip_trial_sizing(&mut self) {
        self.machine_type = None;
        self.autoscaler.auto_scaler_min = None;
        self.autoscaler.auto_scaler_max = None;
    }

    pub fn pools(&self) -> &[AdditionalWorkerNodePool] {
        self.additional_worker_node_pools.as_deref().unwrap_or_default()
    }

    /// Overlay the provided fields onto `target` and name what changed.
    ///
    /// An empty single OIDC object is not applied. Pools are only replaced
    /// when the plan supports them.
    pub fn apply_to(&self, target: &mut ProvisioningParametersDto, pools_supported: bool) -> Vec<&'static str> {
        let mut changed = Vec::new();
        let oidc_applies = match &self.oidc {
            OidcConnect::Unset => false,
            OidcConnect::Single(config) => !config.is_empty(),
            OidcConnect::List(_) => true,
        };
        if oidc_applies {
            target.oidc = self.oidc.clone();
            changed.push("OIDC");
        }
        if let Some(ingress) = self.ingress_filtering {
            target.ingress_filtering = Some(ingress);
            changed.push("Ingress Filtering");
        }
        if let Some(admins) = self.runtime_administrators.as_ref().filter(|a| !a.is_empty()) {
            target.runtime_administrators = admins.clone();
            changed.push("Runtime Administrators");
        }
        if self.apply_autoscaler(&mut target.autoscaler) {
            changed.push("Auto Scaler parameters");
        }
        if let Some(machine) = self.machine_type.as_ref().filter(|m| !m.is_empty()) {
            target.machine_type = Some(machine.clone());
            changed.push("Machine Type");
        }
        if let (true, Some(pools)) = (pools_supported, &self.additional_worker_node_pools) {
            target.additional_worker_node_pools = pools.clone();
            changed.push("Additional Worker Node Pools");
        }
        if let Some(name) = self.name.as_ref().filter(|n| !n.is_empty()) {
            target.name = name.clone();
            changed.push("Cluster Name");
        }
        if let Some(kubeconfig) = self.kubeconfig.as_ref().filter(|k| !k.is_empty()) {
            target.kubeconfig = kubeconfig.clone();
            changed.push("Kubeconfig");
        }
        changed
    }

    fn apply_autoscaler(&self, target: &mut AutoScalerParameters) -> bool {
        let mut changed = false;
        for (given, slot) in [
            (self.autoscaler.auto_scaler_min, &mut target.auto_scaler_min),
            (self.autoscaler.auto_scaler_max, &mut target.auto_scaler_max),
            (self.autoscaler.max_surge, &mut target.max_surge),
            (self.autoscaler.max_unavailable, &mut target.max_unavailable),
        ] {
            if given.is_some() {
                *slot = given;
                changed = true;
            }
        }
        changed
    }
}

/// Normalized, validated configuration of an instance.
///
/// Once stored on an operation this value is never mutated; updates build a
/// new snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningParameters {
    pub plan_id: String,
    pub service_id: String,
    pub ers_context: ErsContext,
    pub parameters: ProvisioningParametersDto,
    #[serde(default)]
    pub platform_region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_provider: Option<CloudProvider>,
}

impl ProvisioningParameters {
    pub fn plan(&self) -> Option<Plan> {
        Plan::ALL.into_iter().find(|p| p.id() == self.plan_id)
    }

    /// Equality used to detect an idempotent provisioning replay.
    ///
    /// Request-scoped context fields (user, activity flag) are ignored.
    pub fn is_equal(&self, other: &ProvisioningParameters) -> bool {
        self.plan_id == other.plan_id
            && self.service_id == other.service_id
            && self.platform_region == other.platform_region
            && self.platform_provider == other.platform_provider
            && self.parameters == other.parameters
            && self.ers_context.global_account_id == other.ers_context.global_account_id
            && self.ers_context.sub_account_id == other.ers_context.sub_account_id
            && self.ers_context.license_type == other.ers_context.license_type
    }

    /// Provider the instance runs on.
    pub fn provider(&self, default_trial_provider: CloudProvider) -> CloudProvider {
        match self.plan() {
            Some(Plan::Trial) => self.parameters.provider.unwrap_or(default_trial_provider),
            Some(Plan::Free) => self.platform_provider.unwrap_or(CloudProvider::Aws),
            Some(plan) => plan.fixed_provider().unwrap_or(CloudProvider::Unknown),
            None => CloudProvider::Unknown,
        }
    }
}
