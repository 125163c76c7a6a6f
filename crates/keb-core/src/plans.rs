//! Plan identities and the process-wide plan registry.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const KYMA_SERVICE_ID: &str = "47c9dcbf-ff30-448e-ab36-d3bad66ba281";
pub const KYMA_SERVICE_NAME: &str = "kymaruntime";

/// Cloud provider a plan (or trial/free instance) runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CloudProvider {
    #[serde(rename = "AWS")]
    Aws,
    Azure,
    #[serde(rename = "GCP")]
    Gcp,
    SapConvergedCloud,
    #[serde(rename = "unknown")]
    Unknown,
}

impl CloudProvider {
    /// Lenient parse used for configuration keys and platform headers.
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "aws" => Self::Aws,
            "azure" => Self::Azure,
            "gcp" => Self::Gcp,
            "sapconvergedcloud" | "openstack" | "sap-converged-cloud" => Self::SapConvergedCloud,
            _ => Self::Unknown,
        }
    }

    /// Key of the provider table in the provider configuration file.
    pub fn config_key(self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Gcp => "gcp",
            Self::SapConvergedCloud => "sap-converged-cloud",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Aws => "AWS",
            Self::Azure => "Azure",
            Self::Gcp => "GCP",
            Self::SapConvergedCloud => "SapConvergedCloud",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

// ── Plans ──────────────────────────────────────────────────────────

/// Every plan the broker knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Plan {
    Gcp,
    Aws,
    Azure,
    AzureLite,
    Trial,
    SapConvergedCloud,
    Free,
    OwnCluster,
    Preview,
    BuildRuntimeAws,
    BuildRuntimeGcp,
    BuildRuntimeAzure,
}

impl Plan {
    pub const ALL: [Plan; 12] = [
        Plan::Gcp,
        Plan::Aws,
        Plan::Azure,
        Plan::AzureLite,
        Plan::Trial,
        Plan::SapConvergedCloud,
        Plan::Free,
        Plan::OwnCluster,
        Plan::Preview,
        Plan::BuildRuntimeAws,
        Plan::BuildRuntimeGcp,
        Plan::BuildRuntimeAzure,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Plan::Gcp => "ca6e5357-707f-4565-bbbd-b3ab732597c6",
            Plan::Aws => "361c511f-f939-4621-b228-d0fb79a1fe15",
            Plan::Azure => "4deee563-e5ec-4731-b9b1-53b42d855f0c",
            Plan::AzureLite => "8cb22518-aa26-44c5-91a0-e669ec9bf443",
            Plan::Trial => "7d55d31d-35ae-4438-bf13-6ffdfa107d9f",
            Plan::SapConvergedCloud => "03b812ac-c991-4528-b5bd-08b303523a63",
            Plan::Free => "b1a5764e-2ea1-4f95-94c0-2b4538b37b55",
            Plan::OwnCluster => "03e3cb66-a4c6-4c6a-b4b0-5d42224debea",
            Plan::Preview => "5cb3d976-b85c-42ea-a636-79cadda109a9",
            Plan::BuildRuntimeAws => "6aae0ff3-89f7-4f12-86de-51466145422e",
            Plan::BuildRuntimeGcp => "a310cd6b-6452-45a0-935d-d24ab53f9eba",
            Plan::BuildRuntimeAzure => "499244b4-1bef-48c9-be68-495269899f8e",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Plan::Gcp => "gcp",
            Plan::Aws => "aws",
            Plan::Azure => "azure",
            Plan::AzureLite => "azure_lite",
            Plan::Trial => "trial",
            Plan::SapConvergedCloud => "sap-converged-cloud",
            Plan::Free => "free",
            Plan::OwnCluster => "own_cluster",
            Plan::Preview => "preview",
            Plan::BuildRuntimeAws => "build-runtime-aws",
            Plan::BuildRuntimeGcp => "build-runtime-gcp",
            Plan::BuildRuntimeAzure => "build-runtime-azure",
        }
    }

    /// Provider fixed by the plan itself. Trial and free pick theirs per
    /// request, own_cluster has none.
    pub fn fixed_provider(self) -> Option<CloudProvider> {
        match self {
            Plan::Aws | Plan::Preview | Plan::BuildRuntimeAws => Some(CloudProvider::Aws),
            Plan::Azure | Plan::AzureLite | Plan::BuildRuntimeAzure => Some(CloudProvider::Azure),
            Plan::Gcp | Plan::BuildRuntimeGcp => Some(CloudProvider::Gcp),
            Plan::SapConvergedCloud => Some(CloudProvider::SapConvergedCloud),
            Plan::Trial | Plan::Free | Plan::OwnCluster => None,
        }
    }

    pub fn is_trial(self) -> bool {
        self == Plan::Trial
    }

    pub fn is_free(self) -> bool {
        self == Plan::Free
    }

    pub fn is_own_cluster(self) -> bool {
        self == Plan::OwnCluster
    }

    /// Trial and free clusters expire and get no additional worker pools.
    pub fn supports_additional_worker_pools(self) -> bool {
        !matches!(self, Plan::Trial | Plan::Free)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Plan {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Plan {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let name = String::deserialize(d)?;
        Plan::ALL
            .into_iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognized {name} plan name")))
    }
}

// ── Enabled plans ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized {0} plan name")]
pub struct UnknownPlanName(pub String);

/// Ordered set of plans, parsed from a comma-separated list of names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnablePlans(Vec<Plan>);

impl EnablePlans {
    pub fn parse(list: &str) -> Result<Self, UnknownPlanName> {
        let mut plans = Vec::new();
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let plan = Plan::ALL
                .into_iter()
                .find(|p| p.name() == name.to_lowercase())
                .ok_or_else(|| UnknownPlanName(name.to_string()))?;
            if !plans.contains(&plan) {
                plans.push(plan);
            }
        }
        Ok(Self(plans))
    }

    pub fn all() -> Self {
        Self(Plan::ALL.to_vec())
    }

    pub fn contains(&self, plan: Plan) -> bool {
        self.0.contains(&plan)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.0.iter().any(|p| p.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = Plan> + '_ {
        self.0.iter().copied()
    }
}

impl<'de> Deserialize<'de> for EnablePlans {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        EnablePlans::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl Serialize for EnablePlans {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let names: Vec<&str> = self.0.iter().map(|p| p.name()).collect();
        s.serialize_str(&names.join(","))
    }
}

// ── Registry ───────────────────────────────────────────────────────

/// Immutable lookup tables built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct PlanRegistry {
    by_id: HashMap<&'static str, Plan>,
    by_name: HashMap<&'static str, Plan>,
    enabled: EnablePlans,
}

impl PlanRegistry {
    pub fn new(enabled: EnablePlans) -> Self {
        let by_id = Plan::ALL.iter().map(|p| (p.id(), *p)).collect();
        let by_name = Plan::ALL.iter().map(|p| (p.name(), *p)).collect();
        Self {
            by_id,
            by_name,
            enabled,
        }
    }

    pub fn by_id(&self, id: &str) -> Option<Plan> {
        self.by_id.get(id).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<Plan> {
        self.by_name.get(name).copied()
    }

    /// Plan for `id` if it is known and enabled.
    pub fn enabled_by_id(&self, id: &str) -> Option<Plan> {
        self.by_id(id).filter(|p| self.enabled.contains(*p))
    }

    pub fn is_enabled(&self, plan: Plan) -> bool {
        self.enabled.contains(plan)
    }

    /// Enabled plans sorted by name.
    pub fn enabled_sorted(&self) -> Vec<Plan> {
        let mut plans: Vec<Plan> = self.enabled.iter().collect();
        plans.sort_by_key(|p| p.name());
        plans
    }

    /// Name for a plan ID, or the ID itself when unknown.
    pub fn name_of(&self, id: &str) -> String {
        self.by_id(id)
            .map(|p| p.name().to_string())
            .unwrap_or_else(|| id.to_string())
    }
}
