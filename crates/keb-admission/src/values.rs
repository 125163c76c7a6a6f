//! Provider default values per plan.
//!
//! Resolves the machine type, region, zones and autoscaler defaults a plan
//! starts from before request parameters are applied.

use std::collections::HashMap;

use keb_core::config::InfrastructureManagerConfig;
use keb_core::{CloudProvider, Plan, PlanSpecifications, ProviderSpec, ProvisioningParameters};
use rand::seq::SliceRandom;

pub const PURPOSE_EVALUATION: &str = "evaluation";

const DEFAULT_AWS_REGION: &str = "eu-central-1";
const DEFAULT_AWS_TRIAL_REGION: &str = "eu-west-1";
const DEFAULT_AWS_MACHINE: &str = "m6i.large";
const DEFAULT_OLD_AWS_TRIAL_MACHINE: &str = "m5.xlarge";

const DEFAULT_AZURE_REGION: &str = "eastus";
const DEFAULT_AZURE_MACHINE: &str = "Standard_D2s_v5";
const DEFAULT_OLD_AZURE_TRIAL_MACHINE: &str = "Standard_D4s_v5";

const DEFAULT_GCP_REGION: &str = "europe-west3";
const DEFAULT_GCP_MACHINE: &str = "n2-standard-2";
const DEFAULT_GCP_TRIAL_MACHINE: &str = "n2-standard-4";

const DEFAULT_SAP_CC_REGION: &str = "eu-de-1";
const DEFAULT_SAP_CC_MACHINE: &str = "g_c2_m8";

const MULTI_ZONE_COUNT: usize = 3;

/// Valid abstract regions for trial clusters.
pub const TRIAL_REGIONS: [&str; 3] = ["europe", "us", "asia"];

/// Defaults a cluster of a given plan starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderValues {
    pub default_autoscaler_min: i32,
    pub default_autoscaler_max: i32,
    pub zones_count: usize,
    pub zones: Vec<String>,
    /// `Unknown` for own_cluster.
    pub provider: CloudProvider,
    pub default_machine_type: String,
    pub region: String,
    pub purpose: String,
    pub volume_size_gb: u32,
    pub disk_type: String,
}

/// Inputs shared by every resolution.
pub struct ValuesContext<'a> {
    pub infrastructure: &'a InfrastructureManagerConfig,
    pub trial_region_mapping: &'a HashMap<String, String>,
    pub providers: &'a ProviderSpec,
    pub plans: &'a PlanSpecifications,
}

impl ValuesContext<'_> {
    fn zones_count(&self) -> usize {
        if self.infrastructure.multi_zone_cluster { MULTI_ZONE_COUNT } else { 1 }
    }

    fn trial_machine(&self, old: &str, smaller: &str) -> String {
        if self.infrastructure.use_smaller_machine_types {
            smaller.to_string()
        } else {
            old.to_string()
        }
    }

    fn purpose(&self) -> String {
        self.infrastructure.default_shoot_purpose.clone()
    }

    /// Abstract trial region (`europe`, `us`, `asia`) of the request, taken
    /// from the platform region mapping first and the `region` parameter
    /// second.
    fn abstract_trial_region(&self, params: &ProvisioningParameters) -> Option<String> {
        if !params.platform_region.is_empty()
            && let Some(mapped) = self.trial_region_mapping.get(&params.platform_region)
        {
            return Some(mapped.clone());
        }
        params.parameters.region.clone().filter(|r| !r.is_empty())
    }
}

/// Resolve provider values for the plan of `params`.
pub fn provider_values(params: &ProvisioningParameters, ctx: &ValuesContext<'_>) -> Result<ProviderValues, String> {
    let plan = params
        .plan()
        .ok_or_else(|| format!("plan {} is not supported", params.plan_id))?;
    let region_param = params.parameters.region.clone().filter(|r| !r.is_empty());

    let mut values = match plan {
        Plan::Aws | Plan::BuildRuntimeAws | Plan::Preview => {
            let region = region_param.unwrap_or_else(|| DEFAULT_AWS_REGION.to_string());
            let count = ctx.zones_count();
            ProviderValues {
                default_autoscaler_min: 3,
                default_autoscaler_max: 20,
                zones_count: count,
                zones: suffixed(&region, ctx.providers.random_zones(CloudProvider::Aws, &region, count)),
                provider: CloudProvider::Aws,
                default_machine_type: DEFAULT_AWS_MACHINE.to_string(),
                region,
                purpose: ctx.purpose(),
                volume_size_gb: 80,
                disk_type: "gp3".to_string(),
            }
        }
        Plan::Azure | Plan::BuildRuntimeAzure => {
            let count = ctx.zones_count();
            ProviderValues {
                default_autoscaler_min: 3,
                default_autoscaler_max: 20,
                zones_count: count,
                zones: azure_zones(count),
                provider: CloudProvider::Azure,
                default_machine_type: DEFAULT_AZURE_MACHINE.to_string(),
                region: region_param.unwrap_or_else(|| DEFAULT_AZURE_REGION.to_string()),
                purpose: ctx.purpose(),
                volume_size_gb: 80,
                disk_type: "StandardSSD_LRS".to_string(),
            }
        }
        Plan::AzureLite => ProviderValues {
            default_autoscaler_min: 2,
            default_autoscaler_max: 10,
            zones_count: 1,
            zones: azure_zones(1),
            provider: CloudProvider::Azure,
            default_machine_type: ctx.trial_machine(DEFAULT_OLD_AZURE_TRIAL_MACHINE, DEFAULT_AZURE_MACHINE),
            region: region_param.unwrap_or_else(|| DEFAULT_AZURE_REGION.to_string()),
            purpose: ctx.purpose(),
            volume_size_gb: 80,
            disk_type: "StandardSSD_LRS".to_string(),
        },
        Plan::Gcp | Plan::BuildRuntimeGcp => {
            let region = region_param.unwrap_or_else(|| DEFAULT_GCP_REGION.to_string());
            let count = ctx.zones_count();
            ProviderValues {
                default_autoscaler_min: 3,
                default_autoscaler_max: 20,
                zones_count: count,
                zones: gcp_zones(&region, count),
                provider: CloudProvider::Gcp,
                default_machine_type: DEFAULT_GCP_MACHINE.to_string(),
                region,
                purpose: ctx.purpose(),
                volume_size_gb: 80,
                disk_type: "pd-balanced".to_string(),
            }
        }
        Plan::SapConvergedCloud => {
            let region = region_param.unwrap_or_else(|| DEFAULT_SAP_CC_REGION.to_string());
            let zones = ctx
                .providers
                .random_zones(CloudProvider::SapConvergedCloud, &region, ctx.zones_count());
            ProviderValues {
                default_autoscaler_min: 3,
                default_autoscaler_max: 20,
                zones_count: zones.len(),
                zones: suffixed(&region, zones),
                provider: CloudProvider::SapConvergedCloud,
                default_machine_type: DEFAULT_SAP_CC_MACHINE.to_string(),
                region,
                purpose: ctx.purpose(),
                volume_size_gb: 80,
                disk_type: String::new(),
            }
        }
        Plan::Trial => trial_values(params, ctx)?,
        Plan::Free => free_values(params, ctx)?,
        Plan::OwnCluster => ProviderValues {
            default_autoscaler_min: 0,
            default_autoscaler_max: 0,
            zones_count: 0,
            zones: Vec::new(),
            provider: CloudProvider::Unknown,
            default_machine_type: String::new(),
            region: String::new(),
            purpose: String::new(),
            volume_size_gb: 0,
            disk_type: String::new(),
        },
    };

    if let Some(size) = ctx.plans.default_volume_size_gb(plan.name()) {
        values.volume_size_gb = size;
    }
    Ok(values)
}

fn trial_values(params: &ProvisioningParameters, ctx: &ValuesContext<'_>) -> Result<ProviderValues, String> {
    let provider = params.parameters.provider.unwrap_or(ctx.infrastructure.default_trial_provider);
    let abstract_region = ctx.abstract_trial_region(params);
    let pick = |table: [(&str, &str); 3], default: &str| -> String {
        abstract_region
            .as_deref()
            .and_then(|a| table.iter().find(|(k, _)| *k == a).map(|(_, v)| v.to_string()))
            .unwrap_or_else(|| default.to_string())
    };

    let mut values = match provider {
        CloudProvider::Aws => {
            let region = pick(
                [("europe", "eu-west-1"), ("us", "us-east-1"), ("asia", "ap-southeast-1")],
                DEFAULT_AWS_TRIAL_REGION,
            );
            ProviderValues {
                zones: suffixed(&region, ctx.providers.random_zones(CloudProvider::Aws, &region, 1)),
                default_machine_type: ctx.trial_machine(DEFAULT_OLD_AWS_TRIAL_MACHINE, DEFAULT_AWS_MACHINE),
                region,
                volume_size_gb: 50,
                disk_type: "gp3".to_string(),
                ..evaluation(CloudProvider::Aws)
            }
        }
        CloudProvider::Gcp => {
            let region = pick(
                [("europe", "europe-west3"), ("us", "us-central1"), ("asia", "asia-south1")],
                DEFAULT_GCP_REGION,
            );
            ProviderValues {
                zones: gcp_zones(&region, 1),
                default_machine_type: DEFAULT_GCP_TRIAL_MACHINE.to_string(),
                region,
                volume_size_gb: 30,
                disk_type: "pd-standard".to_string(),
                ..evaluation(CloudProvider::Gcp)
            }
        }
        CloudProvider::Azure => {
            let region = pick(
                [("europe", "westeurope"), ("us", "eastus"), ("asia", "southeastasia")],
                DEFAULT_AZURE_REGION,
            );
            ProviderValues {
                zones: azure_zones(1),
                default_machine_type: ctx.trial_machine(DEFAULT_OLD_AZURE_TRIAL_MACHINE, DEFAULT_AZURE_MACHINE),
                region,
                volume_size_gb: 50,
                disk_type: "Standard_LRS".to_string(),
                ..evaluation(CloudProvider::Azure)
            }
        }
        other => return Err(format!("trial provider for {other} not yet implemented")),
    };
    values.zones_count = 1;
    Ok(values)
}

fn free_values(params: &ProvisioningParameters, ctx: &ValuesContext<'_>) -> Result<ProviderValues, String> {
    let provider = params.platform_provider.unwrap_or(CloudProvider::Aws);
    match provider {
        CloudProvider::Aws => Ok(ProviderValues {
            zones: suffixed(
                DEFAULT_AWS_REGION,
                ctx.providers.random_zones(CloudProvider::Aws, DEFAULT_AWS_REGION, 1),
            ),
            default_machine_type: ctx.trial_machine(DEFAULT_OLD_AWS_TRIAL_MACHINE, DEFAULT_AWS_MACHINE),
            region: DEFAULT_AWS_REGION.to_string(),
            volume_size_gb: 50,
            disk_type: "gp3".to_string(),
            ..evaluation(CloudProvider::Aws)
        }),
        CloudProvider::Azure => Ok(ProviderValues {
            zones: azure_zones(1),
            default_machine_type: ctx.trial_machine(DEFAULT_OLD_AZURE_TRIAL_MACHINE, DEFAULT_AZURE_MACHINE),
            region: params
                .parameters
                .region
                .clone()
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| DEFAULT_AZURE_REGION.to_string()),
            volume_size_gb: 50,
            disk_type: "Standard_LRS".to_string(),
            ..evaluation(CloudProvider::Azure)
        }),
        other => Err(format!("freemium provider for '{other}' is not supported")),
    }
}

/// Single-node, single-zone evaluation sizing shared by trial and free.
fn evaluation(provider: CloudProvider) -> ProviderValues {
    ProviderValues {
        default_autoscaler_min: 1,
        default_autoscaler_max: 1,
        zones_count: 1,
        zones: Vec::new(),
        provider,
        default_machine_type: String::new(),
        region: String::new(),
        purpose: PURPOSE_EVALUATION.to_string(),
        volume_size_gb: 0,
        disk_type: String::new(),
    }
}

/// `eu-central-1` + `a` → `eu-central-1a`.
fn suffixed(region: &str, zones: Vec<String>) -> Vec<String> {
    zones.into_iter().map(|z| format!("{region}{z}")).collect()
}

fn azure_zones(count: usize) -> Vec<String> {
    let mut zones: Vec<String> = ["1", "2", "3"].map(String::from).to_vec();
    zones.shuffle(&mut rand::thread_rng());
    zones.truncate(count);
    zones
}

fn gcp_zones(region: &str, count: usize) -> Vec<String> {
    let mut zones: Vec<String> = ["a", "b", "c"].iter().map(|z| format!("{region}-{z}")).collect();
    zones.shuffle(&mut rand::thread_rng());
    zones.truncate(count);
    zones
}
