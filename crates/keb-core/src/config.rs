//! broker.toml configuration parser.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::oidc::OidcConfig;
use crate::plans::{CloudProvider, EnablePlans, Plan};

/// Errors raised while validating provider/plan configuration files.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("region {region} not found for provider {provider}")]
    RegionNotFound { region: String, provider: String },

    #[error("region {region} for provider {provider} has no zones defined")]
    NoZones { region: String, provider: String },

    #[error("region {region} for provider {provider} has no display name defined")]
    NoDisplayName { region: String, provider: String },

    #[error("zone discovery is not yet supported for the {0} provider")]
    ZoneDiscoveryUnsupported(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub broker: BrokerSection,
    pub infrastructure_manager: InfrastructureManagerConfig,
    pub networking: NetworkingConfig,
    pub whitelist: WhitelistConfig,
    pub dashboard: DashboardConfig,
    pub default_oidc: OidcConfig,
    /// Platform region → abstract trial region (`europe`, `us`, `asia`).
    pub trial_platform_region_mapping: HashMap<String, String>,
    /// Catalog text per plan name.
    pub plans: HashMap<String, PlanCatalogConfig>,
}

/// Catalog description and display name of a plan. Empty values fall back
/// to the upper-cased plan name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanCatalogConfig {
    pub description: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSection {
    /// Public broker URL, used to build kubeconfig links.
    pub url: String,
    /// DNS suffix for generated shoot domains.
    pub shoot_domain: String,
    pub trial_docs_url: String,
    pub free_docs_url: String,
    pub enable_plans: EnablePlans,
    pub only_single_trial_per_ga: bool,
    pub only_one_free_per_ga: bool,
    pub include_additional_params_in_schema: bool,
    pub enable_shoot_and_seed_same_region: bool,
    pub subaccount_movement_enabled: bool,
    pub update_custom_resources_labels_on_account_move: bool,
    pub use_additional_oidc_schema: bool,
    pub disable_machine_type_update: bool,
    pub check_quota_limit: bool,
    pub enable_plan_upgrades: bool,
    pub reject_unsupported_parameters: bool,
    pub instance_update_retry_interval_ms: u64,
    pub instance_update_retry_timeout_ms: u64,
    pub zone_discovery_retry_interval_ms: u64,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            url: "https://broker.localhost".to_string(),
            shoot_domain: "kyma.localhost".to_string(),
            trial_docs_url: "https://help.sap.com/docs/btp/sap-business-technology-platform/trial-accounts-and-free-tier".to_string(),
            free_docs_url: "https://help.sap.com/docs/btp/sap-business-technology-platform/available-plans-in-kyma-environment".to_string(),
            enable_plans: EnablePlans::parse("azure,gcp,azure_lite,trial,aws").unwrap_or_default(),
            only_single_trial_per_ga: true,
            only_one_free_per_ga: false,
            include_additional_params_in_schema: false,
            enable_shoot_and_seed_same_region: false,
            subaccount_movement_enabled: false,
            update_custom_resources_labels_on_account_move: false,
            use_additional_oidc_schema: false,
            disable_machine_type_update: false,
            check_quota_limit: false,
            enable_plan_upgrades: false,
            reject_unsupported_parameters: false,
            instance_update_retry_interval_ms: 500,
            instance_update_retry_timeout_ms: 2000,
            zone_discovery_retry_interval_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InfrastructureManagerConfig {
    pub use_smaller_machine_types: bool,
    pub enable_ingress_filtering: bool,
    pub ingress_filtering_plans: EnablePlans,
    pub multi_zone_cluster: bool,
    pub default_trial_provider: CloudProvider,
    pub default_shoot_purpose: String,
}

impl Default for InfrastructureManagerConfig {
    fn default() -> Self {
        Self {
            use_smaller_machine_types: false,
            enable_ingress_filtering: false,
            ingress_filtering_plans: EnablePlans::default(),
            multi_zone_cluster: false,
            default_trial_provider: CloudProvider::Aws,
            default_shoot_purpose: "development".to_string(),
        }
    }
}

impl InfrastructureManagerConfig {
    /// Ingress filtering is offered for `plan` only when globally enabled
    /// and the plan is in the configured set.
    pub fn ingress_filtering_for(&self, plan: Plan) -> bool {
        self.enable_ingress_filtering && self.ingress_filtering_plans.contains(plan)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkingConfig {
    pub default_nodes_cidr: String,
    pub default_pods_cidr: String,
    pub default_services_cidr: String,
    /// Ranges used by the seed infrastructure; tenant CIDRs must not overlap them.
    pub reserved_cidrs: Vec<String>,
}

impl Default for NetworkingConfig {
    fn default() -> Self {
        Self {
            default_nodes_cidr: "10.250.0.0/16".to_string(),
            default_pods_cidr: "10.96.0.0/13".to_string(),
            default_services_cidr: "10.104.0.0/13".to_string(),
            reserved_cidrs: [
                "10.243.128.0/17",
                "10.242.0.0/16",
                "10.243.0.0/17",
                "10.64.0.0/11",
                "10.254.0.0/16",
                "10.243.0.0/16",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WhitelistConfig {
    /// Subaccounts exempt from quota checks.
    pub quota_subaccounts: Vec<String>,
    /// Global accounts exempt from the single-free-instance rule.
    pub freemium_global_accounts: Vec<String>,
}

impl WhitelistConfig {
    pub fn quota_exempt(&self, sub_account_id: &str) -> bool {
        self.quota_subaccounts.iter().any(|s| s == sub_account_id)
    }

    pub fn freemium_exempt(&self, global_account_id: &str) -> bool {
        self.freemium_global_accounts.iter().any(|g| g == global_account_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub landscape_url: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            landscape_url: "https://dashboard.example.com".to_string(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            broker: BrokerSection::default(),
            infrastructure_manager: InfrastructureManagerConfig::default(),
            networking: NetworkingConfig::default(),
            whitelist: WhitelistConfig::default(),
            dashboard: DashboardConfig::default(),
            default_oidc: OidcConfig {
                client_id: "9bd05ed7-a930-44e6-8c79-e6defeb7dec9".to_string(),
                groups_claim: "groups".to_string(),
                issuer_url: "https://kymatest.accounts400.ondemand.com".to_string(),
                signing_algs: vec!["RS256".to_string()],
                username_claim: "sub".to_string(),
                username_prefix: "-".to_string(),
                ..Default::default()
            },
            trial_platform_region_mapping: HashMap::new(),
            plans: HashMap::new(),
        }
    }
}

impl BrokerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: BrokerConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_empty() {
        let config = BrokerConfig::from_toml_str("").unwrap();
        assert!(config.broker.only_single_trial_per_ga);
        assert!(config.broker.enable_plans.contains(Plan::Trial));
        assert!(!config.broker.enable_plans.contains(Plan::Free));
        assert_eq!(config.broker.instance_update_retry_interval_ms, 500);
        assert_eq!(config.networking.reserved_cidrs.len(), 6);
    }

    #[test]
    fn parse_sections() {
        let config = BrokerConfig::from_toml_str(
            r#"
[broker]
url = "https://keb.example.com"
enable_plans = "aws,free,own_cluster"
only_one_free_per_ga = true

[infrastructure_manager]
enable_ingress_filtering = true
ingress_filtering_plans = "aws"
default_trial_provider = "Azure"

[whitelist]
freemium_global_accounts = ["ga-white"]

[trial_platform_region_mapping]
cf-eu10 = "europe"
"#,
        )
        .unwrap();
        assert_eq!(config.broker.url, "https://keb.example.com");
        assert!(config.broker.enable_plans.contains(Plan::OwnCluster));
        assert!(config.infrastructure_manager.ingress_filtering_for(Plan::Aws));
        assert!(!config.infrastructure_manager.ingress_filtering_for(Plan::Gcp));
        assert_eq!(config.infrastructure_manager.default_trial_provider, CloudProvider::Azure);
        assert!(config.whitelist.freemium_exempt("ga-white"));
        assert_eq!(config.trial_platform_region_mapping["cf-eu10"], "europe");
    }

    #[test]
    fn unknown_plan_name_fails_parse() {
        let err = BrokerConfig::from_toml_str("[broker]\nenable_plans = \"aws,nope\"\n").unwrap_err();
        assert!(err.to_string().contains("unrecognized nope plan name"));
    }

    #[test]
    fn roundtrip_to_toml() {
        let config = BrokerConfig::default();
        let text = config.to_toml_string().unwrap();
        let back = BrokerConfig::from_toml_str(&text).unwrap();
        assert_eq!(back.broker.enable_plans, config.broker.enable_plans);
    }
}
