//! Per-plan regions, machine lists and upgrade paths (plans.toml).
//!
//! Table keys may name several plans at once (`"aws,build-runtime-aws"`).

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;

const DEFAULT_PLATFORM_REGION: &str = "default";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanSpecEntry {
    /// Platform region → hyperscaler regions.
    #[serde(default)]
    pub regions: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub regular_machines: Vec<String>,
    #[serde(default)]
    pub additional_machines: Vec<String>,
    #[serde(default)]
    pub volume_size_gb: u32,
    #[serde(default)]
    pub upgradable_to_plans: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PlanSpecifications {
    plans: HashMap<String, PlanSpecEntry>,
}

impl PlanSpecifications {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let raw: HashMap<String, PlanSpecEntry> = toml::from_str(content)?;
        let mut plans = HashMap::new();
        for (key, entry) in raw {
            for name in key.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                plans.insert(name.to_string(), entry.clone());
            }
        }
        Ok(Self { plans })
    }

    /// Hyperscaler regions for a plan, falling back to the `default` entry.
    pub fn regions(&self, plan: &str, platform_region: &str) -> Vec<String> {
        let Some(entry) = self.plans.get(plan) else {
            return Vec::new();
        };
        entry
            .regions
            .get(platform_region)
            .or_else(|| entry.regions.get(DEFAULT_PLATFORM_REGION))
            .cloned()
            .unwrap_or_default()
    }

    pub fn all_regions_by_plan(&self) -> BTreeMap<String, Vec<String>> {
        self.plans
            .iter()
            .map(|(name, entry)| (name.clone(), entry.regions.values().flatten().cloned().collect()))
            .collect()
    }

    pub fn regular_machines(&self, plan: &str) -> Vec<String> {
        self.plans
            .get(plan)
            .map(|e| e.regular_machines.clone())
            .unwrap_or_default()
    }

    pub fn additional_machines(&self, plan: &str) -> Vec<String> {
        self.plans
            .get(plan)
            .map(|e| e.additional_machines.clone())
            .unwrap_or_default()
    }

    /// Configured volume size, if any (zero means unset).
    pub fn default_volume_size_gb(&self, plan: &str) -> Option<u32> {
        self.plans
            .get(plan)
            .map(|e| e.volume_size_gb)
            .filter(|v| *v > 0)
    }

    pub fn is_upgradable(&self, plan: &str) -> bool {
        self.plans
            .get(plan)
            .is_some_and(|e| !e.upgradable_to_plans.is_empty())
    }

    /// Case-insensitive check of the configured upgrade targets.
    pub fn is_upgradable_between(&self, from: &str, to: &str) -> bool {
        self.plans.get(from).is_some_and(|e| {
            e.upgradable_to_plans
                .iter()
                .any(|p| p.eq_ignore_ascii_case(to))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLANS: &str = r#"
["aws,build-runtime-aws"]
regular_machines = ["m6i.large", "m6i.xlarge"]
additional_machines = ["g6.xlarge"]
volume_size_gb = 80
upgradable_to_plans = ["Build-Runtime-AWS"]

["aws,build-runtime-aws".regions]
cf-eu11 = ["eu-central-1"]
default = ["eu-central-1", "eu-west-2", "us-east-1"]

[trial]
regions = { default = ["europe", "us", "asia"] }
"#;

    #[test]
    fn combined_keys_expand() {
        let spec = PlanSpecifications::from_toml_str(PLANS).unwrap();
        assert_eq!(spec.regular_machines("build-runtime-aws"), vec!["m6i.large", "m6i.xlarge"]);
        assert_eq!(spec.additional_machines("aws"), vec!["g6.xlarge"]);
        assert!(spec.regular_machines("gcp").is_empty());
    }

    #[test]
    fn regions_fall_back_to_default() {
        let spec = PlanSpecifications::from_toml_str(PLANS).unwrap();
        assert_eq!(spec.regions("aws", "cf-eu11"), vec!["eu-central-1"]);
        assert_eq!(spec.regions("aws", "cf-us10").len(), 3);
        assert!(spec.regions("gcp", "cf-us10").is_empty());
    }

    #[test]
    fn upgrade_paths_case_insensitive() {
        let spec = PlanSpecifications::from_toml_str(PLANS).unwrap();
        assert!(spec.is_upgradable("aws"));
        assert!(spec.is_upgradable_between("aws", "build-runtime-aws"));
        assert!(!spec.is_upgradable_between("trial", "aws"));
    }

    #[test]
    fn volume_size_zero_is_unset() {
        let spec = PlanSpecifications::from_toml_str(PLANS).unwrap();
        assert_eq!(spec.default_volume_size_gb("aws"), Some(80));
        assert_eq!(spec.default_volume_size_gb("trial"), None);
    }
}
