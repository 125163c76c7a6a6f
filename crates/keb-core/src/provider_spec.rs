//! Per-provider region, zone and machine tables (providers.toml).
//!
//! Region lists and machine families are arrays, so their order in the file
//! is the order reported back to clients.

use std::collections::BTreeMap;
use std::path::Path;

use rand::seq::SliceRandom;
use serde::Deserialize;
use tracing::warn;

use crate::config::ConfigError;
use crate::plans::CloudProvider;

#[derive(Debug, Clone, Deserialize)]
pub struct RegionEntry {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub zones: Vec<String>,
}

/// A region a machine family is offered in, optionally with zone letters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FamilyRegion {
    Name(String),
    WithZones {
        name: String,
        #[serde(default)]
        zones: Vec<String>,
    },
}

impl FamilyRegion {
    pub fn name(&self) -> &str {
        match self {
            FamilyRegion::Name(n) => n,
            FamilyRegion::WithZones { name, .. } => name,
        }
    }

    pub fn zones(&self) -> &[String] {
        match self {
            FamilyRegion::Name(_) => &[],
            FamilyRegion::WithZones { zones, .. } => zones,
        }
    }
}

/// Machine-type family (a prefix such as `g6` or `Standard_NC`) and the
/// regions it is restricted to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MachineFamily {
    pub family: String,
    #[serde(default)]
    pub regions: Vec<FamilyRegion>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderEntry {
    #[serde(default)]
    pub regions: Vec<RegionEntry>,
    #[serde(default)]
    pub machines: BTreeMap<String, String>,
    #[serde(default)]
    pub regions_supporting_machine: Vec<MachineFamily>,
    #[serde(default)]
    pub zones_discovery: bool,
    /// Regions that can host a colocated control plane.
    #[serde(default)]
    pub seed_regions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ProviderSpec {
    providers: BTreeMap<String, ProviderEntry>,
}

impl ProviderSpec {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn provider(&self, cp: CloudProvider) -> Option<&ProviderEntry> {
        // "sap-converged-cloud" and "SapConvergedCloud" name the same provider.
        let wanted = cp.config_key().replace('-', "");
        self.providers
            .iter()
            .find(|(name, _)| name.replace('-', "").eq_ignore_ascii_case(&wanted))
            .map(|(_, entry)| entry)
    }

    fn region(&self, cp: CloudProvider, region: &str) -> Option<&RegionEntry> {
        self.provider(cp)?.regions.iter().find(|r| r.name == region)
    }

    pub fn region_display_name(&self, cp: CloudProvider, region: &str) -> String {
        self.region(cp, region)
            .map(|r| r.display_name.clone())
            .unwrap_or_else(|| region.to_string())
    }

    pub fn region_display_names(&self, cp: CloudProvider, regions: &[String]) -> BTreeMap<String, String> {
        regions
            .iter()
            .map(|r| (r.clone(), self.region_display_name(cp, r)))
            .collect()
    }

    /// Static zones configured for a region.
    pub fn zones(&self, cp: CloudProvider, region: &str) -> Vec<String> {
        self.region(cp, region).map(|r| r.zones.clone()).unwrap_or_default()
    }

    /// Up to `count` distinct zones of the region, in random order.
    pub fn random_zones(&self, cp: CloudProvider, region: &str, count: usize) -> Vec<String> {
        let mut zones = self.zones(cp, region);
        zones.shuffle(&mut rand::thread_rng());
        zones.truncate(count);
        zones
    }

    pub fn machine_display_names(&self, cp: CloudProvider, machines: &[String]) -> BTreeMap<String, String> {
        let table = self.provider(cp).map(|p| &p.machines);
        machines
            .iter()
            .map(|m| {
                let display = table.and_then(|t| t.get(m)).cloned().unwrap_or_else(|| m.clone());
                (m.clone(), display)
            })
            .collect()
    }

    pub fn machine_families(&self, cp: CloudProvider) -> &[MachineFamily] {
        self.provider(cp)
            .map(|p| p.regions_supporting_machine.as_slice())
            .unwrap_or_default()
    }

    /// Families of every provider, providers in key order, families in file
    /// order.
    pub fn all_machine_families(&self) -> impl Iterator<Item = &MachineFamily> {
        self.providers.values().flat_map(|p| p.regions_supporting_machine.iter())
    }

    /// Seed regions of the provider that are also in `supported`, in file
    /// order.
    pub fn supported_seed_regions(&self, cp: CloudProvider, supported: &[String]) -> Vec<String> {
        self.provider(cp)
            .map(|p| p.seed_regions.iter().filter(|r| supported.contains(r)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn zones_discovery(&self, cp: CloudProvider) -> bool {
        self.provider(cp).is_some_and(|p| p.zones_discovery)
    }

    /// Check that a region is configured usably for a provider.
    pub fn validate(&self, cp: CloudProvider, region: &str) -> Result<(), ConfigError> {
        let Some(entry) = self.region(cp, region) else {
            return Err(ConfigError::RegionNotFound {
                region: region.to_string(),
                provider: cp.to_string(),
            });
        };
        if !self.zones_discovery(cp) && entry.zones.is_empty() {
            return Err(ConfigError::NoZones {
                region: region.to_string(),
                provider: cp.to_string(),
            });
        }
        if entry.display_name.is_empty() {
            return Err(ConfigError::NoDisplayName {
                region: region.to_string(),
                provider: cp.to_string(),
            });
        }
        Ok(())
    }

    /// Zone discovery is only wired for AWS.
    pub fn validate_zones_discovery(&self) -> Result<(), ConfigError> {
        for (name, entry) in &self.providers {
            if !entry.zones_discovery {
                continue;
            }
            if name != "aws" {
                return Err(ConfigError::ZoneDiscoveryUnsupported(name.clone()));
            }
            for region in entry.regions.iter().filter(|r| !r.zones.is_empty()) {
                warn!(
                    provider = %name,
                    region = %region.name,
                    zones = region.zones.len(),
                    "zones discovery enabled, static region zones are ignored"
                );
            }
            for family in &entry.regions_supporting_machine {
                for region in family.regions.iter().filter(|r| !r.zones().is_empty()) {
                    warn!(
                        provider = %name,
                        family = %family.family,
                        region = %region.name(),
                        "zones discovery enabled, static machine zones are ignored"
                    );
                }
            }
        }
        Ok(())
    }

    /// Validate every configured region of every provider.
    pub fn validate_all(&self) -> Result<(), ConfigError> {
        self.validate_zones_discovery()?;
        for (name, entry) in &self.providers {
            let cp = CloudProvider::from_name(name);
            for region in &entry.regions {
                self.validate(cp, &region.name)?;
            }
        }
        Ok(())
    }
}
