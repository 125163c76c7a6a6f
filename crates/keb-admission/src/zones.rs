//! Zone availability for the primary machine type and worker pools.
//!
//! Zone counts come either from live discovery against the cloud provider
//! or from the static zone table of the compatibility matrix.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use keb_core::{AdditionalWorkerNodePool, CloudProvider};
use tracing::warn;

use crate::gpu::group_by_machine;
use crate::matrix::MachineMatrix;
use crate::retry::{Backoff, retry};

/// Shown instead of any raw discovery or lookup failure.
pub const FAILED_TO_VALIDATE_ZONES: &str = "Failed to validate the number of available zones. Please try again later.";

/// HA pools need this many zones.
pub const HA_ZONES: usize = 3;

/// Live zone lookup against a cloud provider.
#[async_trait]
pub trait ZonesDiscovery: Send + Sync {
    async fn available_zones_count(
        &self,
        provider: CloudProvider,
        region: &str,
        machine_type: &str,
    ) -> Result<usize, String>;
}

/// Discover zone counts for every distinct machine type.
///
/// Each lookup gets one retry. Raw errors are logged and replaced with
/// [`FAILED_TO_VALIDATE_ZONES`].
pub async fn discover_zones<'a>(
    client: &dyn ZonesDiscovery,
    provider: CloudProvider,
    region: &str,
    machine_types: impl IntoIterator<Item = &'a str>,
    retry_interval: Duration,
) -> Result<BTreeMap<String, usize>, String> {
    let mut counts = BTreeMap::new();
    for machine_type in machine_types {
        if counts.contains_key(machine_type) {
            continue;
        }
        let count = retry(Backoff::attempts(2, retry_interval), move || {
            client.available_zones_count(provider, region, machine_type)
        })
        .await
        .map_err(|e| {
            warn!(%provider, region, machine_type, error = %e, "unable to get available zones");
            FAILED_TO_VALIDATE_ZONES.to_string()
        })?;
        counts.insert(machine_type.to_string(), count);
    }
    Ok(counts)
}

/// The primary machine type must be available in as many zones as the
/// cluster spans.
pub fn check_primary_zones(
    discovered: &BTreeMap<String, usize>,
    machine_type: &str,
    region: &str,
    zones_count: usize,
) -> Result<(), String> {
    let available = discovered.get(machine_type).copied().unwrap_or(0);
    if available < zones_count {
        return Err(format!(
            "In the {region}, the {machine_type} machine type is not available in {zones_count} zones."
        ));
    }
    Ok(())
}

/// Where pool zone counts come from.
pub enum ZoneSource<'a> {
    Static { matrix: &'a MachineMatrix, plan_id: &'a str },
    Discovered(&'a BTreeMap<String, usize>),
}

/// Check that HA pools get three zones and that discovered machine types
/// exist in the region at all.
pub fn check_pool_zones(
    pools: &[AdditionalWorkerNodePool],
    region: &str,
    source: ZoneSource<'_>,
) -> Result<(), String> {
    let mut short: Vec<&AdditionalWorkerNodePool> = Vec::new();
    for pool in pools {
        let count = match &source {
            ZoneSource::Discovered(counts) => {
                let count = counts.get(&pool.machine_type).copied().unwrap_or(0);
                if count < 1 {
                    return Err(format!(
                        "In the {region}, the {} machine type is not available.",
                        pool.machine_type
                    ));
                }
                count
            }
            ZoneSource::Static { matrix, plan_id } => {
                let zones = matrix
                    .available_zones(&pool.machine_type, region, plan_id)
                    .map_err(|e| {
                        warn!(region, machine_type = %pool.machine_type, error = %e, "while getting available zones");
                        FAILED_TO_VALIDATE_ZONES.to_string()
                    })?;
                // No static zones means the table has no opinion.
                if zones.is_empty() {
                    continue;
                }
                zones.len()
            }
        };
        if pool.ha_zones && count < HA_ZONES {
            short.push(pool);
        }
    }
    if short.is_empty() {
        return Ok(());
    }

    let short: Vec<AdditionalWorkerNodePool> = short.into_iter().cloned().collect();
    let listed: Vec<String> = group_by_machine(&short, |_| true)
        .iter()
        .map(|(machine, names)| format!("{machine} (used in worker node pools: {})", names.join(", ")))
        .collect();
    Err(format!(
        "In the {region}, the machine types: {} are not available in 3 zones. \
         If you want to use this machine types, set HA to false.",
        listed.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keb_core::{FamilyRegion, MachineFamily, Plan};
    use std::sync::Mutex;

    fn pool(name: &str, machine: &str, ha: bool) -> AdditionalWorkerNodePool {
        AdditionalWorkerNodePool {
            name: name.into(),
            machine_type: machine.into(),
            ha_zones: ha,
            auto_scaler_min: if ha { 3 } else { 0 },
            auto_scaler_max: 20,
        }
    }

    struct FlakyDiscovery {
        failures_left: Mutex<u32>,
        count: usize,
    }

    #[async_trait]
    impl ZonesDiscovery for FlakyDiscovery {
        async fn available_zones_count(&self, _: CloudProvider, _: &str, _: &str) -> Result<usize, String> {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err("throttled".into());
            }
            Ok(self.count)
        }
    }

    #[tokio::test]
    async fn discovery_retries_once() {
        let client = FlakyDiscovery {
            failures_left: Mutex::new(1),
            count: 3,
        };
        let counts = discover_zones(
            &client,
            CloudProvider::Aws,
            "eu-central-1",
            ["m6i.large", "g6.xlarge", "m6i.large"],
            Duration::from_millis(1),
        )
        .await
        .unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["m6i.large"], 3);
    }

    #[tokio::test]
    async fn discovery_failure_is_generic() {
        let client = FlakyDiscovery {
            failures_left: Mutex::new(2),
            count: 3,
        };
        let err = discover_zones(&client, CloudProvider::Aws, "eu-central-1", ["m6i.large"], Duration::from_millis(1))
            .await
            .unwrap_err();
        assert_eq!(err, FAILED_TO_VALIDATE_ZONES);
    }

    #[test]
    fn primary_zone_shortage() {
        let counts = BTreeMap::from([("m6i.large".to_string(), 2)]);
        assert_eq!(
            check_primary_zones(&counts, "m6i.large", "eu-central-1", 3).unwrap_err(),
            "In the eu-central-1, the m6i.large machine type is not available in 3 zones."
        );
        assert!(check_primary_zones(&counts, "m6i.large", "eu-central-1", 1).is_ok());
    }

    #[test]
    fn discovered_unavailable_machine() {
        let counts = BTreeMap::from([("g6.xlarge".to_string(), 0)]);
        let pools = vec![pool("gpu", "g6.xlarge", false)];
        assert_eq!(
            check_pool_zones(&pools, "eu-central-1", ZoneSource::Discovered(&counts)).unwrap_err(),
            "In the eu-central-1, the g6.xlarge machine type is not available."
        );
    }

    #[test]
    fn discovered_two_zones_fail_ha_pools_only() {
        let counts = BTreeMap::from([("g6.xlarge".to_string(), 2), ("m6i.large".to_string(), 3)]);
        let pools = vec![
            pool("a", "g6.xlarge", true),
            pool("b", "m6i.large", true),
            pool("c", "g6.xlarge", false),
            pool("d", "g6.xlarge", true),
        ];
        assert_eq!(
            check_pool_zones(&pools, "eu-central-1", ZoneSource::Discovered(&counts)).unwrap_err(),
            "In the eu-central-1, the machine types: g6.xlarge (used in worker node pools: a, d) \
             are not available in 3 zones. If you want to use this machine types, set HA to false."
        );
    }

    #[test]
    fn static_table_zones() {
        let matrix = MachineMatrix::new(vec![MachineFamily {
            family: "Standard_L".into(),
            regions: vec![
                FamilyRegion::WithZones {
                    name: "uksouth".into(),
                    zones: vec!["1".into()],
                },
                FamilyRegion::Name("japaneast".into()),
            ],
        }]);
        let pools = vec![pool("l", "Standard_L8s_v3", true)];
        let source = || ZoneSource::Static {
            matrix: &matrix,
            plan_id: Plan::Azure.id(),
        };
        assert!(check_pool_zones(&pools, "uksouth", source()).is_err());
        assert!(check_pool_zones(&pools, "japaneast", source()).is_ok());

        let bad_plan = ZoneSource::Static {
            matrix: &matrix,
            plan_id: "unknown",
        };
        assert_eq!(
            check_pool_zones(&pools, "uksouth", bad_plan).unwrap_err(),
            FAILED_TO_VALIDATE_ZONES
        );
    }
}
