//! Region × machine-type compatibility.
//!
//! A machine type belongs to the first configured family whose name is a
//! prefix of it. Machine types with no family are supported everywhere.

use keb_core::{MachineFamily, Plan, ProviderSpec};
use rand::seq::SliceRandom;

/// Zones handed out per machine type at most.
const MAX_ZONES: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct MachineMatrix {
    families: Vec<MachineFamily>,
}

impl MachineMatrix {
    pub fn new(families: Vec<MachineFamily>) -> Self {
        Self { families }
    }

    pub fn from_spec(spec: &ProviderSpec) -> Self {
        Self::new(spec.all_machine_families().cloned().collect())
    }

    fn family(&self, machine_type: &str) -> Option<&MachineFamily> {
        self.families.iter().find(|f| machine_type.starts_with(&f.family))
    }

    pub fn is_supported(&self, region: &str, machine_type: &str) -> bool {
        match self.family(machine_type) {
            Some(family) => family.regions.iter().any(|r| r.name() == region),
            None => true,
        }
    }

    /// Regions the machine type's family is restricted to, in table order.
    pub fn supported_regions(&self, machine_type: &str) -> Vec<String> {
        self.family(machine_type)
            .map(|f| f.regions.iter().map(|r| r.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// Up to three random zones of `region` for the machine type, formatted
    /// the way the plan's provider names zones.
    ///
    /// An empty list means the family has no zones in the region (or the
    /// machine type has no family at all).
    pub fn available_zones(&self, machine_type: &str, region: &str, plan_id: &str) -> Result<Vec<String>, String> {
        let Some(family) = self.family(machine_type) else {
            return Ok(Vec::new());
        };
        let mut zones: Vec<String> = family
            .regions
            .iter()
            .find(|r| r.name() == region)
            .map(|r| r.zones().to_vec())
            .unwrap_or_default();
        if zones.is_empty() {
            return Ok(zones);
        }
        zones.shuffle(&mut rand::thread_rng());
        zones.truncate(MAX_ZONES);

        let plan = Plan::ALL.into_iter().find(|p| p.id() == plan_id);
        match plan {
            Some(Plan::Aws | Plan::BuildRuntimeAws | Plan::Preview | Plan::SapConvergedCloud) => {
                Ok(zones.iter().map(|z| format!("{region}{z}")).collect())
            }
            Some(Plan::Azure | Plan::BuildRuntimeAzure) => Ok(zones),
            Some(Plan::AzureLite) => {
                zones.truncate(1);
                Ok(zones)
            }
            Some(Plan::Gcp | Plan::BuildRuntimeGcp) => Ok(zones.iter().map(|z| format!("{region}-{z}")).collect()),
            _ => Err(format!("plan {plan_id} not supported")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keb_core::FamilyRegion;

    fn with_zones(name: &str, zones: &[&str]) -> FamilyRegion {
        FamilyRegion::WithZones {
            name: name.to_string(),
            zones: zones.iter().map(|z| z.to_string()).collect(),
        }
    }

    fn matrix() -> MachineMatrix {
        MachineMatrix::new(vec![
            MachineFamily {
                family: "m8g".into(),
                regions: vec![
                    with_zones("ap-northeast-1", &["a", "c", "d", "b"]),
                    FamilyRegion::Name("ap-southeast-1".into()),
                    FamilyRegion::Name("ca-central-1".into()),
                ],
            },
            MachineFamily {
                family: "c2d-highmem".into(),
                regions: vec![
                    FamilyRegion::Name("us-central1".into()),
                    with_zones("southamerica-east1", &["a", "b", "c"]),
                ],
            },
            MachineFamily {
                family: "Standard_L".into(),
                regions: vec![
                    with_zones("uksouth", &["1"]),
                    FamilyRegion::Name("japaneast".into()),
                    with_zones("brazilsouth", &["2", "3"]),
                ],
            },
            MachineFamily {
                family: "g6".into(),
                regions: vec![
                    FamilyRegion::Name("us-east-1".into()),
                    FamilyRegion::Name("westeurope".into()),
                    FamilyRegion::Name("eu-central-1".into()),
                ],
            },
        ])
    }

    #[test]
    fn is_supported_by_family_prefix() {
        let m = matrix();
        assert!(m.is_supported("ap-northeast-1", "m8g.large"));
        assert!(!m.is_supported("us-central1", "m8g.2xlarge"));
        assert!(m.is_supported("us-central1", "c2d-highmem-32"));
        assert!(!m.is_supported("ap-southeast-1", "c2d-highmem-64"));
        assert!(m.is_supported("uksouth", "Standard_L8s_v3"));
        assert!(!m.is_supported("us-west", "Standard_L48s_v3"));
    }

    #[test]
    fn unknown_family_supported_everywhere() {
        let m = matrix();
        assert!(m.is_supported("any-region", "unknown-type"));
        assert!(m.supported_regions("unknown-type").is_empty());
    }

    #[test]
    fn supported_regions_keep_table_order() {
        let m = matrix();
        assert_eq!(
            m.supported_regions("g6.xlarge"),
            vec!["us-east-1", "westeurope", "eu-central-1"]
        );
        assert_eq!(
            m.supported_regions("Standard_L8s_v3"),
            vec!["uksouth", "japaneast", "brazilsouth"]
        );
    }

    #[test]
    fn available_zones_formatted_per_plan() {
        let m = matrix();

        let aws = m.available_zones("m8g.large", "ap-northeast-1", Plan::Aws.id()).unwrap();
        assert_eq!(aws.len(), 3);
        assert!(aws.iter().all(|z| z.starts_with("ap-northeast-1") && z.len() == "ap-northeast-1".len() + 1));

        let gcp = m
            .available_zones("c2d-highmem-32", "southamerica-east1", Plan::Gcp.id())
            .unwrap();
        let mut sorted = gcp.clone();
        sorted.sort();
        assert_eq!(
            sorted,
            vec!["southamerica-east1-a", "southamerica-east1-b", "southamerica-east1-c"]
        );

        let azure = m.available_zones("Standard_L8s_v3", "brazilsouth", Plan::Azure.id()).unwrap();
        assert_eq!(azure.len(), 2);
        assert!(azure.iter().all(|z| z == "2" || z == "3"));

        let lite = m
            .available_zones("Standard_L8s_v3", "brazilsouth", Plan::AzureLite.id())
            .unwrap();
        assert_eq!(lite.len(), 1);
    }

    #[test]
    fn available_zones_empty_when_region_has_none() {
        let m = matrix();
        assert!(m.available_zones("m8g.large", "ca-central-1", Plan::Aws.id()).unwrap().is_empty());
        assert!(m.available_zones("m6i.large", "eu-central-1", Plan::Aws.id()).unwrap().is_empty());
    }

    #[test]
    fn available_zones_rejects_unknown_plan() {
        let m = matrix();
        let err = m
            .available_zones("Standard_L8s_v3", "uksouth", "not-supported-plan")
            .unwrap_err();
        assert_eq!(err, "plan not-supported-plan not supported");
    }
}
