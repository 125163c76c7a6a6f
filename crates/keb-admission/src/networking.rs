//! Networking CIDR validation.
//!
//! All problems of one stage are reported together: parse errors first, then
//! overlaps with the reserved seed ranges, then overlaps between the tenant's
//! own ranges.

use ipnet::IpNet;
use keb_core::config::NetworkingConfig;
use keb_core::{Issues, ProvisioningParametersDto, RuleGroup};

/// Zone CIDR splitting only works for up to four zones.
pub const MAX_ZONES: usize = 4;
/// Smallest allowed nodes network (largest prefix length).
pub const MAX_NODES_SUFFIX: u8 = 23;

/// Parse a CIDR and insist on the canonical network address.
fn parse_canonical(cidr: &str) -> Result<IpNet, String> {
    let net: IpNet = cidr.parse().map_err(|_| format!("invalid CIDR address: {cidr}"))?;
    if net.trunc() != net {
        return Err(format!("{} must be valid canonical CIDR", net.addr()));
    }
    Ok(net)
}

fn overlaps(a: &IpNet, b: &IpNet) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

/// Validate zones count and the networking block of a provisioning request.
pub fn validate_networking(params: &ProvisioningParametersDto, config: &NetworkingConfig) -> Issues {
    let mut issues = Issues::new(RuleGroup::Networking);
    if params.zones.len() > MAX_ZONES {
        issues.push(format!("number of zones must not be greater than {MAX_ZONES}"));
    }
    let Some(networking) = &params.networking else {
        return issues;
    };

    let nodes = match parse_canonical(&networking.nodes) {
        Ok(net) => {
            if net.prefix_len() > MAX_NODES_SUFFIX {
                issues.push(format!(
                    "the suffix of the node CIDR must not be greater than {MAX_NODES_SUFFIX}"
                ));
            }
            Some(net)
        }
        Err(e) => {
            issues.push(format!("while parsing nodes CIDR: {e}"));
            None
        }
    };
    let pods = parse_or_default(networking.pods.as_deref(), &config.default_pods_cidr, "pods", &mut issues);
    let services = parse_or_default(
        networking.services.as_deref(),
        &config.default_services_cidr,
        "services",
        &mut issues,
    );
    if !issues.is_empty() {
        return issues;
    }
    let (Some(nodes), Some(pods), Some(services)) = (nodes, pods, services) else {
        return issues;
    };

    for seed in &config.reserved_cidrs {
        let Ok(seed_net) = seed.parse::<IpNet>() else {
            continue;
        };
        if overlaps(&nodes, &seed_net) {
            issues.push(format!("nodes CIDR must not overlap {seed}"));
        }
        if overlaps(&services, &seed_net) {
            issues.push(format!("services CIDR must not overlap {seed}"));
        }
        if overlaps(&pods, &seed_net) {
            issues.push(format!("pods CIDR must not overlap {seed}"));
        }
    }
    if !issues.is_empty() {
        return issues;
    }

    if overlaps(&nodes, &pods) {
        issues.push("nodes CIDR must not overlap pods CIDR");
    }
    if overlaps(&nodes, &services) {
        issues.push("nodes CIDR must not overlap serivces CIDR");
    }
    if overlaps(&services, &pods) {
        issues.push("services CIDR must not overlap pods CIDR");
    }
    issues
}

fn parse_or_default(given: Option<&str>, default: &str, label: &str, issues: &mut Issues) -> Option<IpNet> {
    match given {
        Some(cidr) => match parse_canonical(cidr) {
            Ok(net) => Some(net),
            Err(e) => {
                issues.push(format!("while parsing {label} CIDR: {e}"));
                None
            }
        },
        None => default.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keb_core::NetworkingDto;

    fn params(nodes: &str, pods: Option<&str>, services: Option<&str>) -> ProvisioningParametersDto {
        ProvisioningParametersDto {
            networking: Some(NetworkingDto {
                nodes: nodes.to_string(),
                pods: pods.map(String::from),
                services: services.map(String::from),
            }),
            ..Default::default()
        }
    }

    fn check(p: &ProvisioningParametersDto) -> Option<String> {
        validate_networking(p, &NetworkingConfig::default()).joined()
    }

    #[test]
    fn accepts_valid_nodes_cidr() {
        assert_eq!(check(&params("10.250.0.0/20", None, None)), None);
        assert_eq!(check(&params("10.250.0.0/16", None, None)), None);
    }

    #[test]
    fn rejects_non_canonical_cidr() {
        assert_eq!(
            check(&params("10.250.0.1/19", None, None)).as_deref(),
            Some("while parsing nodes CIDR: 10.250.0.1 must be valid canonical CIDR")
        );
    }

    #[test]
    fn rejects_unparsable_cidr() {
        assert_eq!(
            check(&params("10.250.0.0/16", Some("not-a-cidr"), None)).as_deref(),
            Some("while parsing pods CIDR: invalid CIDR address: not-a-cidr")
        );
    }

    #[test]
    fn rejects_small_nodes_network() {
        assert_eq!(
            check(&params("10.250.0.0/25", None, None)).as_deref(),
            Some("the suffix of the node CIDR must not be greater than 23")
        );
    }

    #[test]
    fn reports_all_seed_overlaps() {
        let msg = check(&params("10.243.0.0/16", None, None)).unwrap();
        assert_eq!(
            msg,
            "nodes CIDR must not overlap 10.243.128.0/17; \
             nodes CIDR must not overlap 10.243.0.0/17; \
             nodes CIDR must not overlap 10.243.0.0/16"
        );
    }

    #[test]
    fn reports_mutual_overlaps() {
        let msg = check(&params("10.250.0.0/16", Some("10.250.0.0/19"), Some("10.250.64.0/19"))).unwrap();
        assert_eq!(
            msg,
            "nodes CIDR must not overlap pods CIDR; nodes CIDR must not overlap serivces CIDR"
        );
    }

    #[test]
    fn too_many_zones() {
        let p = ProvisioningParametersDto {
            zones: ["a", "b", "c", "d", "e"].map(String::from).to_vec(),
            ..Default::default()
        };
        assert_eq!(check(&p).as_deref(), Some("number of zones must not be greater than 4"));
    }
}
