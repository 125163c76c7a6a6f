//! Own-cluster kubeconfig check.
//!
//! The kubeconfig arrives base64-encoded. It must decode and parse as a
//! kubeconfig that can actually select a cluster.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Kubeconfig {
    #[serde(default, rename = "apiVersion")]
    api_version: String,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    users: Vec<NamedUser>,
    #[serde(default)]
    current_context: String,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: Cluster,
}

#[derive(Debug, Deserialize)]
struct Cluster {
    #[serde(default)]
    server: String,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: Context,
}

#[derive(Debug, Deserialize)]
struct Context {
    #[serde(default)]
    cluster: String,
    #[serde(default)]
    user: String,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
}

/// Decode and validate a base64 kubeconfig.
pub fn validate_kubeconfig(encoded: &str) -> Result<(), String> {
    let raw = STANDARD
        .decode(encoded.trim())
        .map_err(|e| format!("while decoding kubeconfig: {e}"))?;
    let config: Kubeconfig =
        serde_yaml::from_slice(&raw).map_err(|e| format!("while validating kubeconfig: {e}"))?;
    check(&config).map_err(|e| format!("while validating kubeconfig: {e}"))
}

fn check(config: &Kubeconfig) -> Result<(), String> {
    if config.api_version.is_empty() {
        return Err("apiVersion is missing".to_string());
    }
    if config.clusters.is_empty() {
        return Err("no clusters defined".to_string());
    }
    let context_name = if config.current_context.is_empty() {
        config
            .contexts
            .first()
            .map(|c| c.name.as_str())
            .ok_or("no contexts defined")?
    } else {
        config.current_context.as_str()
    };
    let context = config
        .contexts
        .iter()
        .find(|c| c.name == context_name)
        .ok_or_else(|| format!("context was not found for specified context: {context_name}"))?;
    let cluster = config
        .clusters
        .iter()
        .find(|c| c.name == context.context.cluster)
        .ok_or_else(|| format!("cluster {:?} referenced by context {context_name} not found", context.context.cluster))?;
    if cluster.cluster.server.is_empty() {
        return Err(format!("no server found for cluster {:?}", cluster.name));
    }
    if !context.context.user.is_empty() && !config.users.iter().any(|u| u.name == context.context.user) {
        return Err(format!(
            "user {:?} referenced by context {context_name} not found",
            context.context.user
        ));
    }
    Ok(())
}
