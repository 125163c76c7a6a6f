//! Configuration loading and assembly of the broker façade.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use keb_admission::{AdmissionPipeline, QuotaClient};
use keb_core::{BrokerConfig, PlanRegistry, PlanSpecifications, ProviderSpec};
use keb_lifecycle::{Broker, Collaborators, Labeler, Queue, ResponseLabels};
use keb_state::Store;
use tracing::{info, warn};

/// Locations of the three configuration files.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config: PathBuf,
    pub providers: PathBuf,
    pub plans: PathBuf,
}

impl ConfigPaths {
    /// `broker.toml`, `providers.toml` and `plans.toml` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            config: dir.join("broker.toml"),
            providers: dir.join("providers.toml"),
            plans: dir.join("plans.toml"),
        }
    }
}

/// Parsed and validated configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Arc<BrokerConfig>,
    pub providers: Arc<ProviderSpec>,
    pub plans: Arc<PlanSpecifications>,
}

impl LoadedConfig {
    pub fn load(paths: &ConfigPaths) -> anyhow::Result<Self> {
        let config = BrokerConfig::from_file(&paths.config)
            .with_context(|| format!("loading broker config {}", paths.config.display()))?;
        let providers = ProviderSpec::from_file(&paths.providers)
            .with_context(|| format!("loading providers file {}", paths.providers.display()))?;
        let plans = PlanSpecifications::from_file(&paths.plans)
            .with_context(|| format!("loading plans file {}", paths.plans.display()))?;
        let loaded = Self {
            config: Arc::new(config),
            providers: Arc::new(providers),
            plans: Arc::new(plans),
        };
        loaded.validate()?;
        Ok(loaded)
    }

    /// Every provider region must be complete. Enabled plans without
    /// region entries are reported but tolerated.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.providers
            .validate_all()
            .context("invalid providers file")?;
        for plan in self.config.broker.enable_plans.iter() {
            if plan.is_own_cluster() {
                continue;
            }
            if self.plans.regions(plan.name(), "").is_empty() {
                warn!(plan = plan.name(), "enabled plan has no regions in the plans file");
            }
        }
        info!(
            plans = ?self.config.broker.enable_plans.iter().map(|p| p.name()).collect::<Vec<_>>(),
            "configuration loaded"
        );
        Ok(())
    }
}

// ── Collaborators ─────────────────────────────────────────────────

/// Grants the same quota to every subaccount and plan.
#[derive(Debug, Clone, Copy)]
pub struct StaticQuota {
    pub quota: i32,
}

#[async_trait]
impl QuotaClient for StaticQuota {
    async fn get_quota(&self, _sub_account_id: &str, _plan_name: &str) -> Result<i32, String> {
        Ok(self.quota)
    }
}

/// Records label moves in the log; no cluster access.
#[derive(Debug, Default)]
pub struct LoggingLabeler;

#[async_trait]
impl Labeler for LoggingLabeler {
    async fn update_labels(&self, runtime_id: &str, global_account_id: &str) -> Result<(), String> {
        info!(runtime = runtime_id, global_account = global_account_id, "moving runtime labels");
        Ok(())
    }
}

/// Assemble the broker from loaded configuration and its collaborators.
pub fn build_broker(
    loaded: &LoadedConfig,
    store: Arc<dyn Store>,
    quota: Arc<dyn QuotaClient>,
    queue: Arc<dyn Queue>,
    labeler: Arc<dyn Labeler>,
) -> Broker {
    let config = loaded.config.clone();
    let registry = Arc::new(PlanRegistry::new(config.broker.enable_plans.clone()));
    let pipeline = AdmissionPipeline::new(
        config.clone(),
        loaded.providers.clone(),
        loaded.plans.clone(),
        registry,
        store.clone(),
        quota,
    );
    let labels = ResponseLabels::new(
        &config.broker.url,
        &config.broker.trial_docs_url,
        &config.broker.free_docs_url,
    );
    Broker::new(Collaborators {
        config,
        pipeline: Arc::new(pipeline),
        store,
        queue,
        labeler,
        labels: Arc::new(labels),
    })
}
