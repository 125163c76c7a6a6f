//! The admission pipeline.
//!
//! Turns a raw provisioning or update request into validated parameters, or
//! into a [`BrokerError`] whose status and message are part of the external
//! contract. Structural schema validation always runs before the semantic
//! rules.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use keb_core::{
    AdditionalWorkerNodePool, BrokerConfig, BrokerError, BrokerResult, CloudProvider, ErsContext, Issues,
    KYMA_SERVICE_ID, Plan, PlanRegistry, PlanSpecifications, ProviderSpec, ProvisioningParameters,
    ProvisioningParametersDto, RuleGroup, UpdatingParametersDto, pool_names_unique,
};
use keb_state::{Instance, Store};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cardinality::{check_single_free, check_single_trial};
use crate::catalog::SchemaService;
use crate::gpu::{check_gpu_machines, group_by_machine};
use crate::kubeconfig::validate_kubeconfig;
use crate::matrix::MachineMatrix;
use crate::networking::validate_networking;
use crate::quota::{QuotaClient, check_quota};
use crate::structural::{SchemaKind, validate_against_schema};
use crate::values::{ProviderValues, TRIAL_REGIONS, ValuesContext, provider_values};
use crate::zones::{ZoneSource, ZonesDiscovery, check_pool_zones, check_primary_zones, discover_zones};

pub const INGRESS_FILTERING_UNAVAILABLE: &str = "ingress filtering option is not available";
pub const POOL_NAMES_NOT_UNIQUE: &str = "names of additional worker node pools must be unique";

// ── Requests ───────────────────────────────────────────────────────

/// A provisioning request as received from the platform.
#[derive(Debug, Clone, Default)]
pub struct ProvisionRequest {
    pub instance_id: String,
    pub service_id: String,
    pub plan_id: String,
    pub raw_parameters: Option<Value>,
    pub raw_context: Value,
    pub platform_region: String,
    pub platform_provider: Option<CloudProvider>,
    pub async_allowed: bool,
}

/// An update request. An empty `plan_id` keeps the current plan.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub instance_id: String,
    pub service_id: String,
    pub plan_id: String,
    pub raw_parameters: Option<Value>,
    pub raw_context: Option<Value>,
    pub async_allowed: bool,
}

/// Outcome of a successful provisioning admission.
#[derive(Debug, Clone)]
pub struct Admitted {
    pub plan: Plan,
    pub parameters: ProvisioningParameters,
    pub values: ProviderValues,
}

/// Outcome of a successful update admission.
#[derive(Debug, Clone)]
pub struct UpdateAdmission {
    pub values: ProviderValues,
    /// Set when the request moves the instance to another plan.
    pub plan_change: Option<Plan>,
}

/// Whether pool rules run for a new instance or against existing pools.
enum PoolCheck<'a> {
    Create,
    Update {
        current: &'a [AdditionalWorkerNodePool],
        regular_machines: Vec<String>,
    },
}

// ── Pipeline ───────────────────────────────────────────────────────

/// Admission rules with their configuration and collaborators.
pub struct AdmissionPipeline {
    config: Arc<BrokerConfig>,
    providers: Arc<ProviderSpec>,
    plans: Arc<PlanSpecifications>,
    registry: Arc<PlanRegistry>,
    matrix: MachineMatrix,
    schemas: SchemaService,
    store: Arc<dyn Store>,
    quota: Arc<dyn QuotaClient>,
    zones: Option<Arc<dyn ZonesDiscovery>>,
}

impl AdmissionPipeline {
    pub fn new(
        config: Arc<BrokerConfig>,
        providers: Arc<ProviderSpec>,
        plans: Arc<PlanSpecifications>,
        registry: Arc<PlanRegistry>,
        store: Arc<dyn Store>,
        quota: Arc<dyn QuotaClient>,
    ) -> Self {
        let matrix = MachineMatrix::from_spec(&providers);
        let schemas = SchemaService::new(config.clone(), providers.clone(), plans.clone());
        Self {
            config,
            providers,
            plans,
            registry,
            matrix,
            schemas,
            store,
            quota,
            zones: None,
        }
    }

    /// Use live zone discovery for providers that have it switched on.
    pub fn with_zones_discovery(mut self, client: Arc<dyn ZonesDiscovery>) -> Self {
        self.zones = Some(client);
        self
    }

    pub fn schemas(&self) -> &SchemaService {
        &self.schemas
    }

    pub fn registry(&self) -> &PlanRegistry {
        &self.registry
    }

    fn values_context(&self) -> ValuesContext<'_> {
        ValuesContext {
            infrastructure: &self.config.infrastructure_manager,
            trial_region_mapping: &self.config.trial_platform_region_mapping,
            providers: &self.providers,
            plans: &self.plans,
        }
    }

    /// Provider defaults for a stored or freshly decoded parameter set.
    pub fn provider_values(&self, params: &ProvisioningParameters) -> Result<ProviderValues, String> {
        provider_values(params, &self.values_context())
    }

    // ── Provisioning ───────────────────────────────────────────────

    /// Decode, normalize and validate a provisioning request.
    pub async fn admit_provision(&self, request: &ProvisionRequest) -> BrokerResult<Admitted> {
        let mut dto = ProvisioningParametersDto::from_raw(request.raw_parameters.as_ref())?;
        let ers_context = ErsContext::from_provision_raw(&request.raw_context)?;
        if !self.config.broker.reject_unsupported_parameters {
            let unknown = ProvisioningParametersDto::unknown_keys(request.raw_parameters.as_ref());
            if !unknown.is_empty() {
                info!(
                    instance = %request.instance_id,
                    global_account = %ers_context.global_account_id,
                    sub_account = %ers_context.sub_account_id,
                    ?unknown,
                    "provisioning request carries unsupported parameters"
                );
            }
        }

        if request.service_id != KYMA_SERVICE_ID {
            return Err(BrokerError::bad_request("service_id not recognized"));
        }
        let plan = self
            .registry
            .enabled_by_id(&request.plan_id)
            .ok_or_else(|| BrokerError::bad_request(format!("plan ID {:?} is not recognized", request.plan_id)))?;

        self.normalize(plan, &mut dto);

        let platform_provider = request.platform_provider.unwrap_or(CloudProvider::Aws);
        let schema = self.schemas.schema(plan, &request.platform_region, platform_provider, false);
        validate_against_schema(&schema, request.raw_parameters.as_ref(), SchemaKind::Create)?;

        let parameters = ProvisioningParameters {
            plan_id: request.plan_id.clone(),
            service_id: request.service_id.clone(),
            ers_context,
            parameters: dto,
            platform_region: request.platform_region.clone(),
            platform_provider: request.platform_provider,
        };
        let values = self
            .provider_values(&parameters)
            .map_err(|e| BrokerError::bad_request(format!("while obtaining plan defaults: {e}")))?;

        self.check_provision_rules(plan, &request.instance_id, &parameters, &values)
            .await?;
        info!(
            instance = %request.instance_id,
            plan = plan.name(),
            region = %values.region,
            "provisioning request admitted"
        );
        Ok(Admitted {
            plan,
            parameters,
            values,
        })
    }

    /// Drop fields the plan or the feature flags do not accept.
    fn normalize(&self, plan: Plan, dto: &mut ProvisioningParametersDto) {
        if plan.is_trial() {
            dto.strip_trial_sizing();
        }
        if !self.config.broker.enable_shoot_and_seed_same_region {
            dto.shoot_and_seed_same_region = None;
        }
        if !self.config.infrastructure_manager.enable_ingress_filtering {
            dto.ingress_filtering = None;
        }
    }

    async fn check_provision_rules(
        &self,
        plan: Plan,
        instance_id: &str,
        parameters: &ProvisioningParameters,
        values: &ProviderValues,
    ) -> BrokerResult<()> {
        let dto = &parameters.parameters;
        let ers = &parameters.ers_context;
        let region = values.region.as_str();

        if dto.colocate_control_plane == Some(true) {
            self.check_colocation(plan, &parameters.platform_region, values.provider, dto.region.as_deref())
                .map_err(|e| {
                    BrokerError::bad_request(format!("validation of the region for colocating the control plane: {e}"))
                })?;
        }

        if let Some(machine) = dto.machine_type.as_deref() {
            self.check_region_machine(region, machine).map_err(BrokerError::bad_request)?;
        }

        let primary = dto
            .machine_type
            .as_deref()
            .unwrap_or(values.default_machine_type.as_str());
        let pool_machines = dto.additional_worker_node_pools.iter().map(|p| p.machine_type.as_str());
        let machine_types: Vec<&str> = std::iter::once(primary).chain(pool_machines).collect();
        let discovered = self.discover(values, machine_types).await?;
        if let Some(counts) = &discovered {
            check_primary_zones(counts, primary, region, values.zones_count).map_err(BrokerError::unprocessable)?;
        }

        validate_networking(dto, &self.config.networking).into_result(BrokerError::BadRequest)?;

        dto.autoscaler
            .validate(values.default_autoscaler_min, values.default_autoscaler_max)
            .map_err(BrokerError::unprocessable)?;
        if dto.oidc.is_provided() {
            dto.oidc.validate(None).map_err(BrokerError::unprocessable)?;
        }

        if !dto.additional_worker_node_pools.is_empty() {
            self.check_pools(
                plan,
                region,
                &dto.additional_worker_node_pools,
                ers,
                discovered.as_ref(),
                PoolCheck::Create,
            )
            .map_err(BrokerError::unprocessable)?;
        }

        self.check_ingress_filtering(plan, dto.ingress_filtering, ers)?;

        if plan.is_own_cluster() {
            validate_kubeconfig(&dto.kubeconfig).map_err(BrokerError::bad_request)?;
        }
        if plan.is_trial()
            && let Some(trial_region) = dto.region.as_deref().filter(|r| !r.is_empty())
            && !TRIAL_REGIONS.contains(&trial_region)
        {
            return Err(BrokerError::bad_request("invalid region specified in request for trial"));
        }

        let broker = &self.config.broker;
        if plan.is_trial() && broker.only_single_trial_per_ga {
            check_single_trial(&*self.store, &ers.global_account_id, instance_id)?;
        }
        if plan.is_free()
            && broker.only_one_free_per_ga
            && !self.config.whitelist.freemium_exempt(&ers.global_account_id)
        {
            check_single_free(&*self.store, &*self.store, &ers.global_account_id, instance_id)?;
        }
        if broker.check_quota_limit && !self.config.whitelist.quota_exempt(&ers.sub_account_id) {
            check_quota(&*self.store, &*self.quota, &ers.sub_account_id, instance_id, plan, false).await?;
        }
        Ok(())
    }

    // ── Update ─────────────────────────────────────────────────────

    /// Update counterpart of the provisioning normalization.
    pub fn normalize_update(&self, plan_id: &str, params: &mut UpdatingParametersDto) {
        if self.registry.by_id(plan_id).is_some_and(Plan::is_trial) {
            params.strip_trial_sizing();
        }
        if !self.config.infrastructure_manager.enable_ingress_filtering {
            params.ingress_filtering = None;
        }
    }

    /// Structural check of raw update parameters against the instance's
    /// update schema.
    pub fn validate_update_schema(&self, instance: &Instance, raw: Option<&Value>) -> BrokerResult<()> {
        let Some(raw) = raw else {
            return Ok(());
        };
        let Some(plan) = self.registry.by_id(&instance.service_plan_id) else {
            return Err(BrokerError::internal(
                "unable to process the update",
                format!("instance {} has unknown plan {}", instance.instance_id, instance.service_plan_id),
            ));
        };
        let schema = self
            .schemas
            .schema(plan, &instance.parameters.platform_region, instance.provider, true);
        validate_against_schema(&schema, Some(raw), SchemaKind::Update)
    }

    /// Semantic checks of update parameters against the stored instance.
    ///
    /// `requested_plan_id` may equal the current plan; an empty value keeps
    /// it.
    pub async fn admit_update(
        &self,
        instance: &Instance,
        requested_plan_id: &str,
        params: &UpdatingParametersDto,
        ers: &ErsContext,
    ) -> BrokerResult<UpdateAdmission> {
        let current = &instance.parameters.parameters;
        let values = self.provider_values(&instance.parameters).map_err(|e| {
            warn!(instance = %instance.instance_id, error = %e, "unable to obtain provider values");
            BrokerError::internal("unable to process the request", e)
        })?;
        let region = values.region.as_str();
        let target_plan_id = if requested_plan_id.is_empty() {
            instance.service_plan_id.as_str()
        } else {
            requested_plan_id
        };

        if let Some(machine) = params.machine_type.as_deref() {
            self.check_region_machine(region, machine).map_err(BrokerError::bad_request)?;
        }

        let machine_types: Vec<&str> = params
            .machine_type
            .as_deref()
            .into_iter()
            .chain(params.pools().iter().map(|p| p.machine_type.as_str()))
            .collect();
        let discovered = self.discover(&values, machine_types).await?;
        if let (Some(counts), Some(machine)) = (&discovered, params.machine_type.as_deref()) {
            check_primary_zones(counts, machine, region, values.zones_count).map_err(BrokerError::unprocessable)?;
        }

        if params.oidc.is_provided() {
            params
                .oidc
                .validate(Some(&current.oidc))
                .map_err(BrokerError::bad_request)?;
        }

        let mut merged = current.clone();
        params.apply_to(&mut merged, true);
        merged
            .autoscaler
            .validate(values.default_autoscaler_min, values.default_autoscaler_max)
            .map_err(BrokerError::bad_request)?;

        let target_plan = self.registry.by_id(target_plan_id);
        if let Some(pools) = &params.additional_worker_node_pools {
            let plan = target_plan.ok_or_else(|| {
                BrokerError::bad_request(format!(
                    "additional worker node pools are not supported for plan ID: {target_plan_id}"
                ))
            })?;
            let check = PoolCheck::Update {
                current: &current.additional_worker_node_pools,
                regular_machines: self.plans.regular_machines(plan.name()),
            };
            self.check_pools(plan, region, pools, ers, discovered.as_ref(), check)
                .map_err(BrokerError::bad_request)?;
        }

        if let Some(plan) = self.registry.by_id(&instance.service_plan_id) {
            self.check_ingress_filtering(plan, params.ingress_filtering, ers)?;
        }

        let plan_change = if target_plan_id != instance.service_plan_id {
            Some(self.check_plan_change(instance, target_plan_id, ers).await?)
        } else {
            None
        };

        Ok(UpdateAdmission { values, plan_change })
    }

    async fn check_plan_change(&self, instance: &Instance, target_plan_id: &str, ers: &ErsContext) -> BrokerResult<Plan> {
        let old_name = self.registry.name_of(&instance.service_plan_id);
        let new_name = self.registry.name_of(target_plan_id);
        info!(instance = %instance.instance_id, from = %old_name, to = %new_name, "plan change requested");

        let allowed = self.config.broker.enable_plan_upgrades && self.plans.is_upgradable_between(&old_name, &new_name);
        let target = self.registry.by_id(target_plan_id).filter(|_| allowed).ok_or_else(|| {
            info!(instance = %instance.instance_id, "plan change not allowed");
            BrokerError::bad_request(format!(
                "plan upgrade from {old_name} (planID: {}) to {new_name} (planID: {target_plan_id}) is not allowed",
                instance.service_plan_id
            ))
        })?;

        let sub_account = if ers.sub_account_id.is_empty() {
            instance.sub_account_id.as_str()
        } else {
            ers.sub_account_id.as_str()
        };
        if self.config.broker.check_quota_limit && !self.config.whitelist.quota_exempt(sub_account) {
            check_quota(&*self.store, &*self.quota, sub_account, &instance.instance_id, target, true).await?;
        }
        info!(instance = %instance.instance_id, "plan change accepted");
        Ok(target)
    }

    // ── Shared rules ───────────────────────────────────────────────

    /// The requested region must be a seed region of the provider that the
    /// plan also offers on this platform.
    fn check_colocation(
        &self,
        plan: Plan,
        platform_region: &str,
        provider: CloudProvider,
        region: Option<&str>,
    ) -> Result<(), String> {
        let region = region.unwrap_or_default();
        let supported = self.plans.regions(plan.name(), platform_region);
        let seeds = self.providers.supported_seed_regions(provider, &supported);
        if seeds.iter().any(|s| s == region) {
            return Ok(());
        }
        warn!(region, provider = provider.config_key(), "missing seed region");
        Err(format!(
            "cannot colocate the control plane in the {region} region. \
             Provider {} can have control planes in the following regions: [{}]",
            provider.config_key(),
            seeds.join(" ")
        ))
    }

    fn check_region_machine(&self, region: &str, machine_type: &str) -> Result<(), String> {
        if self.matrix.is_supported(region, machine_type) {
            return Ok(());
        }
        Err(format!(
            "In the region {region}, the machine type {machine_type} is not available, it is supported in the {}",
            self.matrix.supported_regions(machine_type).join(", ")
        ))
    }

    /// Live zone counts, or `None` when the provider uses the static table.
    async fn discover<'a>(
        &self,
        values: &ProviderValues,
        machine_types: impl IntoIterator<Item = &'a str>,
    ) -> BrokerResult<Option<BTreeMap<String, usize>>> {
        if !self.providers.zones_discovery(values.provider) {
            return Ok(None);
        }
        let Some(client) = self.zones.as_deref() else {
            debug!(provider = %values.provider, "zone discovery configured without a client, using static zones");
            return Ok(None);
        };
        let interval = Duration::from_millis(self.config.broker.zone_discovery_retry_interval_ms);
        discover_zones(client, values.provider, &values.region, machine_types, interval)
            .await
            .map(Some)
            .map_err(BrokerError::unprocessable)
    }

    /// Pool rules, fail-fast between rules and aggregated within each.
    fn check_pools(
        &self,
        plan: Plan,
        region: &str,
        pools: &[AdditionalWorkerNodePool],
        ers: &ErsContext,
        discovered: Option<&BTreeMap<String, usize>>,
        check: PoolCheck<'_>,
    ) -> Result<(), String> {
        if !plan.supports_additional_worker_pools() {
            return Err(format!(
                "additional worker node pools are not supported for plan ID: {}",
                plan.id()
            ));
        }
        if !pool_names_unique(pools) {
            return Err(POOL_NAMES_NOT_UNIQUE.to_string());
        }
        if ers.is_external_license() {
            check_gpu_machines(pools)?;
        }

        let unsupported = group_by_machine(pools, |p| !self.matrix.is_supported(region, &p.machine_type));
        if !unsupported.is_empty() {
            let listed: Vec<String> = unsupported
                .iter()
                .map(|(machine, names)| {
                    format!(
                        "{machine} (used in: {}), it is supported in the {}",
                        names.join(", "),
                        self.matrix.supported_regions(machine).join(", ")
                    )
                })
                .collect();
            return Err(format!(
                "In the region {region}, the following machine types are not available: {}",
                listed.join("; ")
            ));
        }

        let mut issues = Issues::new(RuleGroup::WorkerPools);
        for pool in pools {
            if let Err(e) = pool.validate() {
                issues.push(e);
            }
        }
        if let Some(joined) = issues.joined() {
            return Err(format!(
                "The following additionalWorkerPools have validation issues: {joined}."
            ));
        }

        if let PoolCheck::Update { current, .. } = &check {
            let changed: Vec<&str> = pools
                .iter()
                .filter(|p| !p.ha_zones_unchanged(current))
                .map(|p| p.name.as_str())
                .collect();
            if !changed.is_empty() {
                return Err(format!(
                    "HA zones setting is permanent and cannot be changed for additional worker node pools: {}.",
                    changed.join(", ")
                ));
            }
        }

        let source = match discovered {
            Some(counts) => ZoneSource::Discovered(counts),
            None => ZoneSource::Static {
                matrix: &self.matrix,
                plan_id: plan.id(),
            },
        };
        check_pool_zones(pools, region, source)?;

        if let PoolCheck::Update {
            current,
            regular_machines,
        } = &check
        {
            let mut issues = Issues::new(RuleGroup::WorkerPools);
            for pool in pools {
                if let Err(e) = pool.validate_machine_type_change(current, regular_machines) {
                    issues.push(e);
                }
            }
            if let Some(joined) = issues.joined() {
                return Err(joined);
            }
        }
        Ok(())
    }

    fn check_ingress_filtering(&self, plan: Plan, requested: Option<bool>, ers: &ErsContext) -> BrokerResult<()> {
        let Some(requested) = requested else {
            return Ok(());
        };
        if !self.config.infrastructure_manager.ingress_filtering_plans.contains(plan) {
            info!(plan = plan.name(), "ingress filtering is not supported for the plan");
            return Err(BrokerError::bad_request(INGRESS_FILTERING_UNAVAILABLE));
        }
        if requested && ers.is_external_license() {
            info!("ingress filtering is not available for external customers");
            return Err(BrokerError::bad_request(INGRESS_FILTERING_UNAVAILABLE));
        }
        Ok(())
    }
}
