//! Update: context processing (suspension, account moves) followed by
//! parameter and plan changes.

use std::time::Duration;

use async_trait::async_trait;
use keb_admission::{Backoff, UpdateRequest, retry};
use keb_core::{BrokerError, BrokerResult, ErsContext, Plan, UpdatingParametersDto};
use keb_state::{Action, ActionKind, Actions, Instance, Instances, Operation, OperationState, Operations, StateError, Store};
use tracing::{debug, error, info, warn};

use crate::collaborators::{Collaborators, storage};
use crate::provision::ASYNC_REQUIRED;
use crate::response::UpdateResponse;
use crate::suspension::{SuspensionHandler, is_active};

pub const UNABLE_TO_PROCESS: &str = "unable to process the update";
pub const EXPIRED: &str = "cannot update an expired instance";
pub const FAILED_INSTANCE: &str = "Unable to process an update of a failed instance";
pub const DEPROVISIONED_INSTANCE: &str = "Unable to process an update of a deprovisioned instance";
pub const CONTEXT_FAILED: &str = "failed to process ERS context";
pub const LABELS_FAILED: &str = "Update CRs label failed";
pub const UPDATE_FAILED: &str = "Update operation failed";

const PLAN_CHANGE: &str = "Plan";

#[async_trait]
pub trait Updater: Send + Sync {
    async fn update(&self, request: UpdateRequest) -> BrokerResult<UpdateResponse>;
}

pub struct UpdateService {
    deps: Collaborators,
}

struct ProcessedContext {
    instance: Instance,
    suspension_changed: bool,
}

/// Instance fields an update request's context rewrites.
struct ContextChanges {
    ers_context: ErsContext,
    last_operation_id: Option<String>,
    global_account_id: Option<String>,
}

impl ContextChanges {
    fn apply_to(&self, instance: &mut Instance) {
        instance.parameters.ers_context = self.ers_context.clone();
        if let Some(op) = &self.last_operation_id {
            instance.last_operation_id = op.clone();
        }
        if let Some(target) = &self.global_account_id {
            if instance.subscription_global_account_id.is_none() {
                instance.subscription_global_account_id = Some(instance.global_account_id.clone());
            }
            instance.global_account_id = target.clone();
        }
    }
}

impl UpdateService {
    pub fn new(deps: Collaborators) -> Self {
        Self { deps }
    }

    fn write_backoff(&self) -> Backoff {
        let broker = &self.deps.config.broker;
        Backoff::until(
            Duration::from_millis(broker.instance_update_retry_timeout_ms),
            Duration::from_millis(broker.instance_update_retry_interval_ms),
        )
    }

    fn sync_response(&self, instance: &Instance) -> UpdateResponse {
        UpdateResponse {
            is_async: false,
            operation_id: None,
            dashboard_url: instance.dashboard_url.clone(),
            labels: self.deps.labels.labels(instance),
        }
    }

    // ── Context ────────────────────────────────────────────────────

    async fn process_context(
        &self,
        mut instance: Instance,
        provisioning: &Operation,
        deprovisioning: Option<&Operation>,
        requested: &ErsContext,
    ) -> BrokerResult<ProcessedContext> {
        let store = &self.deps.store;
        let id = instance.instance_id.clone();
        let last = store
            .last_operation(&id)
            .map_err(storage(CONTEXT_FAILED))?
            .ok_or_else(|| BrokerError::internal(CONTEXT_FAILED, format!("instance {id} has no operations")))?;

        let active = is_active(provisioning, deprovisioning);
        let mut saved = provisioning.provisioning_parameters.ers_context.clone();
        saved.active = Some(active);
        let saved = saved.inherit_missing(&last.provisioning_parameters.ers_context);
        instance.parameters.ers_context = saved.merged_with(requested);

        let suspension = SuspensionHandler::new(&self.deps).handle(&instance, provisioning, active, requested)?;

        let broker = &self.deps.config.broker;
        let moved = broker.subaccount_movement_enabled
            && !requested.global_account_id.is_empty()
            && requested.global_account_id != instance.global_account_id;
        if moved {
            let message = format!(
                "Subaccount {} moved from Global Account {} to {}.",
                requested.sub_account_id, instance.global_account_id, requested.global_account_id
            );
            let action = Action::new(
                ActionKind::SubaccountMovement,
                &id,
                &message,
                &instance.global_account_id,
                &requested.global_account_id,
            );
            if let Err(e) = store.insert_action(&action) {
                error!(instance = %id, error = %e, "while inserting subaccount movement action");
            }
        }

        let changes = ContextChanges {
            ers_context: instance.parameters.ers_context.clone(),
            last_operation_id: suspension.as_ref().map(|op| op.id.clone()),
            global_account_id: moved.then(|| requested.global_account_id.clone()),
        };
        let instance = self.persist_context(&id, &changes).await?;
        if moved {
            info!(instance = %id, global_account = %instance.global_account_id, "global account changed");
        }

        if moved && broker.update_custom_resources_labels_on_account_move {
            self.deps
                .labeler
                .update_labels(&instance.runtime_id, &instance.global_account_id)
                .await
                .map_err(|e| {
                    error!(instance = %id, runtime = %instance.runtime_id, error = %e, "unable to update global account label");
                    BrokerError::internal(LABELS_FAILED, e)
                })?;
            info!(instance = %id, "labels on runtime resources updated");
        }

        Ok(ProcessedContext {
            instance,
            suspension_changed: suspension.is_some(),
        })
    }

    /// Apply the context changes to a fresh read of the instance until the
    /// versioned write lands.
    async fn persist_context(&self, id: &str, changes: &ContextChanges) -> BrokerResult<Instance> {
        let store: &dyn Store = &*self.deps.store;
        retry(self.write_backoff(), move || async move {
            let mut current = store.get_instance(id)?.ok_or_else(|| StateError::NotFound(id.to_string()))?;
            changes.apply_to(&mut current);
            store.update_instance(&current).inspect_err(|e| {
                warn!(instance = %id, error = %e, "unable to store update context, retrying");
            })
        })
        .await
        .map_err(|e| {
            error!(instance = %id, error = %e, "instance context retries exhausted");
            BrokerError::internal(UNABLE_TO_PROCESS, e)
        })
    }

    // ── Parameters ─────────────────────────────────────────────────

    async fn update_parameters(
        &self,
        instance: Instance,
        request: &UpdateRequest,
        requested: &ErsContext,
    ) -> BrokerResult<UpdateResponse> {
        let plan_requested = !request.plan_id.is_empty() && request.plan_id != instance.service_plan_id;
        if request.raw_parameters.is_none() && !plan_requested && !requested.is_update_payload() {
            debug!(instance = %instance.instance_id, "no parameters to update");
            return Ok(self.sync_response(&instance));
        }
        if !request.async_allowed {
            return Err(BrokerError::unprocessable(ASYNC_REQUIRED));
        }

        let pipeline = &self.deps.pipeline;
        let old_plan_id = instance.service_plan_id.clone();
        let target_plan_id = if request.plan_id.is_empty() {
            instance.service_plan_id.as_str()
        } else {
            request.plan_id.as_str()
        };
        let mut params = UpdatingParametersDto::from_raw(request.raw_parameters.as_ref())?;
        pipeline.normalize_update(target_plan_id, &mut params);
        let admission = pipeline
            .admit_update(&instance, &request.plan_id, &params, requested)
            .await?;

        let pools_supported = pipeline
            .registry()
            .by_id(target_plan_id)
            .is_some_and(Plan::supports_additional_worker_pools);
        let mut snapshot = instance.parameters.clone();
        let mut changes = params.apply_to(&mut snapshot.parameters, pools_supported);
        if let Some(plan) = admission.plan_change {
            snapshot.plan_id = plan.id().to_string();
            changes.push(PLAN_CHANGE);
        }

        let mut operation = Operation::new_update(&instance.instance_id, snapshot);
        operation.updated_plan_id = admission.plan_change.map(|p| p.id().to_string());
        operation.dashboard_url = instance.dashboard_url.clone();
        let operation = self
            .deps
            .store
            .insert_operation(&operation)
            .map_err(storage("unable to save operation"))?;
        debug!(instance = %instance.instance_id, operation = %operation.id, changes = ?changes, "update operation stored");

        let instance = if changes.is_empty() {
            instance
        } else {
            self.persist_changes(&instance, &params, pools_supported, admission.plan_change, &changes)
                .await?
        };

        if let Some(plan) = admission.plan_change {
            self.record_plan_change(&instance.instance_id, &old_plan_id, plan);
        }

        self.deps
            .store
            .update_instance_last_operation(&instance.instance_id, &operation.id)
            .map_err(storage("unable to save instance"))?;
        self.deps.enqueue(&operation)?;
        info!(instance = %instance.instance_id, operation = %operation.id, "update started");

        Ok(UpdateResponse {
            is_async: true,
            operation_id: Some(operation.id),
            dashboard_url: instance.dashboard_url.clone(),
            labels: self.deps.labels.labels(&instance),
        })
    }

    /// Write the changes onto the stored instance, re-reading it on every
    /// attempt so a concurrent write only costs a retry.
    async fn persist_changes(
        &self,
        instance: &Instance,
        params: &UpdatingParametersDto,
        pools_supported: bool,
        plan_change: Option<Plan>,
        changes: &[&str],
    ) -> BrokerResult<Instance> {
        let store: &dyn Store = &*self.deps.store;
        let id = instance.instance_id.as_str();
        let dashboard_url = instance.dashboard_url.as_str();

        retry(self.write_backoff(), move || async move {
            let mut current = store.get_instance(id)?.ok_or_else(|| StateError::NotFound(id.to_string()))?;
            params.apply_to(&mut current.parameters.parameters, pools_supported);
            current.dashboard_url = dashboard_url.to_string();
            if let Some(plan) = plan_change {
                current.parameters.plan_id = plan.id().to_string();
                current.service_plan_id = plan.id().to_string();
                current.service_plan_name = plan.name().to_string();
            }
            store.update_instance(&current).inspect_err(|e| {
                warn!(instance = %id, changes = %changes.join(", "), error = %e, "unable to update instance, retrying");
            })
        })
        .await
        .map_err(|e| {
            error!(instance = %id, error = %e, "instance update retries exhausted");
            BrokerError::internal(UPDATE_FAILED, e)
        })
    }

    fn record_plan_change(&self, instance_id: &str, old_plan_id: &str, new_plan: Plan) {
        let old_name = self.deps.pipeline.registry().name_of(old_plan_id);
        let message = format!(
            "Plan updated from {old_name} (PlanID: {old_plan_id}) to {} (PlanID: {}).",
            new_plan.name(),
            new_plan.id()
        );
        let action = Action::new(ActionKind::PlanUpdate, instance_id, &message, old_plan_id, new_plan.id());
        if let Err(e) = self.deps.store.insert_action(&action) {
            error!(instance = %instance_id, error = %e, "while inserting plan update action");
        }
    }
}

#[async_trait]
impl Updater for UpdateService {
    async fn update(&self, request: UpdateRequest) -> BrokerResult<UpdateResponse> {
        let id = request.instance_id.clone();
        let store = &self.deps.store;
        let mut instance = store
            .get_instance(&id)
            .map_err(storage("unable to get instance"))?
            .ok_or_else(|| {
                warn!(instance = %id, "update of unknown instance");
                BrokerError::not_found(format!("could not execute update for instanceID {id}"))
            })?;
        let requested = ErsContext::from_update_raw(request.raw_context.as_ref())?;
        info!(
            instance = %id,
            plan = %instance.service_plan_name,
            requested_plan = %request.plan_id,
            active = ?requested.active,
            async_allowed = request.async_allowed,
            "update requested"
        );

        self.deps
            .pipeline
            .validate_update_schema(&instance, request.raw_parameters.as_ref())?;

        if instance.is_expired() {
            if !requested.global_account_id.is_empty() {
                return Ok(UpdateResponse::default());
            }
            return Err(BrokerError::bad_request(EXPIRED));
        }

        let provisioning = store
            .provisioning_operation(&id)
            .map_err(storage(UNABLE_TO_PROCESS))?
            .ok_or_else(|| BrokerError::internal(UNABLE_TO_PROCESS, format!("instance {id} has no provisioning operation")))?;
        if provisioning.state == OperationState::Failed {
            return Err(BrokerError::unprocessable(FAILED_INSTANCE));
        }
        let deprovisioning = store.deprovisioning_operation(&id).map_err(storage(UNABLE_TO_PROCESS))?;
        if let Some(op) = deprovisioning.as_ref().filter(|op| !op.temporary) {
            warn!(instance = %id, operation = %op.id, "instance is being deprovisioned");
            return Err(BrokerError::unprocessable(DEPROVISIONED_INSTANCE));
        }

        let landscape = &self.deps.config.dashboard.landscape_url;
        if !landscape.is_empty() {
            instance.dashboard_url = format!("{landscape}/?kubeconfigID={id}");
        }

        let processed = self
            .process_context(instance, &provisioning, deprovisioning.as_ref(), &requested)
            .await?;
        if processed.suspension_changed || processed.instance.is_expired() {
            return Ok(self.sync_response(&processed.instance));
        }
        self.update_parameters(processed.instance, &request, &requested).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keb_state::OperationKind;
    use serde_json::json;
    use std::sync::Arc;

    use crate::provision::{ProvisionService, Provisioner};
    use crate::testing::{
        Fixture, RacingStore, RecordingLabeler, aws_parameters, fixture, provision_request, update_request,
    };

    /// Provision `inst-1` and mark its operation succeeded.
    async fn provisioned(fx: &mut Fixture) -> String {
        let response = ProvisionService::new(fx.deps.clone())
            .provision(provision_request("inst-1", aws_parameters()))
            .await
            .unwrap();
        let mut op = fx.store.get_operation(&response.operation_id).unwrap().unwrap();
        op.state = OperationState::Succeeded;
        fx.store.update_operation(&op).unwrap();
        fx.drain();
        response.operation_id
    }

    #[tokio::test]
    async fn unknown_instance_is_not_found() {
        let fx = fixture();
        let err = UpdateService::new(fx.deps.clone())
            .update(update_request("missing", None, None))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.message(), "could not execute update for instanceID missing");
    }

    #[tokio::test]
    async fn empty_update_is_synchronous() {
        let mut fx = fixture();
        provisioned(&mut fx).await;
        let response = UpdateService::new(fx.deps.clone())
            .update(update_request("inst-1", None, None))
            .await
            .unwrap();
        assert!(!response.is_async);
        assert_eq!(response.operation_id, None);
        assert_eq!(response.dashboard_url, "https://dashboard.kyma.localhost/?kubeconfigID=inst-1");
        assert!(fx.drain().is_empty());
    }

    #[tokio::test]
    async fn parameters_create_update_operation() {
        let mut fx = fixture();
        provisioned(&mut fx).await;
        let response = UpdateService::new(fx.deps.clone())
            .update(update_request("inst-1", Some(json!({ "name": "renamed", "autoScalerMax": 30 })), None))
            .await
            .unwrap();
        assert!(response.is_async);
        let op_id = response.operation_id.unwrap();
        assert_eq!(fx.drain(), vec![op_id.clone()]);
        assert_eq!(response.labels.get("Name").map(String::as_str), Some("renamed"));

        let op = fx.store.get_operation(&op_id).unwrap().unwrap();
        assert_eq!(op.kind, OperationKind::Update);
        assert_eq!(op.updated_plan_id, None);
        assert_eq!(op.provisioning_parameters.parameters.name, "renamed");

        let instance = fx.store.get_instance("inst-1").unwrap().unwrap();
        assert_eq!(instance.parameters.parameters.name, "renamed");
        assert_eq!(instance.parameters.parameters.autoscaler.auto_scaler_max, Some(30));
        assert_eq!(instance.last_operation_id, op_id);
    }

    #[tokio::test]
    async fn parameters_need_async_support() {
        let mut fx = fixture();
        provisioned(&mut fx).await;
        let mut request = update_request("inst-1", Some(json!({ "name": "renamed" })), None);
        request.async_allowed = false;
        let err = UpdateService::new(fx.deps.clone()).update(request).await.unwrap_err();
        assert_eq!((err.status_code(), err.message()), (422, ASYNC_REQUIRED));
    }

    #[tokio::test]
    async fn failed_and_deprovisioned_instances_are_refused() {
        let mut fx = fixture();
        let op_id = provisioned(&mut fx).await;
        let service = UpdateService::new(fx.deps.clone());

        let mut op = fx.store.get_operation(&op_id).unwrap().unwrap();
        op.state = OperationState::Failed;
        fx.store.update_operation(&op).unwrap();
        let err = service.update(update_request("inst-1", None, None)).await.unwrap_err();
        assert_eq!((err.status_code(), err.message()), (422, FAILED_INSTANCE));

        op.state = OperationState::Succeeded;
        fx.store.update_operation(&op).unwrap();
        let deprovisioning = Operation::new_deprovisioning("inst-1", op.provisioning_parameters.clone(), false);
        fx.store.insert_operation(&deprovisioning).unwrap();
        let err = service.update(update_request("inst-1", None, None)).await.unwrap_err();
        assert_eq!((err.status_code(), err.message()), (422, DEPROVISIONED_INSTANCE));
    }

    #[tokio::test]
    async fn expired_instances() {
        let mut fx = fixture();
        provisioned(&mut fx).await;
        let mut instance = fx.store.get_instance("inst-1").unwrap().unwrap();
        instance.expired_at = Some(chrono::Utc::now());
        fx.store.update_instance(&instance).unwrap();
        let service = UpdateService::new(fx.deps.clone());

        let response = service
            .update(update_request("inst-1", None, Some(json!({ "globalaccount_id": "ga-1" }))))
            .await
            .unwrap();
        assert_eq!(response, UpdateResponse::default());

        let err = service.update(update_request("inst-1", None, None)).await.unwrap_err();
        assert_eq!((err.status_code(), err.message()), (400, EXPIRED));
    }

    #[tokio::test]
    async fn plan_upgrade_is_recorded() {
        let mut fx = fixture();
        provisioned(&mut fx).await;
        let mut request = update_request("inst-1", None, None);
        request.plan_id = Plan::BuildRuntimeAws.id().into();
        let response = UpdateService::new(fx.deps.clone()).update(request).await.unwrap();

        let op = fx.store.get_operation(&response.operation_id.unwrap()).unwrap().unwrap();
        assert_eq!(op.updated_plan_id.as_deref(), Some(Plan::BuildRuntimeAws.id()));
        assert_eq!(op.provisioning_parameters.plan_id, Plan::BuildRuntimeAws.id());

        let instance = fx.store.get_instance("inst-1").unwrap().unwrap();
        assert_eq!(instance.service_plan_id, Plan::BuildRuntimeAws.id());
        assert_eq!(instance.service_plan_name, Plan::BuildRuntimeAws.name());

        let actions = fx.store.list_actions("inst-1").unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::PlanUpdate);
        assert_eq!(
            actions[0].message,
            format!(
                "Plan updated from aws (PlanID: {}) to build-runtime-aws (PlanID: {}).",
                Plan::Aws.id(),
                Plan::BuildRuntimeAws.id()
            )
        );
    }

    #[tokio::test]
    async fn suspension_skips_parameters() {
        let mut fx = fixture();
        provisioned(&mut fx).await;
        let service = UpdateService::new(fx.deps.clone());

        let response = service
            .update(update_request("inst-1", Some(json!({ "name": "ignored" })), Some(json!({ "active": false }))))
            .await
            .unwrap();
        assert!(!response.is_async);
        let queued = fx.drain();
        assert_eq!(queued.len(), 1);
        let suspension = fx.store.get_operation(&queued[0]).unwrap().unwrap();
        assert_eq!(suspension.kind, OperationKind::Deprovision);
        assert!(suspension.temporary);

        let instance = fx.store.get_instance("inst-1").unwrap().unwrap();
        assert_eq!(instance.parameters.parameters.name, "my-cluster");
        assert_eq!(instance.parameters.ers_context.active, Some(false));
        assert_eq!(instance.last_operation_id, suspension.id);

        service
            .update(update_request("inst-1", None, Some(json!({ "active": true }))))
            .await
            .unwrap();
        let queued = fx.drain();
        let resume = fx.store.get_operation(&queued[0]).unwrap().unwrap();
        assert_eq!(resume.kind, OperationKind::Provision);
    }

    #[tokio::test]
    async fn account_move_updates_labels() {
        let mut fx = fixture();
        provisioned(&mut fx).await;
        let mut instance = fx.store.get_instance("inst-1").unwrap().unwrap();
        instance.runtime_id = "rt-1".into();
        fx.store.update_instance(&instance).unwrap();

        let context = json!({ "globalaccount_id": "ga-2", "subaccount_id": "sa-1" });
        UpdateService::new(fx.deps.clone())
            .update(update_request("inst-1", None, Some(context)))
            .await
            .unwrap();

        let instance = fx.store.get_instance("inst-1").unwrap().unwrap();
        assert_eq!(instance.global_account_id, "ga-2");
        assert_eq!(instance.subscription_global_account_id.as_deref(), Some("ga-1"));
        assert_eq!(
            *fx.labeler.calls.lock().unwrap(),
            vec![("rt-1".to_string(), "ga-2".to_string())]
        );
        let actions = fx.store.list_actions("inst-1").unwrap();
        assert_eq!(actions[0].message, "Subaccount sa-1 moved from Global Account ga-1 to ga-2.");
    }

    #[tokio::test]
    async fn label_failure_is_internal() {
        let mut fx = fixture();
        provisioned(&mut fx).await;
        fx.deps.labeler = Arc::new(RecordingLabeler {
            fail: true,
            ..Default::default()
        });
        let err = UpdateService::new(fx.deps.clone())
            .update(update_request("inst-1", None, Some(json!({ "globalaccount_id": "ga-2" }))))
            .await
            .unwrap_err();
        assert_eq!((err.status_code(), err.message()), (500, LABELS_FAILED));
        let instance = fx.store.get_instance("inst-1").unwrap().unwrap();
        assert_eq!(instance.global_account_id, "ga-2");
    }

    // ── Concurrent writes ──────────────────────────────────────────

    fn racing_service(fx: &Fixture, clean: usize, racing: usize) -> UpdateService {
        let mut deps = fx.deps.clone();
        deps.store = Arc::new(RacingStore::new(fx.store.clone(), clean, racing));
        UpdateService::new(deps)
    }

    #[tokio::test]
    async fn context_write_is_reapplied_after_concurrent_change() {
        let mut fx = fixture();
        provisioned(&mut fx).await;
        let context = json!({ "globalaccount_id": "ga-2", "subaccount_id": "sa-1" });
        racing_service(&fx, 0, 2)
            .update(update_request("inst-1", None, Some(context)))
            .await
            .unwrap();

        let instance = fx.store.get_instance("inst-1").unwrap().unwrap();
        assert_eq!(instance.global_account_id, "ga-2");
        assert_eq!(instance.subscription_global_account_id.as_deref(), Some("ga-1"));
        assert_eq!(instance.runtime_id, "rt-race-2");
    }

    #[tokio::test]
    async fn context_write_gives_up_when_always_stale() {
        let mut fx = fixture();
        provisioned(&mut fx).await;
        let context = json!({ "globalaccount_id": "ga-2", "subaccount_id": "sa-1" });
        let err = racing_service(&fx, 0, usize::MAX)
            .update(update_request("inst-1", None, Some(context)))
            .await
            .unwrap_err();
        assert_eq!((err.status_code(), err.message()), (500, UNABLE_TO_PROCESS));
        assert_eq!(fx.store.get_instance("inst-1").unwrap().unwrap().global_account_id, "ga-1");
    }

    #[tokio::test]
    async fn parameter_write_is_reapplied_after_concurrent_change() {
        let mut fx = fixture();
        provisioned(&mut fx).await;
        let response = racing_service(&fx, 1, 3)
            .update(update_request("inst-1", Some(json!({ "name": "renamed" })), None))
            .await
            .unwrap();
        assert!(response.is_async);

        let instance = fx.store.get_instance("inst-1").unwrap().unwrap();
        assert_eq!(instance.parameters.parameters.name, "renamed");
        assert_eq!(instance.runtime_id, "rt-race-3");
        assert_eq!(Some(instance.last_operation_id), response.operation_id);
    }

    #[tokio::test]
    async fn parameter_write_gives_up_when_always_stale() {
        let mut fx = fixture();
        provisioned(&mut fx).await;
        let err = racing_service(&fx, 1, usize::MAX)
            .update(update_request("inst-1", Some(json!({ "name": "renamed" })), None))
            .await
            .unwrap_err();
        assert_eq!((err.status_code(), err.message()), (500, UPDATE_FAILED));
        assert_eq!(
            fx.store.get_instance("inst-1").unwrap().unwrap().parameters.parameters.name,
            "my-cluster"
        );
        assert!(fx.drain().is_empty());
    }
}
