//! Provisioning: admit the request, persist the instance and its first
//! operation, then hand the operation to the queue.

use async_trait::async_trait;
use keb_admission::{Admitted, ProvisionRequest};
use keb_core::{BrokerError, BrokerResult, ProvisioningParameters};
use keb_state::{Instance, Instances, Operation, Operations};
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::{info, warn};

use crate::collaborators::{Collaborators, storage};
use crate::labels::dashboard_url;
use crate::response::ProvisionResponse;

pub const ASYNC_REQUIRED: &str = "This service plan requires client support for asynchronous service operations.";
pub const NO_REGION: &str = "No region specified in request.";
pub const PROVISIONING_EXISTS: &str = "provisioning operation already exist";

const SHOOT_NAME_SUFFIX_LEN: usize = 7;

#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, request: ProvisionRequest) -> BrokerResult<ProvisionResponse>;
}

pub struct ProvisionService {
    deps: Collaborators,
}

impl ProvisionService {
    pub fn new(deps: Collaborators) -> Self {
        Self { deps }
    }

    /// Answer a repeated request from the stored operation, or reject a
    /// different request for the same instance.
    fn replay(&self, existing: Operation, parameters: &ProvisioningParameters) -> BrokerResult<ProvisionResponse> {
        if !existing.provisioning_parameters.is_equal(parameters) {
            warn!(instance = %existing.instance_id, operation = %existing.id, "provisioning request differs from the stored one");
            return Err(BrokerError::conflict(PROVISIONING_EXISTS));
        }
        let labels = self
            .deps
            .store
            .get_instance(&existing.instance_id)
            .map_err(storage("unable to get instance"))?
            .map(|instance| self.deps.labels.labels(&instance))
            .unwrap_or_default();
        info!(instance = %existing.instance_id, operation = %existing.id, "provisioning request replayed");
        Ok(ProvisionResponse {
            operation_id: existing.id,
            dashboard_url: existing.dashboard_url,
            labels,
        })
    }

    fn shoot_domain(&self, shoot_name: &str) -> String {
        let base = self.deps.config.broker.shoot_domain.trim_matches('.');
        format!("{shoot_name}.{base}")
    }
}

/// `c-` followed by random lowercase alphanumerics.
pub fn generate_shoot_name() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SHOOT_NAME_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("c-{suffix}")
}

#[async_trait]
impl Provisioner for ProvisionService {
    async fn provision(&self, request: ProvisionRequest) -> BrokerResult<ProvisionResponse> {
        let instance_id = request.instance_id.clone();
        if request.platform_region.is_empty() {
            return Err(BrokerError::internal(NO_REGION, format!("instance {instance_id}: empty platform region")));
        }
        if !request.async_allowed {
            return Err(BrokerError::unprocessable(ASYNC_REQUIRED));
        }

        let Admitted {
            plan,
            parameters,
            values,
        } = self
            .deps
            .pipeline
            .admit_provision(&request)
            .await
            .map_err(|e| e.context(&format!("[instanceID: {instance_id}] ")))?;

        if let Some(existing) = self
            .deps
            .store
            .provisioning_operation(&instance_id)
            .map_err(storage("unable to get provisioning operation"))?
        {
            return self.replay(existing, &parameters);
        }

        let dashboard = dashboard_url(&self.deps.config.dashboard.landscape_url, plan.id(), &instance_id);
        let mut operation = Operation::new_provisioning(&instance_id, parameters.clone());
        operation.dashboard_url = dashboard.clone();
        if plan.is_own_cluster() {
            operation.shoot_name = parameters.parameters.shoot_name.clone();
            operation.shoot_domain = parameters.parameters.shoot_domain.clone();
        } else {
            operation.shoot_name = generate_shoot_name();
            operation.shoot_domain = self.shoot_domain(&operation.shoot_name);
        }
        let operation = self
            .deps
            .store
            .insert_operation(&operation)
            .map_err(storage("unable to save operation"))?;

        let instance = Instance::new(&instance_id, parameters, plan.name(), values.provider, &dashboard);
        self.deps
            .store
            .insert_instance(&instance)
            .map_err(storage("unable to save instance"))?;
        self.deps
            .store
            .update_instance_last_operation(&instance_id, &operation.id)
            .map_err(storage("unable to save instance"))?;

        self.deps.enqueue(&operation)?;
        info!(
            instance = %instance_id,
            operation = %operation.id,
            plan = plan.name(),
            shoot = %operation.shoot_name,
            "provisioning started"
        );
        Ok(ProvisionResponse {
            operation_id: operation.id,
            dashboard_url: dashboard,
            labels: self.deps.labels.labels(&instance),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keb_core::Plan;
    use keb_state::{Instances, OperationKind, Operations};
    use serde_json::json;
    use std::sync::Arc;

    use crate::testing::{ClosedQueue, aws_parameters, config, fixture, fixture_with, provision_request};

    const KUBECONFIG: &str = "YXBpVmVyc2lvbjogdjEKY2x1c3RlcnM6CiAgLSBuYW1lOiBzaG9vdAogICAgY2x1c3RlcjoKICAgICAgc2VydmVyOiBodHRwczovL2FwaS5leGFtcGxlLmNvbQpjb250ZXh0czoKICAtIG5hbWU6IHNob290CiAgICBjb250ZXh0OgogICAgICBjbHVzdGVyOiBzaG9vdAo=";

    #[test]
    fn shoot_names_are_short_and_lowercase() {
        let name = generate_shoot_name();
        assert_eq!(name.len(), 2 + SHOOT_NAME_SUFFIX_LEN);
        assert!(name.starts_with("c-"));
        assert!(name.chars().all(|c| c == '-' || c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn provision_persists_and_queues() {
        let mut fx = fixture();
        let service = ProvisionService::new(fx.deps.clone());
        let response = service.provision(provision_request("inst-1", aws_parameters())).await.unwrap();

        assert_eq!(response.dashboard_url, "https://dashboard.kyma.localhost/?kubeconfigID=inst-1");
        assert_eq!(response.labels.get("Name").map(String::as_str), Some("my-cluster"));
        assert_eq!(fx.drain(), vec![response.operation_id.clone()]);

        let instance = fx.store.get_instance("inst-1").unwrap().unwrap();
        assert_eq!(instance.last_operation_id, response.operation_id);
        assert_eq!(instance.service_plan_name, Plan::Aws.name());
        assert_eq!(instance.global_account_id, "ga-1");

        let op = fx.store.get_operation(&response.operation_id).unwrap().unwrap();
        assert_eq!(op.kind, OperationKind::Provision);
        assert!(op.shoot_name.starts_with("c-"));
        assert_eq!(op.shoot_domain, format!("{}.kyma.localhost", op.shoot_name));
    }

    #[tokio::test]
    async fn identical_request_is_replayed() {
        let mut fx = fixture();
        let service = ProvisionService::new(fx.deps.clone());
        let first = service.provision(provision_request("inst-1", aws_parameters())).await.unwrap();
        let second = service.provision(provision_request("inst-1", aws_parameters())).await.unwrap();
        assert_eq!(first.operation_id, second.operation_id);
        assert_eq!(first.dashboard_url, second.dashboard_url);
        assert_eq!(fx.drain().len(), 1);
    }

    #[tokio::test]
    async fn trial_request_is_replayed() {
        let mut fx = fixture();
        let service = ProvisionService::new(fx.deps.clone());
        let trial = || {
            let mut request = provision_request("inst-trial", json!({ "name": "trial-cluster" }));
            request.plan_id = Plan::Trial.id().into();
            request
        };
        let first = service.provision(trial()).await.unwrap();
        let second = service.provision(trial()).await.unwrap();
        assert_eq!(first.operation_id, second.operation_id);
        assert_eq!(fx.drain().len(), 1);

        let mut other = trial();
        other.instance_id = "inst-trial-2".into();
        let err = service.provision(other).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.message().ends_with("but there is only one allowed"), "{}", err.message());
    }

    #[tokio::test]
    async fn request_at_quota_is_replayed() {
        let mut config = config();
        config.broker.check_quota_limit = true;
        let mut fx = fixture_with(config, 1);
        let service = ProvisionService::new(fx.deps.clone());

        let first = service.provision(provision_request("inst-1", aws_parameters())).await.unwrap();
        let second = service.provision(provision_request("inst-1", aws_parameters())).await.unwrap();
        assert_eq!(first.operation_id, second.operation_id);
        assert_eq!(fx.drain().len(), 1);

        let err = service
            .provision(provision_request("inst-2", aws_parameters()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.message().contains("quota exceeded for plan aws"), "{}", err.message());
    }

    #[tokio::test]
    async fn different_request_conflicts() {
        let fx = fixture();
        let service = ProvisionService::new(fx.deps.clone());
        service.provision(provision_request("inst-1", aws_parameters())).await.unwrap();
        let other = json!({ "name": "other-cluster", "region": "eu-central-1" });
        let err = service.provision(provision_request("inst-1", other)).await.unwrap_err();
        assert_eq!((err.status_code(), err.message()), (409, PROVISIONING_EXISTS));
    }

    #[tokio::test]
    async fn request_shape_errors() {
        let fx = fixture();
        let service = ProvisionService::new(fx.deps.clone());

        let mut request = provision_request("inst-1", aws_parameters());
        request.platform_region.clear();
        let err = service.provision(request).await.unwrap_err();
        assert_eq!((err.status_code(), err.message()), (500, NO_REGION));

        let mut request = provision_request("inst-1", aws_parameters());
        request.async_allowed = false;
        let err = service.provision(request).await.unwrap_err();
        assert_eq!((err.status_code(), err.message()), (422, ASYNC_REQUIRED));
    }

    #[tokio::test]
    async fn admission_errors_carry_instance_prefix() {
        let fx = fixture();
        let service = ProvisionService::new(fx.deps.clone());
        let mut request = provision_request("inst-1", aws_parameters());
        request.service_id = "unknown".into();
        let err = service.provision(request).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.message(), "[instanceID: inst-1] service_id not recognized");
        assert!(fx.store.get_instance("inst-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn own_cluster_keeps_given_shoot() {
        let fx = fixture();
        let service = ProvisionService::new(fx.deps.clone());
        let mut request = provision_request(
            "inst-own",
            json!({
                "name": "mine",
                "kubeconfig": KUBECONFIG,
                "shootName": "my-shoot",
                "shootDomain": "my.domain.example"
            }),
        );
        request.plan_id = Plan::OwnCluster.id().into();
        let response = service.provision(request).await.unwrap();
        assert_eq!(response.dashboard_url, "https://dashboard.kyma.localhost");

        let op = fx.store.get_operation(&response.operation_id).unwrap().unwrap();
        assert_eq!((op.shoot_name.as_str(), op.shoot_domain.as_str()), ("my-shoot", "my.domain.example"));
    }

    #[tokio::test]
    async fn queue_failure_is_internal() {
        let mut fx = fixture();
        fx.deps.queue = Arc::new(ClosedQueue);
        let service = ProvisionService::new(fx.deps.clone());
        let err = service.provision(provision_request("inst-1", aws_parameters())).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert!(fx.store.provisioning_operation("inst-1").unwrap().is_some());
    }
}
