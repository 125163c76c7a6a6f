//! Fixtures shared by the orchestrator tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use keb_admission::{AdmissionPipeline, ProvisionRequest, QuotaClient, UpdateRequest};
use keb_core::{
    BrokerConfig, CloudProvider, EnablePlans, KYMA_SERVICE_ID, Plan, PlanRegistry, PlanSpecifications, ProviderSpec,
};
use keb_state::{
    Action, Actions, Instance, InstanceArchived, InstanceFilter, Instances, InstancesArchived, Operation, Operations,
    StateResult, StateStore,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::collaborators::Collaborators;
use crate::labels::ResponseLabels;
use crate::queue::{ChannelQueue, Labeler, Queue, QueueError};

pub const PROVIDERS: &str = r#"
[[aws.regions]]
name = "eu-central-1"
display_name = "eu-central-1 (Europe, Frankfurt)"
zones = ["a", "b", "c"]
"#;

pub const PLANS: &str = r#"
["aws,build-runtime-aws"]
regular_machines = ["m6i.large", "m6i.xlarge"]
additional_machines = ["m6i.large", "m6i.xlarge"]
regions.default = ["eu-central-1"]
upgradable_to_plans = ["build-runtime-aws"]
"#;

/// Same quota for every subaccount and plan.
struct FixedQuota(i32);

#[async_trait]
impl QuotaClient for FixedQuota {
    async fn get_quota(&self, _: &str, _: &str) -> Result<i32, String> {
        Ok(self.0)
    }
}

/// Records every label move; fails when `fail` is set.
#[derive(Default)]
pub struct RecordingLabeler {
    pub calls: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

#[async_trait]
impl Labeler for RecordingLabeler {
    async fn update_labels(&self, runtime_id: &str, global_account_id: &str) -> Result<(), String> {
        self.calls
            .lock()
            .unwrap()
            .push((runtime_id.to_string(), global_account_id.to_string()));
        if self.fail { Err("label backend down".into()) } else { Ok(()) }
    }
}

pub struct ClosedQueue;

impl Queue for ClosedQueue {
    fn add(&self, _: &str) -> Result<(), QueueError> {
        Err(QueueError::Closed)
    }
}

/// Store whose instance writes race a concurrent writer.
///
/// The first `clean` calls to `update_instance` pass through. Each of the
/// following `racing` calls is preceded by a competing write that stamps
/// `runtime_id` with `rt-race-<n>`, so the caller's copy is stale.
pub struct RacingStore {
    inner: Arc<StateStore>,
    clean: usize,
    racing: usize,
    calls: AtomicUsize,
}

impl RacingStore {
    pub fn new(inner: Arc<StateStore>, clean: usize, racing: usize) -> Self {
        Self {
            inner,
            clean,
            racing,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Instances for RacingStore {
    fn insert_instance(&self, instance: &Instance) -> StateResult<()> {
        self.inner.insert_instance(instance)
    }

    fn get_instance(&self, instance_id: &str) -> StateResult<Option<Instance>> {
        self.inner.get_instance(instance_id)
    }

    fn update_instance(&self, instance: &Instance) -> StateResult<Instance> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.clean
            && call - self.clean < self.racing
            && let Some(mut other) = self.inner.get_instance(&instance.instance_id)?
        {
            other.runtime_id = format!("rt-race-{}", call - self.clean + 1);
            self.inner.update_instance(&other)?;
        }
        self.inner.update_instance(instance)
    }

    fn update_instance_last_operation(&self, instance_id: &str, operation_id: &str) -> StateResult<()> {
        self.inner.update_instance_last_operation(instance_id, operation_id)
    }

    fn list_instances(&self, filter: &InstanceFilter) -> StateResult<Vec<Instance>> {
        self.inner.list_instances(filter)
    }
}

impl Operations for RacingStore {
    fn insert_operation(&self, operation: &Operation) -> StateResult<Operation> {
        self.inner.insert_operation(operation)
    }

    fn update_operation(&self, operation: &Operation) -> StateResult<()> {
        self.inner.update_operation(operation)
    }

    fn get_operation(&self, operation_id: &str) -> StateResult<Option<Operation>> {
        self.inner.get_operation(operation_id)
    }

    fn provisioning_operation(&self, instance_id: &str) -> StateResult<Option<Operation>> {
        self.inner.provisioning_operation(instance_id)
    }

    fn deprovisioning_operation(&self, instance_id: &str) -> StateResult<Option<Operation>> {
        self.inner.deprovisioning_operation(instance_id)
    }

    fn last_operation(&self, instance_id: &str) -> StateResult<Option<Operation>> {
        self.inner.last_operation(instance_id)
    }

    fn list_operations(&self, instance_id: &str) -> StateResult<Vec<Operation>> {
        self.inner.list_operations(instance_id)
    }
}

impl InstancesArchived for RacingStore {
    fn insert_archived(&self, archived: &InstanceArchived) -> StateResult<()> {
        self.inner.insert_archived(archived)
    }

    fn count_archived_for_global_account(&self, global_account_id: &str, plan_id: &str) -> StateResult<usize> {
        self.inner.count_archived_for_global_account(global_account_id, plan_id)
    }
}

impl Actions for RacingStore {
    fn insert_action(&self, action: &Action) -> StateResult<()> {
        self.inner.insert_action(action)
    }

    fn list_actions(&self, instance_id: &str) -> StateResult<Vec<Action>> {
        self.inner.list_actions(instance_id)
    }
}

pub struct Fixture {
    pub deps: Collaborators,
    pub store: Arc<StateStore>,
    pub queued: mpsc::UnboundedReceiver<String>,
    pub labeler: Arc<RecordingLabeler>,
}

impl Fixture {
    /// Operation IDs queued so far.
    pub fn drain(&mut self) -> Vec<String> {
        let mut ids = Vec::new();
        while let Ok(id) = self.queued.try_recv() {
            ids.push(id);
        }
        ids
    }
}

pub fn config() -> BrokerConfig {
    let mut config = BrokerConfig::default();
    config.broker.url = "https://broker.kyma.localhost".into();
    config.broker.enable_plans = EnablePlans::parse("aws,build-runtime-aws,trial,own_cluster").unwrap();
    config.broker.enable_plan_upgrades = true;
    config.broker.subaccount_movement_enabled = true;
    config.broker.update_custom_resources_labels_on_account_move = true;
    config.broker.instance_update_retry_interval_ms = 1;
    config.broker.instance_update_retry_timeout_ms = 50;
    config.dashboard.landscape_url = "https://dashboard.kyma.localhost".into();
    config
}

pub fn fixture_with(config: BrokerConfig, quota: i32) -> Fixture {
    let config = Arc::new(config);
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let registry = Arc::new(PlanRegistry::new(config.broker.enable_plans.clone()));
    let pipeline = AdmissionPipeline::new(
        config.clone(),
        Arc::new(ProviderSpec::from_toml_str(PROVIDERS).unwrap()),
        Arc::new(PlanSpecifications::from_toml_str(PLANS).unwrap()),
        registry,
        store.clone(),
        Arc::new(FixedQuota(quota)),
    );
    let (queue, queued) = ChannelQueue::new();
    let labeler = Arc::new(RecordingLabeler::default());
    let labels = ResponseLabels::new(&config.broker.url, "https://docs/trial", "https://docs/free");
    let deps = Collaborators {
        config,
        pipeline: Arc::new(pipeline),
        store: store.clone(),
        queue: Arc::new(queue),
        labeler: labeler.clone(),
        labels: Arc::new(labels),
    };
    Fixture {
        deps,
        store,
        queued,
        labeler,
    }
}

pub fn fixture() -> Fixture {
    fixture_with(config(), 100)
}

pub fn context() -> Value {
    json!({ "globalaccount_id": "ga-1", "subaccount_id": "sa-1", "user_id": "owner@example.com" })
}

pub fn provision_request(instance_id: &str, parameters: Value) -> ProvisionRequest {
    ProvisionRequest {
        instance_id: instance_id.into(),
        service_id: KYMA_SERVICE_ID.into(),
        plan_id: Plan::Aws.id().into(),
        raw_parameters: Some(parameters),
        raw_context: context(),
        platform_region: "cf-eu10".into(),
        platform_provider: Some(CloudProvider::Aws),
        async_allowed: true,
    }
}

pub fn aws_parameters() -> Value {
    json!({ "name": "my-cluster", "region": "eu-central-1" })
}

pub fn update_request(instance_id: &str, parameters: Option<Value>, context: Option<Value>) -> UpdateRequest {
    UpdateRequest {
        instance_id: instance_id.into(),
        service_id: KYMA_SERVICE_ID.into(),
        plan_id: String::new(),
        raw_parameters: parameters,
        raw_context: context,
        async_allowed: true,
    }
}
