//! Subaccount quota enforcement.

use async_trait::async_trait;
use keb_core::{BrokerError, BrokerResult, Plan};
use keb_state::{InstanceFilter, Instances};
use tracing::debug;

/// Source of assigned per-plan quotas.
#[async_trait]
pub trait QuotaClient: Send + Sync {
    async fn get_quota(&self, sub_account_id: &str, plan_name: &str) -> Result<i32, String>;
}

/// Fail when the subaccount already uses its whole quota for `plan`.
///
/// The quota source is only asked when the subaccount already has instances
/// of the plan, or when the check guards a plan upgrade. The instance being
/// admitted is left out of the count.
pub async fn check_quota(
    instances: &(impl Instances + ?Sized),
    client: &(impl QuotaClient + ?Sized),
    sub_account_id: &str,
    instance_id: &str,
    plan: Plan,
    update: bool,
) -> BrokerResult<()> {
    let filter = InstanceFilter {
        sub_account_ids: vec![sub_account_id.to_string()],
        plan_ids: vec![plan.id().to_string()],
        exclude_instance_ids: vec![instance_id.to_string()],
        ..Default::default()
    };
    let used = instances
        .list_instances(&filter)
        .map_err(|e| {
            BrokerError::internal(
                format!(
                    "while listing instances for subaccount {sub_account_id} and plan ID {}",
                    plan.id()
                ),
                e,
            )
        })?
        .len();

    if used == 0 && !update {
        return Ok(());
    }
    let assigned = client.get_quota(sub_account_id, plan.name()).await.map_err(|e| {
        BrokerError::bad_request(format!("Failed to get assigned quota for plan {}: {e}.", plan.name()))
    })?;
    debug!(sub_account = sub_account_id, plan = plan.name(), used, assigned, "quota checked");
    if used as i64 >= i64::from(assigned) {
        return Err(BrokerError::bad_request(format!(
            "Kyma instances quota exceeded for plan {}. assignedQuota: {assigned}, remainingQuota: 0. \
             Contact your administrator.",
            plan.name()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keb_core::{CloudProvider, ErsContext, KYMA_SERVICE_ID, ProvisioningParameters};
    use keb_state::{Instance, StateStore};

    struct FixedQuota(Result<i32, String>);

    #[async_trait]
    impl QuotaClient for FixedQuota {
        async fn get_quota(&self, _: &str, _: &str) -> Result<i32, String> {
            self.0.clone()
        }
    }

    fn insert(store: &StateStore, id: &str, plan: Plan) {
        let params = ProvisioningParameters {
            plan_id: plan.id().into(),
            service_id: KYMA_SERVICE_ID.into(),
            ers_context: ErsContext {
                global_account_id: "ga-1".into(),
                sub_account_id: "sa-1".into(),
                user_id: "u".into(),
                ..Default::default()
            },
            parameters: Default::default(),
            platform_region: "cf-eu10".into(),
            platform_provider: None,
        };
        store
            .insert_instance(&Instance::new(id, params, plan.name(), CloudProvider::Aws, ""))
            .unwrap();
    }

    #[tokio::test]
    async fn first_instance_skips_quota_source() {
        let store = StateStore::open_in_memory().unwrap();
        let client = FixedQuota(Err("unreachable".into()));
        assert!(check_quota(&store, &client, "sa-1", "new", Plan::Aws, false).await.is_ok());
    }

    #[tokio::test]
    async fn exhausted_quota_names_plan_and_numbers() {
        let store = StateStore::open_in_memory().unwrap();
        insert(&store, "i-1", Plan::Aws);
        insert(&store, "i-2", Plan::Aws);
        insert(&store, "i-3", Plan::Azure);

        let err = check_quota(&store, &FixedQuota(Ok(2)), "sa-1", "new", Plan::Aws, false)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(
            err.message(),
            "Kyma instances quota exceeded for plan aws. assignedQuota: 2, remainingQuota: 0. Contact your administrator."
        );
        assert!(check_quota(&store, &FixedQuota(Ok(3)), "sa-1", "new", Plan::Aws, false).await.is_ok());
    }

    #[tokio::test]
    async fn admitted_instance_is_not_counted() {
        let store = StateStore::open_in_memory().unwrap();
        insert(&store, "i-1", Plan::Aws);

        assert!(check_quota(&store, &FixedQuota(Ok(1)), "sa-1", "i-1", Plan::Aws, false).await.is_ok());
        assert!(check_quota(&store, &FixedQuota(Ok(1)), "sa-1", "i-2", Plan::Aws, false).await.is_err());
    }

    #[tokio::test]
    async fn upgrade_always_consults_quota_source() {
        let store = StateStore::open_in_memory().unwrap();
        let err = check_quota(&store, &FixedQuota(Err("quota service down".into())), "sa-1", "new", Plan::Aws, true)
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Failed to get assigned quota for plan aws: quota service down.");

        let err = check_quota(&store, &FixedQuota(Ok(0)), "sa-1", "new", Plan::Aws, true)
            .await
            .unwrap_err();
        assert!(err.message().contains("assignedQuota: 0"));
    }
}
