//! One trial / one free instance per global account.

use keb_core::{BrokerError, BrokerResult, Plan};
use keb_state::{InstanceFilter, Instances, InstancesArchived, OperationState};
use tracing::info;

pub const TRIAL_ALREADY_EXISTS: &str = "trial Kyma was created for the global account, but there is only one allowed";
pub const FREE_QUOTA_USED: &str =
    "provisioning request rejected, you have already used the available free service plan quota in this global account";

/// Reject a second trial instance in the global account. `instance_id` is
/// the instance being provisioned and never counts against itself.
pub fn check_single_trial(
    instances: &(impl Instances + ?Sized),
    global_account_id: &str,
    instance_id: &str,
) -> BrokerResult<()> {
    let filter = InstanceFilter {
        global_account_ids: vec![global_account_id.to_string()],
        exclude_instance_ids: vec![instance_id.to_string()],
        ..Default::default()
    };
    let count = instances
        .list_instances(&filter)
        .map_err(|e| {
            BrokerError::internal(
                "while checking if a trial Kyma instance exists for given global account",
                e,
            )
        })?
        .len();
    if count > 0 {
        info!(global_account = global_account_id, "trial provisioning rejected, instance already exists");
        return Err(BrokerError::bad_request(TRIAL_ALREADY_EXISTS));
    }
    Ok(())
}

/// Reject a free instance when the global account has a live succeeded one
/// or an archived one whose provisioning succeeded. Live instances are read
/// first; the archive is only read when none is found.
pub fn check_single_free(
    instances: &(impl Instances + ?Sized),
    archived: &(impl InstancesArchived + ?Sized),
    global_account_id: &str,
    instance_id: &str,
) -> BrokerResult<()> {
    let lookup_failed =
        |e: keb_state::StateError| BrokerError::internal("while checking if a free Kyma instance existed for given global account", e);

    let filter = InstanceFilter {
        global_account_ids: vec![global_account_id.to_string()],
        sub_account_ids: vec![],
        plan_ids: vec![Plan::Free.id().to_string()],
        states: vec![OperationState::Succeeded],
        exclude_instance_ids: vec![instance_id.to_string()],
    };
    let live = instances.list_instances(&filter).map_err(lookup_failed)?.len();
    if live > 0 {
        info!(global_account = global_account_id, "free provisioning rejected, instance exists");
        return Err(BrokerError::bad_request(FREE_QUOTA_USED));
    }

    let archived = archived
        .count_archived_for_global_account(global_account_id, Plan::Free.id())
        .map_err(lookup_failed)?;
    if archived > 0 {
        info!(global_account = global_account_id, "free provisioning rejected, archived instance exists");
        return Err(BrokerError::bad_request(FREE_QUOTA_USED));
    }
    Ok(())
}
