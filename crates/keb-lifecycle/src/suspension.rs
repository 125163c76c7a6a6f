//! Suspend and resume driven by the `active` flag of the update context.
//!
//! Suspending creates a temporary deprovisioning operation; resuming creates
//! a fresh provisioning operation that reuses the shoot of the previous one.

use keb_core::{BrokerResult, ErsContext};
use keb_state::{Instance, Operation, Operations};
use tracing::info;

use crate::collaborators::{Collaborators, storage};

/// Whether the instance is currently running: it never saw a deprovisioning
/// or it was provisioned again after the last one.
pub fn is_active(provisioning: &Operation, deprovisioning: Option<&Operation>) -> bool {
    deprovisioning.is_none_or(|d| d.stored_before(provisioning))
}

pub(crate) struct SuspensionHandler<'a> {
    deps: &'a Collaborators,
}

impl<'a> SuspensionHandler<'a> {
    pub(crate) fn new(deps: &'a Collaborators) -> Self {
        Self { deps }
    }

    /// Start a suspension or a resume when the requested flag differs from
    /// the current state. Returns the queued operation, if any.
    pub(crate) fn handle(
        &self,
        instance: &Instance,
        provisioning: &Operation,
        currently_active: bool,
        requested: &ErsContext,
    ) -> BrokerResult<Option<Operation>> {
        let operation = match (currently_active, requested.active) {
            (true, Some(false)) => {
                info!(instance = %instance.instance_id, "suspending instance");
                Operation::new_deprovisioning(&instance.instance_id, instance.parameters.clone(), true)
            }
            (false, Some(true)) => {
                info!(instance = %instance.instance_id, "resuming instance");
                let mut op = Operation::new_provisioning(&instance.instance_id, instance.parameters.clone());
                op.shoot_name = provisioning.shoot_name.clone();
                op.shoot_domain = provisioning.shoot_domain.clone();
                op.dashboard_url = instance.dashboard_url.clone();
                op
            }
            _ => return Ok(None),
        };
        let operation = self
            .deps
            .store
            .insert_operation(&operation)
            .map_err(storage("unable to process the update"))?;
        self.deps.enqueue(&operation)?;
        Ok(Some(operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keb_core::ProvisioningParameters;
    use keb_state::{OperationKind, Operations};

    use crate::testing::fixture;

    fn stored(fx: &crate::testing::Fixture, op: Operation) -> Operation {
        fx.store.insert_operation(&op).unwrap()
    }

    #[test]
    fn active_flag_follows_operation_order() {
        let fx = fixture();
        let params = ProvisioningParameters::default();
        let first = stored(&fx, Operation::new_provisioning("i", params.clone()));
        assert!(is_active(&first, None));

        let suspend = stored(&fx, Operation::new_deprovisioning("i", params.clone(), true));
        assert!(!is_active(&first, Some(&suspend)));

        let resumed = stored(&fx, Operation::new_provisioning("i", params));
        assert!(is_active(&resumed, Some(&suspend)));
    }

    #[test]
    fn suspend_and_resume_queue_operations() {
        let mut fx = fixture();
        let instance = Instance::new(
            "i",
            ProvisioningParameters::default(),
            "aws",
            keb_core::CloudProvider::Aws,
            "https://dash",
        );
        let mut provisioning = Operation::new_provisioning("i", ProvisioningParameters::default());
        provisioning.shoot_name = "c-abc1234".into();
        let handler = SuspensionHandler::new(&fx.deps);

        let inactive = ErsContext {
            active: Some(false),
            ..Default::default()
        };
        let op = handler.handle(&instance, &provisioning, true, &inactive).unwrap().unwrap();
        assert_eq!(op.kind, OperationKind::Deprovision);
        assert!(op.temporary);

        let active = ErsContext {
            active: Some(true),
            ..Default::default()
        };
        let op = handler.handle(&instance, &provisioning, false, &active).unwrap().unwrap();
        assert_eq!(op.kind, OperationKind::Provision);
        assert_eq!(op.shoot_name, "c-abc1234");
        assert_eq!(op.dashboard_url, "https://dash");

        assert!(handler.handle(&instance, &provisioning, true, &active).unwrap().is_none());
        assert!(handler.handle(&instance, &provisioning, true, &ErsContext::default()).unwrap().is_none());
        assert_eq!(fx.drain().len(), 2);
    }
}
