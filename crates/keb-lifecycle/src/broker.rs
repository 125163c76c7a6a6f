//! The broker façade: one implementation per capability, delegated to.

use std::sync::Arc;

use async_trait::async_trait;
use keb_admission::{AdmissionPipeline, Catalog, ProvisionRequest, UpdateRequest};
use keb_core::{BrokerResult, CloudProvider};

use crate::collaborators::Collaborators;
use crate::deprovision::{DeprovisionService, Deprovisioner};
use crate::last_operation::{LastOperationReader, LastOperationService};
use crate::provision::{ProvisionService, Provisioner};
use crate::response::{DeprovisionResponse, LastOperationResponse, ProvisionResponse, UpdateResponse};
use crate::update::{UpdateService, Updater};

pub trait CatalogProvider: Send + Sync {
    fn catalog(&self, platform_region: &str, platform_provider: CloudProvider) -> Catalog;
}

/// Serves the catalog from the admission pipeline's schema service.
pub struct CatalogService {
    pipeline: Arc<AdmissionPipeline>,
}

impl CatalogService {
    pub fn new(pipeline: Arc<AdmissionPipeline>) -> Self {
        Self { pipeline }
    }
}

impl CatalogProvider for CatalogService {
    fn catalog(&self, platform_region: &str, platform_provider: CloudProvider) -> Catalog {
        self.pipeline
            .schemas()
            .catalog(self.pipeline.registry(), platform_region, platform_provider)
    }
}

/// Everything a service broker answers.
pub trait ServiceBroker: CatalogProvider + Provisioner + Updater + Deprovisioner + LastOperationReader {}

impl<T> ServiceBroker for T where T: CatalogProvider + Provisioner + Updater + Deprovisioner + LastOperationReader {}

/// Holds one implementation of each capability.
#[derive(Clone)]
pub struct Broker {
    catalog: Arc<dyn CatalogProvider>,
    provisioner: Arc<dyn Provisioner>,
    updater: Arc<dyn Updater>,
    deprovisioner: Arc<dyn Deprovisioner>,
    last_operation: Arc<dyn LastOperationReader>,
}

impl Broker {
    pub fn new(deps: Collaborators) -> Self {
        Self {
            catalog: Arc::new(CatalogService::new(deps.pipeline.clone())),
            last_operation: Arc::new(LastOperationService::new(deps.store.clone())),
            provisioner: Arc::new(ProvisionService::new(deps.clone())),
            updater: Arc::new(UpdateService::new(deps.clone())),
            deprovisioner: Arc::new(DeprovisionService::new(deps)),
        }
    }

    pub fn with_provisioner(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.provisioner = provisioner;
        self
    }

    pub fn with_updater(mut self, updater: Arc<dyn Updater>) -> Self {
        self.updater = updater;
        self
    }

    pub fn with_deprovisioner(mut self, deprovisioner: Arc<dyn Deprovisioner>) -> Self {
        self.deprovisioner = deprovisioner;
        self
    }
}

impl CatalogProvider for Broker {
    fn catalog(&self, platform_region: &str, platform_provider: CloudProvider) -> Catalog {
        self.catalog.catalog(platform_region, platform_provider)
    }
}

#[async_trait]
impl Provisioner for Broker {
    async fn provision(&self, request: ProvisionRequest) -> BrokerResult<ProvisionResponse> {
        self.provisioner.provision(request).await
    }
}

#[async_trait]
impl Updater for Broker {
    async fn update(&self, request: UpdateRequest) -> BrokerResult<UpdateResponse> {
        self.updater.update(request).await
    }
}

#[async_trait]
impl Deprovisioner for Broker {
    async fn deprovision(&self, instance_id: &str, async_allowed: bool) -> BrokerResult<DeprovisionResponse> {
        self.deprovisioner.deprovision(instance_id, async_allowed).await
    }
}

impl LastOperationReader for Broker {
    fn last_operation(&self, instance_id: &str, operation_id: Option<&str>) -> BrokerResult<LastOperationResponse> {
        self.last_operation.last_operation(instance_id, operation_id)
    }
}
