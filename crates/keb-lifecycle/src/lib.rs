//! keb-lifecycle — instance lifecycle orchestration for the Kyma environment
//! broker.
//!
//! Each request is admitted, persisted as an operation and handed to the
//! queue; the queue's workers run outside this crate.
//!
//! # Architecture
//!
//! ```text
//! Broker (façade)
//!   ├── CatalogService       → SchemaService
//!   ├── ProvisionService     → AdmissionPipeline, Store, Queue
//!   ├── UpdateService        → AdmissionPipeline, Store, Queue, Labeler
//!   │     └── SuspensionHandler (active flag → suspend / resume)
//!   ├── DeprovisionService   → Store, Queue
//!   └── LastOperationService → Store
//! ```
//!
//! Every service implements one capability trait. [`ServiceBroker`] is the
//! union of them and is implemented by [`Broker`] through delegation.

pub mod broker;
pub mod collaborators;
pub mod deprovision;
pub mod labels;
pub mod last_operation;
pub mod provision;
pub mod queue;
pub mod response;
pub mod suspension;
pub mod update;

#[cfg(test)]
mod testing;

pub use broker::{Broker, CatalogProvider, CatalogService, ServiceBroker};
pub use collaborators::Collaborators;
pub use deprovision::{DeprovisionService, Deprovisioner};
pub use labels::{ResponseLabels, dashboard_url};
pub use last_operation::{LastOperationReader, LastOperationService};
pub use provision::{ProvisionService, Provisioner};
pub use queue::{ApiServerUrls, ChannelQueue, Labeler, Queue, QueueError};
pub use response::{DeprovisionResponse, LastOperationResponse, ProvisionResponse, UpdateResponse};
pub use update::{UpdateService, Updater};
