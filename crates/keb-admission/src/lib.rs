//! keb-admission — request admission for the Kyma environment broker.
//!
//! Everything between a raw broker request and a validated parameter set:
//!
//! - Structural JSON-Schema validation against the plan's schema
//! - Provider defaults per plan (region, zones, machine type, autoscaler)
//! - Region × machine-type compatibility and zone availability
//! - Networking, autoscaler, OIDC, worker pool and kubeconfig rules
//! - Trial/free cardinality and subaccount quota
//! - The OSB catalog with its generated plan schemas
//!
//! # Architecture
//!
//! ```text
//! AdmissionPipeline
//!   ├── SchemaService (catalog + per-plan schemas)
//!   ├── MachineMatrix (region × machine family, static zones)
//!   ├── Store (cardinality and quota counts)
//!   ├── QuotaClient (assigned quota per subaccount)
//!   └── ZonesDiscovery (optional live zone counts)
//! ```

pub mod cardinality;
pub mod catalog;
pub mod gpu;
pub mod kubeconfig;
pub mod matrix;
pub mod networking;
pub mod pipeline;
pub mod quota;
pub mod retry;
pub mod structural;
pub mod values;
pub mod zones;

pub use catalog::{Catalog, SchemaService, ServicePlan};
pub use matrix::MachineMatrix;
pub use pipeline::{AdmissionPipeline, Admitted, ProvisionRequest, UpdateAdmission, UpdateRequest};
pub use quota::QuotaClient;
pub use retry::{Backoff, retry};
pub use values::ProviderValues;
pub use zones::{FAILED_TO_VALIDATE_ZONES, ZonesDiscovery};
