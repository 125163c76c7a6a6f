//! keb-core — shared types for the Kyma environment broker.
//!
//! # Modules
//!
//! - **`plans`** — plan IDs/names, cloud providers, the immutable `PlanRegistry`
//! - **`params`** — request DTOs and normalized `ProvisioningParameters`
//! - **`oidc`** — the single-object / list OIDC union
//! - **`context`** — ERS context (account identity, license)
//! - **`config`** — `broker.toml` parsing
//! - **`provider_spec`** / **`plan_spec`** — provider and plan tables
//! - **`error`** — `BrokerError` taxonomy and the `Issues` accumulator

pub mod config;
pub mod context;
pub mod error;
pub mod oidc;
pub mod params;
pub mod plan_spec;
pub mod plans;
pub mod provider_spec;

pub use config::{BrokerConfig, ConfigError};
pub use context::ErsContext;
pub use error::{BrokerError, BrokerResult, Issues, RuleGroup, ValidationIssue};
pub use oidc::{OidcConfig, OidcConnect};
pub use params::*;
pub use plan_spec::PlanSpecifications;
pub use plans::{CloudProvider, EnablePlans, KYMA_SERVICE_ID, KYMA_SERVICE_NAME, Plan, PlanRegistry};
pub use provider_spec::{FamilyRegion, MachineFamily, ProviderSpec};
