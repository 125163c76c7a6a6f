//! kebd — wiring of the Kyma environment broker daemon.
//!
//! # Architecture
//!
//! ```text
//! broker.toml ─┐
//! providers.toml ─┼─> bootstrap::load ─> Broker ─> keb_api::build_router
//! plans.toml ─┘                          │
//!                                        └─ ChannelQueue ─> worker::run
//! ```

pub mod bootstrap;
pub mod worker;

pub use bootstrap::{ConfigPaths, LoadedConfig, LoggingLabeler, StaticQuota, build_broker};
