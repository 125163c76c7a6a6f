//! keb-api — REST API of the Kyma environment broker.
//!
//! A thin axum binding of [`ServiceBroker`]: handlers decode the request,
//! call the façade and map [`keb_core::BrokerError`] to its HTTP status.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/v2/catalog` | Service catalog with plan schemas |
//! | PUT | `/v2/service_instances/{instance_id}` | Provision an instance |
//! | PATCH | `/v2/service_instances/{instance_id}` | Update an instance |
//! | DELETE | `/v2/service_instances/{instance_id}` | Deprovision an instance |
//! | GET | `/v2/service_instances/{instance_id}/last_operation` | Operation state |
//!
//! Every route is also mounted under `/oauth/{region}`; the path region is
//! the platform region of the request. Without it the
//! `X-Broker-API-Platform-Region` header is used. The platform provider comes
//! from `X-Broker-API-Platform-Provider`.

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use keb_lifecycle::ServiceBroker;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub broker: Arc<dyn ServiceBroker>,
}

fn broker_routes() -> Router<ApiState> {
    Router::new()
        .route("/v2/catalog", get(handlers::catalog))
        .route(
            "/v2/service_instances/{instance_id}",
            axum::routing::put(handlers::provision)
                .patch(handlers::update)
                .delete(handlers::deprovision),
        )
        .route(
            "/v2/service_instances/{instance_id}/last_operation",
            get(handlers::last_operation),
        )
}

/// Build the complete API router.
pub fn build_router(broker: Arc<dyn ServiceBroker>) -> Router {
    let state = ApiState { broker };
    Router::new()
        .merge(broker_routes())
        .nest("/oauth/{region}", broker_routes())
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}
