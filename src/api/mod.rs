mod handlers;
mod identity;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::subscription::Subscription;

pub use handlers::{ApiRoot, HealthResponse, SubscriptionHealth};
pub use identity::{identity_from_headers, CLIENT_ID_HEADER};

/// All subscriptions served by one process, in configuration order.
pub type Registry = Arc<[Arc<Subscription>]>;

/// Build the read-only router. Every subscription key gets its own path
/// namespace (`/{key}/channels`, `/{key}/releases`, ...) backed by its own
/// snapshot; nothing is shared between namespaces.
pub fn create_router(subscriptions: Vec<Arc<Subscription>>) -> Router {
    let registry: Registry = subscriptions.into();

    let mut app = Router::new()
        .route("/health", get(handlers::health))
        .with_state(Arc::clone(&registry));

    for sub in registry.iter() {
        let namespace = Router::new()
            .route("/", get(handlers::api_root))
            .route("/channels", get(handlers::list_channels))
            .route("/channels/{name}", get(handlers::get_channel))
            .route("/releases", get(handlers::list_releases))
            .route("/releases/{version}", get(handlers::get_release))
            .with_state(Arc::clone(sub));

        app = app.nest(&format!("/{}", sub.key()), namespace);
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
