use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::models::{ChannelRecord, Release};
use crate::rollout::ClientIdentity;
use crate::subscription::{RefreshStatus, Subscription};
use crate::views::{Collection, ResourceView};

use super::Registry;

// ============================================================
// Error Handling
// ============================================================

/// Map a read-path error to a response. Only not-found errors are expected
/// here; anything else is logged and hidden behind a generic 500.
fn error_response(e: ChannelError) -> (StatusCode, String) {
    if e.is_not_found() {
        return (StatusCode::NOT_FOUND, e.to_string());
    }

    tracing::error!("Internal error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

// ============================================================
// Health
// ============================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when some subscription's last refresh failed.
    pub status: String,
    pub subscriptions: Vec<SubscriptionHealth>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionHealth {
    pub key: String,
    pub phase: String,
    pub revision: u64,
    pub snapshot_age_seconds: i64,
    pub last_success: Option<String>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

impl SubscriptionHealth {
    fn new(status: RefreshStatus, subscription: &Subscription) -> Self {
        let age = Utc::now() - subscription.current().built_at();
        Self {
            key: status.key,
            phase: status.phase.as_str().to_string(),
            revision: status.revision,
            snapshot_age_seconds: age.num_seconds().max(0),
            last_success: status.last_success.map(|t| t.to_rfc3339()),
            last_error: status.last_error,
            consecutive_failures: status.consecutive_failures,
        }
    }
}

pub async fn health(State(registry): State<Registry>) -> Json<HealthResponse> {
    let subscriptions: Vec<SubscriptionHealth> = registry
        .iter()
        .map(|sub| SubscriptionHealth::new(sub.status(), sub))
        .collect();

    let degraded = subscriptions.iter().any(|s| s.consecutive_failures > 0);
    Json(HealthResponse {
        status: if degraded { "degraded" } else { "ok" }.to_string(),
        subscriptions,
    })
}

// ============================================================
// API Root
// ============================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiRoot {
    #[serde(rename = "type")]
    pub kind: String,
    pub server_version: String,
    pub revision: u64,
    pub links: BTreeMap<String, String>,
}

pub async fn api_root(State(sub): State<Arc<Subscription>>) -> Json<ApiRoot> {
    let snapshot = sub.current();
    let base = format!("/{}", sub.key());

    let mut links = BTreeMap::new();
    links.insert("self".to_string(), base.clone());
    links.insert("channels".to_string(), format!("{base}/channels"));
    links.insert("releases".to_string(), format!("{base}/releases"));

    Json(ApiRoot {
        kind: "apiRoot".to_string(),
        server_version: snapshot.server_version().to_string(),
        revision: snapshot.revision(),
        links,
    })
}

// ============================================================
// Channels
// ============================================================

pub async fn list_channels(
    State(sub): State<Arc<Subscription>>,
    identity: ClientIdentity,
) -> Json<Collection<ChannelRecord>> {
    Json(sub.channels().collection(&identity))
}

pub async fn get_channel(
    State(sub): State<Arc<Subscription>>,
    Path(name): Path<String>,
    identity: ClientIdentity,
) -> Result<Json<ChannelRecord>, (StatusCode, String)> {
    sub.channels()
        .get(&name, &identity)
        .map(Json)
        .map_err(error_response)
}

// ============================================================
// Releases
// ============================================================

pub async fn list_releases(
    State(sub): State<Arc<Subscription>>,
    identity: ClientIdentity,
) -> Json<Collection<Release>> {
    Json(sub.releases().collection(&identity))
}

pub async fn get_release(
    State(sub): State<Arc<Subscription>>,
    Path(version): Path<String>,
    identity: ClientIdentity,
) -> Result<Json<Release>, (StatusCode, String)> {
    sub.releases()
        .get(&version, &identity)
        .map(Json)
        .map_err(error_response)
}
