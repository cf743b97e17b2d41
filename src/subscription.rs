//! Per-key snapshot ownership and the background refresh loop.
//!
//! Each [`Subscription`] owns exactly one snapshot slot. The refresh loop is
//! the only writer and publishes with a single atomic pointer swap; readers
//! load whichever snapshot is current without taking a lock, and keep it alive
//! for as long as they hold the `Arc`.
//!
//! ```text
//! Idle ──tick──▶ Fetching ──▶ Published ──▶ Idle
//!                         └─▶ Failed ─────▶ Idle   (previous snapshot stays current)
//! ```

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::SubscriptionConfig;
use crate::error::{ChannelError, Result};
use crate::snapshot::{Snapshot, SnapshotBuilder};
use crate::source::SourceFetcher;
use crate::views::{ChannelView, ReleaseView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPhase {
    Idle,
    Fetching,
}

impl RefreshPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
        }
    }
}

/// Outcome bookkeeping for the refresh loop.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    pub key: String,
    pub phase: RefreshPhase,
    /// Revision of the snapshot currently served.
    pub revision: u64,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

pub struct Subscription {
    config: SubscriptionConfig,
    fetcher: Arc<dyn SourceFetcher>,
    current: ArcSwap<Snapshot>,
    status: Mutex<RefreshStatus>,
    // Held for the duration of a cycle so cycles never overlap.
    cycle: tokio::sync::Mutex<()>,
}

impl Subscription {
    /// Run the first refresh cycle and create the subscription from its result.
    ///
    /// There is no earlier snapshot to fall back to, so a failure here is
    /// returned to the caller and should abort startup.
    pub async fn initialize(
        config: SubscriptionConfig,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> Result<Arc<Self>> {
        let snapshot = run_cycle(&config, fetcher.as_ref(), 1).await?;
        info!(
            key = %config.key,
            channels = snapshot.channel_count(),
            releases = snapshot.release_count(),
            sources = snapshot.source_count(),
            "initial snapshot published"
        );

        let status = RefreshStatus {
            key: config.key.clone(),
            phase: RefreshPhase::Idle,
            revision: snapshot.revision(),
            last_attempt: Some(snapshot.built_at()),
            last_success: Some(snapshot.built_at()),
            last_error: None,
            consecutive_failures: 0,
        };

        Ok(Arc::new(Self {
            config,
            fetcher,
            current: ArcSwap::from_pointee(snapshot),
            status: Mutex::new(status),
            cycle: tokio::sync::Mutex::new(()),
        }))
    }

    pub fn key(&self) -> &str {
        &self.config.key
    }

    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    /// The snapshot current at the time of the call.
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn channels(&self) -> ChannelView {
        ChannelView::new(self.current())
    }

    pub fn releases(&self) -> ReleaseView {
        ReleaseView::new(self.current())
    }

    pub fn status(&self) -> RefreshStatus {
        self.status.lock().expect("status lock poisoned").clone()
    }

    /// Run one refresh cycle and publish its snapshot on success.
    ///
    /// On failure the current snapshot is left untouched. Concurrent calls
    /// queue up behind each other.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>> {
        let _cycle = self.cycle.lock().await;
        let revision = self.current.load().revision() + 1;
        self.update_status(|s| {
            s.phase = RefreshPhase::Fetching;
            s.last_attempt = Some(Utc::now());
        });
        let _idle = IdleOnDrop(&self.status);

        match run_cycle(&self.config, self.fetcher.as_ref(), revision).await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.current.store(Arc::clone(&snapshot));
                self.update_status(|s| {
                    s.phase = RefreshPhase::Idle;
                    s.revision = snapshot.revision();
                    s.last_success = Some(snapshot.built_at());
                    s.last_error = None;
                    s.consecutive_failures = 0;
                });
                info!(
                    key = %self.config.key,
                    revision = snapshot.revision(),
                    channels = snapshot.channel_count(),
                    releases = snapshot.release_count(),
                    sources = snapshot.source_count(),
                    "snapshot published"
                );
                Ok(snapshot)
            }
            Err(e) => {
                self.update_status(|s| {
                    s.phase = RefreshPhase::Idle;
                    s.last_error = Some(e.to_string());
                    s.consecutive_failures += 1;
                });
                error!(
                    key = %self.config.key,
                    error = %e,
                    "refresh failed, keeping previous snapshot"
                );
                Err(e)
            }
        }
    }

    /// Start the background refresh loop.
    ///
    /// The first tick fires one full interval after the call, since
    /// [`Subscription::initialize`] already ran the startup cycle. Ticks
    /// missed while a slow cycle is running are skipped, not queued.
    pub fn spawn(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let subscription = Arc::clone(self);
        tokio::spawn(async move { subscription.run(shutdown).await })
    }

    async fn run(&self, shutdown: CancellationToken) {
        let period = self.config.refresh_interval;
        let Some(start) = Instant::now().checked_add(period) else {
            error!(key = %self.config.key, ?period, "refresh interval out of range, not refreshing");
            return;
        };
        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Dropping an in-flight cycle abandons it before it can publish.
            tokio::select! {
                _ = shutdown.cancelled() => {
                    warn!(key = %self.config.key, "refresh cancelled mid-cycle");
                    break;
                }
                // Outcome is logged and recorded by `refresh`.
                _ = self.refresh() => {}
            }
        }

        info!(key = %self.config.key, "refresh loop stopped");
    }

    fn update_status(&self, f: impl FnOnce(&mut RefreshStatus)) {
        let mut status = self.status.lock().expect("status lock poisoned");
        f(&mut status);
    }
}

/// Returns the phase to `Idle` when a cycle ends, including when its future
/// is dropped mid-fetch.
struct IdleOnDrop<'a>(&'a Mutex<RefreshStatus>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        if let Ok(mut status) = self.0.lock() {
            status.phase = RefreshPhase::Idle;
        }
    }
}

/// Fetch every source concurrently and build a snapshot from whatever
/// decoded. Individual source failures are logged and dropped; the cycle only
/// fails when nothing decoded or the merged result does not validate.
async fn run_cycle(
    config: &SubscriptionConfig,
    fetcher: &dyn SourceFetcher,
    revision: u64,
) -> Result<Snapshot> {
    let fetches = config.urls.iter().map(|url| fetcher.fetch(url, &config.key));
    let results = join_all(fetches).await;

    let mut documents = Vec::with_capacity(results.len());
    let mut failed = 0;
    for (url, result) in config.urls.iter().zip(results) {
        match result {
            Ok(document) => documents.push(document),
            Err(e) => {
                failed += 1;
                warn!(key = %config.key, url = %url, error = %e, "source dropped from refresh");
            }
        }
    }

    if documents.is_empty() {
        return Err(ChannelError::NoUsableSources { failed });
    }

    SnapshotBuilder::new(&config.key, &config.server_version)
        .revision(revision)
        .build(documents)
}
