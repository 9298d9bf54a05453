//! # Update Coordinator
//!
//! One coordinator per configured location owns the refresh timer, performs a
//! single fetch per tick and publishes the result to every subscribed sensor.
//!
//! ## State Machine
//!
//! ```text
//! Idle ──timer/manual──▶ Fetching ──ok──▶ Success ──▶ Idle
//!                            │
//!                            └──err──▶ Failed ──▶ Idle
//! ```
//!
//! - The timer is re-armed only after a fetch finishes, so two fetches for the
//!   same location can never overlap. [`Coordinator::refresh`] takes
//!   `&mut self`, which makes that hold at compile time as well.
//! - **Success** replaces the cached projection wholesale. Readers hold an
//!   `Arc` snapshot, so they never see a half-updated result.
//! - **Failed** keeps the previous projection and records the error. Sensors
//!   show the last good value marked stale, or nothing if no fetch has
//!   succeeded yet. Errors are logged and never leave the coordinator.
//!
//! ## Fan-out
//!
//! State is shared through a `tokio::sync::watch` channel. Every subscriber
//! sees the same snapshot after each tick; none of them depends on another
//! having been updated first.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::{unique_variables, ProjectionSource, DEFAULT_VARIABLE};
use crate::{Location, Projection};

/// Fixed polling period (10 minutes)
pub const UPDATE_INTERVAL: Duration = Duration::from_secs(600);

/// Where a coordinator is in its refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Success,
    Failed,
}

/// The shared state every sensor of a location reads from.
#[derive(Debug, Clone, Default)]
pub struct CachedResult {
    /// Latest successful projection; survives failed ticks
    pub projection: Option<Arc<Projection>>,
    /// When `projection` was fetched
    pub last_update: Option<DateTime<Utc>>,
    /// When the most recent tick finished, successful or not
    pub last_attempt: Option<DateTime<Utc>>,
    /// Error of the most recent tick, cleared on success
    pub last_error: Option<String>,
    pub last_update_success: bool,
}

impl CachedResult {
    /// True when the last tick failed but an older projection is still served.
    pub fn is_stale(&self) -> bool {
        self.projection.is_some() && !self.last_update_success
    }
}

/// Variables to request: the given ones in order, without duplicates, and
/// always including temperature.
pub fn enabled_variables(variables: &[String]) -> Vec<String> {
    let mut enabled = unique_variables(variables);
    if !enabled.iter().any(|v| v == DEFAULT_VARIABLE) {
        enabled.push(DEFAULT_VARIABLE.to_string());
    }
    enabled
}

/// Polls one location and publishes the result to its subscribers.
pub struct Coordinator<S> {
    name: String,
    source: S,
    location: Location,
    variables: Vec<String>,
    phase: Phase,
    state: watch::Sender<Arc<CachedResult>>,
}

impl<S: ProjectionSource> Coordinator<S> {
    /// Create a coordinator with an empty cache. Nothing is fetched until
    /// [`refresh`](Self::refresh) or [`spawn`](Self::spawn) is called.
    pub fn new(name: impl Into<String>, source: S, location: Location, variables: &[String]) -> Self {
        let (state, _) = watch::channel(Arc::new(CachedResult::default()));
        Self {
            name: name.into(),
            source,
            location,
            variables: enabled_variables(variables),
            phase: Phase::Idle,
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Variables requested on every tick.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Register a listener. The receiver always holds the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<CachedResult>> {
        self.state.subscribe()
    }

    /// Current snapshot of the shared state.
    pub fn snapshot(&self) -> Arc<CachedResult> {
        self.state.borrow().clone()
    }

    /// Run one tick: fetch once, update the cache, notify subscribers.
    ///
    /// Returns [`Phase::Success`] or [`Phase::Failed`]. Fetch errors are logged
    /// here and never returned.
    pub async fn refresh(&mut self) -> Phase {
        self.phase = Phase::Fetching;
        debug!(station = %self.name, variables = ?self.variables, "Refreshing");

        let outcome = self
            .source
            .fetch_projection(&self.location, &self.variables)
            .await;

        let now = Utc::now();
        let previous = self.snapshot();
        let (next, phase) = match outcome {
            Ok(projection) => {
                info!(
                    station = %self.name,
                    variables = projection.variables.len(),
                    "Projection updated"
                );
                let next = CachedResult {
                    projection: Some(Arc::new(projection)),
                    last_update: Some(now),
                    last_attempt: Some(now),
                    last_error: None,
                    last_update_success: true,
                };
                (next, Phase::Success)
            }
            Err(err) => {
                if previous.projection.is_some() {
                    warn!(station = %self.name, error = %err, "Refresh failed, keeping last good data");
                } else {
                    error!(station = %self.name, error = %err, "Refresh failed, no data available yet");
                }
                let next = CachedResult {
                    projection: previous.projection.clone(),
                    last_update: previous.last_update,
                    last_attempt: Some(now),
                    last_error: Some(err.to_string()),
                    last_update_success: false,
                };
                (next, Phase::Failed)
            }
        };

        self.state.send_replace(Arc::new(next));
        self.phase = phase;
        phase
    }

    /// Poll until `stop` flips to true or its sender is dropped.
    ///
    /// Refreshes immediately, then sleeps [`UPDATE_INTERVAL`] after each
    /// finished fetch. A message on `refresh_requests` cuts the sleep short.
    /// Stopping while a fetch is in flight drops the fetch and publishes
    /// nothing.
    pub async fn run(
        mut self,
        mut stop: watch::Receiver<bool>,
        mut refresh_requests: mpsc::Receiver<()>,
    ) {
        info!(station = %self.name, "Coordinator started");
        loop {
            tokio::select! {
                _ = self.refresh() => {}
                _ = stopped(&mut stop) => break,
            }

            self.phase = Phase::Idle;
            tokio::select! {
                _ = tokio::time::sleep(UPDATE_INTERVAL) => {}
                Some(()) = refresh_requests.recv() => {
                    debug!(station = %self.name, "Manual refresh requested");
                }
                _ = stopped(&mut stop) => break,
            }
        }
        info!(station = %self.name, "Coordinator stopped");
    }

    /// Run the polling loop on a tokio task.
    ///
    /// Must be called from within a tokio runtime. Dropping the returned
    /// handle stops the loop as well.
    pub fn spawn(self) -> CoordinatorHandle
    where
        S: 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let state = self.subscribe();
        let name = self.name.clone();
        let task = tokio::spawn(self.run(stop_rx, refresh_rx));

        CoordinatorHandle {
            name,
            stop_tx,
            refresh_tx,
            state,
            task,
        }
    }
}

/// Resolves once `stop` is true or its sender is gone.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

/// Control handle for a spawned coordinator.
#[derive(Debug)]
pub struct CoordinatorHandle {
    name: String,
    stop_tx: watch::Sender<bool>,
    refresh_tx: mpsc::Sender<()>,
    state: watch::Receiver<Arc<CachedResult>>,
    task: JoinHandle<()>,
}

impl CoordinatorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<CachedResult>> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> Arc<CachedResult> {
        self.state.borrow().clone()
    }

    /// Ask for a refresh before the timer fires.
    ///
    /// Requests coalesce: returns false if one is already pending. A request
    /// made during a fetch runs after that fetch completes.
    pub fn request_refresh(&self) -> bool {
        self.refresh_tx.try_send(()).is_ok()
    }

    /// Stop the loop and wait for it to exit. An in-flight fetch is abandoned.
    pub async fn shutdown(self) {
        self.stop_tx.send_replace(true);
        if let Err(err) = self.task.await {
            error!(station = %self.name, error = %err, "Coordinator task ended abnormally");
        }
    }
}
