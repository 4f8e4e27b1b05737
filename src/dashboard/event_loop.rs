//! Dashboard Event Loop - single-task owner of the dashboard core
//!
//! Every gesture, query and fetch result is funnelled through one task, so
//! the Selection Store and Data Cache are only ever touched from one place:
//! - Commands arrive over an mpsc channel with oneshot replies
//! - Backend calls run as spawned tasks and report back as `FetchOutcome`s
//! - Anomaly-input changes are observed from a store subscription, either on
//!   the same turn or after the configured quiet period

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Dashboard, DashboardError, DashboardScene, DashboardStatus, FetchOutcome, FetchRequest};
use crate::backend::AnalyticsBackend;
use crate::config::{defaults, DashboardConfig};
use crate::recompute::RecomputePhase;
use crate::render::ProjectionGesture;
use crate::selection::{ChangeSet, Mutation, SelectionState};
use crate::types::TimeWindow;
use crate::window::BrushGesture;

// ============================================================================
// Commands
// ============================================================================

/// Result of a window command, with the state right after it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowOutcome {
    /// Window committed by this command, if any
    pub committed: Option<TimeWindow>,
    pub state: SelectionState,
}

/// Result of a projection gesture, with the state right after it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GestureOutcome {
    pub mutation: Option<Mutation>,
    pub state: SelectionState,
}

/// Requests accepted by the event loop.
#[derive(Debug)]
pub enum Command {
    State {
        reply: oneshot::Sender<SelectionState>,
    },
    Scene {
        reply: oneshot::Sender<Result<DashboardScene, DashboardError>>,
    },
    Status {
        reply: oneshot::Sender<DashboardStatus>,
    },
    Brush {
        gesture: Option<BrushGesture>,
        reply: oneshot::Sender<WindowOutcome>,
    },
    ResetWindow {
        reply: oneshot::Sender<WindowOutcome>,
    },
    ProjectionGesture {
        gesture: ProjectionGesture,
        reply: oneshot::Sender<Result<GestureOutcome, DashboardError>>,
    },
    Mutate {
        mutation: Mutation,
        reply: oneshot::Sender<Result<SelectionState, DashboardError>>,
    },
    ForceRecompute {
        reply: oneshot::Sender<RecomputePhase>,
    },
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable handle to a running dashboard.
#[derive(Clone, Debug)]
pub struct DashboardHandle {
    tx: mpsc::Sender<Command>,
}

impl DashboardHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, DashboardError> {
        let (reply, response_rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| DashboardError::LoopClosed)?;
        response_rx.await.map_err(|_| DashboardError::LoopClosed)
    }

    pub async fn state(&self) -> Result<SelectionState, DashboardError> {
        self.request(|reply| Command::State { reply }).await
    }

    pub async fn scene(&self) -> Result<DashboardScene, DashboardError> {
        self.request(|reply| Command::Scene { reply }).await?
    }

    pub async fn status(&self) -> Result<DashboardStatus, DashboardError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Commit a brush gesture; `None` clears the brush without changing the window.
    pub async fn brush(
        &self,
        gesture: Option<BrushGesture>,
    ) -> Result<WindowOutcome, DashboardError> {
        self.request(|reply| Command::Brush { gesture, reply }).await
    }

    pub async fn reset_window(&self) -> Result<WindowOutcome, DashboardError> {
        self.request(|reply| Command::ResetWindow { reply }).await
    }

    pub async fn projection_gesture(
        &self,
        gesture: ProjectionGesture,
    ) -> Result<GestureOutcome, DashboardError> {
        self.request(|reply| Command::ProjectionGesture { gesture, reply })
            .await?
    }

    /// Apply a widget mutation and return the resulting state.
    pub async fn mutate(&self, mutation: Mutation) -> Result<SelectionState, DashboardError> {
        self.request(|reply| Command::Mutate { mutation, reply })
            .await?
    }

    pub async fn force_recompute(&self) -> Result<RecomputePhase, DashboardError> {
        self.request(|reply| Command::ForceRecompute { reply }).await
    }
}

// ============================================================================
// Loop
// ============================================================================

/// Spawn the event loop and kick off the initial load.
///
/// The loop runs until `cancel` fires or every handle is dropped.
pub fn spawn_dashboard(
    config: DashboardConfig,
    backend: Arc<dyn AnalyticsBackend>,
    cancel: CancellationToken,
) -> (DashboardHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(defaults::COMMAND_CHANNEL_CAPACITY);
    let debounce = Duration::from_millis(config.anomaly.debounce_ms);

    let mut dashboard = Dashboard::new(config);
    let (changes_tx, changes_rx) = mpsc::unbounded_channel();
    dashboard.store_mut().subscribe(move |transition, _, _| {
        if transition.changes.affects_anomaly_inputs() {
            let _ = changes_tx.send(transition.changes);
        }
    });

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let event_loop = EventLoop {
        dashboard,
        backend,
        events_tx,
        changes_rx,
        debounce,
        deadline: None,
    };
    let handle = tokio::spawn(event_loop.run(rx, events_rx, cancel));
    (DashboardHandle { tx }, handle)
}

struct EventLoop {
    dashboard: Dashboard,
    backend: Arc<dyn AnalyticsBackend>,
    events_tx: mpsc::UnboundedSender<FetchOutcome>,
    changes_rx: mpsc::UnboundedReceiver<ChangeSet>,
    debounce: Duration,
    /// When the pending debounced observation fires
    deadline: Option<Instant>,
}

impl EventLoop {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<FetchOutcome>,
        cancel: CancellationToken,
    ) {
        info!(backend = self.backend.name(), "Dashboard event loop starting");
        let initial = self.dashboard.initial_requests();
        self.spawn_initial_load(initial);

        loop {
            let deadline = self.deadline;
            let debounce = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("Dashboard event loop cancelled");
                    break;
                }
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        info!("All dashboard handles dropped, shutting down");
                        break;
                    }
                },
                Some(outcome) = events.recv() => {
                    let follow_up = self.dashboard.apply(outcome);
                    self.dispatch_all(follow_up);
                    self.settle();
                }
                () = debounce => {
                    self.deadline = None;
                    self.observe();
                }
            }
        }

        info!("Dashboard event loop stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::State { reply } => {
                let _ = reply.send(self.dashboard.state().clone());
            }
            Command::Scene { reply } => {
                let _ = reply.send(self.dashboard.scene());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.dashboard.status());
            }
            Command::Brush { gesture, reply } => {
                let committed = self.dashboard.brush(gesture);
                self.settle();
                let _ = reply.send(self.window_outcome(committed));
            }
            Command::ResetWindow { reply } => {
                let committed = self.dashboard.reset_window();
                self.settle();
                let _ = reply.send(self.window_outcome(committed));
            }
            Command::ProjectionGesture { gesture, reply } => {
                let result = self
                    .dashboard
                    .projection_gesture(gesture)
                    .map(|mutation| GestureOutcome {
                        mutation,
                        state: self.dashboard.state().clone(),
                    });
                self.settle();
                let _ = reply.send(result);
            }
            Command::Mutate { mutation, reply } => {
                let result = self.dashboard.mutate(mutation).map(|requests| {
                    self.dispatch_all(requests);
                    self.dashboard.state().clone()
                });
                self.settle();
                let _ = reply.send(result);
            }
            Command::ForceRecompute { reply } => {
                // A pending debounced observation is folded into the forced one.
                self.drain_changes();
                self.deadline = None;
                if let Some(request) = self.dashboard.force_recompute() {
                    self.dispatch(request);
                }
                let _ = reply.send(self.dashboard.recompute().phase());
            }
        }
    }

    fn window_outcome(&self, committed: Option<TimeWindow>) -> WindowOutcome {
        WindowOutcome {
            committed,
            state: self.dashboard.state().clone(),
        }
    }

    /// True when any queued transition touched the anomaly inputs.
    fn drain_changes(&mut self) -> bool {
        let mut dirty = false;
        while let Ok(changes) = self.changes_rx.try_recv() {
            dirty |= changes.affects_anomaly_inputs();
        }
        dirty
    }

    /// Observe now, or (re)arm the quiet-period timer.
    ///
    /// While the timer runs, the request for the replaced inputs is already
    /// retired so its response cannot be committed.
    fn settle(&mut self) {
        if !self.drain_changes() {
            return;
        }
        if self.debounce.is_zero() {
            self.observe();
        } else {
            self.dashboard.supersede_anomaly_request();
            self.deadline = Some(Instant::now() + self.debounce);
        }
    }

    fn observe(&mut self) {
        if let Some(request) = self.dashboard.observe_anomaly_inputs() {
            self.dispatch(request);
        }
    }

    fn dispatch_all(&self, requests: Vec<FetchRequest>) {
        for request in requests {
            self.dispatch(request);
        }
    }

    fn dispatch(&self, request: FetchRequest) {
        debug!(?request, "Dispatching backend fetch");
        let backend = Arc::clone(&self.backend);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = fetch(backend, request).await;
            if tx.send(outcome).is_err() {
                debug!("Event loop gone, dropping fetch result");
            }
        });
    }

    /// The initial fetches run concurrently; each result is applied as it lands.
    fn spawn_initial_load(&self, requests: Vec<FetchRequest>) {
        let backend = Arc::clone(&self.backend);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let mut pending: FuturesUnordered<_> = requests
                .into_iter()
                .map(|request| fetch(Arc::clone(&backend), request))
                .collect();
            while let Some(outcome) = pending.next().await {
                if tx.send(outcome).is_err() {
                    warn!("Event loop gone during initial load");
                    break;
                }
            }
        });
    }
}

/// Run one backend call.
async fn fetch(backend: Arc<dyn AnalyticsBackend>, request: FetchRequest) -> FetchOutcome {
    match request {
        FetchRequest::Metrics => FetchOutcome::Metrics(backend.fetch_metrics().await),
        FetchRequest::Projection => FetchOutcome::Projection(backend.fetch_projection().await),
        FetchRequest::Nodes(dimensions) => {
            FetchOutcome::Nodes(backend.fetch_node_data(&dimensions).await)
        }
        FetchRequest::NodeColumn(dimension) => {
            let result = backend
                .fetch_node_data(std::slice::from_ref(&dimension))
                .await;
            FetchOutcome::NodeColumn { dimension, result }
        }
        FetchRequest::Anomaly(request) => FetchOutcome::Anomaly {
            token: request.token,
            result: backend.fetch_anomalies(&request.key).await,
        },
    }
}
