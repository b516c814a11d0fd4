//! The schedule reconciler - keeps gate state in step with time and tasks.
//!
//! One workflow is active at a time. Every pass re-reads it from the store,
//! applies at most one mutation, derives the desired gate states from
//! scratch, and persists the result in a single write. All passes, whether
//! triggered by the ticker or by a caller, run under one mutex, so the
//! read-modify-write over the node list is never interleaved.
//!
//! ```text
//! Idle --load--> Active --unload/delete--> Idle
//!                  |  ^
//!                  tick / mutation
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use daylock_core::{
    Edge, EdgeId, GraphError, LockType, Node, NodeId, Nullable, Position, Workflow,
    WorkflowGraph, WorkflowId, WorkflowUpdate,
};
use daylock_storage::{StorageError, WorkflowStore};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::{NativeControlAdapter, NoopAdapter};
use crate::clock::{Clock, SystemClock};
use crate::config::ReconcilerConfig;
use crate::lock::{DependencyLockEngine, GateState};

const EVENT_CAPACITY: usize = 64;

/// Errors that abort a reconciliation pass.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Reading or writing the workflow failed; nothing was applied
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The active workflow no longer exists in the store
    #[error("workflow {0} not found")]
    WorkflowMissing(WorkflowId),
}

/// Why a request was refused without changing anything.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// No workflow is active
    #[error("no workflow is loaded")]
    NoWorkflowLoaded,

    /// The task has a schedule and `now` is outside it
    #[error("task {0} is outside its active window")]
    OutsideActiveWindow(NodeId),

    /// No node with this id
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// No edge with this id
    #[error("unknown edge {0}")]
    UnknownEdge(EdgeId),

    /// The node exists but is not a verifiable task
    #[error("node {0} is not a task")]
    NotATask(NodeId),

    /// The mutation would break graph structure
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The validation oracle did not accept the proof
    #[error("proof was not accepted")]
    ProofNotAccepted,
}

/// Result of a request that may be refused on a precondition.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Outcome<T> {
    /// The request took effect
    Applied(T),
    /// The request was refused; nothing changed
    Rejected(Rejection),
}

impl<T> Outcome<T> {
    /// Whether the request took effect.
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    /// The applied value, if any.
    pub fn applied(self) -> Option<T> {
        match self {
            Outcome::Applied(value) => Some(value),
            Outcome::Rejected(_) => None,
        }
    }

    /// The rejection reason, if any.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Outcome::Applied(_) => None,
            Outcome::Rejected(reason) => Some(reason),
        }
    }
}

/// A gate whose lock state flipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateChange {
    /// Owning workflow
    pub workflow_id: WorkflowId,
    /// Gate node
    pub gate: NodeId,
    /// Capability the gate controls
    pub lock_type: LockType,
    /// New lock state
    pub locked: bool,
}

/// What one pass changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Gates whose lock state flipped
    pub changes: Vec<GateChange>,
    /// New aggregate focus state, when a focus gate flipped
    pub focus_locked: Option<bool>,
}

impl Reconciliation {
    /// Whether no gate changed.
    pub fn is_quiet(&self) -> bool {
        self.changes.is_empty()
    }
}

struct ActiveWorkflow {
    id: WorkflowId,
    generation: u64,
    /// Last persisted copy
    workflow: Workflow,
}

struct Ticker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Keeps the active workflow's gates consistent with the clock and with
/// task validation.
pub struct ScheduleReconciler<S: WorkflowStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    adapter: Arc<dyn NativeControlAdapter>,
    engine: Arc<DependencyLockEngine>,
    config: ReconcilerConfig,
    active: Arc<Mutex<Option<ActiveWorkflow>>>,
    ticker: Arc<Mutex<Option<Ticker>>>,
    generation: Arc<AtomicU64>,
    events: broadcast::Sender<GateChange>,
}

impl<S: WorkflowStore> Clone for ScheduleReconciler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            adapter: Arc::clone(&self.adapter),
            engine: Arc::clone(&self.engine),
            config: self.config.clone(),
            active: Arc::clone(&self.active),
            ticker: Arc::clone(&self.ticker),
            generation: Arc::clone(&self.generation),
            events: self.events.clone(),
        }
    }
}

impl<S: WorkflowStore + 'static> ScheduleReconciler<S> {
    /// Create an idle reconciler over `store`.
    pub fn new(store: S) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store: Arc::new(store),
            clock: Arc::new(SystemClock),
            adapter: Arc::new(NoopAdapter),
            engine: Arc::new(DependencyLockEngine::new()),
            config: ReconcilerConfig::default(),
            active: Arc::new(Mutex::new(None)),
            ticker: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            events,
        }
    }

    /// Set the clock.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Set the native control adapter.
    pub fn with_adapter(mut self, adapter: impl NativeControlAdapter + 'static) -> Self {
        self.adapter = Arc::new(adapter);
        self
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Get a reference to the storage.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current time according to the reconciler's clock.
    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// Receive every gate transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<GateChange> {
        self.events.subscribe()
    }

    /// Make `id` the active workflow and reconcile it once.
    ///
    /// Any running ticker is stopped first; call [`start`](Self::start)
    /// to tick the new workflow.
    pub async fn load(&self, id: &WorkflowId) -> Result<Reconciliation, ReconcileError> {
        self.stop_ticker().await;

        let mut guard = self.active.lock().await;
        let workflow = self
            .store
            .get_workflow(id)
            .await?
            .ok_or_else(|| ReconcileError::WorkflowMissing(id.clone()))?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut active = ActiveWorkflow {
            id: id.clone(),
            generation,
            workflow,
        };
        let pass = match self.commit(&mut active, |_, _| Ok(false)).await? {
            Outcome::Applied(pass) => pass,
            Outcome::Rejected(reason) => {
                // an empty mutation cannot be refused
                debug!(%reason, "initial pass refused");
                Reconciliation::default()
            }
        };
        let focus = self.focus_locked(&active.workflow);
        *guard = Some(active);
        drop(guard);

        info!(workflow_id = %id, generation, "workflow loaded");
        self.publish(&pass);
        self.apply_focus(focus);
        Ok(pass)
    }

    /// Stop ticking and forget the active workflow. Returns whether one
    /// was loaded.
    pub async fn unload(&self) -> bool {
        self.stop_ticker().await;

        let previous = self.active.lock().await.take();
        match previous {
            Some(active) => {
                info!(workflow_id = %active.id, "workflow unloaded");
                if self.focus_locked(&active.workflow) {
                    self.apply_focus(false);
                }
                true
            }
            None => false,
        }
    }

    /// Delete a workflow, unloading it first if it is active.
    pub async fn delete_workflow(&self, id: &WorkflowId) -> Result<(), ReconcileError> {
        if self.current_id().await.as_ref() == Some(id) {
            self.unload().await;
        }
        self.store.delete_workflow(id).await?;
        info!(workflow_id = %id, "workflow deleted");
        Ok(())
    }

    /// Id of the active workflow.
    pub async fn current_id(&self) -> Option<WorkflowId> {
        self.active.lock().await.as_ref().map(|a| a.id.clone())
    }

    /// Last persisted copy of the active workflow.
    pub async fn snapshot(&self) -> Option<Workflow> {
        self.active.lock().await.as_ref().map(|a| a.workflow.clone())
    }

    /// Explain every gate of the active workflow at the current time.
    pub async fn gate_states(&self) -> Option<BTreeMap<NodeId, GateState>> {
        let workflow = self.snapshot().await?;
        let (graph, _) = WorkflowGraph::from_workflow(&workflow);
        Some(self.engine.evaluate(&graph, self.clock.now()))
    }

    /// Run one reconciliation pass now.
    pub async fn reconcile_now(&self) -> Result<Outcome<Reconciliation>, ReconcileError> {
        self.mutate(|_, _| Ok(false)).await
    }

    /// Mark a task validated and store its proof reference.
    ///
    /// A scheduled task can only be validated inside its window. Gates
    /// that depended on it unlock in the same write.
    pub async fn validate_task(
        &self,
        task_id: &NodeId,
        proof: Option<String>,
    ) -> Result<Outcome<Reconciliation>, ReconcileError> {
        self.mutate(move |graph, now| {
            let node = graph
                .find_node_mut(task_id)
                .ok_or_else(|| Rejection::UnknownNode(task_id.clone()))?;
            let task = node
                .as_task_mut()
                .ok_or_else(|| Rejection::NotATask(task_id.clone()))?;
            if task.schedule.is_some() && !DependencyLockEngine::active_now(task, now) {
                return Err(Rejection::OutsideActiveWindow(task_id.clone()));
            }
            task.validated = true;
            task.image_proof.set(proof);
            Ok(true)
        })
        .await
    }

    /// Clear a task's validation and proof.
    pub async fn reset_task(&self, task_id: &NodeId) -> Result<Outcome<Reconciliation>, ReconcileError> {
        self.mutate(|graph, _| {
            let node = graph
                .find_node_mut(task_id)
                .ok_or_else(|| Rejection::UnknownNode(task_id.clone()))?;
            let task = node
                .as_task_mut()
                .ok_or_else(|| Rejection::NotATask(task_id.clone()))?;
            task.validated = false;
            task.image_proof.set(None);
            Ok(true)
        })
        .await
    }

    /// Add a node to the active workflow.
    pub async fn add_node(&self, node: Node) -> Result<Outcome<Reconciliation>, ReconcileError> {
        self.mutate(move |graph, _| {
            graph.add_node(node)?;
            Ok(true)
        })
        .await
    }

    /// Remove a node and its edges.
    pub async fn remove_node(&self, id: &NodeId) -> Result<Outcome<Reconciliation>, ReconcileError> {
        self.mutate(|graph, _| {
            graph
                .remove_node(id)
                .ok_or_else(|| Rejection::UnknownNode(id.clone()))?;
            Ok(true)
        })
        .await
    }

    /// Connect two nodes.
    pub async fn add_edge(&self, edge: Edge) -> Result<Outcome<Reconciliation>, ReconcileError> {
        self.mutate(move |graph, _| {
            graph.add_edge(edge)?;
            Ok(true)
        })
        .await
    }

    /// Remove an edge.
    pub async fn remove_edge(&self, id: &EdgeId) -> Result<Outcome<Reconciliation>, ReconcileError> {
        self.mutate(|graph, _| {
            graph
                .remove_edge(id)
                .ok_or_else(|| Rejection::UnknownEdge(id.clone()))?;
            Ok(true)
        })
        .await
    }

    /// Replace a node's contents.
    ///
    /// A gate's `is_locked` is recomputed. A task keeps its stored
    /// `validated` and `image_proof`; those change only through
    /// [`validate_task`](Self::validate_task) and
    /// [`reset_task`](Self::reset_task).
    pub async fn replace_node(
        &self,
        id: &NodeId,
        mut node: Node,
    ) -> Result<Outcome<Reconciliation>, ReconcileError> {
        self.mutate(move |graph, _| {
            if let Some(task) = node.as_task_mut() {
                match graph.find_node(id).and_then(|n| n.as_task()) {
                    Some(stored) => {
                        task.validated = stored.validated;
                        task.image_proof = stored.image_proof.clone();
                    }
                    None => {
                        task.validated = false;
                        task.image_proof = Nullable::Absent;
                    }
                }
            }
            graph.replace_node(id, node)?;
            Ok(true)
        })
        .await
    }

    /// Move a node in the editor layout.
    pub async fn move_node(
        &self,
        id: &NodeId,
        position: Position,
    ) -> Result<Outcome<Reconciliation>, ReconcileError> {
        self.mutate(move |graph, _| {
            graph.update_position(id, position)?;
            Ok(true)
        })
        .await
    }

    /// Start ticking the active workflow. Returns false when idle.
    pub async fn start(&self) -> bool {
        let Some(generation) = self.active.lock().await.as_ref().map(|a| a.generation) else {
            return false;
        };
        self.stop_ticker().await;

        let cancel = CancellationToken::new();
        let period = self.config.tick_interval.max(Duration::from_millis(1));
        let this = self.clone();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the first tick completes immediately; load already reconciled
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = this.tick(generation).await {
                            warn!(error = %e, "reconciliation tick failed");
                        }
                    }
                }
            }
            debug!(generation, "ticker stopped");
        });

        *self.ticker.lock().await = Some(Ticker { cancel, handle });
        info!(generation, interval_secs = period.as_secs_f64(), "ticker started");
        true
    }

    /// Whether the ticker is running.
    pub async fn is_running(&self) -> bool {
        self.ticker
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    async fn stop_ticker(&self) {
        let ticker = self.ticker.lock().await.take();
        if let Some(ticker) = ticker {
            ticker.cancel.cancel();
            if let Err(e) = ticker.handle.await {
                warn!(error = %e, "ticker task ended abnormally");
            }
        }
    }

    /// One scheduled pass. Skipped when `generation` is no longer active.
    async fn tick(&self, generation: u64) -> Result<(), ReconcileError> {
        let pass = {
            let mut guard = self.active.lock().await;
            let Some(active) = guard.as_mut().filter(|a| a.generation == generation) else {
                debug!(generation, "stale tick skipped");
                return Ok(());
            };
            self.commit(active, |_, _| Ok(false)).await?
        };
        if let Outcome::Applied(pass) = pass {
            self.publish(&pass);
            if let Some(on) = pass.focus_locked {
                self.apply_focus(on);
            }
        }
        Ok(())
    }

    async fn mutate<F>(&self, edit: F) -> Result<Outcome<Reconciliation>, ReconcileError>
    where
        F: FnOnce(&mut WorkflowGraph, NaiveDateTime) -> Result<bool, Rejection> + Send,
    {
        let outcome = {
            let mut guard = self.active.lock().await;
            let Some(active) = guard.as_mut() else {
                return Ok(Outcome::Rejected(Rejection::NoWorkflowLoaded));
            };
            self.commit(active, edit).await?
        };

        match &outcome {
            Outcome::Applied(pass) => {
                self.publish(pass);
                if let Some(on) = pass.focus_locked {
                    self.apply_focus(on);
                }
            }
            Outcome::Rejected(reason) => debug!(%reason, "request rejected"),
        }
        Ok(outcome)
    }

    /// Read, edit, derive, write. Must run under the `active` lock.
    ///
    /// `edit` returns whether it changed the graph. The cached workflow is
    /// replaced only after the store confirms the write.
    async fn commit<F>(
        &self,
        active: &mut ActiveWorkflow,
        edit: F,
    ) -> Result<Outcome<Reconciliation>, ReconcileError>
    where
        F: FnOnce(&mut WorkflowGraph, NaiveDateTime) -> Result<bool, Rejection> + Send,
    {
        let workflow = self
            .store
            .get_workflow(&active.id)
            .await?
            .ok_or_else(|| ReconcileError::WorkflowMissing(active.id.clone()))?;

        let (mut graph, warnings) = WorkflowGraph::from_workflow(&workflow);
        for warning in &warnings {
            warn!(workflow_id = %active.id, "{}", warning);
        }

        // lock state as persisted before this pass
        let known: BTreeMap<NodeId, bool> = workflow
            .nodes
            .iter()
            .filter_map(|n| n.as_control().map(|c| (n.id.clone(), c.is_locked)))
            .collect();

        let now = self.clock.now();
        let edited = match edit(&mut graph, now) {
            Ok(edited) => edited,
            Err(reason) => return Ok(Outcome::Rejected(reason)),
        };

        let desired = self.engine.derive_lock_states(&graph, now);
        let mut changes = Vec::new();
        for (gate_id, locked) in &desired {
            let Some(control) = graph.find_node_mut(gate_id).and_then(|n| n.as_control_mut()) else {
                continue;
            };
            control.is_locked = *locked;
            // a gate added by this pass starts from unlocked
            let previous = known.get(gate_id).copied().unwrap_or(false);
            if previous != *locked {
                changes.push(GateChange {
                    workflow_id: active.id.clone(),
                    gate: gate_id.clone(),
                    lock_type: control.lock_type,
                    locked: *locked,
                });
            }
        }

        if !edited && changes.is_empty() {
            debug!(workflow_id = %active.id, "no gate changes");
            active.workflow = workflow;
            return Ok(Outcome::Applied(Reconciliation::default()));
        }

        let (nodes, edges) = graph.into_parts();
        let update = if edited {
            WorkflowUpdate::graph(nodes, edges)
        } else {
            // lock-only passes leave the edge list as stored
            WorkflowUpdate::nodes(nodes)
        };
        let stored = self.store.put_workflow(&active.id, update).await?;

        let focus_changed = changes
            .iter()
            .any(|c| self.config.is_focus(c.lock_type));
        active.workflow = stored;

        for change in &changes {
            info!(
                workflow_id = %change.workflow_id,
                gate = %change.gate,
                lock_type = %change.lock_type,
                locked = change.locked,
                "gate {}",
                if change.locked { "locked" } else { "unlocked" }
            );
        }

        Ok(Outcome::Applied(Reconciliation {
            focus_locked: focus_changed.then(|| self.focus_locked(&active.workflow)),
            changes,
        }))
    }

    fn publish(&self, pass: &Reconciliation) {
        for change in &pass.changes {
            // no subscribers is fine
            let _ = self.events.send(change.clone());
        }
    }

    /// Whether any focus-type gate of the workflow is locked.
    fn focus_locked(&self, workflow: &Workflow) -> bool {
        workflow
            .nodes
            .iter()
            .filter_map(|n| n.as_control())
            .any(|c| c.is_locked && self.config.is_focus(c.lock_type))
    }

    fn apply_focus(&self, on: bool) {
        if let Err(e) = self.adapter.set_always_on_top(on) {
            warn!(error = %e, on, "always-on-top failed");
        }
        if let Err(e) = self.adapter.set_fullscreen(on) {
            warn!(error = %e, on, "fullscreen failed");
        }
    }
}
