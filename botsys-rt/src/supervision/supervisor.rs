//! One-for-one supervisor over restartable child tasks.
//!
//! Every child is started from a factory future and watched; an abnormal
//! exit restarts only that child, within its restart budget. Exhausting
//! the budget escalates: the supervisor stops its whole brood and exits
//! abnormally, so the parent supervisor restarts the subtree while
//! sibling branches keep running. An abnormal child exit is also reported
//! to the safety controller, which disarms when the dead actor held a
//! safety registration.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use futures::future::{select_all, BoxFuture};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

// Layer 3: Internal module imports
use botsys_model::Name;

use crate::error::RuntimeError;
use crate::safety::SafetyController;
use crate::supervision::backoff::RestartBackoff;

/// When a supervisor restarts an exited child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Always restart, even after a normal exit.
    Permanent,
    /// Restart only after an abnormal exit.
    Transient,
    /// Never restart.
    Temporary,
}

/// A started child: its task plus the shutdown trigger the supervisor
/// uses for orderly stops.
pub struct RunningChild {
    /// The child's task; resolves to `Ok` on a normal exit.
    pub task: JoinHandle<Result<(), RuntimeError>>,
    /// Signalled `true` when the child must stop.
    pub shutdown: watch::Sender<bool>,
}

/// Factory future producing a freshly started child.
pub type StartChild =
    Box<dyn Fn() -> BoxFuture<'static, Result<RunningChild, RuntimeError>> + Send + Sync>;

/// Declarative child description.
pub struct ChildSpec {
    /// Stable child name (also the safety-crash attribution key).
    pub name: Name,
    /// Restart policy.
    pub policy: RestartPolicy,
    /// Start function; invoked for the initial start and every restart.
    pub start: StartChild,
}

impl ChildSpec {
    /// Permanent child from a start closure.
    pub fn permanent<F>(name: impl Into<Name>, start: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<RunningChild, RuntimeError>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            policy: RestartPolicy::Permanent,
            start: Box::new(start),
        }
    }
}

/// Restart budget and stop behaviour.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Restarts allowed per child within the window before escalation.
    pub max_restarts: u32,
    /// Sliding window for the restart budget.
    pub restart_window: Duration,
    /// How long an orderly child stop may take before the task is aborted.
    pub stop_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            restart_window: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

/// Running supervisor reference.
pub struct SupervisorHandle {
    name: Name,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<(), RuntimeError>>,
}

impl SupervisorHandle {
    /// Supervisor name.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Orderly stop: children stop in reverse start order, then the
    /// supervisor exits normally.
    pub async fn stop(self) -> Result<(), RuntimeError> {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(result) => result,
            Err(join) => Err(RuntimeError::invalid(format!(
                "supervisor task failed: {join}"
            ))),
        }
    }

    /// Convert into a supervised child of a parent supervisor.
    pub fn into_running_child(self) -> RunningChild {
        RunningChild {
            task: self.task,
            shutdown: self.shutdown,
        }
    }
}

/// One-for-one supervisor.
pub struct Supervisor {
    name: Name,
    children: Vec<ChildSpec>,
    config: SupervisorConfig,
    safety: SafetyController,
}

struct ChildRuntime {
    spec_index: usize,
    running: RunningChild,
    backoff: RestartBackoff,
}

impl Supervisor {
    /// Create a supervisor over the given children.
    pub fn new(
        name: impl Into<Name>,
        children: Vec<ChildSpec>,
        config: SupervisorConfig,
        safety: SafetyController,
    ) -> Self {
        Self {
            name: name.into(),
            children,
            config,
            safety,
        }
    }

    /// Start every child and run the supervision loop in its own task.
    pub async fn spawn(self) -> Result<SupervisorHandle, RuntimeError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let name = self.name.clone();

        // Start children in declaration order; a start failure aborts the
        // whole supervisor start (the parent will retry per its budget).
        let mut running = Vec::with_capacity(self.children.len());
        for (index, spec) in self.children.iter().enumerate() {
            let child = (spec.start)().await.map_err(|err| {
                error!(supervisor = %name, child = %spec.name, error = %err, "child failed to start");
                err
            })?;
            debug!(supervisor = %name, child = %spec.name, "child started");
            running.push(ChildRuntime {
                spec_index: index,
                running: child,
                backoff: RestartBackoff::new(self.config.max_restarts, self.config.restart_window),
            });
        }

        let task = tokio::spawn(self.run(running, shutdown_rx));
        Ok(SupervisorHandle {
            name,
            shutdown: shutdown_tx,
            task,
        })
    }

    async fn run(
        self,
        mut running: Vec<ChildRuntime>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), RuntimeError> {
        loop {
            if running.is_empty() {
                // Nothing left to watch; wait for shutdown.
                let _ = shutdown.changed().await;
                return Ok(());
            }

            // The child-watch future borrows `running`; keep it in a block
            // so the borrow ends before the shutdown path touches the vec.
            let exited = {
                let wait_any =
                    select_all(running.iter_mut().map(|child| &mut child.running.task));
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => None,
                    (result, index, _) = wait_any => Some((result, index)),
                }
            };
            let Some((result, index)) = exited else {
                self.stop_children(&mut running).await;
                info!(supervisor = %self.name, "stopped");
                return Ok(());
            };
            let spec = &self.children[running[index].spec_index];
            let abnormal = match result {
                Ok(Ok(())) => false,
                Ok(Err(err)) => {
                    warn!(supervisor = %self.name, child = %spec.name, error = %err, "child failed");
                    true
                }
                Err(join) => {
                    warn!(supervisor = %self.name, child = %spec.name, error = %join, "child panicked");
                    true
                }
            };

            if abnormal {
                // Disarm-on-crash: the dead actor may hold hardware.
                self.safety.handle_owner_crash(&spec.name).await;
            }

            let restart = match spec.policy {
                RestartPolicy::Permanent => true,
                RestartPolicy::Transient => abnormal,
                RestartPolicy::Temporary => false,
            };
            if !restart {
                debug!(supervisor = %self.name, child = %spec.name, "child finished");
                running.remove(index);
                continue;
            }

            let mut child = running.remove(index);
            child.backoff.record_restart();
            if child.backoff.is_limit_exceeded() {
                error!(
                    supervisor = %self.name,
                    child = %spec.name,
                    "restart budget exhausted, escalating"
                );
                self.stop_children(&mut running).await;
                return Err(RuntimeError::invalid(format!(
                    "supervisor '{}': child '{}' exceeded its restart budget",
                    self.name, spec.name
                )));
            }

            let delay = child.backoff.calculate_delay();
            tokio::time::sleep(delay).await;
            match (spec.start)().await {
                Ok(restarted) => {
                    info!(supervisor = %self.name, child = %spec.name, "child restarted");
                    child.running = restarted;
                    running.push(child);
                }
                Err(err) => {
                    error!(
                        supervisor = %self.name,
                        child = %spec.name,
                        error = %err,
                        "restart failed, escalating"
                    );
                    self.stop_children(&mut running).await;
                    return Err(err);
                }
            }
        }
    }

    /// Stop children in reverse start order.
    async fn stop_children(&self, running: &mut Vec<ChildRuntime>) {
        running.sort_by_key(|child| child.spec_index);
        while let Some(child) = running.pop() {
            let spec = &self.children[child.spec_index];
            let _ = child.running.shutdown.send(true);
            let task = child.running.task;
            if tokio::time::timeout(self.config.stop_timeout, task).await.is_err() {
                warn!(supervisor = %self.name, child = %spec.name, "stop timed out");
                // The JoinHandle was consumed by the timeout future; the
                // task keeps running detached only in this degenerate
                // case, with its shutdown flag already set.
            }
        }
    }
}
