//! Execution supervisor
//!
//! Runs one module at a time on a dedicated, freshly spawned thread and
//! stops it on demand through cooperative cancellation.

use super::engine::{self, CancelHandle, ExecutionOutcome};
use super::tracker::ResourceTracker;
use super::RuntimeError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tinykube_shared::state_machine::Conflict;
use tinykube_shared::ModuleState;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// Default time `stop_module` waits for the guest to observe cancellation
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// The execution currently occupying the module slot
struct ActiveExecution {
    generation: u64,
    module_name: String,
    cancel: CancelHandle,
    done: oneshot::Receiver<ExecutionOutcome>,
    alive: Arc<AtomicBool>,
}

/// A thread that missed the stop deadline and may still be inside the guest
struct DetachedExecution {
    module_name: String,
    alive: Arc<AtomicBool>,
}

/// Starts and stops module executions
pub struct ExecutionSupervisor {
    tracker: Arc<ResourceTracker>,
    active: Mutex<Option<ActiveExecution>>,
    detached: Mutex<Option<DetachedExecution>>,
    stop_timeout: Duration,
}

impl ExecutionSupervisor {
    pub fn new(tracker: Arc<ResourceTracker>, stop_timeout: Duration) -> Self {
        Self {
            tracker,
            active: Mutex::new(None),
            detached: Mutex::new(None),
            stop_timeout,
        }
    }

    pub fn tracker(&self) -> &Arc<ResourceTracker> {
        &self.tracker
    }

    /// Launch `name` on a new execution thread. Returns once the thread is
    /// running; does not wait for the module to finish.
    ///
    /// Refused with `AlreadyRunning` while a detached thread from an earlier
    /// stop is still alive.
    pub fn start_module(&self, name: &str) -> Result<(), RuntimeError> {
        let mut active = self.active.lock();

        {
            let mut detached = self.detached.lock();
            if let Some(lingering) = detached.as_ref() {
                if lingering.alive.load(Ordering::Acquire) {
                    warn!(
                        "Refusing to start {}: {} has not exited since it was stopped",
                        name, lingering.module_name
                    );
                    return Err(Conflict::AlreadyRunning.into());
                }
                *detached = None;
            }
        }

        // Admission happens under the tracker lock, so racing starts see AlreadyRunning
        let lease = self.tracker.begin_execution(name)?;
        let generation = lease.generation;
        let cancel = CancelHandle::new(lease.request.engine.clone());
        let (done_tx, done_rx) = oneshot::channel();

        let alive = Arc::new(AtomicBool::new(true));
        let worker_alive = alive.clone();
        let tracker = self.tracker.clone();
        let worker_cancel = cancel.clone();
        let spawned = thread::Builder::new()
            .name(format!("module-exec-{generation}"))
            .spawn(move || {
                let request = lease.request;
                let outcome = engine::run_module(&request, &worker_cancel);
                match &outcome {
                    ExecutionOutcome::Exited(code) => {
                        info!("Module {} exited with code {}", request.module_name, code)
                    }
                    ExecutionOutcome::Cancelled => {
                        info!("Module {} cancelled", request.module_name)
                    }
                    ExecutionOutcome::Failed(reason) => {
                        error!("Module {} failed: {}", request.module_name, reason)
                    }
                }
                tracker.finish_execution(generation);
                worker_alive.store(false, Ordering::Release);
                let _ = done_tx.send(outcome);
            });

        if let Err(e) = spawned {
            self.tracker.finish_execution(generation);
            return Err(RuntimeError::Launch(e));
        }

        *active = Some(ActiveExecution {
            generation,
            module_name: name.to_string(),
            cancel,
            done: done_rx,
            alive,
        });
        Ok(())
    }

    /// Cancel the running module and release the slot.
    ///
    /// Waits up to the stop timeout for the execution thread to report back.
    /// A thread that misses the deadline is left detached; its generation is
    /// retired here, so it can no longer change the slot, and new starts are
    /// refused until it exits.
    pub async fn stop_module(&self, name: &str) -> Result<ExecutionOutcome, RuntimeError> {
        let execution = {
            let mut active = self.active.lock();
            if self.tracker.status().module != ModuleState::Running {
                *active = None;
                return Err(Conflict::NotRunning.into());
            }
            active.take()
        };
        let Some(execution) = execution else {
            return Err(Conflict::NotRunning.into());
        };

        if execution.module_name != name {
            warn!(
                "Stop requested for {} but {} is running; stopping it",
                name, execution.module_name
            );
        }

        execution.cancel.cancel();
        let alive = execution.alive;
        let outcome = match tokio::time::timeout(self.stop_timeout, execution.done).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                warn!("Execution thread for {} exited without reporting", execution.module_name);
                ExecutionOutcome::Cancelled
            }
            Err(_) => {
                warn!(
                    "Module {} did not observe cancellation within {:?}; detaching",
                    execution.module_name, self.stop_timeout
                );
                *self.detached.lock() = Some(DetachedExecution {
                    module_name: execution.module_name.clone(),
                    alive,
                });
                ExecutionOutcome::Cancelled
            }
        };

        self.tracker.finish_execution(execution.generation);
        info!("Stopped module {}", execution.module_name);
        Ok(outcome)
    }

    /// Stop whatever is running, used on shutdown
    pub async fn shutdown(&self) {
        let status = self.tracker.status();
        if status.module != ModuleState::Running {
            return;
        }
        if let Some(name) = status.module_name {
            if let Err(e) = self.stop_module(&name).await {
                warn!("Failed to stop {} on shutdown: {}", name, e);
            }
        }
    }
}
