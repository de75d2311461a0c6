//! Resource tracker
//!
//! Owns the execution environment, the single module slot and the artifact
//! store. All status changes go through here, under one lock, so checks and
//! transitions cannot interleave.

use super::artifact::ArtifactStore;
use super::engine::{self, ExecutionRequest};
use super::RuntimeError;
use parking_lot::Mutex;
use tinykube_shared::state_machine::{Conflict, LifecycleEvent, LifecycleMachine, TransitionResult};
use tinykube_shared::{now_ms, protocol, ModuleState, RuntimeState};
use tracing::{debug, info, warn};
use wasmtime::Engine;

/// Bounds on environment memory budgets
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentLimits {
    /// Budget of an environment created implicitly by an execution
    pub default_budget: usize,
    /// Largest budget a create request may ask for
    pub max_budget: usize,
}

impl Default for EnvironmentLimits {
    fn default() -> Self {
        Self {
            default_budget: protocol::DEFAULT_HEAP_SIZE,
            max_budget: 64 * 1024 * 1024,
        }
    }
}

/// Who created the current environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentOrigin {
    /// A `createRuntime` command; lives until `destroyRuntime`
    Explicit,
    /// An execution; torn down when the execution ends
    Execution,
}

/// The live execution environment
struct Environment {
    engine: Engine,
    budget: usize,
    created_at_ms: u64,
    origin: EnvironmentOrigin,
}

impl Environment {
    fn create(
        budget: usize,
        origin: EnvironmentOrigin,
        limits: &EnvironmentLimits,
    ) -> Result<Self, RuntimeError> {
        if budget == 0 || budget > limits.max_budget {
            return Err(RuntimeError::AllocationFailed {
                budget,
                reason: format!("budget must be within 1..={} bytes", limits.max_budget),
            });
        }
        let engine = engine::build_engine().map_err(|e| RuntimeError::AllocationFailed {
            budget,
            reason: e.to_string(),
        })?;
        Ok(Self {
            engine,
            budget,
            created_at_ms: now_ms(),
            origin,
        })
    }
}

#[derive(Debug, Default)]
struct ModuleSlot {
    name: Option<String>,
    started_at_ms: u64,
    /// Generation of the execution occupying the slot
    generation: Option<u64>,
}

struct TrackerState {
    machine: LifecycleMachine,
    environment: Option<Environment>,
    slot: ModuleSlot,
    next_generation: u64,
}

impl TrackerState {
    /// Apply an event the caller has already validated
    fn apply(&mut self, event: LifecycleEvent) {
        if let TransitionResult::Invalid { from, conflict, .. } = self.machine.process_event(event) {
            // Callers validate first, so this only fires on a tracker bug
            warn!("Lifecycle event {:?} refused from {:?}: {}", event, from, conflict);
        }
    }
}

/// Point-in-time view of environment and module status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub runtime: RuntimeState,
    pub module: ModuleState,
    pub module_name: Option<String>,
    pub heap_size: usize,
    pub created_at_ms: u64,
    pub started_at_ms: u64,
}

/// An execution admitted by [`ResourceTracker::begin_execution`]
pub struct ExecutionLease {
    pub generation: u64,
    pub request: ExecutionRequest,
}

/// Tracks the environment, the module slot and the stored artifacts
pub struct ResourceTracker {
    artifacts: ArtifactStore,
    limits: EnvironmentLimits,
    state: Mutex<TrackerState>,
}

impl ResourceTracker {
    pub fn new(artifacts: ArtifactStore, limits: EnvironmentLimits) -> Self {
        Self {
            artifacts,
            limits,
            state: Mutex::new(TrackerState {
                machine: LifecycleMachine::new(),
                environment: None,
                slot: ModuleSlot::default(),
                next_generation: 1,
            }),
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Create the execution environment with `budget` bytes of memory
    pub fn create_environment(&self, budget: usize) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.machine.transition(LifecycleEvent::EnvironmentCreated)?;

        let environment = Environment::create(budget, EnvironmentOrigin::Explicit, &self.limits)?;
        state.environment = Some(environment);
        state.apply(LifecycleEvent::EnvironmentCreated);

        info!("Created runtime with heap size {} bytes", budget);
        Ok(())
    }

    /// Tear down the execution environment and release its budget
    pub fn destroy_environment(&self) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.machine.transition(LifecycleEvent::EnvironmentDestroyed)?;

        state.environment = None;
        state.apply(LifecycleEvent::EnvironmentDestroyed);

        info!("Destroyed runtime");
        Ok(())
    }

    /// Persist `content` as the artifact `name` and make it the slot's module
    pub fn store_module_artifact(&self, name: &str, content: &[u8]) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.machine.transition(LifecycleEvent::ModuleStored)?;

        self.artifacts.store(name, content)?;
        state.slot.name = Some(name.to_string());
        state.apply(LifecycleEvent::ModuleStored);
        Ok(())
    }

    /// Delete the artifact `name`; empties the slot if it held that module
    pub fn delete_module_artifact(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.machine.transition(LifecycleEvent::ModuleRemoved)?;

        self.artifacts.delete(name)?;
        if state.slot.name.as_deref() == Some(name) {
            state.slot.name = None;
            state.apply(LifecycleEvent::ModuleRemoved);
        }
        Ok(())
    }

    pub fn status(&self) -> StatusSnapshot {
        let state = self.state.lock();
        let lifecycle = state.machine.state();
        let environment = state.environment.as_ref();

        StatusSnapshot {
            runtime: lifecycle.runtime,
            module: lifecycle.module,
            module_name: state.slot.name.clone(),
            heap_size: environment.map(|env| env.budget).unwrap_or(0),
            created_at_ms: environment.map(|env| env.created_at_ms).unwrap_or(0),
            started_at_ms: state.slot.started_at_ms,
        }
    }

    /// Admit an execution of `name`.
    ///
    /// Fails with `AlreadyRunning` while the slot is executing and with
    /// `NotFound` when no artifact is stored. Without an environment, one is
    /// created at the default budget and torn down again by
    /// [`finish_execution`](Self::finish_execution).
    pub fn begin_execution(&self, name: &str) -> Result<ExecutionLease, RuntimeError> {
        let mut state = self.state.lock();
        if state.machine.state().module == ModuleState::Running {
            return Err(Conflict::AlreadyRunning.into());
        }

        let artifact_path = self.artifacts.path_for(name)?;
        if !artifact_path.is_file() {
            return Err(RuntimeError::NotFound(name.to_string()));
        }

        if state.environment.is_none() {
            let environment = Environment::create(
                self.limits.default_budget,
                EnvironmentOrigin::Execution,
                &self.limits,
            )?;
            state.environment = Some(environment);
            state.apply(LifecycleEvent::EnvironmentCreated);
            debug!("Created implicit runtime for {}", name);
        }
        state.machine.transition(LifecycleEvent::ExecutionStarted)?;

        let Some(environment) = state.environment.as_ref() else {
            return Err(Conflict::NotCreated.into());
        };
        let (engine, budget) = (environment.engine.clone(), environment.budget);

        let generation = state.next_generation;
        state.next_generation += 1;
        state.slot = ModuleSlot {
            name: Some(name.to_string()),
            started_at_ms: now_ms(),
            generation: Some(generation),
        };
        state.apply(LifecycleEvent::ExecutionStarted);

        info!("Module {} running (generation {}, budget {} bytes)", name, generation, budget);
        Ok(ExecutionLease {
            generation,
            request: ExecutionRequest {
                module_name: name.to_string(),
                artifact_path,
                engine,
                memory_budget: budget,
            },
        })
    }

    /// Release the slot held by execution `generation`.
    ///
    /// Returns false when the generation is stale (already finished or
    /// reset), in which case nothing changes.
    pub fn finish_execution(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        if state.slot.generation != Some(generation) {
            return false;
        }

        state.slot.generation = None;
        state.slot.started_at_ms = 0;
        state.apply(LifecycleEvent::ExecutionFinished);

        let implicit = matches!(
            state.environment.as_ref(),
            Some(env) if env.origin == EnvironmentOrigin::Execution
        );
        if implicit {
            state.environment = None;
            state.apply(LifecycleEvent::EnvironmentDestroyed);
            debug!("Tore down implicit runtime");
        }

        info!("Module slot released (generation {})", generation);
        true
    }
}
