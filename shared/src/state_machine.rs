//! Runtime/Module Lifecycle State Machine
//!
//! Defines valid transitions for the execution environment and the single
//! module slot. The environment and the slot are tracked together because
//! a module may only run inside a created environment.

use crate::{ModuleState, ResultCode, RuntimeState};
use thiserror::Error;

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Execution environment created
    EnvironmentCreated,
    /// Execution environment torn down
    EnvironmentDestroyed,
    /// Module artifact written
    ModuleStored,
    /// Module artifact deleted
    ModuleRemoved,
    /// Module execution launched
    ExecutionStarted,
    /// Module execution ended (completed, failed or cancelled)
    ExecutionFinished,
}

/// Combined environment and module slot state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleState {
    pub runtime: RuntimeState,
    pub module: ModuleState,
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self {
            runtime: RuntimeState::NotCreated,
            module: ModuleState::Absent,
        }
    }
}

/// Why a transition was refused
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    #[error("runtime has been created already")]
    AlreadyCreated,
    #[error("runtime has not been created yet")]
    NotCreated,
    #[error("a module is already running")]
    AlreadyRunning,
    #[error("no module is running")]
    NotRunning,
    #[error("operation not allowed while a module is running")]
    ModuleRunning,
}

impl Conflict {
    pub fn result_code(self) -> ResultCode {
        match self {
            Conflict::AlreadyCreated => ResultCode::AlreadyCreated,
            Conflict::NotCreated => ResultCode::NotCreated,
            Conflict::AlreadyRunning => ResultCode::AlreadyRunning,
            Conflict::NotRunning => ResultCode::NotRunning,
            Conflict::ModuleRunning => ResultCode::ModuleRunning,
        }
    }
}

/// Result of a state transition attempt
#[derive(Debug, Clone)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(LifecycleState),
    /// Transition was invalid from current state
    Invalid {
        from: LifecycleState,
        event: LifecycleEvent,
        conflict: Conflict,
    },
}

/// The lifecycle state machine for one environment and one module slot
#[derive(Debug, Default)]
pub struct LifecycleMachine {
    current: LifecycleState,
}

impl LifecycleMachine {
    /// Create a new state machine with no runtime and no module
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current state
    pub fn state(&self) -> LifecycleState {
        self.current
    }

    /// Compute the state an event would lead to, without applying it
    pub fn transition(&self, event: LifecycleEvent) -> Result<LifecycleState, Conflict> {
        use LifecycleEvent::*;
        use ModuleState::*;
        use RuntimeState::*;

        let LifecycleState { runtime, module } = self.current;

        match (event, runtime, module) {
            (EnvironmentCreated, NotCreated, _) => Ok(self.with_runtime(Created)),
            (EnvironmentCreated, Created, _) => Err(Conflict::AlreadyCreated),

            (EnvironmentDestroyed, NotCreated, _) => Err(Conflict::NotCreated),
            (EnvironmentDestroyed, Created, Running) => Err(Conflict::ModuleRunning),
            (EnvironmentDestroyed, Created, _) => Ok(self.with_runtime(NotCreated)),

            // One slot: no artifact churn while the slot is executing
            (ModuleStored | ModuleRemoved, _, Running) => Err(Conflict::ModuleRunning),
            (ModuleStored, _, _) => Ok(self.with_module(Stored)),
            (ModuleRemoved, _, _) => Ok(self.with_module(Absent)),

            (ExecutionStarted, _, Running) => Err(Conflict::AlreadyRunning),
            (ExecutionStarted, NotCreated, _) => Err(Conflict::NotCreated),
            (ExecutionStarted, Created, _) => Ok(self.with_module(Running)),

            (ExecutionFinished, _, Running) => Ok(self.with_module(Stored)),
            (ExecutionFinished, _, _) => Err(Conflict::NotRunning),
        }
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: LifecycleEvent) -> TransitionResult {
        match self.transition(event) {
            Ok(state) => {
                self.current = state;
                TransitionResult::Success(state)
            }
            Err(conflict) => TransitionResult::Invalid {
                from: self.current,
                event,
                conflict,
            },
        }
    }

    fn with_runtime(&self, runtime: RuntimeState) -> LifecycleState {
        LifecycleState {
            runtime,
            ..self.current
        }
    }

    fn with_module(&self, module: ModuleState) -> LifecycleState {
        LifecycleState {
            module,
            ..self.current
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let fsm = LifecycleMachine::new();
        assert_eq!(fsm.state().runtime, RuntimeState::NotCreated);
        assert_eq!(fsm.state().module, ModuleState::Absent);
    }

    #[test]
    fn test_runtime_create_destroy_alternates() {
        let mut fsm = LifecycleMachine::new();

        let result = fsm.process_event(LifecycleEvent::EnvironmentCreated);
        assert!(matches!(result, TransitionResult::Success(s) if s.runtime == RuntimeState::Created));

        let result = fsm.process_event(LifecycleEvent::EnvironmentCreated);
        assert!(matches!(
            result,
            TransitionResult::Invalid { conflict: Conflict::AlreadyCreated, .. }
        ));

        let result = fsm.process_event(LifecycleEvent::EnvironmentDestroyed);
        assert!(matches!(result, TransitionResult::Success(s) if s.runtime == RuntimeState::NotCreated));

        let result = fsm.process_event(LifecycleEvent::EnvironmentDestroyed);
        assert!(matches!(
            result,
            TransitionResult::Invalid { conflict: Conflict::NotCreated, .. }
        ));
    }

    #[test]
    fn test_normal_module_flow() {
        let mut fsm = LifecycleMachine::new();

        fsm.process_event(LifecycleEvent::ModuleStored);
        fsm.process_event(LifecycleEvent::EnvironmentCreated);

        let result = fsm.process_event(LifecycleEvent::ExecutionStarted);
        assert!(matches!(result, TransitionResult::Success(s) if s.module == ModuleState::Running));

        let result = fsm.process_event(LifecycleEvent::ExecutionStarted);
        assert!(matches!(
            result,
            TransitionResult::Invalid { conflict: Conflict::AlreadyRunning, .. }
        ));

        let result = fsm.process_event(LifecycleEvent::ExecutionFinished);
        assert!(matches!(result, TransitionResult::Success(s) if s.module == ModuleState::Stored));

        let result = fsm.process_event(LifecycleEvent::ModuleRemoved);
        assert!(matches!(result, TransitionResult::Success(s) if s.module == ModuleState::Absent));
    }

    #[test]
    fn test_running_module_pins_runtime_and_artifacts() {
        let mut fsm = LifecycleMachine::new();
        fsm.process_event(LifecycleEvent::EnvironmentCreated);
        fsm.process_event(LifecycleEvent::ExecutionStarted);

        for event in [
            LifecycleEvent::EnvironmentDestroyed,
            LifecycleEvent::ModuleStored,
            LifecycleEvent::ModuleRemoved,
        ] {
            assert_eq!(fsm.transition(event), Err(Conflict::ModuleRunning));
        }
        assert_eq!(fsm.state().module, ModuleState::Running);
    }

    #[test]
    fn test_execution_requires_runtime() {
        let mut fsm = LifecycleMachine::new();
        fsm.process_event(LifecycleEvent::ModuleStored);

        let result = fsm.process_event(LifecycleEvent::ExecutionStarted);
        assert!(matches!(
            result,
            TransitionResult::Invalid { conflict: Conflict::NotCreated, .. }
        ));
        assert_eq!(fsm.state().module, ModuleState::Stored);
    }

    #[test]
    fn test_finish_without_execution() {
        let fsm = LifecycleMachine::new();
        assert_eq!(
            fsm.transition(LifecycleEvent::ExecutionFinished),
            Err(Conflict::NotRunning)
        );
    }

    #[test]
    fn test_conflict_result_codes() {
        assert_eq!(Conflict::AlreadyCreated.result_code(), ResultCode::AlreadyCreated);
        assert_eq!(Conflict::NotRunning.result_code(), ResultCode::NotRunning);
    }
}
