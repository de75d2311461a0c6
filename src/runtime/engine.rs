//! WebAssembly engine
//!
//! Engines are built with epoch interruption enabled. Every store gets an
//! epoch deadline of one tick, so bumping the engine epoch traps the guest
//! at its next function entry or loop back-edge. That is the cancellation
//! point used by [`CancelHandle`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use wasmtime::{Config, Engine, Linker, Module, Store, StoreLimits, StoreLimitsBuilder, Trap};
use wasmtime_wasi::preview1::{self, WasiP1Ctx};
use wasmtime_wasi::{I32Exit, WasiCtxBuilder};

/// Entry points tried in order
const ENTRY_POINTS: [&str; 2] = ["_start", "main"];

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine initialisation failed: {0}")]
    Init(#[source] anyhow::Error),
    #[error("cannot read module {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("module compilation failed: {0}")]
    Compile(#[source] anyhow::Error),
    #[error("module linking failed: {0}")]
    Link(#[source] anyhow::Error),
    #[error("module instantiation failed: {0}")]
    Instantiate(#[source] anyhow::Error),
    #[error("module exports neither _start nor main")]
    NoEntryPoint,
    #[error("module trapped: {0}")]
    Trap(#[source] anyhow::Error),
    #[error("execution cancelled")]
    Cancelled,
}

/// How an execution ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Entry point returned; WASI exit code or 0
    Exited(i32),
    /// Stopped through a [`CancelHandle`]
    Cancelled,
    /// Could not be loaded, or trapped
    Failed(String),
}

/// Build an engine whose guests can be interrupted
pub fn build_engine() -> Result<Engine, EngineError> {
    let mut config = Config::new();
    config.epoch_interruption(true);
    Engine::new(&config).map_err(EngineError::Init)
}

/// Cooperative cancellation for one execution
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    engine: Engine,
}

impl CancelHandle {
    pub fn new(engine: Engine) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            engine,
        }
    }

    /// Request cancellation. The guest traps at its next safe point.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.engine.increment_epoch();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Everything an execution needs, handed out by the tracker
#[derive(Clone)]
pub struct ExecutionRequest {
    pub module_name: String,
    pub artifact_path: PathBuf,
    pub engine: Engine,
    /// Linear memory ceiling in bytes
    pub memory_budget: usize,
}

struct ModuleHost {
    wasi: WasiP1Ctx,
    limits: StoreLimits,
}

/// Load, instantiate and run a module to completion. Blocks the caller.
pub fn run_module(request: &ExecutionRequest, cancel: &CancelHandle) -> ExecutionOutcome {
    match execute(request, cancel) {
        Ok(code) => ExecutionOutcome::Exited(code),
        Err(EngineError::Cancelled) => ExecutionOutcome::Cancelled,
        Err(e) => ExecutionOutcome::Failed(e.to_string()),
    }
}

fn execute(request: &ExecutionRequest, cancel: &CancelHandle) -> Result<i32, EngineError> {
    let bytes = std::fs::read(&request.artifact_path).map_err(|source| EngineError::Read {
        path: request.artifact_path.clone(),
        source,
    })?;

    // Accepts both the binary and the text format
    let module = Module::new(&request.engine, &bytes).map_err(EngineError::Compile)?;

    let mut linker: Linker<ModuleHost> = Linker::new(&request.engine);
    preview1::add_to_linker_sync(&mut linker, |host: &mut ModuleHost| &mut host.wasi)
        .map_err(EngineError::Link)?;

    let host = ModuleHost {
        wasi: WasiCtxBuilder::new().inherit_stdout().inherit_stderr().build_p1(),
        limits: StoreLimitsBuilder::new()
            .memory_size(request.memory_budget)
            .build(),
    };
    let mut store = Store::new(&request.engine, host);
    store.limiter(|host| &mut host.limits);
    store.set_epoch_deadline(1);
    store.epoch_deadline_trap();

    // The deadline is armed; a cancel before this check would otherwise be missed
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    let instance = linker
        .instantiate(&mut store, &module)
        .map_err(|e| classify(e, EngineError::Instantiate))?;

    let entry = ENTRY_POINTS
        .iter()
        .find_map(|name| instance.get_typed_func::<(), ()>(&mut store, name).ok())
        .ok_or(EngineError::NoEntryPoint)?;

    match entry.call(&mut store, ()) {
        Ok(()) => Ok(0),
        Err(e) => match e.downcast_ref::<I32Exit>() {
            Some(exit) => Ok(exit.0),
            None => Err(classify(e, EngineError::Trap)),
        },
    }
}

/// Interrupt traps mean the execution was cancelled
fn classify(error: anyhow::Error, otherwise: fn(anyhow::Error) -> EngineError) -> EngineError {
    match error.downcast_ref::<Trap>() {
        Some(Trap::Interrupt) => EngineError::Cancelled,
        _ => otherwise(error),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    pub(crate) const EMPTY_WAT: &str = r#"(module (func (export "_start")))"#;

    pub(crate) const SPIN_WAT: &str = r#"
(module
  (func (export "_start")
    (loop $spin
      (br $spin))))
"#;

    const EXIT_WAT: &str = r#"
(module
  (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
  (memory (export "memory") 1)
  (func (export "_start")
    (call $exit (i32.const 3))))
"#;

    const BIG_MEMORY_WAT: &str = r#"
(module
  (memory 4)
  (func (export "_start")))
"#;

    fn request(dir: &tempfile::TempDir, wat: &str, budget: usize) -> ExecutionRequest {
        let path = dir.path().join("module.wat");
        std::fs::write(&path, wat).unwrap();
        ExecutionRequest {
            module_name: "module.wat".into(),
            artifact_path: path,
            engine: build_engine().unwrap(),
            memory_budget: budget,
        }
    }

    #[test]
    fn test_empty_module_exits_zero() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(&dir, EMPTY_WAT, 64 * 1024);
        let cancel = CancelHandle::new(req.engine.clone());
        assert_eq!(run_module(&req, &cancel), ExecutionOutcome::Exited(0));
    }

    #[test]
    fn test_wasi_exit_code_reported() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(&dir, EXIT_WAT, 64 * 1024);
        let cancel = CancelHandle::new(req.engine.clone());
        assert_eq!(run_module(&req, &cancel), ExecutionOutcome::Exited(3));
    }

    #[test]
    fn test_memory_budget_enforced() {
        let dir = tempfile::tempdir().unwrap();
        // Four pages requested, one page allowed
        let req = request(&dir, BIG_MEMORY_WAT, 64 * 1024);
        let cancel = CancelHandle::new(req.engine.clone());
        assert!(matches!(run_module(&req, &cancel), ExecutionOutcome::Failed(_)));
    }

    #[test]
    fn test_missing_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(&dir, "(module)", 64 * 1024);
        let cancel = CancelHandle::new(req.engine.clone());
        match run_module(&req, &cancel) {
            ExecutionOutcome::Failed(reason) => assert!(reason.contains("_start")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_cancel_interrupts_spinning_module() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(&dir, SPIN_WAT, 64 * 1024);
        let cancel = CancelHandle::new(req.engine.clone());

        let worker = {
            let req = req.clone();
            let cancel = cancel.clone();
            thread::spawn(move || run_module(&req, &cancel))
        };

        thread::sleep(Duration::from_millis(200));
        cancel.cancel();
        assert_eq!(worker.join().unwrap(), ExecutionOutcome::Cancelled);
    }

    #[test]
    fn test_cancel_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(&dir, SPIN_WAT, 64 * 1024);
        let cancel = CancelHandle::new(req.engine.clone());
        cancel.cancel();
        assert_eq!(run_module(&req, &cancel), ExecutionOutcome::Cancelled);
    }
}
