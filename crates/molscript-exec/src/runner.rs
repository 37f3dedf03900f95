//! Background script runner
//!
//! Runs a [`ScriptEngine`] on its own thread so a render loop never blocks
//! on a script. The host sends requests over an mpsc channel and polls for
//! results once per frame:
//!
//! - [`ScriptRunner::run`] queues a script
//! - [`ScriptRunner::tick`] advances a suspended script by one frame
//! - [`ScriptRunner::halt`] stops the running script at its next statement
//! - [`ScriptRunner::poll`] returns finished results without blocking
//!
//! The engine itself sits behind a `parking_lot::Mutex`, so the host can
//! read selection snapshots or the state script between statements.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::engine::{EngineState, ExecutionResult, ScriptEngine};
use crate::error::ScriptResult;
use crate::schedule::HaltToken;

/// Stack for the execution thread; nested calls move to their own stacks
const SCRIPT_STACK_SIZE: usize = 16 * 1024 * 1024;

enum Request {
    Run(String),
    Tick,
    Shutdown,
}

/// Owns the execution thread
pub struct ScriptRunner {
    engine: Arc<Mutex<ScriptEngine>>,
    requests: Sender<Request>,
    results: Receiver<ScriptResult<ExecutionResult>>,
    halt: HaltToken,
    handle: Option<JoinHandle<()>>,
}

impl ScriptRunner {
    /// Move `engine` onto a new execution thread
    pub fn spawn(engine: ScriptEngine) -> Self {
        let halt = engine.halt_token();
        let engine = Arc::new(Mutex::new(engine));
        let (requests, inbox) = mpsc::channel::<Request>();
        let (outbox, results) = mpsc::channel();

        let worker = Arc::clone(&engine);
        let handle = std::thread::Builder::new()
            .name("molscript".to_string())
            .stack_size(SCRIPT_STACK_SIZE)
            .spawn(move || {
                for request in inbox {
                    let result = match request {
                        Request::Run(script) => worker.lock().run(&script),
                        Request::Tick => {
                            let mut engine = worker.lock();
                            if engine.status() != EngineState::Suspended {
                                continue;
                            }
                            engine.tick()
                        }
                        Request::Shutdown => break,
                    };
                    if outbox.send(result).is_err() {
                        break;
                    }
                }
                log::debug!("script thread stopped");
            })
            .map_err(|e| log::error!("failed to start script thread: {}", e))
            .ok();

        ScriptRunner {
            engine,
            requests,
            results,
            halt,
            handle,
        }
    }

    /// Shared handle to the engine
    pub fn engine(&self) -> Arc<Mutex<ScriptEngine>> {
        Arc::clone(&self.engine)
    }

    /// Queue a script; a suspended script still running is replaced
    pub fn run(&self, script: impl Into<String>) {
        self.send(Request::Run(script.into()));
    }

    /// One rendered frame went by
    pub fn tick(&self) {
        self.send(Request::Tick);
    }

    /// Stop the running script; takes effect at the next statement or tick
    pub fn halt(&self) {
        self.halt.halt();
    }

    /// Next finished result, if any (non-blocking)
    pub fn poll(&self) -> Option<ScriptResult<ExecutionResult>> {
        self.results.try_recv().ok()
    }

    /// Wait up to `timeout` for the next result
    pub fn wait(&self, timeout: Duration) -> Option<ScriptResult<ExecutionResult>> {
        self.results.recv_timeout(timeout).ok()
    }

    /// `false` once the execution thread has exited
    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn send(&self, request: Request) {
        if self.requests.send(request).is_err() {
            log::warn!("script thread is not running");
        }
    }

    /// Stop the thread and wait for it to exit
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.halt.halt();
        let _ = self.requests.send(Request::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("script thread panicked");
            }
        }
    }
}

impl Drop for ScriptRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RuntimeError, ScriptError};
    use crate::output::SharedOutput;
    use molscript_mol::Molecule;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn runner() -> (ScriptRunner, SharedOutput) {
        let mut engine = ScriptEngine::new(Arc::new(Molecule::new("empty")));
        let out = SharedOutput::new();
        engine.set_output(Box::new(out.clone()));
        (ScriptRunner::spawn(engine), out)
    }

    #[test]
    fn test_run_reports_result() {
        let (runner, out) = runner();
        runner.run("print 6 * 7");
        let result = runner.wait(TIMEOUT).unwrap();
        assert_eq!(result.unwrap(), ExecutionResult::Completed);
        assert_eq!(out.lines(), ["42"]);
    }

    #[test]
    fn test_ticks_resume_delay() {
        let (runner, out) = runner();
        runner.run("set frameRate 2\nprint 1\ndelay 1\nprint 2");
        let result = runner.wait(TIMEOUT).unwrap().unwrap();
        assert_eq!(result, ExecutionResult::Suspended { frames: 2 });
        runner.tick();
        let result = runner.wait(TIMEOUT).unwrap().unwrap();
        assert_eq!(result, ExecutionResult::Suspended { frames: 1 });
        runner.tick();
        let result = runner.wait(TIMEOUT).unwrap().unwrap();
        assert_eq!(result, ExecutionResult::Completed);
        assert_eq!(out.lines(), ["1", "2"]);
    }

    #[test]
    fn test_runaway_recursion_at_default_depth() {
        let (runner, _) = runner();
        runner.run("function f(n)\nreturn f(n + 1)\nend function\nprint f(1)");
        let err = runner.wait(TIMEOUT).unwrap().unwrap_err();
        assert!(matches!(
            err,
            ScriptError::Runtime {
                source: RuntimeError::CallDepthExceeded(64),
                ..
            }
        ));
        assert!(runner.is_alive());
    }

    #[test]
    fn test_halt_cancels_suspended_script() {
        let (runner, out) = runner();
        runner.run("delay 10\nprint 1");
        runner.wait(TIMEOUT).unwrap().unwrap();
        runner.halt();
        runner.tick();
        let result = runner.wait(TIMEOUT).unwrap().unwrap();
        assert_eq!(result, ExecutionResult::Cancelled);
        assert!(out.lines().is_empty());
    }
}
