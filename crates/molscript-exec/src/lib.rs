//! Molscript execution
//!
//! Runs compiled scripts against an [`AtomModel`](molscript_mol::AtomModel):
//!
//! - [`selection`] - the [`SelectionEngine`] with its hidden / deleted / subset overlays
//! - [`eval`] - the postfix [`Evaluator`] for atom and math expressions
//! - [`context`] - per-call [`ExecutionContext`]s
//! - [`engine`] - the [`ScriptEngine`] running statements, flow control and functions
//! - [`schedule`] - frame-paced `delay` and cooperative [`HaltToken`]s
//! - [`runner`] - a [`ScriptRunner`] thread for hosts with a render loop
//! - [`settings`] - serde-backed [`EngineSettings`]
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use molscript_exec::{ExecutionResult, ScriptEngine, SharedOutput};
//! use molscript_mol::{Atom, Element, Molecule};
//!
//! let mut mol = Molecule::new("water");
//! mol.add_atom(Atom::new("O", Element::OXYGEN));
//! mol.add_atom(Atom::new("H1", Element::HYDROGEN).at(0.96, 0.0, 0.0));
//!
//! let mut engine = ScriptEngine::new(Arc::new(mol));
//! let out = SharedOutput::new();
//! engine.set_output(Box::new(out.clone()));
//!
//! let result = engine.run("select hydrogen\nprint {selected}.size").unwrap();
//! assert_eq!(result, ExecutionResult::Completed);
//! assert_eq!(out.lines(), ["1"]);
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod eval;
pub mod output;
pub mod runner;
pub mod schedule;
pub mod selection;
pub mod settings;

pub use context::ExecutionContext;
pub use engine::{EngineState, ExecutionResult, ScriptEngine};
pub use error::{RuntimeError, RuntimeResult, ScriptError, ScriptResult};
pub use eval::{Environment, Evaluator};
pub use output::{LogOutput, OutputKind, OutputSink, SharedOutput};
pub use runner::ScriptRunner;
pub use schedule::{FrameScheduler, HaltToken};
pub use selection::{ListenerId, SelectionEngine, SelectionListener, SelectionSnapshot};
pub use settings::EngineSettings;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::engine::{EngineState, ExecutionResult, ScriptEngine};
    pub use crate::error::{ScriptError, ScriptResult};
    pub use crate::output::{OutputKind, OutputSink, SharedOutput};
    pub use crate::runner::ScriptRunner;
    pub use crate::selection::SelectionListener;
}
