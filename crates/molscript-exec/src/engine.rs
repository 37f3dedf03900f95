//! Script engine
//!
//! Runs compiled programs statement by statement against a model and a
//! [`SelectionEngine`]. The engine keeps a stack of [`ExecutionContext`]s:
//! the bottom one is the script being run, each one above it is an active
//! user-function call.
//!
//! A `delay` or `refresh` at top level suspends the script. The host then
//! calls [`ScriptEngine::tick`] once per rendered frame until it resumes.
//! Inside a function call a delay is skipped, since the call must return a
//! value to the expression that made it.

use std::sync::Arc;

use ahash::AHashMap;
use molscript_lang::{
    compile, FunctionDef, Program, Statement, Token, TokenKind, TokenValue, Value, INT_UNSET,
};
use molscript_mol::{AtomModel, AtomSet, Molecule};

use crate::context::ExecutionContext;
use crate::error::{RuntimeError, RuntimeResult, ScriptError, ScriptResult};
use crate::eval::{self, Environment};
use crate::output::{LogOutput, OutputKind, OutputSink};
use crate::schedule::{FrameScheduler, HaltToken};
use crate::selection::{ListenerId, SelectionEngine, SelectionListener, SelectionSnapshot};
use crate::settings::EngineSettings;

/// Nested user-function calls share one thread stack for this many levels
const CALLS_PER_STACK: usize = 4;

/// Stack reserved for each run of nested calls
const CALL_STACK_SIZE: usize = 16 * 1024 * 1024;

/// Lifecycle of the engine's current script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing has run yet, or the last script was halted
    Ready,
    Running,
    /// Waiting for frame ticks after a `delay` or `refresh`
    Suspended,
    /// The last script stopped on a runtime error
    Error,
    Completed,
}

/// Outcome of [`ScriptEngine::execute`] and [`ScriptEngine::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionResult {
    Completed,
    /// Still waiting; `frames` ticks remain
    Suspended { frames: u32 },
    Cancelled,
}

#[derive(Debug, Clone)]
struct DefinedSet {
    /// Spelling used in `define`
    name: String,
    tokens: Arc<[Token]>,
}

#[derive(Debug, Clone)]
struct UserFunction {
    def: Arc<FunctionDef>,
    body: Arc<[Statement]>,
}

/// What a statement asks the run loop to do next
enum Flow {
    Next,
    Jump(usize),
    Suspend(u32),
    Return,
    Exit,
}

/// Why a context stopped running
enum Stop {
    Finished,
    Suspended(u32),
    Exit,
}

/// A runtime error and the statement that raised it
struct Failure {
    error: RuntimeError,
    line: usize,
    command: String,
}

impl Failure {
    fn at(st: &Statement, error: RuntimeError) -> Self {
        Failure {
            error,
            line: st.line,
            command: st.text.clone(),
        }
    }
}

pub struct ScriptEngine {
    model: Arc<dyn AtomModel>,
    selection: SelectionEngine,
    settings: EngineSettings,
    /// Lowercased names
    globals: AHashMap<String, Value>,
    sets: AHashMap<String, DefinedSet>,
    functions: AHashMap<String, UserFunction>,
    frames: Vec<ExecutionContext>,
    status: EngineState,
    scheduler: FrameScheduler,
    halt: HaltToken,
    exiting: bool,
    last_error: Option<String>,
    output: Box<dyn OutputSink>,
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("atoms", &self.model.atom_count())
            .field("status", &self.status)
            .field("frames", &self.frames.len())
            .field("globals", &self.globals.len())
            .field("sets", &self.sets.len())
            .field("functions", &self.functions.len())
            .finish()
    }
}

impl ScriptEngine {
    pub fn new(model: Arc<dyn AtomModel>) -> Self {
        Self::with_settings(model, EngineSettings::default())
    }

    pub fn with_settings(model: Arc<dyn AtomModel>, settings: EngineSettings) -> Self {
        let mut engine = ScriptEngine {
            selection: SelectionEngine::new(model.atom_count()),
            model,
            settings,
            globals: AHashMap::new(),
            sets: AHashMap::new(),
            functions: AHashMap::new(),
            frames: Vec::new(),
            status: EngineState::Ready,
            scheduler: FrameScheduler::new(),
            halt: HaltToken::new(),
            exiting: false,
            last_error: None,
            output: Box::new(LogOutput),
        };
        engine.refresh_exclusions();
        engine
    }

    /// Send `print`, `echo` and `message` output to `sink`
    pub fn set_output(&mut self, sink: Box<dyn OutputSink>) {
        self.output = sink;
    }

    /// Replace the model; overlays and defined sets are cleared
    pub fn load_model(&mut self, model: Arc<dyn AtomModel>) {
        log::info!("loaded model with {} atoms", model.atom_count());
        self.model = model;
        self.selection.zap(self.model.atom_count());
        self.sets.clear();
        self.refresh_exclusions();
    }

    pub fn model(&self) -> &Arc<dyn AtomModel> {
        &self.model
    }

    pub fn selection(&self) -> &SelectionEngine {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut SelectionEngine {
        &mut self.selection
    }

    pub fn subscribe(&mut self, listener: Box<dyn SelectionListener>) -> ListenerId {
        self.selection.subscribe(listener)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut EngineSettings {
        &mut self.settings
    }

    pub fn status(&self) -> EngineState {
        self.status
    }

    /// Message of the error that stopped the last script
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Token that halts the running script from any thread
    pub fn halt_token(&self) -> HaltToken {
        self.halt.clone()
    }

    /// Global variable by name, case-insensitive
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(&name.to_ascii_lowercase())
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_ascii_lowercase(), value);
    }

    /// Names of the defined sets, in `define` spelling
    pub fn defined_sets(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sets.values().map(|s| s.name.as_str()).collect();
        names.sort_unstable_by_key(|n| n.to_ascii_lowercase());
        names
    }

    fn refresh_exclusions(&mut self) {
        let atoms = self.model.atoms();
        let hydrogens = AtomSet::from_fn(atoms.len(), |i| atoms[i].is_hydrogen());
        let hetero = AtomSet::from_fn(atoms.len(), |i| atoms[i].hetatm);
        self.selection.set_default_exclusions(hydrogens, hetero);
        self.sync_toggles();
    }

    fn sync_toggles(&mut self) {
        self.selection.select_hydrogen = self.settings.select_hydrogen;
        self.selection.select_hetero = self.settings.select_hetero;
    }

    // ----- running --------------------------------------------------------

    /// Compile and run a script
    pub fn run(&mut self, script: &str) -> ScriptResult<ExecutionResult> {
        let program = compile(script).map_err(|e| {
            self.status = EngineState::Error;
            self.last_error = Some(e.untranslated());
            ScriptError::from(e)
        })?;
        self.execute(program)
    }

    /// Run a compiled program until it completes, suspends or fails
    pub fn execute(&mut self, program: Program) -> ScriptResult<ExecutionResult> {
        if !self.frames.is_empty() {
            log::warn!("discarding unfinished script");
        }
        self.halt.reset();
        self.scheduler.cancel();
        self.exiting = false;
        self.last_error = None;
        for def in program.functions {
            log::debug!("registered function {}", def.name);
            self.functions.insert(
                def.name.to_ascii_lowercase(),
                UserFunction {
                    body: def.statements.clone().into(),
                    def,
                },
            );
        }
        self.frames.clear();
        self.frames.push(ExecutionContext::new(program.statements));
        self.status = EngineState::Running;
        self.drive()
    }

    /// Advance a suspended script by one frame
    pub fn tick(&mut self) -> ScriptResult<ExecutionResult> {
        if self.status != EngineState::Suspended {
            return Ok(ExecutionResult::Completed);
        }
        if self.halt.is_halted() {
            return Ok(self.cancelled());
        }
        if !self.scheduler.tick() {
            return Ok(ExecutionResult::Suspended {
                frames: self.scheduler.remaining(),
            });
        }
        self.status = EngineState::Running;
        self.drive()
    }

    /// Compile a script and check it without running any statement
    pub fn syntax_check(&self, script: &str) -> ScriptResult<()> {
        let program = compile(script)?;
        ExecutionContext::for_syntax_check(program.statements).syntax_check()?;
        for def in &program.functions {
            ExecutionContext::for_syntax_check(def.statements.clone()).syntax_check()?;
        }
        Ok(())
    }

    fn drive(&mut self) -> ScriptResult<ExecutionResult> {
        match self.run_frame() {
            Ok(Stop::Suspended(frames)) => {
                self.scheduler.suspend(frames);
                self.status = EngineState::Suspended;
                log::debug!("script suspended for {} frames", frames);
                Ok(ExecutionResult::Suspended { frames })
            }
            Ok(Stop::Finished | Stop::Exit) => {
                self.frames.clear();
                self.exiting = false;
                self.status = EngineState::Completed;
                log::debug!("script completed");
                Ok(ExecutionResult::Completed)
            }
            Err(Failure {
                error: RuntimeError::Halted,
                ..
            }) => Ok(self.cancelled()),
            Err(Failure {
                error,
                line,
                command,
            }) => {
                self.frames.clear();
                self.status = EngineState::Error;
                self.last_error = Some(error.to_string());
                log::error!("script error at line {}: {}", line, error);
                Err(ScriptError::Runtime {
                    line,
                    command,
                    source: error,
                })
            }
        }
    }

    fn cancelled(&mut self) -> ExecutionResult {
        log::info!("script halted");
        self.frames.clear();
        self.scheduler.cancel();
        self.status = EngineState::Ready;
        ExecutionResult::Cancelled
    }

    /// Run the innermost context until it finishes, suspends or fails
    fn run_frame(&mut self) -> Result<Stop, Failure> {
        let top_level = self.frames.last().is_some_and(|f| !f.is_function());
        loop {
            let Some(frame) = self.frames.last() else {
                return Ok(Stop::Finished);
            };
            let statements = frame.statements();
            let pc = frame.pc();
            let Some(st) = statements.get(pc) else {
                return Ok(Stop::Finished);
            };
            if self.halt.is_halted() {
                return Err(Failure::at(st, RuntimeError::Halted));
            }

            let flow = match self.dispatch(&statements, pc) {
                Ok(flow) => flow,
                Err(error) if self.is_recoverable(&error) => {
                    let message = format!("line {}: {}", st.line, error);
                    log::error!("{}", message);
                    self.output.write_line(OutputKind::Error, &message);
                    Flow::Next
                }
                Err(error) => return Err(Failure::at(st, error)),
            };
            if self.exiting {
                return Ok(Stop::Exit);
            }

            let Some(frame) = self.frames.last_mut() else {
                return Ok(Stop::Finished);
            };
            match flow {
                Flow::Next => frame.jump(pc + 1),
                Flow::Jump(target) => frame.jump(target),
                Flow::Return => return Ok(Stop::Finished),
                Flow::Exit => {
                    self.exiting = true;
                    return Ok(Stop::Exit);
                }
                Flow::Suspend(frames) => {
                    frame.jump(pc + 1);
                    if top_level && frames > 0 {
                        return Ok(Stop::Suspended(frames));
                    }
                    log::debug!("delay skipped inside function");
                }
            }
        }
    }

    /// Run a freshly pushed function frame
    ///
    /// Every `CALLS_PER_STACK` levels the call moves onto a scoped thread
    /// with its own stack, so recursion depth is bounded by `maxCallDepth`
    /// and not by the caller's stack size.
    fn run_call_frame(&mut self) -> Result<Stop, Failure> {
        let depth = self.frames.len();
        if depth % CALLS_PER_STACK != 0 {
            return self.run_frame();
        }
        std::thread::scope(|scope| {
            let spawned = std::thread::Builder::new()
                .name(format!("molscript-call-{}", depth))
                .stack_size(CALL_STACK_SIZE)
                .spawn_scoped(scope, || self.run_frame());
            match spawned {
                Ok(handle) => handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic)),
                Err(e) => {
                    log::error!("cannot start call stack at depth {}: {}", depth, e);
                    Err(Failure {
                        error: RuntimeError::CallDepthExceeded(depth),
                        line: 0,
                        command: String::new(),
                    })
                }
            }
        })
    }

    /// With `haltOnError` off, ordinary errors are reported and skipped
    fn is_recoverable(&self, error: &RuntimeError) -> bool {
        !self.settings.halt_on_error
            && !matches!(
                error,
                RuntimeError::Halted
                    | RuntimeError::CallDepthExceeded(_)
                    | RuntimeError::Function { .. }
            )
    }

    // ----- statements -----------------------------------------------------

    fn dispatch(&mut self, statements: &[Statement], pc: usize) -> RuntimeResult<Flow> {
        let st = &statements[pc];
        let Some(command) = st.command() else {
            return Ok(Flow::Next);
        };
        log::trace!("line {}: {}", st.line, st.text);
        let spans = st.expressions();
        let names = st.names();
        let span = |i: usize| {
            spans
                .get(i)
                .copied()
                .ok_or_else(|| RuntimeError::Malformed(st.text.clone()))
        };
        let name = |i: usize| {
            names
                .get(i)
                .copied()
                .ok_or_else(|| RuntimeError::Malformed(st.text.clone()))
        };

        match command {
            TokenKind::SELECT => {
                let atoms = self.optional_atoms(&spans)?;
                self.selection.select(atoms.as_ref(), false);
            }
            TokenKind::HIDE => {
                let atoms = self
                    .optional_atoms(&spans)?
                    .unwrap_or_else(|| AtomSet::new(self.model.atom_count()));
                self.selection.hide(&atoms, false);
            }
            TokenKind::DISPLAY => {
                let atoms = self
                    .optional_atoms(&spans)?
                    .unwrap_or_else(|| AtomSet::all(self.model.atom_count()));
                self.selection.display(&atoms, false);
            }
            TokenKind::RESTRICT => {
                let atoms = self.atoms(span(0)?)?;
                self.selection.select(Some(&atoms), false);
                self.selection.display(&atoms, false);
            }
            TokenKind::DELETE => {
                let atoms = self.atoms(span(0)?)?;
                let n = self.selection.delete_atoms(&atoms, false);
                log::info!("{} atoms deleted", n);
            }
            TokenKind::SUBSET => {
                let atoms = self.optional_atoms(&spans)?;
                self.selection.set_subset(atoms.as_ref(), false);
            }
            TokenKind::DEFINE => {
                let set_name = name(0)?;
                self.sets.insert(
                    set_name.to_ascii_lowercase(),
                    DefinedSet {
                        name: set_name.to_string(),
                        tokens: span(0)?.into(),
                    },
                );
                log::debug!("defined {}", set_name);
            }
            TokenKind::PRINT => {
                let value = self.value(span(0)?)?;
                self.output.write_line(OutputKind::Print, &value.as_string());
            }
            TokenKind::ECHO | TokenKind::MESSAGE => {
                let text = st.tokens.get(1).and_then(|t| t.text()).unwrap_or("");
                let kind = if command == TokenKind::ECHO {
                    OutputKind::Echo
                } else {
                    OutputKind::Message
                };
                self.output.write_line(kind, text);
            }
            TokenKind::VAR => {
                let value = self.value(span(0)?)?;
                self.declare(name(0)?, value);
            }
            TokenKind::SET => {
                let key = name(0)?;
                let value = self.value(span(0)?)?;
                if !self.settings.apply(key, &value) {
                    self.set_global(key, value);
                }
                self.sync_toggles();
            }
            TokenKind::ASSIGN => {
                let value = self.value(span(0)?)?;
                self.assign(name(0)?, value)?;
            }
            TokenKind::EVALUATE => {
                self.value(span(0)?)?;
            }
            TokenKind::DELAY => {
                let seconds = self.value(span(0)?)?.as_float();
                let frames = FrameScheduler::frames_for(seconds, self.settings.frame_rate);
                return Ok(Flow::Suspend(frames));
            }
            TokenKind::REFRESH => return Ok(Flow::Suspend(1)),
            TokenKind::ZAP => self.zap(),
            TokenKind::EXIT => return Ok(Flow::Exit),
            TokenKind::INVERT_SELECTION => self.selection.invert_selection(false),

            TokenKind::IF => {
                if !self.value(span(0)?)?.as_boolean() {
                    return self.next_clause(statements, target(&st.tokens[0])?);
                }
            }
            TokenKind::ELSEIF | TokenKind::ELSE => {
                // reached by falling out of the previous branch
                let endif = match &st.tokens[0].value {
                    TokenValue::Integer(i) => usize::try_from(*i).ok(),
                    _ => None,
                };
                let endif = endif.ok_or_else(|| RuntimeError::Malformed(st.text.clone()))?;
                return Ok(Flow::Jump(endif + 1));
            }
            TokenKind::ENDIF => {}
            TokenKind::WHILE => {
                if !self.value(span(0)?)?.as_boolean() {
                    return Ok(Flow::Jump(target(&st.tokens[0])? + 1));
                }
            }
            TokenKind::FOR => {
                let in_loop = self.frames.last().is_some_and(|f| f.in_loop(pc));
                if !in_loop {
                    let value = self.value(span(0)?)?;
                    self.assign(name(0)?, value)?;
                    if let Some(frame) = self.frames.last_mut() {
                        frame.enter_loop(pc);
                    }
                }
                if !self.value(span(1)?)?.as_boolean() {
                    if let Some(frame) = self.frames.last_mut() {
                        frame.leave_loop(pc);
                    }
                    return Ok(Flow::Jump(target(&st.tokens[0])? + 1));
                }
            }
            TokenKind::END => {
                let head = target(&st.tokens[0])?;
                let header = statements
                    .get(head)
                    .ok_or_else(|| RuntimeError::Malformed(st.text.clone()))?;
                if header.command() == Some(TokenKind::FOR) {
                    let spans = header.expressions();
                    let names = header.names();
                    let (Some(step), Some(var)) = (spans.get(2), names.get(1)) else {
                        return Err(RuntimeError::Malformed(header.text.clone()));
                    };
                    let value = self.value(step)?;
                    self.assign(var, value)?;
                }
                return Ok(Flow::Jump(head));
            }
            TokenKind::BREAK => {
                let end = target(&st.tokens[0])?;
                let head = statements.get(end).map(|e| target(&e.tokens[0])).transpose()?;
                if let (Some(head), Some(frame)) = (head, self.frames.last_mut()) {
                    frame.leave_loop(head);
                }
                return Ok(Flow::Jump(end + 1));
            }
            TokenKind::CONTINUE => return Ok(Flow::Jump(target(&st.tokens[0])?)),
            TokenKind::RETURN => {
                let value = spans.first().map(|s| self.value(s)).transpose()?;
                if let Some(frame) = self.frames.last_mut() {
                    frame.finish(value);
                }
                return Ok(Flow::Return);
            }
            other => return Err(RuntimeError::unsupported(other.name())),
        }
        Ok(Flow::Next)
    }

    /// Walk the `elseif` / `else` chain after a false condition
    fn next_clause(&mut self, statements: &[Statement], mut clause: usize) -> RuntimeResult<Flow> {
        loop {
            let Some(st) = statements.get(clause) else {
                return Ok(Flow::Jump(clause));
            };
            if st.command() != Some(TokenKind::ELSEIF) {
                // else or endif
                return Ok(Flow::Jump(clause + 1));
            }
            let condition = st
                .expressions()
                .first()
                .copied()
                .ok_or_else(|| RuntimeError::Malformed(st.text.clone()))?;
            if self.value(condition)?.as_boolean() {
                return Ok(Flow::Jump(clause + 1));
            }
            clause = target(&st.tokens[0])?;
        }
    }

    fn value(&mut self, span: &[Token]) -> RuntimeResult<Value> {
        eval::evaluate(self, span)
    }

    fn atoms(&mut self, span: &[Token]) -> RuntimeResult<AtomSet> {
        eval::evaluate_atoms(self, span)
    }

    fn optional_atoms(&mut self, spans: &[&[Token]]) -> RuntimeResult<Option<AtomSet>> {
        spans.first().map(|s| self.atoms(s)).transpose()
    }

    /// `var` binds in the innermost function call, or globally at top level
    fn declare(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) if frame.is_function() => frame.declare(name, value),
            _ => self.set_global(name, value),
        }
    }

    fn zap(&mut self) {
        log::info!("zap");
        self.model = Arc::new(Molecule::new(""));
        self.selection.zap(0);
        self.sets.clear();
        self.refresh_exclusions();
    }

    // ----- state ----------------------------------------------------------

    /// Script that rebuilds the current settings, sets and overlays
    pub fn state(&mut self) -> String {
        let mut lines = vec![
            format!("set selectHydrogen {}", self.settings.select_hydrogen),
            format!("set selectHetero {}", self.settings.select_hetero),
        ];

        let mut sets: Vec<DefinedSet> = self.sets.values().cloned().collect();
        sets.sort_unstable_by_key(|s| s.name.to_ascii_lowercase());
        for set in sets {
            match eval::evaluate_atoms(self, &set.tokens) {
                Ok(atoms) => lines.push(format!("define {} {}", set.name, atoms.to_escaped())),
                Err(e) => log::warn!("skipping set {} in state: {}", set.name, e),
            }
        }

        let deleted = self.selection.deleted();
        if !deleted.is_empty() {
            lines.push(format!("delete {}", deleted.to_escaped()));
        }
        let hidden = self.selection.hidden();
        lines.push(if hidden.is_empty() {
            "hide none".to_string()
        } else {
            format!("hide {}", hidden.to_escaped())
        });
        let selected = self.selection.selected();
        lines.push(if selected.is_empty() {
            "select none".to_string()
        } else {
            format!("select {}", selected.to_escaped())
        });
        if let Some(subset) = self.selection.subset() {
            lines.push(format!("subset {}", subset.to_escaped()));
        }
        lines.join("\n")
    }
}

/// Jump target linked into a flow token
fn target(token: &Token) -> RuntimeResult<usize> {
    usize::try_from(token.int_value)
        .ok()
        .filter(|_| token.int_value != INT_UNSET)
        .ok_or_else(|| RuntimeError::Malformed(token.to_string()))
}

impl Environment for ScriptEngine {
    fn model(&self) -> Arc<dyn AtomModel> {
        Arc::clone(&self.model)
    }

    fn selection(&self) -> SelectionSnapshot {
        self.selection.snapshot()
    }

    fn variable(&self, name: &str) -> Option<Value> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.local(name))
            .or_else(|| self.global(name))
            .cloned()
            .or_else(|| self.settings.get(name))
    }

    fn assign(&mut self, name: &str, value: Value) -> RuntimeResult<()> {
        match self.frames.iter_mut().rev().find(|f| f.has_local(name)) {
            Some(frame) => frame.declare(name, value),
            None => self.set_global(name, value),
        }
        Ok(())
    }

    fn defined_set(&self, name: &str) -> Option<Arc<[Token]>> {
        self.sets
            .get(&name.to_ascii_lowercase())
            .map(|s| Arc::clone(&s.tokens))
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        let function = self
            .functions
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| RuntimeError::UndefinedFunction(name.to_string()))?;
        let max = self.settings.max_call_depth;
        if self.frames.len() > max {
            return Err(RuntimeError::CallDepthExceeded(max));
        }

        self.frames.push(ExecutionContext::for_function(
            &function.def,
            Arc::clone(&function.body),
            args,
        ));
        let result = self.run_call_frame();
        let mut frame = self
            .frames
            .pop()
            .ok_or_else(|| RuntimeError::Malformed(name.to_string()))?;

        match result {
            Ok(_) => Ok(frame.take_return().unwrap_or_default()),
            Err(Failure { error, line, .. }) => Err(match error {
                e @ (RuntimeError::Halted
                | RuntimeError::CallDepthExceeded(_)
                | RuntimeError::Function { .. }) => e,
                e => RuntimeError::Function {
                    name: function.def.name.clone(),
                    line,
                    message: e.to_string(),
                },
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SharedOutput;

    const WATER_BOX: &str = r#"{
        "name": "box",
        "atoms": [
            {"name": "O", "element": "O", "resn": "HOH", "resv": 1, "chain": "A", "coord": [0.0, 0.0, 0.0], "hetatm": true},
            {"name": "H1", "element": "H", "resn": "HOH", "resv": 1, "chain": "A", "coord": [0.9, 0.0, 0.0], "hetatm": true},
            {"name": "H2", "element": "H", "resn": "HOH", "resv": 1, "chain": "A", "coord": [0.0, 0.9, 0.0], "hetatm": true},
            {"name": "CA", "element": "C", "resn": "ALA", "resv": 2, "chain": "A", "coord": [5.0, 0.0, 0.0]}
        ],
        "bonds": [{"a": 0, "b": 1}, {"a": 0, "b": 2}]
    }"#;

    fn engine() -> (ScriptEngine, SharedOutput) {
        let model = Molecule::from_json(WATER_BOX).unwrap();
        let mut engine = ScriptEngine::new(Arc::new(model));
        let out = SharedOutput::new();
        engine.set_output(Box::new(out.clone()));
        (engine, out)
    }

    #[test]
    fn test_select_and_print() {
        let (mut engine, out) = engine();
        let result = engine.run("select carbon\nprint {selected}.size").unwrap();
        assert_eq!(result, ExecutionResult::Completed);
        assert_eq!(out.lines(), ["1"]);
        assert_eq!(engine.status(), EngineState::Completed);
    }

    #[test]
    fn test_if_else_chain() {
        let (mut engine, out) = engine();
        engine
            .run("k = 2\nif (k == 1)\nprint \"one\"\nelse if (k == 2)\nprint \"two\"\nelse\nprint \"many\"\nend if\nprint \"done\"")
            .unwrap();
        assert_eq!(out.lines(), ["two", "done"]);
    }

    #[test]
    fn test_while_loop() {
        let (mut engine, out) = engine();
        engine
            .run("n = 0\nwhile (n < 3)\nn = n + 1\nend while\nprint n")
            .unwrap();
        assert_eq!(out.lines(), ["3"]);
    }

    #[test]
    fn test_var_in_function_is_local() {
        let (mut engine, out) = engine();
        engine
            .run("k = 1\nfunction f()\nvar k = 5\nreturn k\nend function\nprint f()\nprint k")
            .unwrap();
        assert_eq!(out.lines(), ["5", "1"]);
    }

    #[test]
    fn test_set_updates_settings() {
        let (mut engine, _) = engine();
        engine.run("set selectHydrogen false\nset frameRate 10\nset myValue 4").unwrap();
        assert!(!engine.settings().select_hydrogen);
        assert!(!engine.selection().select_hydrogen);
        assert_eq!(engine.settings().frame_rate, 10);
        assert!(matches!(engine.global("myvalue"), Some(Value::Integer(4))));
    }

    #[test]
    fn test_error_stops_script() {
        let (mut engine, out) = engine();
        let err = engine.run("print 1\nprint nothing + 1\nprint 3").unwrap_err();
        assert_eq!(err.line(), Some(2));
        assert_eq!(out.lines(), ["1"]);
        assert_eq!(engine.status(), EngineState::Error);
        assert!(engine.last_error().is_some());
    }

    #[test]
    fn test_error_skipped_without_halt_on_error() {
        let (mut engine, out) = engine();
        engine.settings_mut().halt_on_error = false;
        let result = engine.run("print 1\nprint nothing + 1\nprint 3").unwrap();
        assert_eq!(result, ExecutionResult::Completed);
        assert_eq!(out.lines_of(OutputKind::Print), ["1", "3"]);
        assert_eq!(out.lines_of(OutputKind::Error).len(), 1);
    }

    #[test]
    fn test_exit_stops_script() {
        let (mut engine, out) = engine();
        engine.run("print 1\nexit\nprint 2").unwrap();
        assert_eq!(out.lines(), ["1"]);
        assert_eq!(engine.status(), EngineState::Completed);
    }

    #[test]
    fn test_zap_clears_model_and_sets() {
        let (mut engine, _) = engine();
        engine.run("define wet water\nzap").unwrap();
        assert_eq!(engine.model().atom_count(), 0);
        assert!(engine.defined_sets().is_empty());
    }

    #[test]
    fn test_state_lists_defined_sets() {
        let (mut engine, _) = engine();
        engine.run("define Heavy not hydrogen\nselect Heavy").unwrap();
        let state = engine.state();
        assert!(state.contains("define Heavy ({0 3})"));
        assert!(state.contains("select ({0 3})"));
        assert!(state.contains("hide none"));
    }

    #[test]
    fn test_syntax_check() {
        let (engine, _) = engine();
        assert!(engine.syntax_check("select water\nprint 1 + 2").is_ok());
        assert!(matches!(
            engine.syntax_check("while (1)"),
            Err(ScriptError::Compile(_))
        ));
    }
}
