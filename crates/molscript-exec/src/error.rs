//! Error types for script execution

use molscript_lang::{CompileError, ValueError};
use molscript_mol::ModelError;
use thiserror::Error;

/// Result type for evaluation
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Result type for whole-script operations
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Failures while evaluating a statement
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("undefined function: {0}")]
    UndefinedFunction(String),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("{0} expected, got {1}")]
    TypeMismatch(&'static str, &'static str),

    #[error("invalid argument for {name}: {reason}")]
    BadArgument { name: String, reason: String },

    #[error("maximum call depth ({0}) exceeded")]
    CallDepthExceeded(usize),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("malformed expression near {0}")]
    Malformed(String),

    #[error("defined set {0} refers to itself")]
    RecursiveDefinition(String),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("in function {name}, line {line}: {message}")]
    Function {
        name: String,
        line: usize,
        message: String,
    },

    /// Halt observed while a nested context was running
    #[error("halted")]
    Halted,
}

impl RuntimeError {
    pub fn bad_argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        RuntimeError::BadArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        RuntimeError::Unsupported(what.into())
    }
}

/// Failures of a script as a whole
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("line {line} ({command}): {source}")]
    Runtime {
        line: usize,
        command: String,
        #[source]
        source: RuntimeError,
    },

    #[error("script cancelled")]
    Cancelled,
}

impl ScriptError {
    /// Message without location, as shown to a host
    pub fn untranslated(&self) -> String {
        match self {
            ScriptError::Compile(e) => e.untranslated(),
            ScriptError::Runtime { source, .. } => source.to_string(),
            ScriptError::Cancelled => "script cancelled".to_string(),
        }
    }

    /// 1-based line of the failing statement, when known
    pub fn line(&self) -> Option<usize> {
        match self {
            ScriptError::Compile(e) if e.location.line > 0 => Some(e.location.line),
            ScriptError::Runtime { line, .. } => Some(*line),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RuntimeError::UndefinedVariable("x".to_string());
        assert_eq!(err.to_string(), "undefined variable: x");

        let err = ScriptError::Runtime {
            line: 3,
            command: "print 1/0".to_string(),
            source: RuntimeError::Value(ValueError::DivisionByZero),
        };
        assert_eq!(err.to_string(), "line 3 (print 1/0): division by zero");
        assert_eq!(err.untranslated(), "division by zero");
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn test_compile_error_converts() {
        let compile = molscript_lang::compile("while (1)").unwrap_err();
        let err = ScriptError::from(compile);
        assert_eq!(err.untranslated(), "missing END for while");
        assert_eq!(err.line(), Some(1));
    }
}
