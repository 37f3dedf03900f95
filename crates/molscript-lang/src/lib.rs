//! Molscript language front end
//!
//! Everything between script text and the values an evaluator works with:
//!
//! - [`token`] - packed [`TokenKind`]s answering attribute questions by mask
//! - [`keywords`] - the immutable [`KeywordRegistry`]
//! - [`lexer`] - `nom` tokenizer splitting a script into statements
//! - [`compiler`] - infix to postfix [`Compiler`]
//! - [`program`] - linked [`Program`]s with resolved jump targets
//! - [`value`] - the [`Value`] / [`Variable`] runtime and its coercions
//! - [`format`] - `sprintf` directives
//!
//! # Example
//!
//! ```rust
//! use molscript_lang::{compile, TokenKind};
//!
//! let program = compile("select carbon and not hydrogen").unwrap();
//! assert_eq!(program.statements.len(), 1);
//! assert_eq!(program.statements[0].command(), Some(TokenKind::SELECT));
//!
//! let postfix: Vec<String> = program.statements[0].expressions()[0]
//!     .iter()
//!     .map(|t| t.to_string())
//!     .collect();
//! assert_eq!(postfix, ["elementSet", "hydrogen", "not", "and"]);
//! ```

pub mod compiler;
pub mod error;
pub mod format;
pub mod keywords;
pub mod lexer;
pub mod program;
pub mod token;
pub mod value;

pub use compiler::{Compiler, Mode};
pub use error::{
    CompileError, CompileErrorKind, CompileResult, English, SourceLocation, Translator,
    ValueError, ValueResult,
};
pub use format::sprintf;
pub use keywords::KeywordRegistry;
pub use program::{FunctionDef, Program, Statement};
pub use token::{Token, TokenFlags, TokenKind, TokenValue, INT_UNSET};
pub use value::{Selection, Selector, UserValue, Value, Variable};

/// Compile a script with the process-wide keyword registry
pub fn compile(script: &str) -> CompileResult<Program> {
    Compiler::default().compile(script)
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::compiler::{Compiler, Mode};
    pub use crate::error::{CompileError, CompileResult};
    pub use crate::program::{Program, Statement};
    pub use crate::token::{Token, TokenKind};
    pub use crate::value::{Value, Variable};
    pub use crate::compile;
}
