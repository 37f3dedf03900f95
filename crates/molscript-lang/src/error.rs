//! Compile-time and value-runtime error types
//!
//! A [`CompileError`] names the failing clause through its
//! [`CompileErrorKind`], the offending token text and an optional second
//! substitution parameter. Messages exist in two forms: the untranslated
//! English template and a translated one produced by a host [`Translator`].

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

/// Malformed-input categories reported by the compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileErrorKind {
    BadArgumentCount,
    BadContext,
    CommandExpected,
    CoordinateExpected,
    EndOfCommandUnexpected,
    EndOfExpressionExpected,
    InvalidAtomSpecification,
    InvalidChainSpecification,
    InvalidModelSpecification,
    MissingEnd,
    NumberExpected,
    NumberOrVariableNameExpected,
    ResidueSpecificationExpected,
    TokenExpected,
    TokenUnexpected,
    UnrecognizedExpressionToken,
    UnrecognizedParameter,
    UnrecognizedToken,
}

impl CompileErrorKind {
    /// English message template; `{0}` is the token, `{1}` the extra parameter
    pub fn template(&self) -> &'static str {
        match self {
            CompileErrorKind::BadArgumentCount => "bad argument count",
            CompileErrorKind::BadContext => "invalid context for {0}",
            CompileErrorKind::CommandExpected => "command expected",
            CompileErrorKind::CoordinateExpected => "{ number number number } expected",
            CompileErrorKind::EndOfCommandUnexpected => "unexpected end of script command",
            CompileErrorKind::EndOfExpressionExpected => "end of expression expected",
            CompileErrorKind::InvalidAtomSpecification => "invalid atom specification",
            CompileErrorKind::InvalidChainSpecification => "invalid chain specification",
            CompileErrorKind::InvalidModelSpecification => "invalid model specification",
            CompileErrorKind::MissingEnd => "missing END for {0}",
            CompileErrorKind::NumberExpected => "number expected",
            CompileErrorKind::NumberOrVariableNameExpected => "number or variable name expected",
            CompileErrorKind::ResidueSpecificationExpected => {
                "residue specification (ALA, AL?, A*) expected"
            }
            CompileErrorKind::TokenExpected => "{0} expected",
            CompileErrorKind::TokenUnexpected => "{0} unexpected",
            CompileErrorKind::UnrecognizedExpressionToken => "unrecognized expression token: {0}",
            CompileErrorKind::UnrecognizedParameter => "unrecognized {0} parameter: {1}",
            CompileErrorKind::UnrecognizedToken => "unrecognized token: {0}",
        }
    }
}

/// Localization hook supplied by the host
pub trait Translator {
    fn translate<'a>(&self, template: &'a str) -> Cow<'a, str>;
}

/// Identity translation
#[derive(Debug, Default, Clone, Copy)]
pub struct English;

impl Translator for English {
    fn translate<'a>(&self, template: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(template)
    }
}

/// Where in the script an error happened
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    /// 1-based line number
    pub line: usize,
    /// Byte offsets of the failing statement
    pub start: usize,
    pub end: usize,
    /// Text of the failing statement
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    /// Offending token text (`{0}`)
    pub token: String,
    /// Optional second substitution parameter (`{1}`)
    pub detail: Option<String>,
    pub location: SourceLocation,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, token: impl Into<String>) -> Self {
        CompileError {
            kind,
            token: token.into(),
            detail: None,
            location: SourceLocation::default(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    fn fill(&self, template: &str) -> String {
        template
            .replace("{0}", &self.token)
            .replace("{1}", self.detail.as_deref().unwrap_or(""))
    }

    pub fn untranslated(&self) -> String {
        self.fill(self.kind.template())
    }

    pub fn translated(&self, translator: &dyn Translator) -> String {
        self.fill(&translator.translate(self.kind.template()))
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.untranslated())?;
        if self.location.line > 0 {
            write!(f, " (line {}: {})", self.location.line, self.location.command)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

/// Failures of value operations that are not total
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("cannot apply {op} to {left} and {right}")]
    IncompatibleOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("cannot apply {op} to {operand}")]
    IncompatibleOperand { op: &'static str, operand: &'static str },
}

pub type CompileResult<T> = Result<T, CompileError>;

pub type ValueResult<T> = Result<T, ValueError>;

#[cfg(test)]
mod tests {
    use super::*;

    struct Shouting;

    impl Translator for Shouting {
        fn translate<'a>(&self, template: &'a str) -> Cow<'a, str> {
            Cow::Owned(template.to_uppercase())
        }
    }

    #[test]
    fn test_message_forms() {
        let err = CompileError::new(CompileErrorKind::TokenExpected, ")");
        assert_eq!(err.untranslated(), ") expected");
        assert_eq!(err.translated(&English), ") expected");
        assert_eq!(err.translated(&Shouting), ") EXPECTED");
    }

    #[test]
    fn test_second_parameter() {
        let err = CompileError::new(CompileErrorKind::UnrecognizedParameter, "within")
            .with_detail("foo");
        assert_eq!(err.untranslated(), "unrecognized within parameter: foo");
    }

    #[test]
    fn test_display_includes_location() {
        let err = CompileError::new(CompileErrorKind::CommandExpected, "").at(SourceLocation {
            line: 3,
            start: 10,
            end: 15,
            command: "12345".to_string(),
        });
        assert_eq!(err.to_string(), "command expected (line 3: 12345)");
    }
}
