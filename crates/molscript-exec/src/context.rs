//! Execution contexts
//!
//! One context per running statement list: the top-level script, or one
//! active user-function call. A context owns its program counter, its local
//! variables and the `for` loops whose initializer already ran.

use std::sync::Arc;

use ahash::AHashMap;
use molscript_lang::{FunctionDef, Statement, Token, TokenFlags, TokenKind, TokenValue, Value};

use crate::error::{RuntimeError, RuntimeResult, ScriptError, ScriptResult};

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    statements: Arc<[Statement]>,
    pc: usize,
    /// Lowercased names
    locals: AHashMap<String, Value>,
    /// Heads of the `for` loops currently iterating
    active_for: Vec<usize>,
    return_value: Option<Value>,
    /// Name of the user function, `None` at top level
    function: Option<String>,
    syntax_check: bool,
}

impl ExecutionContext {
    pub fn new(statements: impl Into<Arc<[Statement]>>) -> Self {
        ExecutionContext {
            statements: statements.into(),
            pc: 0,
            locals: AHashMap::new(),
            active_for: Vec::new(),
            return_value: None,
            function: None,
            syntax_check: false,
        }
    }

    /// Context for a call; missing arguments bind to the empty string
    pub fn for_function(def: &FunctionDef, body: Arc<[Statement]>, args: Vec<Value>) -> Self {
        let mut context = Self::new(body);
        context.function = Some(def.name.clone());
        let mut args = args.into_iter();
        for param in &def.params {
            context.declare(param, args.next().unwrap_or_default());
        }
        context
    }

    /// Context that is only walked by [`syntax_check`](Self::syntax_check)
    pub fn for_syntax_check(statements: impl Into<Arc<[Statement]>>) -> Self {
        let mut context = Self::new(statements);
        context.syntax_check = true;
        context
    }

    pub fn is_syntax_check(&self) -> bool {
        self.syntax_check
    }

    pub fn statements(&self) -> Arc<[Statement]> {
        Arc::clone(&self.statements)
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn jump(&mut self, pc: usize) {
        self.pc = pc;
    }

    pub fn is_finished(&self) -> bool {
        self.pc >= self.statements.len()
    }

    pub fn function_name(&self) -> Option<&str> {
        self.function.as_deref()
    }

    pub fn is_function(&self) -> bool {
        self.function.is_some()
    }

    pub fn local(&self, name: &str) -> Option<&Value> {
        self.locals.get(&name.to_ascii_lowercase())
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.locals.contains_key(&name.to_ascii_lowercase())
    }

    /// Create or overwrite a local
    pub fn declare(&mut self, name: &str, value: Value) {
        self.locals.insert(name.to_ascii_lowercase(), value);
    }

    /// `true` when `head`'s initializer already ran
    pub fn in_loop(&self, head: usize) -> bool {
        self.active_for.contains(&head)
    }

    pub fn enter_loop(&mut self, head: usize) {
        if !self.in_loop(head) {
            self.active_for.push(head);
        }
    }

    pub fn leave_loop(&mut self, head: usize) {
        self.active_for.retain(|&h| h != head);
    }

    /// Stop after the current statement with an optional result
    pub fn finish(&mut self, value: Option<Value>) {
        self.return_value = value;
        self.pc = self.statements.len();
    }

    pub fn take_return(&mut self) -> Option<Value> {
        self.return_value.take()
    }

    /// Walk every statement without running it, checking that each
    /// expression span leaves exactly one value and that each command has
    /// the operands it needs
    pub fn syntax_check(&self) -> ScriptResult<()> {
        for st in self.statements.iter() {
            check_statement(st).map_err(|source| ScriptError::Runtime {
                line: st.line,
                command: st.text.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

fn check_statement(st: &Statement) -> RuntimeResult<()> {
    let Some(command) = st.command() else {
        return Ok(());
    };
    let spans = st.expressions();
    for span in &spans {
        check_span(span)?;
    }
    let (names, needed) = match command {
        TokenKind::DEFINE | TokenKind::VAR | TokenKind::SET | TokenKind::ASSIGN => (1, 1),
        TokenKind::FOR => (2, 3),
        TokenKind::PRINT
        | TokenKind::DELAY
        | TokenKind::EVALUATE
        | TokenKind::IF
        | TokenKind::ELSEIF
        | TokenKind::WHILE => (0, 1),
        _ => (0, 0),
    };
    if st.names().len() < names || spans.len() < needed {
        return Err(RuntimeError::Malformed(st.text.clone()));
    }
    Ok(())
}

/// Simulated stack depth over one postfix span
fn check_span(span: &[Token]) -> RuntimeResult<()> {
    let mut depth = 0usize;
    for token in span {
        let (pops, pushes) = stack_effect(token);
        depth = depth
            .checked_sub(pops)
            .ok_or_else(|| RuntimeError::Malformed(token.to_string()))?
            + pushes;
    }
    if depth == 1 {
        Ok(())
    } else {
        Err(RuntimeError::Malformed(
            span.first().map(|t| t.to_string()).unwrap_or_default(),
        ))
    }
}

/// Operands consumed and values produced by one token
fn stack_effect(token: &Token) -> (usize, usize) {
    let kind = token.kind;
    let count = || usize::try_from(token.int_value).unwrap_or(0);
    match kind {
        TokenKind::EXPRESSION_BEGIN | TokenKind::EXPRESSION_END => (0, 0),
        TokenKind::SUBSTRUCTURE => (0, 1),
        TokenKind::WITHIN | TokenKind::CONNECTED | TokenKind::NOT | TokenKind::UNARY_MINUS => (1, 1),
        TokenKind::INDEX => (if token.int_value == 2 { 3 } else { 2 }, 1),
        TokenKind::ARRAY => (count(), 1),
        _ if kind.has(TokenFlags::COMPARATOR) => match token.value {
            TokenValue::Comparison(_) => (0, 1),
            _ => (2, 1),
        },
        _ if kind.has(TokenFlags::LOGICAL) || kind.has(TokenFlags::MATH_OPERATOR) => {
            if kind.has(TokenFlags::UNARY) {
                // ++ and -- read their variable by name
                (0, 1)
            } else {
                (2, 1)
            }
        }
        _ if kind.has(TokenFlags::MATH_PROPERTY) => (1, 1),
        _ if kind.has(TokenFlags::MATH_FUNCTION) => (count(), 1),
        _ => (0, 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use molscript_lang::compile;

    fn context(script: &str) -> ExecutionContext {
        ExecutionContext::for_syntax_check(compile(script).unwrap().statements)
    }

    #[test]
    fn test_locals_are_case_insensitive() {
        let mut ctx = ExecutionContext::new(Vec::new());
        ctx.declare("Count", Value::Integer(3));
        assert!(ctx.has_local("count"));
        assert!(matches!(ctx.local("COUNT"), Some(Value::Integer(3))));
        assert!(ctx.is_finished());
        assert!(!ctx.is_function());
    }

    #[test]
    fn test_function_binds_params() {
        let program = compile("function f(a, b)\nreturn a\nend function").unwrap();
        let def = program.function("f").unwrap();
        let ctx = ExecutionContext::for_function(
            def,
            def.statements.clone().into(),
            vec![Value::Integer(1)],
        );
        assert_eq!(ctx.function_name(), Some("f"));
        assert!(matches!(ctx.local("a"), Some(Value::Integer(1))));
        assert!(matches!(ctx.local("b"), Some(Value::Text(s)) if s.is_empty()));
    }

    #[test]
    fn test_loop_tracking() {
        let mut ctx = ExecutionContext::new(Vec::new());
        ctx.enter_loop(2);
        ctx.enter_loop(2);
        assert!(ctx.in_loop(2));
        ctx.leave_loop(2);
        assert!(!ctx.in_loop(2));
    }

    #[test]
    fn test_syntax_check_accepts_valid_script() {
        let ctx = context(
            "var x = 1 + 2 * 3\nselect carbon and within(5.0, oxygen)\nfor (var i = 0; i < 3; i++)\nprint sprintf(\"%d\", i)\nend for",
        );
        assert!(ctx.is_syntax_check());
        assert!(ctx.syntax_check().is_ok());
    }

    #[test]
    fn test_syntax_check_reports_line() {
        let program = compile("print 1\nprint 2").unwrap();
        let mut statements = program.statements;
        // Drop the operand of the second print's expression
        let st = &mut statements[1];
        st.tokens.retain(|t| t.kind != TokenKind::INTEGER);
        let ctx = ExecutionContext::for_syntax_check(statements);
        let err = ctx.syntax_check().unwrap_err();
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn test_stack_effect() {
        let program = compile("print 1 + 2").unwrap();
        let spans = program.statements[0].expressions();
        assert!(check_span(spans[0]).is_ok());
        assert!(check_span(&spans[0][..2]).is_err());
    }
}
