//! Expression compiler
//!
//! Translates each tokenized statement into its executable form: command
//! structure tokens stay infix, every expression span becomes a postfix run
//! between `EXPRESSION_BEGIN` and `EXPRESSION_END`. There is no syntax
//! tree; each clause method consumes tokens from a cursor, appends postfix
//! to a shared buffer and fails fast with a [`CompileError`].
//!
//! Atom expressions and math expressions share the logical tier
//! (`or`/`xor`/`tog` < `and` < `not`). Below it, atom mode dispatches to
//! selection primitives (predefined sets, comparators, residue specs,
//! `within`, `connected`, ...), while math mode climbs through comparators,
//! `+ -`, `* / %`, unary operators and postfix selectors.

use lin_alg::f32::Vec3;
use molscript_mol::Element;

use crate::error::{CompileError, CompileErrorKind, CompileResult};
use crate::keywords::KeywordRegistry;
use crate::lexer::{tokenize, LexedStatement, LexedToken};
use crate::program::{Program, Statement};
use crate::token::{
    Comparison, ConnectedSpec, Operand, SeqCode, Token, TokenFlags, TokenKind, TokenValue,
    WithinKey, WithinMode, WithinSpec, WithinTarget, EXPRESSION_ATOM, EXPRESSION_MATH,
};

/// Which grammar an expression span follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Boolean predicate over atoms
    Atom,
    /// Value arithmetic
    Math,
}

/// Script compiler bound to a keyword registry
#[derive(Debug, Clone, Copy)]
pub struct Compiler<'r> {
    registry: &'r KeywordRegistry,
}

impl Default for Compiler<'static> {
    fn default() -> Self {
        Compiler::new(KeywordRegistry::global())
    }
}

impl<'r> Compiler<'r> {
    pub fn new(registry: &'r KeywordRegistry) -> Self {
        Compiler { registry }
    }

    /// Compile and link a whole script
    pub fn compile(&self, source: &str) -> CompileResult<Program> {
        let lexed = tokenize(source, self.registry)?;
        let statements = lexed
            .iter()
            .map(|st| self.compile_statement(source, st))
            .collect::<CompileResult<Vec<_>>>()?;
        Program::link(statements)
    }

    fn compile_statement(&self, source: &str, st: &LexedStatement) -> CompileResult<Statement> {
        let tokens = statement_tokens(self.registry, source, &st.tokens).map_err(|e| {
            if e.location.line == 0 {
                e.at(st.location(source))
            } else {
                e
            }
        })?;
        log::debug!("line {}: compiled {} tokens", st.line, tokens.len());
        Ok(Statement {
            tokens,
            line: st.line,
            start: st.start,
            end: st.end,
            text: st.text(source).to_string(),
        })
    }

    /// Compile a bare expression to postfix, without command structure
    pub fn compile_expression(&self, source: &str, mode: Mode) -> CompileResult<Vec<Token>> {
        let lexed = tokenize(source, self.registry)?;
        let st = match lexed.as_slice() {
            [st] => st,
            [] => return Err(CompileError::new(CompileErrorKind::EndOfCommandUnexpected, "")),
            [_, second, ..] => {
                return Err(CompileError::new(
                    CompileErrorKind::EndOfExpressionExpected,
                    second.text(source),
                ))
            }
        };
        let mut c = Clauses::new(self.registry, source, &st.tokens);
        c.comma_as_or = mode == Mode::Atom;
        c.clause_or(mode)?;
        c.finish()?;
        Ok(c.out)
    }
}

/// Compile one statement's tokens
fn statement_tokens(
    registry: &KeywordRegistry,
    source: &str,
    input: &[LexedToken],
) -> CompileResult<Vec<Token>> {
    let mut c = Clauses::new(registry, source, input);
    let Some(kind) = c.peek_kind() else {
        return Err(CompileError::new(CompileErrorKind::CommandExpected, ""));
    };
    if !kind.is_command() {
        c.assignment_or_call()?;
        c.finish()?;
        return Ok(c.out);
    }
    c.pos += 1;

    if kind.has(TokenFlags::ATOM_EXPRESSION_COMMAND) {
        c.command_atom(kind)?;
    } else if kind.has(TokenFlags::IMPLICIT_STRING_COMMAND) {
        c.out.push(Token::keyword(kind));
        match c.peek() {
            Some(t) if t.is(TokenKind::STRING) => {
                c.out.push(t.clone());
                c.pos += 1;
            }
            _ => c.out.push(Token::string("")),
        }
    } else if kind.has(TokenFlags::MATH_EXPRESSION_COMMAND) {
        c.command_math(kind)?;
    } else if kind.has(TokenFlags::FLOW_COMMAND) {
        c.command_flow(kind)?;
    } else {
        c.out.push(Token::keyword(kind));
    }
    c.finish()?;
    Ok(c.out)
}

/// Cursor over one statement plus the growing output buffer
struct Clauses<'s> {
    registry: &'s KeywordRegistry,
    source: &'s str,
    input: &'s [LexedToken],
    pos: usize,
    out: Vec<Token>,
    /// A bare comma acts as OR
    comma_as_or: bool,
    /// A string literal clause has been seen; commas stop meaning OR
    have_string: bool,
    /// Numeric brace groups may be read as points and planes
    coordinates: bool,
}

impl<'s> Clauses<'s> {
    fn new(registry: &'s KeywordRegistry, source: &'s str, input: &'s [LexedToken]) -> Self {
        Clauses {
            registry,
            source,
            input,
            pos: 0,
            out: Vec::new(),
            comma_as_or: false,
            have_string: false,
            coordinates: true,
        }
    }

    // ----- cursor helpers -------------------------------------------------

    fn peek(&self) -> Option<&'s Token> {
        self.input.get(self.pos).map(|t| &t.token)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.kind_at(self.pos)
    }

    fn kind_at(&self, i: usize) -> Option<TokenKind> {
        self.input.get(i).map(|t| t.token.kind)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn text_at(&self, i: usize) -> &'s str {
        self.input
            .get(i)
            .and_then(|t| self.source.get(t.start..t.end))
            .unwrap_or("")
    }

    /// Source word at `i` when the token is an identifier or a word-like keyword
    fn word_at(&self, i: usize) -> Option<&'s str> {
        let kind = self.input.get(i)?.token.kind;
        if kind == TokenKind::STRING || kind == TokenKind::INTEGER || kind == TokenKind::DECIMAL {
            return None;
        }
        let text = self.text_at(i);
        text.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_')
            .then_some(text)
    }

    /// Token `i` starts exactly where token `i - 1` ends
    fn adjacent(&self, i: usize) -> bool {
        i > 0
            && match (self.input.get(i - 1), self.input.get(i)) {
                (Some(a), Some(b)) => a.end == b.start,
                _ => false,
            }
    }

    fn is_assign_sign(&self, i: usize) -> bool {
        self.input
            .get(i)
            .is_some_and(|t| t.token.is(TokenKind::OP_EQ) && t.token.text() == Some("="))
    }

    /// Error for whatever sits at the cursor
    fn unexpected(&self, kind: CompileErrorKind) -> CompileError {
        if self.at_end() {
            CompileError::new(CompileErrorKind::EndOfCommandUnexpected, "")
        } else {
            CompileError::new(kind, self.text_at(self.pos))
        }
    }

    /// `what expected`, or end-of-command when nothing is left
    fn expected(&self, what: &str) -> CompileError {
        if self.at_end() {
            CompileError::new(CompileErrorKind::EndOfCommandUnexpected, "")
        } else {
            CompileError::new(CompileErrorKind::TokenExpected, what)
        }
    }

    fn expect(&mut self, kind: TokenKind) -> CompileResult<()> {
        if self.at(kind) {
            self.pos += 1;
            Ok(())
        } else if self.at_end() {
            Err(CompileError::new(CompileErrorKind::EndOfCommandUnexpected, ""))
        } else {
            Err(CompileError::new(CompileErrorKind::TokenExpected, kind.name()))
        }
    }

    fn take_word(&mut self) -> CompileResult<&'s str> {
        match self.word_at(self.pos) {
            Some(w) => {
                self.pos += 1;
                Ok(w)
            }
            None => Err(self.unexpected(CompileErrorKind::TokenUnexpected)),
        }
    }

    fn finish(&self) -> CompileResult<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(CompileError::new(
                CompileErrorKind::EndOfExpressionExpected,
                self.text_at(self.pos),
            ))
        }
    }

    /// Optionally signed numeric literal; consumes nothing when absent
    fn signed_number(&mut self) -> Option<f32> {
        let negative = self.at(TokenKind::MINUS);
        let at = self.pos + usize::from(negative);
        let value = self.input.get(at)?.token.number()?;
        self.pos = at + 1;
        Some(if negative { -value } else { value })
    }

    /// Optionally signed comparison literal; integers keep their exact value
    fn signed_operand(&mut self) -> Option<Operand> {
        let negative = self.at(TokenKind::MINUS);
        let at = self.pos + usize::from(negative);
        let operand = match self.input.get(at)?.token.value {
            TokenValue::Integer(n) if negative => Operand::Integer(n.checked_neg()?),
            TokenValue::Integer(n) => Operand::Integer(n),
            TokenValue::Decimal(x) if negative => Operand::Decimal(-x),
            TokenValue::Decimal(x) => Operand::Decimal(x),
            _ => return None,
        };
        self.pos = at + 1;
        Some(operand)
    }

    // ----- statement forms ------------------------------------------------

    fn atom_expression(&mut self) -> CompileResult<()> {
        self.out
            .push(Token::with_int(TokenKind::EXPRESSION_BEGIN, EXPRESSION_ATOM));
        self.clause_or(Mode::Atom)?;
        self.out.push(Token::keyword(TokenKind::EXPRESSION_END));
        Ok(())
    }

    fn math_expression(&mut self) -> CompileResult<()> {
        self.out
            .push(Token::with_int(TokenKind::EXPRESSION_BEGIN, EXPRESSION_MATH));
        self.clause_or(Mode::Math)?;
        self.out.push(Token::keyword(TokenKind::EXPRESSION_END));
        Ok(())
    }

    /// Expression block holding a single literal
    fn literal_expression(&mut self, token: Token) {
        self.out
            .push(Token::with_int(TokenKind::EXPRESSION_BEGIN, EXPRESSION_MATH));
        self.out.push(token);
        self.out.push(Token::keyword(TokenKind::EXPRESSION_END));
    }

    fn command_atom(&mut self, kind: TokenKind) -> CompileResult<()> {
        self.out.push(Token::keyword(kind));
        self.comma_as_or = true;
        if kind == TokenKind::DEFINE {
            let name = self.take_word()?;
            self.out.push(Token::identifier(name));
            if self.is_assign_sign(self.pos) {
                self.pos += 1;
            }
            self.coordinates = false;
        }
        if self.at_end() {
            return match kind {
                TokenKind::RESTRICT | TokenKind::DELETE | TokenKind::DEFINE => Err(
                    CompileError::new(CompileErrorKind::BadArgumentCount, kind.name()),
                ),
                _ => Ok(()),
            };
        }
        self.atom_expression()
    }

    fn command_math(&mut self, kind: TokenKind) -> CompileResult<()> {
        self.out.push(Token::keyword(kind));
        match kind {
            TokenKind::VAR => {
                let name = self.take_word()?;
                self.out.push(Token::identifier(name));
                if self.at_end() {
                    self.literal_expression(Token::string(""));
                    return Ok(());
                }
                if !self.is_assign_sign(self.pos) {
                    return Err(self.expected("="));
                }
                self.pos += 1;
                self.math_expression()
            }
            TokenKind::SET => {
                let name = self.take_word()?;
                self.out.push(Token::identifier(name));
                if self.is_assign_sign(self.pos) {
                    self.pos += 1;
                }
                self.math_expression()
            }
            TokenKind::DELAY if self.at_end() => {
                self.literal_expression(Token::integer(1));
                Ok(())
            }
            TokenKind::PRINT if self.at_end() => {
                self.literal_expression(Token::string(""));
                Ok(())
            }
            _ => self.math_expression(),
        }
    }

    fn command_flow(&mut self, kind: TokenKind) -> CompileResult<()> {
        match kind {
            TokenKind::IF | TokenKind::ELSEIF | TokenKind::WHILE => {
                self.out.push(Token::keyword(kind));
                self.math_expression()
            }
            TokenKind::ELSE if self.at(TokenKind::IF) => {
                self.pos += 1;
                self.out.push(Token::keyword(TokenKind::ELSEIF));
                self.math_expression()
            }
            TokenKind::END => {
                let block = self.take_word()?.to_ascii_lowercase();
                match block.as_str() {
                    "if" => self.out.push(Token::keyword(TokenKind::ENDIF)),
                    "while" | "for" | "function" => {
                        self.out.push(Token::new(TokenKind::END, TokenValue::Text(block)))
                    }
                    _ => {
                        return Err(CompileError::new(CompileErrorKind::UnrecognizedParameter, "end")
                            .with_detail(block))
                    }
                }
                Ok(())
            }
            TokenKind::FOR => {
                self.out.push(Token::keyword(kind));
                self.clause_for()
            }
            TokenKind::FUNCTION => {
                self.out.push(Token::keyword(kind));
                let name = self.take_word()?;
                self.out.push(Token::identifier(name));
                if self.at(TokenKind::LEFT_PAREN) {
                    self.pos += 1;
                    while !self.at(TokenKind::RIGHT_PAREN) {
                        let param = self.take_word()?;
                        self.out.push(Token::identifier(param));
                        if self.at(TokenKind::COMMA) {
                            self.pos += 1;
                        }
                    }
                    self.expect(TokenKind::RIGHT_PAREN)?;
                }
                Ok(())
            }
            TokenKind::RETURN => {
                self.out.push(Token::keyword(kind));
                if self.at_end() {
                    Ok(())
                } else {
                    self.math_expression()
                }
            }
            _ => {
                self.out.push(Token::keyword(kind));
                Ok(())
            }
        }
    }

    /// `for (init; condition; increment)`
    fn clause_for(&mut self) -> CompileResult<()> {
        self.expect(TokenKind::LEFT_PAREN)?;
        if self.at(TokenKind::VAR) {
            self.pos += 1;
        }
        let name = self.take_word()?;
        if !self.is_assign_sign(self.pos) {
            return Err(self.expected("="));
        }
        self.pos += 1;
        self.out.push(Token::identifier(name));
        self.math_expression()?;
        self.expect(TokenKind::SEMICOLON)?;
        self.math_expression()?;
        self.expect(TokenKind::SEMICOLON)?;
        self.clause_increment()?;
        self.expect(TokenKind::RIGHT_PAREN)
    }

    /// Increment of a `for` header: `i = expr`, `i++`, `i--`, `++i`, `--i`
    fn clause_increment(&mut self) -> CompileResult<()> {
        let prefix = self
            .peek_kind()
            .filter(|k| *k == TokenKind::PLUS_PLUS || *k == TokenKind::MINUS_MINUS);
        if prefix.is_some() {
            self.pos += 1;
        }
        let name = self.take_word()?;
        self.out.push(Token::identifier(name));
        let step = match prefix.or_else(|| {
            self.peek_kind()
                .filter(|k| *k == TokenKind::PLUS_PLUS || *k == TokenKind::MINUS_MINUS)
        }) {
            Some(step) => step,
            None => {
                if !self.is_assign_sign(self.pos) {
                    return Err(self.expected("="));
                }
                self.pos += 1;
                return self.math_expression();
            }
        };
        if prefix.is_none() {
            self.pos += 1;
        }
        let op = if step == TokenKind::PLUS_PLUS {
            TokenKind::PLUS
        } else {
            TokenKind::MINUS
        };
        self.out
            .push(Token::with_int(TokenKind::EXPRESSION_BEGIN, EXPRESSION_MATH));
        self.out.push(Token::identifier(name));
        self.out.push(Token::integer(1));
        self.out.push(Token::keyword(op));
        self.out.push(Token::keyword(TokenKind::EXPRESSION_END));
        Ok(())
    }

    /// `name = expr`, `f(args)`, `i++` and `++i`
    fn assignment_or_call(&mut self) -> CompileResult<()> {
        if let Some(name) = self.word_at(0) {
            if self.is_assign_sign(1) {
                self.pos = 2;
                self.out.push(Token::keyword(TokenKind::ASSIGN));
                self.out.push(Token::identifier(name));
                return self.math_expression();
            }
        }
        let first = self.peek_kind();
        let second = self.kind_at(1);
        let evaluates = matches!(first, Some(TokenKind::PLUS_PLUS | TokenKind::MINUS_MINUS))
            || (self.word_at(0).is_some()
                && matches!(
                    second,
                    Some(TokenKind::LEFT_PAREN | TokenKind::PLUS_PLUS | TokenKind::MINUS_MINUS)
                ));
        if !evaluates {
            return Err(CompileError::new(
                CompileErrorKind::CommandExpected,
                self.text_at(0),
            ));
        }
        self.out.push(Token::keyword(TokenKind::EVALUATE));
        self.math_expression()
    }

    // ----- logical tier ---------------------------------------------------

    fn clause_or(&mut self, mode: Mode) -> CompileResult<()> {
        self.clause_and(mode)?;
        loop {
            let op = match self.peek_kind() {
                Some(k @ (TokenKind::OR | TokenKind::XOR | TokenKind::TOGGLE)) => k,
                Some(TokenKind::COMMA)
                    if mode == Mode::Atom && self.comma_as_or && !self.have_string =>
                {
                    TokenKind::OR
                }
                _ => return Ok(()),
            };
            self.pos += 1;
            self.clause_and(mode)?;
            self.out.push(Token::keyword(op));
        }
    }

    fn clause_and(&mut self, mode: Mode) -> CompileResult<()> {
        self.clause_not(mode)?;
        while self.at(TokenKind::AND) {
            self.pos += 1;
            self.clause_not(mode)?;
            self.out.push(Token::keyword(TokenKind::AND));
        }
        Ok(())
    }

    fn clause_not(&mut self, mode: Mode) -> CompileResult<()> {
        if self.at(TokenKind::NOT) {
            self.pos += 1;
            self.clause_not(mode)?;
            self.out.push(Token::keyword(TokenKind::NOT));
            return Ok(());
        }
        match mode {
            Mode::Atom => self.clause_primitive(),
            Mode::Math => self.clause_comparison(),
        }
    }

    /// Run `f` with the comma-as-OR rule switched
    fn with_comma_or<T>(
        &mut self,
        enabled: bool,
        f: impl FnOnce(&mut Self) -> CompileResult<T>,
    ) -> CompileResult<T> {
        let saved = (self.comma_as_or, self.have_string);
        self.comma_as_or = enabled;
        if enabled {
            self.have_string = false;
        }
        let result = f(self);
        (self.comma_as_or, self.have_string) = saved;
        result
    }

    // ----- math tier ------------------------------------------------------

    fn clause_comparison(&mut self) -> CompileResult<()> {
        self.clause_additive()?;
        while let Some(kind) = self.peek_kind().filter(|k| k.has(TokenFlags::COMPARATOR)) {
            self.pos += 1;
            self.clause_additive()?;
            self.out.push(Token::keyword(kind));
        }
        Ok(())
    }

    fn clause_additive(&mut self) -> CompileResult<()> {
        self.clause_multiplicative()?;
        while let Some(kind) = self
            .peek_kind()
            .filter(|k| *k == TokenKind::PLUS || *k == TokenKind::MINUS)
        {
            self.pos += 1;
            self.clause_multiplicative()?;
            self.out.push(Token::keyword(kind));
        }
        Ok(())
    }

    fn clause_multiplicative(&mut self) -> CompileResult<()> {
        self.clause_unary()?;
        while let Some(kind) = self.peek_kind().filter(|k| {
            *k == TokenKind::TIMES || *k == TokenKind::DIVIDE || *k == TokenKind::PERCENT
        }) {
            self.pos += 1;
            self.clause_unary()?;
            self.out.push(Token::keyword(kind));
        }
        Ok(())
    }

    fn clause_unary(&mut self) -> CompileResult<()> {
        match self.peek_kind() {
            Some(TokenKind::MINUS) => {
                self.pos += 1;
                self.clause_unary()?;
                self.out.push(Token::keyword(TokenKind::UNARY_MINUS));
                Ok(())
            }
            Some(TokenKind::PLUS) => {
                self.pos += 1;
                self.clause_unary()
            }
            Some(kind @ (TokenKind::PLUS_PLUS | TokenKind::MINUS_MINUS)) => {
                self.pos += 1;
                let name = self.take_word()?;
                self.out.push(Token {
                    kind,
                    int_value: 1,
                    value: TokenValue::Text(name.to_string()),
                });
                Ok(())
            }
            _ => self.clause_postfix(),
        }
    }

    /// Primary followed by `.property`, `[i]`, `[i:j]`, `++`, `--`
    fn clause_postfix(&mut self) -> CompileResult<()> {
        let primary_start = self.out.len();
        self.clause_math_primary()?;
        loop {
            match self.peek_kind() {
                Some(TokenKind::PERIOD) => {
                    self.pos += 1;
                    let word = self.take_word()?;
                    let Some(kind) = self.registry.property_selector(word) else {
                        return Err(CompileError::new(CompileErrorKind::UnrecognizedParameter, ".")
                            .with_detail(word));
                    };
                    self.out.push(Token::keyword(kind));
                }
                Some(TokenKind::LEFT_SQUARE) => {
                    self.pos += 1;
                    self.with_comma_or(false, |c| c.clause_or(Mode::Math))?;
                    let mut count = 1;
                    if self.at(TokenKind::COLON) {
                        self.pos += 1;
                        self.with_comma_or(false, |c| c.clause_or(Mode::Math))?;
                        count = 2;
                    }
                    self.expect(TokenKind::RIGHT_SQUARE)?;
                    self.out.push(Token::with_int(TokenKind::INDEX, count));
                }
                Some(kind @ (TokenKind::PLUS_PLUS | TokenKind::MINUS_MINUS)) => {
                    let is_variable = self.out.len() == primary_start + 1
                        && self.out[primary_start].is(TokenKind::IDENTIFIER);
                    if !is_variable {
                        return Err(CompileError::new(
                            CompileErrorKind::TokenUnexpected,
                            kind.name(),
                        ));
                    }
                    self.pos += 1;
                    let value = std::mem::take(&mut self.out[primary_start].value);
                    self.out[primary_start] = Token {
                        kind,
                        int_value: 0,
                        value,
                    };
                }
                _ => return Ok(()),
            }
        }
    }

    /// Comma-separated arguments up to `)`; returns the count
    fn clause_arguments(&mut self) -> CompileResult<i32> {
        self.expect(TokenKind::LEFT_PAREN)?;
        let mut count = 0;
        if self.at(TokenKind::RIGHT_PAREN) {
            self.pos += 1;
            return Ok(count);
        }
        loop {
            self.with_comma_or(false, |c| c.clause_or(Mode::Math))?;
            count += 1;
            if self.at(TokenKind::COMMA) {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.expect(TokenKind::RIGHT_PAREN)?;
        Ok(count)
    }

    fn clause_math_primary(&mut self) -> CompileResult<()> {
        let Some(token) = self.peek() else {
            return Err(self.unexpected(CompileErrorKind::UnrecognizedExpressionToken));
        };
        let kind = token.kind;
        let followed_by_paren = self.kind_at(self.pos + 1) == Some(TokenKind::LEFT_PAREN);
        match kind {
            TokenKind::INTEGER
            | TokenKind::DECIMAL
            | TokenKind::STRING
            | TokenKind::TRUE
            | TokenKind::FALSE
            | TokenKind::BITSET => {
                self.out.push(token.clone());
                self.pos += 1;
            }
            TokenKind::LEFT_PAREN => {
                self.pos += 1;
                self.with_comma_or(false, |c| c.clause_or(Mode::Math))?;
                self.expect(TokenKind::RIGHT_PAREN)?;
            }
            TokenKind::LEFT_SQUARE => {
                self.pos += 1;
                let mut count = 0;
                while !self.at(TokenKind::RIGHT_SQUARE) {
                    self.with_comma_or(false, |c| c.clause_or(Mode::Math))?;
                    count += 1;
                    if self.at(TokenKind::COMMA) {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                self.expect(TokenKind::RIGHT_SQUARE)?;
                self.out.push(Token::with_int(TokenKind::ARRAY, count));
            }
            TokenKind::LEFT_BRACE => self.clause_brace()?,
            TokenKind::AT => {
                self.pos += 1;
                let name = self.take_word()?;
                self.out.push(Token::identifier(name));
            }
            TokenKind::WITHIN if followed_by_paren => self.clause_within()?,
            TokenKind::CONNECTED if followed_by_paren => self.clause_connected()?,
            TokenKind::SUBSTRUCTURE if followed_by_paren => self.clause_substructure()?,
            _ if kind.has(TokenFlags::MATH_FUNCTION) && followed_by_paren => {
                self.pos += 1;
                let argc = self.clause_arguments()?;
                if argc > i32::from(kind.arity()) {
                    return Err(CompileError::new(
                        CompileErrorKind::BadArgumentCount,
                        kind.name(),
                    ));
                }
                self.out.push(Token::with_int(kind, argc));
            }
            _ => {
                let usable = !kind.is_command()
                    && !kind.has(TokenFlags::LOGICAL)
                    && !kind.has(TokenFlags::COMPARATOR);
                let Some(name) = self.word_at(self.pos).filter(|_| usable) else {
                    return Err(self.unexpected(CompileErrorKind::UnrecognizedExpressionToken));
                };
                self.pos += 1;
                if followed_by_paren {
                    let argc = self.clause_arguments()?;
                    self.out.push(Token {
                        kind: TokenKind::FUNCTION_CALL,
                        int_value: argc,
                        value: TokenValue::Text(name.to_string()),
                    });
                } else {
                    self.out.push(Token::identifier(name));
                }
            }
        }
        Ok(())
    }

    // ----- braces ---------------------------------------------------------

    /// Numbers up to the closing brace, read after `{`; rewinds when the
    /// contents are not 2 to 4 numbers
    fn try_coordinate(&mut self) -> Option<Token> {
        let save = self.pos;
        let mut values = Vec::with_capacity(4);
        while values.len() < 4 {
            match self.signed_number() {
                Some(v) => values.push(v),
                None => break,
            }
            if self.at(TokenKind::COMMA) {
                self.pos += 1;
            }
        }
        if (2..=4).contains(&values.len()) && self.at(TokenKind::RIGHT_BRACE) {
            self.pos += 1;
            return Some(match values.as_slice() {
                [x, y] => Token::new(TokenKind::POINT3, TokenValue::Point3(Vec3::new(*x, *y, 0.0))),
                [x, y, z] => Token::new(TokenKind::POINT3, TokenValue::Point3(Vec3::new(*x, *y, *z))),
                _ => Token::new(
                    TokenKind::POINT4,
                    TokenValue::Point4([values[0], values[1], values[2], values[3]]),
                ),
            });
        }
        self.pos = save;
        None
    }

    /// `{...}`: a point or plane literal when the context allows, otherwise
    /// a nested atom expression
    fn clause_brace(&mut self) -> CompileResult<()> {
        self.expect(TokenKind::LEFT_BRACE)?;
        let marker = self.out.len();
        self.out
            .push(Token::with_int(TokenKind::EXPRESSION_BEGIN, crate::token::INT_UNSET));
        if self.coordinates {
            if let Some(point) = self.try_coordinate() {
                self.out.truncate(marker);
                self.out.push(point);
                return Ok(());
            }
        }
        self.out[marker].int_value = EXPRESSION_ATOM;
        self.with_comma_or(true, |c| c.clause_or(Mode::Atom))?;
        self.expect(TokenKind::RIGHT_BRACE)?;
        self.out.push(Token::keyword(TokenKind::EXPRESSION_END));
        Ok(())
    }

    // ----- atom tier ------------------------------------------------------

    fn clause_primitive(&mut self) -> CompileResult<()> {
        let Some(token) = self.peek() else {
            return Err(self.unexpected(CompileErrorKind::UnrecognizedExpressionToken));
        };
        let kind = token.kind;
        match kind {
            TokenKind::LEFT_PAREN => {
                self.pos += 1;
                self.with_comma_or(true, |c| c.clause_or(Mode::Atom))?;
                self.expect(TokenKind::RIGHT_PAREN)
            }
            TokenKind::LEFT_BRACE => self.clause_brace(),
            TokenKind::CELL => self.clause_cell(),
            TokenKind::WITHIN => self.clause_within(),
            TokenKind::CONNECTED => self.clause_connected(),
            TokenKind::SUBSTRUCTURE => self.clause_substructure(),
            TokenKind::BITSET => {
                self.out.push(token.clone());
                self.pos += 1;
                Ok(())
            }
            TokenKind::AT => {
                self.pos += 1;
                let name = self.take_word()?;
                self.out
                    .push(Token::new(TokenKind::VARIABLE_REF, TokenValue::Text(name.to_string())));
                Ok(())
            }
            TokenKind::LEFT_SQUARE
            | TokenKind::INTEGER
            | TokenKind::TIMES
            | TokenKind::COLON
            | TokenKind::PERCENT
            | TokenKind::DIVIDE
            | TokenKind::PERIOD
            | TokenKind::QUESTION => self.clause_residue_spec(),
            _ if kind.has(TokenFlags::PREDEFINED_SET) => {
                if self.starts_residue_spec() {
                    return self.clause_residue_spec();
                }
                self.out.push(token.clone());
                self.pos += 1;
                Ok(())
            }
            _ if kind.has(TokenFlags::ATOM_PROPERTY) => self.clause_comparator(),
            TokenKind::IDENTIFIER => {
                if self.starts_residue_spec() {
                    return self.clause_residue_spec();
                }
                let name = self.text_at(self.pos);
                self.pos += 1;
                match Element::from_full_name(name) {
                    Some(element) => self.out.push(Token::with_int(
                        TokenKind::ELEMENT_SET,
                        i32::from(element.atomic_number()),
                    )),
                    None => self.out.push(Token::new(
                        TokenKind::DEFINED_SET,
                        TokenValue::Text(name.to_string()),
                    )),
                }
                Ok(())
            }
            _ => Err(self.unexpected(CompileErrorKind::UnrecognizedExpressionToken)),
        }
    }

    /// A word glued to a following residue-spec separator, as in `ALA:A`
    fn starts_residue_spec(&self) -> bool {
        let next = self.pos + 1;
        self.adjacent(next)
            && matches!(
                self.kind_at(next),
                Some(
                    TokenKind::COLON
                        | TokenKind::PERIOD
                        | TokenKind::PERCENT
                        | TokenKind::DIVIDE
                        | TokenKind::CARET
                        | TokenKind::TIMES
                        | TokenKind::QUESTION
                )
            )
    }

    /// `property comparator value`, compiled into a single token
    fn clause_comparator(&mut self) -> CompileResult<()> {
        let property = self.input[self.pos].token.kind;
        self.pos += 1;
        let Some(op) = self.peek_kind().filter(|k| k.has(TokenFlags::COMPARATOR)) else {
            return Err(self.expected("comparator"));
        };
        let is_string = property.has(TokenFlags::STRING_PROPERTY);
        if is_string && op != TokenKind::OP_EQ && op != TokenKind::OP_NE {
            return Err(CompileError::new(
                CompileErrorKind::BadContext,
                self.text_at(self.pos),
            ));
        }
        self.pos += 1;

        let operand = if let Some(operand) = self.signed_operand() {
            operand
        } else {
            match self.peek_kind() {
                Some(TokenKind::STRING) => {
                    let text = self.peek().and_then(Token::text).unwrap_or("").to_string();
                    self.pos += 1;
                    self.have_string = true;
                    Operand::Text(text)
                }
                Some(TokenKind::LEFT_BRACE) => {
                    self.pos += 1;
                    match self.try_coordinate() {
                        Some(Token {
                            value: TokenValue::Point3(p),
                            ..
                        }) => Operand::Point3(p),
                        _ => {
                            return Err(CompileError::new(
                                CompileErrorKind::CoordinateExpected,
                                self.text_at(self.pos),
                            ))
                        }
                    }
                }
                Some(TokenKind::AT) => {
                    self.pos += 1;
                    Operand::Variable(self.take_word()?.to_string())
                }
                _ => match self.word_at(self.pos) {
                    Some(_) if is_string => Operand::Text(self.glued_name()),
                    _ => {
                        return Err(self.unexpected(CompileErrorKind::NumberOrVariableNameExpected))
                    }
                },
            }
        };
        self.out.push(Token::new(
            op,
            TokenValue::Comparison(Box::new(Comparison { property, operand })),
        ));
        Ok(())
    }

    /// Word plus any glued `*`, `?` and word tokens, e.g. `C*` or `O5'`
    fn glued_name(&mut self) -> String {
        let mut name = String::from(self.text_at(self.pos));
        self.pos += 1;
        while self.adjacent(self.pos)
            && (self.at(TokenKind::TIMES)
                || self.at(TokenKind::QUESTION)
                || self.word_at(self.pos).is_some()
                || self.at(TokenKind::INTEGER))
        {
            name.push_str(self.text_at(self.pos));
            self.pos += 1;
        }
        name
    }

    /// `cell=555` or `cell={1 1 1}`
    fn clause_cell(&mut self) -> CompileResult<()> {
        self.pos += 1;
        if !self.at(TokenKind::OP_EQ) {
            return Err(self.unexpected(CompileErrorKind::BadContext));
        }
        self.pos += 1;
        let point = match self.peek() {
            Some(t) if t.is(TokenKind::INTEGER) && (111..=999).contains(&t.int_value) => {
                let n = t.int_value;
                self.pos += 1;
                let digit = |d: i32| (d % 10 - 4) as f32;
                Vec3::new(digit(n / 100), digit(n / 10), digit(n))
            }
            Some(t) if t.is(TokenKind::LEFT_BRACE) => {
                self.pos += 1;
                match self.try_coordinate() {
                    Some(Token {
                        value: TokenValue::Point3(p),
                        ..
                    }) => p,
                    _ => return Err(self.unexpected(CompileErrorKind::CoordinateExpected)),
                }
            }
            _ => return Err(self.unexpected(CompileErrorKind::CoordinateExpected)),
        };
        self.out.push(Token::new(
            TokenKind::OP_EQ,
            TokenValue::Comparison(Box::new(Comparison {
                property: TokenKind::CELL,
                operand: Operand::Point3(point),
            })),
        ));
        Ok(())
    }

    /// `within(distance|key, [on|off,] target)`
    fn clause_within(&mut self) -> CompileResult<()> {
        self.pos += 1;
        self.expect(TokenKind::LEFT_PAREN)?;
        let mode = if let Some(d) = self.signed_number() {
            WithinMode::Distance {
                distance: d.abs(),
                negative: d < 0.0,
            }
        } else if self.at(TokenKind::STRING) {
            let text = self.peek().and_then(Token::text).unwrap_or("").to_string();
            self.pos += 1;
            WithinMode::Key(WithinKey::Sequence(text))
        } else {
            match self.word_at(self.pos) {
                Some(word) => {
                    self.pos += 1;
                    WithinMode::Key(WithinKey::from_word(word))
                }
                None if self.at_end() => {
                    return Err(CompileError::new(CompileErrorKind::EndOfCommandUnexpected, ""))
                }
                None => {
                    return Err(CompileError::new(CompileErrorKind::UnrecognizedParameter, "within")
                        .with_detail(self.text_at(self.pos)))
                }
            }
        };
        self.expect(TokenKind::COMMA)?;

        let mut all_models = None;
        if matches!(self.peek_kind(), Some(TokenKind::TRUE | TokenKind::FALSE))
            && self.kind_at(self.pos + 1) == Some(TokenKind::COMMA)
        {
            all_models = Some(self.at(TokenKind::TRUE));
            self.pos += 2;
        }

        // Explicit `plane, {...}`, `hkl, {...}`, `coord, {...}` target
        let mut target_key = match &mode {
            WithinMode::Key(k @ (WithinKey::Plane | WithinKey::Hkl | WithinKey::Coord)) => {
                Some(k.clone())
            }
            _ => None,
        };
        if self.kind_at(self.pos + 1) == Some(TokenKind::COMMA) {
            if let Some(word) = self.word_at(self.pos) {
                let key = WithinKey::from_word(word);
                if matches!(key, WithinKey::Plane | WithinKey::Hkl | WithinKey::Coord) {
                    self.pos += 2;
                    target_key = Some(key);
                }
            }
        }

        let target = if self.at(TokenKind::LEFT_BRACE) {
            self.pos += 1;
            match self.try_coordinate() {
                Some(point) => {
                    let target = match (&target_key, point.kind) {
                        (Some(WithinKey::Hkl), _) => WithinTarget::Hkl,
                        (_, TokenKind::POINT4) => WithinTarget::Plane,
                        (Some(WithinKey::Plane), _) => {
                            return Err(CompileError::new(
                                CompileErrorKind::CoordinateExpected,
                                "plane",
                            ))
                        }
                        _ => WithinTarget::Point,
                    };
                    self.out.push(point);
                    target
                }
                None => {
                    self.pos -= 1;
                    if target_key.is_some() {
                        return Err(CompileError::new(
                            CompileErrorKind::CoordinateExpected,
                            self.text_at(self.pos),
                        ));
                    }
                    self.with_comma_or(false, |c| c.clause_or(Mode::Atom))?;
                    WithinTarget::Atoms
                }
            }
        } else if target_key.is_some() {
            return Err(self.unexpected(CompileErrorKind::CoordinateExpected));
        } else {
            self.with_comma_or(false, |c| c.clause_or(Mode::Atom))?;
            WithinTarget::Atoms
        };
        self.expect(TokenKind::RIGHT_PAREN)?;
        self.out.push(Token::new(
            TokenKind::WITHIN,
            TokenValue::Within(Box::new(WithinSpec {
                mode,
                all_models,
                target,
            })),
        ));
        Ok(())
    }

    /// `connected([min[, max],] ["bondtype",] [expr])`
    fn clause_connected(&mut self) -> CompileResult<()> {
        self.pos += 1;
        self.expect(TokenKind::LEFT_PAREN)?;
        let mut counts = Vec::with_capacity(2);
        while counts.len() < 2 && self.at(TokenKind::INTEGER) {
            counts.push(self.peek().map_or(0, |t| t.int_value));
            self.pos += 1;
            if self.at(TokenKind::COMMA) {
                self.pos += 1;
            }
        }
        let (min, max) = match counts.as_slice() {
            [] => (1, i32::MAX),
            [n] => (*n, *n),
            [lo, hi, ..] => (*lo, *hi),
        };
        let mut bond_type = None;
        if self.at(TokenKind::STRING) {
            bond_type = self.peek().and_then(Token::text).map(str::to_string);
            self.pos += 1;
            if self.at(TokenKind::COMMA) {
                self.pos += 1;
            }
        }
        if self.at(TokenKind::RIGHT_PAREN) {
            self.out.push(Token::keyword(TokenKind::ALL));
        } else {
            self.with_comma_or(false, |c| c.clause_or(Mode::Atom))?;
        }
        self.expect(TokenKind::RIGHT_PAREN)?;
        self.out.push(Token::new(
            TokenKind::CONNECTED,
            TokenValue::Connected(Box::new(ConnectedSpec {
                min,
                max,
                bond_type,
            })),
        ));
        Ok(())
    }

    /// `substructure("pattern")`
    fn clause_substructure(&mut self) -> CompileResult<()> {
        self.pos += 1;
        self.expect(TokenKind::LEFT_PAREN)?;
        let Some(pattern) = self.peek().filter(|t| t.is(TokenKind::STRING)).and_then(Token::text)
        else {
            return Err(self.expected("\"pattern\""));
        };
        self.pos += 1;
        self.expect(TokenKind::RIGHT_PAREN)?;
        self.out.push(Token::new(
            TokenKind::SUBSTRUCTURE,
            TokenValue::Text(pattern.to_string()),
        ));
        Ok(())
    }

    /// `[resname]seqcode^insertion-range:chain.atomname%altloc/model`
    fn clause_residue_spec(&mut self) -> CompileResult<()> {
        let mut filters: Vec<Token> = Vec::new();
        let mut segments = 0;
        let start = self.pos;
        // After the first segment, every segment must be glued to the last
        let glued = |c: &Self| c.pos == start || c.adjacent(c.pos);

        // Residue name
        if self.at(TokenKind::LEFT_SQUARE) {
            self.pos += 1;
            let mut name = String::new();
            while !self.at(TokenKind::RIGHT_SQUARE) {
                if self.at_end() {
                    return Err(CompileError::new(
                        CompileErrorKind::ResidueSpecificationExpected,
                        "",
                    ));
                }
                name.push_str(self.text_at(self.pos));
                self.pos += 1;
            }
            self.pos += 1;
            segments += 1;
            push_name_filter(&mut filters, TokenKind::SPEC_RESNAME, name);
        } else if self.word_at(self.pos).is_some() && !self.at(TokenKind::INTEGER) {
            let name = self.glued_name();
            segments += 1;
            push_name_filter(&mut filters, TokenKind::SPEC_RESNAME, name);
        } else if self.at(TokenKind::TIMES) || self.at(TokenKind::QUESTION) {
            let mut name = String::new();
            while (self.pos == start || self.adjacent(self.pos))
                && (self.at(TokenKind::TIMES)
                    || self.at(TokenKind::QUESTION)
                    || self.word_at(self.pos).is_some())
            {
                name.push_str(self.text_at(self.pos));
                self.pos += 1;
            }
            segments += 1;
            push_name_filter(&mut filters, TokenKind::SPEC_RESNAME, name);
        }

        // Sequence number, insertion code and range
        if self.at(TokenKind::INTEGER) && glued(self) {
            let first = self.seqcode()?;
            segments += 1;
            if self.at(TokenKind::MINUS) && self.adjacent(self.pos) {
                self.pos += 1;
                if !self.at(TokenKind::INTEGER) || !self.adjacent(self.pos) {
                    return Err(self.unexpected(CompileErrorKind::ResidueSpecificationExpected));
                }
                let last = self.seqcode()?;
                filters.push(Token::new(
                    TokenKind::SPEC_SEQCODE_RANGE,
                    TokenValue::SeqRange(first, last),
                ));
            } else {
                filters.push(Token::new(TokenKind::SPEC_SEQCODE, TokenValue::SeqCode(first)));
            }
        }

        // Chain
        if self.at(TokenKind::COLON) && glued(self) {
            self.pos += 1;
            if !self.adjacent(self.pos) || self.at_end() {
                return Err(self.unexpected(CompileErrorKind::InvalidChainSpecification));
            }
            let chain = match self.peek_kind() {
                Some(TokenKind::INTEGER | TokenKind::TIMES | TokenKind::QUESTION) => {
                    let text = self.text_at(self.pos).to_string();
                    self.pos += 1;
                    text
                }
                _ if self.word_at(self.pos).is_some() => self.glued_name(),
                _ => return Err(self.unexpected(CompileErrorKind::InvalidChainSpecification)),
            };
            segments += 1;
            push_name_filter(&mut filters, TokenKind::SPEC_CHAIN, chain);
        }

        // Atom name
        if self.at(TokenKind::PERIOD) && glued(self) {
            self.pos += 1;
            let valid = self.adjacent(self.pos)
                && (self.word_at(self.pos).is_some()
                    || self.at(TokenKind::TIMES)
                    || self.at(TokenKind::QUESTION)
                    || self.at(TokenKind::INTEGER));
            if !valid {
                return Err(self.unexpected(CompileErrorKind::InvalidAtomSpecification));
            }
            let name = self.glued_name();
            segments += 1;
            push_name_filter(&mut filters, TokenKind::SPEC_ATOM_NAME, name);
        }

        // Alternate location
        if self.at(TokenKind::PERCENT) && glued(self) {
            self.pos += 1;
            let valid = self.adjacent(self.pos)
                && (self.word_at(self.pos).is_some()
                    || self.at(TokenKind::INTEGER)
                    || self.at(TokenKind::TIMES));
            if !valid {
                return Err(self.unexpected(CompileErrorKind::InvalidAtomSpecification));
            }
            let alt = self.text_at(self.pos).to_string();
            self.pos += 1;
            segments += 1;
            push_name_filter(&mut filters, TokenKind::SPEC_ALTERNATE, alt);
        }

        // Model
        if self.at(TokenKind::DIVIDE) && glued(self) {
            self.pos += 1;
            if !self.adjacent(self.pos) {
                return Err(self.unexpected(CompileErrorKind::InvalidModelSpecification));
            }
            match self.peek() {
                Some(t) if t.is(TokenKind::INTEGER) => {
                    filters.push(Token::with_int(TokenKind::SPEC_MODEL, t.int_value));
                }
                Some(t) if t.is(TokenKind::TIMES) => {}
                _ => return Err(self.unexpected(CompileErrorKind::InvalidModelSpecification)),
            }
            self.pos += 1;
            segments += 1;
        }

        if segments == 0 {
            return Err(self.unexpected(CompileErrorKind::ResidueSpecificationExpected));
        }
        if filters.is_empty() {
            self.out.push(Token::keyword(TokenKind::ALL));
            return Ok(());
        }
        let count = filters.len();
        self.out.extend(filters);
        for _ in 1..count {
            self.out.push(Token::keyword(TokenKind::AND));
        }
        Ok(())
    }

    /// `12` or `12^A`
    fn seqcode(&mut self) -> CompileResult<SeqCode> {
        let number = self.peek().map_or(0, |t| t.int_value);
        self.pos += 1;
        let mut insertion = None;
        if self.at(TokenKind::CARET) && self.adjacent(self.pos) {
            self.pos += 1;
            let code = self
                .word_at(self.pos)
                .filter(|_| self.adjacent(self.pos))
                .and_then(|w| w.chars().next());
            match code {
                Some(c) => {
                    insertion = Some(c);
                    self.pos += 1;
                }
                None => {
                    return Err(self.unexpected(CompileErrorKind::ResidueSpecificationExpected))
                }
            }
        }
        Ok(SeqCode { number, insertion })
    }
}

/// Add a name filter unless the name is the bare `*` wildcard
fn push_name_filter(filters: &mut Vec<Token>, kind: TokenKind, name: String) {
    if name != "*" {
        filters.push(Token::new(kind, TokenValue::Text(name)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn postfix(source: &str, mode: Mode) -> Vec<String> {
        Compiler::default()
            .compile_expression(source, mode)
            .unwrap()
            .iter()
            .map(|t| t.to_string())
            .collect()
    }

    fn statement(source: &str) -> Vec<Token> {
        let program = Compiler::default().compile(source).unwrap();
        program.statements[0].tokens.clone()
    }

    fn error(source: &str) -> CompileErrorKind {
        Compiler::default().compile(source).unwrap_err().kind
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        assert_eq!(
            postfix("a and b or c", Mode::Atom),
            ["definedSet:a", "definedSet:b", "and", "definedSet:c", "or"]
        );
        assert_eq!(
            postfix("a or b and c", Mode::Atom),
            ["definedSet:a", "definedSet:b", "definedSet:c", "and", "or"]
        );
    }

    #[test]
    fn test_not_is_right_associative() {
        assert_eq!(
            postfix("not not water", Mode::Atom),
            ["water", "not", "not"]
        );
    }

    #[test]
    fn test_comma_as_or() {
        assert_eq!(postfix("water, ions", Mode::Atom), ["water", "ions", "or"]);
    }

    #[test]
    fn test_math_precedence() {
        assert_eq!(
            postfix("1 + 2 * 3 > 4 and not x", Mode::Math),
            ["1", "2", "3", "*", "+", "4", ">", "identifier:x", "not", "and"]
        );
        assert_eq!(postfix("-(1 - 2)", Mode::Math), ["1", "2", "-", "-"]);
    }

    #[test]
    fn test_postfix_selectors() {
        assert_eq!(
            postfix("a[2][1:3].size", Mode::Math),
            ["identifier:a", "2", "[]", "1", "3", "[]", "size"]
        );
        let tokens = Compiler::default().compile_expression("i++", Mode::Math).unwrap();
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].is(TokenKind::PLUS_PLUS));
        assert_eq!(tokens[0].int_value, 0);
    }

    #[test]
    fn test_selectors_resolve_through_bound_registry() {
        let registry = KeywordRegistry::global();
        let compiler = Compiler::new(registry);
        let program = compiler.compile("print {carbon}.size").unwrap();
        let size = registry.property_selector("size").unwrap();
        assert!(program.statements[0].tokens.iter().any(|t| t.is(size)));
        let err = compiler.compile("print {carbon}.bogus").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnrecognizedParameter);
    }

    #[test]
    fn test_coordinate_disambiguation() {
        let tokens = statement("select {1 2 3}");
        assert!(tokens[2].is(TokenKind::POINT3));

        let tokens = statement("select {atomno=1}");
        assert!(tokens[2].is(TokenKind::EXPRESSION_BEGIN));
        assert_eq!(tokens[2].int_value, EXPRESSION_ATOM);
        assert!(matches!(tokens[3].value, TokenValue::Comparison(_)));

        let tokens = statement("print {1, 2, 3, 4}");
        assert!(tokens[2].is(TokenKind::POINT4));
    }

    #[test]
    fn test_define_never_reads_coordinates() {
        assert_eq!(error("define s {1 2 3}"), CompileErrorKind::TokenExpected);
        let tokens = statement("define s {12}");
        assert!(tokens[3].is(TokenKind::EXPRESSION_BEGIN));
        assert_eq!(tokens[3].int_value, EXPRESSION_ATOM);
        assert!(tokens[4].is(TokenKind::SPEC_SEQCODE));
    }

    #[test]
    fn test_comparator_string_property() {
        let tokens = Compiler::default()
            .compile_expression("atomName=CA", Mode::Atom)
            .unwrap();
        match &tokens[0].value {
            TokenValue::Comparison(c) => {
                assert_eq!(c.property, TokenKind::ATOM_NAME);
                assert!(matches!(&c.operand, Operand::Text(s) if s == "CA"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(error("select atomName < CA"), CompileErrorKind::BadContext);
        assert_eq!(error("select atomno < CA"), CompileErrorKind::NumberOrVariableNameExpected);
    }

    #[test]
    fn test_integer_operand_is_exact() {
        let operand = |text: &str| {
            let tokens = Compiler::default().compile_expression(text, Mode::Atom).unwrap();
            match &tokens[0].value {
                TokenValue::Comparison(c) => c.operand.clone(),
                other => panic!("unexpected {:?}", other),
            }
        };
        assert!(matches!(operand("resno=16777217"), Operand::Integer(16777217)));
        assert!(matches!(operand("resno=-3"), Operand::Integer(-3)));
        assert!(matches!(operand("x<-1.5"), Operand::Decimal(x) if x == -1.5));
    }

    #[test]
    fn test_residue_spec() {
        assert_eq!(
            postfix("[ALA]12^B:A.CA%1/2", Mode::Atom),
            [
                "specResname:ALA",
                "specSeqcode:12^B",
                "specChain:A",
                "specAtomName:CA",
                "specAlternate:1",
                "specModel",
                "and",
                "and",
                "and",
                "and",
                "and"
            ]
        );
        assert_eq!(postfix("*", Mode::Atom), ["all"]);
        assert_eq!(postfix("*:*", Mode::Atom), ["all"]);
        assert_eq!(
            postfix("10-20:B", Mode::Atom),
            ["specSeqcodeRange:10-20", "specChain:B", "and"]
        );
        assert_eq!(postfix(":A", Mode::Atom), ["specChain:A"]);
    }

    #[test]
    fn test_residue_spec_requires_adjacency() {
        assert_eq!(error("select 12 :A"), CompileErrorKind::EndOfExpressionExpected);
        assert_eq!(error("select 12:"), CompileErrorKind::EndOfCommandUnexpected);
    }

    #[test]
    fn test_within() {
        let tokens = Compiler::default()
            .compile_expression("within(-3.5, on, carbon)", Mode::Atom)
            .unwrap();
        assert!(tokens[0].is(TokenKind::ELEMENT_SET));
        assert_eq!(tokens[0].int_value, 6);
        match &tokens[1].value {
            TokenValue::Within(spec) => {
                assert_eq!(
                    spec.mode,
                    WithinMode::Distance {
                        distance: 3.5,
                        negative: true
                    }
                );
                assert_eq!(spec.all_models, Some(true));
                assert_eq!(spec.target, WithinTarget::Atoms);
            }
            other => panic!("unexpected {:?}", other),
        }

        let tokens = Compiler::default()
            .compile_expression("within(plane, {0 0 1 -2})", Mode::Atom)
            .unwrap();
        assert!(tokens[0].is(TokenKind::POINT4));
        match &tokens[1].value {
            TokenValue::Within(spec) => {
                assert_eq!(spec.mode, WithinMode::Key(WithinKey::Plane));
                assert_eq!(spec.target, WithinTarget::Plane);
            }
            other => panic!("unexpected {:?}", other),
        }

        let tokens = Compiler::default()
            .compile_expression("within(group, atomno=3, atomno=4)", Mode::Atom)
            .unwrap_err();
        assert_eq!(tokens.kind, CompileErrorKind::TokenExpected);
    }

    #[test]
    fn test_connected_and_substructure() {
        let tokens = Compiler::default()
            .compile_expression("connected(2, \"double\", oxygen)", Mode::Atom)
            .unwrap();
        match &tokens[1].value {
            TokenValue::Connected(spec) => {
                assert_eq!((spec.min, spec.max), (2, 2));
                assert_eq!(spec.bond_type.as_deref(), Some("double"));
            }
            other => panic!("unexpected {:?}", other),
        }
        let tokens = Compiler::default()
            .compile_expression("connected()", Mode::Atom)
            .unwrap();
        assert!(tokens[0].is(TokenKind::ALL));
        let tokens = Compiler::default()
            .compile_expression("substructure(\"C=O\")", Mode::Atom)
            .unwrap();
        assert_eq!(tokens[0].text(), Some("C=O"));
    }

    #[test]
    fn test_cell() {
        let tokens = Compiler::default()
            .compile_expression("cell=565", Mode::Atom)
            .unwrap();
        match &tokens[0].value {
            TokenValue::Comparison(c) => match c.operand {
                Operand::Point3(p) => assert_eq!((p.x, p.y, p.z), (1.0, 2.0, 1.0)),
                ref other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_statement_forms() {
        let tokens = statement("x = 1 + 2");
        assert!(tokens[0].is(TokenKind::ASSIGN));
        assert_eq!(tokens[1].text(), Some("x"));

        let tokens = statement("for (i = 1; i <= 4; i++)\nend for");
        assert!(tokens[0].is(TokenKind::FOR));
        let idents = tokens.iter().filter(|t| t.is(TokenKind::IDENTIFIER)).count();
        assert!(idents >= 3);

        let tokens = statement("echo hello world");
        assert_eq!(tokens[1].text(), Some("hello world"));

        let tokens = statement("delay");
        assert_eq!(tokens[2].int_value, 1);
    }

    #[test]
    fn test_statement_errors() {
        assert_eq!(error("frobnicate"), CompileErrorKind::CommandExpected);
        assert_eq!(error("select ("), CompileErrorKind::EndOfCommandUnexpected);
        assert_eq!(error("select water )"), CompileErrorKind::EndOfExpressionExpected);
        assert_eq!(error("delete"), CompileErrorKind::BadArgumentCount);
        assert_eq!(error("select print"), CompileErrorKind::UnrecognizedExpressionToken);
        assert_eq!(error("end sideways"), CompileErrorKind::UnrecognizedParameter);
    }

    #[test]
    fn test_error_carries_location() {
        let err = Compiler::default()
            .compile("select all\nselect (water")
            .unwrap_err();
        assert_eq!(err.location.line, 2);
        assert_eq!(err.location.command, "select (water");
    }
}
