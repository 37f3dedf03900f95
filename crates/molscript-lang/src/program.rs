//! Compiled programs and flow-control linking
//!
//! After every statement compiles, a link pass pulls `function ... end
//! function` bodies out into [`FunctionDef`]s and resolves block structure
//! into jump targets stored on each flow token:
//!
//! | statement | `int_value` | value |
//! |-----------|-------------|-------|
//! | `if` / `elseif` / `else` | index of the next clause (`elseif`, `else` or `endif`) | index of the `endif` |
//! | `while` / `for` | index of the matching `end` | |
//! | `end while` / `end for` | index of the loop head | |
//! | `break` / `continue` | index of the enclosing loop's `end` | |

use std::sync::Arc;

use crate::error::{CompileError, CompileErrorKind, CompileResult, SourceLocation};
use crate::token::{Token, TokenKind, TokenValue};

/// One compiled statement: command tokens plus postfix expression spans
#[derive(Debug, Clone)]
pub struct Statement {
    pub tokens: Vec<Token>,
    /// 1-based source line
    pub line: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Statement {
    /// Leading command token kind
    pub fn command(&self) -> Option<TokenKind> {
        self.tokens.first().map(|t| t.kind)
    }

    pub fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            start: self.start,
            end: self.end,
            command: self.text.clone(),
        }
    }

    /// Top-level expression spans, without their begin/end markers
    pub fn expressions(&self) -> Vec<&[Token]> {
        let mut spans = Vec::new();
        let mut depth = 0usize;
        let mut begin = 0usize;
        for (i, token) in self.tokens.iter().enumerate() {
            if token.is(TokenKind::EXPRESSION_BEGIN) {
                if depth == 0 {
                    begin = i + 1;
                }
                depth += 1;
            } else if token.is(TokenKind::EXPRESSION_END) && depth > 0 {
                depth -= 1;
                if depth == 0 {
                    spans.push(&self.tokens[begin..i]);
                }
            }
        }
        spans
    }

    /// Identifier names outside expression spans, in order
    pub fn names(&self) -> Vec<&str> {
        let mut depth = 0usize;
        let mut names = Vec::new();
        for token in &self.tokens {
            if token.is(TokenKind::EXPRESSION_BEGIN) {
                depth += 1;
            } else if token.is(TokenKind::EXPRESSION_END) {
                depth = depth.saturating_sub(1);
            } else if depth == 0 && token.is(TokenKind::IDENTIFIER) {
                names.extend(token.text());
            }
        }
        names
    }
}

/// A user function extracted from the program
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub statements: Vec<Statement>,
}

/// A compiled, linked script
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
    pub functions: Vec<Arc<FunctionDef>>,
}

impl Program {
    /// Case-insensitive function lookup
    pub fn function(&self, name: &str) -> Option<&Arc<FunctionDef>> {
        self.functions
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty() && self.functions.is_empty()
    }

    /// Extract functions and resolve jump targets
    pub fn link(statements: Vec<Statement>) -> CompileResult<Program> {
        let mut main = Vec::new();
        let mut functions = Vec::new();
        let mut open: Option<(Statement, Vec<Statement>)> = None;

        for st in statements {
            let kind = st.command();
            if kind == Some(TokenKind::FUNCTION) {
                if open.is_some() {
                    return Err(CompileError::new(CompileErrorKind::BadContext, "function")
                        .at(st.location()));
                }
                open = Some((st, Vec::new()));
            } else if kind == Some(TokenKind::END) && end_name(&st) == Some("function") {
                let Some((header, mut body)) = open.take() else {
                    return Err(
                        CompileError::new(CompileErrorKind::BadContext, "end").at(st.location())
                    );
                };
                link_block(&mut body)?;
                let names = header.names();
                let def = FunctionDef {
                    name: names.first().map(|s| s.to_string()).unwrap_or_default(),
                    params: names.iter().skip(1).map(|s| s.to_string()).collect(),
                    statements: body,
                };
                log::debug!("linked function {} ({} statements)", def.name, def.statements.len());
                functions.push(Arc::new(def));
            } else if let Some((_, body)) = open.as_mut() {
                body.push(st);
            } else {
                main.push(st);
            }
        }
        if let Some((header, _)) = open {
            return Err(
                CompileError::new(CompileErrorKind::MissingEnd, "function").at(header.location())
            );
        }
        link_block(&mut main)?;
        Ok(Program {
            statements: main,
            functions,
        })
    }
}

fn end_name(st: &Statement) -> Option<&str> {
    st.tokens.first().and_then(Token::text)
}

/// An unclosed block during linking
enum Block {
    If { clauses: Vec<usize>, has_else: bool },
    Loop { head: usize, kind: TokenKind, jumps: Vec<usize> },
}

impl Block {
    fn head(&self) -> usize {
        match self {
            Block::If { clauses, .. } => clauses.first().copied().unwrap_or(0),
            Block::Loop { head, .. } => *head,
        }
    }
}

fn set_jump(st: &mut Statement, target: usize) {
    if let Some(head) = st.tokens.first_mut() {
        head.int_value = target as i32;
    }
}

fn link_block(statements: &mut [Statement]) -> CompileResult<()> {
    let mut stack: Vec<Block> = Vec::new();
    let bad = |st: &Statement, what: &str| {
        CompileError::new(CompileErrorKind::BadContext, what).at(st.location())
    };

    for i in 0..statements.len() {
        let Some(kind) = statements[i].command() else {
            continue;
        };
        match kind {
            TokenKind::IF => stack.push(Block::If {
                clauses: vec![i],
                has_else: false,
            }),
            TokenKind::ELSEIF | TokenKind::ELSE => match stack.last_mut() {
                Some(Block::If { clauses, has_else }) if !*has_else => {
                    clauses.push(i);
                    *has_else = kind == TokenKind::ELSE;
                }
                _ => return Err(bad(&statements[i], kind.name())),
            },
            TokenKind::ENDIF => match stack.pop() {
                Some(Block::If { clauses, .. }) => {
                    for (n, &clause) in clauses.iter().enumerate() {
                        let next = clauses.get(n + 1).copied().unwrap_or(i);
                        set_jump(&mut statements[clause], next);
                        if let Some(head) = statements[clause].tokens.first_mut() {
                            head.value = TokenValue::Integer(i as i32);
                        }
                    }
                }
                _ => return Err(bad(&statements[i], "endif")),
            },
            TokenKind::WHILE | TokenKind::FOR => stack.push(Block::Loop {
                head: i,
                kind,
                jumps: Vec::new(),
            }),
            TokenKind::END => {
                let expected = match end_name(&statements[i]) {
                    Some("while") => TokenKind::WHILE,
                    Some("for") => TokenKind::FOR,
                    _ => return Err(bad(&statements[i], "end")),
                };
                match stack.pop() {
                    Some(Block::Loop { head, kind, jumps }) if kind == expected => {
                        set_jump(&mut statements[head], i);
                        set_jump(&mut statements[i], head);
                        for j in jumps {
                            set_jump(&mut statements[j], i);
                        }
                    }
                    _ => return Err(bad(&statements[i], "end")),
                }
            }
            TokenKind::BREAK | TokenKind::CONTINUE => {
                let innermost = stack.iter_mut().rev().find_map(|b| match b {
                    Block::Loop { jumps, .. } => Some(jumps),
                    Block::If { .. } => None,
                });
                match innermost {
                    Some(jumps) => jumps.push(i),
                    None => return Err(bad(&statements[i], kind.name())),
                }
            }
            _ => {}
        }
    }

    if let Some(block) = stack.pop() {
        let head = &statements[block.head()];
        let name = head.command().map_or("", |k| k.name());
        return Err(CompileError::new(CompileErrorKind::MissingEnd, name).at(head.location()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;

    fn compile(source: &str) -> CompileResult<Program> {
        Compiler::default().compile(source)
    }

    fn jumps(program: &Program) -> Vec<i32> {
        program
            .statements
            .iter()
            .map(|s| s.tokens[0].int_value)
            .collect()
    }

    #[test]
    fn test_if_chain_targets() {
        let program = compile(
            "if (a)\nprint 1\nelseif (b)\nprint 2\nelse\nprint 3\nendif",
        )
        .unwrap();
        let j = jumps(&program);
        assert_eq!((j[0], j[2], j[4]), (2, 4, 6));
        for clause in [0, 2, 4] {
            assert!(matches!(
                program.statements[clause].tokens[0].value,
                TokenValue::Integer(6)
            ));
        }
    }

    #[test]
    fn test_else_if_and_end_if_spellings() {
        let program = compile("if (a)\nprint 1\nelse if (b)\nprint 2\nend if").unwrap();
        assert_eq!(program.statements[2].command(), Some(TokenKind::ELSEIF));
        assert_eq!(program.statements[4].command(), Some(TokenKind::ENDIF));
    }

    #[test]
    fn test_loop_targets() {
        let program = compile(
            "while (x < 3)\nif (x == 1)\nbreak\nendif\ncontinue\nend while",
        )
        .unwrap();
        let j = jumps(&program);
        assert_eq!(j[0], 5);
        assert_eq!(j[5], 0);
        assert_eq!(j[2], 5);
        assert_eq!(j[4], 5);
    }

    #[test]
    fn test_function_extraction() {
        let program = compile(
            "function add(a, b)\nreturn a + b\nend function\nprint add(1, 2)",
        )
        .unwrap();
        assert_eq!(program.statements.len(), 1);
        let f = program.function("ADD").unwrap();
        assert_eq!(f.params, ["a", "b"]);
        assert_eq!(f.statements.len(), 1);
        assert_eq!(f.statements[0].command(), Some(TokenKind::RETURN));
    }

    #[test]
    fn test_link_errors() {
        let err = compile("while (1)\nprint 1").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::MissingEnd);
        assert_eq!(err.untranslated(), "missing END for while");
        assert_eq!(err.location.line, 1);

        assert_eq!(compile("else").unwrap_err().kind, CompileErrorKind::BadContext);
        assert_eq!(compile("break").unwrap_err().kind, CompileErrorKind::BadContext);
        assert_eq!(compile("end for").unwrap_err().kind, CompileErrorKind::BadContext);
        assert_eq!(
            compile("while (1)\nend for").unwrap_err().kind,
            CompileErrorKind::BadContext
        );
        assert_eq!(
            compile("function f\nfunction g\nend function\nend function")
                .unwrap_err()
                .kind,
            CompileErrorKind::BadContext
        );
        assert_eq!(
            compile("function f\nprint 1").unwrap_err().kind,
            CompileErrorKind::MissingEnd
        );
    }

    #[test]
    fn test_expression_spans() {
        let program = compile("for (i = 1; i <= {carbon}.size; i = i + 1)\nend for").unwrap();
        let spans = program.statements[0].expressions();
        assert_eq!(spans.len(), 3);
        assert_eq!(program.statements[0].names(), ["i", "i"]);
    }
}
