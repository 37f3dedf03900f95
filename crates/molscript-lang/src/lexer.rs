//! Script tokenizer using nom
//!
//! Splits script text into statements and each statement into keyword,
//! literal and operator tokens. Every token keeps its absolute byte span so
//! the compiler can recover the source word (keywords double as variable
//! names in math expressions) and check adjacency inside residue specs.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char, digit1, one_of, satisfy},
    combinator::{map_res, not, opt, recognize, value},
    sequence::{delimited, pair, terminated, tuple},
    IResult,
};

use molscript_mol::AtomSet;

use crate::error::{CompileError, CompileErrorKind, CompileResult, SourceLocation};
use crate::keywords::KeywordRegistry;
use crate::token::{Token, TokenFlags, TokenKind, TokenValue};

/// Result of lexing
pub type LexResult<'a, T> = IResult<&'a str, T>;

/// A token with its byte span in the script
#[derive(Debug, Clone)]
pub struct LexedToken {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

/// One statement's tokens, before compilation
#[derive(Debug, Clone)]
pub struct LexedStatement {
    pub tokens: Vec<LexedToken>,
    /// 1-based line the statement starts on
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

impl LexedStatement {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("").trim()
    }

    pub fn location(&self, source: &str) -> SourceLocation {
        SourceLocation {
            line: self.line,
            start: self.start,
            end: self.end,
            command: self.text(source).to_string(),
        }
    }
}

/// Parse horizontal whitespace; newlines separate statements
fn blank(input: &str) -> LexResult<'_, &str> {
    take_while(|c: char| c == ' ' || c == '\t' || c == '\r')(input)
}

/// Parse a `# ...` comment up to, not including, the newline
fn line_comment(input: &str) -> LexResult<'_, &str> {
    recognize(pair(char('#'), take_while(|c: char| c != '\n')))(input)
}

/// Parse a `/* ... */` comment
fn block_comment(input: &str) -> LexResult<'_, &str> {
    recognize(delimited(tag("/*"), take_until("*/"), tag("*/")))(input)
}

/// Parse two-character operators
fn double_operator(input: &str) -> LexResult<'_, Token> {
    alt((
        value(Token::keyword(TokenKind::PLUS_PLUS), tag("++")),
        value(Token::keyword(TokenKind::MINUS_MINUS), tag("--")),
        value(Token::keyword(TokenKind::OP_EQ), tag("==")),
        value(Token::keyword(TokenKind::OP_NE), tag("!=")),
        value(Token::keyword(TokenKind::OP_NE), tag("<>")),
        value(Token::keyword(TokenKind::OP_LE), tag("<=")),
        value(Token::keyword(TokenKind::OP_GE), tag(">=")),
        value(Token::keyword(TokenKind::AND), tag("&&")),
        value(Token::keyword(TokenKind::OR), tag("||")),
    ))(input)
}

/// Parse single-character operators and punctuation
fn single_operator(input: &str) -> LexResult<'_, Token> {
    let (input, c) = one_of("=<>&|!+-*/%(){}[],:.@^?")(input)?;
    let token = match c {
        // A lone `=` is an equality test everywhere except after an
        // assignment target; the text payload lets the compiler tell.
        '=' => Token::new(TokenKind::OP_EQ, TokenValue::Text("=".to_string())),
        '<' => Token::keyword(TokenKind::OP_LT),
        '>' => Token::keyword(TokenKind::OP_GT),
        '&' => Token::keyword(TokenKind::AND),
        '|' => Token::keyword(TokenKind::OR),
        '!' => Token::keyword(TokenKind::NOT),
        '+' => Token::keyword(TokenKind::PLUS),
        '-' => Token::keyword(TokenKind::MINUS),
        '*' => Token::keyword(TokenKind::TIMES),
        '/' => Token::keyword(TokenKind::DIVIDE),
        '%' => Token::keyword(TokenKind::PERCENT),
        '(' => Token::keyword(TokenKind::LEFT_PAREN),
        ')' => Token::keyword(TokenKind::RIGHT_PAREN),
        '{' => Token::keyword(TokenKind::LEFT_BRACE),
        '}' => Token::keyword(TokenKind::RIGHT_BRACE),
        '[' => Token::keyword(TokenKind::LEFT_SQUARE),
        ']' => Token::keyword(TokenKind::RIGHT_SQUARE),
        ',' => Token::keyword(TokenKind::COMMA),
        ':' => Token::keyword(TokenKind::COLON),
        '.' => Token::keyword(TokenKind::PERIOD),
        '@' => Token::keyword(TokenKind::AT),
        '^' => Token::keyword(TokenKind::CARET),
        _ => Token::keyword(TokenKind::QUESTION),
    };
    Ok((input, token))
}

/// Parse the exponent part of a decimal
fn exponent(input: &str) -> LexResult<'_, &str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(input)
}

/// Parse a number; does NOT consume a leading minus and refuses to stop
/// in the middle of a word like `1H`
fn number(input: &str) -> LexResult<'_, Token> {
    let text = terminated(
        alt((
            recognize(tuple((digit1, opt(pair(char('.'), digit1)), opt(exponent)))),
            recognize(tuple((char('.'), digit1, opt(exponent)))),
        )),
        not(satisfy(is_ident_char)),
    );
    map_res(text, |s: &str| {
        if s.contains(['.', 'e', 'E']) {
            s.parse::<f32>().map(Token::decimal)
        } else {
            s.parse::<i32>()
                .map(Token::integer)
                .or_else(|_| s.parse::<f32>().map(Token::decimal))
        }
    })(input)
}

/// Check if a character can start an identifier
fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// Check if a character can be part of an identifier
fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '\''
}

/// Parse a word: an identifier, or a name starting with digits like `1HB`
fn word(input: &str) -> LexResult<'_, &str> {
    alt((
        recognize(pair(take_while1(is_ident_start), take_while(is_ident_char))),
        recognize(pair(digit1, take_while1(is_ident_char))),
    ))(input)
}

/// Parse a double-quoted string with `\" \\ \n \t` escapes
fn quoted_string(input: &str) -> LexResult<'_, Token> {
    let (mut rest, _) = char('"')(input)?;
    let mut out = String::new();
    loop {
        let mut chars = rest.chars();
        match chars.next() {
            Some('"') => return Ok((chars.as_str(), Token::string(out))),
            Some('\\') => {
                match chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) if c != '\n' => out.push(c),
                    _ => break,
                }
                rest = chars.as_str();
            }
            Some(c) if c != '\n' => {
                out.push(c);
                rest = chars.as_str();
            }
            _ => break,
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

/// Largest atom index a bitset literal may name
pub const MAX_BITSET_INDEX: usize = (1 << 24) - 1;

/// One bitset index, bounded by `MAX_BITSET_INDEX`
fn bitset_index(text: &str) -> Option<usize> {
    text.parse::<usize>().ok().filter(|&i| i <= MAX_BITSET_INDEX)
}

/// Body of a bitset literal: `0 2:4 9`; reversed ranges are rejected
fn bitset_body(body: &str) -> Option<AtomSet> {
    let mut set = AtomSet::new(0);
    for item in body.split_whitespace() {
        match item.split_once(':') {
            Some((from, to)) => {
                let (from, to) = (bitset_index(from)?, bitset_index(to)?);
                if from > to {
                    return None;
                }
                set.insert_range(from..=to);
            }
            None => set.insert(bitset_index(item)?),
        }
    }
    Some(set)
}

/// Parse a bitset literal `({0 2:4 9})`; a malformed body is a hard failure
fn bitset_literal(input: &str) -> LexResult<'_, Token> {
    let (rest, body) = delimited(tag("({"), take_until("})"), tag("})"))(input)?;
    match bitset_body(body) {
        Some(bs) => Ok((rest, Token::new(TokenKind::BITSET, TokenValue::Bitset(bs)))),
        None => Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        ))),
    }
}

/// Parse a single token; words are returned raw for registry lookup
fn token<'a>(input: &'a str, registry: &KeywordRegistry) -> LexResult<'a, Token> {
    match bitset_literal(input) {
        Err(nom::Err::Error(_)) => {}
        found => return found,
    }
    if let Ok(found) = alt((quoted_string, number, double_operator))(input) {
        return Ok(found);
    }
    if let Ok((rest, w)) = word(input) {
        let token = match registry.lookup(w) {
            Some(keyword) => keyword.clone(),
            None => Token::identifier(w),
        };
        return Ok((rest, token));
    }
    single_operator(input)
}

struct Splitter<'a> {
    source: &'a str,
    statements: Vec<LexedStatement>,
    current: Vec<LexedToken>,
    start: usize,
    line: usize,
    statement_line: usize,
}

impl<'a> Splitter<'a> {
    fn finish(&mut self, end: usize) {
        if !self.current.is_empty() {
            self.statements.push(LexedStatement {
                tokens: std::mem::take(&mut self.current),
                line: self.statement_line,
                start: self.start,
                end,
            });
        }
    }

    fn begin(&mut self, pos: usize) {
        if self.current.is_empty() {
            self.start = pos;
            self.statement_line = self.line;
        }
    }

    fn error(&self, pos: usize) -> CompileError {
        let rest = &self.source[pos..];
        let bad: String = rest.chars().take_while(|c| !c.is_whitespace()).take(10).collect();
        let line_end = rest.find('\n').map_or(self.source.len(), |i| pos + i);
        let start = if self.current.is_empty() { pos } else { self.start };
        CompileError::new(CompileErrorKind::UnrecognizedToken, bad).at(SourceLocation {
            line: self.line,
            start,
            end: line_end,
            command: self.source[start..line_end].trim().to_string(),
        })
    }
}

/// Raw text of an implicit-string command, up to `;` or end of line
fn implicit_string(input: &str) -> &str {
    let end = input.find([';', '\n']).unwrap_or(input.len());
    &input[..end]
}

/// Tokenize a whole script into statements
pub fn tokenize(source: &str, registry: &KeywordRegistry) -> CompileResult<Vec<LexedStatement>> {
    let mut s = Splitter {
        source,
        statements: Vec::new(),
        current: Vec::new(),
        start: 0,
        line: 1,
        statement_line: 1,
    };
    let mut depth = 0usize;
    let mut pos = 0usize;

    while pos < source.len() {
        let rest = &source[pos..];
        if let Ok((after, skipped)) = blank(rest) {
            if !skipped.is_empty() {
                pos += rest.len() - after.len();
                continue;
            }
        }
        if let Ok((after, _)) = alt((line_comment, block_comment))(rest) {
            let consumed = rest.len() - after.len();
            s.line += rest[..consumed].matches('\n').count();
            pos += consumed;
            continue;
        }
        if rest.starts_with("/*") {
            // Unterminated block comment runs to the end of the script
            break;
        }
        if rest.starts_with('\n') {
            s.finish(pos);
            s.line += 1;
            depth = 0;
            pos += 1;
            continue;
        }
        if rest.starts_with(';') && depth == 0 {
            s.finish(pos);
            pos += 1;
            continue;
        }
        if rest.starts_with(';') {
            s.begin(pos);
            s.current.push(LexedToken {
                token: Token::keyword(TokenKind::SEMICOLON),
                start: pos,
                end: pos + 1,
            });
            pos += 1;
            continue;
        }

        let (after, tok) = token(rest, registry).map_err(|_| s.error(pos))?;
        let end = pos + rest.len() - after.len();
        if tok.is(TokenKind::LEFT_PAREN) {
            depth += 1;
        } else if tok.is(TokenKind::RIGHT_PAREN) {
            depth = depth.saturating_sub(1);
        }
        let implicit = s.current.is_empty() && tok.kind.has(TokenFlags::IMPLICIT_STRING_COMMAND);
        s.begin(pos);
        s.current.push(LexedToken { token: tok, start: pos, end });
        pos = end;

        if implicit {
            let raw = implicit_string(&source[pos..]);
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                let text = trimmed
                    .strip_prefix('"')
                    .and_then(|t| t.strip_suffix('"'))
                    .unwrap_or(trimmed);
                let offset = raw.len() - raw.trim_start().len();
                s.current.push(LexedToken {
                    token: Token::string(text),
                    start: pos + offset,
                    end: pos + offset + trimmed.len(),
                });
            }
            pos += raw.len();
        }
    }
    s.finish(source.len());
    log::debug!("tokenized {} statements", s.statements.len());
    Ok(s.statements)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(script: &str) -> Vec<Vec<TokenKind>> {
        tokenize(script, KeywordRegistry::global())
            .unwrap()
            .iter()
            .map(|st| st.tokens.iter().map(|t| t.token.kind).collect())
            .collect()
    }

    #[test]
    fn test_statement_splitting() {
        let stmts = kinds("select all; hide none\nprint 1");
        assert_eq!(stmts.len(), 3);
        assert_eq!(stmts[0], vec![TokenKind::SELECT, TokenKind::ALL]);
        assert_eq!(stmts[2], vec![TokenKind::PRINT, TokenKind::INTEGER]);
    }

    #[test]
    fn test_semicolon_inside_parens() {
        let stmts = kinds("for (i = 0; i < 3; i++)");
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].contains(&TokenKind::SEMICOLON));
        assert!(stmts[0].contains(&TokenKind::PLUS_PLUS));
    }

    #[test]
    fn test_comments() {
        let stmts = kinds("# heading\nselect /* inline */ all # trailing\n");
        assert_eq!(stmts, vec![vec![TokenKind::SELECT, TokenKind::ALL]]);
    }

    #[test]
    fn test_numbers() {
        let stmts = tokenize("print 12 1.5 .5 1e-3 1HB", KeywordRegistry::global()).unwrap();
        let toks: Vec<_> = stmts[0].tokens.iter().map(|t| &t.token).collect();
        assert_eq!(toks[1].int_value, 12);
        assert_eq!(toks[2].number(), Some(1.5));
        assert_eq!(toks[3].number(), Some(0.5));
        assert!(toks[4].is(TokenKind::DECIMAL));
        assert_eq!(toks[5].text(), Some("1HB"));
    }

    #[test]
    fn test_strings_and_bitsets() {
        let stmts = tokenize(r#"print "a\"b" ({0 2:4})"#, KeywordRegistry::global()).unwrap();
        let toks = &stmts[0].tokens;
        assert_eq!(toks[1].token.text(), Some("a\"b"));
        match &toks[2].token.value {
            TokenValue::Bitset(bs) => assert_eq!(bs.iter().collect::<Vec<_>>(), vec![0, 2, 3, 4]),
            other => panic!("expected bitset, got {:?}", other),
        }
    }

    #[test]
    fn test_bitset_bounds() {
        let err = tokenize("print ({5:2})", KeywordRegistry::global()).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnrecognizedToken);
        let err = tokenize("print ({0:4000000000})", KeywordRegistry::global()).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnrecognizedToken);
        assert!(tokenize("print ({99999999})", KeywordRegistry::global()).is_err());

        let stmts = tokenize("print ({0:99999})", KeywordRegistry::global()).unwrap();
        match &stmts[0].tokens[1].token.value {
            TokenValue::Bitset(bs) => assert_eq!(bs.count(), 100_000),
            other => panic!("expected bitset, got {:?}", other),
        }
    }

    #[test]
    fn test_operators() {
        let stmts = kinds("print a <= b <> c && !d || e");
        assert_eq!(
            stmts[0],
            vec![
                TokenKind::PRINT,
                TokenKind::IDENTIFIER,
                TokenKind::OP_LE,
                TokenKind::IDENTIFIER,
                TokenKind::OP_NE,
                TokenKind::IDENTIFIER,
                TokenKind::AND,
                TokenKind::NOT,
                TokenKind::IDENTIFIER,
                TokenKind::OR,
                TokenKind::IDENTIFIER,
            ]
        );
    }

    #[test]
    fn test_implicit_string() {
        let stmts = tokenize("echo hello, (world) ; print 1", KeywordRegistry::global()).unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].tokens[1].token.text(), Some("hello, (world)"));
    }

    #[test]
    fn test_spans_and_lines() {
        let source = "select all\n\nhide  carbon";
        let stmts = tokenize(source, KeywordRegistry::global()).unwrap();
        assert_eq!(stmts[1].line, 3);
        let t = &stmts[1].tokens[1];
        assert_eq!(&source[t.start..t.end], "carbon");
        assert_eq!(stmts[1].text(source), "hide  carbon");
    }

    #[test]
    fn test_unrecognized_token() {
        let err = tokenize("select all\nprint $x", KeywordRegistry::global()).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnrecognizedToken);
        assert_eq!(err.token, "$x");
        assert_eq!(err.location.line, 2);
    }
}
