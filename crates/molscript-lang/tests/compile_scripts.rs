//! Whole-script compilation through the public API

use molscript_lang::prelude::*;
use molscript_lang::{sprintf, CompileErrorKind, Selector, TokenValue, INT_UNSET};

fn postfix(statement: &Statement) -> Vec<Vec<String>> {
    statement
        .expressions()
        .iter()
        .map(|span| span.iter().map(|t| t.to_string()).collect())
        .collect()
}

#[test]
fn test_mixed_script_compiles_and_links() {
    let script = r#"
        # pick the backbone of chain A
        select backbone and :A
        var n = {carbon}.size
        for (var i = 1; i <= n; i++)
            if (i % 2 == 0)
                continue
            endif
            print sprintf("%d", i)
        end for
        echo done
    "#;
    let program = compile(script).unwrap();
    let commands: Vec<TokenKind> = program
        .statements
        .iter()
        .filter_map(|s| s.command())
        .collect();
    assert_eq!(
        commands,
        [
            TokenKind::SELECT,
            TokenKind::VAR,
            TokenKind::FOR,
            TokenKind::IF,
            TokenKind::CONTINUE,
            TokenKind::ENDIF,
            TokenKind::PRINT,
            TokenKind::END,
            TokenKind::ECHO,
        ]
    );
    assert_eq!(
        postfix(&program.statements[0]),
        [["backbone", "specChain:A", "and"]]
    );
    // `for` header jumps past `end for`, which jumps back to the header
    assert_eq!(program.statements[2].tokens[0].int_value, 7);
    assert_eq!(program.statements[7].tokens[0].int_value, 2);
    assert_eq!(program.statements[4].tokens[0].int_value, 7);
    assert_eq!(program.statements[2].line, 5);
}

#[test]
fn test_statement_text_is_kept_for_errors() {
    let program = compile("select water;  print 1 + 2").unwrap();
    assert_eq!(program.statements[1].text, "print 1 + 2");
    assert_eq!(postfix(&program.statements[1]), [["1", "2", "+"]]);

    let err = compile("print 1\nselect within(").unwrap_err();
    assert_eq!(err.location.line, 2);
    assert_eq!(err.kind, CompileErrorKind::EndOfCommandUnexpected);
}

#[test]
fn test_expression_entry_point() {
    let tokens = Compiler::default()
        .compile_expression("a and b or c", Mode::Atom)
        .unwrap();
    let rendered: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    assert_eq!(rendered, ["definedSet:a", "definedSet:b", "and", "definedSet:c", "or"]);

    let tokens = Compiler::default()
        .compile_expression("{1 2 3}", Mode::Math)
        .unwrap();
    assert!(matches!(tokens[0].value, TokenValue::Point3(_)));
    assert_eq!(tokens[0].int_value, INT_UNSET);
}

#[test]
fn test_values_and_formatting_together() {
    let list = Variable::new(Value::List(vec!["4".into(), "5".into(), "6".into()]));
    let last = list.index(Selector::Item(-1));
    assert_eq!(last.value.as_int(), 5);

    let out = sprintf("%5.2f|%d|%s", &[Value::Decimal(3.14159), Value::Integer(7), Value::from("x")]);
    assert_eq!(out.as_string(), " 3.14|7|x");
}
