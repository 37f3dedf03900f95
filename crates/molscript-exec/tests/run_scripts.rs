//! Whole scripts run through the engine's public API

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use molscript_exec::prelude::*;
use molscript_exec::{RuntimeError, SelectionSnapshot};
use molscript_mol::{AtomSet, Molecule};

const DIPEPTIDE: &str = r#"{
    "name": "dipeptide",
    "atoms": [
        {"name": "N",  "element": "N", "resn": "ALA", "resv": 1, "chain": "A", "coord": [0.0, 0.0, 0.0]},
        {"name": "CA", "element": "C", "resn": "ALA", "resv": 1, "chain": "A", "coord": [1.5, 0.0, 0.0]},
        {"name": "C",  "element": "C", "resn": "ALA", "resv": 1, "chain": "A", "coord": [2.5, 1.0, 0.0]},
        {"name": "O",  "element": "O", "resn": "ALA", "resv": 1, "chain": "A", "coord": [2.5, 2.2, 0.0]},
        {"name": "H",  "element": "H", "resn": "ALA", "resv": 1, "chain": "A", "coord": [-0.9, 0.0, 0.0]},
        {"name": "N",  "element": "N", "resn": "GLY", "resv": 2, "chain": "A", "coord": [3.6, 0.5, 0.0]},
        {"name": "CA", "element": "C", "resn": "GLY", "resv": 2, "chain": "A", "coord": [4.8, 1.0, 0.0]},
        {"name": "O",  "element": "O", "resn": "HOH", "resv": 100, "chain": "W", "coord": [10.0, 0.0, 0.0], "hetatm": true},
        {"name": "C1", "element": "C", "resn": "LIG", "resv": 200, "chain": "B", "coord": [15.0, 0.0, 0.0], "hetatm": true}
    ],
    "bonds": [
        {"a": 0, "b": 1}, {"a": 1, "b": 2}, {"a": 2, "b": 3, "order": "double"},
        {"a": 0, "b": 4}, {"a": 2, "b": 5}, {"a": 5, "b": 6}
    ]
}"#;

fn engine() -> (ScriptEngine, SharedOutput) {
    let model = Molecule::from_json(DIPEPTIDE).unwrap();
    let mut engine = ScriptEngine::new(Arc::new(model));
    let out = SharedOutput::new();
    engine.set_output(Box::new(out.clone()));
    (engine, out)
}

fn indices(atoms: &AtomSet) -> Vec<usize> {
    atoms.iter().collect()
}

fn selected(engine: &ScriptEngine) -> Vec<usize> {
    indices(engine.selection().selected())
}

#[test]
fn test_for_loop_sums() {
    let (mut engine, out) = engine();
    engine
        .run("var s = 0\nfor (var i = 1; i <= 4; i++)\ns = s + i\nend for\nprint s")
        .unwrap();
    assert_eq!(out.lines(), ["10"]);
}

#[test]
fn test_break_and_continue() {
    let (mut engine, out) = engine();
    let script = "
        for (i = 0; i < 10; i++)
            if (i == 5)
                break
            endif
            if (i % 2 == 0)
                continue
            endif
            print i
        end for
        print \"after\"
    ";
    engine.run(script).unwrap();
    assert_eq!(out.lines(), ["1", "3", "after"]);
}

#[test]
fn test_nested_loops() {
    let (mut engine, out) = engine();
    let script = "
        for (i = 1; i <= 2; i++)
            for (j = 1; j <= 2; j++)
                print i * 10 + j
            end for
        end for
    ";
    engine.run(script).unwrap();
    assert_eq!(out.lines(), ["11", "12", "21", "22"]);
}

#[test]
fn test_function_return() {
    let (mut engine, out) = engine();
    engine
        .run("function add(a, b)\nreturn a + b\nend function\nprint add(2, 3)")
        .unwrap();
    assert_eq!(out.lines(), ["5"]);
}

#[test]
fn test_recursive_function() {
    let (mut engine, out) = engine();
    let script = "
        function fact(n)
            if (n <= 1)
                return 1
            endif
            return n * fact(n - 1)
        end function
        print fact(5)
    ";
    engine.run(script).unwrap();
    assert_eq!(out.lines(), ["120"]);
}

#[test]
fn test_runaway_recursion_is_an_error() {
    let (mut engine, _) = engine();
    let script = "
        set maxCallDepth 16
        function f(n)
            return f(n + 1)
        end function
        print f(1)
    ";
    let err = engine.run(script).unwrap_err();
    match err {
        ScriptError::Runtime { source, .. } => {
            assert!(matches!(source, RuntimeError::CallDepthExceeded(16)))
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(engine.status(), EngineState::Error);
}

#[test]
fn test_runaway_recursion_stops_at_default_depth() {
    let (mut engine, _) = engine();
    assert_eq!(engine.settings().max_call_depth, 64);
    let err = engine
        .run("function f(n)\nreturn f(n + 1)\nend function\nprint f(1)")
        .unwrap_err();
    match err {
        ScriptError::Runtime { line, source, .. } => {
            assert_eq!(line, 4);
            assert!(matches!(source, RuntimeError::CallDepthExceeded(64)));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_deep_recursion_within_limit() {
    let (mut engine, out) = engine();
    let script = "
        function total(n)
            if (n <= 0)
                return 0
            endif
            return n + total(n - 1)
        end function
        print total(60)
    ";
    engine.run(script).unwrap();
    assert_eq!(out.lines(), ["1830"]);
}

#[test]
fn test_error_inside_function_names_it() {
    let (mut engine, _) = engine();
    let err = engine
        .run("function bad()\nreturn 1 / 0\nend function\nprint bad()")
        .unwrap_err();
    match err {
        ScriptError::Runtime { line, source, .. } => {
            assert_eq!(line, 4);
            match source {
                RuntimeError::Function { name, line, .. } => {
                    assert_eq!(name, "bad");
                    assert_eq!(line, 2);
                }
                other => panic!("unexpected error: {}", other),
            }
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_delay_waits_for_ticks() {
    let (mut engine, out) = engine();
    let result = engine.run("print 1\ndelay 1\nprint 2").unwrap();
    assert_eq!(result, ExecutionResult::Suspended { frames: 30 });
    assert_eq!(engine.status(), EngineState::Suspended);
    assert_eq!(out.lines(), ["1"]);

    for _ in 0..29 {
        assert!(matches!(
            engine.tick().unwrap(),
            ExecutionResult::Suspended { .. }
        ));
    }
    assert_eq!(engine.tick().unwrap(), ExecutionResult::Completed);
    assert_eq!(out.lines(), ["1", "2"]);
}

#[test]
fn test_delay_inside_function_is_skipped() {
    let (mut engine, out) = engine();
    let result = engine
        .run("function slow()\ndelay 2\nreturn 7\nend function\nprint slow()")
        .unwrap();
    assert_eq!(result, ExecutionResult::Completed);
    assert_eq!(out.lines(), ["7"]);
}

#[test]
fn test_halt_cancels_script() {
    let (mut engine, out) = engine();
    engine.run("select carbon\ndelay 1\nselect none\nprint 1").unwrap();
    engine.halt_token().halt();
    assert_eq!(engine.tick().unwrap(), ExecutionResult::Cancelled);
    assert_eq!(engine.status(), EngineState::Ready);
    assert!(out.lines().is_empty());
    assert_eq!(selected(&engine), [1, 2, 6, 8]);

    // a new script starts with the token cleared
    engine.run("print 2").unwrap();
    assert_eq!(out.lines(), ["2"]);
}

#[test]
fn test_select_default_exclusions() {
    let (mut engine, _) = engine();
    engine.run("select").unwrap();
    assert_eq!(selected(&engine), (0..9).collect::<Vec<_>>());

    engine.run("set selectHydrogen false\nselect").unwrap();
    assert_eq!(selected(&engine), [0, 1, 2, 3, 5, 6, 7, 8]);

    engine.run("set selectHetero false\nselect").unwrap();
    assert_eq!(selected(&engine), [0, 1, 2, 3, 5, 6]);
}

#[test]
fn test_large_residue_numbers_compare_exactly() {
    let model = Molecule::from_json(
        r#"{
            "name": "long",
            "atoms": [
                {"name": "CA", "element": "C", "resn": "ALA", "resv": 16777216, "coord": [0.0, 0.0, 0.0]},
                {"name": "CA", "element": "C", "resn": "GLY", "resv": 16777217, "coord": [3.8, 0.0, 0.0]}
            ]
        }"#,
    )
    .unwrap();
    let mut engine = ScriptEngine::new(Arc::new(model));
    engine.set_output(Box::new(SharedOutput::new()));
    engine.run("select resno=16777217").unwrap();
    assert_eq!(selected(&engine), [1]);
    engine.run("select resno < 16777217").unwrap();
    assert_eq!(selected(&engine), [0]);
}

#[test]
fn test_restrict() {
    let (mut engine, _) = engine();
    engine.run("restrict carbon").unwrap();
    assert_eq!(selected(&engine), [1, 2, 6, 8]);
    assert_eq!(indices(engine.selection().hidden()), [0, 3, 4, 5, 7]);
}

#[test]
fn test_invert_selection_twice_is_identity() {
    let (mut engine, _) = engine();
    engine.run("select oxygen\ninvertSelection").unwrap();
    assert_eq!(selected(&engine), [0, 1, 2, 4, 5, 6, 8]);
    engine.run("invertSelection").unwrap();
    assert_eq!(selected(&engine), [3, 7]);
}

#[test]
fn test_delete_removes_atoms_everywhere() {
    let (mut engine, out) = engine();
    engine.run("select all\ndelete water\nprint {all}.size").unwrap();
    assert_eq!(out.lines(), ["8"]);
    assert!(!engine.selection().selected().contains(7));
    assert_eq!(indices(engine.selection().deleted()), [7]);
}

#[test]
fn test_subset_limits_selection() {
    let (mut engine, _) = engine();
    engine.run("subset :A\nselect").unwrap();
    assert_eq!(indices(&engine.selection().effective_selection()), [0, 1, 2, 3, 4, 5, 6]);
    engine.run("subset").unwrap();
    assert!(engine.selection().subset().is_none());
}

#[test]
fn test_variable_as_atom_expression() {
    let (mut engine, _) = engine();
    engine
        .run("pick = \"carbon and not hetero\"\nselect @pick")
        .unwrap();
    assert_eq!(selected(&engine), [1, 2, 6]);
}

#[test]
fn test_defined_set_is_resolved_at_use() {
    let (mut engine, _) = engine();
    engine
        .run("define heavy not hydrogen and not water\ndelete LIG\nselect heavy")
        .unwrap();
    assert_eq!(selected(&engine), [0, 1, 2, 3, 5, 6]);
}

#[test]
fn test_sprintf_output() {
    let (mut engine, out) = engine();
    engine
        .run("print sprintf(\"%5.2f|%d|%s\", 3.14159, 7, \"x\")")
        .unwrap();
    assert_eq!(out.lines(), [" 3.14|7|x"]);
}

#[test]
fn test_echo_and_message() {
    let (mut engine, out) = engine();
    engine.run("echo hello world\nmessage step 1").unwrap();
    assert_eq!(out.lines_of(OutputKind::Echo), ["hello world"]);
    assert_eq!(out.lines_of(OutputKind::Message), ["step 1"]);
}

#[test]
fn test_listener_sees_each_change() {
    let (mut engine, _) = engine();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    engine.subscribe(Box::new(move |_: &AtomSet| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    engine.run("select carbon\nselect none").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_state_round_trip() {
    let (mut engine, _) = engine();
    engine
        .run("set selectHydrogen false\ndefine polar oxygen or nitrogen\ndelete LIG\nhide water\nselect polar\nsubset :A")
        .unwrap();
    let state = engine.state();

    let (mut restored, _) = self::engine();
    restored.run(&state).unwrap();

    let a: SelectionSnapshot = engine.selection().snapshot();
    let b: SelectionSnapshot = restored.selection().snapshot();
    assert_eq!(indices(&a.selected), indices(&b.selected));
    assert_eq!(indices(&a.hidden), indices(&b.hidden));
    assert_eq!(indices(&a.deleted), indices(&b.deleted));
    assert_eq!(
        a.subset.as_deref().map(indices),
        b.subset.as_deref().map(indices)
    );
    assert!(!restored.settings().select_hydrogen);
    assert_eq!(restored.defined_sets(), ["polar"]);
    assert_eq!(restored.state(), state);
}

#[test]
fn test_compile_error_runs_nothing() {
    let (mut engine, out) = engine();
    let err = engine.run("print 1\nselect (water").unwrap_err();
    assert!(matches!(err, ScriptError::Compile(_)));
    assert_eq!(err.line(), Some(2));
    assert!(out.lines().is_empty());
}
