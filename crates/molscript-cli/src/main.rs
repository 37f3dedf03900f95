//! molscript command-line entry point
//!
//! Run with:
//! ```bash
//! molscript model.json                  # REPL against a model
//! molscript model.json demo.spt         # run a script, then exit
//! molscript -i model.json demo.spt      # run a script, then open the REPL
//! molscript --check demo.spt            # compile and check without running
//! molscript --settings engine.json ...  # start from saved engine settings
//! ```
//!
//! Each REPL line is run as a script. A line ending in `\` continues on the
//! next one, which is how `if` / `for` / `function` blocks are typed in.
//! `state` prints the state script, `load <file>` replaces the model and
//! `quit` leaves.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use molscript_exec::prelude::*;
use molscript_exec::EngineSettings;
use molscript_mol::Molecule;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const USAGE: &str = "usage: molscript [-i] [--check] [--settings FILE] [MODEL.json] [SCRIPT...]";

/// How long to wait for the script thread before checking it is alive
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Writes script output to the terminal
struct ConsoleOutput;

impl OutputSink for ConsoleOutput {
    fn write_line(&mut self, kind: OutputKind, line: &str) {
        match kind {
            OutputKind::Error => eprintln!("Error: {}", line),
            OutputKind::Message => println!("> {}", line),
            OutputKind::Print | OutputKind::Echo => println!("{}", line),
        }
    }
}

#[derive(Debug, Default)]
struct Options {
    model: Option<PathBuf>,
    scripts: Vec<PathBuf>,
    settings: Option<PathBuf>,
    check: bool,
    interactive: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Options, String> {
    let mut options = Options::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-i" | "--interactive" => options.interactive = true,
            "-c" | "--check" => options.check = true,
            "-s" | "--settings" => {
                let path = args.next().ok_or("--settings needs a file")?;
                options.settings = Some(PathBuf::from(path));
            }
            "-h" | "--help" => return Err(String::new()),
            flag if flag.starts_with('-') => return Err(format!("unknown option {}", flag)),
            _ => {
                let path = PathBuf::from(arg);
                let is_model = path
                    .extension()
                    .is_some_and(|e| e.eq_ignore_ascii_case("json"));
                if is_model && options.model.is_none() {
                    options.model = Some(path);
                } else {
                    options.scripts.push(path);
                }
            }
        }
    }
    Ok(options)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = match parse_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("{}", message);
            }
            eprintln!("{}", USAGE);
            return ExitCode::from(2);
        }
    };

    let settings = match &options.settings {
        Some(path) => match std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| EngineSettings::from_json(&text).map_err(|e| e.to_string()))
        {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Error: cannot read settings {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => EngineSettings::default(),
    };

    let model = match &options.model {
        Some(path) => match Molecule::load(path) {
            Ok(mol) => mol,
            Err(e) => {
                eprintln!("Error: cannot load {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => Molecule::new("empty"),
    };

    let mut engine = ScriptEngine::with_settings(Arc::new(model), settings);
    engine.set_output(Box::new(ConsoleOutput));

    if options.check {
        return check_scripts(&engine, &options.scripts);
    }

    let runner = ScriptRunner::spawn(engine);
    let mut ok = true;
    for path in &options.scripts {
        match std::fs::read_to_string(path) {
            Ok(script) => {
                log::info!("running {}", path.display());
                ok &= run_script(&runner, script);
            }
            Err(e) => {
                eprintln!("Error: cannot read {}: {}", path.display(), e);
                ok = false;
            }
        }
    }

    if options.interactive || options.scripts.is_empty() {
        if let Err(e) = repl(&runner) {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    }
    runner.shutdown();

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn check_scripts(engine: &ScriptEngine, scripts: &[PathBuf]) -> ExitCode {
    let mut ok = true;
    for path in scripts {
        let result = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| engine.syntax_check(&text).map_err(|e| e.to_string()));
        match result {
            Ok(()) => println!("{}: ok", path.display()),
            Err(e) => {
                println!("{}: {}", path.display(), e);
                ok = false;
            }
        }
    }
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Run one script to the end, ticking once per frame while it is suspended
fn run_script(runner: &ScriptRunner, script: String) -> bool {
    let frame_rate = runner.engine().lock().settings().frame_rate.max(1);
    let frame = Duration::from_secs(1) / frame_rate;
    runner.run(script);
    loop {
        match runner.wait(POLL_INTERVAL) {
            Some(Ok(ExecutionResult::Suspended { .. })) => {
                std::thread::sleep(frame);
                runner.tick();
            }
            Some(Ok(ExecutionResult::Completed)) => return true,
            Some(Ok(ExecutionResult::Cancelled)) => {
                println!("script cancelled");
                return false;
            }
            Some(Err(e)) => {
                eprintln!("Error: {}", e);
                return false;
            }
            None if runner.is_alive() => {}
            None => {
                eprintln!("Error: script thread stopped");
                return false;
            }
        }
    }
}

fn repl(runner: &ScriptRunner) -> rustyline::Result<()> {
    let mut rl = DefaultEditor::new()?;
    let mut pending = String::new();
    loop {
        let prompt = if pending.is_empty() { "molscript> " } else { "       ... " };
        let line = match rl.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) if !pending.is_empty() => {
                pending.clear();
                continue;
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e),
        };
        let line = line.trim_end();
        if !line.trim().is_empty() {
            let _ = rl.add_history_entry(line);
        }

        if let Some(head) = line.strip_suffix('\\') {
            pending.push_str(head);
            pending.push('\n');
            continue;
        }
        pending.push_str(line);
        let script = std::mem::take(&mut pending);

        match script.trim() {
            "" => {}
            "quit" | "exit" => break,
            "state" => println!("{}", runner.engine().lock().state()),
            command => match command.strip_prefix("load ") {
                Some(path) => load(runner, path.trim()),
                None => {
                    run_script(runner, script);
                }
            },
        }
    }
    Ok(())
}

fn load(runner: &ScriptRunner, path: &str) {
    match Molecule::load(path) {
        Ok(mol) => runner.engine().lock().load_model(Arc::new(mol)),
        Err(e) => eprintln!("Error: cannot load {}: {}", path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let options = parse_args(args(&["-i", "model.json", "a.spt", "b.spt"])).unwrap();
        assert!(options.interactive);
        assert_eq!(options.model, Some(PathBuf::from("model.json")));
        assert_eq!(options.scripts.len(), 2);

        let options = parse_args(args(&["--settings", "engine.json", "--check", "a.spt"])).unwrap();
        assert!(options.check);
        assert_eq!(options.settings, Some(PathBuf::from("engine.json")));
        assert!(options.model.is_none());
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(args(&["--bogus"])).is_err());
        assert!(parse_args(args(&["--settings"])).is_err());
    }
}
