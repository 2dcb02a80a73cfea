//! Batch and interactive entry points.
//!
//! Batch mode parses a simulation file into script blocks and drives the
//! event blocks tick by tick; any fatal error exits nonzero. Interpret
//! mode runs a file of free-standing statements. With no script (or with
//! `--repl`) the console comes up instead, where errors are reported and
//! the session re-enters.

use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;
use tracing_subscriber::EnvFilter;

use genic::interpreter::Interpreter;
use genic::script::Script;
use genic::value::Value;
use genic::ScriptBlock;

#[derive(ClapParser)]
#[command(name = "genic", version, about = "Forward-time population genetic simulator core")]
struct Cli {
    /// Simulation file to run (omit for the interactive console).
    script: Option<PathBuf>,

    /// Seed for the simulation PRNG; PID+time when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Number of ticks to drive event blocks through.
    #[arg(long, default_value_t = 10)]
    ticks: i64,

    /// Treat the script as free-standing statements instead of a
    /// simulation file.
    #[arg(long)]
    interpret: bool,

    /// Start the interactive console.
    #[arg(long)]
    repl: bool,

    /// Log tokens as they are lexed.
    #[arg(long)]
    log_tokens: bool,

    /// Log the parsed AST.
    #[arg(long)]
    log_ast: bool,

    /// Trace evaluation node by node.
    #[arg(long)]
    log_eval: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    genic::set_log_tokens(cli.log_tokens);
    genic::set_log_ast(cli.log_ast);
    genic::set_log_evaluation(cli.log_eval);

    let Some(script_path) = cli.script.as_ref().filter(|_| !cli.repl) else {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        return match genic::repl::run_repl(stdin.lock(), BufWriter::new(stdout.lock())) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("genic: console I/O error: {}", err);
                ExitCode::FAILURE
            }
        };
    };

    let source = match std::fs::read_to_string(script_path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("genic: cannot read {}: {}", script_path.display(), err);
            return ExitCode::FAILURE;
        }
    };

    let result = if cli.interpret {
        run_interpreter_file(&source, cli.seed)
    } else {
        run_simulation_file(&source, cli.seed, cli.ticks)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{}", message);
            ExitCode::FAILURE
        }
    }
}

fn make_interpreter(seed: Option<u64>) -> Interpreter {
    let mut interp = Interpreter::new();
    if let Some(seed) = seed {
        interp.rng.reseed(seed);
    }
    tracing::info!(seed = interp.rng.seed(), "simulation PRNG initialized");
    interp
}

fn run_interpreter_file(source: &str, seed: Option<u64>) -> Result<(), String> {
    let mut script = Script::new(source);
    script.tokenize(false).map_err(|e| e.display_with_source(source))?;
    script.parse_interpreter_block().map_err(|e| e.display_with_source(source))?;

    let mut interp = make_interpreter(seed);
    let root = script.ast().expect("parse populated the AST");
    let result = interp
        .evaluate_interpreter_block(root)
        .map_err(|e| e.display_with_source(source))?;

    print!("{}", interp.take_output());
    if !result.invisible() {
        println!("{}", result);
    }
    Ok(())
}

/// The thin batch driver: event blocks run in tick order with `tick`
/// bound; callbacks are parsed and listed but only an embedding kernel
/// dispatches them.
fn run_simulation_file(source: &str, seed: Option<u64>, ticks: i64) -> Result<(), String> {
    let mut script = Script::new(source);
    script.tokenize(false).map_err(|e| e.display_with_source(source))?;
    script.parse_sim_file().map_err(|e| e.display_with_source(source))?;
    let root = script.take_ast().expect("parse populated the AST");
    let blocks =
        ScriptBlock::blocks_from_sim_file(root).map_err(|e| e.display_with_source(source))?;

    for block in blocks.iter().filter(|b| b.is_callback()) {
        tracing::info!(
            kind = ?block.kind,
            start = block.start_tick,
            end = block.end_tick,
            "callback block registered; dispatched by the simulation kernel only"
        );
    }

    let mut interp = make_interpreter(seed);
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    for tick in 1..=ticks {
        interp
            .symbols
            .set_variable("tick", Value::integer(tick))
            .map_err(|e| format!("ERROR (Evaluate): {}", e))?;

        for block in blocks.iter().filter(|b| !b.is_callback() && b.matches_tick(tick)) {
            interp
                .evaluate_block_body(block.body())
                .map_err(|e| e.display_with_source(source))?;
            let output = interp.take_output();
            write!(out, "{}", output).map_err(|e| e.to_string())?;
        }
    }
    out.flush().map_err(|e| e.to_string())?;
    Ok(())
}
