//! Line-oriented console for the scripting language.
//!
//! Each line is tokenized with the missing-semicolon repair, parsed as an
//! interpreter block, and evaluated against a persistent symbol table.
//! Errors are reported with a source caret and the console re-enters;
//! state survives across inputs.

use std::io::{BufRead, Write};

use crate::interpreter::Interpreter;
use crate::script::Script;

pub const PROMPT: &str = "> ";

pub fn run_repl<R: BufRead, W: Write>(mut input: R, mut output: W) -> std::io::Result<()> {
    let mut interp = Interpreter::new();
    let mut line = String::new();

    loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(());
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "quit" || trimmed == "exit" {
            return Ok(());
        }

        evaluate_line(&mut interp, trimmed, &mut output)?;
    }
}

/// One console interaction: returns after printing either the results or
/// a diagnostic, leaving the interpreter ready for the next line.
fn evaluate_line<W: Write>(
    interp: &mut Interpreter,
    source: &str,
    output: &mut W,
) -> std::io::Result<()> {
    let mut script = Script::new(source);

    if let Err(err) = script.tokenize(false) {
        return writeln!(output, "{}", err.display_with_source(source));
    }
    script.add_optional_semicolon();
    if let Err(err) = script.parse_interpreter_block() {
        return writeln!(output, "{}", err.display_with_source(source));
    }

    let root = script.ast().expect("parse populated the AST");
    match interp.evaluate_interpreter_block(root) {
        Ok(result) => {
            let printed = interp.take_output();
            write!(output, "{}", printed)?;
            if !result.invisible() {
                writeln!(output, "{}", result)?;
            }
            Ok(())
        }
        Err(err) => {
            // side effects that happened before the error still surface
            let printed = interp.take_output();
            write!(output, "{}", printed)?;
            writeln!(output, "{}", err.display_with_source(source))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(lines: &str) -> String {
        let mut out = Vec::new();
        run_repl(lines.as_bytes(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn results_auto_print_unless_invisible() {
        let out = session("3 + 4\nx = 10;\nx;\n");
        assert!(out.contains("7\n"));
        assert!(out.contains("10\n"));
        // the assignment itself printed nothing
        assert!(!out.contains("NULL"));
    }

    #[test]
    fn state_persists_across_lines() {
        let out = session("x = 2;\nx * 21\n");
        assert!(out.contains("42"));
    }

    #[test]
    fn errors_are_reported_and_the_console_recovers() {
        let out = session("frq\n1 + 1\n");
        assert!(out.contains("ERROR"));
        assert!(out.contains("frq"));
        assert!(out.contains("2\n"));
    }

    #[test]
    fn print_output_precedes_the_result() {
        let out = session("print(\"hi\"); 5\n");
        let hi = out.find("\"hi\"").unwrap();
        let five = out.rfind("5\n").unwrap();
        assert!(hi < five);
    }

    #[test]
    fn quit_ends_the_session() {
        let out = session("quit\nnever evaluated\n");
        assert!(!out.contains("never"));
    }
}
