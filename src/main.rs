use clap::Parser;
use rustyline::{DefaultEditor, error::ReadlineError};
use tracing_subscriber::EnvFilter;
use uvforth::runtime::{
    built_ins::{base_words::register_base_words, uv_words::register_uv_words},
    error::{self, ScriptError},
    interpreter::{CodeManagement, EventManagement, forth_interpreter::ForthInterpreter},
};

/// A tiny concatenative interpreter with asynchronous timer and TCP words.
#[derive(Parser)]
#[command(name = "uvforth", version)]
struct Cli {
    /// Script files to interpret in order; starts an interactive prompt when
    /// omitted.
    scripts: Vec<String>,
}

/// The interactive prompt: one line at a time through the tokenizer, until
/// end of input or a script clears the run flag.
fn repl(interpreter: &mut ForthInterpreter) -> error::Result<()> {
    let mut editor = DefaultEditor::new().map_err(|err| {
        ScriptError::new(None, format!("Could not start the prompt: {}", err), None)
    })?;

    while interpreter.is_running() {
        match editor.readline("> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(&line);
                interpreter.process_source("<repl>", &line)?;
            }

            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,

            Err(err) => {
                return ScriptError::new_as_result(
                    None,
                    format!("Could not read input: {}", err),
                    None,
                );
            }
        }
    }

    Ok(())
}

fn main() -> error::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Create the interpreter and register the words implemented in Rust.
    let mut interpreter = ForthInterpreter::new()?;

    register_base_words(&mut interpreter);
    register_uv_words(&mut interpreter);

    if cli.scripts.is_empty() {
        repl(&mut interpreter)?;
    } else {
        for script in &cli.scripts {
            interpreter.process_source_file(script)?;
        }
    }

    Ok(())
}
