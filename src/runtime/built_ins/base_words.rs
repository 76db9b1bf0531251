use crate::{add_native_word, runtime::{error, interpreter::Interpreter}};
use std::io::{self, Write};

/// Duplicate the top value on the data stack.  Duplicating a string copies
/// its bytes; duplicating a quotation or handle shares the referent.
///
/// Signature: `value -- value value`
fn word_dup(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let value = interpreter.pop()?;

    interpreter.push(value.clone());
    interpreter.push(value);

    Ok(())
}

/// Drop the top value on the data stack.
///
/// Signature: `value -- `
fn word_drop(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let _ = interpreter.pop()?;

    Ok(())
}

/// Write a new line to stdout and flush it.
///
/// Signature: ` -- `
fn word_cr(_interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let mut stdout = io::stdout();

    stdout.write_all(b"\n")?;
    stdout.flush()?;

    Ok(())
}

/// Pop a string and write its bytes to stdout, verbatim, with no newline and
/// no flush.
///
/// Signature: `string -- `
fn word_print(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let bytes = interpreter.pop_as_string()?;

    io::stdout().write_all(&bytes)?;

    Ok(())
}

/// Clear the run flag.  The prompt loop and the event loop both stop once
/// it is cleared.
///
/// Signature: ` -- `
fn word_bye(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    interpreter.set_running(false);

    Ok(())
}

/// List every defined word, newest first, space separated and newline
/// terminated.  Shadowed entries are included.
///
/// Signature: ` -- `
fn word_words(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let mut stdout = io::stdout();

    for word in interpreter.dictionary().iter_newest_first() {
        stdout.write_all(word.name.as_bytes())?;
        stdout.write_all(b" ")?;
    }

    stdout.write_all(b"\n")?;
    stdout.flush()?;

    Ok(())
}

/// Register the core words.
pub fn register_base_words(interpreter: &mut dyn Interpreter) {
    add_native_word!(
        interpreter,
        "dup",
        word_dup,
        "Duplicate the top value on the data stack.",
        "value -- value value"
    );

    add_native_word!(
        interpreter,
        "drop",
        word_drop,
        "Discard the top value on the data stack.",
        "value -- "
    );

    add_native_word!(
        interpreter,
        "cr",
        word_cr,
        "Write a new line to stdout and flush.",
        " -- "
    );

    add_native_word!(
        interpreter,
        "print",
        word_print,
        "Write a string's bytes to stdout without a newline.",
        "string -- "
    );

    add_native_word!(
        interpreter,
        "bye",
        word_bye,
        "Clear the run flag and leave the interpreter.",
        " -- "
    );

    add_native_word!(
        interpreter,
        "words",
        word_words,
        "List all defined words, newest first.",
        " -- "
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::interpreter::{
        CodeManagement, InterpreterStack, WordManagement, forth_interpreter::ForthInterpreter,
    };

    fn interpreter() -> ForthInterpreter {
        let mut interpreter = ForthInterpreter::new().unwrap();

        register_base_words(&mut interpreter);
        interpreter
    }

    #[test]
    fn the_standard_vocabulary_is_present() {
        let interp = interpreter();

        for name in ["dup", "drop", "cr", "print", "bye", "words"] {
            assert!(interp.find_word(name).is_some(), "missing word {}", name);
        }
    }

    #[test]
    fn dup_and_drop_manage_the_stack() {
        let mut interp = interpreter();

        interp.process_source("<test>", "1 dup drop drop").unwrap();
        assert!(interp.stack().is_empty());

        interp.process_source("<test>", "2 dup").unwrap();
        assert_eq!(interp.stack().len(), 2);
    }
}
