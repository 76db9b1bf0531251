use crate::{
    lang::source_buffer::SourceLocation,
    runtime::interpreter::{CallStack, Interpreter},
};
use std::{
    error::Error,
    fmt::{self, Debug, Display, Formatter},
};

pub type Result<T> = std::result::Result<T, ScriptError>;

/// Any fault raised during the execution of a script.  Faults abort the
/// current execution and bubble up to the interpreter boundary; the embedding
/// driver decides what to do with them.
#[derive(Clone)]
pub struct ScriptError {
    /// The location in the source code the error occurred, if available.
    location: Option<SourceLocation>,

    /// The description of the error.
    error: String,

    /// The script's call stack at the time of the error, if available.
    call_stack: Option<CallStack>,
}

impl Error for ScriptError {}

/// Pretty print the error, with the source location when one was captured and
/// the script call stack when the fault happened inside word execution.
impl Display for ScriptError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}: {}", location, self.error)?,
            None => write!(f, "{}", self.error)?,
        }

        if let Some(call_stack) = &self.call_stack
            && !call_stack.is_empty()
        {
            write!(f, "\n\nCall stack\n")?;

            for item in call_stack.iter().rev() {
                writeln!(f, "  {}", item)?;
            }
        }

        Ok(())
    }
}

impl Debug for ScriptError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl ScriptError {
    /// Create a new ScriptError.
    pub fn new(
        location: Option<SourceLocation>,
        error: String,
        call_stack: Option<CallStack>,
    ) -> ScriptError {
        ScriptError {
            location,
            error,
            call_stack,
        }
    }

    /// Create a new ScriptError and wrap it in a Result::Err.
    pub fn new_as_result<T>(
        location: Option<SourceLocation>,
        error: String,
        call_stack: Option<CallStack>,
    ) -> Result<T> {
        Err(ScriptError::new(location, error, call_stack))
    }

    /// If available, the location in the source code the error occurred.
    pub fn location(&self) -> &Option<SourceLocation> {
        &self.location
    }

    /// The description of the error.
    pub fn error(&self) -> &String {
        &self.error
    }

    /// If available, the script's call stack at the time of the error.
    pub fn call_stack(&self) -> &Option<CallStack> {
        &self.call_stack
    }
}

/// Allow for the conversion of a std::io::Error into a ScriptError.
impl From<std::io::Error> for ScriptError {
    fn from(error: std::io::Error) -> ScriptError {
        ScriptError::new(None, format!("I/O error: {}", error), None)
    }
}

/// A convenience function for creating a ScriptError and wrapping it in a
/// Result::Err using the interpreter's current location and call stack.
pub fn script_error<T>(interpreter: &dyn Interpreter, message: String) -> Result<T> {
    let location = interpreter.current_location().clone();
    let call_stack = interpreter.call_stack().clone();

    ScriptError::new_as_result(location, message, Some(call_stack))
}

pub fn script_error_str<T>(interpreter: &dyn Interpreter, message: &str) -> Result<T> {
    script_error(interpreter, message.to_string())
}
