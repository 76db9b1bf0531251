use crate::{
    lang::{source_buffer::SourceLocation, tokenizing::Token},
    runtime::{
        data_structures::{
            dictionary::{Dictionary, WordInfo},
            handles::{HandleId, HandleKind, HandleRegistry},
            quotations::QuoteId,
            value::Value,
        },
        error,
        event_loop::EventLoop,
    },
};
use std::{
    fmt::{self, Display, Formatter},
    rc::Rc,
};

pub mod forth_interpreter;

/// A call stack item records the executing word's name and the location from
/// which it was invoked.  The items are read-only and the fields are accessed
/// by member functions.
#[derive(Clone, Debug)]
pub struct CallItem {
    location: SourceLocation,
    word: String,
}

impl CallItem {
    /// Create a new call stack item.
    pub fn new(word: String, location: SourceLocation) -> CallItem {
        CallItem { location, word }
    }

    /// Where in the source code the execution of this word was found.
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    /// The name of the word being executed.
    pub fn word(&self) -> &String {
        &self.word
    }
}

/// Make sure that call items can be nicely displayed in event of an error.
impl Display for CallItem {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.word)
    }
}

/// The stack of words currently being executed, used to give faults a script
/// backtrace.
pub type CallStack = Vec<CallItem>;

/// The data stack of values managed by the interpreter.
pub type ValueStack = Vec<Value>;

/// Definition of a word handler function.  This is the function that is
/// called when a native word executes.  Can be a closure or a Rust function.
pub type WordHandler = dyn Fn(&mut dyn Interpreter) -> error::Result<()>;

/// Trait for managing the interpreter's data stack.  Intended to be called by
/// words, both native and scripted.
pub trait InterpreterStack {
    /// Examine the full data stack.
    fn stack(&self) -> &ValueStack;

    /// The maximum depth the stack has reached so far.
    fn stack_max_depth(&self) -> usize;

    /// Push a value onto the stack.  This is the primary way of sending
    /// values to words.
    fn push(&mut self, value: Value);

    /// Pop a value from the stack.  If the stack is empty a stack underflow
    /// error is returned.
    fn pop(&mut self) -> error::Result<Value>;

    /// Pop the top value, requiring an integer.  A tag mismatch is an error.
    fn pop_as_int(&mut self) -> error::Result<i64>;

    /// Pop the top value, requiring a string, and take ownership of its
    /// bytes.  A tag mismatch is an error.
    fn pop_as_string(&mut self) -> error::Result<Vec<u8>>;

    /// Pop the top value, requiring a quotation reference.  A tag mismatch is
    /// an error.
    fn pop_as_quote(&mut self) -> error::Result<QuoteId>;
}

/// Trait for managing and executing words known to the interpreter.
pub trait WordManagement {
    /// If currently set, the location execution has reached in the original
    /// source code.
    fn current_location(&self) -> &Option<SourceLocation>;

    /// Add a new native word to the dictionary.
    #[allow(clippy::too_many_arguments)]
    fn add_word(
        &mut self,
        file: String,
        line: usize,
        column: usize,
        name: String,
        handler: Rc<WordHandler>,
        description: String,
        signature: String,
    );

    /// Add a new colon definition to the dictionary.
    fn add_colon_word(&mut self, location: SourceLocation, name: String, quote: QuoteId);

    /// Find a word in the dictionary by name, newest entry first.
    fn find_word(&self, name: &str) -> Option<WordInfo>;

    /// Find and execute a word by name.  Supply a source location to
    /// represent where the word was executed from; use `location_here!()`
    /// when calling from Rust code.
    fn execute_word_named(&mut self, location: &SourceLocation, name: &str)
    -> error::Result<()>;

    /// The current script execution call stack.
    fn call_stack(&self) -> &CallStack;

    /// The dictionary of words known by the interpreter.
    fn dictionary(&self) -> &Dictionary;
}

/// Trait for managing quotations and executing token streams.  Quotations
/// are the unit of deferred execution: definition bodies and I/O callbacks
/// are both stored here.
pub trait CodeManagement {
    /// Create a new empty quotation and return its identifier.
    fn new_quote(&mut self) -> QuoteId;

    /// Append a token to a quotation under construction.
    fn quote_append(&mut self, id: QuoteId, token: Token) -> error::Result<()>;

    /// Read access to a quotation's tokens.  The result keeps the body alive
    /// independently of the store slot.
    fn quote_tokens(&self, id: QuoteId) -> error::Result<Rc<Vec<Token>>>;

    /// Release a quotation's slot.  Only callback replacement and handle
    /// teardown do this.
    fn free_quote(&mut self, id: QuoteId);

    /// Execute a token stream.  Names resolve at this moment, not earlier.
    fn execute_tokens(&mut self, tokens: &[Token]) -> error::Result<()>;

    /// Execute a stored quotation by identifier.
    fn execute_quote(&mut self, id: QuoteId) -> error::Result<()>;

    /// Tokenize and execute a source string.  The path parameter represents
    /// the source in error reports; the prompt uses "\<repl\>".
    fn process_source(&mut self, path: &str, source: &str) -> error::Result<()>;

    /// Read, tokenize, and execute a source file.
    fn process_source_file(&mut self, path: &str) -> error::Result<()>;
}

/// Trait for managing the registry of live I/O handles.
pub trait HandleManagement {
    /// Register a fresh handle of the given kind.
    fn new_handle(&mut self, kind: HandleKind) -> HandleId;

    /// The registry of live handles.
    fn handles(&self) -> &HandleRegistry;

    /// The registry of live handles, mutable.
    fn handles_mut(&mut self) -> &mut HandleRegistry;

    /// Pop the top value, requiring a live handle that is not closing, and
    /// optionally requiring a specific kind.  Any mismatch is an error,
    /// raised before any I/O is scheduled.
    fn pop_as_handle(&mut self, want: Option<HandleKind>) -> error::Result<HandleId>;
}

/// Trait tying the interpreter to its event loop and run flag.
pub trait EventManagement {
    /// The event loop serving this interpreter's I/O words.
    fn io(&self) -> &EventLoop;

    /// Run the event loop, dispatching I/O completions into their stored
    /// quotations, until no event source remains or the run flag is cleared.
    /// This is the interpreter's only suspension point.
    fn run_loop(&mut self) -> error::Result<()>;

    /// Is the interpreter still supposed to be running?
    fn is_running(&self) -> bool;

    /// Set or clear the run flag.  The `bye` word clears it.
    fn set_running(&mut self, running: bool);
}

/// Core interpreter trait, bringing together the traits that define the
/// interpreter's functionality.
pub trait Interpreter:
    InterpreterStack + WordManagement + CodeManagement + HandleManagement + EventManagement
{
}

/// Simplify registering a native word with the interpreter.
///
/// Required parameters are: the interpreter instance to register with, the
/// name of the word, the word function handler, a simple description, and
/// the word's stack signature.
#[macro_export]
macro_rules! add_native_word {
    (
        $interpreter:expr ,
        $name:expr ,
        $function:expr ,
        $description:expr ,
        $signature:expr
    ) => {{
        use std::rc::Rc;

        // Register the word while recording where in the Rust source code the
        // registration happened.
        $interpreter.add_word(
            file!().to_string(),
            line!() as usize,
            column!() as usize,
            $name.to_string(),
            Rc::new($function),
            $description.to_string(),
            $signature.to_string(),
        );
    }};
}
