use crate::{
    lang::{
        source_buffer::SourceLocation,
        tokenizing::{Token, tokenize_from_source},
    },
    runtime::{
        data_structures::{
            dictionary::{Dictionary, WordInfo, WordKind},
            handles::{HandleId, HandleKind, HandleRegistry, HandleState},
            quotations::{QuoteId, QuoteStore},
            value::Value,
        },
        error::{self, ScriptError, script_error, script_error_str},
        event_loop::{EventLoop, LoopEvent},
        interpreter::{
            CallItem, CallStack, CodeManagement, EventManagement, HandleManagement, Interpreter,
            InterpreterStack, ValueStack, WordHandler, WordManagement,
        },
    },
};
use std::{fs::read_to_string, rc::Rc};
use tracing::trace;

/// A colon definition in flight: the name that followed `:`, where the
/// definition started, and the quotation collecting its body.  Committed by
/// `;`, discarded if the token stream ends first.
struct ColonDefinition {
    name: String,
    location: SourceLocation,
    quote: QuoteId,
}

/// The core interpreter: the data stack, the dictionary, the quotation
/// store, the handle registry, and the event loop, all owned by this one
/// context.
#[derive(Debug)]
pub struct ForthInterpreter {
    /// The maximum depth of the data stack during execution.
    max_depth: usize,

    /// The data stack used by the interpreter.
    stack: ValueStack,

    /// The last known location execution has reached in the source code.
    current_location: Option<SourceLocation>,

    /// The call stack used to keep track of the current execution context.
    call_stack: CallStack,

    /// The dictionary of words known by the interpreter.
    dictionary: Dictionary,

    /// The owning store of compiled quotations.
    quotes: QuoteStore,

    /// The registry of live I/O handles.
    handles: HandleRegistry,

    /// The event loop serving the I/O words.
    io: EventLoop,

    /// Cleared by `bye`; checked by the driver's prompt loop and by the
    /// event loop after every dispatched callback.
    running: bool,
}

impl ForthInterpreter {
    /// Create a new interpreter with an empty dictionary and a fresh event
    /// loop.
    pub fn new() -> error::Result<ForthInterpreter> {
        let io = EventLoop::new()?;

        Ok(ForthInterpreter {
            max_depth: 0,
            stack: ValueStack::new(),
            current_location: None,
            call_stack: CallStack::new(),
            dictionary: Dictionary::new(),
            quotes: QuoteStore::new(),
            handles: HandleRegistry::new(),
            io,
            running: true,
        })
    }

    /// Capture a bracketed group into a fresh quotation, starting just past
    /// the opening `[`.  Inner groups are captured recursively and appear in
    /// the enclosing quotation as single quotation-reference tokens.  Returns
    /// the new quotation and the index just past the matching `]`.
    fn capture_quotation(
        &mut self,
        tokens: &[Token],
        start: usize,
        opening: &SourceLocation,
    ) -> error::Result<(QuoteId, usize)> {
        let captured = self.new_quote();
        let mut index = start;

        while index < tokens.len() {
            match &tokens[index] {
                Token::Word(location, word) if word == "[" => {
                    let location = location.clone();
                    let (inner, next) = self.capture_quotation(tokens, index + 1, &location)?;

                    self.quote_append(captured, Token::Quote(location, inner))?;
                    index = next;
                }

                Token::Word(_, word) if word == "]" => return Ok((captured, index + 1)),

                other => {
                    self.quote_append(captured, other.clone())?;
                    index += 1;
                }
            }
        }

        ScriptError::new_as_result(
            Some(opening.clone()),
            "Unclosed quotation, expected a matching ']'.".to_string(),
            Some(self.call_stack.clone()),
        )
    }

    /// Execute a word: native words call straight into Rust, colon words
    /// interpret their stored quotation.
    fn execute_word(&mut self, location: &SourceLocation, word: &WordInfo) -> error::Result<()> {
        self.call_stack
            .push(CallItem::new(word.name.clone(), location.clone()));

        let result = match &word.kind {
            WordKind::Native(handler) => {
                let handler = handler.clone();
                (*handler)(self)
            }

            WordKind::Colon(quote) => self.execute_quote(*quote),
        };

        let _ = self.call_stack.pop();

        result
    }

    /// Translate one I/O completion into stack pushes and a re-entry into the
    /// stored callback quotation.
    fn dispatch_event(&mut self, event: LoopEvent) -> error::Result<()> {
        match event {
            LoopEvent::TimerFired { handle } => {
                let callback = match self.handles.get(handle) {
                    Some(entry) if entry.state != HandleState::Closing => entry.callback,
                    _ => return Ok(()),
                };

                // A timer with no callback fires into the void: nothing is
                // pushed.
                if let Some(callback) = callback {
                    self.push(Value::Handle(handle));
                    self.execute_quote(callback)?;
                }

                Ok(())
            }

            LoopEvent::Accepted { server, stream } => {
                let callback = match self.handles.get(server) {
                    Some(entry) if entry.state != HandleState::Closing => entry.callback,
                    _ => return Ok(()),
                };

                let client = self.handles.insert(HandleKind::Tcp);
                let (reader, writer) = stream.into_split();
                let submit = self.io.start_writer(writer);

                if let Some(entry) = self.handles.get_mut(client) {
                    entry.reader = Some(reader);
                    entry.writer = Some(submit);
                }

                self.push(Value::Handle(client));

                if let Some(callback) = callback {
                    self.execute_quote(callback)?;
                }

                Ok(())
            }

            LoopEvent::Connected { handle, stream } => {
                let callback = match self.handles.get(handle) {
                    Some(entry) if entry.state != HandleState::Closing => entry.callback,
                    _ => return Ok(()),
                };

                let (reader, writer) = stream.into_split();
                let submit = self.io.start_writer(writer);

                if let Some(entry) = self.handles.get_mut(handle) {
                    entry.reader = Some(reader);
                    entry.writer = Some(submit);
                    entry.task = None;
                }

                self.push(Value::Handle(handle));

                if let Some(callback) = callback {
                    self.execute_quote(callback)?;
                }

                Ok(())
            }

            LoopEvent::Data { handle, bytes } => {
                let callback = match self.handles.get(handle) {
                    Some(entry) if entry.state != HandleState::Closing => entry.callback,
                    _ => return Ok(()),
                };

                self.push(Value::Handle(handle));
                self.push(Value::Str(bytes));

                if let Some(callback) = callback {
                    self.execute_quote(callback)?;
                }

                Ok(())
            }

            LoopEvent::Closed { handle } => {
                if let Some(entry) = self.handles.remove(handle)
                    && let Some(callback) = entry.callback
                {
                    self.quotes.free(callback);
                }

                Ok(())
            }

            LoopEvent::Retired { handle } => {
                trace!(handle, "event source retired");
                Ok(())
            }
        }
    }
}

impl Interpreter for ForthInterpreter {}

impl InterpreterStack for ForthInterpreter {
    fn stack(&self) -> &ValueStack {
        &self.stack
    }

    fn stack_max_depth(&self) -> usize {
        self.max_depth
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);

        if self.stack.len() > self.max_depth {
            self.max_depth = self.stack.len();
        }
    }

    fn pop(&mut self) -> error::Result<Value> {
        match self.stack.pop() {
            Some(value) => Ok(value),
            None => script_error_str(self, "Stack underflow."),
        }
    }

    fn pop_as_int(&mut self) -> error::Result<i64> {
        match self.pop()? {
            Value::Int(value) => Ok(value),
            other => script_error(
                self,
                format!("Expected an int value, found a {}.", other.kind_name()),
            ),
        }
    }

    fn pop_as_string(&mut self) -> error::Result<Vec<u8>> {
        match self.pop()? {
            Value::Str(bytes) => Ok(bytes),
            other => script_error(
                self,
                format!("Expected a string value, found a {}.", other.kind_name()),
            ),
        }
    }

    fn pop_as_quote(&mut self) -> error::Result<QuoteId> {
        match self.pop()? {
            Value::Quote(quote) => Ok(quote),
            other => script_error(
                self,
                format!("Expected a quotation value, found a {}.", other.kind_name()),
            ),
        }
    }
}

impl WordManagement for ForthInterpreter {
    fn current_location(&self) -> &Option<SourceLocation> {
        &self.current_location
    }

    fn add_word(
        &mut self,
        file: String,
        line: usize,
        column: usize,
        name: String,
        handler: Rc<WordHandler>,
        description: String,
        signature: String,
    ) {
        let location = SourceLocation::new_from_info(&file, line, column);

        self.dictionary
            .define_native(location, name, handler, description, signature);
    }

    fn add_colon_word(&mut self, location: SourceLocation, name: String, quote: QuoteId) {
        self.dictionary.define_colon(location, name, quote);
    }

    fn find_word(&self, name: &str) -> Option<WordInfo> {
        self.dictionary.lookup(name).cloned()
    }

    fn execute_word_named(
        &mut self,
        location: &SourceLocation,
        name: &str,
    ) -> error::Result<()> {
        match self.find_word(name) {
            Some(word) => self.execute_word(location, &word),
            None => script_error(self, format!("Unknown word '{}'.", name)),
        }
    }

    fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }
}

impl CodeManagement for ForthInterpreter {
    fn new_quote(&mut self) -> QuoteId {
        self.quotes.new_quote()
    }

    fn quote_append(&mut self, id: QuoteId, token: Token) -> error::Result<()> {
        if !self.quotes.append(id, token) {
            return script_error(self, format!("Unknown quotation {}.", id));
        }

        Ok(())
    }

    fn quote_tokens(&self, id: QuoteId) -> error::Result<Rc<Vec<Token>>> {
        match self.quotes.tokens(id) {
            Some(tokens) => Ok(tokens),
            None => script_error(self, format!("Unknown quotation {}.", id)),
        }
    }

    fn free_quote(&mut self, id: QuoteId) {
        self.quotes.free(id);
    }

    fn execute_tokens(&mut self, tokens: &[Token]) -> error::Result<()> {
        let mut definition: Option<ColonDefinition> = None;
        let mut index = 0;

        while index < tokens.len() {
            let token = &tokens[index];

            self.current_location = Some(token.location().clone());

            // Compile mode: collect the body of a colon definition.
            if definition.is_some() {
                match token {
                    Token::Word(_, word) if word == ";" => {
                        let finished = definition.take().unwrap();

                        self.dictionary
                            .define_colon(finished.location, finished.name, finished.quote);
                    }

                    Token::Word(location, word) if word == "[" => {
                        let target = definition.as_ref().unwrap().quote;
                        let location = location.clone();
                        let (captured, next) =
                            self.capture_quotation(tokens, index + 1, &location)?;

                        self.quote_append(target, Token::Quote(location, captured))?;
                        index = next;
                        continue;
                    }

                    other => {
                        let target = definition.as_ref().unwrap().quote;
                        self.quote_append(target, other.clone())?;
                    }
                }

                index += 1;
                continue;
            }

            match token {
                Token::Word(location, word) if word == ":" => {
                    let name = match tokens.get(index + 1) {
                        Some(Token::Word(_, name)) => name.clone(),
                        _ => return script_error_str(self, "Expected a name after ':'."),
                    };

                    definition = Some(ColonDefinition {
                        name,
                        location: location.clone(),
                        quote: self.new_quote(),
                    });

                    index += 2;
                    continue;
                }

                Token::Word(location, word) if word == "[" => {
                    let location = location.clone();
                    let (captured, next) = self.capture_quotation(tokens, index + 1, &location)?;

                    self.push(Value::Quote(captured));
                    index = next;
                    continue;
                }

                Token::Word(_, word) if word == "]" => {
                    return script_error_str(self, "Unexpected ']' outside of a quotation.");
                }

                Token::Int(_, number) => self.push(Value::Int(*number)),

                Token::Str(_, bytes) => self.push(Value::Str(bytes.clone())),

                Token::Quote(_, quote) => self.push(Value::Quote(*quote)),

                Token::Word(location, word) => match self.dictionary.lookup(word) {
                    Some(found) => {
                        let found = found.clone();
                        let location = location.clone();

                        self.execute_word(&location, &found)?;
                    }

                    None => return script_error(self, format!("Unknown word '{}'.", word)),
                },
            }

            index += 1;
        }

        // A definition left open at the end of the stream never happened.
        if let Some(unfinished) = definition.take() {
            self.quotes.free(unfinished.quote);
        }

        Ok(())
    }

    fn execute_quote(&mut self, id: QuoteId) -> error::Result<()> {
        let tokens = self.quote_tokens(id)?;

        self.execute_tokens(&tokens)
    }

    fn process_source(&mut self, path: &str, source: &str) -> error::Result<()> {
        let tokens = tokenize_from_source(path, source);

        self.execute_tokens(&tokens)
    }

    fn process_source_file(&mut self, path: &str) -> error::Result<()> {
        match read_to_string(path) {
            Ok(source) => self.process_source(path, &source),
            Err(err) => ScriptError::new_as_result(
                None,
                format!("Could not read file {}: {}", path, err),
                None,
            ),
        }
    }
}

impl HandleManagement for ForthInterpreter {
    fn new_handle(&mut self, kind: HandleKind) -> HandleId {
        self.handles.insert(kind)
    }

    fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    fn handles_mut(&mut self) -> &mut HandleRegistry {
        &mut self.handles
    }

    fn pop_as_handle(&mut self, want: Option<HandleKind>) -> error::Result<HandleId> {
        let handle = match self.pop()? {
            Value::Handle(handle) => handle,
            other => {
                return script_error(
                    self,
                    format!("Expected a handle value, found a {}.", other.kind_name()),
                );
            }
        };

        let entry = match self.handles.get(handle) {
            Some(entry) => entry,
            None => return script_error_str(self, "Handle is no longer live."),
        };

        if entry.state == HandleState::Closing {
            return script_error_str(self, "Handle is already closing.");
        }

        if let Some(want) = want
            && entry.kind != want
        {
            let found = entry.kind;

            return script_error(
                self,
                format!("Expected a {} handle, found a {} handle.", want, found),
            );
        }

        Ok(handle)
    }
}

impl EventManagement for ForthInterpreter {
    fn io(&self) -> &EventLoop {
        &self.io
    }

    fn run_loop(&mut self) -> error::Result<()> {
        loop {
            if !self.running {
                return Ok(());
            }

            match self.io.poll_next() {
                Some(event) => self.dispatch_event(event)?,
                None => return Ok(()),
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn set_running(&mut self, running: bool) {
        self.running = running;
    }
}
