//! A tiny stack-based concatenative interpreter wired to a single-threaded
//! event loop.
//!
//! Source text is tokenized and interpreted against a tagged-value data
//! stack.  Definitions (`: name … ;`) and quotations (`[ … ]`) are compiled
//! into an owning quotation store and resolved late, by name, when they run.
//! The `uv:` word set arms quotations as timer and TCP callbacks; the event
//! loop delivers completions back into the interpreter at the single
//! suspension point, the `uv:run` word.

/// Module for managing source code and turning it into tokens.
#[macro_use]
pub mod lang;

/// Module for the runtime and the data structures used by the interpreter.
/// As well as the interpreter itself.
#[macro_use]
pub mod runtime;
