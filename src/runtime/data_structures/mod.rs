/// Module containing the Value enumeration and its implementation.  Values
/// are what flow across the interpreter's data stack.
pub mod value;

/// The dictionary module provides the word dictionary used by the
/// interpreter.
pub mod dictionary;

/// Owning storage for compiled quotations, keyed by stable identifiers.
pub mod quotations;

/// The registry of live I/O handles and their lifecycle state.
pub mod handles;
