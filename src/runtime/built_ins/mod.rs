/// The core words of the language.
pub mod base_words;

/// The `uv:` words that bridge quotations onto the event loop.
pub mod uv_words;
