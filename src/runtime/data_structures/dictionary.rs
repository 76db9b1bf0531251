use crate::{
    lang::source_buffer::SourceLocation,
    runtime::{data_structures::quotations::QuoteId, interpreter::WordHandler},
};
use std::{fmt, rc::Rc};

/// How a word executes: native words call straight into the host, colon
/// definitions interpret their quotation.
#[derive(Clone)]
pub enum WordKind {
    /// The word is implemented in Rust.
    Native(Rc<WordHandler>),

    /// The word was defined in the language with `: name … ;` and its body
    /// lives in the quotation store.
    Colon(QuoteId),
}

impl fmt::Debug for WordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WordKind::Native(_) => f.write_str("Native(..)"),
            WordKind::Colon(id) => f.debug_tuple("Colon").field(id).finish(),
        }
    }
}

/// The information stored in the dictionary for each word.
#[derive(Clone, Debug)]
pub struct WordInfo {
    /// The location where the word was defined.  Can be from either script or
    /// Rust source code.
    pub location: SourceLocation,

    /// The name of the word.
    pub name: String,

    /// What kind of word is it?
    pub kind: WordKind,

    /// A simple description of the word.
    pub description: String,

    /// The stack signature of the word.
    pub signature: String,
}

/// The word dictionary used by the interpreter.  Entries are kept in
/// definition order and searched newest first, so redefining a name shadows
/// the older entry while leaving it in place.
#[derive(Debug)]
pub struct Dictionary {
    words: Vec<WordInfo>,
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl Dictionary {
    /// Create a new empty dictionary.
    pub fn new() -> Dictionary {
        Dictionary { words: Vec::new() }
    }

    /// Register a native word as the newest entry.
    pub fn define_native(
        &mut self,
        location: SourceLocation,
        name: String,
        handler: Rc<WordHandler>,
        description: String,
        signature: String,
    ) {
        self.words.push(WordInfo {
            location,
            name,
            kind: WordKind::Native(handler),
            description,
            signature,
        });
    }

    /// Register a colon definition as the newest entry.
    pub fn define_colon(&mut self, location: SourceLocation, name: String, quote: QuoteId) {
        self.words.push(WordInfo {
            location,
            name,
            kind: WordKind::Colon(quote),
            description: String::new(),
            signature: String::new(),
        });
    }

    /// Try to find a word by name, returning the newest matching entry.
    pub fn lookup(&self, name: &str) -> Option<&WordInfo> {
        self.words.iter().rev().find(|word| word.name == name)
    }

    /// Iterate over every entry, newest first.  Shadowed entries are
    /// included, which is what the `words` listing wants.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &WordInfo> {
        self.words.iter().rev()
    }

    /// How many entries, shadowed ones included, are defined?
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Check if the dictionary has no entries at all.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location_here;

    #[test]
    fn lookup_finds_the_newest_definition() {
        let mut dictionary = Dictionary::new();

        dictionary.define_colon(location_here!(), "f".to_string(), 1);
        dictionary.define_colon(location_here!(), "g".to_string(), 2);
        dictionary.define_colon(location_here!(), "f".to_string(), 3);

        match dictionary.lookup("f") {
            Some(WordInfo {
                kind: WordKind::Colon(quote),
                ..
            }) => assert_eq!(*quote, 3),
            _ => panic!("expected the shadowing definition of f"),
        }

        assert!(dictionary.lookup("missing").is_none());
    }

    #[test]
    fn listing_is_newest_first_and_keeps_shadowed_entries() {
        let mut dictionary = Dictionary::new();

        dictionary.define_colon(location_here!(), "a".to_string(), 1);
        dictionary.define_colon(location_here!(), "b".to_string(), 2);
        dictionary.define_colon(location_here!(), "a".to_string(), 3);

        let names: Vec<&str> = dictionary
            .iter_newest_first()
            .map(|word| word.name.as_str())
            .collect();

        assert_eq!(names, vec!["a", "b", "a"]);
        assert_eq!(dictionary.len(), 3);
    }
}
