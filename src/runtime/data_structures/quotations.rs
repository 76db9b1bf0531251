use crate::lang::tokenizing::Token;
use std::{collections::HashMap, rc::Rc};

/// The stable identifier of a compiled quotation.  Words and handles hold
/// these instead of pointers into the store.
pub type QuoteId = i64;

/// Owning storage for compiled quotations.
///
/// Identifiers are allocated from a monotonic counter and never reused, so a
/// stale identifier can only miss; it can never alias a newer quotation.
/// Bodies are handed out behind an Rc so a quotation can keep executing even
/// if its slot is freed by the code it runs.
#[derive(Debug)]
pub struct QuoteStore {
    /// The counter for generating new identifiers.
    next_id: QuoteId,

    /// The live quotations, keyed by identifier.
    quotes: HashMap<QuoteId, Rc<Vec<Token>>>,
}

impl Default for QuoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QuoteStore {
    /// Create a new empty store.
    pub fn new() -> QuoteStore {
        QuoteStore {
            next_id: 1,
            quotes: HashMap::new(),
        }
    }

    /// Create a new empty quotation and return its identifier.
    pub fn new_quote(&mut self) -> QuoteId {
        let id = self.next_id;

        self.next_id += 1;
        self.quotes.insert(id, Rc::new(Vec::new()));

        id
    }

    /// Append a token to a quotation under construction.  Returns false when
    /// the identifier does not name a live quotation.
    pub fn append(&mut self, id: QuoteId, token: Token) -> bool {
        match self.quotes.get_mut(&id) {
            Some(tokens) => {
                Rc::make_mut(tokens).push(token);
                true
            }

            None => false,
        }
    }

    /// Read access to a quotation's token sequence.  The returned Rc keeps
    /// the tokens alive independently of the slot.
    pub fn tokens(&self, id: QuoteId) -> Option<Rc<Vec<Token>>> {
        self.quotes.get(&id).cloned()
    }

    /// Release a quotation's slot.  The identifier stays dead forever; any
    /// execution already holding the body finishes safely.
    pub fn free(&mut self, id: QuoteId) {
        let _ = self.quotes.remove(&id);
    }

    /// How many quotations are currently live?
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    /// Check if the store holds no quotations.
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}
