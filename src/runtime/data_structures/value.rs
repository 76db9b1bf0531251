use crate::runtime::data_structures::{handles::HandleId, quotations::QuoteId};
use std::fmt::{self, Debug, Display, Formatter};

/// Core value enumeration used by the interpreter.  Every item on the data
/// stack is one of these variants; the tag alone decides how the payload is
/// interpreted, and typed pops fail when the tag does not match.
///
/// A string value exclusively owns its bytes, so cloning one produces an
/// independent copy.  Quotation and handle values carry identifiers into the
/// context's stores; cloning them shares the referent.
#[derive(Clone, PartialEq, Eq)]
pub enum Value {
    /// A signed 64-bit integer.
    Int(i64),

    /// An owned, uninterpreted byte sequence.
    Str(Vec<u8>),

    /// A reference to a compiled quotation in the quotation store.
    Quote(QuoteId),

    /// A reference to a live I/O resource in the handle registry.
    Handle(HandleId),
}

impl Value {
    /// The user-facing name of the value's kind, for type error diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Quote(_) => "quotation",
            Value::Handle(_) => "handle",
        }
    }

    /// Check if the value is an integer.
    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_))
    }

    /// Check if the value is a string.
    pub fn is_str(&self) -> bool {
        matches!(self, Value::Str(_))
    }

    /// Check if the value is a quotation reference.
    pub fn is_quote(&self) -> bool {
        matches!(self, Value::Quote(_))
    }

    /// Check if the value is a handle reference.
    pub fn is_handle(&self) -> bool {
        matches!(self, Value::Handle(_))
    }
}

/// Pretty print the value for display.
impl Display for Value {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Value::Int(number) => write!(f, "{}", number),
            Value::Str(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
            Value::Quote(id) => write!(f, "[quote {}]", id),
            Value::Handle(id) => write!(f, "[handle {}]", id),
        }
    }
}

/// Print the value along with an indication of which variant is held.
impl Debug for Value {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Value::Int(number) => write!(f, "Int({})", number),
            Value::Str(bytes) => write!(f, "Str({:?})", String::from_utf8_lossy(bytes)),
            Value::Quote(id) => write!(f, "Quote({})", id),
            Value::Handle(id) => write!(f, "Handle({})", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloning_a_string_copies_the_bytes() {
        let original = Value::Str(b"abc".to_vec());
        let copy = original.clone();

        if let (Value::Str(a), Value::Str(b)) = (&original, &copy) {
            assert_eq!(a, b);
            assert_ne!(a.as_ptr(), b.as_ptr());
        } else {
            panic!("expected two string values");
        }
    }

    #[test]
    fn kind_names_follow_the_tag() {
        assert_eq!(Value::Int(1).kind_name(), "int");
        assert_eq!(Value::Str(Vec::new()).kind_name(), "string");
        assert_eq!(Value::Quote(1).kind_name(), "quotation");
        assert_eq!(Value::Handle(1).kind_name(), "handle");
    }
}
