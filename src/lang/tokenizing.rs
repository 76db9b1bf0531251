use crate::{
    lang::source_buffer::{SourceBuffer, SourceLocation},
    runtime::data_structures::quotations::QuoteId,
};
use std::fmt::{self, Debug, Display, Formatter};

/// A token is a simple unit of the language.  The tokenizer produces integer
/// literals, string literals, and words; the interpreter additionally stores
/// quotation references inside compiled quotations when it captures a
/// bracketed group.
///
/// The token also holds the location in the original source code where it was
/// found.  Control tokens (`:`, `;`, `[`, `]`) stay plain words and are
/// recognized by text, so a name such as `]x` is an ordinary word while a
/// bare `]` is always a bracket.
#[derive(Clone, PartialEq, Eq)]
pub enum Token {
    /// An integer literal.
    Int(SourceLocation, i64),

    /// The decoded bytes of a string literal.  Kept as bytes because string
    /// values are uninterpreted byte sequences.
    Str(SourceLocation, Vec<u8>),

    /// A word in the language to be executed or compiled.
    Word(SourceLocation, String),

    /// A reference to a captured quotation.  Never produced by the tokenizer,
    /// only inserted by the interpreter while capturing `[ … ]` groups.
    Quote(SourceLocation, QuoteId),
}

/// A list of tokens found in the source code.
pub type TokenList = Vec<Token>;

impl Token {
    /// Get the token's location in the original source text.
    pub fn location(&self) -> &SourceLocation {
        match self {
            Token::Int(location, _) => location,
            Token::Str(location, _) => location,
            Token::Word(location, _) => location,
            Token::Quote(location, _) => location,
        }
    }

    /// Is this token the given bare word?
    pub fn is_word(&self, text: &str) -> bool {
        matches!(self, Token::Word(_, word) if word == text)
    }
}

/// Make sure that the tokens are nicely printable for debugging purposes.
impl Display for Token {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Token::Int(_, number) => write!(f, "{}", number),
            Token::Str(_, bytes) => write!(f, "\"{}\"", String::from_utf8_lossy(bytes)),
            Token::Word(_, word) => write!(f, "{}", word),
            Token::Quote(_, id) => write!(f, "[quote {}]", id),
        }
    }
}

/// Include the original location alongside the token text.
impl Debug for Token {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.location(), self)
    }
}

/// Check if the given character is considered whitespace.  This is the ASCII
/// isspace set, so that token boundaries match the classic scanner behavior.
fn is_whitespace(next: &char) -> bool {
    matches!(*next, ' ' | '\t' | '\r' | '\n' | '\x0b' | '\x0c')
}

/// Skip over whitespace in the text.  Stopping only at either the end of the
/// buffer or the next non-whitespace character.
fn skip_whitespace(buffer: &mut SourceBuffer) {
    while let Some(next) = buffer.peek_next() {
        if !is_whitespace(&next) {
            break;
        }

        let _ = buffer.next_char();
    }
}

/// Skip a `\` line comment: everything through the next new line is
/// discarded.
fn skip_line_comment(buffer: &mut SourceBuffer) {
    while let Some(next) = buffer.next_char() {
        if next == '\n' {
            break;
        }
    }
}

/// Skip a `( … )` block comment.  An unterminated comment simply consumes the
/// rest of the input without error.
fn skip_block_comment(buffer: &mut SourceBuffer) {
    let _ = buffer.next_char();

    while let Some(next) = buffer.next_char() {
        if next == ')' {
            break;
        }
    }
}

/// Decode the character following a backslash in a string literal.  The
/// escapes `\n`, `\r`, `\t`, `\"`, and `\\` translate; any other escaped
/// character passes through untranslated.  A lone backslash at the end of the
/// input stays a literal backslash.
fn process_escape(buffer: &mut SourceBuffer) -> char {
    match buffer.next_char() {
        Some('n') => '\n',
        Some('r') => '\r',
        Some('t') => '\t',
        Some('"') => '"',
        Some('\\') => '\\',
        Some(other) => other,
        None => '\\',
    }
}

/// Process a string literal into its decoded bytes.  The literal body runs to
/// the matching `"`; a literal left unterminated consumes the rest of the
/// input and is emitted with whatever was collected.
fn process_string(buffer: &mut SourceBuffer) -> (SourceLocation, Vec<u8>) {
    let location = buffer.location().clone();
    let mut bytes = Vec::new();
    let mut encoded = [0_u8; 4];

    let _ = buffer.next_char();

    loop {
        match buffer.next_char() {
            None => break,
            Some('"') => break,

            Some('\\') => {
                let decoded = process_escape(buffer);
                bytes.extend_from_slice(decoded.encode_utf8(&mut encoded).as_bytes());
            }

            Some(next) => {
                bytes.extend_from_slice(next.encode_utf8(&mut encoded).as_bytes());
            }
        }
    }

    (location, bytes)
}

/// Pull text out of the buffer until we hit a whitespace character.  Words
/// can contain any character except whitespace, with one wrinkle: an embedded
/// backslash terminates the word because it begins a line comment.
fn process_word(buffer: &mut SourceBuffer) -> (SourceLocation, String) {
    let location = buffer.location().clone();
    let mut text = String::new();

    while let Some(next) = buffer.peek_next() {
        if is_whitespace(&next) || next == '\\' {
            break;
        }

        text.push(next);
        let _ = buffer.next_char();
    }

    (location, text)
}

/// Attempt to parse the text as an integer literal with strtoll base-0
/// semantics: an optional sign, then `0x`/`0X` for hexadecimal, a leading `0`
/// for octal, decimal otherwise.  The whole text must be consumed and the
/// value must fit an i64, otherwise the text is a word.
pub fn parse_integer(text: &str) -> Option<i64> {
    let (negative, magnitude) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    if magnitude.is_empty() {
        return None;
    }

    let (radix, digits) = if let Some(hex) = magnitude
        .strip_prefix("0x")
        .or_else(|| magnitude.strip_prefix("0X"))
    {
        (16, hex)
    } else if magnitude.len() > 1 && magnitude.starts_with('0') {
        (8, &magnitude[1..])
    } else {
        (10, magnitude)
    };

    // from_str_radix would accept a second sign here; strtoll does not.
    if digits.is_empty() || digits.starts_with('+') || digits.starts_with('-') {
        return None;
    }

    let parsed = i128::from_str_radix(digits, radix).ok()?;
    let signed = if negative { -parsed } else { parsed };

    i64::try_from(signed).ok()
}

/// Tokenize source code from a string.  Comments are discarded, string
/// literals are decoded, and anything that parses fully as an integer becomes
/// an integer literal.  Nothing here can fail: unterminated strings and block
/// comments simply run to the end of the input.
pub fn tokenize_from_source(path: &str, source: &str) -> TokenList {
    let mut buffer = SourceBuffer::new(path, source);
    let mut token_list = TokenList::new();

    while let Some(next) = buffer.peek_next() {
        if is_whitespace(&next) {
            skip_whitespace(&mut buffer);
            continue;
        }

        if next == '\\' {
            skip_line_comment(&mut buffer);
            continue;
        }

        if next == '(' {
            skip_block_comment(&mut buffer);
            continue;
        }

        if next == '"' {
            let (location, bytes) = process_string(&mut buffer);
            token_list.push(Token::Str(location, bytes));
            continue;
        }

        let (location, text) = process_word(&mut buffer);

        let next_token = match parse_integer(&text) {
            Some(number) => Token::Int(location, number),
            None => Token::Word(location, text),
        };

        token_list.push(next_token);
    }

    token_list
}
