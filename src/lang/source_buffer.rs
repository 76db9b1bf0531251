use std::{
    fmt::{self, Display, Formatter},
    iter::Peekable,
    str::Chars,
};

/// The location in the source code where a token was found.  This is carried
/// by every token and used throughout the interpreter for error reporting.
///
/// This is a read-only structure.  Use the field accessor methods to get the
/// values.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SourceLocation {
    /// Either the path to the file or a description of the source code.  For
    /// example code entered in the prompt will have a tag of "\<repl\>".
    path: String,

    /// The 1 based line number in the source code.
    line: usize,

    /// The 1 based column number in the source code.
    column: usize,
}

/// Used for error reporting to show where in the source code an error
/// originated.
impl Display for SourceLocation {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} ({}, {})", self.path, self.line, self.column)
    }
}

impl SourceLocation {
    /// Create a new SourceLocation with the path to the source code.
    pub fn new_from_path(path: &str) -> SourceLocation {
        SourceLocation {
            path: path.to_owned(),
            line: 1,
            column: 1,
        }
    }

    /// Create a new SourceLocation with all of the needed information.  This
    /// is useful in conjunction with the location_here! macro.
    pub fn new_from_info(path: &str, line: usize, column: usize) -> SourceLocation {
        SourceLocation {
            path: path.to_owned(),
            line,
            column,
        }
    }

    /// The path to the source code or a meaningful description of it.
    pub fn path(&self) -> &String {
        &self.path
    }

    /// The 1 based line number in the source code.
    pub fn line(&self) -> usize {
        self.line
    }

    /// The 1 based column number in the source code.
    pub fn column(&self) -> usize {
        self.column
    }
}

/// Helper macro to get the location of the macro invocation.  Used when an
/// operation that originates in Rust code needs a location for error
/// reporting.
#[macro_export]
macro_rules! location_here {
    () => {
        $crate::lang::source_buffer::SourceLocation::new_from_info(
            file!(),
            line!() as usize,
            column!() as usize,
        )
    };
}

/// A forward only cursor over the source code, used by the tokenizer.  As
/// characters are consumed the logical location within the source is kept up
/// to date, so that every token can record where it came from.
///
/// The buffer only holds a reference to the source text, the text is not
/// copied and is expected to outlive the buffer.
pub struct SourceBuffer<'a> {
    /// An iterator over the source code being processed.
    chars: Peekable<Chars<'a>>,

    /// The logical location of the cursor in the source code.
    location: SourceLocation,
}

impl<'a> SourceBuffer<'a> {
    /// Create a new SourceBuffer with the path to, or meaningful tag for, the
    /// source code and the source code itself.
    pub fn new(path: &str, source: &'a str) -> SourceBuffer<'a> {
        SourceBuffer {
            chars: source.chars().peekable(),
            location: SourceLocation::new_from_path(path),
        }
    }

    /// The location the cursor is at in the source code being processed.
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    /// Take a peek at the next character in the source code without consuming
    /// it.
    pub fn peek_next(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    /// Get and consume the next character in the source code.
    pub fn next_char(&mut self) -> Option<char> {
        let next = self.chars.next();

        if let Some(next_char) = next {
            self.increment_location(next_char);
        }

        next
    }

    /// Advance one column for regular characters.  Reset the column to 1 and
    /// increment the line for new line characters.
    fn increment_location(&mut self, next: char) {
        if next == '\n' {
            self.location.line += 1;
            self.location.column = 1;
        } else {
            self.location.column += 1;
        }
    }
}
