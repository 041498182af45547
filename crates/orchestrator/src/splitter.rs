use sqlgate_types::Dialect;

use crate::collaborators::{SplitError, SqlSplitter};

/// Splits on `;` terminators that sit outside quotes and comments.
///
/// For SQL Server a line holding only `GO` (any case) also ends a batch.
/// Fragments made only of whitespace or comments are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminatorSplitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

struct Fragments {
    statements: Vec<String>,
    current: String,
    has_code: bool,
}

impl Fragments {
    fn new() -> Self {
        Self {
            statements: Vec::new(),
            current: String::new(),
            has_code: false,
        }
    }

    fn push(&mut self, c: char) {
        self.current.push(c);
    }

    fn code(&mut self, c: char) {
        if !c.is_whitespace() {
            self.has_code = true;
        }
        self.current.push(c);
    }

    fn flush(&mut self) {
        if self.has_code {
            self.statements.push(self.current.trim().to_string());
        }
        self.current.clear();
        self.has_code = false;
    }
}

impl TerminatorSplitter {
    pub fn new() -> Self {
        Self
    }

    /// True when the line starting at `rest` is a batch separator
    fn is_go_line(rest: &str) -> bool {
        let line = rest.split('\n').next().unwrap_or_default();
        line.trim().eq_ignore_ascii_case("go")
    }
}

impl SqlSplitter for TerminatorSplitter {
    fn split(&self, dialect: Dialect, sql: &str) -> Result<Vec<String>, SplitError> {
        let backslash_escapes = dialect == Dialect::Mysql;
        let mut fragments = Fragments::new();
        let mut state = State::Code;
        let mut at_line_start = true;
        let mut chars = sql.char_indices().peekable();

        while let Some((idx, c)) = chars.next() {
            if dialect == Dialect::Sqlserver
                && at_line_start
                && state == State::Code
                && Self::is_go_line(&sql[idx..])
            {
                fragments.flush();
                // Skip the rest of the GO line
                for (_, skipped) in chars.by_ref() {
                    if skipped == '\n' {
                        break;
                    }
                }
                at_line_start = true;
                continue;
            }
            at_line_start = c == '\n';

            match state {
                State::Code => match c {
                    ';' => fragments.flush(),
                    '\'' | '"' | '`' => {
                        state = State::Quoted(c);
                        fragments.code(c);
                    }
                    '-' if matches!(chars.peek(), Some((_, '-'))) => {
                        state = State::LineComment;
                        fragments.push(c);
                    }
                    '/' if matches!(chars.peek(), Some((_, '*'))) => {
                        state = State::BlockComment;
                        fragments.push(c);
                        if let Some((_, star)) = chars.next() {
                            fragments.push(star);
                        }
                    }
                    _ => fragments.code(c),
                },
                State::Quoted(quote) => {
                    fragments.push(c);
                    if c == '\\' && backslash_escapes {
                        if let Some((_, escaped)) = chars.next() {
                            fragments.push(escaped);
                        }
                    } else if c == quote {
                        state = State::Code;
                    }
                }
                State::LineComment => {
                    fragments.push(c);
                    if c == '\n' {
                        state = State::Code;
                    }
                }
                State::BlockComment => {
                    fragments.push(c);
                    if c == '*' && matches!(chars.peek(), Some((_, '/'))) {
                        if let Some((_, slash)) = chars.next() {
                            fragments.push(slash);
                        }
                        state = State::Code;
                    }
                }
            }
        }

        match state {
            State::Quoted(quote) => {
                return Err(SplitError::new(format!("unterminated {quote} quoted string")))
            }
            State::BlockComment => return Err(SplitError::new("unterminated block comment")),
            State::Code | State::LineComment => {}
        }

        fragments.flush();
        Ok(fragments.statements)
    }
}
