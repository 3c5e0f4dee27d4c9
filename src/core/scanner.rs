//! Lookahead scanner
//!
//! Wraps a character source with a two-character peek buffer, folds
//! `\r\n` and lone `\r` into `\n`, and tracks line/column. Characters are
//! pulled from the source only when a peek needs them.

use crate::reader::source::CharSource;
use std::io;

/// Two-character lookahead over a [`CharSource`]
pub struct Scanner<'a> {
    source: Box<dyn CharSource + 'a>,
    peek: [Option<char>; 2],
    peek_count: usize,
    was_cr: bool,
    line: u32,
    column: u32,
    /// Consumed characters, recorded only in round-trip mode
    capture: Option<String>,
}

impl<'a> Scanner<'a> {
    /// Create a scanner positioned at line 1, column 0
    pub fn new(source: Box<dyn CharSource + 'a>) -> Self {
        Scanner {
            source,
            peek: [None; 2],
            peek_count: 0,
            was_cr: false,
            line: 1,
            column: 0,
            capture: None,
        }
    }

    /// Look at the character `pos` places ahead (0 or 1) without consuming it.
    ///
    /// `None` means end of input.
    pub fn peek(&mut self, pos: usize) -> io::Result<Option<char>> {
        debug_assert!(pos < 2);
        while pos >= self.peek_count {
            let next = self.source.read_char()?;
            match next {
                Some('\r') => {
                    self.was_cr = true;
                    self.push_peek(Some('\n'));
                }
                Some('\n') => {
                    // second half of a \r\n pair
                    if !self.was_cr {
                        self.push_peek(Some('\n'));
                    }
                    self.was_cr = false;
                }
                other => {
                    self.push_peek(other);
                    self.was_cr = false;
                }
            }
        }
        Ok(self.peek[pos])
    }

    /// Consume one normalized character
    pub fn read(&mut self) -> io::Result<Option<char>> {
        let result = self.peek(0)?;
        self.peek[0] = self.peek[1];
        self.peek_count -= 1;

        if let Some(c) = result {
            self.column += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            }
            if let Some(capture) = self.capture.as_mut() {
                capture.push(c);
            }
        }
        Ok(result)
    }

    fn push_peek(&mut self, c: Option<char>) {
        self.peek[self.peek_count] = c;
        self.peek_count += 1;
    }

    /// Current line (1-based)
    #[inline]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Current column
    #[inline]
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Start or stop recording consumed characters
    pub fn set_capture(&mut self, enabled: bool) {
        self.capture = if enabled { Some(String::new()) } else { None };
    }

    /// Take everything recorded since the last call
    pub fn take_capture(&mut self) -> Option<String> {
        self.capture.as_mut().map(std::mem::take)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::source::StrSource;

    fn scanner(input: &str) -> Scanner<'_> {
        Scanner::new(Box::new(StrSource::new(input)))
    }

    fn drain(sc: &mut Scanner<'_>) -> String {
        let mut out = String::new();
        while let Some(c) = sc.read().unwrap() {
            out.push(c);
        }
        out
    }

    #[test]
    fn test_eol_normalization() {
        let mut sc = scanner("-\n-\r-\r\n-\n\r-");
        assert_eq!(drain(&mut sc), "-\n-\n-\n-\n\n-");
    }

    #[test]
    fn test_lone_cr_not_merged_with_later_lf() {
        let mut sc = scanner("a\rb\nc");
        assert_eq!(drain(&mut sc), "a\nb\nc");
    }

    #[test]
    fn test_two_char_peek() {
        let mut sc = scanner("</x");
        assert_eq!(sc.peek(0).unwrap(), Some('<'));
        assert_eq!(sc.peek(1).unwrap(), Some('/'));
        assert_eq!(sc.read().unwrap(), Some('<'));
        assert_eq!(sc.peek(0).unwrap(), Some('/'));
        assert_eq!(sc.peek(1).unwrap(), Some('x'));
    }

    #[test]
    fn test_peek_across_crlf() {
        let mut sc = scanner("\r\n<");
        assert_eq!(sc.peek(0).unwrap(), Some('\n'));
        assert_eq!(sc.peek(1).unwrap(), Some('<'));
    }

    #[test]
    fn test_line_and_column() {
        let mut sc = scanner("ab\ncd");
        sc.read().unwrap();
        sc.read().unwrap();
        assert_eq!((sc.line(), sc.column()), (1, 2));
        sc.read().unwrap();
        assert_eq!((sc.line(), sc.column()), (2, 1));
        sc.read().unwrap();
        assert_eq!((sc.line(), sc.column()), (2, 2));
    }

    #[test]
    fn test_eof_does_not_move_position() {
        let mut sc = scanner("a");
        sc.read().unwrap();
        assert_eq!(sc.read().unwrap(), None);
        assert_eq!(sc.column(), 1);
    }

    #[test]
    fn test_capture() {
        let mut sc = scanner("<a>\r\n</a>");
        sc.set_capture(true);
        for _ in 0..4 {
            sc.read().unwrap();
        }
        assert_eq!(sc.take_capture().as_deref(), Some("<a>\n"));
        sc.read().unwrap();
        assert_eq!(sc.take_capture().as_deref(), Some("<"));
    }
}
