//! Drives the automaton over logical lines, producing lexical tokens.

use crate::automaton::{Automaton, Scan};
use crate::error::LexError;
use crate::source::{LogicalLine, LogicalLines, SourceLines};
use crate::token::{LexToken, TokenCategory};
use crate::Shared;
use std::io;

/// A tokenization failure, anchored to where it happened. The lexer has
/// already skipped to the next logical line when one of these comes out.
#[derive(Debug)]
pub struct LexFailure {
    pub error: LexError,
    pub line: Shared<LogicalLine>,
    /// Byte column of the offending character.
    pub column: u32,
}

/// Lazy stream of [`LexToken`]s over a [`SourceLines`] producer.
///
/// Every logical line yields its tokens followed by one zero-length
/// `Newline` token. Tokenization errors surface as `Err` items; the stream
/// resumes at the next logical line.
pub struct Lexer<S> {
    lines: LogicalLines<S>,
    automaton: Automaton,
    current: Option<Shared<LogicalLine>>,
    /// Most recent line, kept for anchoring end-of-input errors.
    last_line: Option<Shared<LogicalLine>>,
    /// Byte position of the scan within the current line.
    pos: usize,
    /// Byte position where the open token started.
    token_start: usize,
    /// The end-of-line category has been delivered; a `Newline` token is due.
    newline_due: bool,
    eof: bool,
}

impl<S: SourceLines> Lexer<S> {
    pub fn new(source: S) -> Self {
        Self {
            lines: LogicalLines::new(source),
            automaton: Automaton::new(),
            current: None,
            last_line: None,
            pos: 0,
            token_start: 0,
            newline_due: false,
            eof: false,
        }
    }

    /// The I/O error that ended the stream, if any.
    pub fn take_io_error(&mut self) -> Option<io::Error> {
        self.lines.io_error.take()
    }

    fn make_token(
        &self,
        category: TokenCategory,
        line: &Shared<LogicalLine>,
        start: usize,
        end: usize,
    ) -> LexToken {
        LexToken {
            category,
            line: line.clone(),
            offset: start as u32,
            len: (end - start) as u32,
        }
    }

    fn advance_line(&mut self) {
        self.current = self.lines.next_logical();
        if let Some(line) = &self.current {
            self.last_line = Some(line.clone());
        }
        self.pos = 0;
        self.token_start = 0;
        self.newline_due = false;
        if self.current.is_none() {
            self.eof = true;
        }
    }
}

impl<S: SourceLines> Iterator for Lexer<S> {
    type Item = Result<LexToken, LexFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.eof {
                // A raw string left open at end of input is an error; an
                // unterminated block comment is just trailing whitespace.
                if self.automaton.is_in_raw_string() {
                    self.automaton = Automaton::new();
                    if let Some(line) = self.last_line.clone() {
                        return Some(Err(LexFailure {
                            error: LexError::FailedRawStringRead,
                            column: line.text.len() as u32,
                            line,
                        }));
                    }
                }
                return None;
            }
            let Some(line) = self.current.clone() else {
                self.advance_line();
                continue;
            };

            if self.newline_due {
                let token =
                    self.make_token(TokenCategory::Newline, &line, line.text.len(), line.text.len());
                self.advance_line();
                return Some(Ok(token));
            }

            if self.pos < line.text.len() {
                let ch = line.text[self.pos..].chars().next().expect("in-bounds char");
                match self.automaton.input_char(ch) {
                    Scan::Continue => {
                        self.pos += ch.len_utf8();
                    }
                    Scan::Accept(category) => {
                        let token = self.make_token(category, &line, self.token_start, self.pos);
                        self.token_start = self.pos;
                        return Some(Ok(token));
                    }
                    Scan::Error(error) => {
                        let column = self.pos as u32;
                        // Skip the rest of the line; the automaton is reset.
                        self.pos = line.text.len();
                        self.newline_due = true;
                        return Some(Err(LexFailure {
                            error,
                            line,
                            column,
                        }));
                    }
                }
            } else {
                match self.automaton.input_newline() {
                    Scan::Accept(TokenCategory::Empty) => {
                        self.newline_due = true;
                    }
                    Scan::Accept(category) => {
                        self.newline_due = true;
                        let token =
                            self.make_token(category, &line, self.token_start, line.text.len());
                        self.token_start = line.text.len();
                        return Some(Ok(token));
                    }
                    Scan::Error(error) => {
                        let column = self.token_start as u32;
                        self.newline_due = true;
                        return Some(Err(LexFailure {
                            error,
                            line,
                            column,
                        }));
                    }
                    Scan::Continue => unreachable!("end of line always resolves"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceReader;

    fn lex_all(src: &str) -> Vec<LexToken> {
        Lexer::new(SourceReader::from_text(src))
            .map(|item| item.expect("no lex errors"))
            .collect()
    }

    #[test]
    fn newline_token_per_line() {
        let tokens = lex_all("a\nb");
        let categories: Vec<_> = tokens.iter().map(|t| t.category).collect();
        use TokenCategory::*;
        assert_eq!(categories, vec![Identifier, Newline, Identifier, Newline]);
    }

    #[test]
    fn tokens_reproduce_the_line() {
        // Tokenization coverage: concatenating every non-newline span of a
        // logical line gives back the line text.
        let src = "int x = y + 0x2a; // done";
        let tokens = lex_all(src);
        let rebuilt: String = tokens
            .iter()
            .filter(|t| t.category != TokenCategory::Newline)
            .map(LexToken::text)
            .collect();
        assert_eq!(rebuilt, src);
    }

    #[test]
    fn continuation_is_invisible_to_the_automaton() {
        let tokens = lex_all("ab\\\ncd");
        assert_eq!(tokens[0].text(), "abcd");
        assert_eq!(tokens[0].category, TokenCategory::Identifier);
    }

    #[test]
    fn error_skips_to_next_line() {
        let mut lexer = Lexer::new(SourceReader::from_text("\"open\nnext"));
        let first = lexer.next().expect("item");
        let failure = first.expect_err("newline in string literal");
        assert_eq!(failure.error, LexError::UnexpectedNewline);
        // The stream resumes with the newline, then the next line.
        let rest: Vec<_> = lexer.map(|item| item.expect("ok")).collect();
        assert_eq!(rest[0].category, TokenCategory::Newline);
        assert_eq!(rest[1].text(), "next");
    }

    #[test]
    fn multi_line_raw_string_chunks() {
        let tokens = lex_all("R\"d(a\nb)d\"");
        let categories: Vec<_> = tokens.iter().map(|t| t.category).collect();
        use TokenCategory::*;
        assert_eq!(
            categories,
            vec![DuringRawString, Newline, RawStringLiteral, Newline]
        );
        assert_eq!(tokens[0].text(), "R\"d(a");
        assert_eq!(tokens[2].text(), "b)d\"");
    }
}
