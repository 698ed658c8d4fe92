//! The per-character token recognition automaton.
//!
//! One character goes in, a [`Scan`] comes out. Acceptance is signaled by
//! returning the finished token's category *without* consuming the current
//! character: the driver emits the token and feeds the same character again
//! from the initial state (one-character lookahead via restart). A separate
//! entry point handles end-of-line, where every state has a defined
//! behavior; block comments and raw-string literals are the only tokens
//! that survive across logical lines.

use crate::error::LexError;
use crate::ops;
use crate::token::TokenCategory;
use smallvec::SmallVec;

/// Result of feeding one character (or a newline) to the automaton.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Scan {
    /// The character was consumed; the token is still open.
    Continue,
    /// A token of this category ended *before* the current character;
    /// re-feed the character from the initial state.
    Accept(TokenCategory),
    /// Tokenization failed; skip to the next logical line.
    Error(LexError),
}

/// Sub-automaton for raw-string literals: accumulates the delimiter, then
/// scans the body for `)delimiter"`.
#[derive(Debug, Clone)]
pub struct RawStringScanner {
    /// The closing pattern under construction: `)` + delimiter + `"`.
    /// 18 bytes cover the worst case: `)` + 16 delimiter bytes + `"`.
    pattern: SmallVec<[u8; 18]>,
    /// Still reading the delimiter (before the opening `(`)?
    in_delimiter: bool,
    /// Bytes of the closing pattern matched so far.
    matched: usize,
}

impl RawStringScanner {
    fn new() -> Self {
        let mut pattern = SmallVec::new();
        pattern.push(b')');
        Self {
            pattern,
            in_delimiter: true,
            matched: 0,
        }
    }

    fn feed(&mut self, ch: char) -> Scan {
        if self.in_delimiter {
            self.push_delimiter(ch)
        } else {
            self.match_body(ch)
        }
    }

    fn push_delimiter(&mut self, ch: char) -> Scan {
        if ch == '(' {
            self.in_delimiter = false;
            self.pattern.push(b'"');
            return Scan::Continue;
        }
        if ch == ')' || ch == '\\' || ch.is_whitespace() {
            return Scan::Error(LexError::RawDelimiterInvalid);
        }
        // 1 leading `)` + at most 16 delimiter bytes.
        if self.pattern.len() + ch.len_utf8() > 17 {
            return Scan::Error(LexError::RawDelimiterTooLong);
        }
        let mut buf = [0u8; 4];
        self.pattern
            .extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        Scan::Continue
    }

    fn match_body(&mut self, ch: char) -> Scan {
        let mut buf = [0u8; 4];
        let bytes = ch.encode_utf8(&mut buf).as_bytes();
        if self.pattern[self.matched..].starts_with(bytes) {
            self.matched += bytes.len();
            if self.matched == self.pattern.len() {
                return Scan::Accept(TokenCategory::RawStringLiteral);
            }
        } else {
            // Restart the match; the current character may itself open it.
            self.matched = usize::from(ch == ')');
        }
        Scan::Continue
    }
}

/// States of the token automaton. One variant per state; dispatch is a
/// single `match` in [`Automaton::input_char`].
#[derive(Debug, Clone)]
enum State {
    Init,
    /// The token is complete including every consumed character; the next
    /// input (character or newline) yields it.
    EndSeq(TokenCategory),
    WhitespaceRun,
    /// Seen `/`.
    MaybeComment,
    LineComment,
    BlockComment,
    /// Seen `*` inside a block comment.
    MaybeEndBlockComment,
    IdentifierSeq,
    /// Seen `L` or `U`.
    MaybeStrLiteral,
    /// Seen `u`.
    MaybeU8StrLiteral,
    /// Seen `R` (possibly after an encoding prefix).
    MaybeRawStrLiteral,
    RawString(RawStringScanner),
    StringLiteral,
    CharLiteral,
    /// Seen `\` inside a string (`true`) or character (`false`) literal.
    IgnoreEscapeSeq(bool),
    /// Seen `.` at token start.
    MaybeNumberLiteral,
    NumberLiteral,
    /// Seen `e`/`E`/`p`/`P` inside a pp-number.
    NumberSign,
    /// Operator run; the payload is the prefix state in the op table.
    PunctSeq(i8),
}

/// Continuation set of a pp-number, exponent markers aside.
fn is_number_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '\'' || ch == '.'
}

fn is_identifier_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// The token recognition automaton. Feed characters with
/// [`input_char`](Self::input_char) and finish each logical line with
/// [`input_newline`](Self::input_newline).
#[derive(Debug)]
pub struct Automaton {
    state: State,
}

impl Default for Automaton {
    fn default() -> Self {
        Self::new()
    }
}

impl Automaton {
    #[must_use]
    pub fn new() -> Self {
        Self { state: State::Init }
    }

    /// Is the automaton mid-token across a line boundary (block comment or
    /// raw string)?
    #[must_use]
    pub fn is_multiline(&self) -> bool {
        matches!(
            self.state,
            State::BlockComment | State::MaybeEndBlockComment | State::RawString(_)
        )
    }

    /// Is the automaton inside an unfinished raw-string literal?
    #[must_use]
    pub fn is_in_raw_string(&self) -> bool {
        matches!(self.state, State::RawString(_))
    }

    fn accept(&mut self, category: TokenCategory) -> Scan {
        self.state = State::Init;
        Scan::Accept(category)
    }

    fn fail(&mut self, error: LexError) -> Scan {
        self.state = State::Init;
        Scan::Error(error)
    }

    /// Feed one character.
    pub fn input_char(&mut self, ch: char) -> Scan {
        match &mut self.state {
            State::Init => {
                self.state = match ch {
                    c if c.is_ascii_whitespace() => State::WhitespaceRun,
                    '/' => State::MaybeComment,
                    'R' => State::MaybeRawStrLiteral,
                    'L' | 'U' => State::MaybeStrLiteral,
                    'u' => State::MaybeU8StrLiteral,
                    '"' => State::StringLiteral,
                    '\'' => State::CharLiteral,
                    c if c.is_ascii_alphabetic() || c == '_' => State::IdentifierSeq,
                    c if c.is_ascii_digit() => State::NumberLiteral,
                    '.' => State::MaybeNumberLiteral,
                    c => match ops::first(c) {
                        ops::ACCEPT => State::EndSeq(TokenCategory::OpOrPunc),
                        ops::REJECT => State::EndSeq(TokenCategory::OtherChar),
                        table_state => State::PunctSeq(table_state),
                    },
                };
                Scan::Continue
            }
            State::EndSeq(category) => {
                let category = *category;
                self.accept(category)
            }
            State::WhitespaceRun => {
                if ch.is_ascii_whitespace() {
                    Scan::Continue
                } else {
                    self.accept(TokenCategory::Whitespace)
                }
            }
            State::MaybeComment => match ch {
                '/' => {
                    self.state = State::LineComment;
                    Scan::Continue
                }
                '*' => {
                    self.state = State::BlockComment;
                    Scan::Continue
                }
                '=' => {
                    self.state = State::EndSeq(TokenCategory::OpOrPunc);
                    Scan::Continue
                }
                _ => self.accept(TokenCategory::OpOrPunc),
            },
            State::LineComment => Scan::Continue,
            State::BlockComment => {
                if ch == '*' {
                    self.state = State::MaybeEndBlockComment;
                }
                Scan::Continue
            }
            State::MaybeEndBlockComment => {
                match ch {
                    '/' => self.state = State::EndSeq(TokenCategory::BlockComment),
                    '*' => {}
                    _ => self.state = State::BlockComment,
                }
                Scan::Continue
            }
            State::IdentifierSeq => {
                if is_identifier_continue(ch) {
                    Scan::Continue
                } else {
                    self.accept(TokenCategory::Identifier)
                }
            }
            State::MaybeStrLiteral => match ch {
                'R' => {
                    self.state = State::MaybeRawStrLiteral;
                    Scan::Continue
                }
                '\'' => {
                    self.state = State::CharLiteral;
                    Scan::Continue
                }
                '"' => {
                    self.state = State::StringLiteral;
                    Scan::Continue
                }
                c if is_identifier_continue(c) => {
                    self.state = State::IdentifierSeq;
                    Scan::Continue
                }
                _ => self.accept(TokenCategory::Identifier),
            },
            State::MaybeU8StrLiteral => match ch {
                '8' => {
                    self.state = State::MaybeStrLiteral;
                    Scan::Continue
                }
                '\'' => {
                    self.state = State::CharLiteral;
                    Scan::Continue
                }
                '"' => {
                    self.state = State::StringLiteral;
                    Scan::Continue
                }
                'R' => {
                    self.state = State::MaybeRawStrLiteral;
                    Scan::Continue
                }
                c if is_identifier_continue(c) => {
                    self.state = State::IdentifierSeq;
                    Scan::Continue
                }
                _ => self.accept(TokenCategory::Identifier),
            },
            State::MaybeRawStrLiteral => match ch {
                '"' => {
                    self.state = State::RawString(RawStringScanner::new());
                    Scan::Continue
                }
                c if is_identifier_continue(c) => {
                    self.state = State::IdentifierSeq;
                    Scan::Continue
                }
                _ => self.accept(TokenCategory::Identifier),
            },
            State::RawString(scanner) => match scanner.feed(ch) {
                Scan::Accept(_) => {
                    self.state = State::EndSeq(TokenCategory::RawStringLiteral);
                    Scan::Continue
                }
                Scan::Error(err) => self.fail(err),
                Scan::Continue => Scan::Continue,
            },
            State::StringLiteral => match ch {
                '\\' => {
                    self.state = State::IgnoreEscapeSeq(true);
                    Scan::Continue
                }
                '"' => {
                    self.state = State::EndSeq(TokenCategory::StringLiteral);
                    Scan::Continue
                }
                _ => Scan::Continue,
            },
            State::CharLiteral => match ch {
                '\\' => {
                    self.state = State::IgnoreEscapeSeq(false);
                    Scan::Continue
                }
                '\'' => {
                    self.state = State::EndSeq(TokenCategory::CharLiteral);
                    Scan::Continue
                }
                _ => Scan::Continue,
            },
            State::IgnoreEscapeSeq(in_string) => {
                self.state = if *in_string {
                    State::StringLiteral
                } else {
                    State::CharLiteral
                };
                Scan::Continue
            }
            State::MaybeNumberLiteral => match ch {
                '.' => {
                    self.state = State::PunctSeq(ops::next(ops::ST_DOT, '.'));
                    Scan::Continue
                }
                c if c.is_ascii_digit() => {
                    self.state = State::NumberLiteral;
                    Scan::Continue
                }
                '*' => {
                    self.state = State::EndSeq(TokenCategory::OpOrPunc);
                    Scan::Continue
                }
                _ => self.accept(TokenCategory::OpOrPunc),
            },
            State::NumberLiteral => match ch {
                'e' | 'E' | 'p' | 'P' => {
                    self.state = State::NumberSign;
                    Scan::Continue
                }
                c if is_number_continue(c) => Scan::Continue,
                _ => self.accept(TokenCategory::PPNumber),
            },
            State::NumberSign => match ch {
                '+' | '-' => {
                    self.state = State::NumberLiteral;
                    Scan::Continue
                }
                c if is_number_continue(c) => {
                    self.state = State::NumberLiteral;
                    Scan::Continue
                }
                _ => self.accept(TokenCategory::PPNumber),
            },
            State::PunctSeq(table_state) => {
                // `/` never extends an operator run past its first character.
                if ch == '/' {
                    return self.accept(TokenCategory::OpOrPunc);
                }
                match ops::next(*table_state, ch) {
                    ops::ACCEPT => {
                        self.state = State::EndSeq(TokenCategory::OpOrPunc);
                        Scan::Continue
                    }
                    ops::REJECT => self.accept(TokenCategory::OpOrPunc),
                    next_state => {
                        *table_state = next_state;
                        Scan::Continue
                    }
                }
            }
        }
    }

    /// Feed the end of the logical line. Every state has a defined answer;
    /// block comments and raw strings continue on the next line.
    pub fn input_newline(&mut self) -> Scan {
        match &mut self.state {
            State::Init => Scan::Accept(TokenCategory::Empty),
            State::EndSeq(category) => {
                let category = *category;
                self.accept(category)
            }
            State::WhitespaceRun => self.accept(TokenCategory::Whitespace),
            State::MaybeComment => self.accept(TokenCategory::OpOrPunc),
            State::LineComment => self.accept(TokenCategory::LineComment),
            State::BlockComment => Scan::Accept(TokenCategory::BlockComment),
            State::MaybeEndBlockComment => {
                self.state = State::BlockComment;
                Scan::Accept(TokenCategory::BlockComment)
            }
            State::IdentifierSeq
            | State::MaybeStrLiteral
            | State::MaybeU8StrLiteral
            | State::MaybeRawStrLiteral => self.accept(TokenCategory::Identifier),
            State::RawString(scanner) => match scanner.feed('\n') {
                // The closing quote cannot be a newline.
                Scan::Accept(_) => self.fail(LexError::FailedRawStringRead),
                Scan::Error(err) => self.fail(err),
                Scan::Continue => Scan::Accept(TokenCategory::DuringRawString),
            },
            State::StringLiteral | State::CharLiteral | State::IgnoreEscapeSeq(_) => {
                self.fail(LexError::UnexpectedNewline)
            }
            State::MaybeNumberLiteral => self.accept(TokenCategory::OpOrPunc),
            State::NumberLiteral | State::NumberSign => self.accept(TokenCategory::PPNumber),
            State::PunctSeq(_) => self.accept(TokenCategory::OpOrPunc),
        }
    }
}
