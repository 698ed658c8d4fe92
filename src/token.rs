//! Token categories, lexical tokens and preprocessing tokens.

use crate::source::LogicalLine;
use crate::text::TokenText;
use crate::{Shared, StaticVec};
use std::fmt;

/// Category of a token, shared between the lexical layer and the
/// preprocessing-token layer.
///
/// The user-defined-literal variants and `Placemarker` /
/// `NonMacroIdentifier` never come out of the tokenizer; they are produced
/// by the assembler and the macro expander.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum TokenCategory {
    /// A run of whitespace characters.
    Whitespace,
    /// `// …` to end of line.
    LineComment,
    /// `/* … */`; one token per logical line spanned.
    BlockComment,
    Identifier,
    /// pp-number: digits, letters, `'` separators, `.`, exponent signs.
    PPNumber,
    CharLiteral,
    UdCharLiteral,
    StringLiteral,
    UdStringLiteral,
    RawStringLiteral,
    UdRawStringLiteral,
    /// A raw-string literal still open at the end of its logical line.
    DuringRawString,
    OpOrPunc,
    /// A single non-whitespace character that fits nothing else.
    OtherChar,
    /// End of a logical line.
    Newline,
    /// A logical line with no token at all.
    Empty,
    /// Transient empty token that keeps `##` well-defined.
    Placemarker,
    /// An identifier painted blue: exempt from further macro replacement.
    NonMacroIdentifier,
}

impl TokenCategory {
    /// Whitespace for the purposes of token scanning (comments included).
    #[must_use]
    pub const fn is_whitespace_like(self) -> bool {
        matches!(
            self,
            Self::Whitespace | Self::LineComment | Self::BlockComment
        )
    }

    /// Any character or string literal, user-defined or not.
    #[must_use]
    pub const fn is_literal(self) -> bool {
        matches!(
            self,
            Self::CharLiteral
                | Self::UdCharLiteral
                | Self::StringLiteral
                | Self::UdStringLiteral
                | Self::RawStringLiteral
                | Self::UdRawStringLiteral
        )
    }

    /// String-quoted literals (the ones whose `"` needs escaping when
    /// stringized).
    #[must_use]
    pub const fn is_string_literal(self) -> bool {
        matches!(
            self,
            Self::StringLiteral
                | Self::UdStringLiteral
                | Self::RawStringLiteral
                | Self::UdRawStringLiteral
        )
    }

    /// The user-defined counterpart after a literal glues with a suffix.
    #[must_use]
    pub const fn with_ud_suffix(self) -> Self {
        match self {
            Self::CharLiteral => Self::UdCharLiteral,
            Self::StringLiteral => Self::UdStringLiteral,
            Self::RawStringLiteral => Self::UdRawStringLiteral,
            other => other,
        }
    }
}

/// A categorized slice of a logical line, straight out of the tokenizer.
#[derive(Debug, Clone)]
pub struct LexToken {
    pub category: TokenCategory,
    pub line: Shared<LogicalLine>,
    /// Byte offset within the logical line.
    pub offset: u32,
    /// Byte length (zero for `Newline`).
    pub len: u32,
}

impl LexToken {
    #[must_use]
    pub fn text(&self) -> &str {
        &self.line.text[self.offset as usize..(self.offset + self.len) as usize]
    }
}

/// The output unit of the core: a preprocessing token.
///
/// Carries its text (view or owned, see [`TokenText`]), its source position,
/// and — for composed tokens such as reassembled raw strings or stringize
/// results — the lexical tokens it was built from.
#[derive(Debug, Clone)]
pub struct PPToken {
    pub category: TokenCategory,
    pub text: TokenText,
    /// Owning logical line; `None` only for synthesized tokens
    /// (placemarkers, expansion-generated commas).
    pub line: Option<Shared<LogicalLine>>,
    /// Byte column within the logical line.
    pub column: u32,
    /// Contributing lexical tokens, for composed tokens.
    pub composed: StaticVec<LexToken>,
}

impl PPToken {
    /// A synthesized token with no source position.
    #[must_use]
    pub fn synthesized(category: TokenCategory, text: impl Into<TokenText>) -> Self {
        Self {
            category,
            text: text.into(),
            line: None,
            column: 0,
            composed: StaticVec::new(),
        }
    }

    #[must_use]
    pub fn placemarker() -> Self {
        Self::synthesized(TokenCategory::Placemarker, "")
    }

    /// Build a token from a single lexical token, borrowing its text.
    #[must_use]
    pub fn from_lex(lex: &LexToken) -> Self {
        Self {
            category: lex.category,
            text: TokenText::slice(lex.line.clone(), lex.offset, lex.len),
            line: Some(lex.line.clone()),
            column: lex.offset,
            composed: StaticVec::new(),
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        self.text.as_str()
    }

    /// Logical line number, or 0 for synthesized tokens.
    #[must_use]
    pub fn logical_line(&self) -> u32 {
        self.line.as_ref().map_or(0, |l| l.number)
    }

    /// `(physical line, 1-based column)`; `(0, 0)` for synthesized tokens.
    #[must_use]
    pub fn physical_pos(&self) -> (u32, u32) {
        match &self.line {
            Some(line) => line.physical_pos(self.column),
            None => (0, 0),
        }
    }

    /// Text of the owning logical line, if any.
    #[must_use]
    pub fn line_text(&self) -> Option<&str> {
        self.line.as_ref().map(|l| l.text.as_str())
    }
}

/// Tokens compare by category and spelling; provenance is ignored. This is
/// exactly the comparison the benign-redefinition rule needs.
impl PartialEq for PPToken {
    fn eq(&self, other: &Self) -> bool {
        self.category == other.category && self.text == other.text
    }
}

impl Eq for PPToken {}

impl fmt::Display for PPToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.category {
            TokenCategory::Newline => f.write_str("\n"),
            _ => f.write_str(self.text()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::SmallVec;

    fn line(text: &str) -> Shared<LogicalLine> {
        Shared::new(LogicalLine {
            text: text.to_owned(),
            phys_line: 7,
            number: 3,
            splices: SmallVec::new(),
        })
    }

    #[test]
    fn from_lex_borrows() {
        let l = line("foo bar");
        let lex = LexToken {
            category: TokenCategory::Identifier,
            line: l,
            offset: 4,
            len: 3,
        };
        let pp = PPToken::from_lex(&lex);
        assert_eq!(pp.text(), "bar");
        assert!(!pp.text.is_owned());
        assert_eq!(pp.logical_line(), 3);
        assert_eq!(pp.physical_pos(), (7, 5));
    }

    #[test]
    fn equality_ignores_provenance() {
        let a = PPToken::synthesized(TokenCategory::Identifier, "x");
        let l = line("x");
        let lex = LexToken {
            category: TokenCategory::Identifier,
            line: l,
            offset: 0,
            len: 1,
        };
        assert_eq!(a, PPToken::from_lex(&lex));
    }
}
