//! The `#if`/`#elif` constant-expression shell.
//!
//! The full conditional-expression grammar is future work; what exists is
//! integer pp-number decoding with real diagnostics, character literals and
//! parenthesized primaries. Operand lists the shell does not understand are
//! passed over without noise.

use crate::error::{PPErrorKind, Reporter, Severity};
use crate::token::{PPToken, TokenCategory};
use std::num::IntErrorKind;
use std::path::Path;

/// A decoded integer constant.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConstValue {
    Signed(i64),
    Unsigned(u64),
}

impl ConstValue {
    #[must_use]
    pub fn is_nonzero(self) -> bool {
        match self {
            Self::Signed(v) => v != 0,
            Self::Unsigned(v) => v != 0,
        }
    }
}

/// Decode an integer pp-number spelling: digit separators, `0b`/`0x`/octal
/// prefixes, and the `u`/`l`/`ll`/`z` suffix combinations. Floating forms
/// and user-defined suffixes are the errors the directive shell reports.
pub fn decode_integer(spelling: &str, negative: bool) -> Result<ConstValue, PPErrorKind> {
    // `lL` / `Ll` mixes are user-defined-literal territory.
    if spelling.contains("lL") || spelling.contains("Ll") {
        return Err(PPErrorKind::UdlInConstexpr);
    }

    let cleaned: String = spelling
        .chars()
        .filter(|&c| c != '\'')
        .map(|c| c.to_ascii_lowercase())
        .collect();

    // A `.` anywhere, or the binary exponent of a hex float, is a
    // floating-point literal.
    if cleaned.contains('.') || cleaned.contains('p') {
        return Err(PPErrorKind::FloatInConstexpr);
    }

    let (base, digits_start) = if cleaned.starts_with("0b") {
        (2, 2)
    } else if cleaned.starts_with("0x") {
        (16, 2)
    } else if cleaned.starts_with('0') {
        (8, 0)
    } else {
        // Decimal exponents never survive integer decoding.
        if cleaned.contains('e') {
            return Err(PPErrorKind::FloatInConstexpr);
        }
        (10, 0)
    };

    let body = &cleaned[digits_start..];
    let digit_end = body
        .find(|c: char| {
            if base == 16 {
                !c.is_ascii_hexdigit()
            } else {
                !c.is_ascii_digit()
            }
        })
        .unwrap_or(body.len());
    let (digits, suffix) = body.split_at(digit_end);

    let unsigned = match suffix {
        "" | "l" | "z" | "ll" => false,
        "u" | "ul" | "uz" | "lu" | "zu" | "ull" | "llu" => true,
        _ => return Err(PPErrorKind::UdlInConstexpr),
    };

    let map_err = |err: &std::num::ParseIntError| match err.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => PPErrorKind::IntegerOutOfRange,
        _ => PPErrorKind::InvalidIntegerLiteral,
    };

    if negative {
        let signed = format!("-{digits}");
        return i64::from_str_radix(&signed, base)
            .map(ConstValue::Signed)
            .map_err(|e| map_err(&e));
    }

    if unsigned {
        return u64::from_str_radix(digits, base)
            .map(ConstValue::Unsigned)
            .map_err(|e| map_err(&e));
    }

    match i64::from_str_radix(digits, base) {
        Ok(v) => Ok(ConstValue::Signed(v)),
        Err(e) if matches!(e.kind(), IntErrorKind::PosOverflow) => {
            // Too big for the signed type; try again unsigned.
            u64::from_str_radix(digits, base)
                .map(ConstValue::Unsigned)
                .map_err(|e| map_err(&e))
        }
        Err(e) => Err(map_err(&e)),
    }
}

/// Evaluates the trivial primary-expression subset of `#if` operands.
pub struct ConstExprEval<'a> {
    pub reporter: &'a mut dyn Reporter,
    pub filename: &'a Path,
}

impl ConstExprEval<'_> {
    /// `Some(flag)` when the operand is within the shell's grammar;
    /// `None` otherwise (diagnostics already issued where §7 names one).
    pub fn evaluate(&mut self, tokens: &[PPToken]) -> Option<bool> {
        let significant: Vec<&PPToken> = tokens
            .iter()
            .filter(|t| !t.category.is_whitespace_like())
            .collect();

        if significant.is_empty() {
            return None;
        }

        let mut pos = 0usize;
        let value = self.primary(&significant, &mut pos)?;
        // Anything further is an operator grammar the shell does not have;
        // leave it alone.
        Some(value.is_nonzero())
    }

    fn report(&mut self, token: &PPToken, kind: PPErrorKind) {
        self.reporter
            .pp_err_report(self.filename, token, kind, Severity::Error);
    }

    fn primary(&mut self, tokens: &[&PPToken], pos: &mut usize) -> Option<ConstValue> {
        let token = tokens.get(*pos)?;

        match token.category {
            TokenCategory::PPNumber => {
                *pos += 1;
                match decode_integer(token.text(), false) {
                    Ok(value) => Some(value),
                    Err(kind) => {
                        self.report(token, kind);
                        None
                    }
                }
            }
            TokenCategory::CharLiteral | TokenCategory::UdCharLiteral => {
                // Character constants evaluate as zero for now.
                *pos += 1;
                Some(ConstValue::Signed(0))
            }
            TokenCategory::OpOrPunc if token.text == "(" => {
                *pos += 1;
                let inner = self.primary(tokens, pos)?;
                match tokens.get(*pos) {
                    Some(t) if t.text == ")" => {
                        *pos += 1;
                        Some(inner)
                    }
                    Some(t) => {
                        self.report(t, PPErrorKind::MissingCloseParen);
                        None
                    }
                    None => {
                        self.report(token, PPErrorKind::MissingCloseParen);
                        None
                    }
                }
            }
            // A string literal can never start a controlling expression.
            cat if cat.is_string_literal() => {
                self.report(token, PPErrorKind::UnexpectedExprToken);
                None
            }
            // Identifiers and operators are outside the shell's grammar.
            _ => None,
        }
    }
}
