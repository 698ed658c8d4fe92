//! Operator and punctuator table.
//!
//! Longest-match recognition of the C++20 operator/punctuator set is driven
//! by a two-level table: [`first`] classifies the opening character, and
//! [`next`] answers, for a tentative prefix state and the next character,
//! whether the sequence completes an operator (`ACCEPT`), may still grow
//! (a positive state), or stops (`REJECT` — the prefix read so far is the
//! token and the character is re-examined).
//!
//! The `<::` digraph exception is not handled here; the assembler rewrites
//! `<:` `:` after tokenization.

/// The character does not begin (or continue) an operator.
pub const REJECT: i8 = -1;
/// The sequence including this character is a complete operator that cannot
/// grow further.
pub const ACCEPT: i8 = 0;

// Prefix states. The name is the prefix recognized so far.
pub const ST_EQ_TAIL: i8 = 1; // = * / ^ !   (second char can only be '=')
pub const ST_PERCENT: i8 = 2; // %
pub const ST_LT: i8 = 3; // <
pub const ST_SHL: i8 = 4; // <<
pub const ST_LT_EQ: i8 = 5; // <=
pub const ST_GT: i8 = 6; // >
pub const ST_SHR: i8 = 7; // >>
pub const ST_PC: i8 = 8; // %:
pub const ST_PCP: i8 = 9; // %:%
pub const ST_PLUS: i8 = 10; // +
pub const ST_MINUS: i8 = 11; // -
pub const ST_ARROW: i8 = 12; // ->
pub const ST_AMP: i8 = 13; // &
pub const ST_PIPE: i8 = 14; // |
pub const ST_COLON: i8 = 15; // :
pub const ST_DOT: i8 = 16; // .
pub const ST_DOT_DOT: i8 = 17; // ..
pub const ST_HASH: i8 = 18; // #

/// Classify the first character of a possible operator run.
///
/// Returns [`REJECT`] for non-operator characters, [`ACCEPT`] for
/// single-character punctuators that never extend, or the prefix state to
/// continue from.
#[must_use]
pub fn first(ch: char) -> i8 {
    match ch {
        '{' | '}' | '[' | ']' | '(' | ')' | ';' | '?' | ',' | '~' => ACCEPT,
        '=' | '*' | '/' | '^' | '!' => ST_EQ_TAIL,
        '%' => ST_PERCENT,
        '<' => ST_LT,
        '>' => ST_GT,
        '+' => ST_PLUS,
        '-' => ST_MINUS,
        '&' => ST_AMP,
        '|' => ST_PIPE,
        ':' => ST_COLON,
        '.' => ST_DOT,
        '#' => ST_HASH,
        _ => REJECT,
    }
}

/// One transition of the operator table.
#[must_use]
pub fn next(state: i8, ch: char) -> i8 {
    match (state, ch) {
        (ST_EQ_TAIL, '=') => ACCEPT, // == *= /= ^= !=

        (ST_PERCENT, '=' | '>') => ACCEPT, // %= %>
        (ST_PERCENT, ':') => ST_PC,
        (ST_PC, '%') => ST_PCP,
        (ST_PCP, ':') => ACCEPT, // %:%:

        (ST_LT, ':' | '%') => ACCEPT, // <: <%
        (ST_LT, '<') => ST_SHL,
        (ST_LT, '=') => ST_LT_EQ,
        (ST_SHL, '=') => ACCEPT,   // <<=
        (ST_LT_EQ, '>') => ACCEPT, // <=>

        (ST_GT, '=') => ACCEPT, // >=
        (ST_GT, '>') => ST_SHR,
        (ST_SHR, '=') => ACCEPT, // >>=

        (ST_PLUS, '+' | '=') => ACCEPT,  // ++ +=
        (ST_MINUS, '-' | '=') => ACCEPT, // -- -=
        (ST_MINUS, '>') => ST_ARROW,
        (ST_ARROW, '*') => ACCEPT, // ->*

        (ST_AMP, '&' | '=') => ACCEPT,  // && &=
        (ST_PIPE, '|' | '=') => ACCEPT, // || |=

        (ST_COLON, ':' | '>') => ACCEPT, // :: :>

        (ST_DOT, '.') => ST_DOT_DOT,
        (ST_DOT, '*') => ACCEPT,     // .*
        (ST_DOT_DOT, '.') => ACCEPT, // ...

        (ST_HASH, '#') => ACCEPT, // ##

        _ => REJECT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run a whole operator through the table; `true` when every character
    /// is consumed and the final transition accepts.
    fn accepts_exactly(op: &str) -> bool {
        let mut chars = op.chars();
        let mut state = first(chars.next().unwrap());
        if state == REJECT {
            return false;
        }
        if state == ACCEPT {
            return chars.next().is_none();
        }
        for ch in chars {
            state = next(state, ch);
            if state == REJECT {
                return false;
            }
        }
        state == ACCEPT
    }

    /// Every character of `op` must take a non-rejecting transition: the
    /// operator is either accepted outright or left as a live prefix (in
    /// which case the following character's rejection yields it).
    fn valid_run(op: &str) -> bool {
        let mut chars = op.chars();
        let mut state = first(chars.next().unwrap());
        for ch in chars {
            if state == REJECT || state == ACCEPT {
                return false;
            }
            state = next(state, ch);
        }
        state != REJECT
    }

    #[test]
    fn full_cxx20_operator_set() {
        for op in [
            "::", ".*", "->", "->*", "<<", "<<=", ">>", ">>=", "<=>", "<=", ">=", "==", "!=",
            "&&", "||", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "++", "--", "...", "##",
            "<:", ":>", "<%", "%>", "%:", "%:%:",
        ] {
            assert!(valid_run(op), "operator {op:?} not recognized");
        }
    }

    #[test]
    fn accepted_terminals() {
        for op in [
            "<<=", ">>=", "<=>", "==", "!=", "&&", "||", "++", "--", "...", "##", "->*", "<:",
            ":>", "<%", "%>", "%:%:",
        ] {
            assert!(accepts_exactly(op), "operator {op:?} should accept");
        }
    }

    #[test]
    fn prefixes_stop_by_rejection() {
        // "<" followed by something unrelated: the table rejects and the
        // caller emits "<" alone.
        assert_eq!(next(ST_LT, 'a'), REJECT);
        assert_eq!(next(ST_SHL, 'a'), REJECT);
        assert_eq!(next(ST_MINUS, 'a'), REJECT);
        assert_eq!(next(ST_PC, 'x'), REJECT);
    }

    #[test]
    fn single_char_punctuators() {
        for ch in ['{', '}', '[', ']', '(', ')', ';', '?', ',', '~'] {
            assert_eq!(first(ch), ACCEPT);
        }
        assert_eq!(first('a'), REJECT);
        assert_eq!(first('@'), REJECT);
    }
}
