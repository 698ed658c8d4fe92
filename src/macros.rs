//! Macro definitions: definition-time analysis of the replacement list and
//! the substitution machinery (`#`, `##`, `__VA_ARGS__`, `__VA_OPT__`).
//!
//! A definition precomputes a *correspondence table*: for every replacement
//! position that refers to a parameter (or `__VA_ARGS__`, or opens a
//! `__VA_OPT__` group, or takes part in `##`), one entry recording what has
//! to happen there. `#` and `##` operator tokens and the whitespace around
//! them are stripped from the stored replacement list at this point, so
//! invocation is a single reverse walk over the table.

use crate::automaton::{Automaton, Scan};
use crate::error::PPErrorKind;
use crate::token::{PPToken, TokenCategory};
use crate::{SmartString, StaticVec};

/// What a correspondence entry substitutes at its position.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum ArgRef {
    /// The n-th macro parameter.
    Param(usize),
    /// The whole variadic tail, comma-joined.
    VaArgs,
    /// A `__VA_OPT__(…)` group header.
    VaOpt,
    /// No substitution; the token only takes part in `##`.
    Plain,
}

#[derive(Debug, Clone)]
struct CorrEntry {
    /// Position in the stored replacement list.
    index: usize,
    arg: ArgRef,
    /// Preceded by `#`.
    stringize: bool,
    /// Left operand of `##`.
    concat_lhs: bool,
    /// Right operand of `##`.
    concat_rhs: bool,
    /// Inside a `__VA_OPT__` group.
    in_va_opt: bool,
}

/// Why an invocation failed. The caller owns reporting.
#[derive(Debug)]
pub enum InvokeError {
    /// `##` produced something that is not exactly one pp-token.
    InvalidConcat { joined: SmartString, at: PPToken },
    /// Argument prescan failed; already reported by the prescan callback.
    Prescan,
}

/// Expands macros inside an argument list, in place. Errors are reported by
/// the callback itself.
pub type PrescanFn<'a> = dyn FnMut(&mut Vec<PPToken>) -> Result<(), ()> + 'a;

/// One macro definition, object-like or function-like.
#[derive(Debug, Clone)]
pub struct MacroDef {
    /// Parameter names; for variadic macros the last entry is `...`.
    params: Vec<SmartString>,
    variadic: bool,
    function_like: bool,
    replacement: Vec<PPToken>,
    correspond: Vec<CorrEntry>,
}

impl MacroDef {
    /// Build an object-like macro. `##` concatenations are performed right
    /// away (no parameters can be involved) and self-references painted.
    pub fn object(name: &str, replacement: Vec<PPToken>) -> Result<Self, (PPErrorKind, PPToken)> {
        check_concat_ends(&replacement)?;
        let mut def = Self {
            params: Vec::new(),
            variadic: false,
            function_like: false,
            replacement,
            correspond: Vec::new(),
        };
        def.concat_eagerly()?;
        def.paint_self(name);
        Ok(def)
    }

    /// Build a function-like macro and its correspondence table.
    pub fn function(
        name: &str,
        params: Vec<SmartString>,
        variadic: bool,
        replacement: Vec<PPToken>,
    ) -> Result<Self, (PPErrorKind, PPToken)> {
        check_concat_ends(&replacement)?;
        let mut def = Self {
            params,
            variadic,
            function_like: true,
            replacement,
            correspond: Vec::new(),
        };
        let end = def.replacement.len();
        def.analyze(name, 0, end, false)?;
        Ok(def)
    }

    #[must_use]
    pub fn is_function_like(&self) -> bool {
        self.function_like
    }

    #[must_use]
    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    /// Identical parameter list and replacement list (the benign
    /// redefinition test). Compared against the *pre-analysis* inputs of a
    /// new definition is wrong — compare two built definitions instead.
    #[must_use]
    pub fn is_identical(&self, other: &Self) -> bool {
        self.params == other.params
            && self.variadic == other.variadic
            && self.function_like == other.function_like
            && self.replacement == other.replacement
    }

    /// Argument count validation: exact for fixed macros (with the
    /// zero-parameter / single-empty-argument equivalence), at least
    /// `params − 1` for variadic ones.
    #[must_use]
    pub fn validate_arg_count(&self, args: &[Vec<PPToken>]) -> bool {
        if self.variadic {
            return args.len() >= self.params.len() - 1;
        }
        if self.params.len() == args.len() {
            return true;
        }
        if self.params.is_empty() {
            return args.len() == 1 && args[0].is_empty();
        }
        false
    }

    /// The object-like replacement list (already concatenated and painted).
    #[must_use]
    pub fn replacement(&self) -> &[PPToken] {
        &self.replacement
    }

    /// Step A of expansion: substitute arguments into a copy of the
    /// replacement list, driving stringization, `__VA_OPT__` and `##`.
    /// `prescan` fully macro-expands an argument before substitution.
    pub fn invoke(
        &self,
        args: &[Vec<PPToken>],
        prescan: &mut PrescanFn<'_>,
    ) -> Result<Vec<PPToken>, InvokeError> {
        let mut result = self.replacement.clone();
        let va_empty = self.variadic && self.va_tail_empty(args, prescan)?;
        let mut used_placemarker = false;

        for entry in self.correspond.iter().rev() {
            if entry.in_va_opt && va_empty {
                continue;
            }
            let i = entry.index;

            if entry.arg == ArgRef::VaOpt {
                used_placemarker |=
                    self.substitute_va_opt(&mut result, entry, va_empty)?;
                continue;
            }

            if entry.arg == ArgRef::Plain {
                if entry.concat_lhs {
                    concat_at(&mut result, i + 1)?;
                }
                continue;
            }

            let mut sub = match entry.arg {
                ArgRef::Param(k) => args.get(k).cloned().unwrap_or_default(),
                ArgRef::VaArgs => self.join_va_args(args),
                _ => unreachable!(),
            };

            if entry.stringize {
                sub = vec![stringize(&sub, entry.arg == ArgRef::VaArgs)];
            } else if sub.iter().all(|t| t.category == TokenCategory::Whitespace) {
                sub = vec![PPToken::placemarker()];
                used_placemarker = true;
            } else if !entry.concat_lhs && !entry.concat_rhs {
                prescan(&mut sub).map_err(|()| InvokeError::Prescan)?;
                if sub.is_empty() {
                    sub = vec![PPToken::placemarker()];
                    used_placemarker = true;
                }
            }

            let sub_len = sub.len();
            result.splice(i..=i, sub);
            if entry.concat_lhs {
                concat_at(&mut result, i + sub_len)?;
            }
        }

        if used_placemarker {
            result.retain(|t| t.category != TokenCategory::Placemarker);
        }
        Ok(result)
    }

    /// The comma-joined variadic tail.
    fn join_va_args(&self, args: &[Vec<PPToken>]) -> Vec<PPToken> {
        let first_va = self.params.len() - 1;
        let mut out = Vec::new();
        for (n, arg) in args.iter().enumerate().skip(first_va) {
            out.extend_from_slice(arg);
            if n + 1 != args.len() {
                out.push(PPToken::synthesized(TokenCategory::OpOrPunc, ","));
            }
        }
        out
    }

    /// Is the *expansion* of the variadic tail empty? Deciding this may
    /// require prescanning the final argument.
    fn va_tail_empty(
        &self,
        args: &[Vec<PPToken>],
        prescan: &mut PrescanFn<'_>,
    ) -> Result<bool, InvokeError> {
        let param_count = self.params.len();
        if args.len() < param_count {
            return Ok(true);
        }
        if args.len() > param_count {
            return Ok(false);
        }
        let last = &args[param_count - 1];
        if last.iter().all(|t| t.category == TokenCategory::Whitespace) {
            return Ok(true);
        }
        // The tail has tokens, but they may expand to nothing.
        let mut copy = last.clone();
        prescan(&mut copy).map_err(|()| InvokeError::Prescan)?;
        Ok(copy
            .iter()
            .all(|t| t.category == TokenCategory::Whitespace))
    }

    /// Handle one `__VA_OPT__(…)` group; returns whether a placemarker was
    /// inserted.
    fn substitute_va_opt(
        &self,
        result: &mut Vec<PPToken>,
        entry: &CorrEntry,
        va_empty: bool,
    ) -> Result<bool, InvokeError> {
        let i = entry.index;
        // Nothing before the group shifts positions during the reverse
        // walk, so the opening parenthesis is still right after the header.
        let open = i + 1;
        let close = find_close_paren(result, open + 1)
            .expect("definition analysis guarantees a matching parenthesis");

        if va_empty {
            if entry.stringize {
                let empty = stringize(&[], false);
                result.splice(i..=close, [empty]);
                if entry.concat_lhs {
                    concat_at(result, i + 1)?;
                }
                return Ok(false);
            }
            result.splice(i..=close, []);
            if entry.concat_lhs {
                return Ok(false);
            }
            result.insert(i, PPToken::placemarker());
            return Ok(true);
        }

        let rhs_pos;
        let mut placemarker = false;
        if entry.stringize {
            let interior: Vec<PPToken> = result[open + 1..close].to_vec();
            let s = stringize(&interior, false);
            result.splice(i..=close, [s]);
            rhs_pos = i + 1;
        } else if close == open + 1 {
            // `__VA_OPT__()`: an empty group acts as a placemarker even
            // when the variadic tail is not empty.
            result.splice(i..=close, [PPToken::placemarker()]);
            placemarker = true;
            rhs_pos = i + 1;
        } else {
            result.remove(close);
            result.splice(i..=open, []);
            rhs_pos = i + (close - open - 1);
        }
        if entry.concat_lhs {
            concat_at(result, rhs_pos)?;
        }
        Ok(placemarker)
    }

    /// Object-like macros concatenate at definition time: no parameters can
    /// be involved, so `##` has everything it needs.
    fn concat_eagerly(&mut self) -> Result<(), (PPErrorKind, PPToken)> {
        loop {
            let Some(k) = self
                .replacement
                .iter()
                .position(|t| t.category == TokenCategory::OpOrPunc && t.text == "##")
            else {
                return Ok(());
            };
            // The ends check ran already, so both neighbours exist.
            if self.replacement[k - 1].category == TokenCategory::Whitespace {
                self.replacement.remove(k - 1);
                continue;
            }
            if self.replacement[k + 1].category == TokenCategory::Whitespace {
                self.replacement.remove(k + 1);
                continue;
            }
            self.replacement.remove(k);
            concat_at(&mut self.replacement, k).map_err(|err| match err {
                InvokeError::InvalidConcat { joined, at } => {
                    (PPErrorKind::InvalidTokenConcat(joined.to_string()), at)
                }
                InvokeError::Prescan => unreachable!("no prescan at definition time"),
            })?;
        }
    }

    /// Mark occurrences of the macro's own name so rescanning never
    /// re-expands them.
    fn paint_self(&mut self, name: &str) {
        for token in &mut self.replacement {
            if token.category == TokenCategory::Identifier && token.text == name {
                token.category = TokenCategory::NonMacroIdentifier;
            }
        }
    }

    /// One left-to-right walk over `[start, end)` of the replacement list:
    /// records parameter references, strips `#`/`##` and their adjacent
    /// whitespace, recurses into `__VA_OPT__` groups. Returns the number of
    /// tokens removed.
    fn analyze(
        &mut self,
        name: &str,
        start: usize,
        end: usize,
        in_va_opt: bool,
    ) -> Result<usize, (PPErrorKind, PPToken)> {
        let mut i = start;
        let mut end = end;
        let original_end = end;
        let mut pending_stringize = false;
        let mut pending_concat = false;
        // Correspondence index of a just-closed `__VA_OPT__` group, so that
        // `__VA_OPT__(…) ## rhs` can mark the group as the left operand.
        let mut after_va_opt: Option<usize> = None;

        while i < end {
            let category = self.replacement[i].category;

            if category == TokenCategory::Whitespace {
                if pending_stringize || pending_concat {
                    self.replacement.remove(i);
                    end -= 1;
                } else {
                    i += 1;
                }
                continue;
            }

            if category == TokenCategory::OpOrPunc {
                let text = &self.replacement[i].text;
                if text == "#" && !pending_stringize && !pending_concat {
                    self.replacement.remove(i);
                    end -= 1;
                    pending_stringize = true;
                    continue;
                }
                if text == "##" && !pending_stringize {
                    self.replacement.remove(i);
                    end -= 1;
                    if i > start && self.replacement[i - 1].category == TokenCategory::Whitespace
                    {
                        self.replacement.remove(i - 1);
                        end -= 1;
                        i -= 1;
                    }
                    // Register the left operand.
                    if let Some(corr_idx) = after_va_opt.take() {
                        self.correspond[corr_idx].concat_lhs = true;
                    } else if self
                        .correspond
                        .last()
                        .is_some_and(|e| e.index == i - 1)
                    {
                        self.correspond
                            .last_mut()
                            .expect("just checked")
                            .concat_lhs = true;
                    } else {
                        self.correspond.push(CorrEntry {
                            index: i - 1,
                            arg: ArgRef::Plain,
                            stringize: false,
                            concat_lhs: true,
                            concat_rhs: false,
                            in_va_opt,
                        });
                    }
                    pending_concat = true;
                    continue;
                }
            }

            after_va_opt = None;

            if category == TokenCategory::Identifier {
                let text = self.replacement[i].text.to_smart_string();

                if text.as_str() == name {
                    self.replacement[i].category = TokenCategory::NonMacroIdentifier;
                }

                if text.as_str() == "__VA_ARGS__" {
                    if !self.variadic {
                        return Err((
                            PPErrorKind::VaArgsOutsideVariadic,
                            self.replacement[i].clone(),
                        ));
                    }
                    self.correspond.push(CorrEntry {
                        index: i,
                        arg: ArgRef::VaArgs,
                        stringize: pending_stringize,
                        concat_lhs: false,
                        concat_rhs: pending_concat,
                        in_va_opt,
                    });
                    pending_stringize = false;
                    pending_concat = false;
                    i += 1;
                    continue;
                }

                if text.as_str() == "__VA_OPT__" {
                    if !self.variadic {
                        return Err((
                            PPErrorKind::VaOptOutsideVariadic,
                            self.replacement[i].clone(),
                        ));
                    }
                    if in_va_opt {
                        return Err((PPErrorKind::VaOptNested, self.replacement[i].clone()));
                    }
                    let header = self.replacement[i].clone();
                    let immediately_open = self
                        .replacement
                        .get(i + 1)
                        .is_some_and(|t| {
                            t.category == TokenCategory::OpOrPunc && t.text == "("
                        });
                    if !immediately_open {
                        return Err((PPErrorKind::VaOptMissingParen, header));
                    }
                    let Some(close) = find_close_paren(&self.replacement, i + 2) else {
                        return Err((PPErrorKind::VaOptMissingParen, header));
                    };
                    self.correspond.push(CorrEntry {
                        index: i,
                        arg: ArgRef::VaOpt,
                        stringize: pending_stringize,
                        concat_lhs: false,
                        concat_rhs: pending_concat,
                        in_va_opt: false,
                    });
                    let entry_idx = self.correspond.len() - 1;
                    pending_stringize = false;
                    pending_concat = false;

                    let removed = self.analyze(name, i + 2, close, true)?;
                    end -= removed;
                    i = close - removed + 1;
                    after_va_opt = Some(entry_idx);
                    continue;
                }

                let param = self
                    .params
                    .iter()
                    .position(|p| p.as_str() != "..." && p.as_str() == text.as_str());
                if let Some(k) = param {
                    self.correspond.push(CorrEntry {
                        index: i,
                        arg: ArgRef::Param(k),
                        stringize: pending_stringize,
                        concat_lhs: false,
                        concat_rhs: pending_concat,
                        in_va_opt,
                    });
                    pending_stringize = false;
                    pending_concat = false;
                    i += 1;
                    continue;
                }
            }

            // Anything else: `#` must have named a parameter.
            if pending_stringize {
                return Err((
                    PPErrorKind::StringizeNonParameter,
                    self.replacement[i].clone(),
                ));
            }
            pending_concat = false;
            i += 1;
        }

        Ok(original_end - end)
    }
}

/// `##` cannot stand at either end of a replacement list.
fn check_concat_ends(replacement: &[PPToken]) -> Result<(), (PPErrorKind, PPToken)> {
    let is_concat_op =
        |t: &PPToken| t.category == TokenCategory::OpOrPunc && t.text == "##";
    let significant =
        |t: &&PPToken| t.category != TokenCategory::Whitespace;
    // Report the one appearing first in the source.
    if let Some(first) = replacement.iter().find(significant) {
        if is_concat_op(first) {
            return Err((PPErrorKind::ConcatAtListEnds, first.clone()));
        }
    }
    if let Some(last) = replacement.iter().rev().find(significant) {
        if is_concat_op(last) {
            return Err((PPErrorKind::ConcatAtListEnds, last.clone()));
        }
    }
    Ok(())
}

/// First `)` balancing the parenthesis just before `from`, ignoring nested
/// pairs.
pub(crate) fn find_close_paren(tokens: &[PPToken], from: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (n, token) in tokens.iter().enumerate().skip(from) {
        if token.category != TokenCategory::OpOrPunc {
            continue;
        }
        if token.text == "(" {
            depth += 1;
        } else if token.text == ")" {
            if depth == 0 {
                return Some(n);
            }
            depth -= 1;
        }
    }
    None
}

/// Join `tokens[at - 1]` and `tokens[at]` into one pp-token (the `##`
/// operation). Placemarkers absorb; otherwise the joined spelling must
/// re-tokenize as exactly one token.
pub(crate) fn concat_at(tokens: &mut Vec<PPToken>, at: usize) -> Result<(), InvokeError> {
    let lhs_pm = tokens[at - 1].category == TokenCategory::Placemarker;
    let rhs_pm = tokens[at].category == TokenCategory::Placemarker;
    if lhs_pm {
        tokens.remove(at - 1);
        return Ok(());
    }
    if rhs_pm {
        tokens.remove(at);
        return Ok(());
    }

    let joined: SmartString = {
        let mut s = SmartString::from(tokens[at - 1].text());
        s.push_str(tokens[at].text());
        s
    };
    let Some(category) = retokenize_single(&joined) else {
        return Err(InvokeError::InvalidConcat {
            joined,
            at: tokens[at].clone(),
        });
    };

    let rhs = tokens.remove(at);
    let lhs = &mut tokens[at - 1];
    let mut composed: StaticVec<_> = std::mem::take(&mut lhs.composed);
    composed.extend(rhs.composed);
    let line = lhs.line.clone().or(rhs.line);
    *lhs = PPToken {
        category,
        text: joined.into(),
        column: lhs.column,
        line,
        composed,
    };
    Ok(())
}

/// Run the token automaton over a spelling; `Some(category)` iff it forms
/// exactly one pp-token.
pub(crate) fn retokenize_single(text: &str) -> Option<TokenCategory> {
    let mut sm = Automaton::new();
    let mut count = 0usize;
    let mut category = None;
    let mut chars = text.chars().peekable();
    while let Some(&ch) = chars.peek() {
        match sm.input_char(ch) {
            Scan::Continue => {
                chars.next();
            }
            Scan::Accept(cat) => {
                count += 1;
                category = Some(cat);
            }
            Scan::Error(_) => return None,
        }
    }
    match sm.input_newline() {
        Scan::Accept(TokenCategory::Empty) => {}
        Scan::Accept(cat) => {
            count += 1;
            category = Some(cat);
        }
        _ => return None,
    }
    if count == 1 {
        // A lone whitespace or comment is not a usable pp-token.
        category.filter(|c| !c.is_whitespace_like())
    } else {
        None
    }
}

/// Convert a token sequence into one string-literal pp-token (`#`).
///
/// Leading and trailing whitespace go; interior whitespace runs become one
/// space; `\` and `"` inside string and character literals are escaped. For
/// variadic stringization every comma is followed by a space.
pub(crate) fn stringize(tokens: &[PPToken], comma_space: bool) -> PPToken {
    let skip = |t: &PPToken| {
        t.category == TokenCategory::Whitespace || t.category == TokenCategory::Placemarker
    };
    let first = tokens.iter().position(|t| !skip(t)).unwrap_or(tokens.len());
    let last = tokens.iter().rposition(|t| !skip(t)).map_or(first, |n| n + 1);
    let inner = &tokens[first..last];

    let mut s = SmartString::from("\"");
    for token in inner {
        match token.category {
            TokenCategory::Placemarker => continue,
            TokenCategory::Whitespace => s.push(' '),
            cat if cat.is_literal() => {
                let quotes = cat.is_string_literal();
                for ch in token.text().chars() {
                    if ch == '\\' || (quotes && ch == '"') {
                        s.push('\\');
                    }
                    s.push(ch);
                }
            }
            _ => s.push_str(token.text()),
        }
        if comma_space && token.category == TokenCategory::OpOrPunc && token.text == "," {
            s.push(' ');
        }
    }
    s.push('"');

    let anchor = inner.first();
    PPToken {
        category: TokenCategory::StringLiteral,
        text: s.into(),
        line: anchor.and_then(|t| t.line.clone()),
        column: anchor.map_or(0, |t| t.column),
        composed: StaticVec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(category: TokenCategory, text: &str) -> PPToken {
        PPToken::synthesized(category, text)
    }

    fn ident(text: &str) -> PPToken {
        tok(TokenCategory::Identifier, text)
    }

    fn op(text: &str) -> PPToken {
        tok(TokenCategory::OpOrPunc, text)
    }

    fn ws() -> PPToken {
        tok(TokenCategory::Whitespace, " ")
    }

    fn no_prescan() -> Box<dyn FnMut(&mut Vec<PPToken>) -> Result<(), ()>> {
        Box::new(|_| Ok(()))
    }

    fn texts(tokens: &[PPToken]) -> Vec<&str> {
        tokens
            .iter()
            .filter(|t| t.category != TokenCategory::Whitespace)
            .map(PPToken::text)
            .collect()
    }

    #[test]
    fn object_macro_eager_concat() {
        let def = MacroDef::object(
            "CAT",
            vec![ident("foo"), ws(), op("##"), ws(), tok(TokenCategory::PPNumber, "42")],
        )
        .expect("valid definition");
        assert_eq!(def.replacement().len(), 1);
        assert_eq!(def.replacement()[0].text(), "foo42");
        assert_eq!(def.replacement()[0].category, TokenCategory::Identifier);
    }

    #[test]
    fn object_macro_paints_self() {
        let def = MacroDef::object("M", vec![ident("M"), op("+"), tok(TokenCategory::PPNumber, "1")])
            .expect("valid definition");
        assert_eq!(
            def.replacement()[0].category,
            TokenCategory::NonMacroIdentifier
        );
    }

    #[test]
    fn concat_at_ends_rejected() {
        let err = MacroDef::object("A", vec![op("##"), ident("x")]).unwrap_err();
        assert_eq!(err.0, PPErrorKind::ConcatAtListEnds);
        let err =
            MacroDef::function("F", vec!["a".into()], false, vec![ident("a"), ws(), op("##")])
                .unwrap_err();
        assert_eq!(err.0, PPErrorKind::ConcatAtListEnds);
    }

    #[test]
    fn simple_substitution() {
        // #define G(a,b) a##b  —  G(foo, 42) → foo42
        let def = MacroDef::function(
            "G",
            vec!["a".into(), "b".into()],
            false,
            vec![ident("a"), op("##"), ident("b")],
        )
        .expect("valid definition");
        let args = vec![vec![ident("foo")], vec![tok(TokenCategory::PPNumber, "42")]];
        let out = def.invoke(&args, &mut *no_prescan()).expect("expands");
        assert_eq!(texts(&out), vec!["foo42"]);
        assert_eq!(out[0].category, TokenCategory::Identifier);
        assert!(out[0].text.is_owned());
    }

    #[test]
    fn stringize_argument() {
        // #define S(x) #x  —  S(hello world) → "hello world"
        let def = MacroDef::function(
            "S",
            vec!["x".into()],
            false,
            vec![op("#"), ident("x")],
        )
        .expect("valid definition");
        let args = vec![vec![ident("hello"), ws(), ident("world")]];
        let out = def.invoke(&args, &mut *no_prescan()).expect("expands");
        assert_eq!(texts(&out), vec!["\"hello world\""]);
        assert_eq!(out[0].category, TokenCategory::StringLiteral);
    }

    #[test]
    fn stringize_escapes_literals() {
        let def = MacroDef::function("S", vec!["x".into()], false, vec![op("#"), ident("x")])
            .expect("valid definition");
        let args = vec![vec![tok(TokenCategory::StringLiteral, r#""a\n""#)]];
        let out = def.invoke(&args, &mut *no_prescan()).expect("expands");
        assert_eq!(out[0].text(), r#""\"a\\n\"""#);
    }

    #[test]
    fn va_opt_empty_and_nonempty() {
        // #define F(...) f(0 __VA_OPT__(,) __VA_ARGS__)
        let def = MacroDef::function(
            "F",
            vec!["...".into()],
            true,
            vec![
                ident("f"),
                op("("),
                tok(TokenCategory::PPNumber, "0"),
                ws(),
                ident("__VA_OPT__"),
                op("("),
                op(","),
                op(")"),
                ws(),
                ident("__VA_ARGS__"),
                op(")"),
            ],
        )
        .expect("valid definition");

        let out = def.invoke(&[vec![]], &mut *no_prescan()).expect("expands");
        assert_eq!(texts(&out), vec!["f", "(", "0", ")"]);

        let args = vec![vec![ident("a")], vec![ident("b")]];
        let out = def.invoke(&args, &mut *no_prescan()).expect("expands");
        assert_eq!(texts(&out), vec!["f", "(", "0", ",", "a", ",", "b", ")"]);
    }

    #[test]
    fn stringized_va_args_preserve_commas() {
        let def = MacroDef::function(
            "S",
            vec!["...".into()],
            true,
            vec![op("#"), ident("__VA_ARGS__")],
        )
        .expect("valid definition");
        let args = vec![vec![ident("a")], vec![ident("b")]];
        let out = def.invoke(&args, &mut *no_prescan()).expect("expands");
        assert_eq!(out[0].text(), "\"a, b\"");
    }

    #[test]
    fn empty_argument_becomes_placemarker_then_vanishes() {
        // #define J(a,b) [a##b]  —  J(,x) → [x]
        let def = MacroDef::function(
            "J",
            vec!["a".into(), "b".into()],
            false,
            vec![op("["), ident("a"), op("##"), ident("b"), op("]")],
        )
        .expect("valid definition");
        let out = def
            .invoke(&[vec![], vec![ident("x")]], &mut *no_prescan())
            .expect("expands");
        assert_eq!(texts(&out), vec!["[", "x", "]"]);
    }

    #[test]
    fn invalid_concatenation_is_an_error() {
        // #define B(a) a##)  is fine to define (## is interior) but
        // joining "x" with ")" cannot form one token.
        let def = MacroDef::function(
            "B",
            vec!["a".into()],
            false,
            vec![ident("a"), op("##"), op(")"), ident("tail")],
        )
        .expect("valid definition");
        let err = def
            .invoke(&[vec![ident("x")]], &mut *no_prescan())
            .unwrap_err();
        assert!(matches!(err, InvokeError::InvalidConcat { .. }));
    }

    #[test]
    fn va_opt_requires_immediate_paren() {
        let err = MacroDef::function(
            "F",
            vec!["...".into()],
            true,
            vec![ident("__VA_OPT__"), ws(), op("("), ident("x"), op(")")],
        )
        .unwrap_err();
        assert_eq!(err.0, PPErrorKind::VaOptMissingParen);
    }

    #[test]
    fn va_opt_outside_variadic_rejected() {
        let err = MacroDef::function(
            "F",
            vec!["a".into()],
            false,
            vec![ident("__VA_OPT__"), op("("), ident("x"), op(")")],
        )
        .unwrap_err();
        assert_eq!(err.0, PPErrorKind::VaOptOutsideVariadic);
    }

    #[test]
    fn stringize_must_name_a_parameter() {
        let err = MacroDef::function(
            "F",
            vec!["a".into()],
            false,
            vec![op("#"), ident("b")],
        )
        .unwrap_err();
        assert_eq!(err.0, PPErrorKind::StringizeNonParameter);
    }

    #[test]
    fn retokenize_rules() {
        assert_eq!(retokenize_single("foo42"), Some(TokenCategory::Identifier));
        assert_eq!(retokenize_single("12e5"), Some(TokenCategory::PPNumber));
        assert_eq!(retokenize_single("<<"), Some(TokenCategory::OpOrPunc));
        assert_eq!(retokenize_single("x y"), None);
        assert_eq!(retokenize_single("x)"), None);
    }

    #[test]
    fn zero_param_macro_accepts_one_empty_argument() {
        let def =
            MacroDef::function("F", vec![], false, vec![ident("body")]).expect("valid definition");
        assert!(def.validate_arg_count(&[vec![]]));
        assert!(!def.validate_arg_count(&[vec![ident("x")]]));
    }
}
