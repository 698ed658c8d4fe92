//! The macro table: definition storage, predefined macros, the `#line`
//! override map, and rescanning with recursion suppression.

use crate::error::{PPErrorKind, Reporter, Severity};
use crate::macros::{find_close_paren, InvokeError, MacroDef};
use crate::token::{PPToken, TokenCategory};
use crate::SmartString;
use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Macro names suppressed from expansion along the current rescan path.
pub type BlueSet = AHashSet<SmartString>;

/// Fixed predefined macros, expanded as pp-numbers.
const PREDEFINED_FIXED: &[(&str, &str)] = &[
    ("__cplusplus", "202002L"),
    ("__STDC_HOSTED__", "1"),
    ("__STDCPP_DEFAULT_NEW_ALIGNMENT__", "16ull"),
    ("__STDCPP_THREADS__", "1"),
];

const PREDEFINED_SPECIAL: &[&str] = &["__LINE__", "__FILE__", "__DATE__", "__TIME__"];

/// Name → definition mapping plus everything directive execution needs to
/// materialize predefined macros.
pub struct MacroTable {
    macros: AHashMap<SmartString, MacroDef>,
    /// Logical line of each `#line` directive → reported line number.
    line_map: BTreeMap<u32, u64>,
    filename: PathBuf,
    /// Filename rebound by `#line N "name"`.
    override_filename: Option<String>,
    /// Fixed instant backing `__DATE__` and `__TIME__`.
    start_time: DateTime<Utc>,
}

impl MacroTable {
    #[must_use]
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            macros: AHashMap::new(),
            line_map: BTreeMap::new(),
            filename: filename.into(),
            override_filename: None,
            start_time: Utc::now(),
        }
    }

    #[must_use]
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    fn is_predefined(name: &str) -> bool {
        PREDEFINED_SPECIAL.contains(&name)
            || PREDEFINED_FIXED.iter().any(|&(n, _)| n == name)
    }

    /// Is `name` a macro, and if so is it function-like? Predefined names
    /// all behave as object-like.
    #[must_use]
    pub fn is_macro(&self, name: &str) -> Option<bool> {
        if Self::is_predefined(name) {
            return Some(false);
        }
        self.macros.get(name).map(MacroDef::is_function_like)
    }

    /// Register a definition built by the caller. Benign redefinition is
    /// silent; anything else reports and keeps the original. Returns
    /// whether the table accepted (or benignly ignored) the definition.
    pub fn define(
        &mut self,
        reporter: &mut dyn Reporter,
        name_tok: &PPToken,
        def: MacroDef,
    ) -> bool {
        let name = name_tok.text.to_smart_string();
        if Self::is_predefined(&name) {
            reporter.pp_err_report(
                &self.filename,
                name_tok,
                PPErrorKind::Redefinition(name.to_string()),
                Severity::Error,
            );
            return false;
        }
        if let Some(existing) = self.macros.get(&name) {
            if existing.is_identical(&def) {
                return true;
            }
            reporter.pp_err_report(
                &self.filename,
                name_tok,
                PPErrorKind::Redefinition(name.to_string()),
                Severity::Error,
            );
            return false;
        }
        tracing::debug!(macro_name = %name, function_like = def.is_function_like(), "define");
        self.macros.insert(name, def);
        true
    }

    /// `#undef`: absent names are not an error. Predefined names stay.
    pub fn undef(&mut self, name: &str) {
        tracing::debug!(macro_name = %name, "undef");
        self.macros.remove(name);
    }

    /// Record a `#line` override. `directive_line` is the logical line the
    /// directive itself is on.
    pub fn set_line_override(
        &mut self,
        directive_line: u32,
        reported: u64,
        filename: Option<String>,
    ) {
        tracing::debug!(directive_line, reported, "line override");
        self.line_map.insert(directive_line, reported);
        if filename.is_some() {
            self.override_filename = filename;
        }
    }

    /// The line number `__LINE__` reports at `logical_line`, adjusted by
    /// the nearest preceding `#line`.
    #[must_use]
    pub fn reported_line(&self, logical_line: u32) -> u64 {
        match self.line_map.range(..=logical_line).next_back() {
            Some((&marker, &value)) => value + u64::from(logical_line - marker),
            None => u64::from(logical_line),
        }
    }

    /// The filename `__FILE__` reports.
    #[must_use]
    pub fn reported_filename(&self) -> String {
        match &self.override_filename {
            Some(name) => name.clone(),
            None => self
                .filename
                .file_name()
                .map_or_else(|| self.filename.display().to_string(), |n| {
                    n.to_string_lossy().into_owned()
                }),
        }
    }

    /// Materialize a predefined macro, or `None` if `name_tok` is not one.
    fn predefined(&self, name_tok: &PPToken) -> Option<Vec<PPToken>> {
        let materialize = |category, text: String| {
            let mut token = PPToken::synthesized(category, text);
            token.line = name_tok.line.clone();
            token.column = name_tok.column;
            vec![token]
        };

        match name_tok.text() {
            "__LINE__" => {
                let line = self.reported_line(name_tok.logical_line());
                Some(materialize(TokenCategory::PPNumber, line.to_string()))
            }
            "__FILE__" => Some(materialize(
                TokenCategory::StringLiteral,
                format!("\"{}\"", self.reported_filename()),
            )),
            "__DATE__" => Some(materialize(
                TokenCategory::StringLiteral,
                format!("\"{}\"", self.start_time.format("%b %e %Y")),
            )),
            "__TIME__" => Some(materialize(
                TokenCategory::StringLiteral,
                format!("\"{}\"", self.start_time.format("%H:%M:%S")),
            )),
            name => PREDEFINED_FIXED
                .iter()
                .find(|&&(n, _)| n == name)
                .map(|&(_, value)| materialize(TokenCategory::PPNumber, value.to_owned())),
        }
    }

    /// Expand an object-like macro (or a predefined one) and rescan the
    /// result. Returns `(scan complete, tokens)`; incomplete means a
    /// function-like call in the result ran past the end of the token list
    /// and the caller must keep feeding upstream tokens. Errors have been
    /// reported; the returned kind is for the fatal stream result.
    pub fn expand_object(
        &self,
        reporter: &mut dyn Reporter,
        name_tok: &PPToken,
        blue: &mut BlueSet,
    ) -> Result<(bool, Vec<PPToken>), PPErrorKind> {
        if let Some(result) = self.predefined(name_tok) {
            return Ok((true, result));
        }

        let name = name_tok.text.to_smart_string();
        let def = self
            .macros
            .get(&name)
            .expect("caller checked is_macro first");
        let mut result = def.replacement().to_vec();

        blue.insert(name.clone());
        let complete = self.rescan(reporter, &mut result, blue)?;
        if complete {
            blue.remove(&name);
        }
        strip_whitespace(&mut result);
        Ok((complete, result))
    }

    /// Expand a function-like macro with collected arguments and rescan the
    /// result.
    pub fn expand_function(
        &self,
        reporter: &mut dyn Reporter,
        name_tok: &PPToken,
        args: &[Vec<PPToken>],
        blue: &mut BlueSet,
    ) -> Result<(bool, Vec<PPToken>), PPErrorKind> {
        let name = name_tok.text.to_smart_string();
        let def = self
            .macros
            .get(&name)
            .expect("caller checked is_macro first");

        if !def.validate_arg_count(args) {
            let kind = PPErrorKind::ArgCountMismatch(name.to_string());
            reporter.pp_err_report(&self.filename, name_tok, kind.clone(), Severity::Error);
            return Err(kind);
        }
        tracing::trace!(macro_name = %name, args = args.len(), "expand");

        let mut prescan_failure: Option<PPErrorKind> = None;
        let constructed = {
            // Argument prescan: full expansion under the current blue set,
            // without the macro being invoked.
            let failure = &mut prescan_failure;
            let mut prescan = |list: &mut Vec<PPToken>| -> Result<(), ()> {
                let mut prescan_blue = blue.clone();
                match self.rescan(reporter, list, &mut prescan_blue) {
                    Ok(_) => Ok(()),
                    Err(kind) => {
                        *failure = Some(kind);
                        Err(())
                    }
                }
            };
            def.invoke(args, &mut prescan)
        };

        let mut result = match constructed {
            Ok(result) => result,
            Err(InvokeError::InvalidConcat { joined, at }) => {
                let kind = PPErrorKind::InvalidTokenConcat(joined.to_string());
                let anchor = if at.line.is_some() { &at } else { name_tok };
                reporter.pp_err_report(&self.filename, anchor, kind.clone(), Severity::Error);
                return Err(kind);
            }
            Err(InvokeError::Prescan) => {
                // Already reported inside the nested expansion.
                return Err(prescan_failure
                    .unwrap_or(PPErrorKind::ArgCountMismatch(name.to_string())));
            }
        };

        blue.insert(name.clone());
        let complete = self.rescan(reporter, &mut result, blue)?;
        if complete {
            blue.remove(&name);
        }
        strip_whitespace(&mut result);
        Ok((complete, result))
    }

    /// Rescan a token list for further macro invocations. Identifiers in
    /// the blue set are painted and stay inert forever; everything else
    /// expands in place. `Ok(false)` means a function-like invocation runs
    /// past the end of the list.
    pub fn rescan(
        &self,
        reporter: &mut dyn Reporter,
        list: &mut Vec<PPToken>,
        blue: &mut BlueSet,
    ) -> Result<bool, PPErrorKind> {
        let mut i = 0;
        while i < list.len() {
            if list[i].category != TokenCategory::Identifier {
                i += 1;
                continue;
            }
            let name = list[i].text.to_smart_string();
            if blue.contains(&name) {
                list[i].category = TokenCategory::NonMacroIdentifier;
                i += 1;
                continue;
            }
            let Some(function_like) = self.is_macro(&name) else {
                i += 1;
                continue;
            };

            if !function_like {
                let name_tok = list[i].clone();
                let (complete, result) = self.expand_object(reporter, &name_tok, blue)?;
                let len = result.len();
                list.splice(i..=i, result);
                if complete {
                    i += len;
                }
                // Incomplete: rescan from the start of the spliced result,
                // which now sees the upstream tokens of this list.
                continue;
            }

            // Function-like: the invocation needs `(` and its arguments.
            let open = list[i + 1..]
                .iter()
                .position(|t| !t.category.is_whitespace_like())
                .map(|p| i + 1 + p);
            let Some(open) = open else {
                return Ok(false);
            };
            if !(list[open].category == TokenCategory::OpOrPunc && list[open].text == "(") {
                i = open;
                continue;
            }
            let Some(close) = find_close_paren(list, open + 1) else {
                return Ok(false);
            };

            let args = split_args(&list[open + 1..close]);
            let name_tok = list[i].clone();
            let (complete, result) = self.expand_function(reporter, &name_tok, &args, blue)?;
            let len = result.len();
            list.splice(i..=close, result);
            if complete {
                i += len;
            }
        }
        Ok(true)
    }
}

/// Split the tokens between a call's parentheses into arguments: top-level
/// commas separate, nested parentheses shield, whitespace normalizes to a
/// single interior space.
pub(crate) fn split_args(tokens: &[PPToken]) -> Vec<Vec<PPToken>> {
    let mut args = Vec::new();
    let mut current: Vec<PPToken> = Vec::new();
    let mut depth = 0usize;

    for token in tokens {
        if token.category == TokenCategory::OpOrPunc {
            match token.text() {
                "," if depth == 0 => {
                    args.push(trim_whitespace(std::mem::take(&mut current)));
                    continue;
                }
                "(" => depth += 1,
                ")" => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        if token.category.is_whitespace_like() || token.category == TokenCategory::Newline {
            if current
                .last()
                .is_some_and(|t| t.category == TokenCategory::Whitespace)
            {
                continue;
            }
            current.push(PPToken::synthesized(TokenCategory::Whitespace, " "));
            continue;
        }
        current.push(token.clone());
    }
    args.push(trim_whitespace(current));
    args
}

pub(crate) fn trim_whitespace(mut tokens: Vec<PPToken>) -> Vec<PPToken> {
    while tokens
        .first()
        .is_some_and(|t| t.category == TokenCategory::Whitespace)
    {
        tokens.remove(0);
    }
    while tokens
        .last()
        .is_some_and(|t| t.category == TokenCategory::Whitespace)
    {
        tokens.pop();
    }
    tokens
}

pub(crate) fn strip_whitespace(tokens: &mut Vec<PPToken>) {
    tokens.retain(|t| t.category != TokenCategory::Whitespace);
}

/// Pull the character content out of a (raw) string-literal spelling, for
/// `#line N "name"` filename rebinding.
pub(crate) fn string_literal_contents(spelling: &str, raw: bool) -> Option<&str> {
    if raw {
        let start = spelling.find("R\"")? + 2;
        let open = spelling[start..].find('(')? + start;
        let delimiter = &spelling[start..open];
        let closer = format!("){delimiter}\"");
        let body = &spelling[open + 1..];
        let end = body.rfind(&closer)?;
        Some(&body[..end])
    } else {
        let first = spelling.find('"')? + 1;
        let last = spelling.rfind('"')?;
        (first <= last).then(|| &spelling[first..last])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingReporter;

    fn ident(text: &str) -> PPToken {
        PPToken::synthesized(TokenCategory::Identifier, text)
    }

    fn num(text: &str) -> PPToken {
        PPToken::synthesized(TokenCategory::PPNumber, text)
    }

    fn op(text: &str) -> PPToken {
        PPToken::synthesized(TokenCategory::OpOrPunc, text)
    }

    fn texts(tokens: &[PPToken]) -> Vec<&str> {
        tokens.iter().map(PPToken::text).collect()
    }

    #[test]
    fn benign_redefinition_is_silent() {
        let mut table = MacroTable::new("t.cpp");
        let mut reporter = CollectingReporter::new();
        let name = ident("N");
        let def1 = MacroDef::object("N", vec![num("1")]).unwrap();
        let def2 = MacroDef::object("N", vec![num("1")]).unwrap();
        assert!(table.define(&mut reporter, &name, def1));
        assert!(table.define(&mut reporter, &name, def2));
        assert!(reporter.diagnostics.is_empty());
    }

    #[test]
    fn differing_redefinition_keeps_original() {
        let mut table = MacroTable::new("t.cpp");
        let mut reporter = CollectingReporter::new();
        let name = ident("N");
        table.define(&mut reporter, &name, MacroDef::object("N", vec![num("1")]).unwrap());
        assert!(!table.define(&mut reporter, &name, MacroDef::object("N", vec![num("2")]).unwrap()));
        assert_eq!(reporter.error_count(), 1);

        let mut blue = BlueSet::new();
        let (_, out) = table.expand_object(&mut reporter, &name, &mut blue).unwrap();
        assert_eq!(texts(&out), vec!["1"]);
    }

    #[test]
    fn blue_painting_stops_recursion() {
        // #define M M+1  —  M expands once, inner M stays inert.
        let mut table = MacroTable::new("t.cpp");
        let mut reporter = CollectingReporter::new();
        let def = MacroDef::object("M", vec![ident("M"), op("+"), num("1")]).unwrap();
        table.define(&mut reporter, &ident("M"), def);

        let mut blue = BlueSet::new();
        let (complete, out) = table
            .expand_object(&mut reporter, &ident("M"), &mut blue)
            .unwrap();
        assert!(complete);
        assert_eq!(texts(&out), vec!["M", "+", "1"]);
        assert_eq!(out[0].category, TokenCategory::NonMacroIdentifier);
    }

    #[test]
    fn mutual_recursion_terminates() {
        // #define A B  /  #define B A  —  A → B → A(painted).
        let mut table = MacroTable::new("t.cpp");
        let mut reporter = CollectingReporter::new();
        table.define(&mut reporter, &ident("A"), MacroDef::object("A", vec![ident("B")]).unwrap());
        table.define(&mut reporter, &ident("B"), MacroDef::object("B", vec![ident("A")]).unwrap());

        let mut blue = BlueSet::new();
        let (_, out) = table
            .expand_object(&mut reporter, &ident("A"), &mut blue)
            .unwrap();
        assert_eq!(texts(&out), vec!["A"]);
        assert_eq!(out[0].category, TokenCategory::NonMacroIdentifier);
    }

    #[test]
    fn incomplete_function_call_reports_back() {
        // #define G F  /  #define F(x) x  — expanding G alone leaves the
        // F call waiting for upstream tokens.
        let mut table = MacroTable::new("t.cpp");
        let mut reporter = CollectingReporter::new();
        table.define(&mut reporter, &ident("G"), MacroDef::object("G", vec![ident("F")]).unwrap());
        table.define(
            &mut reporter,
            &ident("F"),
            MacroDef::function("F", vec!["x".into()], false, vec![ident("x")]).unwrap(),
        );

        let mut blue = BlueSet::new();
        let (complete, out) = table
            .expand_object(&mut reporter, &ident("G"), &mut blue)
            .unwrap();
        assert!(!complete);
        assert_eq!(texts(&out), vec!["F"]);
        // The pending names stay blue until the caller finishes the call.
        assert!(blue.contains("G"));
    }

    #[test]
    fn adjacency_inside_one_list_expands() {
        // Rescanning "G (1)" where G → F: the F call completes from the
        // same list.
        let mut table = MacroTable::new("t.cpp");
        let mut reporter = CollectingReporter::new();
        table.define(&mut reporter, &ident("G"), MacroDef::object("G", vec![ident("F")]).unwrap());
        table.define(
            &mut reporter,
            &ident("F"),
            MacroDef::function("F", vec!["x".into()], false, vec![ident("x")]).unwrap(),
        );

        let mut list = vec![
            ident("G"),
            PPToken::synthesized(TokenCategory::Whitespace, " "),
            op("("),
            num("1"),
            op(")"),
        ];
        let mut blue = BlueSet::new();
        let complete = table.rescan(&mut reporter, &mut list, &mut blue).unwrap();
        assert!(complete);
        strip_whitespace(&mut list);
        assert_eq!(texts(&list), vec!["1"]);
    }

    #[test]
    fn line_override_adjusts_reporting() {
        let mut table = MacroTable::new("t.cpp");
        // "#line 100" on logical line 3: line 3 reports 100, line 3+k
        // reports 100+k.
        table.set_line_override(3, 100, None);
        assert_eq!(table.reported_line(2), 2);
        assert_eq!(table.reported_line(3), 100);
        assert_eq!(table.reported_line(7), 104);
    }

    #[test]
    fn predefined_line_and_file() {
        let table = MacroTable::new("dir/test.cpp");
        let mut name = ident("__LINE__");
        name.line = Some(crate::Shared::new(crate::source::LogicalLine {
            text: "__LINE__".into(),
            phys_line: 5,
            number: 5,
            splices: smallvec::SmallVec::new(),
        }));
        let out = table.predefined(&name).unwrap();
        assert_eq!(out[0].text(), "5");
        assert_eq!(out[0].category, TokenCategory::PPNumber);

        let out = table.predefined(&ident("__FILE__")).unwrap();
        assert_eq!(out[0].text(), "\"test.cpp\"");

        let out = table.predefined(&ident("__cplusplus")).unwrap();
        assert_eq!(out[0].text(), "202002L");
    }

    #[test]
    fn date_and_time_formats() {
        let table = MacroTable::new("t.cpp");
        let date = table.predefined(&ident("__DATE__")).unwrap()[0]
            .text()
            .to_owned();
        // "Mmm dd yyyy" with a space-padded day: always 13 bytes quoted.
        assert_eq!(date.len(), 13);
        assert_eq!(&date[4..5], " ");
        let time = table.predefined(&ident("__TIME__")).unwrap()[0]
            .text()
            .to_owned();
        assert_eq!(time.len(), 10);
        assert_eq!(&time[3..4], ":");
        assert_eq!(&time[6..7], ":");
    }

    #[test]
    fn string_literal_extraction() {
        assert_eq!(string_literal_contents("\"name.h\"", false), Some("name.h"));
        assert_eq!(
            string_literal_contents("R\"d(a\"b)d\"", true),
            Some("a\"b")
        );
        assert_eq!(string_literal_contents("u8\"x\"", false), Some("x"));
    }

    #[test]
    fn split_args_shields_nested_parens() {
        let tokens = vec![
            ident("a"),
            op(","),
            ident("f"),
            op("("),
            num("1"),
            op(","),
            num("2"),
            op(")"),
            op(","),
            PPToken::synthesized(TokenCategory::Whitespace, "   "),
            ident("c"),
        ];
        let args = split_args(&tokens);
        assert_eq!(args.len(), 3);
        assert_eq!(texts(&args[0]), vec!["a"]);
        assert_eq!(texts(&args[1]), vec!["f", "(", "1", ",", "2", ")"]);
        assert_eq!(texts(&args[2]), vec!["c"]);
    }
}
