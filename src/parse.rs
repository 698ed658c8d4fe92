//! The pp-token assembler: groups lexical tokens into preprocessing tokens
//! one logical line at a time, dispatches directives, and drives macro
//! expansion.

use crate::condexpr::ConstExprEval;
use crate::error::{PPError, PPErrorKind, Reporter, Severity};
use crate::lexer::Lexer;
use crate::macros::MacroDef;
use crate::source::{LogicalLine, SourceLines};
use crate::table::{
    split_args, string_literal_contents, trim_whitespace, BlueSet, MacroTable,
};
use crate::token::{LexToken, PPToken, TokenCategory};
use crate::{Shared, SmartString};
use smallvec::{smallvec, SmallVec};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// External collaborator that turns a header-name into a line producer.
/// The core recognizes `#include` but never resolves it; nested
/// translation-unit orchestration belongs to the driver around the core.
pub trait IncludeResolver {
    fn resolve(&self, header_name: &str) -> Option<Box<dyn SourceLines>>;
}

/// Configuration facade for the pipeline. No state persists across runs;
/// everything is set through constructor arguments.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    filename: PathBuf,
}

impl Preprocessor {
    #[must_use]
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
        }
    }

    #[must_use]
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// The lazy pipeline: pp-tokens in source order, ending at end of file
    /// or with one fatal error item.
    pub fn token_stream<'a>(
        &self,
        source: impl SourceLines + 'a,
        reporter: &'a mut dyn Reporter,
    ) -> TokenStream<'a> {
        TokenStream {
            lexer: Lexer::new(Box::new(source)),
            pending: VecDeque::new(),
            table: MacroTable::new(&self.filename),
            reporter,
            out: VecDeque::new(),
            cond_depth: Vec::new(),
            fatal: None,
            finished: false,
        }
    }

    /// Drive the whole pipeline and collect the result.
    pub fn run(
        &self,
        source: impl SourceLines,
        reporter: &mut dyn Reporter,
    ) -> Result<Vec<PPToken>, PPError> {
        let mut tokens = Vec::new();
        for item in self.token_stream(source, reporter) {
            tokens.push(item?);
        }
        Ok(tokens)
    }
}

/// One open conditional group.
#[derive(Debug, Clone, Copy)]
struct CondGroup {
    seen_else: bool,
}

/// Lazy iterator over the preprocessed token stream.
pub struct TokenStream<'a> {
    lexer: Lexer<Box<dyn SourceLines + 'a>>,
    /// Push-back buffer in front of the lexer.
    pending: VecDeque<LexToken>,
    table: MacroTable,
    reporter: &'a mut dyn Reporter,
    out: VecDeque<PPToken>,
    cond_depth: Vec<CondGroup>,
    fatal: Option<PPError>,
    finished: bool,
}

impl Iterator for TokenStream<'_> {
    type Item = Result<PPToken, PPError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.out.pop_front() {
                return Some(Ok(token));
            }
            if let Some(err) = self.fatal.take() {
                self.finished = true;
                return Some(Err(err));
            }
            if self.finished {
                return None;
            }
            self.parse_line();
        }
    }
}

impl std::iter::FusedIterator for TokenStream<'_> {}

/// Internal control flow: `Err(())` means a fatal error has been recorded
/// and line processing must stop.
type Flow<T> = Result<T, ()>;

impl<'a> TokenStream<'a> {
    // ----- lexical access -------------------------------------------------

    fn next_lex(&mut self) -> Option<LexToken> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(token);
            }
            match self.lexer.next() {
                Some(Ok(token)) => return Some(token),
                Some(Err(failure)) => {
                    let anchor = PPToken {
                        category: TokenCategory::OtherChar,
                        text: "".into(),
                        line: Some(failure.line.clone()),
                        column: failure.column,
                        composed: SmallVec::new(),
                    };
                    self.reporter.pp_err_report(
                        self.table.filename(),
                        &anchor,
                        PPErrorKind::Lex(failure.error),
                        Severity::Error,
                    );
                }
                None => {
                    if let Some(err) = self.lexer.take_io_error() {
                        let anchor = PPToken::synthesized(TokenCategory::OtherChar, "");
                        self.reporter.print(
                            &format!("input error: {err}"),
                            self.table.filename(),
                            &anchor,
                        );
                    }
                    return None;
                }
            }
        }
    }

    fn peek_lex(&mut self) -> Option<&LexToken> {
        if self.pending.is_empty() {
            let token = self.next_lex()?;
            self.pending.push_front(token);
        }
        self.pending.front()
    }

    fn push_back_lex(&mut self, token: LexToken) {
        self.pending.push_front(token);
    }

    /// Next token that is not whitespace or a comment. Newlines are *not*
    /// skipped.
    fn next_significant(&mut self) -> Option<LexToken> {
        loop {
            let token = self.next_lex()?;
            if !token.category.is_whitespace_like() {
                return Some(token);
            }
        }
    }

    // ----- emission -------------------------------------------------------

    /// Emit to the output stream, restoring painted identifiers (they are
    /// only meaningful during rescanning).
    fn emit(&mut self, mut token: PPToken) {
        if token.category == TokenCategory::NonMacroIdentifier {
            token.category = TokenCategory::Identifier;
        }
        self.out.push_back(token);
    }

    fn emit_newline(&mut self, token: &LexToken) {
        self.out.push_back(PPToken::from_lex(token));
    }

    fn set_fatal(&mut self, kind: PPErrorKind, anchor: &PPToken) {
        let (line, column) = anchor.physical_pos();
        self.fatal = Some(PPError {
            kind,
            filename: self.table.filename().to_path_buf(),
            line,
            column,
        });
        self.finished = true;
    }

    fn report(&mut self, token: &PPToken, kind: PPErrorKind, severity: Severity) {
        self.reporter
            .pp_err_report(self.table.filename(), token, kind, severity);
    }

    /// Consume through the end of the current logical line, emitting the
    /// newline token.
    fn skip_to_newline(&mut self) {
        while let Some(token) = self.next_lex() {
            if token.category == TokenCategory::Newline {
                self.emit_newline(&token);
                return;
            }
        }
        self.finished = true;
    }

    // ----- line dispatch --------------------------------------------------

    fn parse_line(&mut self) {
        let Some(first) = self.next_significant() else {
            if !self.cond_depth.is_empty() {
                let anchor = PPToken::synthesized(TokenCategory::OtherChar, "");
                self.report(&anchor, PPErrorKind::MissingEndif, Severity::Error);
                self.cond_depth.clear();
            }
            self.finished = true;
            return;
        };

        if first.category == TokenCategory::Newline {
            self.emit_newline(&first);
            return;
        }

        if first.category == TokenCategory::OpOrPunc && first.text() == "#" {
            self.directive_line();
            return;
        }

        // Module declarations are stubbed out, not processed.
        if first.category == TokenCategory::Identifier
            && matches!(first.text(), "module" | "import" | "export")
        {
            let anchor = PPToken::from_lex(&first);
            self.report(&anchor, PPErrorKind::ModuleUnsupported, Severity::Warning);
        }

        self.push_back_lex(first);
        self.text_line();
    }

    fn text_line(&mut self) {
        let Ok(tokens) = self.read_line_tokens(true) else {
            return;
        };
        for token in tokens {
            if token.category != TokenCategory::Whitespace {
                self.emit(token);
            }
        }
        // `read_line_tokens` leaves the newline for us to emit.
        if let Some(newline) = self.take_pending_newline() {
            self.emit_newline(&newline);
        }
    }

    /// The newline token `read_line_tokens` pushed back, if the line ended
    /// normally (EOF ends lines without one).
    fn take_pending_newline(&mut self) -> Option<LexToken> {
        match self.peek_lex() {
            Some(t) if t.category == TokenCategory::Newline => self.next_lex(),
            _ => None,
        }
    }

    // ----- text-line construction -----------------------------------------

    /// Read the rest of the current logical line as pp-tokens, whitespace
    /// and comments normalized to single-space tokens. With `expand`,
    /// identifiers go through macro replacement (which may consume
    /// following lines). The terminating newline is pushed back for the
    /// caller.
    fn read_line_tokens(&mut self, expand: bool) -> Flow<Vec<PPToken>> {
        let mut sink: Vec<PPToken> = Vec::new();
        loop {
            let Some(token) = self.next_lex() else {
                return Ok(sink);
            };
            match token.category {
                TokenCategory::Newline => {
                    self.push_back_lex(token);
                    return Ok(sink);
                }
                TokenCategory::Whitespace
                | TokenCategory::LineComment
                | TokenCategory::BlockComment => push_space(&mut sink),
                TokenCategory::Empty => {}
                TokenCategory::Identifier if expand => {
                    self.expand_identifier(token, &mut sink)?;
                }
                _ => {
                    for built in self.construct_basic(token)? {
                        sink.push(built);
                    }
                }
            }
        }
    }

    /// Build the pp-token(s) for one non-whitespace lexical token, without
    /// macro expansion: literal classification and UDL gluing, raw-string
    /// reassembly, the `<::` digraph exception.
    fn construct_basic(&mut self, token: LexToken) -> Flow<SmallVec<[PPToken; 2]>> {
        match token.category {
            TokenCategory::StringLiteral
            | TokenCategory::CharLiteral
            | TokenCategory::RawStringLiteral => {
                let mut pp = PPToken::from_lex(&token);
                if token.category == TokenCategory::RawStringLiteral && token.line.is_spliced() {
                    restore_raw_splices(&mut pp, &token);
                }
                self.glue_ud_suffix(&mut pp);
                Ok(smallvec![pp])
            }
            TokenCategory::DuringRawString => {
                let mut pp = self.reassemble_raw_string(token);
                self.glue_ud_suffix(&mut pp);
                Ok(smallvec![pp])
            }
            TokenCategory::OpOrPunc => Ok(self.fix_digraph(token)),
            _ => Ok(smallvec![PPToken::from_lex(&token)]),
        }
    }

    /// After a character or string literal, an immediately following
    /// identifier is a user-defined-literal suffix: glue it on and upgrade
    /// the category.
    fn glue_ud_suffix(&mut self, literal: &mut PPToken) {
        let adjacent = matches!(
            self.peek_lex(),
            Some(t) if t.category == TokenCategory::Identifier
        );
        if !adjacent {
            return;
        }
        let suffix = self.next_lex().expect("just peeked");
        let mut text = literal.text.to_smart_string();
        text.push_str(suffix.text());
        literal.category = literal.category.with_ud_suffix();
        literal.text = text.into();
        literal.composed.push(suffix);
    }

    /// Reassemble a raw-string literal that crosses logical lines,
    /// restoring the `\`+newline splices each chunk lost.
    fn reassemble_raw_string(&mut self, first: LexToken) -> PPToken {
        let mut text = String::new();
        text.push_str(&spliced_chunk_text(&first));
        let mut composed: SmallVec<[LexToken; 4]> = smallvec![first.clone()];

        loop {
            let Some(token) = self.next_lex() else {
                // Already reported by the lexer as a failed raw-string read.
                break;
            };
            match token.category {
                TokenCategory::Newline => {}
                TokenCategory::DuringRawString => {
                    text.push('\n');
                    text.push_str(&spliced_chunk_text(&token));
                    composed.push(token);
                }
                TokenCategory::RawStringLiteral => {
                    text.push('\n');
                    text.push_str(&spliced_chunk_text(&token));
                    composed.push(token);
                    break;
                }
                _ => {
                    self.push_back_lex(token);
                    break;
                }
            }
        }

        PPToken {
            category: TokenCategory::RawStringLiteral,
            text: text.into(),
            line: Some(first.line.clone()),
            column: first.offset,
            composed,
        }
    }

    /// The one exception to longest-match tokenization: `<:` followed by a
    /// lone `:` re-reads as `<` `::` (unless the line ends right there).
    fn fix_digraph(&mut self, token: LexToken) -> SmallVec<[PPToken; 2]> {
        let pp = PPToken::from_lex(&token);
        if pp.text() != "<:" {
            return smallvec![pp];
        }
        let next_is_colon = matches!(
            self.peek_lex(),
            Some(t) if t.category == TokenCategory::OpOrPunc && t.text() == ":"
        );
        if !next_is_colon {
            return smallvec![pp];
        }
        let colon = self.next_lex().expect("just peeked");
        let colon_pp = PPToken::from_lex(&colon);
        if matches!(self.peek_lex(), Some(t) if t.category == TokenCategory::Newline) {
            return smallvec![pp, colon_pp];
        }

        let mut lt = pp;
        lt.text = "<".into();
        let mut colons = colon_pp;
        colons.text = "::".into();
        smallvec![lt, colons]
    }

    // ----- macro expansion ------------------------------------------------

    fn expand_identifier(&mut self, token: LexToken, sink: &mut Vec<PPToken>) -> Flow<()> {
        let name_pp = PPToken::from_lex(&token);
        match self.table.is_macro(name_pp.text()) {
            None => {
                sink.push(name_pp);
                Ok(())
            }
            Some(false) => {
                let mut blue = BlueSet::new();
                let expanded =
                    self.table
                        .expand_object(&mut *self.reporter, &name_pp, &mut blue);
                match expanded {
                    Ok((complete, tokens)) => {
                        let tokens = if complete {
                            tokens
                        } else {
                            self.continue_expansion(tokens, &mut blue)?
                        };
                        sink.extend(tokens);
                        Ok(())
                    }
                    Err(kind) => {
                        self.set_fatal(kind, &name_pp);
                        Err(())
                    }
                }
            }
            Some(true) => self.expand_function_call(name_pp, sink),
        }
    }

    /// A function-like macro name: scan across whitespace, comments and
    /// newlines for `(`. Without one the name is just an identifier.
    fn expand_function_call(&mut self, name_pp: PPToken, sink: &mut Vec<PPToken>) -> Flow<()> {
        let mut skipped: Vec<LexToken> = Vec::new();
        loop {
            match self.next_lex() {
                None => {
                    sink.push(name_pp);
                    for token in skipped.into_iter().rev() {
                        self.push_back_lex(token);
                    }
                    return Ok(());
                }
                Some(t)
                    if t.category.is_whitespace_like()
                        || t.category == TokenCategory::Newline =>
                {
                    skipped.push(t);
                }
                Some(t) if t.category == TokenCategory::OpOrPunc && t.text() == "(" => {
                    break;
                }
                Some(t) => {
                    sink.push(name_pp);
                    self.push_back_lex(t);
                    for token in skipped.into_iter().rev() {
                        self.push_back_lex(token);
                    }
                    return Ok(());
                }
            }
        }

        let args = self.collect_call_args(&name_pp, &mut VecDeque::new())?;
        let mut blue = BlueSet::new();
        self.finish_function_expansion(name_pp, &args, &mut blue, sink)
    }

    fn finish_function_expansion(
        &mut self,
        name_pp: PPToken,
        args: &[Vec<PPToken>],
        blue: &mut BlueSet,
        sink: &mut Vec<PPToken>,
    ) -> Flow<()> {
        let expanded =
            self.table
                .expand_function(&mut *self.reporter, &name_pp, args, blue);
        match expanded {
            Ok((complete, tokens)) => {
                let tokens = if complete {
                    tokens
                } else {
                    self.continue_expansion(tokens, blue)?
                };
                sink.extend(tokens);
                Ok(())
            }
            Err(kind) => {
                self.set_fatal(kind, &name_pp);
                Err(())
            }
        }
    }

    /// Rescanning found a function-like macro call that runs past the end
    /// of the expanded list: finish it by reading on into the upstream
    /// token source, then keep expanding.
    fn continue_expansion(
        &mut self,
        mut tokens: Vec<PPToken>,
        blue: &mut BlueSet,
    ) -> Flow<Vec<PPToken>> {
        let pending = tokens.iter().position(|t| {
            t.category == TokenCategory::Identifier
                && self.table.is_macro(t.text()) == Some(true)
                && !blue.contains(t.text())
        });
        let Some(pos) = pending else {
            return Ok(tokens);
        };

        let mut done: Vec<PPToken> = tokens.drain(..pos).collect();
        let name_pp = tokens.remove(0);
        let mut leftover: VecDeque<PPToken> = tokens.into_iter().collect();

        // Find `(`: first in the leftover expansion tail, then upstream.
        loop {
            match leftover.front() {
                Some(t) if t.category == TokenCategory::Whitespace => {
                    leftover.pop_front();
                }
                Some(t) if t.category == TokenCategory::OpOrPunc && t.text() == "(" => {
                    leftover.pop_front();
                    break;
                }
                Some(_) => {
                    // Not an invocation after all.
                    done.push(name_pp);
                    done.extend(leftover);
                    return Ok(done);
                }
                None => {
                    let mut skipped: Vec<LexToken> = Vec::new();
                    let found = loop {
                        match self.next_lex() {
                            None => break false,
                            Some(t)
                                if t.category.is_whitespace_like()
                                    || t.category == TokenCategory::Newline =>
                            {
                                skipped.push(t);
                            }
                            Some(t)
                                if t.category == TokenCategory::OpOrPunc
                                    && t.text() == "(" =>
                            {
                                break true;
                            }
                            Some(t) => {
                                self.push_back_lex(t);
                                break false;
                            }
                        }
                    };
                    if found {
                        break;
                    }
                    for token in skipped.into_iter().rev() {
                        self.push_back_lex(token);
                    }
                    done.push(name_pp);
                    return Ok(done);
                }
            }
        }

        let args = self.collect_call_args(&name_pp, &mut leftover)?;
        self.finish_function_expansion(name_pp, &args, blue, &mut done)?;
        Ok(done)
    }

    /// Collect the comma-separated arguments of a call whose `(` has been
    /// consumed. Tokens come from `leftover` (an already-expanded tail)
    /// first, then from the lexical stream; newlines and whitespace runs
    /// normalize to single spaces. Ends at the balancing `)`; end of input
    /// before that is fatal.
    fn collect_call_args(
        &mut self,
        name_pp: &PPToken,
        leftover: &mut VecDeque<PPToken>,
    ) -> Flow<Vec<Vec<PPToken>>> {
        let mut depth = 0usize;
        let mut flat: Vec<PPToken> = Vec::new();

        'collect: loop {
            let batch: SmallVec<[PPToken; 2]> = if let Some(token) = leftover.pop_front() {
                smallvec![token]
            } else {
                let Some(lex) = self.next_lex() else {
                    self.set_fatal(PPErrorKind::UnterminatedMacroCall, name_pp);
                    return Err(());
                };
                match lex.category {
                    TokenCategory::Newline
                    | TokenCategory::Whitespace
                    | TokenCategory::LineComment
                    | TokenCategory::BlockComment => {
                        push_space(&mut flat);
                        continue;
                    }
                    TokenCategory::Empty => continue,
                    _ => self.construct_basic(lex)?,
                }
            };

            for token in batch {
                match token.category {
                    TokenCategory::Whitespace => {
                        push_space(&mut flat);
                        continue;
                    }
                    TokenCategory::OpOrPunc => match token.text() {
                        "(" => depth += 1,
                        ")" => {
                            if depth == 0 {
                                break 'collect;
                            }
                            depth -= 1;
                        }
                        _ => {}
                    },
                    _ => {}
                }
                flat.push(token);
            }
        }

        Ok(split_args(&flat))
    }

    // ----- directives -----------------------------------------------------

    fn directive_line(&mut self) {
        let Some(name) = self.next_significant() else {
            self.finished = true;
            return;
        };
        if name.category == TokenCategory::Newline {
            // Null directive.
            self.emit_newline(&name);
            return;
        }
        if name.category != TokenCategory::Identifier {
            let anchor = PPToken::from_lex(&name);
            self.report(&anchor, PPErrorKind::EmptyDirective, Severity::Error);
            self.skip_to_newline();
            return;
        }

        match name.text() {
            "define" => self.directive_define(),
            "undef" => self.directive_undef(),
            "line" => self.directive_line_control(&name),
            "error" => self.directive_error(&name),
            "pragma" => self.skip_to_newline(),
            "include" => {
                let anchor = PPToken::from_lex(&name);
                self.report(&anchor, PPErrorKind::IncludeUnsupported, Severity::Warning);
                self.skip_to_newline();
            }
            "if" | "ifdef" | "ifndef" => self.directive_if_group(&name),
            "elif" => self.directive_elif(&name),
            "else" => self.directive_else(&name),
            "endif" => self.directive_endif(&name),
            "import" | "export" => {
                let anchor = PPToken::from_lex(&name);
                self.report(&anchor, PPErrorKind::ModuleUnsupported, Severity::Warning);
                self.skip_to_newline();
            }
            other => {
                let anchor = PPToken::from_lex(&name);
                self.report(
                    &anchor,
                    PPErrorKind::UnknownDirective(other.to_owned()),
                    Severity::Error,
                );
                self.skip_to_newline();
            }
        }
    }

    fn directive_define(&mut self) {
        let Some(name) = self.next_significant() else {
            self.finished = true;
            return;
        };
        if name.category != TokenCategory::Identifier {
            let anchor = PPToken::from_lex(&name);
            self.report(&anchor, PPErrorKind::DefineMissingName, Severity::Error);
            if name.category == TokenCategory::Newline {
                self.emit_newline(&name);
            } else {
                self.skip_to_newline();
            }
            return;
        }
        let name_pp = PPToken::from_lex(&name);

        // `(` with no whitespace in between makes it function-like.
        let function_like = matches!(
            self.peek_lex(),
            Some(t) if t.category == TokenCategory::OpOrPunc && t.text() == "("
        );

        let built = if function_like {
            self.next_lex();
            let Some((params, variadic)) = self.define_param_list() else {
                self.skip_to_newline();
                return;
            };
            let Ok(replacement) = self.read_line_tokens(false) else {
                return;
            };
            MacroDef::function(name_pp.text(), params, variadic, trim_whitespace(replacement))
        } else {
            let Ok(replacement) = self.read_line_tokens(false) else {
                return;
            };
            MacroDef::object(name_pp.text(), trim_whitespace(replacement))
        };

        match built {
            Ok(def) => {
                self.table
                    .define(&mut *self.reporter, &name_pp, def);
            }
            Err((kind, offender)) => {
                let anchor = if offender.line.is_some() {
                    offender
                } else {
                    name_pp
                };
                self.report(&anchor, kind, Severity::Error);
            }
        }
        if let Some(newline) = self.take_pending_newline() {
            self.emit_newline(&newline);
        }
    }

    /// Parse `ident, ident, ...` up to the closing `)`. `None` after a
    /// reported error.
    fn define_param_list(&mut self) -> Option<(Vec<SmartString>, bool)> {
        let mut params: Vec<SmartString> = Vec::new();
        loop {
            let token = self.param_list_token()?;
            match token.category {
                TokenCategory::Identifier => {
                    params.push(token.text().into());
                    let sep = self.param_list_token()?;
                    match (sep.category, sep.text()) {
                        (TokenCategory::OpOrPunc, ",") => continue,
                        (TokenCategory::OpOrPunc, ")") => return Some((params, false)),
                        _ => {
                            let anchor = PPToken::from_lex(&sep);
                            self.report(
                                &anchor,
                                PPErrorKind::DefineInvalidParams,
                                Severity::Error,
                            );
                            return None;
                        }
                    }
                }
                TokenCategory::OpOrPunc if token.text() == "..." => {
                    params.push("...".into());
                    let close = self.param_list_token()?;
                    if close.category == TokenCategory::OpOrPunc && close.text() == ")" {
                        return Some((params, true));
                    }
                    let anchor = PPToken::from_lex(&close);
                    self.report(&anchor, PPErrorKind::DefineInvalidParams, Severity::Error);
                    return None;
                }
                TokenCategory::OpOrPunc if token.text() == ")" && params.is_empty() => {
                    return Some((params, false));
                }
                _ => {
                    let anchor = PPToken::from_lex(&token);
                    self.report(&anchor, PPErrorKind::DefineInvalidParams, Severity::Error);
                    return None;
                }
            }
        }
    }

    fn param_list_token(&mut self) -> Option<LexToken> {
        let token = self.next_significant()?;
        if token.category == TokenCategory::Newline {
            let anchor = PPToken::from_lex(&token);
            self.report(&anchor, PPErrorKind::DefineInvalidParams, Severity::Error);
            self.push_back_lex(token);
            return None;
        }
        Some(token)
    }

    fn directive_undef(&mut self) {
        let Some(name) = self.next_significant() else {
            self.finished = true;
            return;
        };
        if name.category != TokenCategory::Identifier {
            let anchor = PPToken::from_lex(&name);
            self.report(
                &anchor,
                PPErrorKind::UnexpectedTokenAfterDirective,
                Severity::Error,
            );
            if name.category == TokenCategory::Newline {
                self.emit_newline(&name);
            } else {
                self.skip_to_newline();
            }
            return;
        }
        self.table.undef(name.text());
        self.expect_line_end();
    }

    /// `#line digit-seq ["filename"]`, with the operand list macro-expanded
    /// first.
    fn directive_line_control(&mut self, name: &LexToken) {
        let Ok(tokens) = self.read_line_tokens(true) else {
            return;
        };
        let directive_line = name.line.number;
        let mut it = tokens
            .iter()
            .filter(|t| t.category != TokenCategory::Whitespace);

        match it.next() {
            Some(t) if t.category == TokenCategory::PPNumber => {
                let Ok(value) = t.text().parse::<u64>() else {
                    let t = t.clone();
                    self.report(&t, PPErrorKind::LineDirectiveBadNumber, Severity::Error);
                    self.finish_directive_line();
                    return;
                };
                let mut filename = None;
                let mut next = it.next();
                if let Some(t) = next {
                    if t.category.is_string_literal() {
                        let raw = matches!(
                            t.category,
                            TokenCategory::RawStringLiteral | TokenCategory::UdRawStringLiteral
                        );
                        filename = string_literal_contents(t.text(), raw).map(str::to_owned);
                        next = it.next();
                    }
                }
                if let Some(extra) = next {
                    let extra = extra.clone();
                    self.report(
                        &extra,
                        PPErrorKind::LineDirectiveExtraTokens,
                        Severity::Warning,
                    );
                }
                self.table.set_line_override(directive_line, value, filename);
            }
            Some(t) => {
                let t = t.clone();
                self.report(&t, PPErrorKind::LineDirectiveBadNumber, Severity::Error);
            }
            None => {
                let anchor = PPToken::from_lex(name);
                self.report(&anchor, PPErrorKind::LineDirectiveBadNumber, Severity::Error);
            }
        }
        self.finish_directive_line();
    }

    fn finish_directive_line(&mut self) {
        if let Some(newline) = self.take_pending_newline() {
            self.emit_newline(&newline);
        }
    }

    /// `#error`: the message is the rest of the line's source text, and the
    /// stream ends fatally.
    fn directive_error(&mut self, name: &LexToken) {
        let line: &Shared<LogicalLine> = &name.line;
        let after = (name.offset + name.len) as usize;
        let message = line.text[after..].trim_start().to_owned();

        let anchor = PPToken::from_lex(name);
        self.reporter
            .print(&message, self.table.filename(), &anchor);
        self.set_fatal(PPErrorKind::ErrorDirective(message), &anchor);
    }

    // ----- conditional shell ----------------------------------------------

    fn directive_if_group(&mut self, name: &LexToken) {
        let kind = name.text().to_owned();
        self.cond_depth.push(CondGroup { seen_else: false });

        if kind == "if" {
            let Ok(tokens) = self.read_line_tokens(true) else {
                return;
            };
            self.check_condition_shell(&tokens);
            self.finish_directive_line();
            return;
        }

        // #ifdef / #ifndef need exactly one identifier.
        let Some(operand) = self.next_significant() else {
            self.finished = true;
            return;
        };
        if operand.category != TokenCategory::Identifier {
            let anchor = PPToken::from_lex(&operand);
            self.report(
                &anchor,
                PPErrorKind::UnexpectedTokenAfterDirective,
                Severity::Error,
            );
            if operand.category == TokenCategory::Newline {
                self.emit_newline(&operand);
            } else {
                self.skip_to_newline();
            }
            return;
        }
        // The macro table answers the condition; the shell does not act on
        // it yet.
        let _ = self.table.is_macro(operand.text());
        self.expect_line_end();
    }

    fn directive_elif(&mut self, name: &LexToken) {
        let anchor = PPToken::from_lex(name);
        match self.cond_depth.last() {
            None => self.report(&anchor, PPErrorKind::ElifWithoutIf, Severity::Error),
            Some(group) if group.seen_else => {
                self.report(&anchor, PPErrorKind::GroupAfterElse, Severity::Error);
            }
            Some(_) => {}
        }
        let Ok(tokens) = self.read_line_tokens(true) else {
            return;
        };
        self.check_condition_shell(&tokens);
        self.finish_directive_line();
    }

    fn directive_else(&mut self, name: &LexToken) {
        let anchor = PPToken::from_lex(name);
        match self.cond_depth.last_mut() {
            None => self.report(&anchor, PPErrorKind::ElseWithoutIf, Severity::Error),
            Some(group) if group.seen_else => {
                self.report(&anchor, PPErrorKind::GroupAfterElse, Severity::Error);
            }
            Some(group) => group.seen_else = true,
        }
        self.expect_line_end();
    }

    fn directive_endif(&mut self, name: &LexToken) {
        if self.cond_depth.pop().is_none() {
            let anchor = PPToken::from_lex(name);
            self.report(&anchor, PPErrorKind::EndifWithoutIf, Severity::Error);
        }
        self.expect_line_end();
    }

    /// Run `#if`/`#elif` operands through the constant-expression shell for
    /// its diagnostics; the result does not select groups yet.
    fn check_condition_shell(&mut self, tokens: &[PPToken]) {
        let mut eval = ConstExprEval {
            reporter: &mut *self.reporter,
            filename: self.table.filename(),
        };
        let _ = eval.evaluate(tokens);
    }

    /// Everything after a fully-parsed directive up to the newline is a
    /// complaint (warning), then the newline is emitted.
    fn expect_line_end(&mut self) {
        let Some(token) = self.next_significant() else {
            self.finished = true;
            return;
        };
        if token.category == TokenCategory::Newline {
            self.emit_newline(&token);
            return;
        }
        let anchor = PPToken::from_lex(&token);
        self.report(
            &anchor,
            PPErrorKind::UnexpectedTokenAfterDirective,
            Severity::Warning,
        );
        self.skip_to_newline();
    }
}

/// Append a single-space token unless one is already last.
fn push_space(sink: &mut Vec<PPToken>) {
    if sink
        .last()
        .is_some_and(|t| t.category == TokenCategory::Whitespace)
    {
        return;
    }
    sink.push(PPToken::synthesized(TokenCategory::Whitespace, " "));
}

/// A raw-string chunk's text with the line's continuation splices restored
/// as `\`+newline.
fn spliced_chunk_text(token: &LexToken) -> String {
    let line = &token.line;
    let start = token.offset as usize;
    let end = (token.offset + token.len) as usize;
    if line.splices.is_empty() {
        return line.text[start..end].to_owned();
    }
    let mut out = String::with_capacity(end - start + 2 * line.splices.len());
    let mut prev = start;
    for &off in &line.splices {
        let off = off as usize;
        if off < start || off > end {
            continue;
        }
        out.push_str(&line.text[prev..off]);
        out.push_str("\\\n");
        prev = off;
    }
    out.push_str(&line.text[prev..end]);
    out
}

/// Restore splices into a single-line raw-string token's text.
fn restore_raw_splices(pp: &mut PPToken, token: &LexToken) {
    let restored = spliced_chunk_text(token);
    if restored != pp.text() {
        pp.text = restored.into();
    }
}
