//! Error kinds and the injected diagnostic reporter.

use crate::token::PPToken;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error encountered while splitting a logical line into lexical tokens.
///
/// A lex error abandons the rest of the current logical line; the stream
/// resumes at the next one.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Error)]
#[non_exhaustive]
pub enum LexError {
    /// A `)`, `\` or whitespace character appeared in a raw-string delimiter.
    #[error("invalid character in raw string literal delimiter")]
    RawDelimiterInvalid,
    /// A raw-string delimiter ran past the 16-character limit.
    #[error("raw string literal delimiter exceeds 16 characters")]
    RawDelimiterTooLong,
    /// A newline arrived inside a `"…"` or `'…'` literal.
    #[error("unexpected newline in string or character literal")]
    UnexpectedNewline,
    /// The raw-string sub-automaton ended in a state it never should reach.
    #[error("failed to read raw string literal")]
    FailedRawStringRead,
}

/// Everything the preprocessor proper can complain about.
///
/// Grouped the way the pipeline produces them: directive shell, `#define`,
/// macro invocation, `#error`, and the `#if` constant-expression shell.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum PPErrorKind {
    #[error(transparent)]
    Lex(#[from] LexError),

    // --- directive shell ---
    #[error("expected a directive name after '#'")]
    EmptyDirective,
    #[error("unknown preprocessing directive '{0}'")]
    UnknownDirective(String),
    #[error("unexpected token after directive")]
    UnexpectedTokenAfterDirective,
    #[error("#line operand is not a valid unsigned integer")]
    LineDirectiveBadNumber,
    #[error("extra tokens after #line directive")]
    LineDirectiveExtraTokens,
    #[error("#elif without matching #if")]
    ElifWithoutIf,
    #[error("#else without matching #if")]
    ElseWithoutIf,
    #[error("#endif without matching #if")]
    EndifWithoutIf,
    #[error("#elif or #else after #else")]
    GroupAfterElse,
    #[error("missing #endif at end of file")]
    MissingEndif,
    #[error("#include is not resolved by this core")]
    IncludeUnsupported,
    #[error("module declarations are not processed by this core")]
    ModuleUnsupported,

    // --- #define ---
    #[error("missing macro name after #define")]
    DefineMissingName,
    #[error("macro '{0}' redefined with a different body")]
    Redefinition(String),
    #[error("malformed macro parameter list")]
    DefineInvalidParams,
    #[error("'#' is not followed by a macro parameter")]
    StringizeNonParameter,
    #[error("'##' cannot appear at either end of a replacement list")]
    ConcatAtListEnds,
    #[error("__VA_ARGS__ outside a variadic macro")]
    VaArgsOutsideVariadic,
    #[error("__VA_OPT__ outside a variadic macro")]
    VaOptOutsideVariadic,
    #[error("__VA_OPT__ cannot nest")]
    VaOptNested,
    #[error("__VA_OPT__ must be immediately followed by '('")]
    VaOptMissingParen,

    // --- macro invocation ---
    #[error("wrong number of arguments for macro '{0}'")]
    ArgCountMismatch(String),
    #[error("unterminated macro argument list")]
    UnterminatedMacroCall,
    #[error("'##' produced an invalid preprocessing token '{0}'")]
    InvalidTokenConcat(String),

    // --- #error ---
    #[error("#error: {0}")]
    ErrorDirective(String),

    // --- constant-expression shell ---
    #[error("missing ')' in constant expression")]
    MissingCloseParen,
    #[error("unexpected token in constant expression")]
    UnexpectedExprToken,
    #[error("floating-point literal where an integer is required")]
    FloatInConstexpr,
    #[error("integer literal out of range")]
    IntegerOutOfRange,
    #[error("invalid integer literal in constant expression")]
    InvalidIntegerLiteral,
    #[error("user-defined literal in constant expression")]
    UdlInConstexpr,
}

/// How serious a reported condition is.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// A fatal condition that terminates the token stream.
#[derive(Debug, Clone, Error)]
#[error("{}:{}:{}: {}", .filename.display(), .line, .column, .kind)]
pub struct PPError {
    pub kind: PPErrorKind,
    pub filename: PathBuf,
    /// Physical line (1-based).
    pub line: u32,
    /// Physical column (1-based).
    pub column: u32,
}

/// Sink for everything the core wants to tell the outside world.
///
/// The core never writes to the standard streams itself; a reporter is
/// injected at pipeline construction.
pub trait Reporter {
    /// Report a preprocessing problem anchored at `token`.
    fn pp_err_report(
        &mut self,
        filename: &Path,
        token: &PPToken,
        kind: PPErrorKind,
        severity: Severity,
    );

    /// Print a free-form message anchored at `token` (used by `#error`).
    fn print(&mut self, message: &str, filename: &Path, token: &PPToken);
}

/// One recorded diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: PPErrorKind,
    pub severity: Severity,
    pub filename: PathBuf,
    /// Physical position, when the anchoring token has one.
    pub line: u32,
    pub column: u32,
    pub rendered: String,
}

/// A [`Reporter`] that keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    pub diagnostics: Vec<Diagnostic>,
}

impl CollectingReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of error-severity diagnostics recorded so far.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.error_count() != 0
    }
}

impl Reporter for CollectingReporter {
    fn pp_err_report(
        &mut self,
        filename: &Path,
        token: &PPToken,
        kind: PPErrorKind,
        severity: Severity,
    ) {
        let (line, column) = token.physical_pos();
        let rendered = format!(
            "{}:{}:{}: {}: {}",
            filename.display(),
            line,
            column,
            severity,
            kind
        );
        self.diagnostics.push(Diagnostic {
            kind,
            severity,
            filename: filename.to_path_buf(),
            line,
            column,
            rendered,
        });
    }

    fn print(&mut self, message: &str, filename: &Path, token: &PPToken) {
        let (line, column) = token.physical_pos();
        self.diagnostics.push(Diagnostic {
            kind: PPErrorKind::ErrorDirective(message.to_owned()),
            severity: Severity::Error,
            filename: filename.to_path_buf(),
            line,
            column,
            rendered: format!("{}:{}:{}: {}", filename.display(), line, column, message),
        });
    }
}

/// A [`Reporter`] that forwards diagnostics to the `tracing` subscriber.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn pp_err_report(
        &mut self,
        filename: &Path,
        token: &PPToken,
        kind: PPErrorKind,
        severity: Severity,
    ) {
        let (line, column) = token.physical_pos();
        match severity {
            Severity::Error => {
                tracing::error!(file = %filename.display(), line, column, "{kind}");
            }
            Severity::Warning => {
                tracing::warn!(file = %filename.display(), line, column, "{kind}");
            }
        }
    }

    fn print(&mut self, message: &str, filename: &Path, token: &PPToken) {
        let (line, column) = token.physical_pos();
        tracing::error!(file = %filename.display(), line, column, "{message}");
    }
}
