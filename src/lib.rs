//! # Sedge — a C++20 preprocessing core
//!
//! Sedge turns a UTF-8 source file into a stream of preprocessing tokens
//! with macros fully expanded: translation phases 1–4 (logical-line
//! splicing, tokenization, directive execution and macro replacement) as a
//! chain of lazy producers.
//!
//! ```no_run
//! use sedge::{CollectingReporter, Preprocessor, SourceReader};
//!
//! let pp = Preprocessor::new("example.cpp");
//! let mut reporter = CollectingReporter::new();
//! let source = SourceReader::open("example.cpp")?;
//! for item in pp.token_stream(source, &mut reporter) {
//!     let token = item?;
//!     print!("{token}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Out of scope by design: `#include` resolution (see
//! [`IncludeResolver`]), full `#if` expression evaluation (only the
//! integer-literal shell exists), `#pragma` semantics, and everything after
//! phase 4.

mod automaton;
mod condexpr;
mod error;
mod lexer;
mod macros;
mod ops;
mod parse;
mod source;
mod table;
mod text;
mod token;

pub use condexpr::{decode_integer, ConstExprEval, ConstValue};
pub use error::{
    CollectingReporter, Diagnostic, LexError, PPError, PPErrorKind, Reporter, Severity,
    TracingReporter,
};
pub use lexer::{LexFailure, Lexer};
pub use macros::{InvokeError, MacroDef};
pub use parse::{IncludeResolver, Preprocessor, TokenStream};
pub use source::{LogicalLine, LogicalLines, PhysicalLine, SourceLines, SourceReader};
pub use table::{BlueSet, MacroTable};
pub use text::TokenText;
pub use token::{LexToken, PPToken, TokenCategory};

/// Shared ownership of logical lines. Lines live for the whole translation
/// unit; tokens hold handles, never borrows.
pub type Shared<T> = std::rc::Rc<T>;

/// Token text storage. Most spellings are short enough to live inline.
pub type SmartString = smartstring::SmartString<smartstring::Compact>;

/// Small inline vector for per-token lists (composed lexical tokens,
/// splice offsets): almost always ≤ 4 entries.
pub type StaticVec<T> = smallvec::SmallVec<[T; 4]>;
