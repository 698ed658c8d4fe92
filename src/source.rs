//! Reading physical source lines and joining them into logical lines.
//!
//! Translation phase 2: a line ending in a single backslash continues on the
//! next physical line. The joined text remembers where each break was removed
//! so tokens can be located back in the original file.

use crate::Shared;
use smallvec::SmallVec;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor};
use std::path::Path;

/// One physical line, terminator stripped.
#[derive(Debug, Clone)]
pub struct PhysicalLine {
    pub text: String,
    /// 1-based line number in the file.
    pub number: u32,
}

/// Minimal input interface the pipeline needs: hand me the next physical
/// line, or `None` at end of input.
pub trait SourceLines {
    fn next_line(&mut self) -> io::Result<Option<PhysicalLine>>;
}

impl<S: SourceLines + ?Sized> SourceLines for Box<S> {
    fn next_line(&mut self) -> io::Result<Option<PhysicalLine>> {
        (**self).next_line()
    }
}

/// [`SourceLines`] over any buffered reader. Strips `\n`/`\r\n` terminators
/// and a single leading UTF-8 BOM.
pub struct SourceReader<R> {
    input: R,
    line_number: u32,
    at_start: bool,
}

impl<R: BufRead> SourceReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            line_number: 0,
            at_start: true,
        }
    }
}

impl SourceReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl SourceReader<Cursor<Vec<u8>>> {
    /// Reader over in-memory source text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(Cursor::new(text.into().into_bytes()))
    }
}

impl<R: BufRead> SourceLines for SourceReader<R> {
    fn next_line(&mut self) -> io::Result<Option<PhysicalLine>> {
        let mut buf = String::new();
        if self.input.read_line(&mut buf)? == 0 {
            return Ok(None);
        }
        if buf.ends_with('\n') {
            buf.pop();
            if buf.ends_with('\r') {
                buf.pop();
            }
        }
        if self.at_start {
            self.at_start = false;
            if let Some(stripped) = buf.strip_prefix('\u{feff}') {
                buf = stripped.to_owned();
            }
        }
        self.line_number += 1;
        Ok(Some(PhysicalLine {
            text: buf,
            number: self.line_number,
        }))
    }
}

/// One logical source line: one or more physical lines joined by
/// backslash-newline splicing.
#[derive(Debug, Clone, Default)]
pub struct LogicalLine {
    /// The joined text, with every `\`+newline removed.
    pub text: String,
    /// 1-based physical line the logical line starts on.
    pub phys_line: u32,
    /// 1-based logical line number.
    pub number: u32,
    /// Byte offsets into `text` where a physical break was removed,
    /// strictly ascending. `splices.len() + 1` physical lines are spanned.
    pub splices: SmallVec<[u32; 2]>,
}

impl LogicalLine {
    /// Map a byte offset in the joined text to `(physical line, 1-based
    /// physical column)` through the splice list.
    #[must_use]
    pub fn physical_pos(&self, byte_col: u32) -> (u32, u32) {
        let mut line = self.phys_line;
        let mut segment_start = 0u32;
        for &off in &self.splices {
            if off <= byte_col {
                line += 1;
                segment_start = off;
            } else {
                break;
            }
        }
        (line, byte_col - segment_start + 1)
    }

    /// Does this logical line span more than one physical line?
    #[must_use]
    pub fn is_spliced(&self) -> bool {
        !self.splices.is_empty()
    }
}

/// Joins physical lines from a [`SourceLines`] producer into
/// [`LogicalLine`]s.
pub struct LogicalLines<S> {
    source: S,
    logical_number: u32,
    /// Set once the producer reports an I/O error; the sequence ends.
    pub io_error: Option<io::Error>,
}

impl<S: SourceLines> LogicalLines<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            logical_number: 0,
            io_error: None,
        }
    }

    fn read_physical(&mut self) -> Option<PhysicalLine> {
        match self.source.next_line() {
            Ok(line) => line,
            Err(err) => {
                self.io_error = Some(err);
                None
            }
        }
    }

    /// Read the next logical line, or `None` at end of input (or after an
    /// I/O error, which is left in `io_error`).
    pub fn next_logical(&mut self) -> Option<Shared<LogicalLine>> {
        let first = self.read_physical()?;
        self.logical_number += 1;

        let mut line = LogicalLine {
            text: first.text,
            phys_line: first.number,
            number: self.logical_number,
            splices: SmallVec::new(),
        };

        // A trailing `\` splices; `\\` does not (the first backslash escapes
        // the second only in the phase-2 sense of "not a continuation").
        while ends_with_continuation(&line.text) {
            line.text.pop();
            line.splices.push(line.text.len() as u32);
            match self.read_physical() {
                Some(next) => line.text.push_str(&next.text),
                None => break,
            }
        }

        Some(Shared::new(line))
    }
}

fn ends_with_continuation(text: &str) -> bool {
    let bytes = text.as_bytes();
    match bytes {
        [.., b'\\', b'\\'] => false,
        [.., b'\\'] => true,
        _ => false,
    }
}
