//! The sometimes-owning token string.
//!
//! Most token text is a view into its logical line and costs nothing to
//! carry around. Text becomes owned only once something has actually changed
//! it: `##` concatenation, stringization, user-defined-literal gluing,
//! raw-string reassembly, or predefined-macro materialization.

use crate::source::LogicalLine;
use crate::{Shared, SmartString};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// Token text: a zero-copy slice of a [`LogicalLine`], or an owned buffer.
#[derive(Clone)]
pub enum TokenText {
    Slice {
        line: Shared<LogicalLine>,
        start: u32,
        len: u32,
    },
    Owned(SmartString),
}

impl TokenText {
    /// A view into `line` covering `start..start + len` bytes.
    #[must_use]
    pub fn slice(line: Shared<LogicalLine>, start: u32, len: u32) -> Self {
        debug_assert!((start + len) as usize <= line.text.len());
        Self::Slice { line, start, len }
    }

    #[must_use]
    pub fn owned(text: impl Into<SmartString>) -> Self {
        Self::Owned(text.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Slice { line, start, len } => {
                &line.text[*start as usize..(*start + *len) as usize]
            }
            Self::Owned(s) => s,
        }
    }

    /// Whether the text owns its bytes (true after any mutation).
    #[must_use]
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.as_str().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out an owned string regardless of variant.
    #[must_use]
    pub fn to_smart_string(&self) -> SmartString {
        self.as_str().into()
    }
}

impl Default for TokenText {
    fn default() -> Self {
        Self::Owned(SmartString::new())
    }
}

impl Deref for TokenText {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for TokenText {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for TokenText {
    fn from(s: &str) -> Self {
        Self::Owned(s.into())
    }
}

impl From<SmartString> for TokenText {
    fn from(s: SmartString) -> Self {
        Self::Owned(s)
    }
}

impl From<String> for TokenText {
    fn from(s: String) -> Self {
        Self::Owned(s.into())
    }
}

impl PartialEq for TokenText {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for TokenText {}

impl PartialEq<str> for TokenText {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for TokenText {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl Hash for TokenText {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl fmt::Display for TokenText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for TokenText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}
