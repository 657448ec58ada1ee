#![forbid(unsafe_code)]

//! Byte-offset text edits over an XML document.
//!
//! roxmltree is a read-only DOM, so mutations are expressed as text splices
//! against the original document bytes.  Every node carries its byte range
//! (`roxmltree::Node::range`), which lets callers queue precise insertions
//! and replacements and apply them in one pass.  The source text is never
//! modified; `apply` produces a new string, which gives the signing pipeline
//! its build-then-commit behavior for free.

use std::ops::Range;
use vaxholm_core::{Error, Result};

#[derive(Debug)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

/// An ordered collection of non-overlapping text edits.
#[derive(Debug, Default)]
pub struct TextEdit {
    edits: Vec<Edit>,
}

impl TextEdit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an insertion at the given byte offset.
    pub fn insert(&mut self, at: usize, text: impl Into<String>) {
        self.edits.push(Edit {
            start: at,
            end: at,
            text: text.into(),
        });
    }

    /// Queue a replacement of the given byte range.
    pub fn replace(&mut self, range: Range<usize>, text: impl Into<String>) {
        self.edits.push(Edit {
            start: range.start,
            end: range.end,
            text: text.into(),
        });
    }

    /// Whether any edits have been queued.
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Apply all queued edits to `source`, producing a new string.
    ///
    /// Edits are sorted by offset and spliced in one forward pass, so
    /// offsets always refer to the original text.  Overlapping
    /// replacement ranges and out-of-bounds offsets are rejected;
    /// multiple insertions at the same offset are applied in queue
    /// order.
    pub fn apply(mut self, source: &str) -> Result<String> {
        for e in &self.edits {
            if e.end > source.len() || e.start > e.end {
                return Err(Error::Other(format!(
                    "text edit range {}..{} out of bounds (document is {} bytes)",
                    e.start,
                    e.end,
                    source.len()
                )));
            }
            if !source.is_char_boundary(e.start) || !source.is_char_boundary(e.end) {
                return Err(Error::Other(format!(
                    "text edit range {}..{} not on a character boundary",
                    e.start, e.end
                )));
            }
        }
        // Stable sort keeps queue order for insertions at the same offset.
        self.edits.sort_by_key(|e| (e.start, e.end));
        for pair in self.edits.windows(2) {
            if pair[1].start < pair[0].end {
                return Err(Error::Other(format!(
                    "overlapping text edits at {}..{} and {}..{}",
                    pair[0].start, pair[0].end, pair[1].start, pair[1].end
                )));
            }
        }

        let mut out = String::with_capacity(
            source.len() + self.edits.iter().map(|e| e.text.len()).sum::<usize>(),
        );
        let mut pos = 0;
        for e in &self.edits {
            out.push_str(&source[pos..e.start]);
            out.push_str(&e.text);
            pos = e.end;
        }
        out.push_str(&source[pos..]);
        Ok(out)
    }
}
