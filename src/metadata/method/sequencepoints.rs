//! Source locations attached to instructions.
//!
//! # Reference
//! * Portable PDB v1.0 Format Specification - Sequence Points Blob

use std::sync::Arc;

/// Line number marking a hidden sequence point
pub const HIDDEN_LINE: u32 = 0x00FE_EFEE;

/// A source range an instruction was compiled from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequencePoint {
    /// Source document, if known
    pub document: Option<Arc<str>>,
    /// Start line (1-based)
    pub start_line: u32,
    /// Start column (1-based)
    pub start_col: u16,
    /// End line (1-based)
    pub end_line: u32,
    /// End column (1-based)
    pub end_col: u16,
}

impl SequencePoint {
    /// A sequence point spanning the given range.
    #[must_use]
    pub fn new(start_line: u32, start_col: u16, end_line: u32, end_col: u16) -> Self {
        SequencePoint {
            document: None,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// A hidden sequence point, hiding the following code from debuggers.
    #[must_use]
    pub fn hidden() -> Self {
        SequencePoint::new(HIDDEN_LINE, 0, HIDDEN_LINE, 0)
    }

    /// Returns `true` for hidden sequence points.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.start_line == HIDDEN_LINE
    }

    /// Attach the source document.
    #[must_use]
    pub fn with_document(mut self, document: impl Into<Arc<str>>) -> Self {
        self.document = Some(document.into());
        self
    }
}
