//! Inline annotation format used in contract explanations.
//!
//! Explanations carry three kinds of markup:
//! - line references: `<L12>`, `<L5-9>`, `<L3,L5-9>`
//! - bold spans: `**text**`
//! - code tokens: `'identifier'`
//!
//! [`parse`] splits an explanation into ordered [`AnnotationSegment`]s, and the
//! [`highlight`] module turns a line reference into an editor highlight.

mod grammar;
pub mod highlight;
pub mod view;

pub use grammar::{AnnotationSegment, LineRange, SegmentKind, line_refs, parse, reassemble};
pub use highlight::{
    EditorSurface, HIGHLIGHT_CLASS, HighlightCommand, HighlightLinker, LineDecoration,
};
pub use view::{DecorationId, TextView};
