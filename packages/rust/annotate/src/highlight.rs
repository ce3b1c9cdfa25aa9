//! Line-reference highlighting.
//!
//! [`HighlightLinker`] owns the decoration handles handed out by an
//! [`EditorSurface`] and keeps at most one highlighted range active.

use tracing::debug;

use crate::grammar::{LineRange, SegmentKind};

/// CSS-style class attached to highlight decorations.
pub const HIGHLIGHT_CLASS: &str = "line-highlight";

// ---------------------------------------------------------------------------
// Editor boundary
// ---------------------------------------------------------------------------

/// A whole-line decoration over an inclusive 1-based line range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDecoration {
    pub start_line: u32,
    pub end_line: u32,
    pub whole_line: bool,
    pub class: &'static str,
}

impl LineDecoration {
    /// A whole-line highlight over `[start_line, end_line]`.
    pub fn highlight(start_line: u32, end_line: u32) -> Self {
        Self {
            start_line,
            end_line,
            whole_line: true,
            class: HIGHLIGHT_CLASS,
        }
    }
}

/// Something that can display decorated source lines.
pub trait EditorSurface {
    /// Opaque token identifying one applied decoration.
    type Handle;

    /// Remove the decorations behind `old` and apply `new`.
    ///
    /// `old` is consumed; the returned handles are the only valid ones
    /// afterwards.
    fn replace_decorations(
        &mut self,
        old: Vec<Self::Handle>,
        new: &[LineDecoration],
    ) -> Vec<Self::Handle>;

    /// Scroll so that `line` sits in the middle of the view.
    fn reveal_line_in_center(&mut self, line: u32);
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// What a click on an annotation segment asks the linker to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightCommand {
    Activate(LineRange),
    Clear,
}

impl HighlightCommand {
    /// `Activate` for a line reference, `None` for every other segment.
    pub fn for_segment(kind: &SegmentKind) -> Option<Self> {
        match kind {
            SegmentKind::LineRef(range) => Some(Self::Activate(*range)),
            _ => None,
        }
    }
}

/// The currently highlighted range together with the handles backing it.
#[derive(Debug)]
struct HighlightSelection<H> {
    start_line: u32,
    end_line: u32,
    handles: Vec<H>,
}

// ---------------------------------------------------------------------------
// HighlightLinker
// ---------------------------------------------------------------------------

/// Maps line references onto editor decorations.
///
/// Every mutation passes the previous handles back to the editor, so a new
/// activation always replaces the old highlight instead of stacking on it.
#[derive(Debug)]
pub struct HighlightLinker<E: EditorSurface> {
    editor: E,
    selection: Option<HighlightSelection<E::Handle>>,
}

impl<E: EditorSurface> HighlightLinker<E> {
    pub fn new(editor: E) -> Self {
        Self {
            editor,
            selection: None,
        }
    }

    /// Highlight `[start_line, end_line]` and center the view on `start_line`.
    ///
    /// Reversed bounds are swapped.
    pub fn activate(&mut self, start_line: u32, end_line: u32) {
        let (start_line, end_line) = if end_line < start_line {
            (end_line, start_line)
        } else {
            (start_line, end_line)
        };

        let old = self.take_handles();
        let handles = self
            .editor
            .replace_decorations(old, &[LineDecoration::highlight(start_line, end_line)]);
        self.editor.reveal_line_in_center(start_line);

        debug!(start_line, end_line, "highlight activated");
        self.selection = Some(HighlightSelection {
            start_line,
            end_line,
            handles,
        });
    }

    pub fn activate_range(&mut self, range: LineRange) {
        self.activate(range.start, range.last());
    }

    /// Remove the active highlight, if any.
    pub fn clear(&mut self) {
        let old = self.take_handles();
        if old.is_empty() {
            return;
        }
        let leftover = self.editor.replace_decorations(old, &[]);
        debug_assert!(leftover.is_empty());
        debug!("highlight cleared");
    }

    pub fn apply(&mut self, command: HighlightCommand) {
        match command {
            HighlightCommand::Activate(range) => self.activate_range(range),
            HighlightCommand::Clear => self.clear(),
        }
    }

    /// The active range as `(start_line, end_line)`.
    pub fn active(&self) -> Option<(u32, u32)> {
        self.selection
            .as_ref()
            .map(|sel| (sel.start_line, sel.end_line))
    }

    pub fn is_active(&self) -> bool {
        self.selection.is_some()
    }

    pub fn editor(&self) -> &E {
        &self.editor
    }

    fn take_handles(&mut self) -> Vec<E::Handle> {
        self.selection
            .take()
            .map(|sel| sel.handles)
            .unwrap_or_default()
    }
}
