//! In-memory [`EditorSurface`] over contract source text.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use tracing::debug;

use crate::highlight::{EditorSurface, LineDecoration};

/// Handle for a decoration applied to a [`TextView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecorationId(u64);

/// Read-only source view with line decorations and a scroll position.
#[derive(Debug, Clone)]
pub struct TextView {
    lines: Vec<String>,
    decorations: BTreeMap<DecorationId, LineDecoration>,
    next_id: u64,
    centered_line: Option<u32>,
    height: u32,
}

impl TextView {
    /// Default number of lines shown by [`TextView::render_viewport`].
    pub const DEFAULT_HEIGHT: u32 = 21;

    pub fn new(source: &str) -> Self {
        Self {
            lines: source.split('\n').map(str::to_string).collect(),
            decorations: BTreeMap::new(),
            next_id: 0,
            centered_line: None,
            height: Self::DEFAULT_HEIGHT,
        }
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = height.max(1);
        self
    }

    pub fn line_count(&self) -> u32 {
        u32::try_from(self.lines.len()).unwrap_or(u32::MAX)
    }

    pub fn decorations(&self) -> impl Iterator<Item = &LineDecoration> {
        self.decorations.values()
    }

    pub fn centered_line(&self) -> Option<u32> {
        self.centered_line
    }

    pub fn is_highlighted(&self, line: u32) -> bool {
        self.decorations
            .values()
            .any(|d| d.whole_line && (d.start_line..=d.end_line).contains(&line))
    }

    /// Render every line with a number gutter and a `>` marker on highlighted lines.
    pub fn render(&self) -> String {
        self.render_lines(1, self.line_count())
    }

    /// Render the window of `height` lines around the centered line.
    ///
    /// Falls back to the top of the file when nothing has been revealed.
    pub fn render_viewport(&self) -> String {
        let total = self.line_count();
        let center = self.centered_line.unwrap_or(1);
        let half = self.height / 2;

        let mut first = center.saturating_sub(half).max(1);
        let last = first.saturating_add(self.height - 1).min(total);
        // Keep the window full near the end of the file.
        first = first.min(last.saturating_sub(self.height - 1).max(1));

        self.render_lines(first, last)
    }

    fn render_lines(&self, first: u32, last: u32) -> String {
        let width = self.line_count().to_string().len().max(4);
        let mut out = String::new();

        for n in first..=last {
            let Some(line) = self.lines.get(n as usize - 1) else {
                break;
            };
            let marker = if self.is_highlighted(n) { '>' } else { ' ' };
            let _ = writeln!(out, "{marker} {n:>width$} | {line}");
        }

        out
    }
}

impl EditorSurface for TextView {
    type Handle = DecorationId;

    fn replace_decorations(
        &mut self,
        old: Vec<DecorationId>,
        new: &[LineDecoration],
    ) -> Vec<DecorationId> {
        for id in old {
            if self.decorations.remove(&id).is_none() {
                debug!(?id, "ignoring stale decoration handle");
            }
        }

        new.iter()
            .map(|decoration| {
                self.next_id += 1;
                let id = DecorationId(self.next_id);
                self.decorations.insert(id, decoration.clone());
                id
            })
            .collect()
    }

    fn reveal_line_in_center(&mut self, line: u32) {
        let line = line.clamp(1, self.line_count().max(1));
        self.centered_line = Some(line);
    }
}
