//! Annotation parser.
//!
//! Parsing runs three passes in a fixed order, each splitting only the plain
//! text left over by the passes before it:
//!
//! 1. line-reference blocks (`<L3,L5-9>`), one segment per reference
//! 2. bold spans (`**text**`)
//! 3. code tokens (`'ident'`)
//!
//! A bracket's contents are never seen by the bold or code patterns, so a
//! stray `*` or `'` near a line reference cannot misfire. Every segment keeps
//! the exact input slice it came from; concatenating them gives back the input.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An inclusive range of 1-based source lines named by a line reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineRange {
    pub start: u32,
    /// `None` for a single-line reference (`<L12>`).
    pub end: Option<u32>,
}

impl LineRange {
    pub fn single(line: u32) -> Self {
        Self {
            start: line,
            end: None,
        }
    }

    pub fn span(start: u32, end: u32) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// Last line covered by the range.
    pub fn last(&self) -> u32 {
        self.end.unwrap_or(self.start)
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "Lines {}-{end}", self.start),
            None => write!(f, "Line {}", self.start),
        }
    }
}

/// What a segment means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    Text(String),
    /// Identifier with its quotes stripped.
    Code(String),
    /// Span content with its `**` delimiters stripped.
    Bold(String),
    LineRef(LineRange),
}

/// One piece of a parsed explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSegment {
    pub kind: SegmentKind,
    /// The input slice this segment was cut from, markup included.
    pub raw: String,
}

impl AnnotationSegment {
    fn text(raw: &str) -> Self {
        Self {
            kind: SegmentKind::Text(raw.to_string()),
            raw: raw.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// A whole `<...>` block of one or more comma-joined references.
static LINE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<L\d+(?:-\d+)?(?:\s*,\s*L\d+(?:-\d+)?)*>").expect("line block regex")
});

/// One reference inside a block, with the separator that follows it.
static LINE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"L(\d+)(?:-(\d+))?(?:\s*,\s*)?").expect("line ref regex")
});

/// `**text**`, shortest match, single line.
static BOLD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*([^\n]+?)\*\*").expect("bold regex")
});

/// `'ident'`, `'ident!'`, `'ident?'`.
static CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'([a-zA-Z][a-zA-Z0-9*-]*[!?]?)'").expect("code regex")
});

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Split `text` into ordered, non-overlapping segments.
///
/// Never fails; markup that does not match degrades to plain text. Empty
/// segments are not emitted, so empty input gives an empty list.
pub fn parse(text: &str) -> Vec<AnnotationSegment> {
    let segments = split_line_refs(text);
    let segments = split_text_segments(segments, &BOLD_RE, SegmentKind::Bold);
    split_text_segments(segments, &CODE_RE, SegmentKind::Code)
}

/// Concatenate the raw slices of `segments`.
pub fn reassemble(segments: &[AnnotationSegment]) -> String {
    segments.iter().map(|s| s.raw.as_str()).collect()
}

/// The line ranges referenced by `segments`, in order.
pub fn line_refs(segments: &[AnnotationSegment]) -> impl Iterator<Item = LineRange> + '_ {
    segments.iter().filter_map(|s| match s.kind {
        SegmentKind::LineRef(range) => Some(range),
        _ => None,
    })
}

/// Pass 1: cut out every valid line-reference block.
fn split_line_refs(text: &str) -> Vec<AnnotationSegment> {
    let mut out = Vec::new();
    let mut cursor = 0;

    for block in LINE_BLOCK_RE.find_iter(text) {
        // A block with any invalid reference stays literal text.
        let Some(refs) = parse_block(block.as_str()) else {
            continue;
        };
        push_text(&mut out, &text[cursor..block.start()]);
        out.extend(refs);
        cursor = block.end();
    }

    push_text(&mut out, &text[cursor..]);
    out
}

/// Expand one `<...>` block into a segment per reference.
///
/// The opening `<` goes with the first reference, each separator with the
/// reference before it, and the closing `>` with the last.
fn parse_block(block: &str) -> Option<Vec<AnnotationSegment>> {
    let inner = &block[1..block.len() - 1];
    let mut refs: Vec<AnnotationSegment> = Vec::new();

    for caps in LINE_REF_RE.captures_iter(inner) {
        let start: u32 = caps[1].parse().ok()?;
        let end = match caps.get(2) {
            Some(m) => Some(m.as_str().parse::<u32>().ok()?),
            None => None,
        };

        if start == 0 || end.is_some_and(|end| end < start) {
            return None;
        }

        let prefix = if refs.is_empty() { "<" } else { "" };
        refs.push(AnnotationSegment {
            kind: SegmentKind::LineRef(LineRange { start, end }),
            raw: format!("{prefix}{}", &caps[0]),
        });
    }

    refs.last_mut()?.raw.push('>');
    Some(refs)
}

/// Passes 2 and 3: split every `Text` segment on `re`, leaving typed segments alone.
fn split_text_segments(
    segments: Vec<AnnotationSegment>,
    re: &Regex,
    make: fn(String) -> SegmentKind,
) -> Vec<AnnotationSegment> {
    let mut out = Vec::with_capacity(segments.len());

    for segment in segments {
        if !matches!(segment.kind, SegmentKind::Text(_)) {
            out.push(segment);
            continue;
        }

        let text = segment.raw.as_str();
        let mut cursor = 0;
        for caps in re.captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            push_text(&mut out, &text[cursor..whole.start()]);
            out.push(AnnotationSegment {
                kind: make(caps[1].to_string()),
                raw: whole.as_str().to_string(),
            });
            cursor = whole.end();
        }
        push_text(&mut out, &text[cursor..]);
    }

    out
}

fn push_text(out: &mut Vec<AnnotationSegment>, text: &str) {
    if !text.is_empty() {
        out.push(AnnotationSegment::text(text));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<SegmentKind> {
        parse(text).into_iter().map(|s| s.kind).collect()
    }

    fn text(s: &str) -> SegmentKind {
        SegmentKind::Text(s.into())
    }

    fn code(s: &str) -> SegmentKind {
        SegmentKind::Code(s.into())
    }

    fn bold(s: &str) -> SegmentKind {
        SegmentKind::Bold(s.into())
    }

    fn line(n: u32) -> SegmentKind {
        SegmentKind::LineRef(LineRange::single(n))
    }

    fn lines(start: u32, end: u32) -> SegmentKind {
        SegmentKind::LineRef(LineRange::span(start, end))
    }

    #[test]
    fn code_token_and_single_line_ref() {
        assert_eq!(
            kinds("Uses 'transfer-tokens' at <L12>."),
            vec![
                text("Uses "),
                code("transfer-tokens"),
                text(" at "),
                line(12),
                text("."),
            ]
        );
    }

    #[test]
    fn multi_ref_block_and_bold() {
        assert_eq!(
            kinds("See <L5-9,L11> and **note**."),
            vec![
                text("See "),
                lines(5, 9),
                line(11),
                text(" and "),
                bold("note"),
                text("."),
            ]
        );
    }

    #[test]
    fn plain_text_is_one_segment() {
        let input = "The contract keeps a ledger of balances.";
        assert_eq!(kinds(input), vec![text(input)]);
    }

    #[test]
    fn empty_input_has_no_segments() {
        assert!(parse("").is_empty());
    }

    #[test]
    fn raw_slices_reassemble_the_input() {
        let inputs = [
            "Uses 'transfer-tokens' at <L12>.",
            "See <L5-9, L11> and **note**.",
            "<L1><L2>'a''b'****",
            "Broken <L0> and <L9-3> and <L> and <L3,x> stay literal",
            "**unterminated bold and 'unterminated code",
            "Line one\n**two\nlines** then 'ft-transfer?' <L3,L4-4,L10>\n",
            "ünïcödé 'ok!' <L7> **ß**",
        ];
        for input in inputs {
            let segments = parse(input);
            assert_eq!(reassemble(&segments), input, "round trip failed for {input:?}");
            assert!(segments.iter().all(|s| !s.raw.is_empty()));
        }
    }

    #[test]
    fn multi_ref_raw_distribution() {
        let raws: Vec<String> = parse("<L3, L5-9,L11>").into_iter().map(|s| s.raw).collect();
        assert_eq!(raws, vec!["<L3, ", "L5-9,", "L11>"]);
    }

    #[test]
    fn invalid_blocks_stay_literal() {
        assert_eq!(kinds("at <L0> here"), vec![text("at <L0> here")]);
        assert_eq!(kinds("at <L9-3> here"), vec![text("at <L9-3> here")]);
        assert_eq!(kinds("at <L3,L0> here"), vec![text("at <L3,L0> here")]);
        assert_eq!(kinds("at <Lx> here"), vec![text("at <Lx> here")]);
        assert_eq!(
            kinds("overflow <L99999999999>"),
            vec![text("overflow <L99999999999>")]
        );
    }

    #[test]
    fn equal_bounds_are_a_valid_span() {
        assert_eq!(kinds("<L4-4>"), vec![lines(4, 4)]);
    }

    #[test]
    fn adjacent_markup_produces_no_empty_text() {
        assert_eq!(
            kinds("<L1><L2>'a''b'"),
            vec![line(1), line(2), code("a"), code("b")]
        );
    }

    #[test]
    fn code_token_suffixes() {
        assert_eq!(
            kinds("'ft-transfer?' then 'unwrap!' then 'get-balance*'"),
            vec![
                code("ft-transfer?"),
                text(" then "),
                code("unwrap!"),
                text(" then "),
                code("get-balance*"),
            ]
        );
    }

    #[test]
    fn code_must_start_with_letter() {
        assert_eq!(kinds("'1abc' and 'x y'"), vec![text("'1abc' and 'x y'")]);
    }

    #[test]
    fn bold_is_non_greedy() {
        assert_eq!(
            kinds("**a** and **b**"),
            vec![bold("a"), text(" and "), bold("b")]
        );
    }

    #[test]
    fn code_inside_bold_is_not_rescanned() {
        assert_eq!(
            kinds("**calls 'transfer'** now"),
            vec![bold("calls 'transfer'"), text(" now")]
        );
    }

    #[test]
    fn markup_chars_around_line_refs_do_not_misfire() {
        // The bold delimiters straddle a line ref; after pass 1 the halves
        // sit in separate text segments and cannot pair up.
        assert_eq!(
            kinds("**see <L4>** ok"),
            vec![text("**see "), line(4), text("** ok")]
        );
        assert_eq!(
            kinds("'abc<L2>def'"),
            vec![text("'abc"), line(2), text("def'")]
        );
    }

    #[test]
    fn line_refs_in_order() {
        let segments = parse("<L3> then <L5-9,L11>");
        let refs: Vec<LineRange> = line_refs(&segments).collect();
        assert_eq!(
            refs,
            vec![LineRange::single(3), LineRange::span(5, 9), LineRange::single(11)]
        );
    }

    #[test]
    fn line_range_labels() {
        assert_eq!(LineRange::single(12).to_string(), "Line 12");
        assert_eq!(LineRange::span(5, 9).to_string(), "Lines 5-9");
        assert_eq!(LineRange::single(12).last(), 12);
        assert_eq!(LineRange::span(5, 9).last(), 9);
    }
}
