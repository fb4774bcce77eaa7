//! Overlay compositor
//!
//! Interleaves annotation spans and search hits with the literal text between
//! them, producing the render sequence for the document view. Spans are
//! assumed pairwise non-overlapping; if they do overlap, the later span is
//! still emitted and no literal text is repeated.

use serde::Serialize;

use crate::model::{Annotation, Match, OffsetMap};

/// One piece of the rendered document
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Segment<'a> {
    /// Plain text, `[start, end)` in UTF-16 units
    Text { start: usize, end: usize, text: &'a str },
    /// An existing annotation; `index` points into the annotation slice given to `composite`
    Annotation { index: usize, annotation: &'a Annotation },
    /// A search hit; `index` points into the match slice given to `composite`
    Match {
        index: usize,
        #[serde(rename = "match")]
        hit: &'a Match,
    },
}

impl<'a> Segment<'a> {
    /// Underlying document text of this segment
    pub fn text(&self) -> &'a str {
        match *self {
            Segment::Text { text, .. } => text,
            Segment::Annotation { annotation, .. } => &annotation.text,
            Segment::Match { hit, .. } => &hit.text,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Segment::Text { .. })
    }
}

#[derive(Clone, Copy)]
enum Tagged<'a> {
    Annotation(usize, &'a Annotation),
    Match(usize, &'a Match),
}

impl<'a> Tagged<'a> {
    fn start(&self) -> usize {
        match self {
            Tagged::Annotation(_, a) => a.start,
            Tagged::Match(_, m) => m.start,
        }
    }

    fn end(&self) -> usize {
        match self {
            Tagged::Annotation(_, a) => a.end,
            Tagged::Match(_, m) => m.end,
        }
    }

    fn segment(self) -> Segment<'a> {
        match self {
            Tagged::Annotation(index, annotation) => Segment::Annotation { index, annotation },
            Tagged::Match(index, hit) => Segment::Match { index, hit },
        }
    }
}

/// Merge two start-ordered span lists (annotations win ties)
fn merge<'a>(annotations: Vec<Tagged<'a>>, matches: Vec<Tagged<'a>>) -> Vec<Tagged<'a>> {
    let mut merged = Vec::with_capacity(annotations.len() + matches.len());
    let mut a = annotations.into_iter().peekable();
    let mut m = matches.into_iter().peekable();

    loop {
        let take_annotation = match (a.peek(), m.peek()) {
            (Some(x), Some(y)) => x.start() <= y.start(),
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_annotation { a.next() } else { m.next() };
        merged.extend(next);
    }
    merged
}

/// Build the render sequence for `text`.
///
/// # Arguments
/// * `include_annotations` - false while composing new annotations (add mode),
///   in which case only `matches` are overlaid
pub fn composite<'a>(
    text: &'a str,
    annotations: &'a [Annotation],
    matches: &'a [Match],
    include_annotations: bool,
) -> Vec<Segment<'a>> {
    let offsets = OffsetMap::new(text);
    let len = offsets.utf16_len();

    let mut ann_spans: Vec<Tagged<'a>> = if include_annotations {
        annotations.iter().enumerate().map(|(i, a)| Tagged::Annotation(i, a)).collect()
    } else {
        Vec::new()
    };
    let mut match_spans: Vec<Tagged<'a>> = matches.iter().enumerate().map(|(i, m)| Tagged::Match(i, m)).collect();
    ann_spans.sort_by_key(|s| s.start());
    match_spans.sort_by_key(|s| s.start());

    let spans = merge(ann_spans, match_spans);
    if spans.is_empty() {
        return vec![Segment::Text { start: 0, end: len, text }];
    }

    let mut segments = Vec::with_capacity(spans.len() * 2 + 1);
    let mut cursor = 0usize;
    let push_text = |segments: &mut Vec<Segment<'a>>, from: usize, to: usize| {
        if from < to {
            segments.push(Segment::Text { start: from, end: to, text: offsets.slice(from, to) });
        }
    };

    for span in spans {
        let start = span.start().min(len);
        push_text(&mut segments, cursor, start);
        segments.push(span.segment());
        cursor = cursor.max(span.end().min(len));
    }
    push_text(&mut segments, cursor, len);

    segments
}
