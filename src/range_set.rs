//! Normalized sets of ranges over an ordered domain.
//!
//! Ring ownership (tokens) and engine file coverage (encoded keys) are both
//! handled as sets of ranges: reconciliation needs the complement of the owned
//! set, exports need the intersection of file spans with the requested span.

use std::{cmp::Ordering, ops::Bound};

/// A range with owned bounds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Span<K> {
    pub start: Bound<K>,
    pub end: Bound<K>,
}

impl<K> Span<K> {
    pub fn new(start: Bound<K>, end: Bound<K>) -> Self {
        Self { start, end }
    }

    pub fn all() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }
}

impl<K: Ord> Span<K> {
    pub fn contains(&self, key: &K) -> bool {
        let after_start = match &self.start {
            Bound::Unbounded => true,
            Bound::Included(s) => key >= s,
            Bound::Excluded(s) => key > s,
        };
        after_start
            && match &self.end {
                Bound::Unbounded => true,
                Bound::Included(e) => key <= e,
                Bound::Excluded(e) => key < e,
            }
    }

    pub fn is_empty(&self) -> bool {
        is_empty(&self.start, &self.end)
    }
}

/// Sorted, disjoint, non-adjacent spans.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SpanSet<K> {
    spans: Vec<Span<K>>,
}

impl<K: Ord + Clone> SpanSet<K> {
    pub fn empty() -> Self {
        Self { spans: Vec::new() }
    }

    pub fn all() -> Self {
        Self {
            spans: vec![Span::all()],
        }
    }

    /// Drop empty spans, sort by start and merge overlapping or touching spans.
    pub fn from_spans(mut spans: Vec<Span<K>>) -> Self {
        spans.retain(|s| !s.is_empty());
        spans.sort_by(|a, b| cmp_start(&a.start, &b.start));

        let mut out: Vec<Span<K>> = Vec::with_capacity(spans.len());
        for span in spans {
            match out.last_mut() {
                Some(last) if touches(&last.end, &span.start) => {
                    if cmp_end(&span.end, &last.end) == Ordering::Greater {
                        last.end = span.end;
                    }
                }
                _ => out.push(span),
            }
        }
        Self { spans: out }
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn into_spans(self) -> Vec<Span<K>> {
        self.spans
    }

    pub fn contains(&self, key: &K) -> bool {
        self.spans.iter().any(|s| s.contains(key))
    }

    pub fn intersect(&self, other: &SpanSet<K>) -> SpanSet<K> {
        let mut out = Vec::new();
        for a in &self.spans {
            for b in &other.spans {
                let start = if cmp_start(&a.start, &b.start) == Ordering::Less {
                    b.start.clone()
                } else {
                    a.start.clone()
                };
                let end = if cmp_end(&a.end, &b.end) == Ordering::Greater {
                    b.end.clone()
                } else {
                    a.end.clone()
                };
                out.push(Span::new(start, end));
            }
        }
        SpanSet::from_spans(out)
    }

    /// Gaps of this set over the unbounded domain.
    pub fn complement(&self) -> SpanSet<K> {
        let mut gaps = Vec::with_capacity(self.spans.len() + 1);
        let mut gap_start: Bound<K> = Bound::Unbounded;
        let mut open_to_end = true;
        for span in &self.spans {
            let gap_end = match &span.start {
                Bound::Unbounded => None,
                Bound::Included(k) => Some(Bound::Excluded(k.clone())),
                Bound::Excluded(k) => Some(Bound::Included(k.clone())),
            };
            if let Some(gap_end) = gap_end {
                gaps.push(Span::new(gap_start.clone(), gap_end));
            }
            match &span.end {
                Bound::Unbounded => {
                    open_to_end = false;
                    break;
                }
                Bound::Included(k) => gap_start = Bound::Excluded(k.clone()),
                Bound::Excluded(k) => gap_start = Bound::Included(k.clone()),
            }
        }
        if open_to_end {
            gaps.push(Span::new(gap_start, Bound::Unbounded));
        }
        SpanSet::from_spans(gaps)
    }
}

// Unbounded < Included(x) < Excluded(x) < Included(y) for x < y.
fn cmp_start<K: Ord>(a: &Bound<K>, b: &Bound<K>) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Less,
        (_, Bound::Unbounded) => Ordering::Greater,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            x.cmp(y)
        }
        (Bound::Included(x), Bound::Excluded(y)) => x.cmp(y).then(Ordering::Less),
        (Bound::Excluded(x), Bound::Included(y)) => x.cmp(y).then(Ordering::Greater),
    }
}

// Excluded(x) < Included(x) < Excluded(y) for x < y; Unbounded is greatest.
fn cmp_end<K: Ord>(a: &Bound<K>, b: &Bound<K>) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Greater,
        (_, Bound::Unbounded) => Ordering::Less,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            x.cmp(y)
        }
        (Bound::Included(x), Bound::Excluded(y)) => x.cmp(y).then(Ordering::Greater),
        (Bound::Excluded(x), Bound::Included(y)) => x.cmp(y).then(Ordering::Less),
    }
}

// Whether a span ending at `end` overlaps or abuts a span starting at `start`.
fn touches<K: Ord>(end: &Bound<K>, start: &Bound<K>) -> bool {
    match (end, start) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => true,
        (Bound::Excluded(x), Bound::Excluded(y)) => x > y,
        (Bound::Included(x), Bound::Included(y))
        | (Bound::Included(x), Bound::Excluded(y))
        | (Bound::Excluded(x), Bound::Included(y)) => x >= y,
    }
}

fn is_empty<K: Ord>(start: &Bound<K>, end: &Bound<K>) -> bool {
    match (start, end) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => false,
        (Bound::Included(a), Bound::Included(b)) => a > b,
        (Bound::Included(a), Bound::Excluded(b))
        | (Bound::Excluded(a), Bound::Included(b))
        | (Bound::Excluded(a), Bound::Excluded(b)) => a >= b,
    }
}
