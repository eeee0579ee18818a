use chumsky::span::SimpleSpan;

/// A value paired with the byte range it was parsed from.
#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub span: SimpleSpan<usize>,
    pub val: T,
}

impl<T> Spanned<T> {
    pub fn new(span: SimpleSpan<usize>, val: T) -> Self {
        Spanned { span, val }
    }

    /// Wraps a value that has no position in the root document, e.g. a node
    /// synthesized during normalization or adopted from an included file.
    pub fn synthetic(val: T) -> Self {
        Spanned {
            span: dummy_span(),
            val,
        }
    }
}

// Equality ignores spans so that normalized values compare by content.
impl<T: PartialEq> PartialEq for Spanned<T> {
    fn eq(&self, other: &Self) -> bool {
        self.val == other.val
    }
}

impl<T: Eq> Eq for Spanned<T> {}

pub fn dummy_span() -> SimpleSpan<usize> {
    SimpleSpan::new(usize::MAX, usize::MAX)
}

/// `Some(span)` only when the span points into the root document.
pub fn real_span(span: SimpleSpan<usize>) -> Option<SimpleSpan<usize>> {
    (span.start != usize::MAX).then_some(span)
}
