//! Fixed-width n-gram tokenizer.
//!
//! Widths are counted in `char`s so that multi-byte scripts split on
//! character boundaries rather than bytes.

/// Borrowing iterator over the `n`-character windows of `text`, stride 1.
///
/// Yields `max(0, len - n + 1)` slices; nothing when `text` is shorter
/// than `n` or when `n` is zero.
pub fn ngram_slices(text: &str, n: usize) -> NgramSlices<'_> {
    // Byte offset of every char start, plus the end of the string.
    let mut bounds: Vec<usize> = text.char_indices().map(|(idx, _)| idx).collect();
    bounds.push(text.len());

    NgramSlices {
        text,
        bounds,
        n,
        start: 0,
    }
}

/// Owned n-gram sequence for `text`, in position order.
///
/// Duplicates are kept; callers that need set semantics collapse them.
pub fn ngrams(text: &str, n: usize) -> Vec<String> {
    ngram_slices(text, n).map(str::to_owned).collect()
}

pub struct NgramSlices<'a> {
    text: &'a str,
    bounds: Vec<usize>,
    n: usize,
    start: usize,
}

impl<'a> Iterator for NgramSlices<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.n == 0 {
            return None;
        }
        let end = self.start + self.n;
        if end >= self.bounds.len() {
            return None;
        }
        let slice = &self.text[self.bounds[self.start]..self.bounds[end]];
        self.start += 1;
        Some(slice)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let chars = self.bounds.len() - 1;
        let remaining = if self.n == 0 {
            0
        } else {
            (chars + 1).saturating_sub(self.n + self.start)
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for NgramSlices<'_> {}
