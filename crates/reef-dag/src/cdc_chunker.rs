//! Content-defined chunk boundaries using FastCDC.
//!
//! Boundaries follow a rolling fingerprint over the content, so an edit in
//! one region of a file leaves the chunks of unchanged regions intact.
//!
//! **Parameters must not change between adds of related data**, otherwise
//! the same bytes produce different boundaries and nothing deduplicates.

use fastcdc::v2020::FastCDC;

/// Lengths of every content-defined chunk of `data`, in order.
pub(crate) fn cut_lengths(data: &[u8], min: u32, avg: u32, max: u32) -> Vec<usize> {
    FastCDC::new(data, min, avg, max)
        .map(|entry| entry.length)
        .collect()
}

/// Length of the first chunk of `window`.
///
/// FastCDC never looks further than `max` bytes past a chunk start, so when
/// `window` holds at least `max` bytes (or the rest of the stream) the cut
/// equals the one made over the whole input.
pub(crate) fn first_cut(window: &[u8], min: u32, avg: u32, max: u32) -> usize {
    FastCDC::new(window, min, avg, max)
        .next()
        .map_or(window.len(), |entry| entry.length)
}
