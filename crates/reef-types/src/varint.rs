//! Unsigned LEB128 varints, shared by CIDs, multihashes and protobuf framing.

/// Append `value` to `buf` as an unsigned varint.
pub fn put_uvarint(buf: &mut Vec<u8>, value: u64) {
    leb128::write::unsigned(buf, value).expect("writing to a Vec is infallible");
}

/// Read an unsigned varint from the front of `input`, advancing it.
///
/// Returns `None` on truncated input or a value that overflows `u64`.
pub fn read_uvarint(input: &mut &[u8]) -> Option<u64> {
    leb128::read::unsigned(input).ok()
}

/// Number of bytes `value` occupies when varint-encoded.
pub fn uvarint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}
