///Rounds `value` up to the next multiple of `alignment`. An alignment of 0 or 1 returns `value` unchanged.
///
/// Works for non power-of-two alignments as well, which some device limits (descriptor sizes) are.
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

///Rounds `value` down to the previous multiple of `alignment`.
pub const fn align_down(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        (value / alignment) * alignment
    }
}

///Returns true if the half open ranges `[a_start, a_start + a_len)` and `[b_start, b_start + b_len)` share at
/// least one byte. Empty ranges never overlap.
pub const fn ranges_overlap(a_start: u64, a_len: u64, b_start: u64, b_len: u64) -> bool {
    a_len > 0 && b_len > 0 && a_start < b_start + b_len && b_start < a_start + a_len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(13, 0), 13);
        //descriptor sizes are not always a power of two
        assert_eq!(align_up(7, 24), 24);
        assert_eq!(align_down(300, 256), 256);
    }

    #[test]
    fn overlap() {
        assert!(ranges_overlap(0, 10, 9, 1));
        assert!(!ranges_overlap(0, 10, 10, 5));
        assert!(!ranges_overlap(4, 0, 0, 10));
    }
}
