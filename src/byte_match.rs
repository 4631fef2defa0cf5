//! Marker search over packet bytes

use memchr::memmem;

/// Find the first occurrence of `needle` in `haystack` starting at `from`
///
/// Returns the absolute index into `haystack`. An empty needle matches at `from`
/// as long as `from` is within bounds.
#[inline]
pub fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    memmem::find(&haystack[from..], needle).map(|i| i + from)
}

/// Find the first occurrence of `needle` in `haystack`
#[inline]
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    find_from(haystack, needle, 0)
}

/// Check whether `needle` occurs anywhere in `haystack`
#[inline]
pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_at_start() {
        assert_eq!(find(&[0xFF, 0xD8, 0xFF, 0xE0], &[0xFF, 0xD8, 0xFF]), Some(0));
    }

    #[test]
    fn test_find_in_middle() {
        let data = [0x00, 0x11, 0xFF, 0xD9, 0x22];
        assert_eq!(find(&data, &[0xFF, 0xD9]), Some(2));
    }

    #[test]
    fn test_find_missing() {
        assert_eq!(find(&[0xFF, 0x00, 0xD9], &[0xFF, 0xD9]), None);
        assert_eq!(find(&[], &[0xFF, 0xD9]), None);
    }

    #[test]
    fn test_find_from_skips_earlier_match() {
        let data = [0xFF, 0xD9, 0x00, 0xFF, 0xD9];
        assert_eq!(find_from(&data, &[0xFF, 0xD9], 1), Some(3));
        assert_eq!(find_from(&data, &[0xFF, 0xD9], 4), None);
    }

    #[test]
    fn test_find_from_out_of_bounds() {
        assert_eq!(find_from(&[0xFF, 0xD9], &[0xFF], 3), None);
    }

    #[test]
    fn test_partial_marker_at_end_not_matched() {
        // Marker cut off by the end of the buffer
        assert_eq!(find(&[0x00, 0x00, 0xFF, 0xD8], &[0xFF, 0xD8, 0xFF]), None);
    }

    #[test]
    fn test_contains() {
        assert!(contains(&[0x01, 0xFF, 0xD9], &[0xFF, 0xD9]));
        assert!(!contains(&[0x01, 0xFF], &[0xFF, 0xD9]));
    }
}
