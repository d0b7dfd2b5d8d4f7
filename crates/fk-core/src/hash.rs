//! Hash functions for the rule indexes.
//!
//! Both the shortcut table and the domain table key on a 32-bit djb2 hash
//! (seed 5381, multiplier 33, xor variant). djb2 is cheap enough to run over
//! every 5-byte window of a URL on the hot path, and collisions only cost an
//! extra candidate check.

/// djb2 hash over a byte slice.
#[inline]
pub fn fast_hash_bytes(data: &[u8]) -> u32 {
    let mut hash: u32 = 5381;
    for &b in data {
        hash = hash.wrapping_mul(33) ^ (b as u32);
    }
    hash
}

/// djb2 hash of a string.
#[inline]
pub fn fast_hash(s: &str) -> u32 {
    fast_hash_bytes(s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_hash_consistent() {
        assert_eq!(fast_hash("example.com"), fast_hash("example.com"));
    }

    #[test]
    fn test_fast_hash_different_strings() {
        assert_ne!(fast_hash("example.com"), fast_hash("example.org"));
    }

    #[test]
    fn test_fast_hash_empty() {
        assert_eq!(fast_hash(""), 5381);
    }

    #[test]
    fn test_fast_hash_windows_differ() {
        // Adjacent URL windows should land in different buckets.
        let url = "https://example.org/banner";
        let bytes = url.as_bytes();
        let h1 = fast_hash_bytes(&bytes[0..5]);
        let h2 = fast_hash_bytes(&bytes[1..6]);
        assert_ne!(h1, h2);
    }
}
