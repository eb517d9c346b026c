use sha2::{Digest, Sha256};

/// The 32-byte default substituted for a missing child when computing an
/// internal node's hash (§3.2, §4.3 — resolves the `DefaultLeaf` notation to
/// the 32-byte-default phrasing used elsewhere in the spec; see DESIGN.md).
pub const DEFAULT_LEAF: [u8; 32] = [0u8; 32];

/// `SHA256(left_or_default || right_or_default)`, per the internal-node
/// integrity invariant (P2).
pub fn hash_internal(left: Option<[u8; 32]>, right: Option<[u8; 32]>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left.unwrap_or(DEFAULT_LEAF));
    hasher.update(right.unwrap_or(DEFAULT_LEAF));
    hasher.finalize().into()
}

/// `SHA256(key || value_key || height_as_byte)`, per the shortcut-leaf
/// integrity invariant (P1). `height` is truncated to a byte, matching the
/// source's `byte(height)` cast (256 wraps to 0).
pub fn hash_shortcut(key: [u8; 32], value_key: [u8; 32], height: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(key);
    hasher.update(value_key);
    hasher.update([(height % 256) as u8]);
    hasher.finalize().into()
}

/// Extracts bit `i` (0-indexed, MSB-first) of a 256-bit key, used by
/// single-key path descent (§4.3).
pub fn bit(key: &[u8; 32], i: usize) -> bool {
    key[i / 8] & (1 << (7 - i % 8)) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_hash_matches_manual_sha256() {
        let left = [1u8; 32];
        let right = [2u8; 32];
        let mut hasher = Sha256::new();
        hasher.update(left);
        hasher.update(right);
        let expected: [u8; 32] = hasher.finalize().into();
        assert_eq!(hash_internal(Some(left), Some(right)), expected);
    }

    #[test]
    fn missing_child_uses_default_leaf() {
        let right = [2u8; 32];
        let mut hasher = Sha256::new();
        hasher.update(DEFAULT_LEAF);
        hasher.update(right);
        let expected: [u8; 32] = hasher.finalize().into();
        assert_eq!(hash_internal(None, Some(right)), expected);
    }

    #[test]
    fn bit_extraction_is_msb_first() {
        let mut key = [0u8; 32];
        key[0] = 0b1000_0000;
        assert!(bit(&key, 0));
        assert!(!bit(&key, 1));
        key[31] = 0b0000_0001;
        assert!(bit(&key, 255));
    }
}
