//! SHA-256 helpers

use sha2::{Digest, Sha256};

/// Hash a sequence of byte slices, separating parts so `["ab","c"]` ≠ `["a","bc"]`
pub fn sha256_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// Binary merkle root over hex leaf hashes; an odd node is paired with itself
pub fn merkle_root(leaves: &[String]) -> String {
    if leaves.is_empty() {
        return sha256_hex(&[b"empty"]);
    }
    let mut level: Vec<String> = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                sha256_hex(&[left.as_bytes(), right.as_bytes()])
            })
            .collect();
    }
    level.remove(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_boundaries_matter() {
        assert_ne!(sha256_hex(&[b"ab", b"c"]), sha256_hex(&[b"a", b"bc"]));
        assert_eq!(sha256_hex(&[b"x"]), sha256_hex(&[b"x"]));
    }

    #[test]
    fn test_merkle_root_sensitive_to_leaves() {
        let leaves: Vec<String> = ["a", "b", "c"].iter().map(|s| sha256_hex(&[s.as_bytes()])).collect();
        let root = merkle_root(&leaves);
        let mut tampered = leaves.clone();
        tampered[2] = sha256_hex(&[b"z"]);
        assert_ne!(root, merkle_root(&tampered));
        assert_eq!(root, merkle_root(&leaves));
        assert_eq!(root.len(), 64);
    }
}
