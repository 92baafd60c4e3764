use sha2::{Digest, Sha256};

/// Accumulates the structural content of a schema into a SHA-256 digest.
///
/// Only properties that take part in compatibility are written, so two
/// compatible schemas always produce the same hash. Strings are
/// length-prefixed so adjacent values cannot run together.
pub struct CompatibilityHasher {
    hasher: Sha256,
}

impl CompatibilityHasher {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.hasher.update(value.to_be_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.hasher.update(value.to_be_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    pub fn write_str(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.hasher.update(value.as_bytes());
    }

    /// The leading eight bytes of the digest as a big-endian `i64`.
    pub fn finish(self) -> i64 {
        let digest = self.hasher.finalize();
        let mut leading = [0u8; 8];
        leading.copy_from_slice(&digest[..8]);
        i64::from_be_bytes(leading)
    }
}

impl Default for CompatibilityHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_prefix_separates_strings() {
        let mut a = CompatibilityHasher::new();
        a.write_str("ab");
        a.write_str("c");
        let mut b = CompatibilityHasher::new();
        b.write_str("a");
        b.write_str("bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn test_finish_is_deterministic() {
        let hash = |n| {
            let mut h = CompatibilityHasher::new();
            h.write_u32(n);
            h.write_bool(true);
            h.finish()
        };
        assert_eq!(hash(7), hash(7));
        assert_ne!(hash(7), hash(8));
    }
}
