// Streaming MD5 over the downloaded firmware

use md5::{Digest, Md5};

/// Incremental digest fed chunk by chunk in wire order.
///
/// `finalize` consumes the accumulator, so a finished digest can't be fed again.
pub struct HashAccumulator {
    hasher: Md5,
}

impl HashAccumulator {
    pub fn new() -> Self {
        Self { hasher: Md5::new() }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Lowercase hex digest
    pub fn finalize(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl Default for HashAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-shot digest of a complete buffer
pub fn digest_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// The service may send the checksum in either case
pub fn digests_match(calculated: &str, expected: &str) -> bool {
    calculated.eq_ignore_ascii_case(expected)
}
