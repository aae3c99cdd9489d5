//! Compression of stored objects.

/// Default zstd compression level.
pub const ZSTD_LEVEL: i32 = 3;

/// Compresses objects before upload and decompresses them after download.
pub trait Codec: Send + Sync {
    /// Compresses `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the encoder fails.
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, std::io::Error>;

    /// Decompresses `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if `bytes` are not valid compressed data.
    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, std::io::Error>;
}

/// zstd frames, matching the `.zst` suffix of archive keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZstdCodec {
    level: i32,
}

impl ZstdCodec {
    /// A codec compressing at `level`.
    #[must_use]
    pub const fn new(level: i32) -> Self {
        Self { level }
    }

    /// Compression level.
    #[must_use]
    pub const fn level(&self) -> i32 {
        self.level
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self::new(ZSTD_LEVEL)
    }
}

impl Codec for ZstdCodec {
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        zstd::encode_all(bytes, self.level)
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        zstd::decode_all(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zstd_restores_input() {
        let codec = ZstdCodec::default();
        let input = br#"{"dataset_id":"445cab7cb3a13f827e722c2a"}"#.repeat(20);
        let compressed = codec.compress(&input).unwrap();
        assert!(compressed.len() < input.len());
        assert_eq!(codec.decompress(&compressed).unwrap(), input);
    }

    #[test]
    fn garbage_does_not_decompress() {
        assert!(ZstdCodec::default().decompress(b"not zstd").is_err());
    }
}
