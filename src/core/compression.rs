// Compression backends for framed binary logs

use crate::core::constants::CompressionType;
use crate::core::error::{IngestError, Result};
use flate2::read::{GzDecoder, ZlibDecoder};
use std::io::Read;

/// Decompresses `data` if it carries a known codec header, otherwise
/// returns it unchanged.
pub fn decompress_auto(data: Vec<u8>) -> Result<Vec<u8>> {
    match CompressionType::detect(&data) {
        CompressionType::None => Ok(data),
        codec => decompress(&data, codec),
    }
}

pub fn decompress(data: &[u8], compression: CompressionType) -> Result<Vec<u8>> {
    match compression {
        CompressionType::None => Ok(data.to_vec()),

        CompressionType::Gzip => {
            let mut decoder = GzDecoder::new(data);
            let mut decompressed = Vec::new();
            decoder
                .read_to_end(&mut decompressed)
                .map_err(|e| IngestError::DecompressionFailed(format!("Gzip: {}", e)))?;
            Ok(decompressed)
        }

        CompressionType::Zlib => {
            let mut decoder = ZlibDecoder::new(data);
            let mut decompressed = Vec::new();
            decoder
                .read_to_end(&mut decompressed)
                .map_err(|e| IngestError::DecompressionFailed(format!("Zlib: {}", e)))?;
            Ok(decompressed)
        }

        #[cfg(feature = "lz4")]
        CompressionType::Lz4 => {
            let mut decoder = lz4::Decoder::new(data)
                .map_err(|e| IngestError::DecompressionFailed(format!("LZ4: {}", e)))?;
            let mut decompressed = Vec::new();
            decoder
                .read_to_end(&mut decompressed)
                .map_err(|e| IngestError::DecompressionFailed(format!("LZ4: {}", e)))?;
            Ok(decompressed)
        }

        #[cfg(not(feature = "lz4"))]
        CompressionType::Lz4 => Err(IngestError::UnsupportedCompression("lz4".to_string())),

        #[cfg(feature = "zstd")]
        CompressionType::Zstd => zstd::decode_all(data)
            .map_err(|e| IngestError::DecompressionFailed(format!("Zstd: {}", e))),

        #[cfg(not(feature = "zstd"))]
        CompressionType::Zstd => Err(IngestError::UnsupportedCompression("zstd".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_uncompressed() {
        let data = vec![0x12, 0x04, 0x08, 0x01, 0x10, 0x02];
        let result = decompress_auto(data.clone()).unwrap();
        assert_eq!(result, data);
    }

    #[test]
    fn test_decompress_gzip() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let original = b"position log payload";
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(original).unwrap();
        let compressed = encoder.finish().unwrap();

        let decompressed = decompress_auto(compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_truncated_gzip_fails() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[7u8; 512]).unwrap();
        let mut compressed = encoder.finish().unwrap();
        compressed.truncate(compressed.len() / 2);

        let err = decompress_auto(compressed).unwrap_err();
        assert!(matches!(err, IngestError::DecompressionFailed(_)));
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn test_decompress_zstd() {
        let original = b"zstd framed log".to_vec();
        let compressed = zstd::encode_all(&original[..], 3).unwrap();
        assert_eq!(decompress_auto(compressed).unwrap(), original);
    }
}
