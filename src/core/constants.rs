// Format constants shared by the decoders

pub const GZIP_MAGIC: &[u8; 2] = &[0x1f, 0x8b];
pub const ZSTD_MAGIC: &[u8; 4] = &[0x28, 0xb5, 0x2f, 0xfd];
pub const LZ4_FRAME_MAGIC: &[u8; 4] = &[0x04, 0x22, 0x4d, 0x18];

// Compression codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None = 0,
    Gzip = 1,
    Zlib = 2,
    Lz4 = 3,
    Zstd = 4,
}

impl CompressionType {
    /// Sniffs the codec from the leading bytes of a stream.
    pub fn detect(data: &[u8]) -> Self {
        if data.starts_with(GZIP_MAGIC) {
            CompressionType::Gzip
        } else if data.starts_with(ZSTD_MAGIC) {
            CompressionType::Zstd
        } else if data.starts_with(LZ4_FRAME_MAGIC) {
            CompressionType::Lz4
        } else if is_zlib_header(data) {
            CompressionType::Zlib
        } else {
            CompressionType::None
        }
    }
}

// CMF/FLG pair: deflate method, window <= 32K, header checksum divisible by 31
fn is_zlib_header(data: &[u8]) -> bool {
    if data.len() < 2 {
        return false;
    }
    let cmf = data[0];
    let flg = data[1];
    cmf & 0x0f == 8 && cmf >> 4 <= 7 && (u16::from(cmf) << 8 | u16::from(flg)) % 31 == 0
}

// Metadata vocabulary
pub const VOCAB: &str = "urn:fieldlog:vocab#";
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

// Shapefile archive members
pub const SHP_EXT: &str = "shp";
pub const PRJ_EXT: &str = "prj";
pub const SIDECAR_EXTS: [&str; 4] = ["shx", "dbf", "prj", "cpg"];

// WGS84 ellipsoid
pub const WGS84_A: f64 = 6_378_137.0;
pub const WGS84_INV_F: f64 = 298.257_223_563;
