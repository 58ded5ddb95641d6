/// First magic byte of a container file.
pub const HEADER_ID1: u8 = 0x50;
/// Second magic field of a container file, stored as a little-endian `i32`.
pub const HEADER_ID2: i32 = 0x4545_414D;

/// Size of the container file header in bytes.
pub const FILE_HEADER_SIZE: usize = 17;
/// Size of the length prefix in front of every length-prefixed chunk record.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Chunk size used when none is configured (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

pub const GZIP_ID1: u8 = 0x1f;
pub const GZIP_ID2: u8 = 0x8b;
pub const GZIP_CM_DEFLATE: u8 = 8;
pub const GZIP_FLAG_FEXTRA: u8 = 0x04;
pub const GZIP_OS_UNKNOWN: u8 = 255;

/// Subfield id of the extra field carrying the compressed member length.
pub const MEMBER_SUBFIELD_ID: [u8; 2] = *b"CZ";
/// Fixed gzip header (10) + XLEN (2) + subfield header (4) + length (4).
pub const MEMBER_HEADER_SIZE: usize = 20;
/// CRC32 + ISIZE.
pub const MEMBER_FOOTER_SIZE: usize = 8;
