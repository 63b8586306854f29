use flate2::read::GzDecoder;
use std::io::{self, Read};

use crate::consts::{DEFAULT_MAX_SNAPSHOT_MB, MAX_SNAPSHOT_MB_ENV};

const MIB: u64 = 1024 * 1024;

/// Byte cap on a snapshot after decompression. Unparsable overrides fall
/// back to the default.
pub fn max_snapshot_bytes() -> u64 {
    std::env::var(MAX_SNAPSHOT_MB_ENV)
        .ok()
        .and_then(|mb| mb.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_MAX_SNAPSHOT_MB)
        .saturating_mul(MIB)
}

/// Reads `source` to the end, failing once more than `limit` bytes arrive.
pub fn read_bounded<R: Read>(source: R, limit: u64) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    source.take(limit.saturating_add(1)).read_to_end(&mut buf)?;
    if buf.len() as u64 > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("snapshot is larger than {} bytes", limit),
        ));
    }
    Ok(buf)
}

pub fn read_gzip_bounded<R: Read>(source: R, limit: u64) -> io::Result<Vec<u8>> {
    read_bounded(GzDecoder::new(source), limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    #[test]
    fn test_read_bounded_accepts_exact_limit() {
        let data = vec![7u8; 20_000];
        assert_eq!(read_bounded(&data[..], 20_000).unwrap(), data);
        let err = read_bounded(&data[..], 19_999).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_gzip_bomb_is_cut_off() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::best());
        enc.write_all(&[0u8; 100_000]).unwrap();
        let compressed = enc.finish().unwrap();
        assert!(compressed.len() < 1_000);

        assert_eq!(read_gzip_bounded(&compressed[..], 100_000).unwrap().len(), 100_000);
        assert!(read_gzip_bounded(&compressed[..], 1_000).is_err());
    }
}
