//! Zlib compression and decompression utilities.

use crate::error::{Error, Result};

/// Compresses data using zlib.
///
/// # Arguments
///
/// * `data` - The data to compress.
///
/// # Returns
///
/// The compressed data as a byte vector.
pub fn compress(data: &[u8]) -> Vec<u8> {
    // Level 6: default balance of speed and size
    miniz_oxide::deflate::compress_to_vec_zlib(data, 6)
}

/// Decompresses zlib-compressed data.
///
/// The zlib header is validated before inflating.
///
/// # Arguments
///
/// * `data` - The zlib-compressed data to decompress.
///
/// # Returns
///
/// The decompressed data on success, or `Error::DecompressionFailed` if the
/// input is empty, the header is invalid, or the stream is corrupted.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 2 {
        return Err(Error::DecompressionFailed);
    }

    if !is_valid_zlib_header(data[0], data[1]) {
        return Err(Error::DecompressionFailed);
    }

    miniz_oxide::inflate::decompress_to_vec_zlib(data).map_err(|_| Error::DecompressionFailed)
}

/// Validates a zlib header.
///
/// The compression method (low 4 bits of CMF) must be 8 (DEFLATE), the
/// window size at most 7, and `(CMF * 256 + FLG) % 31 == 0`.
fn is_valid_zlib_header(cmf: u8, flg: u8) -> bool {
    let compression_method = cmf & 0x0F;
    if compression_method != 8 {
        return false;
    }

    let window_size = (cmf >> 4) & 0x0F;
    if window_size > 7 {
        return false;
    }

    let check = (cmf as u16) * 256 + (flg as u16);
    check % 31 == 0
}
