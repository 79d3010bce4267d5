//! Quoted-printable encoding for directory entry names.
//!
//! Entry names are arbitrary byte strings, but they are stored inside tree
//! entry names and ls-blob lines, which must stay printable and must not
//! contain spaces or newlines. The codec is strict byte-mode
//! quoted-printable: printable ASCII passes through, everything else
//! (including space, tab, `=` and newlines) becomes `=XX`. No soft line
//! breaks are ever produced, and any `=\n` in the input to decode is
//! stripped.

use crate::error::{Error, Result};

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Encodes a name for storage.
///
/// Bytes 33..=126 other than `=` pass through verbatim; every other byte is
/// encoded as `=XX` with uppercase hex digits. The result contains no
/// spaces, so ls-blob lines can be split on their last space.
pub fn quote(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for &b in name.as_bytes() {
        if (33..=126).contains(&b) && b != b'=' {
            out.push(b as char);
        } else {
            out.push('=');
            out.push(HEX_UPPER[(b >> 4) as usize] as char);
            out.push(HEX_UPPER[(b & 0x0F) as usize] as char);
        }
    }
    out
}

/// Decodes a quoted name back to its raw bytes.
///
/// Accepts lowercase hex digits and strips `=\n` / `=\r\n` soft line
/// breaks. Fails with `InvalidFormat` on a truncated or non-hex escape.
pub fn unquote_bytes(quoted: &str) -> Result<Vec<u8>> {
    let bytes = quoted.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b != b'=' {
            out.push(b);
            i += 1;
            continue;
        }

        // Soft line break: "=\n" or "=\r\n"
        if bytes.get(i + 1) == Some(&b'\n') {
            i += 2;
            continue;
        }
        if bytes.get(i + 1) == Some(&b'\r') && bytes.get(i + 2) == Some(&b'\n') {
            i += 3;
            continue;
        }

        let high = bytes
            .get(i + 1)
            .and_then(|&c| hex_value(c))
            .ok_or_else(|| Error::InvalidFormat(format!("bad quoted name: {:?}", quoted)))?;
        let low = bytes
            .get(i + 2)
            .and_then(|&c| hex_value(c))
            .ok_or_else(|| Error::InvalidFormat(format!("bad quoted name: {:?}", quoted)))?;
        out.push((high << 4) | low);
        i += 3;
    }

    Ok(out)
}

/// Decodes a quoted name to a string.
///
/// Fails with `InvalidUtf8` if the raw bytes are not valid UTF-8.
pub fn unquote(quoted: &str) -> Result<String> {
    let bytes = unquote_bytes(quoted)?;
    String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
