//! Byte-safe encoding for filenames that carry over the wire.
//!
//! Most filenames round-trip as plain UTF-8. A filename that isn't valid
//! UTF-8 (arbitrary bytes, as POSIX allows) is prefixed with a marker and
//! each non-ASCII byte is escaped as `~HH`; a literal `~` is escaped as
//! `~7E` so the decoder can tell escaped bytes from passthrough ones.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;

const PREFIX: &str = "~~OSPATH~~";

/// An encoded, wire-safe name or path segment. Always valid UTF-8.
pub type EncodedName = String;

/// Encode an OS filename for the wire. Names that are already valid UTF-8
/// pass through unchanged (tildes and all).
pub fn encode_osstr(name: &OsStr) -> EncodedName {
    if let Some(s) = name.to_str() {
        return s.to_string();
    }
    let mut out = String::with_capacity(PREFIX.len() + name.len() * 2);
    out.push_str(PREFIX);
    for &byte in name.as_bytes() {
        if byte == b'~' {
            out.push_str("~7E");
        } else if byte < 0x80 {
            out.push(byte as char);
        } else {
            out.push_str(&format!("~{byte:02X}"));
        }
    }
    out
}

/// Decode a wire name back to raw bytes, reversing [`encode_osstr`].
///
/// Accepts both the escaped and the unescaped form, per the spec: a string
/// without the marker prefix is returned byte-for-byte as given.
pub fn decode_to_bytes(encoded: &str) -> anyhow::Result<Vec<u8>> {
    let Some(rest) = encoded.strip_prefix(PREFIX) else {
        return Ok(encoded.as_bytes().to_vec());
    };

    let bytes = rest.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'~' {
            if i + 3 > bytes.len() {
                anyhow::bail!("incomplete escape sequence at {i}");
            }
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                .map_err(|_| anyhow::anyhow!("invalid escape sequence at {i}"))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| anyhow::anyhow!("invalid hex in escape sequence at {i}: {hex}"))?;
            out.push(byte);
            i += 3;
        } else {
            let start = i;
            while i < bytes.len() && bytes[i] != b'~' {
                i += 1;
            }
            out.extend_from_slice(&bytes[start..i]);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::ffi::OsStringExt;

    #[test]
    fn ascii_roundtrips_unchanged() {
        let name = OsStr::new("photo (1).jpg");
        let encoded = encode_osstr(name);
        assert_eq!(encoded, "photo (1).jpg");
        assert_eq!(decode_to_bytes(&encoded).unwrap(), name.as_bytes());
    }

    #[test]
    fn tilde_in_plain_utf8_is_untouched() {
        let name = OsStr::new("~backup~.jpg");
        let encoded = encode_osstr(name);
        assert_eq!(encoded, "~backup~.jpg");
    }

    #[test]
    fn non_utf8_bytes_roundtrip() {
        let raw = vec![b'a', 0xFF, b'b', b'~', 0x00];
        let name = std::ffi::OsString::from_vec(raw.clone());
        let encoded = encode_osstr(&name);
        assert!(encoded.starts_with("~~OSPATH~~"));
        let decoded = decode_to_bytes(&encoded).unwrap();
        assert_eq!(decoded, raw);
    }

    #[test]
    fn decode_rejects_truncated_escape() {
        assert!(decode_to_bytes("~~OSPATH~~~4").is_err());
    }
}
