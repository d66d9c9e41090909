//! Text encodings for decoding buffered response bodies.

use std::fmt;
use std::str::FromStr;

/// Encoding used by [`crate::HttpToken::response_string`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// UTF-8; invalid input decodes to `None`.
    #[default]
    Utf8,
    /// UTF-8 with invalid sequences replaced by U+FFFD.
    Utf8Lossy,
    Utf16Le,
    Utf16Be,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
    /// 7-bit ASCII; any byte above 0x7F decodes to `None`.
    Ascii,
}

impl TextEncoding {
    /// Decode `bytes`, returning `None` if they are not valid in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            TextEncoding::Utf8Lossy => Some(String::from_utf8_lossy(bytes).into_owned()),
            TextEncoding::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
            TextEncoding::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
            TextEncoding::Ascii => bytes
                .is_ascii()
                .then(|| bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf8Lossy => "utf-8-lossy",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Utf16Be => "utf-16be",
            TextEncoding::Latin1 => "iso-8859-1",
            TextEncoding::Ascii => "us-ascii",
        }
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units).collect::<Result<String, _>>().ok()
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "utf-8-lossy" | "utf8-lossy" | "lossy" => Ok(Self::Utf8Lossy),
            "utf-16le" | "utf16le" => Ok(Self::Utf16Le),
            "utf-16be" | "utf16be" => Ok(Self::Utf16Be),
            "iso-8859-1" | "latin1" | "latin-1" => Ok(Self::Latin1),
            "us-ascii" | "ascii" => Ok(Self::Ascii),
            _ => Err(format!("unknown text encoding: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_strict_and_lossy() {
        assert_eq!(TextEncoding::Utf8.decode("héllo".as_bytes()).as_deref(), Some("héllo"));
        assert_eq!(TextEncoding::Utf8.decode(&[0xff, 0x61]), None);
        assert_eq!(
            TextEncoding::Utf8Lossy.decode(&[0xff, 0x61]).as_deref(),
            Some("\u{fffd}a")
        );
    }

    #[test]
    fn test_utf16_both_orders() {
        assert_eq!(TextEncoding::Utf16Le.decode(&[0x6f, 0x00, 0x6b, 0x00]).as_deref(), Some("ok"));
        assert_eq!(TextEncoding::Utf16Be.decode(&[0x00, 0x6f, 0x00, 0x6b]).as_deref(), Some("ok"));
        assert_eq!(TextEncoding::Utf16Le.decode(&[0x6f]), None);
    }

    #[test]
    fn test_latin1_and_ascii() {
        assert_eq!(TextEncoding::Latin1.decode(&[0x63, 0xe9]).as_deref(), Some("cé"));
        assert_eq!(TextEncoding::Ascii.decode(b"plain").as_deref(), Some("plain"));
        assert_eq!(TextEncoding::Ascii.decode(&[0xe9]), None);
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!("UTF-8".parse::<TextEncoding>(), Ok(TextEncoding::Utf8));
        assert_eq!("latin1".parse::<TextEncoding>(), Ok(TextEncoding::Latin1));
        assert!("ebcdic".parse::<TextEncoding>().is_err());
        assert_eq!(TextEncoding::Utf16Be.to_string(), "utf-16be");
    }
}
