//! XML Encoding Detection and Conversion
//!
//! Picks a character decoding from the first bytes of a stream (byte order
//! marks, the 4-byte signatures of `<` / `<?` in the wide encodings, or the
//! `encoding` pseudo-attribute of an ASCII-compatible XML declaration) and
//! converts between bytes and chars one character at a time.

use memchr::memmem;
use std::io::{self, Read};

/// Character encodings understood by the reader and the serializer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
    Latin1,
    Ascii,
}

impl Encoding {
    /// Look up an encoding by its (case-insensitive) label
    pub fn for_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_uppercase();
        let encoding = match label.as_str() {
            "UTF-8" | "UTF8" => Encoding::Utf8,
            "UTF-16" | "UTF16" | "UTF-16BE" | "UTF16BE" => Encoding::Utf16Be,
            "UTF-16LE" | "UTF16LE" => Encoding::Utf16Le,
            "UTF-32" | "UTF32" | "UTF-32BE" | "UTF32BE" => Encoding::Utf32Be,
            "UTF-32LE" | "UTF32LE" => Encoding::Utf32Le,
            "ISO-8859-1" | "ISO8859-1" | "ISO_8859-1" | "LATIN1" | "L1" => Encoding::Latin1,
            "US-ASCII" | "ASCII" => Encoding::Ascii,
            _ => return None,
        };
        Some(encoding)
    }

    /// Canonical label
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf16Le => "UTF-16LE",
            Encoding::Utf16Be => "UTF-16BE",
            Encoding::Utf32Le => "UTF-32LE",
            Encoding::Utf32Be => "UTF-32BE",
            Encoding::Latin1 => "ISO-8859-1",
            Encoding::Ascii => "US-ASCII",
        }
    }

    /// True for the encodings that can represent every character
    pub fn is_unicode(&self) -> bool {
        matches!(
            self,
            Encoding::Utf8 | Encoding::Utf16Le | Encoding::Utf16Be | Encoding::Utf32Le | Encoding::Utf32Be
        )
    }

    /// Decode one character, pulling bytes from `next` as needed.
    ///
    /// Returns `Ok(None)` at a clean end of input. Never pulls more bytes
    /// than the character occupies.
    pub fn decode_char<F>(&self, mut next: F) -> io::Result<Option<char>>
    where
        F: FnMut() -> io::Result<Option<u8>>,
    {
        match self {
            Encoding::Utf8 => {
                let Some(b0) = next()? else {
                    return Ok(None);
                };
                let (width, init) = match b0 {
                    0x00..=0x7F => return Ok(Some(b0 as char)),
                    0xC2..=0xDF => (2, (b0 & 0x1F) as u32),
                    0xE0..=0xEF => (3, (b0 & 0x0F) as u32),
                    0xF0..=0xF4 => (4, (b0 & 0x07) as u32),
                    _ => return Err(invalid("Invalid UTF-8 encoding: bad start byte")),
                };
                let mut cp = init;
                for _ in 1..width {
                    let b = next()?.ok_or_else(truncated)?;
                    if b & 0xC0 != 0x80 {
                        return Err(invalid("Invalid UTF-8 encoding: bad continuation byte"));
                    }
                    cp = (cp << 6) | (b & 0x3F) as u32;
                }
                let overlong = (width == 3 && cp < 0x800) || (width == 4 && cp < 0x10000);
                if overlong {
                    return Err(invalid("Invalid UTF-8 encoding: overlong sequence"));
                }
                char::from_u32(cp)
                    .map(Some)
                    .ok_or_else(|| invalid("Invalid UTF-8 encoding: surrogate code point"))
            }
            Encoding::Utf16Le | Encoding::Utf16Be => {
                let little = *self == Encoding::Utf16Le;
                let Some(hi) = read_unit16(&mut next, little)? else {
                    return Ok(None);
                };
                let cp = match hi {
                    0xD800..=0xDBFF => {
                        let lo = read_unit16(&mut next, little)?.ok_or_else(truncated)?;
                        if !(0xDC00..=0xDFFF).contains(&lo) {
                            return Err(invalid("Invalid UTF-16: unpaired high surrogate"));
                        }
                        0x10000 + (((hi as u32) - 0xD800) << 10) + ((lo as u32) - 0xDC00)
                    }
                    0xDC00..=0xDFFF => return Err(invalid("Invalid UTF-16: unpaired low surrogate")),
                    _ => hi as u32,
                };
                char::from_u32(cp)
                    .map(Some)
                    .ok_or_else(|| invalid("Invalid UTF-16: bad code point"))
            }
            Encoding::Utf32Le | Encoding::Utf32Be => {
                let Some(b0) = next()? else {
                    return Ok(None);
                };
                let mut bytes = [b0, 0, 0, 0];
                for slot in bytes.iter_mut().skip(1) {
                    *slot = next()?.ok_or_else(truncated)?;
                }
                let cp = if *self == Encoding::Utf32Le {
                    u32::from_le_bytes(bytes)
                } else {
                    u32::from_be_bytes(bytes)
                };
                char::from_u32(cp)
                    .map(Some)
                    .ok_or_else(|| invalid("Invalid UTF-32: bad code point"))
            }
            Encoding::Latin1 => Ok(next()?.map(|b| b as char)),
            Encoding::Ascii => match next()? {
                Some(b) if b < 0x80 => Ok(Some(b as char)),
                Some(_) => Err(invalid("Invalid US-ASCII: byte above 0x7F")),
                None => Ok(None),
            },
        }
    }

    /// Append the encoded form of `s` to `out`
    pub fn encode(&self, s: &str, out: &mut Vec<u8>) -> io::Result<()> {
        match self {
            Encoding::Utf8 => out.extend_from_slice(s.as_bytes()),
            Encoding::Utf16Le => s.encode_utf16().for_each(|u| out.extend_from_slice(&u.to_le_bytes())),
            Encoding::Utf16Be => s.encode_utf16().for_each(|u| out.extend_from_slice(&u.to_be_bytes())),
            Encoding::Utf32Le => s.chars().for_each(|c| out.extend_from_slice(&(c as u32).to_le_bytes())),
            Encoding::Utf32Be => s.chars().for_each(|c| out.extend_from_slice(&(c as u32).to_be_bytes())),
            Encoding::Latin1 | Encoding::Ascii => {
                let limit = if *self == Encoding::Latin1 { 0xFF } else { 0x7F };
                for c in s.chars() {
                    if c as u32 > limit {
                        return Err(invalid(format!("character U+{:04X} not representable in {}", c as u32, self.name())));
                    }
                    out.push(c as u8);
                }
            }
        }
        Ok(())
    }
}

/// Outcome of sniffing the head of a byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sniffed {
    pub encoding: Encoding,
    /// Encoding label found in the XML declaration, if any
    pub declared: Option<String>,
    /// Bytes consumed while sniffing that still belong to the document
    pub replay: Vec<u8>,
}

/// Choose a decoding for `reader`.
///
/// When `label` is given it is used as-is and nothing is read. Otherwise the
/// first four bytes are inspected; bytes that are not part of a byte order
/// mark are returned in `replay` so the decoder sees them again.
pub fn sniff<R: Read>(reader: &mut R, label: Option<&str>) -> io::Result<Sniffed> {
    if let Some(label) = label {
        let encoding = Encoding::for_label(label).ok_or_else(|| unsupported(label))?;
        return Ok(Sniffed {
            encoding,
            declared: None,
            replay: Vec::new(),
        });
    }

    let mut head = Vec::with_capacity(4);
    while head.len() < 4 {
        match read_byte(reader)? {
            Some(b) => head.push(b),
            None => break,
        }
    }
    if head.len() < 4 {
        return Ok(Sniffed {
            encoding: Encoding::Utf8,
            declared: None,
            replay: head,
        });
    }

    let chk = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
    let (encoding, replay_from) = match chk {
        0x0000_FEFF => (Encoding::Utf32Be, 4),
        0xFFFE_0000 => (Encoding::Utf32Le, 4),
        0x0000_003C => (Encoding::Utf32Be, 0),
        0x3C00_0000 => (Encoding::Utf32Le, 0),
        0x003C_003F => (Encoding::Utf16Be, 0),
        0x3C00_3F00 => (Encoding::Utf16Le, 0),
        0x3C3F_786D => return sniff_declaration(reader, head),
        _ if chk & 0xFFFF_0000 == 0xFEFF_0000 => (Encoding::Utf16Be, 2),
        _ if chk & 0xFFFF_0000 == 0xFFFE_0000 => (Encoding::Utf16Le, 2),
        _ if chk & 0xFFFF_FF00 == 0xEFBB_BF00 => (Encoding::Utf8, 3),
        _ => (Encoding::Utf8, 0),
    };
    Ok(Sniffed {
        encoding,
        declared: None,
        replay: head.split_off(replay_from),
    })
}

/// `<?xm` seen in an ASCII-compatible layout: scan up to the first `>` for an
/// `encoding` pseudo-attribute.
fn sniff_declaration<R: Read>(reader: &mut R, mut head: Vec<u8>) -> io::Result<Sniffed> {
    while let Some(b) = read_byte(reader)? {
        head.push(b);
        if b == b'>' {
            break;
        }
    }

    let declared = memmem::find(&head, b"encoding").and_then(|start| {
        let rest = &head[start + b"encoding".len()..];
        let open = rest.iter().position(|&b| b == b'"' || b == b'\'')?;
        let quote = rest[open];
        let value = &rest[open + 1..];
        let close = value.iter().position(|&b| b == quote)?;
        Some(String::from_utf8_lossy(&value[..close]).into_owned())
    });

    let encoding = match &declared {
        Some(label) => Encoding::for_label(label).ok_or_else(|| unsupported(label))?,
        None => Encoding::Utf8,
    };
    Ok(Sniffed {
        encoding,
        declared,
        replay: head,
    })
}

/// Read a single byte, retrying on interruption
pub(crate) fn read_byte<R: Read>(reader: &mut R) -> io::Result<Option<u8>> {
    let mut buf = [0u8; 1];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

fn read_unit16<F>(next: &mut F, little: bool) -> io::Result<Option<u16>>
where
    F: FnMut() -> io::Result<Option<u8>>,
{
    let Some(b0) = next()? else {
        return Ok(None);
    };
    let b1 = next()?.ok_or_else(truncated)?;
    Ok(Some(if little {
        u16::from_le_bytes([b0, b1])
    } else {
        u16::from_be_bytes([b0, b1])
    }))
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn truncated() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "truncated character sequence")
}

fn unsupported(label: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("unsupported encoding: {label}"))
}
