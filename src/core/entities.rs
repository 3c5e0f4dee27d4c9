//! XML Entity Handling
//!
//! - The entity table: name to replacement text, seeded with the five
//!   predefined entities (&lt; &gt; &amp; &quot; &apos;)
//! - Numeric character references: &#123; &#x7B;
//! - General entity declarations harvested from an internal DTD subset,
//!   following internal parameter entities
//! - Escaping of text and attribute values for output
//!
//! Escaping uses Cow for zero-copy when nothing needs to change.

use memchr::{memchr, memchr3};
use std::borrow::Cow;
use std::collections::HashMap;

/// Mapping from entity name to replacement text
#[derive(Debug, Clone)]
pub struct EntityTable {
    map: HashMap<String, String>,
}

impl EntityTable {
    /// Create a table holding the predefined entities
    pub fn new() -> Self {
        let map = [("amp", "&"), ("apos", "'"), ("gt", ">"), ("lt", "<"), ("quot", "\"")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EntityTable { map }
    }

    /// Define (or redefine) an entity
    pub fn define(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.map.insert(name.into(), text.into());
    }

    /// Define an entity unless it already exists; returns true if added
    pub fn define_if_absent(&mut self, name: &str, text: &str) -> bool {
        if self.map.contains_key(name) {
            return false;
        }
        self.map.insert(name.to_string(), text.to_string());
        true
    }

    /// Replacement text for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for EntityTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode the body of a numeric character reference (the part between
/// `&#` and `;`, e.g. `65` or `x41`).
///
/// Returns None if the number is malformed or not an XML character.
pub fn decode_char_ref(body: &str) -> Option<char> {
    let codepoint = match body.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => body.parse::<u32>().ok()?,
    };
    if !is_valid_xml_char(codepoint) {
        return None;
    }
    char::from_u32(codepoint)
}

/// Check if a code point is a valid XML 1.0 Char
/// Char ::= #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]
#[inline]
pub fn is_valid_xml_char(codepoint: u32) -> bool {
    matches!(codepoint,
        0x9 | 0xA | 0xD |
        0x20..=0xD7FF |
        0xE000..=0xFFFD |
        0x10000..=0x10FFFF
    )
}

/// Parameter entity references are followed at most this deep
const MAX_PE_DEPTH: usize = 8;

/// Collect internal general entity declarations from DOCTYPE content.
///
/// Only `<!ENTITY name "literal">` (either quote) is returned; external
/// (SYSTEM/PUBLIC) entities are skipped. Internal parameter entities are
/// recorded and their `%name;` references are expanded, both inside entity
/// literals and between declarations, where the expansion is scanned for
/// further declarations. Character references inside a literal are
/// expanded, general entity references are kept.
pub fn internal_entity_decls(doctype: &str) -> Vec<(String, String)> {
    let mut subset = Subset::default();
    subset.walk(doctype, 0);
    subset.general
}

#[derive(Default)]
struct Subset {
    params: HashMap<String, String>,
    general: Vec<(String, String)>,
}

impl Subset {
    fn walk(&mut self, text: &str, level: usize) {
        let mut rest = text;
        while let Some(pos) = rest.find(['<', '%']) {
            let tail = &rest[pos..];
            if let Some(body) = tail.strip_prefix("<!--") {
                rest = body.find("-->").map_or("", |end| &body[end + 3..]);
            } else if let Some(body) = tail.strip_prefix("<!ENTITY") {
                rest = self.entity_decl(body);
            } else if let Some(body) = tail.strip_prefix('<') {
                rest = skip_markup(body);
            } else {
                let body = &tail[1..];
                match body.find(';').filter(|&end| is_reference_name(&body[..end])) {
                    Some(end) => {
                        let expansion = self.params.get(&body[..end]).filter(|_| level < MAX_PE_DEPTH).cloned();
                        if let Some(text) = expansion {
                            self.walk(&text, level + 1);
                        }
                        rest = &body[end + 1..];
                    }
                    None => rest = body,
                }
            }
        }
    }

    /// precondition: `<!ENTITY` consumed; returns the text after the closing `>`
    fn entity_decl<'t>(&mut self, body: &'t str) -> &'t str {
        let mut rest = body.trim_start();
        let param = match rest.strip_prefix('%') {
            Some(after) if after.starts_with(char::is_whitespace) => {
                rest = after.trim_start();
                true
            }
            _ => false,
        };
        let name_end = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '>'))
            .unwrap_or(rest.len());
        let name = &rest[..name_end];
        let rest = rest[name_end..].trim_start();

        let Some(quote) = rest.chars().next().filter(|&c| c == '"' || c == '\'') else {
            return skip_markup(rest);
        };
        let literal = &rest[1..];
        let Some(close) = memchr(quote as u8, literal.as_bytes()) else {
            return "";
        };
        if !name.is_empty() {
            let value = self.expand_literal(&literal[..close]);
            if param {
                self.params.entry(name.to_string()).or_insert(value);
            } else {
                self.general.push((name.to_string(), value));
            }
        }
        skip_markup(&literal[close + 1..])
    }

    /// Expand `&#N;` and `%name;` inside an entity literal; the result is
    /// not rescanned
    fn expand_literal(&self, literal: &str) -> String {
        let mut out = String::with_capacity(literal.len());
        let mut rest = literal;
        while let Some(pos) = rest.find(['&', '%']) {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            let Some(end) = tail[1..].find(';') else {
                out.push_str(tail);
                return out;
            };
            let (body, after) = (&tail[1..end + 1], &tail[end + 2..]);
            let replacement = if tail.starts_with('&') {
                body.strip_prefix('#').and_then(decode_char_ref).map(String::from)
            } else {
                self.params.get(body).cloned()
            };
            match replacement {
                Some(text) => {
                    out.push_str(&text);
                    rest = after;
                }
                None => {
                    out.push_str(&tail[..1]);
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[inline]
fn is_reference_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(|c: char| c.is_whitespace() || c == '<' || c == '>')
}

/// Text after the next `>` outside quotes
fn skip_markup(text: &str) -> &str {
    let mut quote = None;
    for (i, c) in text.char_indices() {
        match (c, quote) {
            ('"' | '\'', None) => quote = Some(c),
            (c, Some(q)) if c == q => quote = None,
            ('>', None) => return &text[i + 1..],
            _ => {}
        }
    }
    ""
}

/// Escape text for output.
///
/// `quote` is the attribute delimiter, or None for element content. Inside
/// attributes the delimiter and `\n` `\r` `\t` become character references.
/// Characters outside printable ASCII become character references unless
/// `unicode` is set; control characters always do.
pub fn escape(input: &str, quote: Option<char>, unicode: bool) -> Cow<'_, str> {
    let bytes = input.as_bytes();
    let needs_escape = memchr3(b'&', b'<', b'>', bytes).is_some()
        || quote.is_some_and(|q| memchr(q as u8, bytes).is_some())
        || bytes.iter().any(|&b| {
            (b < 0x20 && !(quote.is_none() && matches!(b, b'\n' | b'\r' | b'\t'))) || (!unicode && b >= 0x7F)
        });
    if !needs_escape {
        return Cow::Borrowed(input);
    }

    let mut result = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        match c {
            '\n' | '\r' | '\t' if quote.is_none() => result.push(c),
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' if quote == Some('"') => result.push_str("&quot;"),
            '\'' if quote == Some('\'') => result.push_str("&apos;"),
            c if c >= ' ' && ((c as u32) < 0x7F || unicode) => result.push(c),
            c => {
                result.push_str("&#");
                result.push_str(&(c as u32).to_string());
                result.push(';');
            }
        }
    }
    Cow::Owned(result)
}
