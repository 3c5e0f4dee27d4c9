//! XML Attributes
//!
//! The attribute record produced by the tokenizer and qualified-name
//! splitting shared by the reader and writer.

use memchr::memchr;

/// A parsed XML attribute
///
/// Before namespace resolution `name` holds the raw qualified name and
/// `namespace` is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Resolved namespace URI ("" when none)
    pub namespace: String,
    /// Namespace prefix (before colon), if any
    pub prefix: Option<String>,
    /// Local name (after colon)
    pub name: String,
    /// Attribute value (entities decoded, whitespace normalized)
    pub value: String,
}

impl Attribute {
    /// Create an unresolved attribute from its raw name
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Attribute {
            namespace: String::new(),
            prefix: None,
            name: name.into(),
            value: value.into(),
        }
    }

    /// Name as written in the document (`prefix:name` or `name`)
    pub fn qname(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.name),
            None => self.name.clone(),
        }
    }
}

/// Split a name into prefix and local name at the first colon
#[inline]
pub fn split_name(name: &str) -> (Option<&str>, &str) {
    if let Some(colon_pos) = memchr(b':', name.as_bytes()) {
        (Some(&name[..colon_pos]), &name[colon_pos + 1..])
    } else {
        (None, name)
    }
}
