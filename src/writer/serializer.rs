//! XML Serializer
//!
//! Mirror image of the pull parser: a sequence of write calls becomes
//! well-formed XML text. A start tag stays open ("pending") until the next
//! write, so attributes and namespace declarations can still be added;
//! closing a pending tag produces the ` />` form.

use crate::core::encoding::Encoding;
use crate::core::entities::escape;
use crate::core::namespace::{ns, Binding, NamespaceStack};
use crate::error::{ErrorKind, Result, XmlError};
use std::io::Write;
use tracing::{debug, trace};

pub const FEATURE_INDENT_OUTPUT: &str = "http://xmlpull.org/v1/doc/features.html#indent-output";

/// Write API of a serializer
pub trait XmlSerializer {
    /// Write the XML declaration
    fn start_document(&mut self, encoding: Option<&str>, standalone: Option<bool>) -> Result<()>;

    /// Open an element; `namespace` None writes the name unprefixed
    fn start_tag(&mut self, namespace: Option<&str>, name: &str) -> Result<&mut Self>;

    /// Add an attribute to the pending start tag
    fn attribute(&mut self, namespace: Option<&str>, name: &str, value: &str) -> Result<&mut Self>;

    fn text(&mut self, text: &str) -> Result<&mut Self>;

    fn ignorable_whitespace(&mut self, text: &str) -> Result<()>;

    fn cdsect(&mut self, data: &str) -> Result<()>;

    fn comment(&mut self, comment: &str) -> Result<()>;

    fn entity_ref(&mut self, name: &str) -> Result<()>;

    fn processing_instruction(&mut self, pi: &str) -> Result<()>;

    fn docdecl(&mut self, dd: &str) -> Result<()>;

    /// Bind `prefix` to `namespace` for the next start tag
    fn set_prefix(&mut self, prefix: Option<&str>, namespace: Option<&str>) -> Result<()>;

    /// Prefix in scope for `namespace`, minting one when `create` is set
    fn prefix_for(&mut self, namespace: &str, create: bool) -> Result<Option<String>>;

    /// Close the innermost element; must match its start tag exactly
    fn end_tag(&mut self, namespace: Option<&str>, name: &str) -> Result<&mut Self>;

    /// Close every open element and flush
    fn end_document(&mut self) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    fn set_feature(&mut self, name: &str, value: bool) -> Result<()>;

    fn feature(&self, name: &str) -> bool;

    /// Number of open elements, counting a pending start tag
    fn depth(&self) -> usize;

    /// Local name of the innermost open element
    fn name(&self) -> Option<&str>;

    /// Namespace of the innermost open element
    fn namespace(&self) -> Option<&str>;
}

#[derive(Debug, Clone)]
struct Frame {
    namespace: Option<String>,
    prefix: String,
    name: String,
}

/// XML serializer writing to any [`Write`] sink
pub struct Serializer<W: Write> {
    out: Option<W>,
    encoding: Encoding,
    encoding_label: Option<String>,
    /// Characters outside ASCII pass through unescaped
    unicode: bool,
    written: bool,
    pending: bool,
    auto: usize,
    depth: usize,
    elements: Vec<Frame>,
    ns: NamespaceStack,
    indent: Vec<bool>,
    scratch: Vec<u8>,
}

impl<W: Write> Serializer<W> {
    /// Create a serializer with no output attached
    pub fn new() -> Self {
        Serializer {
            out: None,
            encoding: Encoding::Utf8,
            encoding_label: None,
            unicode: false,
            written: false,
            pending: false,
            auto: 0,
            depth: 0,
            elements: Vec::with_capacity(16),
            ns: NamespaceStack::new(),
            indent: vec![false; 4],
            scratch: Vec::new(),
        }
    }

    /// Create a serializer writing to `out`
    pub fn with_output(out: W, encoding: Option<&str>) -> Result<Self> {
        let mut serializer = Self::new();
        serializer.set_output(out, encoding)?;
        Ok(serializer)
    }

    /// Attach a sink, resetting all state.
    ///
    /// Without `encoding` the output is UTF-8 but non-ASCII characters are
    /// still written as character references.
    pub fn set_output(&mut self, out: W, encoding: Option<&str>) -> Result<()> {
        let (encoding_kind, unicode) = match encoding {
            Some(label) => {
                let kind = Encoding::for_label(label).ok_or_else(|| {
                    XmlError::serialize(ErrorKind::UnsupportedEncoding, format!("unsupported encoding: {label}"))
                })?;
                (kind, label.to_ascii_lowercase().starts_with("utf"))
            }
            None => (Encoding::Utf8, false),
        };

        self.out = Some(out);
        self.encoding = encoding_kind;
        self.encoding_label = encoding.map(str::to_string);
        self.unicode = unicode;
        self.written = false;
        self.pending = false;
        self.auto = 0;
        self.depth = 0;
        self.elements.clear();
        self.indent = vec![false; 4];

        self.ns.clear();
        self.ns.push_at(0, "", "");
        self.ns.push_at(0, "xml", ns::XML);
        self.ns.set_count(1, 2);

        debug!(encoding = self.encoding.name(), unicode, "output attached");
        Ok(())
    }

    /// Flush and detach the sink
    pub fn take_output(&mut self) -> Result<W> {
        self.check(false)?;
        let mut out = self
            .out
            .take()
            .ok_or_else(|| XmlError::serialize(ErrorKind::NoOutput, "no output specified"))?;
        out.flush()?;
        Ok(out)
    }

    fn write(&mut self, s: &str) -> Result<()> {
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| XmlError::serialize(ErrorKind::NoOutput, "no output specified"))?;
        self.written = true;
        match self.encoding {
            Encoding::Utf8 => out.write_all(s.as_bytes())?,
            encoding => {
                self.scratch.clear();
                encoding.encode(s, &mut self.scratch)?;
                out.write_all(&self.scratch)?;
            }
        }
        Ok(())
    }

    fn write_escaped(&mut self, s: &str, quote: Option<char>) -> Result<()> {
        let escaped = escape(s, quote, self.unicode);
        self.write(&escaped)
    }

    fn write_indent(&mut self, depth: usize) -> Result<()> {
        let mut line = String::with_capacity(2 + depth * 2);
        line.push_str("\r\n");
        for _ in 0..depth {
            line.push_str("  ");
        }
        self.write(&line)
    }

    #[inline]
    fn indent_at(&self, depth: usize) -> bool {
        self.indent.get(depth).copied().unwrap_or(false)
    }

    fn set_indent(&mut self, depth: usize, value: bool) {
        if self.indent.len() <= depth {
            self.indent.resize(depth + 4, false);
        }
        self.indent[depth] = value;
    }

    /// Finish a pending start tag: write its namespace declarations and
    /// `>` (or ` />` when `close`)
    fn check(&mut self, close: bool) -> Result<()> {
        if !self.pending {
            return Ok(());
        }
        self.depth += 1;
        self.pending = false;
        let inherited = self.indent_at(self.depth - 1);
        self.set_indent(self.depth, inherited);

        let declared: Vec<Binding> = self.ns.declared_at(self.depth).to_vec();
        let in_no_namespace = self.elements.last().is_some_and(|f| f.namespace.as_deref() == Some(""));
        if in_no_namespace && declared.iter().any(|b| b.prefix.is_empty() && !b.uri.is_empty()) {
            return Err(XmlError::serialize(
                ErrorKind::IllegalDefaultNamespace,
                "Cannot set default namespace for elements in no namespace",
            ));
        }

        for binding in &declared {
            self.write(" xmlns")?;
            if !binding.prefix.is_empty() {
                self.write(":")?;
                self.write(&binding.prefix)?;
            }
            self.write("=\"")?;
            self.write_escaped(&binding.uri, Some('"'))?;
            self.write("\"")?;
        }

        let count = self.ns.count(self.depth);
        self.ns.set_count(self.depth + 1, count);
        self.write(if close { " />" } else { ">" })
    }

    fn get_prefix(&mut self, namespace: &str, include_default: bool, create: bool) -> Result<Option<String>> {
        let visible = self.ns.visible(self.depth + 1);
        for (i, binding) in visible.iter().enumerate().rev() {
            if binding.uri != namespace || (!include_default && binding.prefix.is_empty()) {
                continue;
            }
            // a later binding of the same prefix hides this one
            if !visible[i + 1..].iter().any(|later| later.prefix == binding.prefix) {
                return Ok(Some(binding.prefix.clone()));
            }
        }

        if !create {
            return Ok(None);
        }

        let prefix = if namespace.is_empty() {
            String::new()
        } else {
            loop {
                let candidate = format!("n{}", self.auto);
                self.auto += 1;
                if !visible.iter().any(|b| b.prefix == candidate) {
                    break candidate;
                }
            }
        };

        let pending = self.pending;
        self.pending = false;
        self.set_prefix(Some(&prefix), Some(namespace))?;
        self.pending = pending;
        Ok(Some(prefix))
    }
}

impl<W: Write> Default for Serializer<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> XmlSerializer for Serializer<W> {
    fn start_document(&mut self, encoding: Option<&str>, standalone: Option<bool>) -> Result<()> {
        if let Some(label) = encoding {
            if label.to_ascii_lowercase().starts_with("utf") {
                self.unicode = true;
            }
            if !self.written {
                if let Some(kind) = Encoding::for_label(label) {
                    self.encoding = kind;
                }
            }
            self.encoding_label = Some(label.to_string());
        }

        let mut decl = String::from("<?xml version='1.0' ");
        if let Some(label) = &self.encoding_label {
            decl.push_str(&format!("encoding='{label}' "));
        }
        if let Some(standalone) = standalone {
            decl.push_str(if standalone { "standalone='yes' " } else { "standalone='no' " });
        }
        decl.push_str("?>");
        self.write(&decl)
    }

    fn start_tag(&mut self, namespace: Option<&str>, name: &str) -> Result<&mut Self> {
        self.check(false)?;

        if self.indent_at(self.depth) {
            self.write_indent(self.depth)?;
        }

        let prefix = match namespace {
            Some(uri) => self.get_prefix(uri, true, true)?.unwrap_or_default(),
            None => String::new(),
        };

        if namespace == Some("") {
            let conflicting = self
                .ns
                .declared_at(self.depth + 1)
                .iter()
                .any(|b| b.prefix.is_empty() && !b.uri.is_empty());
            if conflicting {
                return Err(XmlError::serialize(
                    ErrorKind::IllegalDefaultNamespace,
                    "Cannot set default namespace for elements in no namespace",
                ));
            }
        }

        trace!(?namespace, name, depth = self.depth, "start tag");

        self.write("<")?;
        if !prefix.is_empty() {
            self.write(&prefix)?;
            self.write(":")?;
        }
        self.write(name)?;

        self.elements.push(Frame {
            namespace: namespace.map(str::to_string),
            prefix,
            name: name.to_string(),
        });
        self.pending = true;
        Ok(self)
    }

    fn attribute(&mut self, namespace: Option<&str>, name: &str, value: &str) -> Result<&mut Self> {
        if !self.pending {
            return Err(XmlError::serialize(ErrorKind::IllegalState, "illegal position for attribute"));
        }

        let namespace = namespace.unwrap_or("");
        let prefix = if namespace.is_empty() {
            String::new()
        } else {
            self.get_prefix(namespace, false, true)?.unwrap_or_default()
        };

        self.write(" ")?;
        if !prefix.is_empty() {
            self.write(&prefix)?;
            self.write(":")?;
        }
        self.write(name)?;

        let (quote, delimiter) = if value.contains('"') { ('\'', "'") } else { ('"', "\"") };
        self.write("=")?;
        self.write(delimiter)?;
        self.write_escaped(value, Some(quote))?;
        self.write(delimiter)?;
        Ok(self)
    }

    fn text(&mut self, text: &str) -> Result<&mut Self> {
        self.check(false)?;
        self.set_indent(self.depth, false);
        self.write_escaped(text, None)?;
        Ok(self)
    }

    fn ignorable_whitespace(&mut self, text: &str) -> Result<()> {
        self.text(text)?;
        Ok(())
    }

    fn cdsect(&mut self, data: &str) -> Result<()> {
        self.check(false)?;
        self.write("<![CDATA[")?;
        self.write(data)?;
        self.write("]]>")
    }

    fn comment(&mut self, comment: &str) -> Result<()> {
        self.check(false)?;
        self.write("<!--")?;
        self.write(comment)?;
        self.write("-->")
    }

    fn entity_ref(&mut self, name: &str) -> Result<()> {
        self.check(false)?;
        self.write("&")?;
        self.write(name)?;
        self.write(";")
    }

    fn processing_instruction(&mut self, pi: &str) -> Result<()> {
        self.check(false)?;
        self.write("<?")?;
        self.write(pi)?;
        self.write("?>")
    }

    fn docdecl(&mut self, dd: &str) -> Result<()> {
        self.check(false)?;
        self.write("<!DOCTYPE")?;
        self.write(dd)?;
        self.write(">")
    }

    fn set_prefix(&mut self, prefix: Option<&str>, namespace: Option<&str>) -> Result<()> {
        self.check(false)?;
        let prefix = prefix.unwrap_or("");
        let namespace = namespace.unwrap_or("");

        let defined = self.get_prefix(namespace, true, false)?;
        if defined.as_deref() == Some(prefix) {
            return Ok(());
        }
        self.ns.push_at(self.depth + 1, prefix, namespace);
        Ok(())
    }

    fn prefix_for(&mut self, namespace: &str, create: bool) -> Result<Option<String>> {
        self.get_prefix(namespace, false, create)
    }

    fn end_tag(&mut self, namespace: Option<&str>, name: &str) -> Result<&mut Self> {
        let matches = self
            .elements
            .last()
            .is_some_and(|f| f.namespace.as_deref() == namespace && f.name == name);
        if !matches {
            return Err(XmlError::serialize(
                ErrorKind::MismatchedEndTag,
                format!("</{{{}}}{}> does not match start", namespace.unwrap_or(""), name),
            ));
        }

        if self.pending {
            self.check(true)?;
            self.depth -= 1;
        } else {
            self.depth -= 1;
            if self.indent_at(self.depth + 1) {
                self.write_indent(self.depth)?;
            }
            let prefix = self.elements.last().map(|f| f.prefix.clone()).unwrap_or_default();
            self.write("</")?;
            if !prefix.is_empty() {
                self.write(&prefix)?;
                self.write(":")?;
            }
            self.write(name)?;
            self.write(">")?;
        }

        trace!(?namespace, name, depth = self.depth, "end tag");

        self.elements.pop();
        let count = self.ns.count(self.depth);
        self.ns.set_count(self.depth + 1, count);
        Ok(self)
    }

    fn end_document(&mut self) -> Result<()> {
        while let Some(frame) = self.elements.last().cloned() {
            self.end_tag(frame.namespace.as_deref(), &frame.name)?;
        }
        XmlSerializer::flush(self)
    }

    fn flush(&mut self) -> Result<()> {
        self.check(false)?;
        match self.out.as_mut() {
            Some(out) => Ok(out.flush()?),
            None => Err(XmlError::serialize(ErrorKind::NoOutput, "no output specified")),
        }
    }

    fn set_feature(&mut self, name: &str, value: bool) -> Result<()> {
        if name == FEATURE_INDENT_OUTPUT {
            self.set_indent(self.depth, value);
            Ok(())
        } else {
            Err(XmlError::serialize(
                ErrorKind::UnsupportedFeature,
                format!("Unsupported Feature: {name}"),
            ))
        }
    }

    fn feature(&self, name: &str) -> bool {
        name == FEATURE_INDENT_OUTPUT && self.indent_at(self.depth)
    }

    fn depth(&self) -> usize {
        if self.pending {
            self.depth + 1
        } else {
            self.depth
        }
    }

    fn name(&self) -> Option<&str> {
        self.elements.last().map(|f| f.name.as_str())
    }

    fn namespace(&self) -> Option<&str> {
        self.elements.last().and_then(|f| f.namespace.as_deref())
    }
}
