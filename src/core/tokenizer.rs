//! XML Tokenizer - State machine for XML token extraction
//!
//! One call to [`Tokenizer::step`] consumes exactly one lexical unit:
//! - Element start tags (an empty-element tag yields a deferred end tag)
//! - Element end tags
//! - Text runs
//! - Entity and character references
//! - CDATA sections, comments, processing instructions, DOCTYPE
//!
//! Coalescing into high-level events lives in the pull parser; this module
//! only knows about single tokens. In relaxed mode the first well-formedness
//! error is buffered and reported as a COMMENT token on the next step.

use super::attributes::{split_name, Attribute};
use super::entities::{decode_char_ref, internal_entity_decls, EntityTable};
use super::namespace::NamespaceStack;
use super::scanner::Scanner;
use crate::error::{ErrorKind, Result, XmlError};
use crate::reader::events::EventType;
use tracing::{debug, trace, warn};

const UNEXPECTED_EOF: &str = "Unexpected EOF";

/// Kind of the next lexical unit, decided by one or two characters of lookahead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lexeme {
    EndDocument,
    StartTag,
    EndTag,
    Text,
    EntityRef,
    /// `<?` or `<!`: PI, XML declaration, comment, CDATA or DOCTYPE
    Legacy,
}

impl Lexeme {
    /// Units that may continue a coalesced text run
    #[inline]
    pub(crate) fn is_text_like(self) -> bool {
        matches!(self, Lexeme::Text | Lexeme::EntityRef | Lexeme::Legacy)
    }
}

/// Open element, as recorded when its start tag was read
#[derive(Debug, Clone)]
struct ElementFrame {
    namespace: String,
    prefix: Option<String>,
    name: String,
    /// Name as written, matched against the end tag
    qname: String,
}

/// Low-level XML tokenizer over a [`Scanner`]
pub(crate) struct Tokenizer<'a> {
    input: Option<Scanner<'a>>,

    pub(crate) relaxed: bool,
    pub(crate) process_namespaces: bool,
    pub(crate) report_namespace_attributes: bool,
    pub(crate) process_docdecl: bool,
    roundtrip: bool,
    /// Set by `next_token`: leave entities unresolved, push PI/comment text
    pub(crate) token: bool,

    pub(crate) entities: Option<EntityTable>,
    pub(crate) ns: NamespaceStack,
    elements: Vec<ElementFrame>,
    pub(crate) depth: usize,

    pub(crate) event: EventType,
    pub(crate) txt: String,
    pub(crate) raw: String,
    pub(crate) is_whitespace: bool,
    pub(crate) namespace: Option<String>,
    pub(crate) prefix: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) degenerated: bool,
    pub(crate) attributes: Vec<Attribute>,
    /// Attributes are only reported on START_TAG
    pub(crate) attributes_active: bool,
    pub(crate) unresolved: bool,

    /// Buffered relaxed-mode error, already prefixed with "ERR: "
    error: Option<String>,
    pub(crate) error_surfaced: bool,

    pub(crate) version: Option<String>,
    pub(crate) standalone: Option<bool>,
    pub(crate) input_encoding: Option<String>,
    pub(crate) location: Option<String>,
}

impl<'a> Tokenizer<'a> {
    /// Create a detached tokenizer with namespace processing off
    pub(crate) fn new() -> Self {
        Tokenizer {
            input: None,
            relaxed: false,
            process_namespaces: false,
            report_namespace_attributes: false,
            process_docdecl: false,
            roundtrip: false,
            token: false,
            entities: None,
            ns: NamespaceStack::new(),
            elements: Vec::with_capacity(16),
            depth: 0,
            event: EventType::StartDocument,
            txt: String::with_capacity(128),
            raw: String::new(),
            is_whitespace: true,
            namespace: None,
            prefix: None,
            name: None,
            degenerated: false,
            attributes: Vec::with_capacity(8),
            attributes_active: false,
            unresolved: false,
            error: None,
            error_surfaced: false,
            version: None,
            standalone: None,
            input_encoding: None,
            location: None,
        }
    }

    /// Attach a new input, resetting all document state
    pub(crate) fn attach(&mut self, mut scanner: Scanner<'a>, encoding: Option<String>) {
        self.reset();
        scanner.set_capture(self.roundtrip);
        self.input = Some(scanner);
        self.entities = Some(EntityTable::new());
        self.input_encoding = encoding;
    }

    /// Drop the input and all document state
    pub(crate) fn detach(&mut self) {
        self.reset();
        self.input = None;
        self.entities = None;
    }

    fn reset(&mut self) {
        self.depth = 0;
        self.elements.clear();
        self.ns.clear();
        self.event = EventType::StartDocument;
        self.txt.clear();
        self.raw.clear();
        self.is_whitespace = true;
        self.namespace = None;
        self.prefix = None;
        self.name = None;
        self.degenerated = false;
        self.attributes.clear();
        self.attributes_active = false;
        self.unresolved = false;
        self.error = None;
        self.error_surfaced = false;
        self.token = false;
        self.version = None;
        self.standalone = None;
        self.input_encoding = None;
    }

    pub(crate) fn roundtrip(&self) -> bool {
        self.roundtrip
    }

    /// Toggle recording of the literal markup of each token
    pub(crate) fn set_roundtrip(&mut self, enabled: bool) {
        self.roundtrip = enabled;
        if let Some(scanner) = self.input.as_mut() {
            scanner.set_capture(enabled);
        }
    }

    /// Clear the text buffer before a new event
    pub(crate) fn begin_event(&mut self) {
        self.txt.clear();
        self.raw.clear();
        self.is_whitespace = true;
    }

    pub(crate) fn line(&self) -> u32 {
        self.input.as_ref().map_or(1, Scanner::line)
    }

    pub(crate) fn column(&self) -> u32 {
        self.input.as_ref().map_or(0, Scanner::column)
    }

    // ------------------------------------------------------------------
    // errors

    /// Build a fatal reader error at the current position
    pub(crate) fn exception(&self, kind: ErrorKind, message: impl Into<String>) -> XmlError {
        XmlError::parse(kind, message, self.line(), self.column(), self.position_description())
    }

    /// Raise in strict mode; buffer the first error in relaxed mode
    fn error(&mut self, kind: ErrorKind, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        if self.relaxed {
            if self.error.is_none() {
                warn!(?kind, line = self.line(), column = self.column(), "{}", message);
                self.error = Some(format!("ERR: {message}"));
            }
            Ok(())
        } else {
            Err(self.exception(kind, message))
        }
    }

    /// True if a relaxed-mode error is waiting to be reported
    #[inline]
    pub(crate) fn has_pending_error(&self) -> bool {
        self.error.is_some()
    }

    // ------------------------------------------------------------------
    // text accessors shared with the pull parser

    /// Text of the current event
    pub(crate) fn text(&self) -> Option<&str> {
        match self.event {
            EventType::StartDocument | EventType::EndDocument => None,
            EventType::StartTag | EventType::EndTag => self.roundtrip.then_some(self.raw.as_str()),
            EventType::EntityRef if self.unresolved => self.name.as_deref(),
            _ => Some(&self.txt),
        }
    }

    /// Describe the current event and position, e.g. `START_TAG <a x='1'>@1:8`
    pub(crate) fn position_description(&self) -> String {
        let mut buf = String::from(self.event.name());
        buf.push(' ');

        match self.event {
            EventType::StartTag | EventType::EndTag => {
                if self.degenerated {
                    buf.push_str("(empty) ");
                }
                buf.push('<');
                if self.event == EventType::EndTag {
                    buf.push('/');
                }
                if let Some(prefix) = &self.prefix {
                    buf.push_str(&format!("{{{}}}{}:", self.namespace.as_deref().unwrap_or(""), prefix));
                }
                buf.push_str(self.name.as_deref().unwrap_or(""));
                if self.attributes_active {
                    for attr in &self.attributes {
                        buf.push(' ');
                        if let Some(prefix) = &attr.prefix {
                            buf.push_str(&format!("{{{}}}{}:", attr.namespace, prefix));
                        }
                        buf.push_str(&format!("{}='{}'", attr.name, attr.value));
                    }
                }
                buf.push('>');
            }
            EventType::IgnorableWhitespace | EventType::StartDocument | EventType::EndDocument => {}
            EventType::Text if self.is_whitespace => buf.push_str("(whitespace)"),
            EventType::Text => match self.txt.char_indices().nth(16) {
                Some((cut, _)) => {
                    buf.push_str(&self.txt[..cut]);
                    buf.push_str("...");
                }
                None => buf.push_str(&self.txt),
            },
            _ => buf.push_str(self.text().unwrap_or("")),
        }

        buf.push_str(&format!("@{}:{}", self.line(), self.column()));
        if let Some(location) = &self.location {
            buf.push_str(" in ");
            buf.push_str(location);
        }
        buf
    }

    // ------------------------------------------------------------------
    // character level

    fn scanner(&mut self) -> Result<&mut Scanner<'a>> {
        self.input
            .as_mut()
            .ok_or_else(|| XmlError::parse(ErrorKind::NoInput, "No Input specified", 1, 0, String::new()))
    }

    #[inline]
    fn peek(&mut self, pos: usize) -> Result<Option<char>> {
        Ok(self.scanner()?.peek(pos)?)
    }

    #[inline]
    fn read(&mut self) -> Result<Option<char>> {
        Ok(self.scanner()?.read()?)
    }

    /// Consume one character, reporting an error if it is not `expected`
    fn read_expected(&mut self, expected: char) -> Result<()> {
        let actual = self.read()?;
        if actual != Some(expected) {
            let (kind, found) = match actual {
                Some(c) => (ErrorKind::MalformedTag, c.to_string()),
                None => (ErrorKind::UnexpectedEof, "EOF".to_string()),
            };
            self.error(kind, format!("expected: '{expected}' actual: '{found}'"))?;
        }
        Ok(())
    }

    #[inline]
    fn push(&mut self, c: char) {
        self.is_whitespace &= c <= ' ';
        self.txt.push(c);
    }

    /// Skip whitespace (anything up to and including ' ')
    fn skip(&mut self) -> Result<()> {
        while let Some(c) = self.peek(0)? {
            if c > ' ' {
                break;
            }
            self.read()?;
        }
        Ok(())
    }

    pub(crate) fn peek_type(&mut self) -> Result<Lexeme> {
        Ok(match self.peek(0)? {
            None => Lexeme::EndDocument,
            Some('&') => Lexeme::EntityRef,
            Some('<') => match self.peek(1)? {
                Some('/') => Lexeme::EndTag,
                Some('?') | Some('!') => Lexeme::Legacy,
                _ => Lexeme::StartTag,
            },
            Some(_) => Lexeme::Text,
        })
    }

    // ------------------------------------------------------------------
    // token level

    /// Produce exactly one token and record its literal markup
    pub(crate) fn step(&mut self) -> Result<EventType> {
        self.next_impl()?;

        if self.roundtrip {
            let captured = self
                .input
                .as_mut()
                .and_then(Scanner::take_capture)
                .unwrap_or_default();
            match self.event {
                EventType::StartTag | EventType::EndTag | EventType::EndDocument => self.raw = captured,
                _ => self.raw.push_str(&captured),
            }
        }

        trace!(
            "Token {:?} depth {} at {}:{}",
            self.event,
            self.depth,
            self.line(),
            self.column()
        );
        Ok(self.event)
    }

    fn next_impl(&mut self) -> Result<()> {
        if self.input.is_none() {
            return Err(self.exception(ErrorKind::NoInput, "No Input specified"));
        }
        if self.event == EventType::EndDocument {
            return Err(self.exception(ErrorKind::PastEndDocument, "already at END_DOCUMENT"));
        }
        self.error_surfaced = false;

        loop {
            self.attributes.clear();
            self.attributes_active = false;
            self.unresolved = false;

            // the deferred end tag of <x/> comes before any buffered error
            if self.degenerated {
                self.degenerated = false;
                self.event = EventType::EndTag;
                self.close_element();
                return Ok(());
            }

            if let Some(error) = self.error.take() {
                for c in error.chars() {
                    self.push(c);
                }
                self.event = EventType::Comment;
                self.error_surfaced = true;
                return Ok(());
            }

            self.prefix = None;
            self.name = None;
            self.namespace = None;

            match self.peek_type()? {
                Lexeme::EntityRef => {
                    self.event = EventType::EntityRef;
                    return self.push_entity(false);
                }
                Lexeme::StartTag => {
                    self.event = EventType::StartTag;
                    return self.parse_start_tag(false);
                }
                Lexeme::EndTag => {
                    self.event = EventType::EndTag;
                    return self.parse_end_tag();
                }
                Lexeme::EndDocument => {
                    self.event = EventType::EndDocument;
                    return Ok(());
                }
                Lexeme::Text => {
                    self.event = EventType::Text;
                    let resolve = !self.token;
                    self.push_text('<', resolve, false)?;
                    if self.depth == 0 && self.is_whitespace {
                        self.event = EventType::IgnorableWhitespace;
                    }
                    return Ok(());
                }
                Lexeme::Legacy => {
                    let push = self.token;
                    if let Some(kind) = self.parse_legacy(push)? {
                        self.event = kind;
                        return Ok(());
                    }
                    // XML declaration: no event, read on
                }
            }
        }
    }

    fn close_element(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.elements.truncate(self.depth);
    }

    /// `<?...?>`, `<!--...-->`, `<![CDATA[...]]>`, `<!DOCTYPE ...>`.
    ///
    /// Returns None for the XML declaration, which is not an event.
    fn parse_legacy(&mut self, push: bool) -> Result<Option<EventType>> {
        let mut push = push;
        self.read()?; // <
        let c = self.read()?;

        let (req, term, result) = match c {
            Some('?') => {
                if matches!(self.peek(0)?, Some('x' | 'X')) && matches!(self.peek(1)?, Some('m' | 'M')) {
                    if push {
                        for pos in 0..2 {
                            if let Some(c) = self.peek(pos)? {
                                self.push(c);
                            }
                        }
                    }
                    self.read()?;
                    self.read()?;

                    if matches!(self.peek(0)?, Some('l' | 'L')) && matches!(self.peek(1)?, Some(c) if c <= ' ') {
                        self.parse_xml_decl()?;
                        return Ok(None);
                    }
                }
                ("", '?', EventType::ProcessingInstruction)
            }
            Some('!') => match self.peek(0)? {
                Some('-') => ("--", '-', EventType::Comment),
                Some('[') => {
                    push = true;
                    ("[CDATA[", ']', EventType::CdSect)
                }
                _ => ("DOCTYPE", '>', EventType::DocDecl),
            },
            other => {
                let found = other.map(String::from).unwrap_or_default();
                self.error(ErrorKind::MalformedTag, format!("illegal: <{found}"))?;
                return Ok(Some(EventType::Comment));
            }
        };

        for expected in req.chars() {
            self.read_expected(expected)?;
        }

        if result == EventType::DocDecl {
            self.parse_doctype(push)?;
            return Ok(Some(result));
        }

        let mut prev = None;
        loop {
            let Some(c) = self.read()? else {
                self.error(ErrorKind::UnexpectedEof, UNEXPECTED_EOF)?;
                return Ok(Some(EventType::Comment));
            };

            if push {
                self.push(c);
            }

            if (term == '?' || c == term) && self.peek(0)? == Some(term) && self.peek(1)? == Some('>') {
                break;
            }

            if term == '-' && c == '-' && self.peek(0)? == Some('-') && !self.relaxed {
                self.error(ErrorKind::IllegalCommentDelimiter, "illegal comment delimiter: --")?;
            }

            prev = Some(c);
        }

        if term == '-' && prev == Some('-') && !self.relaxed {
            self.error(ErrorKind::IllegalCommentDelimiter, "illegal comment delimiter: --->")?;
        }

        self.read()?;
        self.read()?;

        // drop the first terminator character
        if push && term != '?' {
            self.txt.pop();
        }

        Ok(Some(result))
    }

    /// precondition: `<?xm` consumed, `l` and a space ahead
    fn parse_xml_decl(&mut self) -> Result<()> {
        if self.line() != 1 || self.column() > 4 {
            self.error(ErrorKind::IllegalXmlDeclaration, "PI must not start with xml")?;
        }

        self.parse_start_tag(true)?;
        let attrs = std::mem::take(&mut self.attributes);
        let mut pos = 0;

        match attrs.first() {
            Some(attr) if attr.name == "version" => {
                self.version = Some(attr.value.clone());
                pos += 1;
            }
            _ => self.error(ErrorKind::IllegalXmlDeclaration, "version expected")?,
        }

        if let Some(attr) = attrs.get(pos).filter(|a| a.name == "encoding") {
            if self.input_encoding.is_none() {
                self.input_encoding = Some(attr.value.clone());
            }
            pos += 1;
        }

        if let Some(attr) = attrs.get(pos).filter(|a| a.name == "standalone") {
            match attr.value.as_str() {
                "yes" => self.standalone = Some(true),
                "no" => self.standalone = Some(false),
                other => {
                    let message = format!("illegal standalone value: {other}");
                    self.error(ErrorKind::IllegalXmlDeclaration, message)?;
                }
            }
            pos += 1;
        }

        if pos != attrs.len() {
            self.error(ErrorKind::IllegalXmlDeclaration, "illegal xmldecl")?;
        }

        debug!(
            version = ?self.version,
            encoding = ?self.input_encoding,
            standalone = ?self.standalone,
            "xml declaration"
        );

        self.is_whitespace = true;
        self.txt.clear();
        Ok(())
    }

    /// precondition: `<!DOCTYPE` consumed
    fn parse_doctype(&mut self, push: bool) -> Result<()> {
        let mut nesting = 1;
        let mut quote: Option<char> = None;
        let mut decl = String::new();

        loop {
            let Some(c) = self.read()? else {
                self.error(ErrorKind::UnexpectedEof, UNEXPECTED_EOF)?;
                return Ok(());
            };
            match c {
                '\'' | '"' => match quote {
                    None => quote = Some(c),
                    Some(q) if q == c => quote = None,
                    Some(_) => {}
                },
                '<' if quote.is_none() => nesting += 1,
                '>' if quote.is_none() => {
                    nesting -= 1;
                    if nesting == 0 {
                        break;
                    }
                }
                _ => {}
            }
            if push {
                self.push(c);
            }
            if self.process_docdecl {
                decl.push(c);
            }
        }

        if self.process_docdecl {
            let entities = self.entities.get_or_insert_with(EntityTable::new);
            let mut added = 0;
            for (name, value) in internal_entity_decls(&decl) {
                if entities.define_if_absent(&name, &value) {
                    added += 1;
                }
            }
            debug!(added, "internal subset entities");
        }
        Ok(())
    }

    /// precondition: `</` ahead
    fn parse_end_tag(&mut self) -> Result<()> {
        self.read()?; // <
        self.read()?; // /
        let name = self.read_name()?;
        self.skip()?;
        self.read_expected('>')?;

        let Some(frame) = self.elements.last().cloned() else {
            self.error(ErrorKind::MismatchedEndTag, "element stack empty")?;
            self.name = Some(name);
            self.event = EventType::Comment;
            return Ok(());
        };

        if name != frame.qname {
            self.error(
                ErrorKind::MismatchedEndTag,
                format!("expected: /{} read: {}", frame.qname, name),
            )?;
        }

        self.namespace = Some(frame.namespace);
        self.prefix = frame.prefix;
        self.name = Some(frame.name);
        self.close_element();
        Ok(())
    }

    /// Reads the element name and attributes; `xmldecl` parses the
    /// pseudo-attributes of `<?xml ...?>` instead
    fn parse_start_tag(&mut self, xmldecl: bool) -> Result<()> {
        if !xmldecl {
            self.read()?; // <
        }
        let qname = self.read_name()?;
        self.attributes.clear();
        self.attributes_active = true;

        loop {
            self.skip()?;
            let c = self.peek(0)?;

            if xmldecl {
                if c == Some('?') {
                    self.read()?;
                    self.read_expected('>')?;
                    return Ok(());
                }
            } else {
                if c == Some('/') {
                    self.degenerated = true;
                    self.read()?;
                    self.skip()?;
                    self.read_expected('>')?;
                    break;
                }
                if c == Some('>') {
                    self.read()?;
                    break;
                }
            }

            if c.is_none() {
                self.error(ErrorKind::UnexpectedEof, UNEXPECTED_EOF)?;
                self.name = Some(qname);
                return Ok(());
            }

            let attr_name = self.read_name()?;
            if attr_name.is_empty() {
                self.error(ErrorKind::MalformedTag, "attr name expected")?;
                break;
            }

            self.skip()?;

            let value = if self.peek(0)? != Some('=') {
                if !self.relaxed {
                    self.error(ErrorKind::MalformedTag, format!("Attr.value missing f. {attr_name}"))?;
                }
                attr_name.clone()
            } else {
                self.read_expected('=')?;
                self.skip()?;
                let delimiter = match self.peek(0)? {
                    Some(q @ ('\'' | '"')) => {
                        self.read()?;
                        q
                    }
                    _ => {
                        if !self.relaxed {
                            self.error(ErrorKind::MalformedTag, "attr value delimiter missing!")?;
                        }
                        ' '
                    }
                };

                let p = self.txt.len();
                self.push_text(delimiter, true, true)?;
                let value = self.txt.split_off(p);

                if delimiter != ' ' {
                    self.read()?; // end quote
                }
                value
            };

            self.attributes.push(Attribute::new(attr_name, value));
        }

        if xmldecl {
            return Ok(());
        }

        self.depth += 1;
        self.ns.open_scope(self.depth);

        let (namespace, prefix, name) = if self.process_namespaces {
            self.adjust_nsp(&qname)?
        } else {
            (String::new(), None, qname.clone())
        };

        self.check_duplicate_attributes()?;

        self.elements.push(ElementFrame {
            namespace: namespace.clone(),
            prefix: prefix.clone(),
            name: name.clone(),
            qname,
        });
        self.namespace = Some(namespace);
        self.prefix = prefix;
        self.name = Some(name);
        Ok(())
    }

    fn check_duplicate_attributes(&mut self) -> Result<()> {
        let duplicate = (1..self.attributes.len()).find_map(|i| {
            let attr = &self.attributes[i];
            self.attributes[..i]
                .iter()
                .any(|other| other.name == attr.name && other.namespace == attr.namespace)
                .then(|| attr.qname())
        });
        if let Some(qname) = duplicate {
            self.error(ErrorKind::DuplicateAttribute, format!("Duplicate Attribute: {qname}"))?;
        }
        Ok(())
    }

    /// Bind `xmlns` declarations at the current depth and resolve the
    /// element and attribute prefixes. Returns (namespace, prefix, local name)
    /// of the element.
    fn adjust_nsp(&mut self, qname: &str) -> Result<(String, Option<String>, String)> {
        let depth = self.depth;

        let mut i = 0;
        while i < self.attributes.len() {
            let raw = self.attributes[i].name.as_str();
            let declared = if raw == "xmlns" {
                Some(String::new())
            } else {
                raw.strip_prefix("xmlns:").map(str::to_string)
            };
            let Some(prefix) = declared else {
                i += 1;
                continue;
            };

            let uri = self.attributes[i].value.clone();
            if !prefix.is_empty() && uri.is_empty() {
                self.error(ErrorKind::IllegalEmptyNamespace, "illegal empty namespace")?;
            }
            if self.ns.declared_at(depth).iter().any(|b| b.prefix == prefix) {
                let message = format!("duplicate namespace declaration: {}", self.attributes[i].name);
                self.error(ErrorKind::DuplicateNamespace, message)?;
            }
            self.ns.push_at(depth, prefix, uri);

            if self.report_namespace_attributes {
                i += 1;
            } else {
                self.attributes.remove(i);
            }
        }

        for i in 0..self.attributes.len() {
            let raw = self.attributes[i].name.clone();
            let (attr_prefix, local) = match split_name(&raw) {
                (Some(""), _) => {
                    self.error(ErrorKind::MalformedName, format!("illegal attribute name: {raw}"))?;
                    continue;
                }
                (Some(p), local) => (p, local),
                (None, _) => continue,
            };

            let resolved = self.ns.lookup(attr_prefix, depth).map(str::to_string);
            let namespace = match resolved {
                Some(uri) => uri,
                None => {
                    self.error(ErrorKind::UndefinedPrefix, format!("Undefined Prefix: {attr_prefix}"))?;
                    String::new()
                }
            };

            let attr = &mut self.attributes[i];
            attr.namespace = namespace;
            attr.prefix = Some(attr_prefix.to_string());
            attr.name = local.to_string();
        }

        let (prefix, name) = match split_name(qname) {
            (Some(""), _) => {
                self.error(ErrorKind::MalformedName, format!("illegal tag name: {qname}"))?;
                (None, qname)
            }
            split => split,
        };

        let resolved = self.ns.lookup(prefix.unwrap_or(""), depth).map(str::to_string);
        let namespace = match resolved {
            Some(uri) => uri,
            None => {
                if let Some(p) = prefix {
                    self.error(ErrorKind::UndefinedPrefix, format!("undefined prefix: {p}"))?;
                }
                String::new()
            }
        };

        Ok((namespace, prefix.map(str::to_string), name.to_string()))
    }

    /// Reads `&name;` / `&#N;` / `&#xN;` and pushes its replacement.
    ///
    /// In token mode the reference name is kept in `name`. An undeclared
    /// entity sets `unresolved`; it is an error outside token mode and
    /// inside attribute values.
    fn push_entity(&mut self, in_attribute: bool) -> Result<()> {
        if let Some(amp) = self.read()? {
            self.push(amp);
        }
        let pos = self.txt.len();

        loop {
            let c = self.peek(0)?;
            if c == Some(';') {
                self.read()?;
                break;
            }
            let name_char = matches!(c, Some(c) if !c.is_ascii()
                || c.is_ascii_alphanumeric()
                || matches!(c, '_' | '-' | '#'));
            if !name_char {
                if !self.relaxed {
                    self.error(ErrorKind::UnresolvedEntity, "unterminated entity ref")?;
                }
                warn!(entity = %&self.txt[pos - 1..], "broken entity reference");
                return Ok(());
            }
            if let Some(c) = self.read()? {
                self.push(c);
            }
        }

        let code = self.txt.split_off(pos);
        self.txt.pop(); // &

        if self.token && self.event == EventType::EntityRef {
            self.name = Some(code.clone());
        }

        if let Some(body) = code.strip_prefix('#') {
            match decode_char_ref(body) {
                Some(c) => self.push(c),
                None => {
                    self.error(ErrorKind::IllegalCharRef, format!("illegal character reference: &{code};"))?;
                    self.push(char::REPLACEMENT_CHARACTER);
                }
            }
            return Ok(());
        }

        let replacement = self.entities.as_ref().and_then(|t| t.get(&code)).map(str::to_string);
        match replacement {
            Some(text) => text.chars().for_each(|c| self.push(c)),
            None => {
                self.unresolved = true;
                if !self.token || in_attribute {
                    self.error(ErrorKind::UnresolvedEntity, format!("unresolved: &{code};"))?;
                }
            }
        }
        Ok(())
    }

    /// Push characters until `delimiter`.
    ///
    /// `'<'` reads element content, a quote reads a quoted attribute value,
    /// `' '` reads an unquoted value up to whitespace or `>`.
    fn push_text(&mut self, delimiter: char, resolve_entities: bool, in_attribute: bool) -> Result<()> {
        let mut brackets = 0;

        while let Some(next) = self.peek(0)? {
            if next == delimiter || (delimiter == ' ' && (next <= ' ' || next == '>')) {
                break;
            }

            if next == '&' {
                if !resolve_entities {
                    break;
                }
                self.push_entity(in_attribute)?;
            } else if in_attribute && (next == '\n' || next == '\t') {
                self.read()?;
                self.push(' ');
            } else {
                self.read()?;
                self.push(next);
            }

            if next == '>' && brackets >= 2 && delimiter != ']' {
                self.error(ErrorKind::IllegalTextSequence, "Illegal: ]]>")?;
            }

            if next == ']' {
                brackets += 1;
            } else {
                brackets = 0;
            }
        }
        Ok(())
    }

    fn read_name(&mut self) -> Result<String> {
        let start = self.peek(0)?;
        let valid_start = matches!(start, Some(c) if c.is_ascii_alphabetic()
            || c == '_'
            || c == ':'
            || c >= '\u{c0}');
        if !valid_start && !self.relaxed {
            self.error(ErrorKind::MalformedName, "name expected")?;
        }

        let mut name = String::new();
        loop {
            match self.read()? {
                Some(c) => name.push(c),
                None => break,
            }
            match self.peek(0)? {
                Some(c) if is_name_char(c) => {}
                _ => break,
            }
        }
        Ok(name)
    }
}

#[inline]
fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.') || c >= '\u{b7}'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::source::StrSource;

    fn tokenizer(input: &str) -> Tokenizer<'_> {
        let mut tok = Tokenizer::new();
        tok.attach(Scanner::new(Box::new(StrSource::new(input))), None);
        tok
    }

    fn token(tok: &mut Tokenizer<'_>) -> EventType {
        tok.begin_event();
        tok.token = true;
        tok.step().unwrap()
    }

    #[test]
    fn test_empty_element() {
        let mut tok = tokenizer("<foo/>");
        assert_eq!(token(&mut tok), EventType::StartTag);
        assert_eq!(tok.depth, 1);
        assert!(tok.degenerated);
        assert_eq!(token(&mut tok), EventType::EndTag);
        assert_eq!(tok.name.as_deref(), Some("foo"));
        assert_eq!(tok.depth, 0);
        assert_eq!(token(&mut tok), EventType::EndDocument);
    }

    #[test]
    fn test_simple_element() {
        let mut tok = tokenizer("<root a='1' b=\"x y\">hi</root>");
        assert_eq!(token(&mut tok), EventType::StartTag);
        assert_eq!(tok.attributes.len(), 2);
        assert_eq!(tok.attributes[1].name, "b");
        assert_eq!(tok.attributes[1].value, "x y");
        assert_eq!(token(&mut tok), EventType::Text);
        assert_eq!(tok.txt, "hi");
        assert_eq!(token(&mut tok), EventType::EndTag);
        assert!(!tok.attributes_active);
    }

    #[test]
    fn test_cdata() {
        let mut tok = tokenizer("<a><![CDATA[x<y]]]></a>");
        token(&mut tok);
        assert_eq!(token(&mut tok), EventType::CdSect);
        assert_eq!(tok.txt, "x<y]");
    }

    #[test]
    fn test_comment() {
        let mut tok = tokenizer("<!-- hi --><a/>");
        assert_eq!(token(&mut tok), EventType::Comment);
        assert_eq!(tok.txt, " hi ");
    }

    #[test]
    fn test_empty_comment() {
        let mut tok = tokenizer("<!----><a/>");
        assert_eq!(token(&mut tok), EventType::Comment);
        assert_eq!(tok.txt, "");
    }

    #[test]
    fn test_double_hyphen_in_comment() {
        let mut tok = tokenizer("<!-- a -- b --><a/>");
        tok.begin_event();
        tok.token = true;
        let err = tok.step().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::IllegalCommentDelimiter));
    }

    #[test]
    fn test_processing_instruction() {
        let mut tok = tokenizer("<?target data?><a/>");
        assert_eq!(token(&mut tok), EventType::ProcessingInstruction);
        assert_eq!(tok.txt, "target data");
    }

    #[test]
    fn test_xml_declaration_is_not_a_token() {
        let mut tok = tokenizer("<?xml version=\"1.0\" encoding='UTF-8' standalone='yes'?><a/>");
        assert_eq!(token(&mut tok), EventType::StartTag);
        assert_eq!(tok.version.as_deref(), Some("1.0"));
        assert_eq!(tok.input_encoding.as_deref(), Some("UTF-8"));
        assert_eq!(tok.standalone, Some(true));
    }

    #[test]
    fn test_xml_declaration_out_of_order() {
        let mut tok = tokenizer("<?xml encoding='UTF-8' version='1.0'?><a/>");
        tok.begin_event();
        let err = tok.step().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::IllegalXmlDeclaration));
    }

    #[test]
    fn test_xml_declaration_not_first() {
        let mut tok = tokenizer("<a/>\n<?xml version='1.0'?>");
        token(&mut tok);
        token(&mut tok);
        token(&mut tok);
        tok.begin_event();
        let err = tok.step().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::IllegalXmlDeclaration));
    }

    #[test]
    fn test_doctype_nesting() {
        let mut tok = tokenizer("<!DOCTYPE r [<!ENTITY e \"a>b\"> <!ELEMENT r ANY>]><r/>");
        assert_eq!(token(&mut tok), EventType::DocDecl);
        assert_eq!(tok.txt, " r [<!ENTITY e \"a>b\"> <!ELEMENT r ANY>]");
        assert_eq!(token(&mut tok), EventType::StartTag);
    }

    #[test]
    fn test_doctype_entities_harvested() {
        let mut tok = tokenizer("<!DOCTYPE r [<!ENTITY e 'eee'><!ENTITY e 'second'>]><r>&e;</r>");
        tok.process_docdecl = true;
        token(&mut tok);
        assert_eq!(tok.entities.as_ref().and_then(|t| t.get("e")), Some("eee"));
    }

    #[test]
    fn test_entity_token() {
        let mut tok = tokenizer("<a>&amp;&#x41;&bogus;</a>");
        token(&mut tok);
        assert_eq!(token(&mut tok), EventType::EntityRef);
        assert_eq!((tok.name.as_deref(), tok.txt.as_str()), (Some("amp"), "&"));
        assert_eq!(token(&mut tok), EventType::EntityRef);
        assert_eq!((tok.name.as_deref(), tok.txt.as_str()), (Some("#x41"), "A"));
        assert_eq!(token(&mut tok), EventType::EntityRef);
        assert!(tok.unresolved);
        assert_eq!(tok.text(), Some("bogus"));
    }

    #[test]
    fn test_attribute_whitespace_normalized() {
        let mut tok = tokenizer("<a v='x\r\ny\tz\rw'/>");
        token(&mut tok);
        assert_eq!(tok.attributes[0].value, "x y z w");
    }

    #[test]
    fn test_cdata_end_in_text() {
        let mut tok = tokenizer("<a>x]]>y</a>");
        token(&mut tok);
        tok.begin_event();
        let err = tok.step().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::IllegalTextSequence));
    }

    #[test]
    fn test_namespace_resolution() {
        let mut tok = tokenizer("<a xmlns='urn:d' xmlns:p='urn:p'><p:b p:x='1' y='2'/></a>");
        tok.process_namespaces = true;
        token(&mut tok);
        assert_eq!(tok.namespace.as_deref(), Some("urn:d"));
        assert!(tok.attributes.is_empty());
        token(&mut tok);
        assert_eq!(tok.namespace.as_deref(), Some("urn:p"));
        assert_eq!(tok.prefix.as_deref(), Some("p"));
        assert_eq!(tok.attributes[0].namespace, "urn:p");
        assert_eq!(tok.attributes[1].namespace, "");
    }

    #[test]
    fn test_undefined_prefix() {
        let mut tok = tokenizer("<p:a/>");
        tok.process_namespaces = true;
        tok.begin_event();
        let err = tok.step().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::UndefinedPrefix));
    }

    #[test]
    fn test_mismatched_end_tag_strict() {
        let mut tok = tokenizer("<a></b>");
        token(&mut tok);
        tok.begin_event();
        let err = tok.step().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::MismatchedEndTag));
        assert_eq!(err.line(), Some(1));
    }

    #[test]
    fn test_mismatched_end_tag_relaxed() {
        let mut tok = tokenizer("<a></b>");
        tok.relaxed = true;
        token(&mut tok);
        assert_eq!(token(&mut tok), EventType::EndTag);
        assert_eq!(tok.name.as_deref(), Some("a"));
        assert_eq!(token(&mut tok), EventType::Comment);
        assert_eq!(tok.txt, "ERR: expected: /a read: b");
        assert_eq!(token(&mut tok), EventType::EndDocument);
    }

    #[test]
    fn test_duplicate_attribute() {
        let mut tok = tokenizer("<a x='1' x='2'/>");
        tok.begin_event();
        let err = tok.step().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::DuplicateAttribute));
    }

    #[test]
    fn test_position_description() {
        let mut tok = tokenizer("<a x='1'>");
        token(&mut tok);
        assert_eq!(tok.position_description(), "START_TAG <a x='1'>@1:9");
    }

    #[test]
    fn test_past_end_document() {
        let mut tok = tokenizer("");
        assert_eq!(token(&mut tok), EventType::EndDocument);
        let err = tok.step().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::PastEndDocument));
    }

    #[test]
    fn test_not_attached() {
        let mut tok = Tokenizer::new();
        let err = tok.step().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NoInput));
    }
}
