//! Pull Parser
//!
//! [`PullParser`] drives the tokenizer one token at a time (`next_token`)
//! or folds text-like tokens into coalesced events (`next`). Everything a
//! tree-building consumer needs is exposed through [`XmlPullParser`].

use super::events::{EventType, XmlEvent};
use super::source::{CharSource, DecodingSource, StrSource};
use crate::core::attributes::Attribute;
use crate::core::encoding::sniff;
use crate::core::scanner::Scanner;
use crate::core::tokenizer::Tokenizer;
use crate::error::{ErrorKind, Result, XmlError};
use std::io::Read;
use tracing::debug;

pub const FEATURE_PROCESS_NAMESPACES: &str = "http://xmlpull.org/v1/doc/features.html#process-namespaces";
pub const FEATURE_REPORT_NAMESPACE_ATTRIBUTES: &str =
    "http://xmlpull.org/v1/doc/features.html#report-namespace-prefixes";
pub const FEATURE_PROCESS_DOCDECL: &str = "http://xmlpull.org/v1/doc/features.html#process-docdecl";
pub const FEATURE_VALIDATION: &str = "http://xmlpull.org/v1/doc/features.html#validation";
pub const FEATURE_XML_ROUNDTRIP: &str = "http://xmlpull.org/v1/doc/features.html#xml-roundtrip";
pub const FEATURE_RELAXED: &str = "http://xmlpull.org/v1/doc/features.html#relaxed";

pub const PROPERTY_XMLDECL_VERSION: &str = "http://xmlpull.org/v1/doc/properties.html#xmldecl-version";
pub const PROPERTY_XMLDECL_STANDALONE: &str = "http://xmlpull.org/v1/doc/properties.html#xmldecl-standalone";
pub const PROPERTY_LOCATION: &str = "http://xmlpull.org/v1/doc/properties.html#location";

/// Event API of a pull parser
pub trait XmlPullParser {
    /// Advance to the next coalesced event
    fn next(&mut self) -> Result<EventType>;

    /// Advance by exactly one lexical token
    fn next_token(&mut self) -> Result<EventType>;

    fn event_type(&self) -> EventType;

    /// Element depth: 1 inside the root start tag, 0 outside the root
    fn depth(&self) -> usize;

    /// Local name of the current tag, or the name of an entity reference token
    fn name(&self) -> Option<&str>;

    /// Namespace URI of the current tag ("" when none)
    fn namespace(&self) -> Option<&str>;

    fn prefix(&self) -> Option<&str>;

    /// True if the current START_TAG was written `<x/>`
    fn is_empty_element_tag(&self) -> Result<bool>;

    /// Attributes of the current START_TAG (empty for other events)
    fn attributes(&self) -> &[Attribute];

    /// Number of attributes, or None when not on a START_TAG
    fn attribute_count(&self) -> Option<usize>;

    fn attribute(&self, index: usize) -> Option<&Attribute> {
        self.attributes().get(index)
    }

    fn attribute_namespace(&self, index: usize) -> Option<&str> {
        self.attribute(index).map(|a| a.namespace.as_str())
    }

    fn attribute_name(&self, index: usize) -> Option<&str> {
        self.attribute(index).map(|a| a.name.as_str())
    }

    fn attribute_prefix(&self, index: usize) -> Option<&str> {
        self.attribute(index).and_then(|a| a.prefix.as_deref())
    }

    fn attribute_value(&self, index: usize) -> Option<&str> {
        self.attribute(index).map(|a| a.value.as_str())
    }

    /// Value of the attribute `name`; `namespace` None matches any namespace
    fn attribute_value_by_name(&self, namespace: Option<&str>, name: &str) -> Option<&str> {
        self.attributes()
            .iter()
            .rev()
            .find(|a| a.name == name && namespace.map_or(true, |ns| a.namespace == ns))
            .map(|a| a.value.as_str())
    }

    /// Number of namespace bindings visible at `depth`. On END_TAG the
    /// closed element's own depth (`depth() + 1`) is still addressable.
    fn namespace_count(&self, depth: usize) -> Result<usize>;

    /// Prefix of binding `pos`; None for the default namespace
    fn namespace_prefix(&self, pos: usize) -> Option<&str>;

    fn namespace_uri(&self, pos: usize) -> Option<&str>;

    /// Resolve a prefix (None for the default namespace) in the scope of the
    /// current element; on END_TAG that is the element being closed
    fn namespace_for_prefix(&self, prefix: Option<&str>) -> Option<&str>;

    fn text(&self) -> Option<&str>;

    /// Text buffer of text-like events; the entity name for ENTITY_REF
    fn text_characters(&self) -> Option<&str>;

    fn is_whitespace(&self) -> Result<bool>;

    /// Fail unless the current event matches
    fn require(&self, kind: EventType, namespace: Option<&str>, name: Option<&str>) -> Result<()>;

    /// Current text and advance, or "" when not on TEXT
    fn read_text(&mut self) -> Result<String>;

    /// Skip whitespace-only text; the result must be START_TAG or END_TAG
    fn next_tag(&mut self) -> Result<EventType>;

    /// Text-only element content; leaves the parser on the END_TAG
    fn next_text(&mut self) -> Result<String>;

    /// From a START_TAG, advance to its matching END_TAG
    fn skip_sub_tree(&mut self) -> Result<()>;

    fn line_number(&self) -> u32;

    fn column_number(&self) -> u32;

    fn position_description(&self) -> String;
}

/// Streaming XML pull parser
pub struct PullParser<'a> {
    tok: Tokenizer<'a>,
}

impl<'a> PullParser<'a> {
    /// Create a parser with no input attached
    pub fn new() -> Self {
        PullParser { tok: Tokenizer::new() }
    }

    /// Attach a character source
    pub fn set_input<S: CharSource + 'a>(&mut self, source: S) {
        debug!("input attached");
        self.tok.attach(Scanner::new(Box::new(source)), None);
    }

    /// Attach an in-memory document
    pub fn set_input_str(&mut self, input: &'a str) {
        self.set_input(StrSource::new(input));
    }

    /// Attach a byte stream. Without `encoding` the decoding is sniffed from
    /// the first bytes.
    pub fn set_input_reader<R: Read + 'a>(&mut self, mut reader: R, encoding: Option<&str>) -> Result<()> {
        let sniffed = sniff(&mut reader, encoding).map_err(|source| XmlError::InvalidStream { source })?;
        let label = match encoding {
            Some(label) => label.to_string(),
            None => sniffed.declared.unwrap_or_else(|| sniffed.encoding.name().to_string()),
        };
        debug!(encoding = %label, sniffed = encoding.is_none(), "byte input attached");

        let source = DecodingSource::with_replay(reader, sniffed.encoding, sniffed.replay);
        self.tok.attach(Scanner::new(Box::new(source)), Some(label));
        Ok(())
    }

    /// Detach the input and reset all state
    pub fn clear_input(&mut self) {
        self.tok.detach();
    }

    /// Encoding given by the caller, sniffed, or declared in the XML declaration
    pub fn input_encoding(&self) -> Option<&str> {
        self.tok.input_encoding.as_deref()
    }

    /// Literal markup of the current token (round-trip feature only)
    pub fn raw_text(&self) -> Option<&str> {
        self.tok.roundtrip().then_some(self.tok.raw.as_str())
    }

    /// `standalone` from the XML declaration
    pub fn standalone(&self) -> Option<bool> {
        self.tok.standalone
    }

    /// Change a feature; only allowed before the first event
    pub fn set_feature(&mut self, name: &str, value: bool) -> Result<()> {
        if self.tok.event != EventType::StartDocument {
            return Err(self
                .tok
                .exception(ErrorKind::IllegalState, "features can only be changed before parsing starts"));
        }
        match name {
            FEATURE_PROCESS_NAMESPACES => self.tok.process_namespaces = value,
            FEATURE_REPORT_NAMESPACE_ATTRIBUTES => self.tok.report_namespace_attributes = value,
            FEATURE_PROCESS_DOCDECL => self.tok.process_docdecl = value,
            FEATURE_XML_ROUNDTRIP => self.tok.set_roundtrip(value),
            FEATURE_RELAXED => self.tok.relaxed = value,
            FEATURE_VALIDATION if !value => {}
            _ => {
                let message = format!("unsupported feature: {name}");
                return Err(self.tok.exception(ErrorKind::UnsupportedFeature, message));
            }
        }
        Ok(())
    }

    pub fn feature(&self, name: &str) -> bool {
        match name {
            FEATURE_PROCESS_NAMESPACES => self.tok.process_namespaces,
            FEATURE_REPORT_NAMESPACE_ATTRIBUTES => self.tok.report_namespace_attributes,
            FEATURE_PROCESS_DOCDECL => self.tok.process_docdecl,
            FEATURE_XML_ROUNDTRIP => self.tok.roundtrip(),
            FEATURE_RELAXED => self.tok.relaxed,
            _ => false,
        }
    }

    /// Set a property; only the location label is writable
    pub fn set_property(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        if name == PROPERTY_LOCATION {
            self.tok.location = Some(value.into());
            Ok(())
        } else {
            let message = format!("unsupported property: {name}");
            Err(self.tok.exception(ErrorKind::UnsupportedProperty, message))
        }
    }

    pub fn property(&self, name: &str) -> Option<String> {
        match name {
            PROPERTY_XMLDECL_VERSION => self.tok.version.clone(),
            PROPERTY_XMLDECL_STANDALONE => self.tok.standalone.map(|s| if s { "yes" } else { "no" }.to_string()),
            PROPERTY_LOCATION => self.tok.location.clone(),
            _ => None,
        }
    }

    /// Declare an entity for the current document
    pub fn define_entity_replacement_text(&mut self, name: &str, value: &str) -> Result<()> {
        match self.tok.entities.as_mut() {
            Some(table) => {
                table.define(name, value);
                Ok(())
            }
            None => Err(self.tok.exception(
                ErrorKind::NoInput,
                "entity replacement text must be defined after setInput!",
            )),
        }
    }

    /// Owned snapshot of the current event
    pub fn current_event(&self) -> XmlEvent {
        let tok = &self.tok;
        let txt = || tok.txt.clone();
        match tok.event {
            EventType::StartDocument => XmlEvent::StartDocument,
            EventType::EndDocument => XmlEvent::EndDocument,
            EventType::StartTag => XmlEvent::StartTag {
                namespace: tok.namespace.clone().unwrap_or_default(),
                prefix: tok.prefix.clone(),
                name: tok.name.clone().unwrap_or_default(),
                attributes: tok.attributes.clone(),
                empty: tok.degenerated,
            },
            EventType::EndTag => XmlEvent::EndTag {
                namespace: tok.namespace.clone().unwrap_or_default(),
                prefix: tok.prefix.clone(),
                name: tok.name.clone().unwrap_or_default(),
            },
            EventType::Text => XmlEvent::Text(txt()),
            EventType::CdSect => XmlEvent::CdSect(txt()),
            EventType::EntityRef => XmlEvent::EntityRef {
                name: tok.name.clone().unwrap_or_default(),
                text: (!tok.unresolved).then(txt),
            },
            EventType::IgnorableWhitespace => XmlEvent::IgnorableWhitespace(txt()),
            EventType::ProcessingInstruction => XmlEvent::ProcessingInstruction(txt()),
            EventType::Comment => XmlEvent::Comment(txt()),
            EventType::DocDecl => XmlEvent::DocDecl(txt()),
        }
    }

    /// Iterate over coalesced events up to and including END_DOCUMENT
    pub fn events(&mut self) -> Events<'_, 'a> {
        Events {
            parser: self,
            tokens: false,
            finished: false,
        }
    }

    /// Iterate over raw tokens up to and including END_DOCUMENT
    pub fn tokens(&mut self) -> Events<'_, 'a> {
        Events {
            parser: self,
            tokens: true,
            finished: false,
        }
    }

    /// Namespace scope of the current event: an END_TAG still sees the
    /// bindings of the element it closes
    fn scope_depth(&self) -> usize {
        match self.tok.event {
            EventType::EndTag => self.tok.depth + 1,
            _ => self.tok.depth,
        }
    }

    fn wrong_event(&self, message: impl Into<String>) -> XmlError {
        self.tok.exception(ErrorKind::WrongEventType, message)
    }
}

impl Default for PullParser<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlPullParser for PullParser<'_> {
    fn next(&mut self) -> Result<EventType> {
        let tok = &mut self.tok;
        tok.begin_event();
        tok.token = false;

        let mut min = tok.step()?;
        if tok.error_surfaced {
            return Ok(EventType::Comment);
        }

        loop {
            let more = match min {
                EventType::ProcessingInstruction | EventType::Comment | EventType::DocDecl => true,
                EventType::Text | EventType::CdSect | EventType::EntityRef | EventType::IgnorableWhitespace => {
                    !tok.has_pending_error() && tok.peek_type()?.is_text_like()
                }
                _ => false,
            };
            if !more {
                break;
            }

            let kind = tok.step()?;
            if tok.error_surfaced {
                return Ok(EventType::Comment);
            }
            min = min.min(kind);
        }

        if min > EventType::Text && min != EventType::IgnorableWhitespace {
            min = EventType::Text;
        }
        tok.event = min;
        Ok(min)
    }

    fn next_token(&mut self) -> Result<EventType> {
        self.tok.begin_event();
        self.tok.token = true;
        self.tok.step()
    }

    fn event_type(&self) -> EventType {
        self.tok.event
    }

    fn depth(&self) -> usize {
        self.tok.depth
    }

    fn name(&self) -> Option<&str> {
        self.tok.name.as_deref()
    }

    fn namespace(&self) -> Option<&str> {
        self.tok.namespace.as_deref()
    }

    fn prefix(&self) -> Option<&str> {
        self.tok.prefix.as_deref()
    }

    fn is_empty_element_tag(&self) -> Result<bool> {
        if self.tok.event != EventType::StartTag {
            return Err(self.wrong_event("Wrong event type"));
        }
        Ok(self.tok.degenerated)
    }

    fn attributes(&self) -> &[Attribute] {
        if self.tok.attributes_active {
            &self.tok.attributes
        } else {
            &[]
        }
    }

    fn attribute_count(&self) -> Option<usize> {
        self.tok.attributes_active.then_some(self.tok.attributes.len())
    }

    fn namespace_count(&self, depth: usize) -> Result<usize> {
        if depth > self.scope_depth() {
            let message = format!("depth {depth} is deeper than the current depth {}", self.scope_depth());
            return Err(self.tok.exception(ErrorKind::IllegalState, message));
        }
        Ok(self.tok.ns.count(depth))
    }

    fn namespace_prefix(&self, pos: usize) -> Option<&str> {
        self.tok
            .ns
            .binding(pos)
            .map(|b| b.prefix.as_str())
            .filter(|p| !p.is_empty())
    }

    fn namespace_uri(&self, pos: usize) -> Option<&str> {
        self.tok.ns.binding(pos).map(|b| b.uri.as_str())
    }

    fn namespace_for_prefix(&self, prefix: Option<&str>) -> Option<&str> {
        self.tok.ns.lookup(prefix.unwrap_or(""), self.scope_depth())
    }

    fn text(&self) -> Option<&str> {
        self.tok.text()
    }

    fn text_characters(&self) -> Option<&str> {
        match self.tok.event {
            EventType::EntityRef => self.tok.name.as_deref(),
            kind if kind >= EventType::Text => Some(&self.tok.txt),
            _ => None,
        }
    }

    fn is_whitespace(&self) -> Result<bool> {
        match self.tok.event {
            EventType::Text | EventType::IgnorableWhitespace | EventType::CdSect => Ok(self.tok.is_whitespace),
            _ => Err(self.wrong_event("Wrong event type")),
        }
    }

    fn require(&self, kind: EventType, namespace: Option<&str>, name: Option<&str>) -> Result<()> {
        let matches = kind == self.tok.event
            && namespace.map_or(true, |ns| Some(ns) == self.namespace())
            && name.map_or(true, |n| Some(n) == self.name());
        if matches {
            return Ok(());
        }
        Err(self.wrong_event(format!(
            "expected: {} {{{}}}{}",
            kind,
            namespace.unwrap_or(""),
            name.unwrap_or("")
        )))
    }

    fn read_text(&mut self) -> Result<String> {
        if self.tok.event != EventType::Text {
            return Ok(String::new());
        }
        let result = self.tok.txt.clone();
        XmlPullParser::next(self)?;
        Ok(result)
    }

    fn next_tag(&mut self) -> Result<EventType> {
        XmlPullParser::next(self)?;
        if self.tok.event == EventType::Text && self.tok.is_whitespace {
            XmlPullParser::next(self)?;
        }
        match self.tok.event {
            EventType::StartTag | EventType::EndTag => Ok(self.tok.event),
            _ => Err(self.wrong_event("unexpected type")),
        }
    }

    fn next_text(&mut self) -> Result<String> {
        if self.tok.event != EventType::StartTag {
            return Err(self.wrong_event("precondition: START_TAG"));
        }
        XmlPullParser::next(self)?;

        let result = if self.tok.event == EventType::Text {
            let text = self.tok.txt.clone();
            XmlPullParser::next(self)?;
            text
        } else {
            String::new()
        };

        if self.tok.event != EventType::EndTag {
            return Err(self.wrong_event("END_TAG expected"));
        }
        Ok(result)
    }

    fn skip_sub_tree(&mut self) -> Result<()> {
        self.require(EventType::StartTag, None, None)?;
        let mut level = 1;
        while level > 0 {
            match XmlPullParser::next(self)? {
                EventType::EndTag => level -= 1,
                EventType::StartTag => level += 1,
                _ => {}
            }
        }
        Ok(())
    }

    fn line_number(&self) -> u32 {
        self.tok.line()
    }

    fn column_number(&self) -> u32 {
        self.tok.column()
    }

    fn position_description(&self) -> String {
        self.tok.position_description()
    }
}

/// Iterator over parser events, produced by [`PullParser::events`] and
/// [`PullParser::tokens`]. Stops after END_DOCUMENT or the first error.
pub struct Events<'p, 'a> {
    parser: &'p mut PullParser<'a>,
    tokens: bool,
    finished: bool,
}

impl Iterator for Events<'_, '_> {
    type Item = Result<XmlEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let step = if self.tokens {
            self.parser.next_token()
        } else {
            XmlPullParser::next(self.parser)
        };
        match step {
            Ok(kind) => {
                self.finished = kind == EventType::EndDocument;
                Some(Ok(self.parser.current_event()))
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
