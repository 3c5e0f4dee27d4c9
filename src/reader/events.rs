//! XML Event Types
//!
//! Event kinds reported by the pull parser, plus an owned snapshot of the
//! current event for consumers that prefer iterating over values.

use crate::core::attributes::Attribute;
use std::fmt;

/// Kind of the current parser event
///
/// The order matters: coalescing in [`next`](crate::PullParser::next)
/// keeps the lowest kind seen, and every kind above `Text` folds into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventType {
    StartDocument,
    EndDocument,
    StartTag,
    EndTag,
    Text,
    CdSect,
    EntityRef,
    IgnorableWhitespace,
    ProcessingInstruction,
    Comment,
    DocDecl,
}

impl EventType {
    /// XmlPull name of the event kind
    pub fn name(self) -> &'static str {
        match self {
            EventType::StartDocument => "START_DOCUMENT",
            EventType::EndDocument => "END_DOCUMENT",
            EventType::StartTag => "START_TAG",
            EventType::EndTag => "END_TAG",
            EventType::Text => "TEXT",
            EventType::CdSect => "CDSECT",
            EventType::EntityRef => "ENTITY_REF",
            EventType::IgnorableWhitespace => "IGNORABLE_WHITESPACE",
            EventType::ProcessingInstruction => "PROCESSING_INSTRUCTION",
            EventType::Comment => "COMMENT",
            EventType::DocDecl => "DOCDECL",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Owned copy of one parser event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    StartDocument,
    EndDocument,
    /// `<name attrs...>` or `<name attrs.../>` (`empty` set)
    StartTag {
        namespace: String,
        prefix: Option<String>,
        name: String,
        attributes: Vec<Attribute>,
        empty: bool,
    },
    EndTag {
        namespace: String,
        prefix: Option<String>,
        name: String,
    },
    Text(String),
    CdSect(String),
    /// Entity reference token; `text` is None when the entity is undeclared
    EntityRef {
        name: String,
        text: Option<String>,
    },
    IgnorableWhitespace(String),
    ProcessingInstruction(String),
    Comment(String),
    DocDecl(String),
}

impl XmlEvent {
    /// Kind of this event
    pub fn event_type(&self) -> EventType {
        match self {
            XmlEvent::StartDocument => EventType::StartDocument,
            XmlEvent::EndDocument => EventType::EndDocument,
            XmlEvent::StartTag { .. } => EventType::StartTag,
            XmlEvent::EndTag { .. } => EventType::EndTag,
            XmlEvent::Text(_) => EventType::Text,
            XmlEvent::CdSect(_) => EventType::CdSect,
            XmlEvent::EntityRef { .. } => EventType::EntityRef,
            XmlEvent::IgnorableWhitespace(_) => EventType::IgnorableWhitespace,
            XmlEvent::ProcessingInstruction(_) => EventType::ProcessingInstruction,
            XmlEvent::Comment(_) => EventType::Comment,
            XmlEvent::DocDecl(_) => EventType::DocDecl,
        }
    }

    /// Text content of text-like events
    pub fn text(&self) -> Option<&str> {
        match self {
            XmlEvent::Text(t)
            | XmlEvent::CdSect(t)
            | XmlEvent::IgnorableWhitespace(t)
            | XmlEvent::ProcessingInstruction(t)
            | XmlEvent::Comment(t)
            | XmlEvent::DocDecl(t) => Some(t),
            XmlEvent::EntityRef { text, .. } => text.as_deref(),
            _ => None,
        }
    }
}
