//! pullxml - Streaming XML pull parser and serializer
//!
//! Reader:
//! - `next`: coalesced events (text, entities and CDATA merged; comments and
//!   processing instructions dropped)
//! - `next_token`: every lexical token verbatim, for round-tripping
//! - namespaces, internal DTD entities, encoding sniffing, relaxed mode
//!
//! Writer:
//! - mirror-image serializer with automatic prefix management, escaping
//!   and optional indentation

pub mod core;
pub mod error;
pub mod reader;
pub mod writer;

pub use crate::core::attributes::Attribute;
pub use crate::core::encoding::Encoding;
pub use error::{ErrorKind, Result, XmlError};
pub use reader::pull::{
    FEATURE_PROCESS_DOCDECL, FEATURE_PROCESS_NAMESPACES, FEATURE_RELAXED, FEATURE_REPORT_NAMESPACE_ATTRIBUTES,
    FEATURE_VALIDATION, FEATURE_XML_ROUNDTRIP, PROPERTY_LOCATION, PROPERTY_XMLDECL_STANDALONE,
    PROPERTY_XMLDECL_VERSION,
};
pub use reader::{CharSource, DecodingSource, EventType, Events, PullParser, StrSource, XmlEvent, XmlPullParser};
pub use writer::{Serializer, XmlSerializer, FEATURE_INDENT_OUTPUT};
