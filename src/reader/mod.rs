//! XML Reader Module
//!
//! - PullParser: streaming pull parser over any character source
//! - Source: in-memory and byte-stream character sources
//! - Events: event kinds and owned event snapshots

pub mod events;
pub mod pull;
pub mod source;

pub use events::{EventType, XmlEvent};
pub use pull::{Events, PullParser, XmlPullParser};
pub use source::{CharSource, DecodingSource, StrSource};
