//! XML Writer Module
//!
//! - Serializer: write-call driven XML output with namespace prefix
//!   management, escaping and optional indentation

pub mod serializer;

pub use serializer::{Serializer, XmlSerializer, FEATURE_INDENT_OUTPUT};

#[cfg(test)]
mod tests;
