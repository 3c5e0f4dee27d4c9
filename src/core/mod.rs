//! Core XML parsing primitives
//!
//! This module contains the fundamental building blocks for XML parsing:
//! - Encoding: byte-stream sniffing and per-character decoding/encoding
//! - Scanner: two-character lookahead with end-of-line normalization
//! - Entities: entity table, character references and output escaping
//! - Namespace: depth-segmented namespace binding stack
//! - Attributes: attribute record and qualified-name splitting
//! - Tokenizer: state machine producing one token per step

pub mod attributes;
pub mod encoding;
pub mod entities;
pub mod namespace;
pub mod scanner;
pub(crate) mod tokenizer;
