//! Error types
//!
//! Reader errors carry the line/column where they were detected and a short
//! description of the parser position. Writer errors are always fatal.

use std::io;
use thiserror::Error;

/// Messages longer than this are cut before being reported.
const MAX_MESSAGE_LEN: usize = 100;

/// Classification of a reader or writer failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("no input specified")]
    NoInput,
    #[error("no output specified")]
    NoOutput,
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("malformed tag")]
    MalformedTag,
    #[error("malformed name")]
    MalformedName,
    #[error("mismatched end tag")]
    MismatchedEndTag,
    #[error("undefined namespace prefix")]
    UndefinedPrefix,
    #[error("illegal empty namespace declaration")]
    IllegalEmptyNamespace,
    #[error("illegal default namespace declaration")]
    IllegalDefaultNamespace,
    #[error("duplicate attribute")]
    DuplicateAttribute,
    #[error("duplicate namespace declaration")]
    DuplicateNamespace,
    #[error("illegal character reference")]
    IllegalCharRef,
    #[error("unresolved entity reference")]
    UnresolvedEntity,
    #[error("illegal comment delimiter")]
    IllegalCommentDelimiter,
    #[error("illegal text sequence")]
    IllegalTextSequence,
    #[error("illegal xml declaration")]
    IllegalXmlDeclaration,
    #[error("unsupported feature")]
    UnsupportedFeature,
    #[error("unsupported property")]
    UnsupportedProperty,
    #[error("unsupported encoding")]
    UnsupportedEncoding,
    #[error("wrong event type")]
    WrongEventType,
    #[error("advanced past end of document")]
    PastEndDocument,
    #[error("illegal state")]
    IllegalState,
}

/// Errors produced by the pull parser and the serializer
#[derive(Debug, Error)]
pub enum XmlError {
    /// A well-formedness or usage error raised by the reader
    #[error("{message} ({context})")]
    Parse {
        kind: ErrorKind,
        message: String,
        line: u32,
        column: u32,
        context: String,
    },

    /// The byte stream could not be attached (sniffing failed or the
    /// encoding is not supported)
    #[error("invalid stream or encoding: {source}")]
    InvalidStream {
        #[source]
        source: io::Error,
    },

    /// Underlying read or write failure
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Misuse of the serializer
    #[error("{message}")]
    Serialize { kind: ErrorKind, message: String },
}

impl XmlError {
    /// Build a reader error, truncating overlong messages
    pub(crate) fn parse(
        kind: ErrorKind,
        message: impl Into<String>,
        line: u32,
        column: u32,
        context: String,
    ) -> Self {
        let mut message = message.into();
        if message.len() > MAX_MESSAGE_LEN {
            let mut cut = MAX_MESSAGE_LEN;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
            message.push('\n');
        }
        XmlError::Parse {
            kind,
            message,
            line,
            column,
            context,
        }
    }

    /// Build a serializer error
    pub(crate) fn serialize(kind: ErrorKind, message: impl Into<String>) -> Self {
        XmlError::Serialize {
            kind,
            message: message.into(),
        }
    }

    /// The error classification, if this error carries one
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            XmlError::Parse { kind, .. } | XmlError::Serialize { kind, .. } => Some(*kind),
            XmlError::InvalidStream { .. } | XmlError::Io(_) => None,
        }
    }

    /// Line of a reader error (1-based)
    pub fn line(&self) -> Option<u32> {
        match self {
            XmlError::Parse { line, .. } => Some(*line),
            _ => None,
        }
    }

    /// Column of a reader error
    pub fn column(&self) -> Option<u32> {
        match self {
            XmlError::Parse { column, .. } => Some(*column),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, XmlError>;
