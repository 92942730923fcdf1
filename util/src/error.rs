use thiserror::Error;

use crate::{soap::Fault, transport::TransportError};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Type {0} was referenced but never defined")]
    UnresolvedType(String),

    #[error("Base type {base} of {name} is not resolved yet")]
    BaseNotResolved { name: String, base: String },

    #[error("No type named {0}")]
    UnknownType(String),

    #[error("Type {found} is not in namespace {expected:?}")]
    NamespaceMismatch {
        found: String,
        expected: Option<String>,
    },

    #[error("Illegal value {value:?} for enumeration {type_name}, expected one of {allowed:?}")]
    IllegalEnumValue {
        type_name: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("Invalid {expected} value {value:?}")]
    InvalidValue {
        expected: &'static str,
        value: String,
    },

    #[error("Cannot use a {from} value as {to}")]
    Mismatch { from: &'static str, to: String },

    #[error("{type_name} has no field {field}")]
    UnknownField { type_name: String, field: String },

    #[error("{0} has no element name to render under")]
    NoTag(String),

    #[error("No multiRef element with id {0}")]
    MultirefNotFound(String),

    #[error("Only id-based multiref links are supported, found {0}")]
    UnsupportedHref(String),

    #[error("No method named {0}")]
    UnknownMethod(String),

    #[error("Missing argument for part {part} of {method}")]
    MissingArgument { method: String, part: String },

    #[error("{message}:\n{response}")]
    NotSoap { message: String, response: String },

    #[error(transparent)]
    Fault(#[from] Fault),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Error writing XML")]
    XmlWriteError(#[from] quick_xml::Error),

    #[error("Error parsing XML")]
    XmlParseError(#[from] roxmltree::Error),

    #[error("Response is not valid UTF-8")]
    Utf8Error(#[from] std::str::Utf8Error),

    #[error("Error encoding a saved value")]
    JsonError(#[from] serde_json::Error),
}

/// Broad classification callers can match on without caring about detail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Build,
    Value,
    Call,
    Fault,
    NotSoap,
    Transport,
    Xml,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnresolvedType(_) | Self::BaseNotResolved { .. } => ErrorKind::Build,

            Self::UnknownType(_)
            | Self::NamespaceMismatch { .. }
            | Self::IllegalEnumValue { .. }
            | Self::InvalidValue { .. }
            | Self::Mismatch { .. }
            | Self::UnknownField { .. }
            | Self::NoTag(_)
            | Self::MultirefNotFound(_)
            | Self::UnsupportedHref(_)
            | Self::JsonError(_) => ErrorKind::Value,

            Self::UnknownMethod(_) | Self::MissingArgument { .. } => ErrorKind::Call,
            Self::Fault(_) => ErrorKind::Fault,
            Self::NotSoap { .. } => ErrorKind::NotSoap,
            Self::Transport(_) => ErrorKind::Transport,

            Self::XmlWriteError(_) | Self::XmlParseError(_) | Self::Utf8Error(_) => ErrorKind::Xml,
        }
    }

    /// Whether the server answered with a SOAP Fault, as opposed to the call failing.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}
