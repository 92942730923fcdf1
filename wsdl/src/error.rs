use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unable to parse provided URL")]
    UrlParseError(#[from] url::ParseError),

    #[error("Unable to convert provided path")]
    PathConversionError(Option<std::io::Error>),

    #[error("Unable to open file")]
    FileOpenError(#[source] std::io::Error),

    #[error("Unable to get file from server")]
    ReqwestError(#[from] reqwest::Error),

    #[error("Unsupported URL scheme {0}")]
    UnsupportedScheme(String),

    #[error("Error parsing XML input")]
    XmlParseError(#[from] roxmltree::Error),

    #[error("Document {0} was referenced but never loaded")]
    MissingDocument(String),

    #[error("Unable to build {0}")]
    UnknownConstruct(String),

    #[error("Binding {0} has no SOAP binding")]
    NoSoapBinding(String),

    #[error("No type or element named {0}")]
    UnknownType(String),

    #[error("No {kind} named {name}")]
    MissingDefinition { kind: &'static str, name: String },

    #[error("Definition lock was poisoned")]
    Poisoned,

    #[error(transparent)]
    Runtime(#[from] lather_util::Error),
}
