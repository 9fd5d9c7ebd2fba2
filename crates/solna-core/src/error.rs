#![forbid(unsafe_code)]

/// Errors produced by the Solna KeyInfo processing engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("invalid node: {0}")]
    InvalidNode(String),

    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    #[error("invalid node content: {0}")]
    InvalidContent(String),

    #[error("invalid key data: {0}")]
    InvalidKeyData(String),

    #[error("unexpected node: {0}")]
    UnexpectedNode(String),

    #[error("maximum recursion level reached: {0}")]
    MaxLevel(String),

    #[error("retrieval type mismatch: {0}")]
    TypeMismatch(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("transform error: {0}")]
    Transform(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("invalid URI reference: {0}")]
    InvalidUri(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("feature disabled: {0}")]
    Disabled(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
