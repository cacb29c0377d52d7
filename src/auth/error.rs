use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unknown app id")]
    UnknownApp,
    #[error("token signature mismatch")]
    BadSignature,
    #[error("token malformed: {0}")]
    Malformed(String),
}
