use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("packet too short or malformed")]
    PacketError,
    #[error("unsupported cipher mode")]
    UnsupportedMode,
    #[error("signature verification failed")]
    IncorrectSignature,
    #[error("decryption failed")]
    CryptoError,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("link is closed")]
    Closed,
    #[error("request timed out")]
    Timeout,
    #[error("buffer too small")]
    OutOfMemory,
}
