use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Preamble not found before the scan deadline")]
    SyncTimeout,

    #[error("No correction within {max_errors} bit flips zeroes the CRC remainder")]
    Uncorrectable { max_errors: usize },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Bit sequence of length {0} is not aligned to 4-bit symbols")]
    Alignment(usize),

    #[error("Invalid frame length: {0} bits")]
    InvalidFrameLength(usize),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient data")]
    InsufficientData,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Decode failure: {0}")]
    DecodeFailure(#[source] Box<LinkError>),
}

impl LinkError {
    /// The underlying cause of a `DecodeFailure`, or the error itself.
    pub fn cause(&self) -> &LinkError {
        match self {
            LinkError::DecodeFailure(inner) => inner.cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
