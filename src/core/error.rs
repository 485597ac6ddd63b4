use thiserror::Error;

#[derive(Error, Debug)]
pub enum TagError {
    #[error("Decode format error: {0}")]
    DecodeFormat(String),

    #[error("Depth of {depth} is higher than max of {max}")]
    RecursionLimitExceeded { depth: usize, max: usize },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TagError>;

impl TagError {
    /// Decode-side failures (the stream itself is bad), as opposed to I/O or config problems.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::DecodeFormat(_) | Self::RecursionLimitExceeded { .. }
        )
    }
}

impl From<std::io::Error> for TagError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                Self::DecodeFormat(format!("truncated stream: {}", err))
            }
            _ => Self::IoError(err.to_string()),
        }
    }
}
