use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link closed")]
    Closed,
    #[error("link read timeout")]
    Timeout,
    #[error("open port {0}")]
    Open(String),
    #[error("serial: {0}")]
    Serial(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;
