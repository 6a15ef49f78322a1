use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RigError {
    #[error("no link attached")]
    TransportUnavailable,
    #[error("group form not accepted by device: {0}")]
    ProtocolMismatch(String),
    #[error("no acknowledgment for {0} within window")]
    AckTimeout(String),
    #[error("device rejected {frame}: {reply}")]
    DeviceRejected { frame: String, reply: String },
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("unknown channel {0}")]
    UnknownChannel(u8),
    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),
    #[error("invalid state: {0}")]
    State(String),
}

impl RigError {
    /// Errors after which nothing more can reach the device until it is reconnected.
    pub fn is_link_loss(&self) -> bool {
        matches!(self, Self::TransportUnavailable | Self::ConnectionLost(_))
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
