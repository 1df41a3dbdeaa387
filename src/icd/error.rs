use thiserror::Error;

#[derive(Debug, Error)]
pub enum IcdError {
    #[error("frame truncated: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("bad sync word {0:#06x}")]
    BadSync(u16),
    #[error("declared payload length {declared} does not match {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("checksum mismatch: frame {received:#06x}, computed {computed:#06x}")]
    Checksum { received: u16, computed: u16 },
    #[error("unexpected message id {0:#04x}")]
    UnexpectedMessage(u8),
    #[error("unknown telemetry field id {0}")]
    UnknownField(u8),
    #[error("failed to bind ICD socket on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid controller address {0}")]
    InvalidAddress(String),
    #[error("outbound command queue is full")]
    QueueFull,
    #[error("transport is shut down")]
    Closed,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
