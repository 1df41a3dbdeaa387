mod backoff;
mod codec;
mod error;
mod frame;
mod transport;

pub use backoff::Backoff;
pub use codec::{BinaryCodec, IcdCodec};
pub use error::IcdError;
pub use frame::{CommandFrame, MessageId};
pub use transport::{IcdTransport, TransportStats, TransportWorkers};

/// Destination for outbound command frames.
///
/// Implementations must not block: delivery is fire-and-forget.
pub trait CommandSink: Send + Sync {
    fn send_command(&self, frame: &CommandFrame) -> Result<(), IcdError>;
}
