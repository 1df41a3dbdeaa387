use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::IcdConfig;
use crate::telemetry::{Liveness, PartialTelemetry};

use super::backoff::Backoff;
use super::codec::IcdCodec;
use super::error::IcdError;
use super::frame::CommandFrame;
use super::CommandSink;

/// Largest datagram the receive worker accepts.
const MAX_DATAGRAM: usize = 2048;

#[derive(Debug, Default)]
struct Counters {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    send_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub send_failures: u64,
}

/// UDP exchange with the antenna control unit.
///
/// Commands are encoded on the caller's thread and queued; a sender worker owns the
/// socket writes so `send_command` never blocks and is safe from any number of callers.
pub struct IcdTransport {
    codec: Arc<dyn IcdCodec>,
    outbound: mpsc::Sender<Vec<u8>>,
    queue: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    liveness: Liveness,
    counters: Counters,
}

/// Join handles of the two socket workers.
pub struct TransportWorkers {
    pub local_addr: SocketAddr,
    pub sender: JoinHandle<()>,
    pub receiver: JoinHandle<()>,
}

impl IcdTransport {
    pub fn new(codec: Arc<dyn IcdCodec>, link_timeout: Duration, queue_depth: usize) -> Self {
        let (outbound, queue) = mpsc::channel(queue_depth.max(1));
        Self {
            codec,
            outbound,
            queue: Mutex::new(Some(queue)),
            liveness: Liveness::new(link_timeout),
            counters: Counters::default(),
        }
    }

    pub fn codec(&self) -> &Arc<dyn IcdCodec> {
        &self.codec
    }

    /// Decodes one received datagram. Malformed frames are logged and dropped.
    pub fn on_receive(&self, bytes: &[u8]) -> Option<PartialTelemetry> {
        self.counters.frames_received.fetch_add(1, Ordering::Relaxed);
        match self.codec.decode(bytes) {
            Ok(partial) => {
                self.liveness.record(Instant::now());
                Some(partial)
            }
            Err(e) => {
                self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("Dropping malformed ICD frame ({} bytes): {}", bytes.len(), e);
                None
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.liveness.is_connected()
    }

    pub fn is_connected_at(&self, now: Instant) -> bool {
        self.liveness.is_connected_at(now)
    }

    pub fn stats(&self) -> TransportStats {
        TransportStats {
            frames_sent: self.counters.frames_sent.load(Ordering::Relaxed),
            frames_received: self.counters.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.counters.frames_dropped.load(Ordering::Relaxed),
            send_failures: self.counters.send_failures.load(Ordering::Relaxed),
        }
    }

    /// Hands the encoded outbound queue to the caller instead of a socket worker.
    ///
    /// Returns `None` once the queue was taken, by this or by [`IcdTransport::start`].
    pub fn take_outbound(&self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Binds the socket and spawns the sender and receive workers.
    ///
    /// `on_telemetry` runs on the receive worker for every decoded frame and must not block.
    pub async fn start<F>(
        self: &Arc<Self>,
        config: &IcdConfig,
        on_telemetry: F,
        shutdown: CancellationToken,
    ) -> Result<TransportWorkers, IcdError>
    where
        F: FnMut(PartialTelemetry) + Send + 'static,
    {
        let remote: SocketAddr = config
            .controller
            .parse()
            .map_err(|_| IcdError::InvalidAddress(config.controller.clone()))?;
        let socket = UdpSocket::bind(&config.bind)
            .await
            .map_err(|source| IcdError::Bind {
                addr: config.bind.clone(),
                source,
            })?;
        let socket = Arc::new(socket);
        let local_addr = socket.local_addr()?;
        let queue = self.take_outbound().ok_or(IcdError::Closed)?;

        log::info!("ICD link bound on {}, controller at {}", local_addr, remote);

        let sender = tokio::spawn(run_sender(
            Arc::clone(self),
            Arc::clone(&socket),
            remote,
            queue,
            SendPolicy {
                retries: config.send_retries,
                initial: config.retry_initial,
                max: config.retry_max,
            },
            shutdown.clone(),
        ));
        let receiver = tokio::spawn(run_receiver(
            Arc::clone(self),
            socket,
            Backoff::new(config.retry_initial, config.retry_max),
            on_telemetry,
            shutdown,
        ));

        Ok(TransportWorkers {
            local_addr,
            sender,
            receiver,
        })
    }
}

impl CommandSink for IcdTransport {
    fn send_command(&self, frame: &CommandFrame) -> Result<(), IcdError> {
        let bytes = self.codec.encode(frame);
        self.outbound.try_send(bytes).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                log::warn!("ICD send queue full, dropping {} command", frame.name());
                IcdError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => IcdError::Closed,
        })?;
        log::debug!("Queued {} command", frame.name());
        Ok(())
    }
}

struct SendPolicy {
    retries: u32,
    initial: Duration,
    max: Duration,
}

async fn run_sender(
    transport: Arc<IcdTransport>,
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    mut queue: mpsc::Receiver<Vec<u8>>,
    policy: SendPolicy,
    shutdown: CancellationToken,
) {
    loop {
        let bytes = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = queue.recv() => match next {
                Some(bytes) => bytes,
                None => break,
            },
        };

        let mut backoff = Backoff::new(policy.initial, policy.max);
        let mut attempt = 0;
        loop {
            match socket.send_to(&bytes, remote).await {
                Ok(_) => {
                    transport.counters.frames_sent.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                Err(e) if attempt < policy.retries => {
                    attempt += 1;
                    let delay = backoff.next_delay();
                    log::warn!(
                        "ICD send failed ({}), retry {}/{} in {:?}",
                        e,
                        attempt,
                        policy.retries,
                        delay
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    transport.counters.send_failures.fetch_add(1, Ordering::Relaxed);
                    log::error!("ICD send failed after {} retries, frame dropped: {}", attempt, e);
                    break;
                }
            }
        }
    }
    log::info!("ICD sender stopped");
}

async fn run_receiver<F>(
    transport: Arc<IcdTransport>,
    socket: Arc<UdpSocket>,
    mut backoff: Backoff,
    mut on_telemetry: F,
    shutdown: CancellationToken,
) where
    F: FnMut(PartialTelemetry) + Send + 'static,
{
    let mut buffer = [0u8; MAX_DATAGRAM];
    loop {
        let received = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            r = socket.recv_from(&mut buffer) => r,
        };

        match received {
            Ok((len, from)) => {
                backoff.reset();
                log::trace!("ICD datagram of {} bytes from {}", len, from);
                if let Some(partial) = transport.on_receive(&buffer[..len]) {
                    on_telemetry(partial);
                }
            }
            Err(e) => {
                let delay = backoff.next_delay();
                log::warn!("ICD receive error ({}), backing off {:?}", e, delay);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
    log::info!("ICD receiver stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AxisMask;
    use crate::icd::BinaryCodec;
    use crate::telemetry::TelemetryFields;

    fn transport(depth: usize) -> IcdTransport {
        IcdTransport::new(Arc::new(BinaryCodec), Duration::from_secs(5), depth)
    }

    #[test]
    fn queued_commands_are_encoded_in_order() {
        let transport = transport(8);
        let mut queue = transport.take_outbound().unwrap();

        transport
            .send_command(&CommandFrame::Stop {
                axes: AxisMask::AZIMUTH,
            })
            .unwrap();
        transport.send_command(&CommandFrame::Stow).unwrap();

        let first = BinaryCodec.decode_command(&queue.try_recv().unwrap()).unwrap();
        let second = BinaryCodec.decode_command(&queue.try_recv().unwrap()).unwrap();
        assert_eq!(
            first,
            CommandFrame::Stop {
                axes: AxisMask::AZIMUTH
            }
        );
        assert_eq!(second, CommandFrame::Stow);
        assert!(transport.take_outbound().is_none());
    }

    #[test]
    fn full_queue_reports_error_without_blocking() {
        let transport = transport(1);
        let _queue = transport.take_outbound().unwrap();
        transport.send_command(&CommandFrame::Stow).unwrap();
        assert!(matches!(
            transport.send_command(&CommandFrame::Stow),
            Err(IcdError::QueueFull)
        ));
    }

    #[test]
    fn closed_queue_reports_error() {
        let transport = transport(1);
        drop(transport.take_outbound());
        assert!(matches!(
            transport.send_command(&CommandFrame::Stow),
            Err(IcdError::Closed)
        ));
    }

    #[test]
    fn malformed_frames_are_dropped_and_counted() {
        let transport = transport(1);
        assert!(transport.on_receive(&[0x01, 0x02, 0x03]).is_none());
        assert!(!transport.is_connected());

        let good = BinaryCodec.encode_telemetry(&TelemetryFields {
            elevation_angle: Some(12.5),
            ..Default::default()
        });
        let partial = transport.on_receive(&good).unwrap();
        assert_eq!(partial.elevation_angle, Some(12.5));
        assert!(transport.is_connected());

        let stats = transport.stats();
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.frames_dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn link_drops_after_timeout() {
        let transport = transport(1);
        let good = BinaryCodec.encode_telemetry(&TelemetryFields::default());
        transport.on_receive(&good);
        assert!(transport.is_connected());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!transport.is_connected());

        transport.on_receive(&good);
        assert!(transport.is_connected());
    }
}
