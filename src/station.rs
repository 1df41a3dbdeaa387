use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dispatch::{CommandDispatcher, Offsets};
use crate::fault::{FaultCorrelator, HardwareFault};
use crate::icd::{BinaryCodec, IcdError, IcdTransport, TransportStats, TransportWorkers};
use crate::telemetry::{TelemetrySnapshot, TelemetryStore};
use crate::tracker::{TrackingCoordinator, TrackingMode, TrackingStatus};

/// Compact view of the station for logs and external distribution.
#[derive(Debug, Clone, Serialize)]
pub struct StationReport {
    pub name: Option<String>,
    pub connected: bool,
    pub telemetry_version: u64,
    pub link: TransportStats,
    pub tracking: TrackingStatus,
    pub active_faults: Vec<String>,
    pub fault_revision: u64,
    pub offsets: Offsets,
}

/// Wires the ICD link, telemetry store, fault correlator, dispatcher and
/// tracking coordinator for one antenna.
pub struct Station {
    config: Config,
    transport: Arc<IcdTransport>,
    store: Arc<TelemetryStore>,
    correlator: Arc<FaultCorrelator>,
    dispatcher: Arc<CommandDispatcher>,
    coordinator: TrackingCoordinator,
    shutdown: CancellationToken,
    workers: Mutex<Option<TransportWorkers>>,
}

impl Station {
    pub fn new(config: Config) -> Self {
        let transport = Arc::new(IcdTransport::new(
            Arc::new(BinaryCodec),
            config.icd.link_timeout,
            config.icd.send_queue,
        ));
        let store = Arc::new(TelemetryStore::new(config.icd.link_timeout));
        let dispatcher = Arc::new(CommandDispatcher::new(
            transport.clone(),
            config.tracking.limits,
        ));
        let coordinator = TrackingCoordinator::new(
            Arc::clone(&dispatcher),
            Arc::clone(&store),
            config.tracking.clone(),
        );

        Self {
            config,
            transport,
            store,
            correlator: Arc::new(FaultCorrelator::new()),
            dispatcher,
            coordinator,
            shutdown: CancellationToken::new(),
            workers: Mutex::new(None),
        }
    }

    /// Binds the ICD socket and starts the receive and send workers.
    ///
    /// Every decoded frame is merged into the store and the merged snapshot
    /// is evaluated for faults on the receive worker.
    pub async fn start(&self) -> Result<SocketAddr, IcdError> {
        let store = Arc::clone(&self.store);
        let correlator = Arc::clone(&self.correlator);
        let workers = self
            .transport
            .start(
                &self.config.icd,
                move |partial| {
                    store.update(&partial);
                    correlator.evaluate(&store.current());
                },
                self.shutdown.child_token(),
            )
            .await?;
        let local_addr = workers.local_addr;
        *self.workers.lock().unwrap_or_else(|e| e.into_inner()) = Some(workers);
        Ok(local_addr)
    }

    pub fn name(&self) -> Option<&str> {
        self.config.station.name.as_deref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<TelemetryStore> {
        &self.store
    }

    pub fn transport(&self) -> &Arc<IcdTransport> {
        &self.transport
    }

    pub fn correlator(&self) -> &Arc<FaultCorrelator> {
        &self.correlator
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    pub fn coordinator(&self) -> &TrackingCoordinator {
        &self.coordinator
    }

    pub fn current_telemetry(&self) -> Arc<TelemetrySnapshot> {
        self.store.current()
    }

    pub fn current_tracking_status(&self) -> TrackingStatus {
        self.coordinator.status()
    }

    /// Unresolved faults.
    pub fn current_faults(&self) -> Vec<HardwareFault> {
        self.correlator.active_faults()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn offsets(&self) -> Offsets {
        self.dispatcher.offsets()
    }

    pub fn report(&self) -> StationReport {
        StationReport {
            name: self.config.station.name.clone(),
            connected: self.is_connected(),
            telemetry_version: self.store.version(),
            link: self.transport.stats(),
            tracking: self.coordinator.status(),
            active_faults: self
                .correlator
                .active_faults()
                .into_iter()
                .map(|f| f.code)
                .collect(),
            fault_revision: self.correlator.revision(),
            offsets: self.offsets(),
        }
    }

    /// Stops every automated mode, then the socket workers.
    pub async fn shutdown(&self) {
        if let Some(mode) = self.coordinator.status().running_mode() {
            if let Err(e) = self.coordinator.stop(mode) {
                log::warn!("Stop of {} on shutdown failed: {}", mode, e);
            }
        }
        self.coordinator.shutdown().await;
        self.shutdown.cancel();

        let workers = self.workers.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(workers) = workers {
            let _ = workers.sender.await;
            let _ = workers.receiver.await;
        }
        log::info!("Station stopped");
    }
}

impl Drop for Station {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for Station {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Station")
            .field("name", &self.config.station.name)
            .field("connected", &self.is_connected())
            .finish()
    }
}
