use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;

use super::fields::TelemetryFields;
use super::liveness::Liveness;

/// Merged hardware state at one point in time.
///
/// Snapshots are immutable once published; every update produces a new one with a
/// strictly greater `version`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub version: u64,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub fields: TelemetryFields,
}

/// Single authoritative telemetry snapshot, written by the receive path.
///
/// Readers clone an `Arc` out of a `watch` channel. `send_modify` holds the channel's
/// write lock while a merge runs, so a reader can wait for at most one merge.
#[derive(Debug)]
pub struct TelemetryStore {
    tx: watch::Sender<Arc<TelemetrySnapshot>>,
    liveness: Liveness,
}

impl TelemetryStore {
    pub fn new(link_timeout: Duration) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(TelemetrySnapshot::default()));
        Self {
            tx,
            liveness: Liveness::new(link_timeout),
        }
    }

    /// Merges a partial frame and publishes the result. Returns the new version.
    pub fn update(&self, partial: &TelemetryFields) -> u64 {
        let mut version = 0;
        self.tx.send_modify(|current| {
            let mut next = (**current).clone();
            next.fields.merge(partial);
            next.version = current.version + 1;
            next.updated_at = Some(Utc::now());
            version = next.version;
            *current = Arc::new(next);
        });
        self.liveness.record(Instant::now());
        version
    }

    pub fn read(&self) -> (Arc<TelemetrySnapshot>, u64) {
        let snapshot = self.current();
        let version = snapshot.version;
        (snapshot, version)
    }

    pub fn current(&self) -> Arc<TelemetrySnapshot> {
        self.tx.borrow().clone()
    }

    pub fn version(&self) -> u64 {
        self.tx.borrow().version
    }

    /// Receiver that wakes on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<TelemetrySnapshot>> {
        self.tx.subscribe()
    }

    /// Drops every known field. The version still advances.
    pub fn clear(&self) {
        self.tx.send_modify(|current| {
            *current = Arc::new(TelemetrySnapshot {
                version: current.version + 1,
                updated_at: Some(Utc::now()),
                fields: TelemetryFields::default(),
            });
        });
        log::info!("Telemetry snapshot cleared");
    }

    pub fn is_connected(&self) -> bool {
        self.liveness.is_connected()
    }

    pub fn is_connected_at(&self, now: Instant) -> bool {
        self.liveness.is_connected_at(now)
    }

    /// Time since the last update, `None` if nothing was ever received.
    pub fn age(&self) -> Option<Duration> {
        self.liveness.age_at(Instant::now())
    }
}
