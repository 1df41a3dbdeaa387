use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::telemetry::{TelemetryField, TelemetrySnapshot};

use super::conditions::monitored_conditions;
use super::types::{FaultCondition, HardwareFault};

#[derive(Debug, Default)]
struct FaultLog {
    /// Every fault raised this session, append-only.
    history: Vec<HardwareFault>,
    /// Condition index to position in `history` for unresolved faults.
    active: HashMap<usize, usize>,
    last_version: Option<u64>,
    revision: u64,
}

/// Turns status words into deduplicated fault records.
///
/// A monitored bit going high opens a fault, staying high bumps its occurrence
/// count, and dropping back to zero resolves it. Faults opened from the same
/// status word in the same evaluation share a correlation id.
#[derive(Debug)]
pub struct FaultCorrelator {
    conditions: Vec<FaultCondition>,
    log: Mutex<FaultLog>,
}

impl Default for FaultCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultCorrelator {
    pub fn new() -> Self {
        Self::with_conditions(monitored_conditions())
    }

    pub fn with_conditions(conditions: Vec<FaultCondition>) -> Self {
        Self {
            conditions,
            log: Mutex::new(FaultLog::default()),
        }
    }

    pub fn conditions(&self) -> &[FaultCondition] {
        &self.conditions
    }

    /// Evaluates a snapshot. Snapshots not newer than the last one seen are ignored.
    ///
    /// The station feeds merged snapshots, where a status word stays present once it
    /// has been reported. Every inbound frame therefore counts as one more occurrence
    /// of each active fault, even when the frame itself did not carry that word.
    ///
    /// Returns true when the fault log changed.
    pub fn evaluate(&self, snapshot: &TelemetrySnapshot) -> bool {
        self.evaluate_at(snapshot, Utc::now())
    }

    pub fn evaluate_at(&self, snapshot: &TelemetrySnapshot, now: DateTime<Utc>) -> bool {
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        if log.last_version.is_some_and(|seen| snapshot.version <= seen) {
            return false;
        }
        log.last_version = Some(snapshot.version);

        let mut correlation: HashMap<TelemetryField, Uuid> = HashMap::new();
        let mut changed = false;

        for (index, condition) in self.conditions.iter().enumerate() {
            // absent words carry no information, leave the fault as it is
            let Some(word) = snapshot.fields.status_word(condition.word) else {
                continue;
            };

            match (condition.is_set(word), log.active.get(&index).copied()) {
                (true, Some(slot)) => {
                    let fault = &mut log.history[slot];
                    fault.occurrence_count = fault.occurrence_count.saturating_add(1);
                    fault.last_seen = now;
                    changed = true;
                }
                (true, None) => {
                    let correlation_id = *correlation
                        .entry(condition.word)
                        .or_insert_with(Uuid::new_v4);
                    let id = log.history.len() as u64 + 1;
                    log::warn!(
                        "Fault {} raised ({}, {}): {}",
                        condition.code,
                        condition.category,
                        condition.severity,
                        condition.description
                    );
                    log.history.push(HardwareFault {
                        id,
                        code: condition.code.clone(),
                        category: condition.category,
                        severity: condition.severity,
                        source: condition.word.to_string(),
                        axis: condition.axis,
                        description: condition.description.clone(),
                        correlation_id,
                        occurrence_count: 1,
                        first_seen: now,
                        last_seen: now,
                        resolved: false,
                        resolved_at: None,
                    });
                    let slot = log.history.len() - 1;
                    log.active.insert(index, slot);
                    changed = true;
                }
                (false, Some(slot)) => {
                    log.active.remove(&index);
                    let fault = &mut log.history[slot];
                    fault.resolved = true;
                    fault.resolved_at = Some(now);
                    log::info!(
                        "Fault {} resolved after {} occurrences",
                        fault.code,
                        fault.occurrence_count
                    );
                    changed = true;
                }
                (false, None) => {}
            }
        }

        if changed {
            log.revision += 1;
        }
        changed
    }

    /// Every fault of the session, oldest first, resolved ones included.
    pub fn all_faults(&self) -> Vec<HardwareFault> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .history
            .clone()
    }

    pub fn active_faults(&self) -> Vec<HardwareFault> {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        let mut slots: Vec<usize> = log.active.values().copied().collect();
        slots.sort_unstable();
        slots.into_iter().map(|s| log.history[s].clone()).collect()
    }

    /// Increments whenever the fault log changes.
    pub fn revision(&self) -> u64 {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).revision
    }

    /// Faults when the log moved past `revision`, `None` when it has not.
    pub fn faults_since(&self, revision: u64) -> Option<(u64, Vec<HardwareFault>)> {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        (log.revision > revision).then(|| (log.revision, log.history.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{FaultCategory, Severity};
    use crate::telemetry::TelemetryFields;
    use chrono::TimeZone;

    fn snapshot(version: u64, fields: TelemetryFields) -> TelemetrySnapshot {
        TelemetrySnapshot {
            version,
            updated_at: None,
            fields,
        }
    }

    fn power(version: u64, word: u32) -> TelemetrySnapshot {
        snapshot(
            version,
            TelemetryFields {
                power_status: Some(word),
                ..Default::default()
            },
        )
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn bit_sequence_0110_yields_one_resolved_fault() {
        let correlator = FaultCorrelator::new();
        // bit 0 of power_status is mains failure
        correlator.evaluate_at(&power(1, 0), at(0));
        assert!(correlator.all_faults().is_empty());

        correlator.evaluate_at(&power(2, 1), at(1));
        let faults = correlator.active_faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].code, "MAINS_POWER_FAILURE");
        assert_eq!(faults[0].occurrence_count, 1);
        assert_eq!(faults[0].source, "power_status");

        correlator.evaluate_at(&power(3, 1), at(2));
        assert_eq!(correlator.active_faults()[0].occurrence_count, 2);
        assert_eq!(correlator.active_faults()[0].last_seen, at(2));

        correlator.evaluate_at(&power(4, 0), at(3));
        assert!(correlator.active_faults().is_empty());
        let all = correlator.all_faults();
        assert_eq!(all.len(), 1);
        assert!(all[0].resolved);
        assert_eq!(all[0].resolved_at, Some(at(3)));
        assert_eq!(all[0].occurrence_count, 2);
        assert_eq!(all[0].first_seen, at(1));
    }

    #[test]
    fn same_word_same_cycle_shares_correlation_id() {
        let correlator = FaultCorrelator::new();
        correlator.evaluate(&snapshot(
            1,
            TelemetryFields {
                power_status: Some(0b1100),
                azimuth_servo_status: Some(0b1),
                ..Default::default()
            },
        ));

        let faults = correlator.active_faults();
        let local = faults.iter().find(|f| f.code == "LOCAL_EMERGENCY_STOP").unwrap();
        let remote = faults.iter().find(|f| f.code == "REMOTE_EMERGENCY_STOP").unwrap();
        let servo = faults.iter().find(|f| f.code == "AZ_SERVO_ALARM").unwrap();

        assert_eq!(local.correlation_id, remote.correlation_id);
        assert_ne!(local.correlation_id, servo.correlation_id);
        assert_eq!(local.category, FaultCategory::Emergency);
        assert_eq!(servo.severity, Severity::Critical);
        assert_eq!(servo.axis, Some(crate::axis::Axis::Azimuth));
    }

    #[test]
    fn absent_words_leave_faults_untouched() {
        let correlator = FaultCorrelator::new();
        correlator.evaluate(&power(1, 0b10));
        correlator.evaluate(&snapshot(
            2,
            TelemetryFields {
                feed_status: Some(0),
                ..Default::default()
            },
        ));
        let active = correlator.active_faults();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].code, "UPS_ON_BATTERY");
        assert_eq!(active[0].occurrence_count, 1);
    }

    #[test]
    fn stale_versions_are_ignored() {
        let correlator = FaultCorrelator::new();
        assert!(correlator.evaluate(&power(5, 1)));
        assert!(!correlator.evaluate(&power(5, 1)));
        assert!(!correlator.evaluate(&power(4, 0)));
        assert_eq!(correlator.active_faults()[0].occurrence_count, 1);
    }

    #[test]
    fn reraised_fault_gets_a_new_record() {
        let correlator = FaultCorrelator::new();
        correlator.evaluate(&power(1, 1));
        correlator.evaluate(&power(2, 0));
        correlator.evaluate(&power(3, 1));

        let all = correlator.all_faults();
        assert_eq!(all.len(), 2);
        assert!(all[0].resolved);
        assert!(!all[1].resolved);
        assert_ne!(all[0].id, all[1].id);
        assert_ne!(all[0].correlation_id, all[1].correlation_id);
    }

    #[test]
    fn revision_tracks_changes() {
        let correlator = FaultCorrelator::new();
        assert_eq!(correlator.revision(), 0);
        assert!(correlator.faults_since(0).is_none());

        correlator.evaluate(&power(1, 0));
        assert_eq!(correlator.revision(), 0);

        correlator.evaluate(&power(2, 1));
        let (revision, faults) = correlator.faults_since(0).unwrap();
        assert_eq!(revision, 1);
        assert_eq!(faults.len(), 1);
        assert!(correlator.faults_since(revision).is_none());
    }
}
