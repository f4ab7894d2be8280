//! Memory Buffer (C3): the one shared mutable structure between the poll
//! task and the flush task (spec.md §4.3, §5 "Shared-resource policy").
//!
//! Typed maps replace the source's dictionary-of-dictionaries per spec.md
//! §9. `drain()` takes a snapshot copy under the lock and clears the live
//! maps in the same critical section, so the flush transaction always
//! operates on data the next poll can no longer mutate.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::upstream::snapshot::{ControllerSample, PilotSample, Snapshot, TransceiverSample};

type PilotKey = (String, i32, DateTime<Utc>);
type ControllerKey = (String, i32, DateTime<Utc>);

#[derive(Debug, Default)]
struct BufferInner {
    pilots_by_key: HashMap<PilotKey, PilotSample>,
    controllers_by_key: HashMap<ControllerKey, ControllerSample>,
    transceivers_pending: Vec<TransceiverSample>,
}

/// The contents of one drain: everything the flush task needs, decoupled
/// from the live buffer so the next poll can proceed immediately.
#[derive(Debug, Default, Clone)]
pub struct Drained {
    pub pilots: Vec<PilotSample>,
    pub controllers: Vec<ControllerSample>,
    pub transceivers: Vec<TransceiverSample>,
}

impl Drained {
    pub fn is_empty(&self) -> bool {
        self.pilots.is_empty() && self.controllers.is_empty() && self.transceivers.is_empty()
    }
}

/// Process-local staging area. Cheaply `Clone`-able (an `Arc` inside) so it
/// can be handed to both the poller and the flusher tasks.
#[derive(Clone)]
pub struct Buffer {
    inner: std::sync::Arc<Mutex<BufferInner>>,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer {
    pub fn new() -> Self {
        Self {
            inner: std::sync::Arc::new(Mutex::new(BufferInner::default())),
        }
    }

    /// Merge one filtered snapshot into the buffer. Latest-wins: within the
    /// same tick, a later sample for an identity key overwrites an earlier
    /// one; across ticks, every call overwrites whatever was there before.
    pub async fn ingest(&self, snapshot: Snapshot) {
        let mut inner = self.inner.lock().await;
        for pilot in snapshot.pilots {
            inner.pilots_by_key.insert(pilot.identity(), pilot);
        }
        for controller in snapshot.controllers {
            inner.controllers_by_key.insert(controller.identity(), controller);
        }
        inner.transceivers_pending.extend(snapshot.transceivers);
    }

    /// Re-merge a previously drained batch back into the buffer after a
    /// failed flush transaction (spec.md §4.4: a rolled-back flush must not
    /// lose the buffer's contents). Unlike `ingest`, this is *not*
    /// unconditional latest-wins: a poll tick can land a newer sample for
    /// the same identity while the flush's DB round trip is in flight
    /// (spawn_blocking), so blindly re-inserting the drained (older) value
    /// would push `last_updated` backward. Each key is only overwritten if
    /// nothing newer is already sitting in the buffer.
    pub async fn reingest(&self, drained: Drained) {
        let mut inner = self.inner.lock().await;
        for pilot in drained.pilots {
            let key = pilot.identity();
            let keep_existing = inner
                .pilots_by_key
                .get(&key)
                .is_some_and(|existing| existing.last_updated >= pilot.last_updated);
            if !keep_existing {
                inner.pilots_by_key.insert(key, pilot);
            }
        }
        for controller in drained.controllers {
            let key = controller.identity();
            let keep_existing = inner
                .controllers_by_key
                .get(&key)
                .is_some_and(|existing| existing.last_updated >= controller.last_updated);
            if !keep_existing {
                inner.controllers_by_key.insert(key, controller);
            }
        }
        inner.transceivers_pending.extend(drained.transceivers);
    }

    /// Atomically take everything currently buffered and clear the maps.
    /// The returned `Drained` is a private copy; the batch writer's
    /// transaction never touches the live buffer directly (spec.md §5:
    /// "the flush performs its transaction on a snapshot copy").
    pub async fn drain(&self) -> Drained {
        let mut inner = self.inner.lock().await;
        let pilots: Vec<PilotSample> = inner.pilots_by_key.drain().map(|(_, v)| v).collect();
        let controllers: Vec<ControllerSample> =
            inner.controllers_by_key.drain().map(|(_, v)| v).collect();
        let transceivers = std::mem::take(&mut inner.transceivers_pending);
        Drained {
            pilots,
            controllers,
            transceivers,
        }
    }

    /// Trim buffered pilot/controller state whose `last_updated` is older
    /// than `timeout_cutoff` (spec.md §4.3, "Aperiodic cleanup_interval").
    /// This prunes in-memory staging state only; it has no bearing on rows
    /// already flushed to the live tables.
    pub async fn cleanup_stale(&self, timeout_cutoff: DateTime<Utc>) -> (usize, usize) {
        let mut inner = self.inner.lock().await;
        let before_pilots = inner.pilots_by_key.len();
        inner
            .pilots_by_key
            .retain(|_, sample| sample.last_updated >= timeout_cutoff);
        let pilots_trimmed = before_pilots - inner.pilots_by_key.len();

        let before_controllers = inner.controllers_by_key.len();
        inner
            .controllers_by_key
            .retain(|_, sample| sample.last_updated >= timeout_cutoff);
        let controllers_trimmed = before_controllers - inner.controllers_by_key.len();

        (pilots_trimmed, controllers_trimmed)
    }

    pub async fn len(&self) -> (usize, usize, usize) {
        let inner = self.inner.lock().await;
        (
            inner.pilots_by_key.len(),
            inner.controllers_by_key.len(),
            inner.transceivers_pending.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pilot(callsign: &str, logon: DateTime<Utc>, last_updated: DateTime<Utc>) -> PilotSample {
        PilotSample {
            callsign: callsign.into(),
            cid: 1,
            name: None,
            latitude: None,
            longitude: None,
            altitude: None,
            groundspeed: None,
            heading: None,
            transponder: None,
            departure: None,
            arrival: None,
            route: None,
            flight_rules: None,
            aircraft_type: None,
            aircraft_faa: None,
            aircraft_short: None,
            planned_altitude: None,
            deptime: None,
            enroute_time: None,
            fuel_time: None,
            remarks: None,
            logon_time: logon,
            last_updated,
        }
    }

    #[tokio::test]
    async fn test_latest_wins_within_same_identity_key() {
        let buffer = Buffer::new();
        let logon = Utc::now();
        let mut snapshot = Snapshot::default();
        snapshot.pilots.push(pilot("QFA1", logon, logon));
        buffer.ingest(snapshot).await;

        let mut snapshot2 = Snapshot::default();
        let later = logon + chrono::Duration::seconds(30);
        snapshot2.pilots.push(pilot("QFA1", logon, later));
        buffer.ingest(snapshot2).await;

        let drained = buffer.drain().await;
        assert_eq!(drained.pilots.len(), 1);
        assert_eq!(drained.pilots[0].last_updated, later);
    }

    #[tokio::test]
    async fn test_reingest_does_not_clobber_newer_sample() {
        // A poll tick lands a newer sample while a flush is in flight; the
        // failed flush's reingest of the (now stale) drained batch must
        // not push last_updated backward.
        let buffer = Buffer::new();
        let logon = Utc::now();
        let drained = Drained {
            pilots: vec![pilot("QFA1", logon, logon)],
            controllers: Vec::new(),
            transceivers: Vec::new(),
        };

        let later = logon + chrono::Duration::seconds(30);
        let mut fresh = Snapshot::default();
        fresh.pilots.push(pilot("QFA1", logon, later));
        buffer.ingest(fresh).await;

        buffer.reingest(drained).await;

        let result = buffer.drain().await;
        assert_eq!(result.pilots.len(), 1);
        assert_eq!(result.pilots[0].last_updated, later);
    }

    #[tokio::test]
    async fn test_reingest_restores_sample_absent_from_buffer() {
        let buffer = Buffer::new();
        let logon = Utc::now();
        let drained = Drained {
            pilots: vec![pilot("QFA1", logon, logon)],
            controllers: Vec::new(),
            transceivers: Vec::new(),
        };
        buffer.reingest(drained).await;

        let result = buffer.drain().await;
        assert_eq!(result.pilots.len(), 1);
        assert_eq!(result.pilots[0].last_updated, logon);
    }

    #[tokio::test]
    async fn test_drain_clears_buffer() {
        let buffer = Buffer::new();
        let logon = Utc::now();
        let mut snapshot = Snapshot::default();
        snapshot.pilots.push(pilot("QFA1", logon, logon));
        buffer.ingest(snapshot).await;

        let first = buffer.drain().await;
        assert_eq!(first.pilots.len(), 1);
        let second = buffer.drain().await;
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_stale_trims_old_entries() {
        let buffer = Buffer::new();
        let old = Utc::now() - chrono::Duration::minutes(30);
        let mut snapshot = Snapshot::default();
        snapshot.pilots.push(pilot("STALE1", old, old));
        buffer.ingest(snapshot).await;

        let cutoff = Utc::now() - chrono::Duration::minutes(10);
        let (pilots_trimmed, _) = buffer.cleanup_stale(cutoff).await;
        assert_eq!(pilots_trimmed, 1);
        let (pilot_count, _, _) = buffer.len().await;
        assert_eq!(pilot_count, 0);
    }
}
