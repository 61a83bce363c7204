// src/state.rs
//! Shared position state
//!
//! The only channel between the acquisition loop and everything that reads
//! position data. Snapshots are replaced whole, never edited in place, so a
//! reader can't see a new fix paired with an old timestamp.

use crate::gps::data::{ConnectionState, SharedSnapshot};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;

/// Cheap to clone; all clones share the same cell.
#[derive(Debug, Clone)]
pub struct SharedPositionState {
    inner: Arc<RwLock<SharedSnapshot>>,
}

impl SharedPositionState {
    /// New cell holding a disconnected snapshot stamped now.
    pub fn new() -> Self {
        Self::with_snapshot(SharedSnapshot::disconnected(Utc::now()))
    }

    pub fn with_snapshot(snapshot: SharedSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(snapshot)),
        }
    }

    /// Replace the current snapshot.
    pub fn write(&self, snapshot: SharedSnapshot) {
        *self.inner.write() = snapshot;
    }

    /// Point-in-time copy of the current snapshot.
    pub fn read(&self) -> SharedSnapshot {
        self.inner.read().clone()
    }

    /// Replace the snapshot with one that only differs in connection state.
    pub fn update_connection(&self, connection: ConnectionState) {
        let mut guard = self.inner.write();
        let next = guard.with_connection(connection);
        *guard = next;
    }
}

impl Default for SharedPositionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::data::Fix;
    use chrono::Duration;
    use std::thread;

    #[test]
    fn test_starts_disconnected_without_fix() {
        let state = SharedPositionState::new();
        let snapshot = state.read();
        assert_eq!(snapshot.connection, ConnectionState::Disconnected);
        assert!(!snapshot.fix.valid);
    }

    #[test]
    fn test_write_replaces_snapshot() {
        let state = SharedPositionState::new();
        let mut fix = Fix::invalid(Utc::now());
        fix.valid = true;
        fix.latitude = 45.5;

        state.write(SharedSnapshot::with_fix(fix.clone()));
        let snapshot = state.read();
        assert_eq!(snapshot.fix, fix);
        assert_eq!(snapshot.last_updated, fix.timestamp);
        assert!(snapshot.connection.is_connected());
    }

    #[test]
    fn test_update_connection_keeps_fix() {
        let state = SharedPositionState::new();
        let before = state.read();

        state.update_connection(ConnectionState::Connecting);
        let after = state.read();
        assert_eq!(after.connection, ConnectionState::Connecting);
        assert_eq!(after.fix, before.fix);
        assert_eq!(after.last_updated, before.last_updated);
    }

    #[test]
    fn test_concurrent_reads_never_torn() {
        let state = SharedPositionState::new();
        let base = Utc::now();

        let writer = {
            let state = state.clone();
            thread::spawn(move || {
                for i in 0..2_000i64 {
                    // Latitude and timestamp move together; a torn read would break the pairing.
                    let mut fix = Fix::invalid(base + Duration::milliseconds(i));
                    fix.valid = true;
                    fix.latitude = i as f64 / 100.0;
                    state.write(SharedSnapshot::with_fix(fix));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let state = state.clone();
                thread::spawn(move || {
                    for _ in 0..2_000 {
                        let snapshot = state.read();
                        if snapshot.fix.valid {
                            let i = (snapshot.fix.timestamp - base).num_milliseconds();
                            assert_eq!(snapshot.fix.latitude, i as f64 / 100.0);
                            assert_eq!(snapshot.last_updated, snapshot.fix.timestamp);
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
