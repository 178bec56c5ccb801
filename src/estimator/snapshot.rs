//! Torn-read-free hand-off of the smoothed outputs
//!
//! The audio callback writes a new snapshot every buffer while the display
//! loop polls at its own cadence. Both values travel in one `AtomicU64` so a
//! reader always sees a total/balance pair from the same buffer.

use std::sync::atomic::{AtomicU64, Ordering};

/// Smoothed outputs published by the estimator
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Snapshot {
    /// Smoothed total signal energy, >= 0
    pub total: f32,
    /// Smoothed balance in [0, 2]; 1 is centered
    pub balance: f32,
}

impl Snapshot {
    fn pack(self) -> u64 {
        (u64::from(self.total.to_bits()) << 32) | u64::from(self.balance.to_bits())
    }

    fn unpack(bits: u64) -> Self {
        Self {
            total: f32::from_bits((bits >> 32) as u32),
            balance: f32::from_bits(bits as u32),
        }
    }
}

/// Single-writer, multiple-reader snapshot cell
#[derive(Debug)]
pub struct SnapshotCell(AtomicU64);

impl SnapshotCell {
    pub fn new(snapshot: Snapshot) -> Self {
        Self(AtomicU64::new(snapshot.pack()))
    }

    pub fn store(&self, snapshot: Snapshot) {
        self.0.store(snapshot.pack(), Ordering::Release);
    }

    pub fn load(&self) -> Snapshot {
        Snapshot::unpack(self.0.load(Ordering::Acquire))
    }
}

impl Default for SnapshotCell {
    fn default() -> Self {
        // Matches a fresh estimator: silent and centered
        Self::new(Snapshot {
            total: 0.0,
            balance: 1.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_exact_bit_patterns() {
        let cell = SnapshotCell::default();
        let snap = Snapshot {
            total: 123.456,
            balance: 0.333,
        };
        cell.store(snap);
        assert_eq!(cell.load(), snap);
    }

    #[test]
    fn default_matches_fresh_estimator() {
        let cell = SnapshotCell::default();
        let snap = cell.load();
        assert_eq!(snap.total, 0.0);
        assert_eq!(snap.balance, 1.0);
    }

    #[test]
    fn last_write_wins() {
        let cell = SnapshotCell::default();
        for i in 0..10 {
            cell.store(Snapshot {
                total: i as f32,
                balance: 2.0 - i as f32 * 0.1,
            });
        }
        let snap = cell.load();
        assert_eq!(snap.total, 9.0);
        assert!((snap.balance - 1.1).abs() < 1e-6);
    }
}
