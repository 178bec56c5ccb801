//! Terminal meter and JSON event output
//!
//! Maps estimator snapshots to a single-line direction meter on stderr or to
//! newline-delimited JSON events on stdout. The meter marker sits at the
//! balance position and widens with the log of the total energy, so loudness
//! reads as size without swamping the scale.

use crate::estimator::{Mode, Snapshot};
use std::io::Write;

/// Meter bar width in characters; odd so the center mark is exact
pub const METER_WIDTH: usize = 41;

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum OutputFormat {
    Text,
    Json,
}

/// One per-update event for `--format json`
#[derive(Debug, serde::Serialize)]
pub struct StatusEvent {
    pub mode: Mode,
    pub total: f32,
    pub balance: f32,
    /// Milliseconds since the Unix epoch
    pub ts: i64,
}

impl StatusEvent {
    pub fn new(mode: Mode, snapshot: Snapshot) -> Self {
        Self {
            mode,
            total: snapshot.total,
            balance: snapshot.balance,
            ts: jiff::Timestamp::now().as_millisecond(),
        }
    }
}

/// Render a snapshot as a fixed-width meter line
///
/// Balance 2 is all energy on the left channel, 0 all on the right, so the
/// marker position runs right-to-left over the balance range. The marker
/// half-width follows log(total + 1).
pub fn meter_line(snapshot: &Snapshot, mode: Mode, width: usize) -> String {
    let width = width.max(9) | 1;
    let mut bar = vec!['-'; width];
    bar[width / 2] = '+';

    let balance = snapshot.balance.clamp(0.0, 2.0);
    let fraction = (2.0 - balance) / 2.0;
    let pos = (fraction * (width - 1) as f32).round() as usize;

    let level = (snapshot.total.max(0.0) + 1.0).ln();
    let half = ((level * 1.5).round() as usize).min(width / 4);
    let lo = pos.saturating_sub(half);
    let hi = (pos + half).min(width - 1);
    for slot in &mut bar[lo..=hi] {
        *slot = '#';
    }

    let bar: String = bar.into_iter().collect();
    format!(
        "[{}] total {:9.3}  balance {:5.3}  {}",
        bar,
        snapshot.total,
        balance,
        mode.as_str()
    )
}

/// Redraw the meter in place on stderr
pub fn draw_meter(line: &str) {
    let mut err = std::io::stderr();
    let _ = write!(err, "\r\x1b[2K{}", line);
    let _ = err.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker_center(line: &str) -> usize {
        let bar: Vec<char> = line
            .trim_start_matches('[')
            .chars()
            .take(METER_WIDTH)
            .collect();
        let first = bar.iter().position(|&c| c == '#').unwrap();
        let last = METER_WIDTH - 1 - bar.iter().rev().position(|&c| c == '#').unwrap();
        (first + last) / 2
    }

    #[test]
    fn centered_balance_lands_on_center_mark() {
        let line = meter_line(
            &Snapshot {
                total: 1.0,
                balance: 1.0,
            },
            Mode::Locating,
            METER_WIDTH,
        );
        assert_eq!(marker_center(&line), METER_WIDTH / 2);
    }

    #[test]
    fn balance_extremes_pin_to_the_edges() {
        let left = meter_line(
            &Snapshot {
                total: 0.5,
                balance: 2.0,
            },
            Mode::Locating,
            METER_WIDTH,
        );
        assert!(left.starts_with("[#"));

        let right = meter_line(
            &Snapshot {
                total: 0.5,
                balance: 0.0,
            },
            Mode::Locating,
            METER_WIDTH,
        );
        let bar: String = right.chars().take(METER_WIDTH + 2).collect();
        assert!(bar.ends_with("#]"));
    }

    #[test]
    fn marker_widens_with_loudness() {
        let count = |total: f32| {
            meter_line(
                &Snapshot {
                    total,
                    balance: 1.0,
                },
                Mode::Locating,
                METER_WIDTH,
            )
            .chars()
            .filter(|&c| c == '#')
            .count()
        };
        assert!(count(100.0) > count(0.1));
    }

    #[test]
    fn out_of_range_balance_is_clamped() {
        let line = meter_line(
            &Snapshot {
                total: 0.0,
                balance: 7.5,
            },
            Mode::Locating,
            METER_WIDTH,
        );
        assert!(line.contains("balance 2.000"));
    }

    #[test]
    fn status_event_serializes_mode_names() {
        let event = StatusEvent::new(
            Mode::Calibrating,
            Snapshot {
                total: 2.0,
                balance: 1.0,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"mode\":\"calibrating\""));
        assert!(json.contains("\"ts\":"));
    }
}
