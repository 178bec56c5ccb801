//! Sound direction and loudness estimation
//!
//! The estimator consumes stereo sample buffers and produces two smoothed
//! scalars: total signal energy and left/right balance. A calibration phase
//! accumulates per-channel energy totals that later correct for microphone
//! gain mismatch.

mod snapshot;

pub use snapshot::{Snapshot, SnapshotCell};

/// Exponential smoothing decay: ~80% weight to history, 20% to the new buffer
const SMOOTHING_FACTOR: f32 = 0.8;

/// Operating mode, driven by the control path
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Idle, no buffers are delivered
    Description,
    /// Accumulating per-channel calibration energy
    Calibrating,
    /// Estimating direction and loudness
    Locating,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Description => "idle",
            Mode::Calibrating => "calibrating",
            Mode::Locating => "locating",
        }
    }
}

/// Side effect requested by a mode transition
///
/// Capture start/stop is owned by the driver; the estimator only applies
/// `ResetCalibration` itself. Keeping these as values makes the transition
/// table testable without a live audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    StartCapture,
    StopCapture,
    ResetCalibration,
}

/// Effects for a mode transition
///
/// Capture runs whenever the mode is not `Description`; entering
/// `Calibrating` from any other mode discards previous calibration data.
/// Same-mode transitions produce nothing.
pub fn transition_effects(old: Mode, new: Mode) -> Vec<Effect> {
    let mut effects = Vec::new();
    if old != Mode::Description && new == Mode::Description {
        effects.push(Effect::StopCapture);
    } else if old == Mode::Description && new != Mode::Description {
        effects.push(Effect::StartCapture);
    }
    if new == Mode::Calibrating && old != Mode::Calibrating {
        effects.push(Effect::ResetCalibration);
    }
    effects
}

/// One block of stereo samples, borrowed for the duration of a processing call
#[derive(Debug, Clone, Copy)]
pub struct StereoBuffer<'a> {
    pub left: &'a [f32],
    pub right: &'a [f32],
}

impl<'a> StereoBuffer<'a> {
    pub fn new(left: &'a [f32], right: &'a [f32]) -> Self {
        Self { left, right }
    }
}

/// Stateful per-buffer estimator
///
/// Single writer: all mutation happens on the audio callback thread. Readers
/// observe the outputs through a [`SnapshotCell`].
#[derive(Debug)]
pub struct Estimator {
    mode: Mode,
    cal_total_left: f32,
    cal_total_right: f32,
    // Raw per-buffer scratch, recomputed every call
    raw_balance: f32,
    raw_total: f32,
    smoothed_total: f32,
    smoothed_balance: f32,
}

impl Estimator {
    pub fn new() -> Self {
        Self {
            mode: Mode::Description,
            cal_total_left: 0.0,
            cal_total_right: 0.0,
            raw_balance: 1.0,
            raw_total: 0.0,
            smoothed_total: 0.0,
            smoothed_balance: 1.0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Calibration energy totals accumulated so far (left, right)
    pub fn calibration_totals(&self) -> (f32, f32) {
        (self.cal_total_left, self.cal_total_right)
    }

    /// Current smoothed outputs as one consistent pair
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            total: self.smoothed_total,
            balance: self.smoothed_balance,
        }
    }

    /// Switch modes, returning the side effects the driver should apply
    ///
    /// Entering `Calibrating` resets the calibration accumulator and the
    /// smoothed outputs; every other transition leaves state untouched.
    /// Setting the current mode again is a no-op.
    pub fn set_mode(&mut self, new_mode: Mode) -> Vec<Effect> {
        let effects = transition_effects(self.mode, new_mode);
        if effects.contains(&Effect::ResetCalibration) {
            self.cal_total_left = 0.0;
            self.cal_total_right = 0.0;
            self.smoothed_total = 0.0;
            self.smoothed_balance = 1.0;
        }
        self.mode = new_mode;
        effects
    }

    /// Process one stereo buffer under the given mode
    ///
    /// Calibrating buffers only feed the accumulator; any other mode updates
    /// the smoothed energy total and the energy-weighted balance, applying
    /// the calibration correction when one exists. Empty, mismatched, or
    /// non-finite buffers are dropped whole so NaN can never reach the
    /// smoothing state.
    pub fn process_buffer(&mut self, buffer: &StereoBuffer<'_>, mode: Mode) {
        if buffer.left.is_empty() || buffer.left.len() != buffer.right.len() {
            return;
        }

        // Per-channel energy: sum of squared magnitudes over the block
        let mut sum1: f32 = buffer.left.iter().map(|s| s * s).sum();
        let mut sum2: f32 = buffer.right.iter().map(|s| s * s).sum();
        if !sum1.is_finite() || !sum2.is_finite() {
            return;
        }

        if mode == Mode::Calibrating {
            self.cal_total_left += sum1;
            self.cal_total_right += sum2;
        } else {
            // Rescale by the calibration ratio so a channel that picked up
            // systematically more energy during calibration reads balanced
            // again. Equal totals (including the uncalibrated 0 == 0 case)
            // need no correction.
            if self.cal_total_left != self.cal_total_right {
                let cal_sum = self.cal_total_left + self.cal_total_right;
                sum1 *= self.cal_total_right / cal_sum * 2.0;
                sum2 *= self.cal_total_left / cal_sum * 2.0;
            }
            self.raw_balance = if sum1 == sum2 {
                1.0
            } else {
                (2.0 * sum1) / (sum1 + sum2)
            };
        }

        self.raw_total = sum1 + sum2;

        let old_weight = self.smoothed_total * SMOOTHING_FACTOR;
        let new_weight = self.raw_total * (1.0 - SMOOTHING_FACTOR);
        self.smoothed_total = old_weight + new_weight;

        // Balance is frozen at its reset value for the whole calibration run.
        // The update is weighted by energy contribution, not a plain EMA, so
        // loud buffers move the estimate faster than quiet ones.
        if mode != Mode::Calibrating {
            if old_weight == new_weight {
                self.smoothed_balance = 0.0;
            } else {
                self.smoothed_balance = (self.smoothed_balance * old_weight
                    + self.raw_balance * new_weight)
                    / self.smoothed_total;
            }
        }
    }
}

impl Default for Estimator {
    fn default() -> Self {
        Self::new()
    }
}
