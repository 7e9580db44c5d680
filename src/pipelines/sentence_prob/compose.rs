use std::fmt;

/// Floor applied to oracle probabilities before taking a logarithm, so a zero
/// entry cannot propagate `-inf` through the accumulated sums.
pub(crate) const MIN_TOKEN_PROB: f64 = 1e-12;

/// Allowed deviation of a probability distribution's total mass from 1.0.
pub(crate) const DIST_SUM_TOLERANCE: f64 = 1e-3;

/// How per-position directional probabilities combine into one sentence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CombinationPolicy {
    /// Geometric mean of the forward and backward sentence probabilities,
    /// where each directional probability is the plain product of its
    /// per-token probabilities. Accumulated in log space; underflows toward
    /// zero for long sentences.
    Raw,
    /// Each per-token probability is raised to `1/N` (N = interior token
    /// count) before multiplying, so the result is a per-direction geometric
    /// mean rather than a raw product. Computed in linear space; comparable
    /// across sentence lengths without a calibration table.
    LengthAveraged,
    /// The raw score divided by the calibration-table entry for the sentence's
    /// token count. Lengths absent from the table fall back to divisor 1.
    Calibrated,
}

impl fmt::Display for CombinationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CombinationPolicy::Raw => "raw",
            CombinationPolicy::LengthAveraged => "length-averaged",
            CombinationPolicy::Calibrated => "calibrated",
        };
        f.write_str(name)
    }
}

/// Accumulates per-position true-token probabilities for both directions and
/// exposes the composed sentence score under each policy's arithmetic.
///
/// Raw composition runs in base-10 log space; the length-averaged composition
/// multiplies `1/N`-dampened terms in linear space, as each term is already
/// far from the underflow range.
pub(crate) struct DirectionalAccumulator {
    damp_exponent: f64,
    sum_log10_forward: f64,
    sum_log10_backward: f64,
    damped_forward: f64,
    damped_backward: f64,
}

impl DirectionalAccumulator {
    /// `interior` is the number of positions that will be recorded; must be
    /// nonzero (the degenerate case is rejected before scoring starts).
    pub fn new(interior: usize) -> Self {
        debug_assert!(interior > 0);
        Self {
            damp_exponent: 1.0 / interior as f64,
            sum_log10_forward: 0.0,
            sum_log10_backward: 0.0,
            damped_forward: 1.0,
            damped_backward: 1.0,
        }
    }

    /// Records one interior position's true-token probabilities, clamping
    /// zeros to [`MIN_TOKEN_PROB`]. Returns the base-10 log-probabilities
    /// actually accumulated, for diagnostics.
    pub fn record(&mut self, forward_prob: f64, backward_prob: f64) -> (f64, f64) {
        let pf = forward_prob.max(MIN_TOKEN_PROB);
        let pb = backward_prob.max(MIN_TOKEN_PROB);

        let log_forward = pf.log10();
        let log_backward = pb.log10();
        self.sum_log10_forward += log_forward;
        self.sum_log10_backward += log_backward;

        self.damped_forward *= pf.powf(self.damp_exponent);
        self.damped_backward *= pb.powf(self.damp_exponent);

        (log_forward, log_backward)
    }

    /// `10^(0.5 * (sum_log_forward + sum_log_backward))`.
    pub fn raw(&self) -> f64 {
        10f64.powf(0.5 * (self.sum_log10_forward + self.sum_log10_backward))
    }

    /// `sqrt(forward_damped_product * backward_damped_product)`.
    pub fn length_averaged(&self) -> f64 {
        (self.damped_forward * self.damped_backward).sqrt()
    }
}
