//! Binomial subjective-logic opinions.
//!
//! The graded speed check turns a speed deviation into an opinion
//! `(belief, disbelief, uncertainty)` and reduces it to a scalar expectation
//! through a [`Fuse`] implementation. [`BaseRateFusion`] is the closed-form
//! default; any other fusion can be injected.

use serde::{Deserialize, Serialize};

/// Default a-priori probability used when projecting uncertainty.
pub const DEFAULT_BASE_RATE: f64 = 0.5;

/// An opinion about "this message is honest".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Opinion {
    pub belief: f64,
    pub disbelief: f64,
    pub uncertainty: f64,
}

impl Opinion {
    pub fn new(belief: f64, disbelief: f64, uncertainty: f64) -> Self {
        Self {
            belief,
            disbelief,
            uncertainty,
        }
    }

    /// Full trust up to the fixed uncertainty mass.
    pub fn trusted(uncertainty: f64) -> Self {
        Self::new(1.0 - uncertainty, 0.0, uncertainty)
    }

    /// Opinion for a deviation `delta` measured against `threshold`.
    ///
    /// Disbelief grows linearly with `delta / threshold` and saturates at
    /// `1 - uncertainty` once the deviation reaches the threshold.
    pub fn from_deviation(delta: f64, threshold: f64, uncertainty: f64) -> Self {
        let mass = 1.0 - uncertainty;
        if delta <= 0.0 {
            Self::trusted(uncertainty)
        } else if delta < threshold {
            let disbelief = delta / threshold * mass;
            Self::new(mass - disbelief, disbelief, uncertainty)
        } else {
            Self::new(0.0, mass, uncertainty)
        }
    }
}

/// Reduces an opinion to a probability expectation in `[0, 1]`.
pub trait Fuse: Send + Sync {
    fn fuse(&self, belief: f64, disbelief: f64, uncertainty: f64) -> f64;

    fn expectation(&self, opinion: &Opinion) -> f64 {
        self.fuse(opinion.belief, opinion.disbelief, opinion.uncertainty)
    }
}

impl<F> Fuse for F
where
    F: Fn(f64, f64, f64) -> f64 + Send + Sync,
{
    fn fuse(&self, belief: f64, disbelief: f64, uncertainty: f64) -> f64 {
        self(belief, disbelief, uncertainty)
    }
}

/// Projected probability `E = b + u * a`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseRateFusion {
    pub base_rate: f64,
}

impl BaseRateFusion {
    pub fn new(base_rate: f64) -> Self {
        Self { base_rate }
    }
}

impl Default for BaseRateFusion {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_RATE)
    }
}

impl Fuse for BaseRateFusion {
    fn fuse(&self, belief: f64, _disbelief: f64, uncertainty: f64) -> f64 {
        (belief + uncertainty * self.base_rate).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const U: f64 = 0.1;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_opinion_regions() {
        let o = Opinion::from_deviation(0.0, 10.0, U);
        assert!(close(o.belief, 0.9));
        assert_eq!(o.disbelief, 0.0);

        let o = Opinion::from_deviation(5.0, 10.0, U);
        assert!(close(o.disbelief, 0.45));
        assert!(close(o.belief, 0.45));
        assert!(close(o.belief + o.disbelief + o.uncertainty, 1.0));

        let o = Opinion::from_deviation(10.0, 10.0, U);
        assert!(close(o.belief, 0.0));
        assert!(close(o.disbelief, 0.9));
    }

    #[test]
    fn test_base_rate_expectation() {
        let fusion = BaseRateFusion::default();
        assert!(close(fusion.expectation(&Opinion::trusted(U)), 0.95));
        assert!(close(
            fusion.expectation(&Opinion::from_deviation(20.0, 10.0, U)),
            0.05
        ));
    }

    #[test]
    fn test_closure_can_be_injected() {
        let pessimist = |_b: f64, _d: f64, _u: f64| 0.0;
        assert_eq!(pessimist.expectation(&Opinion::trusted(U)), 0.0);
    }
}
