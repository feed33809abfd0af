//! Canonical, order-independent threshold signatures.
//!
//! Two strategies share a sentinel exactly when their signatures compare equal.
//! Values are sorted, deduplicated and quantized to a fixed number of decimal
//! digits so that `[0.5, 0.25]` and `[0.25, 0.5, 0.50000001]` collapse to the
//! same key.

use std::fmt;

/// Hashable threshold set. Construct through [`ThresholdSignature::new`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ThresholdSignature {
    scale: u32,
    steps: Vec<u32>,
}

fn scale_for(precision: u32) -> u32 {
    10u32.saturating_pow(precision.min(9))
}

impl ThresholdSignature {
    /// Canonicalize `values`. Callers validate ranges first; anything non-finite is
    /// dropped and the rest are clamped into [0, 1].
    pub fn new(values: &[f32], precision: u32) -> Self {
        let scale = scale_for(precision);
        let mut steps: Vec<u32> = values
            .iter()
            .filter(|v| v.is_finite())
            .map(|v| (f64::from(v.clamp(0.0, 1.0)) * f64::from(scale)).round() as u32)
            .collect();
        steps.sort_unstable();
        steps.dedup();
        Self { scale, steps }
    }

    /// Canonical threshold list handed to the visibility watcher.
    pub fn values(&self) -> Vec<f32> {
        self.steps
            .iter()
            .map(|s| (f64::from(*s) / f64::from(self.scale)) as f32)
            .collect()
    }

    /// Smallest threshold, or 0 for an empty set.
    pub fn min(&self) -> f32 {
        self.steps
            .first()
            .map(|s| (f64::from(*s) / f64::from(self.scale)) as f32)
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for ThresholdSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, v) in self.values().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        f.write_str("]")
    }
}
