use crate::models::metric::Direction;
use crate::models::threshold::{Band, ThresholdSpec};

/// Classifies one metric value. Total over every `f64` and the unavailable
/// marker; NaN is treated as unavailable. The `good` bound is checked first,
/// so overlapping bounds resolve to the better band.
pub fn classify(value: Option<f64>, spec: &ThresholdSpec) -> Band {
    let Some(value) = value.filter(|v| !v.is_nan()) else {
        return Band::Unavailable;
    };

    match spec.direction {
        Direction::HigherIsBetter => {
            if value >= spec.good {
                Band::Good
            } else if value <= spec.bad {
                Band::Bad
            } else {
                Band::Warn
            }
        }
        Direction::LowerIsBetter => {
            if value <= spec.good {
                Band::Good
            } else if value >= spec.bad {
                Band::Bad
            } else {
                Band::Warn
            }
        }
    }
}

/// How far a value sits from healthy, on a 0..=1 scale: 0 at or past the
/// `good` bound, 1 at or past the `bad` bound, linear in between.
pub fn badness(value: Option<f64>, spec: &ThresholdSpec) -> Option<f64> {
    let value = value.filter(|v| !v.is_nan())?;
    let span = spec.bad - spec.good;
    if span == 0.0 {
        return Some(match classify(Some(value), spec) {
            Band::Good => 0.0,
            _ => 1.0,
        });
    }
    Some(((value - spec.good) / span).clamp(0.0, 1.0))
}
