use crate::CoreError;

/// Floating point type used throughout the engine
pub type Real = f64;

/// Absolute/relative tolerance pair
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, CoreError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Check every entry of a slice, reporting the first offender.
pub fn ensure_all_finite(values: &[Real], what: &'static str) -> Result<(), CoreError> {
    for &v in values {
        ensure_finite(v, what)?;
    }
    Ok(())
}

/// Max-norm of a slice. Empty slices have norm zero.
pub fn inf_norm(values: &[Real]) -> Real {
    values.iter().fold(0.0, |acc, v| acc.max(v.abs()))
}

/// Closed interval `[lower, upper]` attached to a single scalar decision variable.
///
/// Infinite ends mean "unbounded on that side".
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds {
    pub lower: Real,
    pub upper: Real,
}

impl Default for Bounds {
    fn default() -> Self {
        Self::FREE
    }
}

impl Bounds {
    pub const FREE: Bounds = Bounds {
        lower: Real::NEG_INFINITY,
        upper: Real::INFINITY,
    };

    pub fn new(lower: Real, upper: Real) -> Self {
        Self { lower, upper }
    }

    /// Both ends pinned to `value`.
    pub fn fixed(value: Real) -> Self {
        Self {
            lower: value,
            upper: value,
        }
    }

    pub fn at_most(upper: Real) -> Self {
        Self {
            lower: Real::NEG_INFINITY,
            upper,
        }
    }

    pub fn at_least(lower: Real) -> Self {
        Self {
            lower,
            upper: Real::INFINITY,
        }
    }

    /// Reject NaN ends and `lower > upper`.
    pub fn validate(&self, what: &str) -> Result<(), CoreError> {
        if self.lower.is_nan() || self.upper.is_nan() || self.lower > self.upper {
            return Err(CoreError::InvalidBounds {
                what: what.to_string(),
                lower: self.lower,
                upper: self.upper,
            });
        }
        Ok(())
    }

    pub fn contains(&self, v: Real) -> bool {
        v >= self.lower && v <= self.upper
    }

    /// Nearest point of the interval.
    pub fn project(&self, v: Real) -> Real {
        v.max(self.lower).min(self.upper)
    }

    pub fn is_fixed(&self) -> bool {
        self.lower == self.upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn nearly_equal_basic() {
        let tol = Tolerances {
            abs: 1e-12,
            rel: 1e-9,
        };
        assert!(nearly_equal(1.0, 1.0 + 1e-12, tol));
        assert!(nearly_equal(0.0, 1e-13, tol));
        assert!(!nearly_equal(1.0, 1.0 + 1e-6, tol));
    }

    #[test]
    fn ensure_finite_detects_nan() {
        let err = ensure_finite(Real::NAN, "test").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Non-finite"));
    }

    #[test]
    fn bounds_validation() {
        assert!(Bounds::new(0.0, 1.0).validate("u").is_ok());
        assert!(Bounds::fixed(2.0).validate("x0").is_ok());
        assert!(Bounds::FREE.validate("x").is_ok());
        assert!(Bounds::new(1.0, 0.0).validate("u").is_err());
        assert!(Bounds::new(Real::NAN, 0.0).validate("u").is_err());
    }

    #[test]
    fn inf_norm_of_empty_is_zero() {
        assert_eq!(inf_norm(&[]), 0.0);
        assert_eq!(inf_norm(&[1.0, -3.0, 2.0]), 3.0);
    }

    proptest! {
        #[test]
        fn projection_lands_inside(lo in -1e3f64..1e3, width in 0.0f64..1e3, v in -1e4f64..1e4) {
            let b = Bounds::new(lo, lo + width);
            let p = b.project(v);
            prop_assert!(b.contains(p));
            if b.contains(v) {
                prop_assert_eq!(p, v);
            }
        }
    }
}
