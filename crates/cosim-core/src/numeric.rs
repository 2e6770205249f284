use crate::CoreError;

/// Floating point type used throughout the system
pub type Real = f64;

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, CoreError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Residuals must be finite and non-negative; anything else is reported.
pub fn ensure_residual(v: Real, what: &'static str) -> Result<Real, CoreError> {
    let v = ensure_finite(v, what)?;
    if v < 0.0 {
        return Err(CoreError::InvalidArg {
            what: "residual must be non-negative",
        });
    }
    Ok(v)
}

/// `|value| / rated * 100`, clamped to `[0, 100]`.
///
/// A non-positive rating yields zero.
pub fn percent_of_rating(value: Real, rated: Real) -> Real {
    if rated <= 0.0 {
        return 0.0;
    }
    (value.abs() / rated * 100.0).clamp(0.0, 100.0)
}

/// Linear interpolation through sorted `(x, y)` breakpoints, flat outside.
pub fn interp_linear(points: &[(Real, Real)], x: Real) -> Real {
    match points {
        [] => 0.0,
        [(_, y)] => *y,
        _ => {
            let (x0, y0) = points[0];
            if x <= x0 {
                return y0;
            }
            for pair in points.windows(2) {
                let (xa, ya) = pair[0];
                let (xb, yb) = pair[1];
                if x <= xb {
                    if xb - xa <= 0.0 {
                        return yb;
                    }
                    return ya + (yb - ya) * (x - xa) / (xb - xa);
                }
            }
            points[points.len() - 1].1
        }
    }
}
