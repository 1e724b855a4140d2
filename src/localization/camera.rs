//! Pinhole intrinsics and Brown-Conrady lens distortion coefficients.
//!
//! Distortion is not applied here; the coefficients travel with the request
//! to the matching engine.

use crate::error::{VpsError, VpsResult};

/// Pinhole camera intrinsics in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> VpsResult<Self> {
        let k = Self { fx, fy, cx, cy };
        k.validate()?;
        Ok(k)
    }

    /// Accepts `[fx, fy, cx, cy]` or a row-major 3x3 camera matrix.
    pub fn from_slice(values: &[f64]) -> VpsResult<Self> {
        match values.len() {
            4 => Self::new(values[0], values[1], values[2], values[3]),
            9 => Self::new(values[0], values[4], values[2], values[5]),
            n => Err(VpsError::InvalidInput(format!(
                "intrinsics need 4 or 9 values, got {n}"
            ))),
        }
    }

    pub fn validate(&self) -> VpsResult<()> {
        let finite = [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.fx <= 0.0 || self.fy <= 0.0 {
            return Err(VpsError::InvalidInput(format!(
                "invalid intrinsics fx={} fy={} cx={} cy={}",
                self.fx, self.fy, self.cx, self.cy
            )));
        }
        Ok(())
    }

    /// Intrinsics for an image box-downsampled by `(sx, sy)` pixels per
    /// output pixel along each axis.
    ///
    /// Pixel centers move with the box filter: a source pixel center `u`
    /// lands at `(u + 0.5) / s - 0.5`.
    pub fn downscaled(&self, sx: u32, sy: u32) -> Self {
        let (sx, sy) = (sx.max(1) as f64, sy.max(1) as f64);
        Self {
            fx: self.fx / sx,
            fy: self.fy / sy,
            cx: (self.cx + 0.5) / sx - 0.5,
            cy: (self.cy + 0.5) / sy - 0.5,
        }
    }
}

/// Brown-Conrady distortion (radial k1, k2, k3; tangential p1, p2).
///
/// Coefficients arrive in the common `[k1, k2, p1, p2, k3]` order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    /// Accepts `[k1, k2, p1, p2]` or `[k1, k2, p1, p2, k3]`.
    pub fn from_slice(values: &[f64]) -> VpsResult<Self> {
        if !(values.len() == 4 || values.len() == 5) {
            return Err(VpsError::InvalidInput(format!(
                "distortion needs 4 or 5 coefficients, got {}",
                values.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(VpsError::InvalidInput(
                "non-finite distortion coefficient".into(),
            ));
        }
        Ok(Self {
            k1: values[0],
            k2: values[1],
            p1: values[2],
            p2: values[3],
            k3: values.get(4).copied().unwrap_or(0.0),
        })
    }

    pub fn is_identity(&self) -> bool {
        self.k1 == 0.0 && self.k2 == 0.0 && self.p1 == 0.0 && self.p2 == 0.0 && self.k3 == 0.0
    }
}
