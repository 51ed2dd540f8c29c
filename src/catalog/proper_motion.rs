//! Linear proper-motion propagation.
//!
//! Catalog positions are given at the catalog reference epoch. Moving them to another epoch uses
//! the linear model
//!
//! ```text
//! δ(t) = δ₀ + μδ · Δt
//! α(t) = α₀ + μα* · Δt / cos δ₀
//! ```
//!
//! with `μα* = μα · cos δ` and `μδ` in milliarcseconds per Julian year and `Δt` in Julian years.
//! Parallax, radial velocity and light-time effects are ignored; for the stars of the packaged
//! catalogs the resulting error stays well below an arcsecond over a century.
use serde::{Deserialize, Serialize};

use crate::constants::{MasPerYear, MAS_PER_DEGREE};
use crate::coordinates::{wrap_360, SkyPosition};

/// Proper motion of a star, in milliarcseconds per Julian year.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProperMotion {
    /// Motion in right ascension, already multiplied by `cos δ`.
    pub pm_ra_cosdec: MasPerYear,
    pub pm_dec: MasPerYear,
}

impl ProperMotion {
    pub fn new(pm_ra_cosdec: MasPerYear, pm_dec: MasPerYear) -> Self {
        Self {
            pm_ra_cosdec,
            pm_dec,
        }
    }

    /// Total angular rate, in milliarcseconds per Julian year.
    pub fn total(&self) -> MasPerYear {
        self.pm_ra_cosdec.hypot(self.pm_dec)
    }
}

/// Propagate `position` by `elapsed_years` of proper motion.
///
/// Arguments
/// -----------------
/// * `position`: catalog position at its reference epoch
/// * `pm`: proper motion of the star
/// * `elapsed_years`: time since the reference epoch in Julian years (may be negative)
///
/// Return
/// ----------
/// * The propagated position, RA wrapped into `[0, 360)` and declination clamped into
///   `[-90, 90]`. When `elapsed_years == 0` the input is returned unchanged, bit for bit.
pub fn apply_proper_motion(
    position: SkyPosition,
    pm: &ProperMotion,
    elapsed_years: f64,
) -> SkyPosition {
    if elapsed_years == 0.0 {
        return position;
    }

    let dec = position.dec + pm.pm_dec * elapsed_years / MAS_PER_DEGREE;
    let cos_dec = position.dec.to_radians().cos();
    let ra = if cos_dec.abs() > f64::EPSILON {
        position.ra + pm.pm_ra_cosdec * elapsed_years / MAS_PER_DEGREE / cos_dec
    } else {
        // RA is undefined on the pole itself
        position.ra
    };

    SkyPosition::new(wrap_360(ra), dec.clamp(-90.0, 90.0))
}
