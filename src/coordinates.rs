//! # Sky coordinates
//!
//! Minimal coordinate types used by the catalog lookups and the event containers.
//!
//! ## Overview
//! -----------------
//! * [`SkyPosition`] – equatorial position (right ascension, declination) in **degrees**.
//! * [`AltAz`] – horizontal direction (altitude, azimuth) in **degrees**, azimuth measured
//!   from north towards east.
//! * [`angular_separation`] – great-circle distance between two directions, computed with the
//!   Vincenty formula so it stays accurate for both tiny and antipodal separations.
//! * [`unit_vector`] / [`from_unit_vector`] – conversions to and from Cartesian unit vectors
//!   (`nalgebra::Vector3`), used when averaging directions.
//!
//! Sexagesimal strings (`"HH MM SS.ss"`, `"±DD MM SS.ss"`) can be parsed with
//! [`SkyPosition::from_sexagesimal`].
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::constants::Degree;

/// Wrap an angle into `[0, 360)` degrees.
#[inline]
pub fn wrap_360(angle: Degree) -> Degree {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Cartesian unit vector of a direction given by longitude and latitude in degrees.
pub fn unit_vector(lon: Degree, lat: Degree) -> Vector3<f64> {
    let (sin_lon, cos_lon) = lon.to_radians().sin_cos();
    let (sin_lat, cos_lat) = lat.to_radians().sin_cos();
    Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
}

/// Longitude (wrapped to `[0, 360)`) and latitude in degrees of a non-zero Cartesian vector.
///
/// The vector does not need to be normalized. A zero vector yields `NaN` angles.
pub fn from_unit_vector(v: &Vector3<f64>) -> (Degree, Degree) {
    let norm = v.norm();
    if norm == 0.0 || !norm.is_finite() {
        return (f64::NAN, f64::NAN);
    }
    let lat = (v.z / norm).clamp(-1.0, 1.0).asin().to_degrees();
    let lon = wrap_360(v.y.atan2(v.x).to_degrees());
    (lon, lat)
}

/// Great-circle separation in degrees between `(lon1, lat1)` and `(lon2, lat2)`.
pub fn angular_separation(lon1: Degree, lat1: Degree, lon2: Degree, lat2: Degree) -> Degree {
    let dlon = (lon2 - lon1).to_radians();
    let (sin_dlon, cos_dlon) = dlon.sin_cos();
    let (sin_lat1, cos_lat1) = lat1.to_radians().sin_cos();
    let (sin_lat2, cos_lat2) = lat2.to_radians().sin_cos();

    let num1 = cos_lat2 * sin_dlon;
    let num2 = cos_lat1 * sin_lat2 - sin_lat1 * cos_lat2 * cos_dlon;
    let denominator = sin_lat1 * sin_lat2 + cos_lat1 * cos_lat2 * cos_dlon;

    num1.hypot(num2).atan2(denominator).to_degrees()
}

/// Equatorial sky position, angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyPosition {
    pub ra: Degree,
    pub dec: Degree,
}

impl SkyPosition {
    pub fn new(ra: Degree, dec: Degree) -> Self {
        Self { ra, dec }
    }

    /// Parse a position from sexagesimal strings.
    ///
    /// Arguments
    /// -----------------
    /// * `ra`: right ascension formatted as `HH MM SS.SS`
    /// * `dec`: declination formatted as `±DD MM SS.SS`
    ///
    /// Return
    /// ----------
    /// * `Some(SkyPosition)` in degrees, or `None` when either string is malformed
    pub fn from_sexagesimal(ra: &str, dec: &str) -> Option<Self> {
        let ra_deg = parse_sexagesimal(ra)? * 15.0;
        let dec_deg = parse_sexagesimal(dec)?;
        if !(0.0..360.0).contains(&ra_deg) || !(-90.0..=90.0).contains(&dec_deg) {
            return None;
        }
        Some(Self::new(ra_deg, dec_deg))
    }

    /// Angular distance to `other`, in degrees.
    pub fn separation(&self, other: &SkyPosition) -> Degree {
        angular_separation(self.ra, self.dec, other.ra, other.dec)
    }

    pub fn unit_vector(&self) -> Vector3<f64> {
        unit_vector(self.ra, self.dec)
    }

    pub fn is_finite(&self) -> bool {
        self.ra.is_finite() && self.dec.is_finite()
    }
}

/// Horizontal direction (pointing or reconstructed shower direction), angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AltAz {
    pub alt: Degree,
    pub az: Degree,
}

impl AltAz {
    pub fn new(alt: Degree, az: Degree) -> Self {
        Self { alt, az }
    }

    pub fn unit_vector(&self) -> Vector3<f64> {
        unit_vector(self.az, self.alt)
    }

    /// Direction of a Cartesian vector, azimuth wrapped into `[0, 360)`.
    pub fn from_vector(v: &Vector3<f64>) -> Self {
        let (az, alt) = from_unit_vector(v);
        Self { alt, az }
    }

    pub fn separation(&self, other: &AltAz) -> Degree {
        angular_separation(self.az, self.alt, other.az, other.alt)
    }

    pub fn is_finite(&self) -> bool {
        self.alt.is_finite() && self.az.is_finite()
    }
}

/// Parse `"[±]A B C.CC"` into `A + B/60 + C/3600` with the sign of the first field.
fn parse_sexagesimal(value: &str) -> Option<f64> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() != 3 {
        return None;
    }

    let sign = if parts[0].starts_with('-') { -1.0 } else { 1.0 };
    let d: f64 = parts[0].trim_start_matches(&['-', '+'][..]).parse().ok()?;
    let m: f64 = parts[1].parse().ok()?;
    let s: f64 = parts[2].parse().ok()?;
    if !(0.0..60.0).contains(&m) || !(0.0..60.0).contains(&s) {
        return None;
    }

    Some(sign * (d + m / 60.0 + s / 3600.0))
}
