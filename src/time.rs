//! Epoch helpers built on [`hifitime::Epoch`].
//!
//! Catalog reference epochs are Julian epochs expressed in the TT scale, event timestamps are
//! stored on disk as MJD in TAI. Elapsed times used by proper-motion propagation are expressed in
//! Julian years of 365.25 days.
use hifitime::{Epoch, TimeScale};

use crate::constants::{DAYS_PER_JULIAN_YEAR, MJD, SECONDS_PER_JULIAN_YEAR, T2000};

/// Build an epoch from a Modified Julian Date in the TT time scale.
pub fn epoch_from_mjd_tt(mjd: MJD) -> Epoch {
    Epoch::from_mjd_in_time_scale(mjd, TimeScale::TT)
}

/// Build the epoch of a Julian year, e.g. `2000.0` for J2000.0 or `1991.25` for the Hipparcos epoch.
///
/// Arguments
/// -----------------
/// * `year`: the Julian epoch as a decimal year
///
/// Return
/// ----------
/// * the corresponding [`Epoch`] in TT
pub fn julian_epoch(year: f64) -> Epoch {
    epoch_from_mjd_tt(T2000 + (year - 2000.0) * DAYS_PER_JULIAN_YEAR)
}

/// J2000.0 (2000-01-01 12:00:00 TT)
pub fn j2000() -> Epoch {
    epoch_from_mjd_tt(T2000)
}

/// Elapsed time from `from` to `to` in Julian years (negative when `to` precedes `from`).
pub fn julian_years_between(from: Epoch, to: Epoch) -> f64 {
    (to - from).to_seconds() / SECONDS_PER_JULIAN_YEAR
}

/// Convert an epoch into the decimal Julian year it represents.
pub fn to_julian_year(epoch: Epoch) -> f64 {
    2000.0 + julian_years_between(j2000(), epoch)
}

/// Serialise an optional epoch as MJD (TAI) for table storage.
pub(crate) fn to_mjd_tai(epoch: Option<Epoch>) -> Option<MJD> {
    epoch.map(|e| e.to_mjd_tai_days())
}

/// Inverse of [`to_mjd_tai`].
pub(crate) fn from_mjd_tai(mjd: Option<MJD>) -> Option<Epoch> {
    mjd.filter(|m| m.is_finite()).map(Epoch::from_mjd_tai)
}
