//! # Constants and type definitions for iactpipe
//!
//! This module centralizes the **astronomical constants**, **conversion factors**, and **common
//! type definitions** used throughout the crate.
//!
//! ## Overview
//!
//! - Time constants (Julian year, reference epochs expressed as MJD in TT)
//! - Unit conversions (milliarcseconds ↔ degrees)
//! - Core type aliases for angles, energies and identifiers
//!
//! These definitions are shared by the star catalog, the event containers, and the writers.

// -------------------------------------------------------------------------------------------------
// Time constants
// -------------------------------------------------------------------------------------------------

/// Number of seconds in a Julian day
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Number of days in a Julian year
pub const DAYS_PER_JULIAN_YEAR: f64 = 365.25;

/// Number of seconds in a Julian year
pub const SECONDS_PER_JULIAN_YEAR: f64 = DAYS_PER_JULIAN_YEAR * SECONDS_PER_DAY;

/// MJD epoch of J2000.0 (2000-01-01 12:00:00 TT)
pub const T2000: f64 = 51544.5;

/// MJD epoch of J1991.25, the Hipparcos catalog epoch (TT)
pub const T1991_25: f64 = T2000 - 8.75 * DAYS_PER_JULIAN_YEAR;

// -------------------------------------------------------------------------------------------------
// Angular conversions
// -------------------------------------------------------------------------------------------------

/// Milliarcseconds in one degree
pub const MAS_PER_DEGREE: f64 = 3_600_000.0;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angular rate in milliarcseconds per Julian year
pub type MasPerYear = f64;
/// Energy in TeV
pub type TeV = f64;
/// Distance in meters
pub type Meter = f64;
/// Area in square meters
pub type SquareMeter = f64;
/// Apparent visual magnitude
pub type Magnitude = f64;
/// Modified Julian Date (days)
pub type MJD = f64;

/// Identifier of an observation block (one simulation or data-taking run)
pub type ObsId = u64;
/// Identifier of an array event inside an observation block
pub type EventId = u64;
/// Identifier of a telescope in the subarray
pub type TelId = u16;
