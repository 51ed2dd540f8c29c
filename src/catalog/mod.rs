//! # Bright-star catalogs
//!
//! Lookups of bright stars for pointing calibration and star masking, with positions corrected
//! for proper motion to the time of the observation.
//!
//! ## Overview
//! -----------------
//! Two catalogs are packaged with the library (see [`resources`]):
//!
//! | [`StarCatalog`]        | Identifiers | Reference epoch |
//! |------------------------|-------------|-----------------|
//! | [`StarCatalog::Yale`]  | HR numbers  | J2000.0         |
//! | [`StarCatalog::Hipparcos`] | HIP numbers | J1991.25    |
//!
//! [`get_bright_stars`] is the single entry point. The observation **time is mandatory**: every
//! returned [`BrightStar`] carries its position propagated from the catalog epoch to that time
//! (see [`proper_motion::apply_proper_motion`]) together with the untouched catalog position.
//!
//! ## Filters
//! -----------------
//! * `magnitude_cut` – keep stars with `vmag <= magnitude_cut`.
//! * `pointing` + `radius` – keep stars whose **propagated** position lies within `radius`
//!   degrees of `pointing`. Both must be given together.
//!
//! Results are sorted by magnitude, brightest first.
//!
//! ## Example
//! -----------------
//! ```rust
//! use hifitime::Epoch;
//! use iactpipe::catalog::{get_bright_stars, StarCatalog};
//! use iactpipe::coordinates::SkyPosition;
//!
//! let time = Epoch::from_gregorian_utc_at_midnight(2024, 1, 15);
//! let orion = SkyPosition::new(83.82, -5.39);
//! let stars = get_bright_stars(time, StarCatalog::Yale, Some(orion), Some(5.0), Some(2.5)).unwrap();
//! assert!(stars.iter().any(|s| s.name.as_deref() == Some("Alnilam")));
//! ```
pub mod proper_motion;
pub mod resources;

use std::fmt;
use std::str::FromStr;

use hifitime::Epoch;
use serde::{Deserialize, Serialize};

use crate::constants::{Degree, Magnitude};
use crate::coordinates::SkyPosition;
use crate::pipe_errors::PipeError;
use crate::time::{julian_epoch, julian_years_between};

pub use proper_motion::{apply_proper_motion, ProperMotion};
use resources::catalog_entries;

/// Packaged bright-star catalogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StarCatalog {
    /// Yale Bright Star Catalogue, positions at J2000.0.
    Yale,
    /// Hipparcos main catalogue (bright subset), positions at J1991.25.
    Hipparcos,
}

impl StarCatalog {
    /// Epoch at which the catalog positions are given.
    pub fn reference_epoch(&self) -> Epoch {
        match self {
            StarCatalog::Yale => julian_epoch(2000.0),
            StarCatalog::Hipparcos => julian_epoch(1991.25),
        }
    }

    /// File name of the packaged resource under `resources/catalogs/`.
    pub fn resource_name(&self) -> &'static str {
        match self {
            StarCatalog::Yale => "yale_bright_star.csv",
            StarCatalog::Hipparcos => "hipparcos_bright_star.csv",
        }
    }
}

impl fmt::Display for StarCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StarCatalog::Yale => write!(f, "Yale"),
            StarCatalog::Hipparcos => write!(f, "Hipparcos"),
        }
    }
}

impl FromStr for StarCatalog {
    type Err = PipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yale" => Ok(StarCatalog::Yale),
            "hipparcos" => Ok(StarCatalog::Hipparcos),
            _ => Err(PipeError::UnknownCatalog(s.to_string())),
        }
    }
}

/// A star returned by [`get_bright_stars`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrightStar {
    pub catalog: StarCatalog,
    pub catalog_id: u32,
    pub name: Option<String>,
    /// Position propagated to the query time.
    pub position: SkyPosition,
    /// Position at the catalog reference epoch.
    pub catalog_position: SkyPosition,
    pub vmag: Magnitude,
    pub proper_motion: ProperMotion,
}

/// Select bright stars from a packaged catalog.
///
/// Arguments
/// -----------------
/// * `time`: observation time; positions are propagated from the catalog epoch to this time.
/// * `catalog`: which packaged catalog to query.
/// * `pointing`: optional reference position for the proximity filter.
/// * `radius`: proximity radius in degrees, required together with `pointing`.
/// * `magnitude_cut`: optional faint limit, stars with `vmag <= magnitude_cut` are kept.
///
/// Return
/// ----------
/// * The selected stars sorted brightest first, or
///   [`PipeError::InvalidStarQuery`] when only one of `pointing`/`radius` is given or a filter
///   value is not usable.
///
/// See also
/// ------------
/// * [`apply_proper_motion`] – The propagation model.
/// * [`StarCatalog::reference_epoch`] – Epoch of the unpropagated positions.
pub fn get_bright_stars(
    time: Epoch,
    catalog: StarCatalog,
    pointing: Option<SkyPosition>,
    radius: Option<Degree>,
    magnitude_cut: Option<Magnitude>,
) -> Result<Vec<BrightStar>, PipeError> {
    let region = match (pointing, radius) {
        (Some(p), Some(r)) => {
            if !p.is_finite() {
                return Err(PipeError::InvalidStarQuery(format!(
                    "pointing must be finite, got ({}, {})",
                    p.ra, p.dec
                )));
            }
            if !r.is_finite() || r < 0.0 {
                return Err(PipeError::InvalidStarQuery(format!(
                    "radius must be a non-negative number of degrees, got {r}"
                )));
            }
            Some((p, r))
        }
        (None, None) => None,
        (Some(_), None) => {
            return Err(PipeError::InvalidStarQuery(
                "a pointing was given without a radius".into(),
            ))
        }
        (None, Some(_)) => {
            return Err(PipeError::InvalidStarQuery(
                "a radius was given without a pointing".into(),
            ))
        }
    };
    if let Some(cut) = magnitude_cut {
        if !cut.is_finite() {
            return Err(PipeError::InvalidStarQuery(format!(
                "magnitude cut must be finite, got {cut}"
            )));
        }
    }

    let elapsed = julian_years_between(catalog.reference_epoch(), time);
    let entries = catalog_entries(catalog)?;

    let mut stars: Vec<BrightStar> = entries
        .iter()
        .filter(|entry| magnitude_cut.is_none_or(|cut| entry.vmag <= cut))
        .filter_map(|entry| {
            let position = apply_proper_motion(entry.position, &entry.proper_motion, elapsed);
            if let Some((center, r)) = region {
                if center.separation(&position) > r {
                    return None;
                }
            }
            Some(BrightStar {
                catalog,
                catalog_id: entry.id,
                name: entry.name.clone(),
                position,
                catalog_position: entry.position,
                vmag: entry.vmag,
                proper_motion: entry.proper_motion,
            })
        })
        .collect();

    stars.sort_by(|a, b| a.vmag.total_cmp(&b.vmag));

    log::debug!(
        "{} stars selected from {catalog} ({elapsed:.3} yr from catalog epoch)",
        stars.len()
    );
    Ok(stars)
}
