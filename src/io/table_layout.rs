//! # On-disk layout of processed data
//!
//! Processed output is a directory of CSV tables plus a few JSON documents. The
//! [`DataWriter`](super::DataWriter) produces it and the
//! [`TableEventSource`](super::TableEventSource) reads it back.
//!
//! ## Directory structure
//! -----------------
//! ```text
//! <output>/
//! ├── metadata.json                               format, data levels, tables, counts
//! ├── configuration/
//! │   ├── subarray.json                           SubarrayDescription
//! │   ├── run_config.json                         configuration of the producing tool
//! │   └── simulation/run.csv                      one SimulationConfig per run
//! ├── simulation/
//! │   ├── event/subarray/shower.csv               true shower parameters
//! │   └── service/shower_distribution.json        SimulatedShowerDistribution list
//! ├── dl1/event/
//! │   ├── subarray/trigger.csv                    one row per array event
//! │   └── telescope/parameters.csv                Hillas parameters per telescope event
//! └── dl2/event/
//!     ├── telescope/<property>/<prefix>.csv       mono predictions
//!     └── subarray/<property>/<prefix>.csv        stereo predictions
//! ```
//!
//! Telescope lists are stored as `;`-separated ids, missing values as empty cells and invalid
//! predictions as `NaN`.
use serde::{Deserialize, Serialize};

use super::containers::{
    EventIndex, HillasParameters, ParticleClassification, ReconstructedEnergy,
    ReconstructedGeometry, SimulatedShower, TelescopeList,
};
use super::event_source::DataLevel;
use crate::constants::{EventId, ObsId, TelId, MJD};
use crate::stereo::CombineProperty;

pub const FORMAT_NAME: &str = "iactpipe-table";
pub const FORMAT_VERSION: &str = "1.0";

pub const METADATA_FILE: &str = "metadata.json";
pub const SUBARRAY_FILE: &str = "configuration/subarray.json";
pub const RUN_CONFIG_FILE: &str = "configuration/run_config.json";
pub const SIMULATION_CONFIG_TABLE: &str = "configuration/simulation/run.csv";
pub const SHOWER_TABLE: &str = "simulation/event/subarray/shower.csv";
pub const SHOWER_DISTRIBUTION_FILE: &str = "simulation/service/shower_distribution.json";
pub const TRIGGER_TABLE: &str = "dl1/event/subarray/trigger.csv";
pub const PARAMETERS_TABLE: &str = "dl1/event/telescope/parameters.csv";

/// Check that a reconstruction prefix can name a DL2 table file.
///
/// Prefixes are restricted to ASCII letters, digits, `_`, `.` and `-`, and must not be `.` or
/// `..`, so that [`Dl2Table::path`] stays inside the output directory.
pub fn check_prefix(prefix: &str) -> Result<(), String> {
    if prefix.is_empty() {
        return Err("prefix is empty".to_string());
    }
    if prefix == "." || prefix == ".." {
        return Err(format!("prefix '{prefix}' is not a file name"));
    }
    if let Some(c) = prefix
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(format!(
            "prefix '{prefix}' contains '{c}'; only [A-Za-z0-9_.-] are allowed"
        ));
    }
    Ok(())
}

/// Whether a prediction table holds telescope-wise or array-wise values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionLevel {
    Telescope,
    Subarray,
}

/// Identifies one DL2 table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dl2Table {
    pub level: PredictionLevel,
    pub property: CombineProperty,
    pub prefix: String,
}

impl Dl2Table {
    pub fn new(level: PredictionLevel, property: CombineProperty, prefix: &str) -> Self {
        Self {
            level,
            property,
            prefix: prefix.to_string(),
        }
    }

    /// Path relative to the output directory.
    pub fn path(&self) -> String {
        let level = match self.level {
            PredictionLevel::Telescope => "telescope",
            PredictionLevel::Subarray => "subarray",
        };
        format!("dl2/event/{level}/{}/{}.csv", self.property, self.prefix)
    }
}

/// Content of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub format: String,
    pub format_version: String,
    pub creator: String,
    pub input_url: String,
    pub is_simulation: bool,
    pub datalevels: Vec<DataLevel>,
    pub obs_ids: Vec<ObsId>,
    pub n_events: usize,
    pub has_shower_distributions: bool,
    #[serde(default)]
    pub dl2_tables: Vec<Dl2Table>,
}

pub(crate) fn format_telescopes(tels: &[TelId]) -> String {
    tels.iter()
        .map(TelId::to_string)
        .collect::<Vec<_>>()
        .join(";")
}

pub(crate) fn parse_telescopes(text: &str) -> Result<TelescopeList, String> {
    text.split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<TelId>()
                .map_err(|e| format!("invalid telescope id '{t}': {e}"))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TriggerRow {
    pub obs_id: ObsId,
    pub event_id: EventId,
    pub time_mjd_tai: Option<MJD>,
    pub pointing_alt: Option<f64>,
    pub pointing_az: Option<f64>,
    pub n_trigger_tels: usize,
    pub tels_with_trigger: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ShowerRow {
    pub obs_id: ObsId,
    pub event_id: EventId,
    pub true_energy: f64,
    pub true_alt: f64,
    pub true_az: f64,
    pub true_core_x: f64,
    pub true_core_y: f64,
    pub true_h_first_int: Option<f64>,
    pub true_shower_primary_id: u32,
}

impl ShowerRow {
    pub fn new(index: EventIndex, shower: &SimulatedShower) -> Self {
        Self {
            obs_id: index.obs_id,
            event_id: index.event_id,
            true_energy: shower.energy,
            true_alt: shower.alt,
            true_az: shower.az,
            true_core_x: shower.core_x,
            true_core_y: shower.core_y,
            true_h_first_int: shower.h_first_int,
            true_shower_primary_id: shower.shower_primary_id,
        }
    }

    pub fn shower(&self) -> SimulatedShower {
        SimulatedShower {
            energy: self.true_energy,
            alt: self.true_alt,
            az: self.true_az,
            core_x: self.true_core_x,
            core_y: self.true_core_y,
            h_first_int: self.true_h_first_int,
            shower_primary_id: self.true_shower_primary_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ParameterRow {
    pub obs_id: ObsId,
    pub event_id: EventId,
    pub tel_id: TelId,
    pub hillas_intensity: f64,
    pub hillas_length: f64,
    pub hillas_width: f64,
    pub hillas_fov_lon: f64,
    pub hillas_fov_lat: f64,
    pub hillas_psi: f64,
}

impl ParameterRow {
    pub fn new(index: EventIndex, tel_id: TelId, hillas: &HillasParameters) -> Self {
        Self {
            obs_id: index.obs_id,
            event_id: index.event_id,
            tel_id,
            hillas_intensity: hillas.intensity,
            hillas_length: hillas.length,
            hillas_width: hillas.width,
            hillas_fov_lon: hillas.fov_lon,
            hillas_fov_lat: hillas.fov_lat,
            hillas_psi: hillas.psi,
        }
    }

    pub fn hillas(&self) -> HillasParameters {
        HillasParameters {
            intensity: self.hillas_intensity,
            length: self.hillas_length,
            width: self.hillas_width,
            fov_lon: self.hillas_fov_lon,
            fov_lat: self.hillas_fov_lat,
            psi: self.hillas_psi,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct EnergyRow {
    pub obs_id: ObsId,
    pub event_id: EventId,
    pub tel_id: Option<TelId>,
    pub energy: f64,
    pub energy_uncert: f64,
    pub is_valid: bool,
    pub telescopes: String,
}

impl EnergyRow {
    pub fn new(index: EventIndex, tel_id: Option<TelId>, value: &ReconstructedEnergy) -> Self {
        Self {
            obs_id: index.obs_id,
            event_id: index.event_id,
            tel_id,
            energy: value.energy,
            energy_uncert: value.energy_uncert,
            is_valid: value.is_valid,
            telescopes: format_telescopes(&value.telescopes),
        }
    }

    pub fn value(&self) -> Result<ReconstructedEnergy, String> {
        Ok(ReconstructedEnergy {
            energy: self.energy,
            energy_uncert: self.energy_uncert,
            is_valid: self.is_valid,
            telescopes: parse_telescopes(&self.telescopes)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ClassificationRow {
    pub obs_id: ObsId,
    pub event_id: EventId,
    pub tel_id: Option<TelId>,
    pub prediction: f64,
    pub is_valid: bool,
    pub telescopes: String,
}

impl ClassificationRow {
    pub fn new(index: EventIndex, tel_id: Option<TelId>, value: &ParticleClassification) -> Self {
        Self {
            obs_id: index.obs_id,
            event_id: index.event_id,
            tel_id,
            prediction: value.prediction,
            is_valid: value.is_valid,
            telescopes: format_telescopes(&value.telescopes),
        }
    }

    pub fn value(&self) -> Result<ParticleClassification, String> {
        Ok(ParticleClassification {
            prediction: self.prediction,
            is_valid: self.is_valid,
            telescopes: parse_telescopes(&self.telescopes)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct GeometryRow {
    pub obs_id: ObsId,
    pub event_id: EventId,
    pub tel_id: Option<TelId>,
    pub alt: f64,
    pub alt_uncert: f64,
    pub az: f64,
    pub az_uncert: f64,
    pub is_valid: bool,
    pub telescopes: String,
}

impl GeometryRow {
    pub fn new(index: EventIndex, tel_id: Option<TelId>, value: &ReconstructedGeometry) -> Self {
        Self {
            obs_id: index.obs_id,
            event_id: index.event_id,
            tel_id,
            alt: value.alt,
            alt_uncert: value.alt_uncert,
            az: value.az,
            az_uncert: value.az_uncert,
            is_valid: value.is_valid,
            telescopes: format_telescopes(&value.telescopes),
        }
    }

    pub fn value(&self) -> Result<ReconstructedGeometry, String> {
        Ok(ReconstructedGeometry {
            alt: self.alt,
            az: self.az,
            alt_uncert: self.alt_uncert,
            az_uncert: self.az_uncert,
            is_valid: self.is_valid,
            telescopes: parse_telescopes(&self.telescopes)?,
        })
    }
}
