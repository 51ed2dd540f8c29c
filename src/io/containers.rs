//! Event containers filled by the event sources and consumed by the writers.
//!
//! An [`ArrayEvent`] groups everything known about one array trigger: its [`EventIndex`], the
//! trigger time, the array pointing, the true shower (simulations only), per-telescope image
//! parameters and predictions, and the array-level (stereo) predictions.
//!
//! Reconstructed quantities are stored in [`ReconstructedContainer`]s, keyed by the **prefix**
//! of the algorithm that produced them, so several reconstructions can coexist on one event.
use std::collections::{BTreeMap, BTreeSet};

use hifitime::Epoch;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::constants::{Degree, EventId, Meter, ObsId, TeV, TelId};
use crate::coordinates::AltAz;

/// Telescope ids contributing to a stereo prediction.
pub type TelescopeList = SmallVec<[TelId; 8]>;

/// Unique identifier of an array event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventIndex {
    pub obs_id: ObsId,
    pub event_id: EventId,
}

impl EventIndex {
    pub fn new(obs_id: ObsId, event_id: EventId) -> Self {
        Self { obs_id, event_id }
    }
}

/// True parameters of a simulated air shower.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulatedShower {
    pub energy: TeV,
    pub alt: Degree,
    pub az: Degree,
    pub core_x: Meter,
    pub core_y: Meter,
    /// Height of the first interaction
    #[serde(default)]
    pub h_first_int: Option<Meter>,
    /// Primary particle id (0 = gamma, 1 = electron, 101 = proton)
    #[serde(default)]
    pub shower_primary_id: u32,
}

/// Hillas moments of a cleaned telescope image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HillasParameters {
    /// Total image charge in photo-electrons
    pub intensity: f64,
    /// Length (major axis std) in degrees
    pub length: Degree,
    /// Width (minor axis std) in degrees
    pub width: Degree,
    #[serde(default)]
    pub fov_lon: Degree,
    #[serde(default)]
    pub fov_lat: Degree,
    #[serde(default)]
    pub psi: Degree,
}

/// Reconstructed primary energy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructedEnergy {
    pub energy: TeV,
    #[serde(default = "nan")]
    pub energy_uncert: TeV,
    pub is_valid: bool,
    #[serde(default)]
    pub telescopes: TelescopeList,
}

/// Output of a gamma/hadron classifier (`1` gamma-like, `0` hadron-like).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleClassification {
    pub prediction: f64,
    pub is_valid: bool,
    #[serde(default)]
    pub telescopes: TelescopeList,
}

/// Reconstructed shower direction in the horizontal frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructedGeometry {
    pub alt: Degree,
    pub az: Degree,
    #[serde(default = "nan")]
    pub alt_uncert: Degree,
    #[serde(default = "nan")]
    pub az_uncert: Degree,
    pub is_valid: bool,
    #[serde(default)]
    pub telescopes: TelescopeList,
}

impl ReconstructedEnergy {
    pub fn invalid() -> Self {
        Self {
            energy: f64::NAN,
            energy_uncert: f64::NAN,
            is_valid: false,
            telescopes: TelescopeList::new(),
        }
    }
}

impl ParticleClassification {
    pub fn invalid() -> Self {
        Self {
            prediction: f64::NAN,
            is_valid: false,
            telescopes: TelescopeList::new(),
        }
    }
}

impl ReconstructedGeometry {
    pub fn invalid() -> Self {
        Self {
            alt: f64::NAN,
            az: f64::NAN,
            alt_uncert: f64::NAN,
            az_uncert: f64::NAN,
            is_valid: false,
            telescopes: TelescopeList::new(),
        }
    }

    pub fn direction(&self) -> AltAz {
        AltAz::new(self.alt, self.az)
    }
}

fn nan() -> f64 {
    f64::NAN
}

/// Reconstructions of one telescope or of the whole array, keyed by algorithm prefix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconstructedContainer {
    #[serde(default)]
    pub energy: BTreeMap<String, ReconstructedEnergy>,
    #[serde(default)]
    pub classification: BTreeMap<String, ParticleClassification>,
    #[serde(default)]
    pub geometry: BTreeMap<String, ReconstructedGeometry>,
}

impl ReconstructedContainer {
    pub fn is_empty(&self) -> bool {
        self.energy.is_empty() && self.classification.is_empty() && self.geometry.is_empty()
    }
}

/// Data of one telescope participating in an array event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelescopeEvent {
    #[serde(default)]
    pub hillas: Option<HillasParameters>,
    #[serde(default)]
    pub dl2: ReconstructedContainer,
}

/// Everything known about one array trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayEvent {
    pub index: EventIndex,
    pub time: Option<Epoch>,
    pub pointing: Option<AltAz>,
    pub simulation: Option<SimulatedShower>,
    pub tel: BTreeMap<TelId, TelescopeEvent>,
    pub stereo: ReconstructedContainer,
}

impl ArrayEvent {
    pub fn new(index: EventIndex) -> Self {
        Self {
            index,
            time: None,
            pointing: None,
            simulation: None,
            tel: BTreeMap::new(),
            stereo: ReconstructedContainer::default(),
        }
    }

    /// Telescopes that triggered, in increasing id order.
    pub fn tels_with_trigger(&self) -> TelescopeList {
        self.tel.keys().copied().collect()
    }
}

/// Static description of one telescope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelescopeDescription {
    pub tel_id: TelId,
    /// Telescope type, e.g. `"LST_LST_LSTCam"`
    pub name: String,
    /// Position relative to the array center, in meters (x north, y west, z up)
    pub position: [Meter; 3],
    #[serde(default)]
    pub equivalent_focal_length: Option<Meter>,
}

/// The set of telescopes an event source provides data for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubarrayDescription {
    pub name: String,
    pub telescopes: BTreeMap<TelId, TelescopeDescription>,
}

impl SubarrayDescription {
    pub fn new(
        name: impl Into<String>,
        telescopes: impl IntoIterator<Item = TelescopeDescription>,
    ) -> Self {
        Self {
            name: name.into(),
            telescopes: telescopes.into_iter().map(|t| (t.tel_id, t)).collect(),
        }
    }

    pub fn tel_ids(&self) -> BTreeSet<TelId> {
        self.telescopes.keys().copied().collect()
    }

    pub fn n_tels(&self) -> usize {
        self.telescopes.len()
    }

    /// Restrict the subarray to `tel_ids`; unknown ids are ignored.
    pub fn select(&self, tel_ids: &BTreeSet<TelId>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            telescopes: self
                .telescopes
                .iter()
                .filter(|(id, _)| tel_ids.contains(*id))
                .map(|(id, t)| (*id, t.clone()))
                .collect(),
        }
    }
}
