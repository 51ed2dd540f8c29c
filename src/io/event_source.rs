//! # The `EventSource` abstraction
//!
//! Every input backend implements [`EventSource`]: a lazy iterator of
//! `Result<ArrayEvent, PipeError>` plus the metadata of the opened input.
//!
//! ## Overview
//! -----------------
//! The trait separates two kinds of information:
//!
//! * **the event stream** – obtained through the [`Iterator`] supertrait, one [`ArrayEvent`] per
//!   array trigger, already filtered according to the [`EventSourceConfig`];
//! * **session metadata** – available as soon as the source is opened and independent of how far
//!   the stream has been consumed: subarray, observation ids, data levels, simulation
//!   configuration and the simulated shower distributions.
//!
//! Shower distributions are exposed through a single method,
//! [`EventSource::simulated_shower_distributions`], for all backends. Backends without
//! simulation metadata keep the default implementation, which returns an empty map. Writers only
//! depend on this method, never on a concrete backend.
//!
//! ## Rewinding
//! -----------------
//! [`EventSource::rewind`] restarts the stream from the first event. Processing the same opened
//! source twice therefore produces the same output twice, shower distributions included.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use super::containers::{ArrayEvent, SubarrayDescription};
use crate::constants::{ObsId, TelId};
use crate::pipe_errors::PipeError;
use crate::simulation::{SimulatedShowerDistribution, SimulationConfig};

static NO_SIMULATION_CONFIG: BTreeMap<ObsId, SimulationConfig> = BTreeMap::new();
static NO_SHOWER_DISTRIBUTIONS: BTreeMap<ObsId, SimulatedShowerDistribution> = BTreeMap::new();

/// Processing stages an input may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataLevel {
    /// Trigger information only
    Trigger,
    /// Image parameters per telescope
    Dl1Parameters,
    /// Reconstructed shower properties
    Dl2,
}

impl fmt::Display for DataLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataLevel::Trigger => "TRIGGER",
            DataLevel::Dl1Parameters => "DL1_PARAMETERS",
            DataLevel::Dl2 => "DL2",
        };
        write!(f, "{name}")
    }
}

/// Backend-independent options applied while reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSourceConfig {
    /// Stop after this many events.
    #[serde(default)]
    pub max_events: Option<usize>,
    /// Keep only these telescopes; `None` keeps all of them.
    #[serde(default)]
    pub allowed_tels: Option<BTreeSet<TelId>>,
}

impl EventSourceConfig {
    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = Some(max_events);
        self
    }

    pub fn with_allowed_tels(mut self, tels: impl IntoIterator<Item = TelId>) -> Self {
        self.allowed_tels = Some(tels.into_iter().collect());
        self
    }

    /// Whether `count` events already reached the configured limit.
    pub(crate) fn limit_reached(&self, count: usize) -> bool {
        self.max_events.is_some_and(|max| count >= max)
    }

    /// Drop telescopes outside `allowed_tels` from `event`.
    pub(crate) fn filter_event(&self, event: &mut ArrayEvent) {
        if let Some(allowed) = &self.allowed_tels {
            event.tel.retain(|tel_id, _| allowed.contains(tel_id));
        }
    }

    /// Subarray restricted to `allowed_tels`.
    pub(crate) fn filter_subarray(&self, subarray: SubarrayDescription) -> SubarrayDescription {
        match &self.allowed_tels {
            Some(allowed) => {
                let name = subarray.name.clone();
                subarray.select(allowed, name)
            }
            None => subarray,
        }
    }
}

/// A readable input yielding array events.
///
/// See the [module documentation](self) for the contract.
pub trait EventSource: Iterator<Item = Result<ArrayEvent, PipeError>> {
    /// Path of the opened input.
    fn input_url(&self) -> &Utf8Path;

    /// Whether the input contains simulated events (true shower parameters).
    fn is_simulation(&self) -> bool;

    /// Telescopes provided by this source, after the `allowed_tels` selection.
    fn subarray(&self) -> &SubarrayDescription;

    /// Observation blocks contained in the input.
    fn obs_ids(&self) -> Vec<ObsId>;

    /// Processing stages available in the input.
    fn datalevels(&self) -> Vec<DataLevel>;

    /// Run-wise simulation configuration, keyed by observation id.
    fn simulation_config(&self) -> &BTreeMap<ObsId, SimulationConfig> {
        &NO_SIMULATION_CONFIG
    }

    /// Histograms of all thrown showers, keyed by observation id.
    ///
    /// Available right after opening and stable across iteration and rewinds.
    fn simulated_shower_distributions(&self) -> &BTreeMap<ObsId, SimulatedShowerDistribution> {
        &NO_SHOWER_DISTRIBUTIONS
    }

    /// Whether [`simulated_shower_distributions`](Self::simulated_shower_distributions) is
    /// backed by data from the input.
    fn has_shower_distributions(&self) -> bool {
        !self.simulated_shower_distributions().is_empty()
    }

    /// Restart the event stream from the first event.
    fn rewind(&mut self) -> Result<(), PipeError>;

    /// Whether this backend can read `path`.
    fn is_compatible(path: &Utf8Path) -> bool
    where
        Self: Sized;
}
