//! # Event input and output
//!
//! Reading events from the supported input formats and writing processed data.
//!
//! ## Overview
//! -----------------
//! * [`EventSource`] – the common interface of all readers (see [`event_source`]).
//! * Backends:
//!   - [`SimulationEventSource`] – JSON-lines simulation files,
//!   - [`TableEventSource`] – processed-data directories written by [`DataWriter`],
//!   - `ParquetEventSource` – flat telescope-event Parquet tables (cargo feature `parquet`).
//! * [`open_event_source`] – try the backends in order and open the first compatible one.
//! * [`DataWriter`] – persist events together with the source metadata.
//!
//! ## Backend selection
//! -----------------
//! [`open_event_source`] recognizes Parquet files by their magic bytes even when the
//! `parquet` feature is disabled. In that case it returns
//! [`PipeError::OptionalDependency`] so the caller learns which feature to enable, instead of
//! a generic "no compatible source" error.
//!
//! ```rust, no_run
//! use camino::Utf8Path;
//! use iactpipe::io::{open_event_source, EventSource, EventSourceConfig};
//!
//! let source = open_event_source(Utf8Path::new("gamma.simtel.jsonl"), EventSourceConfig::default())
//!     .unwrap();
//! println!("{} is_simulation={}", source.input_url(), source.is_simulation());
//! ```
pub mod containers;
pub mod datawriter;
pub mod event_source;
#[cfg(feature = "parquet")]
pub mod parquet_source;
pub mod simulation_source;
pub mod table_layout;
pub mod table_source;

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;

use ahash::RandomState;
use camino::Utf8Path;

pub use containers::{
    ArrayEvent, EventIndex, HillasParameters, ParticleClassification, ReconstructedContainer,
    ReconstructedEnergy, ReconstructedGeometry, SimulatedShower, SubarrayDescription,
    TelescopeDescription, TelescopeEvent, TelescopeList,
};
pub use datawriter::{DataWriter, DataWriterConfig, WriterSummary};
pub use event_source::{DataLevel, EventSource, EventSourceConfig};
#[cfg(feature = "parquet")]
pub use parquet_source::ParquetEventSource;
pub use simulation_source::SimulationEventSource;
pub use table_source::TableEventSource;

use crate::constants::ObsId;
use crate::optional_deps::{require, OptionalDependency};
use crate::pipe_errors::PipeError;
use crate::simulation::{SimulatedShowerDistribution, SimulationConfig};

pub(crate) type FastHashMap<K, V> = HashMap<K, V, RandomState>;

const PARQUET_MAGIC: &[u8; 4] = b"PAR1";

/// Whether `path` is a file starting with the Parquet magic bytes.
pub fn is_parquet_file(path: &Utf8Path) -> bool {
    let mut magic = [0u8; 4];
    File::open(path)
        .and_then(|mut file| file.read_exact(&mut magic))
        .map(|_| &magic == PARQUET_MAGIC)
        .unwrap_or(false)
}

/// Any of the compiled-in event sources.
pub enum AnyEventSource {
    Simulation(SimulationEventSource),
    Table(TableEventSource),
    #[cfg(feature = "parquet")]
    Parquet(ParquetEventSource),
}

macro_rules! dispatch {
    ($self:expr, $source:ident => $body:expr) => {
        match $self {
            AnyEventSource::Simulation($source) => $body,
            AnyEventSource::Table($source) => $body,
            #[cfg(feature = "parquet")]
            AnyEventSource::Parquet($source) => $body,
        }
    };
}

impl AnyEventSource {
    /// Name of the backend in use.
    pub fn backend_name(&self) -> &'static str {
        match self {
            AnyEventSource::Simulation(_) => "SimulationEventSource",
            AnyEventSource::Table(_) => "TableEventSource",
            #[cfg(feature = "parquet")]
            AnyEventSource::Parquet(_) => "ParquetEventSource",
        }
    }
}

impl Iterator for AnyEventSource {
    type Item = Result<ArrayEvent, PipeError>;

    fn next(&mut self) -> Option<Self::Item> {
        dispatch!(self, source => source.next())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        dispatch!(self, source => source.size_hint())
    }
}

impl EventSource for AnyEventSource {
    fn input_url(&self) -> &Utf8Path {
        dispatch!(self, source => source.input_url())
    }

    fn is_simulation(&self) -> bool {
        dispatch!(self, source => source.is_simulation())
    }

    fn subarray(&self) -> &SubarrayDescription {
        dispatch!(self, source => source.subarray())
    }

    fn obs_ids(&self) -> Vec<ObsId> {
        dispatch!(self, source => source.obs_ids())
    }

    fn datalevels(&self) -> Vec<DataLevel> {
        dispatch!(self, source => source.datalevels())
    }

    fn simulation_config(&self) -> &BTreeMap<ObsId, SimulationConfig> {
        dispatch!(self, source => source.simulation_config())
    }

    fn simulated_shower_distributions(&self) -> &BTreeMap<ObsId, SimulatedShowerDistribution> {
        dispatch!(self, source => source.simulated_shower_distributions())
    }

    fn rewind(&mut self) -> Result<(), PipeError> {
        dispatch!(self, source => source.rewind())
    }

    fn is_compatible(path: &Utf8Path) -> bool {
        SimulationEventSource::is_compatible(path)
            || TableEventSource::is_compatible(path)
            || parquet_compatible(path)
    }
}

#[cfg(feature = "parquet")]
fn parquet_compatible(path: &Utf8Path) -> bool {
    ParquetEventSource::is_compatible(path)
}

#[cfg(not(feature = "parquet"))]
fn parquet_compatible(_path: &Utf8Path) -> bool {
    false
}

/// Open `path` with the first backend that can read it.
///
/// Arguments
/// -----------------
/// * `path`: input file or directory
/// * `config`: reading options applied by the backend
///
/// Return
/// ----------
/// * The opened source,
///   [`PipeError::OptionalDependency`] for a Parquet file when the `parquet` feature is disabled,
///   [`PipeError::NoCompatibleEventSource`] when no backend recognizes the input.
pub fn open_event_source(
    path: &Utf8Path,
    config: EventSourceConfig,
) -> Result<AnyEventSource, PipeError> {
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("input {path} does not exist"),
        )
        .into());
    }

    if SimulationEventSource::is_compatible(path) {
        log::debug!("{path}: using SimulationEventSource");
        return Ok(AnyEventSource::Simulation(SimulationEventSource::open(
            path, config,
        )?));
    }
    if TableEventSource::is_compatible(path) {
        log::debug!("{path}: using TableEventSource");
        return Ok(AnyEventSource::Table(TableEventSource::open(path, config)?));
    }
    if is_parquet_file(path) {
        require(OptionalDependency::Parquet, "read parquet event files")?;
        #[cfg(feature = "parquet")]
        {
            log::debug!("{path}: using ParquetEventSource");
            return Ok(AnyEventSource::Parquet(ParquetEventSource::open(
                path, config,
            )?));
        }
    }

    Err(PipeError::NoCompatibleEventSource(path.to_string()))
}
