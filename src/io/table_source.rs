//! # Processed-data event source
//!
//! [`TableEventSource`] reads back a directory written by the
//! [`DataWriter`](super::DataWriter). Reading processed data again is the usual way to chain
//! processing steps, so the source exposes the same session metadata as the original input,
//! including the simulated shower distributions.
//!
//! All tables are read when the source is opened and joined on `(obs_id, event_id)` (and
//! `tel_id` for telescope tables) using the trigger table as the list of events. Iteration then
//! hands out the assembled events in trigger-table order.
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;

use ahash::RandomState;
use camino::{Utf8Path, Utf8PathBuf};
use serde::de::DeserializeOwned;

use super::containers::{ArrayEvent, EventIndex, ReconstructedContainer, SubarrayDescription};
use super::event_source::{DataLevel, EventSource, EventSourceConfig};
use super::table_layout::{
    check_prefix, parse_telescopes, ClassificationRow, Dl2Table, EnergyRow, GeometryRow, ParameterRow,
    PredictionLevel, ShowerRow, TableMetadata, TriggerRow, FORMAT_NAME, METADATA_FILE,
    PARAMETERS_TABLE, SHOWER_DISTRIBUTION_FILE, SHOWER_TABLE, SIMULATION_CONFIG_TABLE,
    SUBARRAY_FILE, TRIGGER_TABLE,
};
use super::FastHashMap;
use crate::constants::{ObsId, TelId};
use crate::coordinates::AltAz;
use crate::pipe_errors::PipeError;
use crate::simulation::{SimulatedShowerDistribution, SimulationConfig};
use crate::stereo::CombineProperty;
use crate::time::from_mjd_tai;

/// [`EventSource`] reading processed-data directories.
pub struct TableEventSource {
    input_url: Utf8PathBuf,
    config: EventSourceConfig,
    metadata: TableMetadata,
    subarray: SubarrayDescription,
    simulation_config: BTreeMap<ObsId, SimulationConfig>,
    shower_distributions: BTreeMap<ObsId, SimulatedShowerDistribution>,
    events: Vec<ArrayEvent>,
    position: usize,
}

impl TableEventSource {
    /// Open a processed-data directory.
    ///
    /// Arguments
    /// -----------------
    /// * `path`: directory containing `metadata.json`
    /// * `config`: reading options (`max_events`, `allowed_tels`)
    ///
    /// Return
    /// ----------
    /// * The opened source, or an error if the metadata is missing or of another format, or a
    ///   table cannot be parsed.
    pub fn open(path: &Utf8Path, config: EventSourceConfig) -> Result<Self, PipeError> {
        let metadata: TableMetadata = read_json(&path.join(METADATA_FILE))?;
        if metadata.format != FORMAT_NAME {
            return Err(PipeError::MalformedEventData {
                path: path.join(METADATA_FILE).to_string(),
                line: 0,
                reason: format!("unsupported format '{}'", metadata.format),
            });
        }

        let subarray: SubarrayDescription = read_json(&path.join(SUBARRAY_FILE))?;
        let subarray = config.filter_subarray(subarray);

        let simulation_config = read_table::<SimulationConfig>(path, SIMULATION_CONFIG_TABLE)?
            .into_iter()
            .map(|run| (run.obs_id, run))
            .collect();

        let distribution_path = path.join(SHOWER_DISTRIBUTION_FILE);
        let shower_distributions = if distribution_path.exists() {
            let list: Vec<SimulatedShowerDistribution> = read_json(&distribution_path)?;
            list.into_iter().map(|d| (d.obs_id, d)).collect()
        } else {
            BTreeMap::new()
        };

        let events = Self::assemble_events(path, &metadata)?;

        log::info!(
            "opened processed data {path}: {} events, {} shower distributions",
            events.len(),
            shower_distributions.len()
        );

        Ok(Self {
            input_url: path.to_path_buf(),
            config,
            metadata,
            subarray,
            simulation_config,
            shower_distributions,
            events,
            position: 0,
        })
    }

    fn assemble_events(
        path: &Utf8Path,
        metadata: &TableMetadata,
    ) -> Result<Vec<ArrayEvent>, PipeError> {
        let triggers = read_table::<TriggerRow>(path, TRIGGER_TABLE)?;
        let mut events = Vec::with_capacity(triggers.len());
        let mut positions: FastHashMap<EventIndex, usize> =
            FastHashMap::with_capacity_and_hasher(triggers.len(), RandomState::default());

        for row in triggers {
            let index = EventIndex::new(row.obs_id, row.event_id);
            let mut event = ArrayEvent::new(index);
            event.time = from_mjd_tai(row.time_mjd_tai);
            event.pointing = match (row.pointing_alt, row.pointing_az) {
                (Some(alt), Some(az)) => Some(AltAz::new(alt, az)),
                _ => None,
            };
            let tels = parse_telescopes(&row.tels_with_trigger)
                .map_err(|reason| malformed(path, TRIGGER_TABLE, reason))?;
            for tel_id in tels {
                event.tel.insert(tel_id, Default::default());
            }
            positions.insert(index, events.len());
            events.push(event);
        }

        let lookup = |index: EventIndex, table: &str| {
            positions
                .get(&index)
                .copied()
                .ok_or_else(|| {
                    malformed(
                        path,
                        table,
                        format!("event {index:?} is not in the trigger table"),
                    )
                })
        };

        for row in read_table::<ShowerRow>(path, SHOWER_TABLE)? {
            let pos = lookup(EventIndex::new(row.obs_id, row.event_id), SHOWER_TABLE)?;
            events[pos].simulation = Some(row.shower());
        }

        for row in read_table::<ParameterRow>(path, PARAMETERS_TABLE)? {
            let pos = lookup(EventIndex::new(row.obs_id, row.event_id), PARAMETERS_TABLE)?;
            events[pos].tel.entry(row.tel_id).or_default().hillas = Some(row.hillas());
        }

        for table in &metadata.dl2_tables {
            read_dl2_table(path, table, &mut events, &positions)?;
        }

        Ok(events)
    }
}

/// Fill the predictions of one DL2 table into the assembled events.
fn read_dl2_table(
    path: &Utf8Path,
    table: &Dl2Table,
    events: &mut [ArrayEvent],
    positions: &FastHashMap<EventIndex, usize>,
) -> Result<(), PipeError> {
    check_prefix(&table.prefix).map_err(|reason| malformed(path, METADATA_FILE, reason))?;
    let relative = table.path();

    let prefix = table.prefix.clone();
    match table.property {
        CombineProperty::Energy => {
            for row in read_table::<EnergyRow>(path, &relative)? {
                let index = EventIndex::new(row.obs_id, row.event_id);
                let value = row.value().map_err(|r| malformed(path, &relative, r))?;
                prediction_container(events, positions, table.level, index, row.tel_id)
                    .map_err(|r| malformed(path, &relative, r))?
                    .energy
                    .insert(prefix.clone(), value);
            }
        }
        CombineProperty::Classification => {
            for row in read_table::<ClassificationRow>(path, &relative)? {
                let index = EventIndex::new(row.obs_id, row.event_id);
                let value = row.value().map_err(|r| malformed(path, &relative, r))?;
                prediction_container(events, positions, table.level, index, row.tel_id)
                    .map_err(|r| malformed(path, &relative, r))?
                    .classification
                    .insert(prefix.clone(), value);
            }
        }
        CombineProperty::Geometry => {
            for row in read_table::<GeometryRow>(path, &relative)? {
                let index = EventIndex::new(row.obs_id, row.event_id);
                let value = row.value().map_err(|r| malformed(path, &relative, r))?;
                prediction_container(events, positions, table.level, index, row.tel_id)
                    .map_err(|r| malformed(path, &relative, r))?
                    .geometry
                    .insert(prefix.clone(), value);
            }
        }
    }
    Ok(())
}

/// Container receiving a prediction row: a telescope's `dl2` or the event's stereo container.
fn prediction_container<'e>(
    events: &'e mut [ArrayEvent],
    positions: &FastHashMap<EventIndex, usize>,
    level: PredictionLevel,
    index: EventIndex,
    tel_id: Option<TelId>,
) -> Result<&'e mut ReconstructedContainer, String> {
    let pos = positions
        .get(&index)
        .copied()
        .ok_or_else(|| format!("event {index:?} is not in the trigger table"))?;
    let event = &mut events[pos];
    match (level, tel_id) {
        (PredictionLevel::Telescope, Some(tel_id)) => {
            Ok(&mut event.tel.entry(tel_id).or_default().dl2)
        }
        (PredictionLevel::Subarray, None) => Ok(&mut event.stereo),
        _ => Err("tel_id does not match the table level".to_string()),
    }
}

fn malformed(path: &Utf8Path, table: &str, reason: String) -> PipeError {
    PipeError::MalformedEventData {
        path: path.join(table).to_string(),
        line: 0,
        reason,
    }
}

fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<T, PipeError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
}

/// Read all rows of a CSV table; a missing table has no rows.
fn read_table<T: DeserializeOwned>(root: &Utf8Path, relative: &str) -> Result<Vec<T>, PipeError> {
    let path = root.join(relative);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(&path)?;
    let rows = reader.deserialize().collect::<Result<Vec<T>, _>>()?;
    log::debug!("read {} rows from {path}", rows.len());
    Ok(rows)
}

impl Iterator for TableEventSource {
    type Item = Result<ArrayEvent, PipeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.config.limit_reached(self.position) {
            return None;
        }
        let mut event = self.events.get(self.position)?.clone();
        self.position += 1;
        self.config.filter_event(&mut event);
        Some(Ok(event))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let total = match self.config.max_events {
            Some(max) => self.events.len().min(max),
            None => self.events.len(),
        };
        let remaining = total.saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl EventSource for TableEventSource {
    fn input_url(&self) -> &Utf8Path {
        &self.input_url
    }

    fn is_simulation(&self) -> bool {
        self.metadata.is_simulation
    }

    fn subarray(&self) -> &SubarrayDescription {
        &self.subarray
    }

    fn obs_ids(&self) -> Vec<ObsId> {
        let mut ids: BTreeSet<ObsId> = self.metadata.obs_ids.iter().copied().collect();
        ids.extend(self.events.iter().map(|e| e.index.obs_id));
        ids.into_iter().collect()
    }

    fn datalevels(&self) -> Vec<DataLevel> {
        self.metadata.datalevels.clone()
    }

    fn simulation_config(&self) -> &BTreeMap<ObsId, SimulationConfig> {
        &self.simulation_config
    }

    fn simulated_shower_distributions(&self) -> &BTreeMap<ObsId, SimulatedShowerDistribution> {
        &self.shower_distributions
    }

    fn rewind(&mut self) -> Result<(), PipeError> {
        self.position = 0;
        Ok(())
    }

    /// A directory is compatible when it holds a `metadata.json` of the processed-data format.
    fn is_compatible(path: &Utf8Path) -> bool {
        if !path.is_dir() {
            return false;
        }
        read_json::<TableMetadata>(&path.join(METADATA_FILE))
            .map(|metadata| metadata.format == FORMAT_NAME)
            .unwrap_or(false)
    }
}
