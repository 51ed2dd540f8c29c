//! # Simulation event source
//!
//! Reader for simulation output stored as **JSON lines**: one JSON object per line, each tagged by
//! a `"type"` field.
//!
//! ## Record types
//! -----------------
//! | `type`                | Content                                                     |
//! |-----------------------|-------------------------------------------------------------|
//! | `run_header`          | a [`SimulationConfig`]                                      |
//! | `subarray`            | `name` and a `telescopes` list of [`TelescopeDescription`]  |
//! | `event`               | `obs_id`, `event_id`, optional `time_mjd_tai`, `pointing`, `shower`, and a `tel` list |
//! | `shower_distribution` | a [`SimulatedShowerDistribution`]                           |
//!
//! Shower distributions are usually written by the simulation **after** the events of a run. To
//! make them available as soon as the source is opened, [`SimulationEventSource::open`]
//! pre-scans the whole file and keeps the run headers, the subarray and the distributions in
//! memory. Events are then read lazily, line by line, during iteration.
//!
//! ## Example
//! -----------------
//! ```rust, no_run
//! use camino::Utf8Path;
//! use iactpipe::io::{EventSource, EventSourceConfig, SimulationEventSource};
//!
//! let path = Utf8Path::new("gamma.simtel.jsonl");
//! let mut source = SimulationEventSource::open(path, EventSourceConfig::default()).unwrap();
//! println!("{} distributions", source.simulated_shower_distributions().len());
//! for event in &mut source {
//!     let event = event.unwrap();
//!     println!("{:?} with {} telescopes", event.index, event.tel.len());
//! }
//! ```
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use super::containers::{
    ArrayEvent, EventIndex, HillasParameters, ReconstructedContainer, SimulatedShower,
    SubarrayDescription, TelescopeDescription, TelescopeEvent,
};
use super::event_source::{DataLevel, EventSource, EventSourceConfig};
use crate::constants::{EventId, ObsId, TelId, MJD};
use crate::coordinates::AltAz;
use crate::pipe_errors::PipeError;
use crate::simulation::{SimulatedShowerDistribution, SimulationConfig};
use crate::time::from_mjd_tai;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SimRecord {
    RunHeader(SimulationConfig),
    Subarray(SubarrayRecord),
    Event(EventRecord),
    ShowerDistribution(SimulatedShowerDistribution),
}

#[derive(Debug, Deserialize)]
struct SubarrayRecord {
    name: String,
    telescopes: Vec<TelescopeDescription>,
}

#[derive(Debug, Deserialize)]
struct EventRecord {
    obs_id: ObsId,
    event_id: EventId,
    #[serde(default)]
    time_mjd_tai: Option<MJD>,
    #[serde(default)]
    pointing: Option<AltAz>,
    #[serde(default)]
    shower: Option<SimulatedShower>,
    #[serde(default)]
    tel: Vec<TelRecord>,
}

#[derive(Debug, Deserialize)]
struct TelRecord {
    tel_id: TelId,
    #[serde(default)]
    hillas: Option<HillasParameters>,
    #[serde(default)]
    dl2: ReconstructedContainer,
}

impl EventRecord {
    fn into_event(self) -> Result<ArrayEvent, String> {
        let mut event = ArrayEvent::new(EventIndex::new(self.obs_id, self.event_id));
        event.time = from_mjd_tai(self.time_mjd_tai);
        event.pointing = self.pointing;
        event.simulation = self.shower;
        for record in self.tel {
            let data = TelescopeEvent {
                hillas: record.hillas,
                dl2: record.dl2,
            };
            if event.tel.insert(record.tel_id, data).is_some() {
                return Err(format!(
                    "telescope {} appears twice in event {}",
                    record.tel_id, self.event_id
                ));
            }
        }
        Ok(event)
    }
}

/// Metadata gathered while pre-scanning the file.
#[derive(Debug, Default)]
struct ScanSummary {
    subarray: Option<SubarrayDescription>,
    simulation_config: BTreeMap<ObsId, SimulationConfig>,
    shower_distributions: BTreeMap<ObsId, SimulatedShowerDistribution>,
    obs_ids: BTreeSet<ObsId>,
    n_events: usize,
    has_parameters: bool,
    has_dl2: bool,
}

/// [`EventSource`] reading JSON-lines simulation files.
pub struct SimulationEventSource {
    input_url: Utf8PathBuf,
    config: EventSourceConfig,
    subarray: SubarrayDescription,
    simulation_config: BTreeMap<ObsId, SimulationConfig>,
    shower_distributions: BTreeMap<ObsId, SimulatedShowerDistribution>,
    obs_ids: BTreeSet<ObsId>,
    datalevels: Vec<DataLevel>,
    n_events: usize,
    lines: Option<Lines<BufReader<File>>>,
    line_number: usize,
    count: usize,
}

impl SimulationEventSource {
    /// Open a simulation file and read its metadata.
    ///
    /// Arguments
    /// -----------------
    /// * `path`: JSON-lines simulation file
    /// * `config`: reading options (`max_events`, `allowed_tels`)
    ///
    /// Return
    /// ----------
    /// * The opened source positioned before the first event, or an error when the file cannot
    ///   be read, a line is malformed, the subarray record is missing, or the simulation
    ///   metadata is inconsistent.
    pub fn open(path: &Utf8Path, config: EventSourceConfig) -> Result<Self, PipeError> {
        let summary = Self::scan(path)?;

        let subarray = summary
            .subarray
            .ok_or_else(|| PipeError::MalformedEventData {
                path: path.to_string(),
                line: 0,
                reason: "no subarray record found".into(),
            })?;
        let subarray = config.filter_subarray(subarray);

        let mut datalevels = vec![DataLevel::Trigger];
        if summary.has_parameters {
            datalevels.push(DataLevel::Dl1Parameters);
        }
        if summary.has_dl2 {
            datalevels.push(DataLevel::Dl2);
        }

        log::info!(
            "opened simulation source {path}: {} events, {} runs, {} shower distributions",
            summary.n_events,
            summary.obs_ids.len(),
            summary.shower_distributions.len()
        );

        let mut source = Self {
            input_url: path.to_path_buf(),
            config,
            subarray,
            simulation_config: summary.simulation_config,
            shower_distributions: summary.shower_distributions,
            obs_ids: summary.obs_ids,
            datalevels,
            n_events: summary.n_events,
            lines: None,
            line_number: 0,
            count: 0,
        };
        source.rewind()?;
        Ok(source)
    }

    /// Number of events in the file, ignoring `max_events`.
    pub fn n_events(&self) -> usize {
        self.n_events
    }

    fn scan(path: &Utf8Path) -> Result<ScanSummary, PipeError> {
        let reader = BufReader::new(File::open(path)?);
        let mut summary = ScanSummary::default();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = parse_record(path, i + 1, &line)?;
            match record {
                SimRecord::RunHeader(run) => {
                    run.validate()?;
                    summary.obs_ids.insert(run.obs_id);
                    if summary.simulation_config.insert(run.obs_id, run).is_some() {
                        log::warn!("{path}:{}: duplicated run header replaces the first", i + 1);
                    }
                }
                SimRecord::Subarray(record) => {
                    summary.subarray = Some(SubarrayDescription::new(
                        record.name,
                        record.telescopes,
                    ));
                }
                SimRecord::Event(event) => {
                    summary.n_events += 1;
                    summary.obs_ids.insert(event.obs_id);
                    summary.has_parameters |= event.tel.iter().any(|t| t.hillas.is_some());
                    summary.has_dl2 |= event.tel.iter().any(|t| !t.dl2.is_empty());
                }
                SimRecord::ShowerDistribution(dist) => {
                    dist.validate()?;
                    log::debug!(
                        "{path}:{}: shower distribution {} for run {} ({} entries)",
                        i + 1,
                        dist.hist_id,
                        dist.obs_id,
                        dist.n_entries
                    );
                    if summary.shower_distributions.insert(dist.obs_id, dist).is_some() {
                        log::warn!(
                            "{path}:{}: several shower distributions for one run, keeping the last",
                            i + 1
                        );
                    }
                }
            }
        }
        Ok(summary)
    }

    fn next_event(&mut self) -> Option<Result<ArrayEvent, PipeError>> {
        if self.config.limit_reached(self.count) {
            return None;
        }

        match self.read_next_event() {
            Ok(Some(mut event)) => {
                self.config.filter_event(&mut event);
                self.count += 1;
                Some(Ok(event))
            }
            Ok(None) => {
                self.lines = None;
                None
            }
            Err(e) => {
                self.lines = None;
                Some(Err(e))
            }
        }
    }

    /// Advance to the next `event` record, skipping metadata records and blank lines.
    fn read_next_event(&mut self) -> Result<Option<ArrayEvent>, PipeError> {
        loop {
            let Some(lines) = self.lines.as_mut() else {
                return Ok(None);
            };
            let Some(line) = lines.next() else {
                return Ok(None);
            };
            let line = line?;
            self.line_number += 1;
            if line.trim().is_empty() {
                continue;
            }

            let record = parse_record(&self.input_url, self.line_number, &line)?;
            if let SimRecord::Event(record) = record {
                return record
                    .into_event()
                    .map(Some)
                    .map_err(|reason| PipeError::MalformedEventData {
                        path: self.input_url.to_string(),
                        line: self.line_number,
                        reason,
                    });
            }
        }
    }
}

fn parse_record(path: &Utf8Path, line: usize, text: &str) -> Result<SimRecord, PipeError> {
    serde_json::from_str(text).map_err(|e| PipeError::MalformedEventData {
        path: path.to_string(),
        line,
        reason: e.to_string(),
    })
}

impl Iterator for SimulationEventSource {
    type Item = Result<ArrayEvent, PipeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.lines.is_none() {
            return (0, Some(0));
        }
        let total = match self.config.max_events {
            Some(max) => self.n_events.min(max),
            None => self.n_events,
        };
        let remaining = total.saturating_sub(self.count);
        (remaining, Some(remaining))
    }
}

impl EventSource for SimulationEventSource {
    fn input_url(&self) -> &Utf8Path {
        &self.input_url
    }

    fn is_simulation(&self) -> bool {
        true
    }

    fn subarray(&self) -> &SubarrayDescription {
        &self.subarray
    }

    fn obs_ids(&self) -> Vec<ObsId> {
        self.obs_ids.iter().copied().collect()
    }

    fn datalevels(&self) -> Vec<DataLevel> {
        self.datalevels.clone()
    }

    fn simulation_config(&self) -> &BTreeMap<ObsId, SimulationConfig> {
        &self.simulation_config
    }

    fn simulated_shower_distributions(&self) -> &BTreeMap<ObsId, SimulatedShowerDistribution> {
        &self.shower_distributions
    }

    fn rewind(&mut self) -> Result<(), PipeError> {
        let file = File::open(&self.input_url)?;
        self.lines = Some(BufReader::new(file).lines());
        self.line_number = 0;
        self.count = 0;
        Ok(())
    }

    /// A file is compatible when its first non-empty line is a `run_header` or `subarray`
    /// record.
    fn is_compatible(path: &Utf8Path) -> bool {
        let Ok(file) = File::open(path) else {
            return false;
        };
        let first = BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .find(|line| !line.trim().is_empty());

        first
            .and_then(|line| serde_json::from_str::<serde_json::Value>(&line).ok())
            .and_then(|value| {
                value
                    .get("type")
                    .and_then(serde_json::Value::as_str)
                    .map(|kind| kind == "run_header" || kind == "subarray")
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod simulation_source_test {
    use super::*;
    use std::io::Write;

    const SMALL_FILE: &str = r#"{"type": "run_header", "obs_id": 7, "n_showers": 100, "shower_reuse": 2, "energy_range_min": 0.01, "energy_range_max": 100.0, "spectral_index": -2.0, "max_scatter_range": 800.0, "max_viewcone_radius": 0.0}
{"type": "subarray", "name": "mini", "telescopes": [{"tel_id": 1, "name": "LST", "position": [0.0, 0.0, 0.0]}, {"tel_id": 2, "name": "MST", "position": [100.0, 0.0, 0.0]}]}

{"type": "event", "obs_id": 7, "event_id": 1, "time_mjd_tai": 60000.5, "tel": [{"tel_id": 1, "hillas": {"intensity": 100.0, "length": 0.3, "width": 0.1}}, {"tel_id": 2}]}
{"type": "event", "obs_id": 7, "event_id": 2, "shower": {"energy": 1.0, "alt": 70.0, "az": 0.0, "core_x": 10.0, "core_y": -5.0}, "tel": [{"tel_id": 2}]}
{"type": "shower_distribution", "obs_id": 7, "hist_id": 1, "n_entries": 3, "bins_energy": [0.01, 1.0, 100.0], "bins_core_dist": [0.0, 800.0], "histogram": [[2], [1]]}
"#;

    fn write_tmp(content: &str) -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("run.simtel.jsonl")).unwrap();
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_metadata_available_before_iteration() {
        let (_dir, path) = write_tmp(SMALL_FILE);
        assert!(SimulationEventSource::is_compatible(&path));

        let source = SimulationEventSource::open(&path, EventSourceConfig::default()).unwrap();
        assert!(source.is_simulation());
        assert_eq!(source.obs_ids(), vec![7]);
        assert_eq!(source.n_events(), 2);
        assert_eq!(source.subarray().n_tels(), 2);
        assert_eq!(
            source.datalevels(),
            vec![DataLevel::Trigger, DataLevel::Dl1Parameters]
        );
        assert_eq!(source.simulation_config()[&7].n_thrown().unwrap(), 200);
        assert_eq!(source.simulated_shower_distributions()[&7].total(), 3);
        assert_eq!(source.size_hint(), (2, Some(2)));
    }

    #[test]
    fn test_iteration_and_rewind() {
        let (_dir, path) = write_tmp(SMALL_FILE);
        let mut source = SimulationEventSource::open(&path, EventSourceConfig::default()).unwrap();

        let events: Vec<ArrayEvent> = source.by_ref().collect::<Result<_, _>>().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].index, EventIndex::new(7, 1));
        assert!(events[0].time.is_some());
        assert_eq!(events[0].tels_with_trigger().as_slice(), &[1, 2]);
        assert_eq!(events[1].simulation.unwrap().energy, 1.0);
        assert!(source.next().is_none());

        source.rewind().unwrap();
        assert_eq!(source.count(), 2);
    }

    #[test]
    fn test_config_is_applied() {
        let (_dir, path) = write_tmp(SMALL_FILE);
        let config = EventSourceConfig::default()
            .with_max_events(1)
            .with_allowed_tels([2]);
        let source = SimulationEventSource::open(&path, config).unwrap();
        assert_eq!(source.subarray().tel_ids(), BTreeSet::from([2]));
        // distributions do not depend on max_events
        assert_eq!(source.simulated_shower_distributions().len(), 1);

        let events: Vec<ArrayEvent> = source.collect::<Result<_, _>>().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tels_with_trigger().as_slice(), &[2]);
    }

    #[test]
    fn test_malformed_line_is_reported() {
        let content = SMALL_FILE.replace(r#""event_id": 2"#, r#""event_id": "two""#);
        let (_dir, path) = write_tmp(&content);
        let err = SimulationEventSource::open(&path, EventSourceConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, PipeError::MalformedEventData { line: 5, .. }));
    }

    #[test]
    fn test_not_compatible() {
        let (_dir, path) = write_tmp("{\"type\": \"event\"}\n");
        assert!(!SimulationEventSource::is_compatible(&path));
        let (_dir, path) = write_tmp("obs_id,event_id\n1,2\n");
        assert!(!SimulationEventSource::is_compatible(&path));
        assert!(!SimulationEventSource::is_compatible(Utf8Path::new(
            "/does/not/exist.jsonl"
        )));
    }
}
