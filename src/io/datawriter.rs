//! # DataWriter: persisting processed events
//!
//! [`DataWriter`] writes array events and the metadata of their [`EventSource`] into the
//! directory layout described in [`table_layout`](super::table_layout).
//!
//! ## Lifecycle
//! -----------------
//! 1. [`DataWriter::new`] prepares the output directory. An existing path is an error unless
//!    `overwrite` is set, in which case it is removed first.
//! 2. [`DataWriter::write_event`] appends one array event to the trigger, simulated shower,
//!    parameter and DL2 tables. Tables are created on first use.
//! 3. [`DataWriter::finish`] flushes the tables and writes the session metadata taken from the
//!    source: subarray, simulation configuration and **shower distributions**, then
//!    `metadata.json`.
//!
//! The writer never inspects the concrete source type: shower distributions are read through
//! [`EventSource::simulated_shower_distributions`], so every backend that exposes them has them
//! written, on every run. `finish` can only be called once per writer; a second call, or
//! writing events afterwards, returns [`PipeError::WriterFinished`].
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use super::containers::{ArrayEvent, EventIndex, ReconstructedContainer};
use super::event_source::{DataLevel, EventSource};
use super::table_layout::{
    check_prefix, format_telescopes, ClassificationRow, Dl2Table, EnergyRow, GeometryRow, ParameterRow,
    PredictionLevel, ShowerRow, TableMetadata, TriggerRow, FORMAT_NAME, FORMAT_VERSION,
    METADATA_FILE, PARAMETERS_TABLE, RUN_CONFIG_FILE, SHOWER_DISTRIBUTION_FILE, SHOWER_TABLE,
    SIMULATION_CONFIG_TABLE, SUBARRAY_FILE, TRIGGER_TABLE,
};
use crate::constants::{ObsId, TelId};
use crate::pipe_errors::PipeError;
use crate::stereo::CombineProperty;

/// Reject events whose prediction prefixes cannot name a DL2 table, before anything is written.
fn check_event_prefixes(event: &ArrayEvent) -> Result<(), PipeError> {
    let containers = event
        .tel
        .values()
        .map(|tel| &tel.dl2)
        .chain(std::iter::once(&event.stereo));
    for container in containers {
        let prefixes = container
            .energy
            .keys()
            .chain(container.classification.keys())
            .chain(container.geometry.keys());
        for prefix in prefixes {
            check_prefix(prefix).map_err(|reason| {
                PipeError::InvalidConfig(format!(
                    "event {:?} cannot be written: {reason}",
                    event.index
                ))
            })?;
        }
    }
    Ok(())
}

/// Options of a [`DataWriter`].
#[derive(Debug, Clone, PartialEq)]
pub struct DataWriterConfig {
    pub output_path: Utf8PathBuf,
    pub overwrite: bool,
    /// Write DL1 image parameters
    pub write_parameters: bool,
    /// Write mono and stereo predictions
    pub write_dl2: bool,
}

impl DataWriterConfig {
    pub fn new(output_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            overwrite: false,
            write_parameters: true,
            write_dl2: true,
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// What a finished writer produced.
#[derive(Debug, Clone, PartialEq)]
pub struct WriterSummary {
    pub output_path: Utf8PathBuf,
    pub n_events: usize,
    pub n_shower_distributions: usize,
    pub tables: Vec<String>,
}

/// Writes array events and source metadata to a processed-data directory.
pub struct DataWriter {
    config: DataWriterConfig,
    tables: BTreeMap<String, csv::Writer<File>>,
    dl2_tables: BTreeSet<Dl2Table>,
    obs_ids: BTreeSet<ObsId>,
    run_config: Option<serde_json::Value>,
    n_events: usize,
    has_parameters: bool,
    finished: bool,
}

impl DataWriter {
    /// Prepare the output directory.
    ///
    /// Arguments
    /// -----------------
    /// * `config`: output path and content options
    ///
    /// Return
    /// ----------
    /// * [`PipeError::OutputExists`] if the path exists and `overwrite` is `false`,
    ///   I/O errors if it cannot be removed or created.
    pub fn new(config: DataWriterConfig) -> Result<Self, PipeError> {
        let path = &config.output_path;
        if path.exists() {
            if !config.overwrite {
                return Err(PipeError::OutputExists(path.to_string()));
            }
            log::info!("overwriting existing output {path}");
            if path.is_dir() {
                fs::remove_dir_all(path)?;
            } else {
                fs::remove_file(path)?;
            }
        }
        fs::create_dir_all(path)?;
        log::debug!("created output directory {path}");

        Ok(Self {
            config,
            tables: BTreeMap::new(),
            dl2_tables: BTreeSet::new(),
            obs_ids: BTreeSet::new(),
            run_config: None,
            n_events: 0,
            has_parameters: false,
            finished: false,
        })
    }

    /// Attach the configuration of the producing tool, written as `run_config.json`.
    pub fn with_run_config(mut self, run_config: serde_json::Value) -> Self {
        self.run_config = Some(run_config);
        self
    }

    pub fn output_path(&self) -> &Utf8Path {
        &self.config.output_path
    }

    pub fn n_events(&self) -> usize {
        self.n_events
    }

    /// Append one event to the output tables.
    pub fn write_event(&mut self, event: &ArrayEvent) -> Result<(), PipeError> {
        if self.finished {
            return Err(PipeError::WriterFinished);
        }
        if self.config.write_dl2 {
            check_event_prefixes(event)?;
        }
        let index = event.index;
        let tels = event.tels_with_trigger();

        self.append(
            TRIGGER_TABLE,
            &TriggerRow {
                obs_id: index.obs_id,
                event_id: index.event_id,
                time_mjd_tai: crate::time::to_mjd_tai(event.time),
                pointing_alt: event.pointing.map(|p| p.alt),
                pointing_az: event.pointing.map(|p| p.az),
                n_trigger_tels: tels.len(),
                tels_with_trigger: format_telescopes(&tels),
            },
        )?;

        if let Some(shower) = &event.simulation {
            self.append(SHOWER_TABLE, &ShowerRow::new(index, shower))?;
        }

        if self.config.write_parameters {
            for (tel_id, tel) in &event.tel {
                if let Some(hillas) = &tel.hillas {
                    self.append(PARAMETERS_TABLE, &ParameterRow::new(index, *tel_id, hillas))?;
                    self.has_parameters = true;
                }
            }
        }

        if self.config.write_dl2 {
            for (tel_id, tel) in &event.tel {
                self.write_predictions(index, Some(*tel_id), &tel.dl2)?;
            }
            self.write_predictions(index, None, &event.stereo)?;
        }

        self.obs_ids.insert(index.obs_id);
        self.n_events += 1;
        Ok(())
    }

    fn write_predictions(
        &mut self,
        index: EventIndex,
        tel_id: Option<TelId>,
        container: &ReconstructedContainer,
    ) -> Result<(), PipeError> {
        let level = match tel_id {
            Some(_) => PredictionLevel::Telescope,
            None => PredictionLevel::Subarray,
        };

        for (prefix, value) in &container.energy {
            let table = Dl2Table::new(level, CombineProperty::Energy, prefix);
            self.append_dl2(table, &EnergyRow::new(index, tel_id, value))?;
        }
        for (prefix, value) in &container.classification {
            let table = Dl2Table::new(level, CombineProperty::Classification, prefix);
            self.append_dl2(table, &ClassificationRow::new(index, tel_id, value))?;
        }
        for (prefix, value) in &container.geometry {
            let table = Dl2Table::new(level, CombineProperty::Geometry, prefix);
            self.append_dl2(table, &GeometryRow::new(index, tel_id, value))?;
        }
        Ok(())
    }

    fn append_dl2<T: Serialize>(&mut self, table: Dl2Table, row: &T) -> Result<(), PipeError> {
        let path = table.path();
        self.dl2_tables.insert(table);
        self.append(&path, row)
    }

    fn append<T: Serialize>(&mut self, table: &str, row: &T) -> Result<(), PipeError> {
        if !self.tables.contains_key(table) {
            let path = self.config.output_path.join(table);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            log::debug!("creating table {path}");
            self.tables
                .insert(table.to_string(), csv::Writer::from_path(&path)?);
        }

        if let Some(writer) = self.tables.get_mut(table) {
            writer.serialize(row)?;
        }
        Ok(())
    }

    fn write_json<T>(&self, relative: &str, value: &T) -> Result<(), PipeError>
    where
        T: Serialize + ?Sized,
    {
        let path = self.config.output_path.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        serde_json::to_writer_pretty(file, value)?;
        Ok(())
    }

    /// Flush all tables and write the session metadata of `source`.
    ///
    /// Arguments
    /// -----------------
    /// * `source`: the event source the written events came from
    ///
    /// Return
    /// ----------
    /// * A [`WriterSummary`], or [`PipeError::WriterFinished`] if the writer was already
    ///   finished.
    ///
    /// See also
    /// ------------
    /// * [`EventSource::simulated_shower_distributions`] – The metadata persisted here.
    pub fn finish<S>(&mut self, source: &S) -> Result<WriterSummary, PipeError>
    where
        S: EventSource + ?Sized,
    {
        if self.finished {
            return Err(PipeError::WriterFinished);
        }
        self.finished = true;

        for writer in self.tables.values_mut() {
            writer.flush()?;
        }

        self.write_json(SUBARRAY_FILE, source.subarray())?;
        if let Some(run_config) = &self.run_config {
            self.write_json(RUN_CONFIG_FILE, run_config)?;
        }

        let simulation_config = source.simulation_config();
        if !simulation_config.is_empty() {
            let path = self.config.output_path.join(SIMULATION_CONFIG_TABLE);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut writer = csv::Writer::from_path(&path)?;
            for run in simulation_config.values() {
                writer.serialize(run)?;
            }
            writer.flush()?;
        }

        let distributions = source.simulated_shower_distributions();
        if !distributions.is_empty() {
            let list: Vec<_> = distributions.values().collect();
            self.write_json(SHOWER_DISTRIBUTION_FILE, &list)?;
            log::info!(
                "wrote {} simulated shower distributions to {}",
                list.len(),
                self.config.output_path
            );
        } else if source.is_simulation() {
            log::warn!(
                "simulation input {} provides no shower distributions",
                source.input_url()
            );
        }

        let mut datalevels = vec![DataLevel::Trigger];
        if self.has_parameters {
            datalevels.push(DataLevel::Dl1Parameters);
        }
        if !self.dl2_tables.is_empty() {
            datalevels.push(DataLevel::Dl2);
        }

        let metadata = TableMetadata {
            format: FORMAT_NAME.to_string(),
            format_version: FORMAT_VERSION.to_string(),
            creator: format!("iactpipe {}", env!("CARGO_PKG_VERSION")),
            input_url: source.input_url().to_string(),
            is_simulation: source.is_simulation(),
            datalevels,
            obs_ids: source
                .obs_ids()
                .into_iter()
                .chain(self.obs_ids.iter().copied())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            n_events: self.n_events,
            has_shower_distributions: !distributions.is_empty(),
            dl2_tables: self.dl2_tables.iter().cloned().collect(),
        };
        self.write_json(METADATA_FILE, &metadata)?;

        log::info!(
            "finished writing {} events to {}",
            self.n_events,
            self.config.output_path
        );

        Ok(WriterSummary {
            output_path: self.config.output_path.clone(),
            n_events: self.n_events,
            n_shower_distributions: distributions.len(),
            tables: self.tables.keys().cloned().collect(),
        })
    }
}

#[cfg(test)]
mod datawriter_test {
    use super::*;

    fn tmp_output() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("out")).unwrap();
        (dir, path)
    }

    #[test]
    fn test_existing_output_requires_overwrite() {
        let (_dir, path) = tmp_output();
        fs::create_dir_all(path.join("old")).unwrap();

        let err = DataWriter::new(DataWriterConfig::new(path.clone())).err().unwrap();
        assert_eq!(err, PipeError::OutputExists(path.to_string()));

        let writer = DataWriter::new(DataWriterConfig::new(path.clone()).overwrite(true)).unwrap();
        assert_eq!(writer.output_path(), path.as_path());
        assert!(!path.join("old").exists());
    }

    #[test]
    fn test_write_event_tables() {
        let (_dir, path) = tmp_output();
        let mut writer = DataWriter::new(DataWriterConfig::new(path.clone())).unwrap();

        let mut event = ArrayEvent::new(EventIndex::new(3, 11));
        event.tel.insert(
            4,
            crate::io::containers::TelescopeEvent {
                hillas: Some(crate::io::containers::HillasParameters {
                    intensity: 250.0,
                    length: 0.2,
                    width: 0.05,
                    fov_lon: 0.0,
                    fov_lat: 0.0,
                    psi: 0.0,
                }),
                dl2: ReconstructedContainer::default(),
            },
        );
        writer.write_event(&event).unwrap();
        assert_eq!(writer.n_events(), 1);

        drop(writer);
        let trigger = fs::read_to_string(path.join(TRIGGER_TABLE)).unwrap();
        assert!(trigger.ends_with("3,11,,,,1,4\n"));
        assert!(path.join(PARAMETERS_TABLE).exists());
        assert!(!path.join(SHOWER_TABLE).exists());
    }

    #[test]
    fn test_prefix_cannot_leave_output() {
        let (dir, path) = tmp_output();
        let mut writer = DataWriter::new(DataWriterConfig::new(path.clone())).unwrap();

        let mut event = ArrayEvent::new(EventIndex::new(1, 1));
        event.stereo.energy.insert(
            "../../escaped".to_string(),
            crate::io::containers::ReconstructedEnergy::invalid(),
        );
        assert!(matches!(
            writer.write_event(&event),
            Err(PipeError::InvalidConfig(_))
        ));
        assert_eq!(writer.n_events(), 0);
        assert!(!path.join(TRIGGER_TABLE).exists());
        assert!(!dir.path().join("escaped.csv").exists());

        let mut event = ArrayEvent::new(EventIndex::new(1, 2));
        event.tel.entry(1).or_default().dl2.geometry.insert(
            "a/b".to_string(),
            crate::io::containers::ReconstructedGeometry::invalid(),
        );
        assert!(writer.write_event(&event).is_err());

        let no_dl2 = DataWriterConfig {
            write_dl2: false,
            ..DataWriterConfig::new(path.join("nested"))
        };
        let mut writer = DataWriter::new(no_dl2).unwrap();
        assert!(writer.write_event(&event).is_ok());
    }
}
