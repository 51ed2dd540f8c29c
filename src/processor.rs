//! # Event processing tool
//!
//! [`Processor`] is the end-to-end pipeline step: open an input with
//! [`open_event_source`], combine telescope predictions with the configured
//! [`StereoMeanCombiner`]s, and persist everything with a [`DataWriter`].
//!
//! ## Overview
//! -----------------
//! * [`ProcessorConfig`] – the tool configuration, (de)serializable with `serde` so it can be
//!   loaded from JSON ([`ProcessorConfig::from_json_file`]) and exported for provenance
//!   ([`ProcessorConfig::to_json_string`]). Built and validated with
//!   [`ProcessorConfig::builder`].
//! * [`Processor::run`] – open the configured input and process it.
//! * [`Processor::process_source`] – process an already opened source. The source is rewound
//!   first, so the same source can be processed several times; each run writes a complete
//!   output, shower distributions included.
//!
//! ## Example
//! -----------------
//! ```rust, no_run
//! use iactpipe::processor::{Processor, ProcessorConfig};
//! use iactpipe::stereo::{CombineProperty, StereoMeanCombiner, StereoWeighting};
//!
//! let config = ProcessorConfig::builder("gamma.simtel.jsonl", "gamma_dl2")
//!     .overwrite(true)
//!     .stereo(
//!         StereoMeanCombiner::new("RandomForest", CombineProperty::Energy)
//!             .with_weights(StereoWeighting::Intensity),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let summary = Processor::new(config).unwrap().run().unwrap();
//! println!("{} events written to {}", summary.n_events, summary.output_path);
//! ```
use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::BufReader;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::constants::TelId;
use crate::io::table_layout::check_prefix;
use crate::io::{open_event_source, DataWriter, DataWriterConfig, EventSource, EventSourceConfig};
use crate::optional_deps::{require, OptionalDependency};
use crate::pipe_errors::PipeError;
use crate::stereo::{CombineProperty, StereoMeanCombiner};

#[cfg(feature = "progress")]
use crate::progress_bar::EventProgress;

/// Configuration of one stereo combiner; the combiner itself is plain data.
pub type StereoCombinerConfig = StereoMeanCombiner;

fn default_true() -> bool {
    true
}

/// Configuration of the [`Processor`] tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub input_url: Utf8PathBuf,
    pub output_path: Utf8PathBuf,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub max_events: Option<usize>,
    #[serde(default)]
    pub allowed_tels: Option<BTreeSet<TelId>>,
    #[serde(default = "default_true")]
    pub write_parameters: bool,
    #[serde(default = "default_true")]
    pub write_dl2: bool,
    /// Combiners applied to every event, in order
    #[serde(default)]
    pub stereo: Vec<StereoCombinerConfig>,
    /// Show a progress bar (cargo feature `progress`)
    #[serde(default)]
    pub progress: bool,
}

impl ProcessorConfig {
    /// Start a configuration reading `input_url` and writing to `output_path`.
    ///
    /// See also
    /// ------------
    /// * [`ProcessorConfigBuilder::build`] – Validation rules.
    pub fn builder(
        input_url: impl Into<Utf8PathBuf>,
        output_path: impl Into<Utf8PathBuf>,
    ) -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::new(input_url, output_path)
    }

    /// Load and validate a configuration stored as JSON.
    ///
    /// Arguments
    /// -----------------
    /// * `path`: JSON file with the fields of [`ProcessorConfig`]; omitted optional fields take
    ///   their defaults
    ///
    /// Return
    /// ----------
    /// * The configuration, or an I/O, JSON or [`PipeError::InvalidConfig`] error.
    pub fn from_json_file(path: &Utf8Path) -> Result<Self, PipeError> {
        let file = File::open(path)?;
        let config: ProcessorConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        log::debug!("loaded processor configuration from {path}");
        Ok(config)
    }

    /// Pretty-printed JSON of the configuration, loadable with [`Self::from_json_file`].
    pub fn to_json_string(&self) -> Result<String, PipeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reading options passed to the event source.
    pub fn source_config(&self) -> EventSourceConfig {
        EventSourceConfig {
            max_events: self.max_events,
            allowed_tels: self.allowed_tels.clone(),
        }
    }

    /// Check the option values and their consistency.
    pub fn validate(&self) -> Result<(), PipeError> {
        if self.max_events == Some(0) {
            return Err(PipeError::InvalidConfig(
                "max_events must be > 0 when given".into(),
            ));
        }
        if self.allowed_tels.as_ref().is_some_and(BTreeSet::is_empty) {
            return Err(PipeError::InvalidConfig(
                "allowed_tels must not be empty when given".into(),
            ));
        }
        if self.output_path == self.input_url {
            return Err(PipeError::InvalidConfig(format!(
                "output_path must differ from input_url ({})",
                self.input_url
            )));
        }

        let mut seen = HashSet::new();
        for combiner in &self.stereo {
            check_prefix(&combiner.prefix).map_err(|reason| {
                PipeError::InvalidConfig(format!("{} combiner: {reason}", combiner.property))
            })?;
            if !seen.insert((combiner.prefix.as_str(), combiner.property)) {
                return Err(PipeError::InvalidConfig(format!(
                    "{} combiner '{}' is configured twice",
                    combiner.property, combiner.prefix
                )));
            }
            if combiner.log_target && combiner.property != CombineProperty::Energy {
                log::warn!(
                    "log_target has no effect on the {} combiner '{}'",
                    combiner.property,
                    combiner.prefix
                );
            }
        }
        Ok(())
    }
}

/// Builder for [`ProcessorConfig`], with validation.
#[derive(Debug, Clone)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    pub fn new(input_url: impl Into<Utf8PathBuf>, output_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            config: ProcessorConfig {
                input_url: input_url.into(),
                output_path: output_path.into(),
                overwrite: false,
                max_events: None,
                allowed_tels: None,
                write_parameters: true,
                write_dl2: true,
                stereo: Vec::new(),
                progress: false,
            },
        }
    }

    pub fn overwrite(mut self, v: bool) -> Self {
        self.config.overwrite = v;
        self
    }
    pub fn max_events(mut self, v: usize) -> Self {
        self.config.max_events = Some(v);
        self
    }
    pub fn allowed_tels(mut self, v: impl IntoIterator<Item = TelId>) -> Self {
        self.config.allowed_tels = Some(v.into_iter().collect());
        self
    }
    pub fn write_parameters(mut self, v: bool) -> Self {
        self.config.write_parameters = v;
        self
    }
    pub fn write_dl2(mut self, v: bool) -> Self {
        self.config.write_dl2 = v;
        self
    }
    /// Append a stereo combiner.
    pub fn stereo(mut self, v: StereoCombinerConfig) -> Self {
        self.config.stereo.push(v);
        self
    }
    pub fn progress(mut self, v: bool) -> Self {
        self.config.progress = v;
        self
    }

    /// Validate and return the configuration.
    ///
    /// Return
    /// ----------
    /// * [`PipeError::InvalidConfig`] when `max_events` is `0`, `allowed_tels` is empty, the
    ///   output path equals the input, or a combiner has an empty or duplicated prefix.
    pub fn build(self) -> Result<ProcessorConfig, PipeError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// What a processing run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSummary {
    pub input_url: Utf8PathBuf,
    pub output_path: Utf8PathBuf,
    pub n_events: usize,
    pub n_shower_distributions: usize,
    pub tables: Vec<String>,
}

/// Reads events, applies the stereo combiners and writes the result.
pub struct Processor {
    config: ProcessorConfig,
    combiners: Vec<StereoMeanCombiner>,
}

impl Processor {
    /// Prepare a processor.
    ///
    /// Return
    /// ----------
    /// * [`PipeError::InvalidConfig`] for an invalid configuration,
    ///   [`PipeError::OptionalDependency`] when `progress` is requested but the `progress`
    ///   feature is disabled.
    pub fn new(config: ProcessorConfig) -> Result<Self, PipeError> {
        config.validate()?;
        if config.progress {
            require(OptionalDependency::Progress, "show a progress bar")?;
        }
        let combiners = config.stereo.clone();
        Ok(Self { config, combiners })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Open `input_url` and process all of its events.
    pub fn run(&self) -> Result<ProcessSummary, PipeError> {
        let mut source = open_event_source(&self.config.input_url, self.config.source_config())?;
        log::info!(
            "processing {} with {}",
            self.config.input_url,
            source.backend_name()
        );
        self.process_source(&mut source)
    }

    /// Process an already opened source.
    ///
    /// The source is rewound before reading, so a source that was iterated before (or processed
    /// by an earlier call) is read from its first event again. Reading options are those the
    /// source was opened with; `max_events` and `allowed_tels` of the configuration only apply
    /// in [`Self::run`].
    ///
    /// Arguments
    /// -----------------
    /// * `source`: any [`EventSource`]
    ///
    /// Return
    /// ----------
    /// * A [`ProcessSummary`]. The output directory holds the events, the run configuration and
    ///   the shower distributions of the source.
    pub fn process_source<S>(&self, source: &mut S) -> Result<ProcessSummary, PipeError>
    where
        S: EventSource + ?Sized,
    {
        source.rewind()?;

        let writer_config = DataWriterConfig {
            output_path: self.config.output_path.clone(),
            overwrite: self.config.overwrite,
            write_parameters: self.config.write_parameters,
            write_dl2: self.config.write_dl2,
        };
        let mut writer =
            DataWriter::new(writer_config)?.with_run_config(serde_json::to_value(&self.config)?);

        #[cfg(feature = "progress")]
        let mut progress = self
            .config
            .progress
            .then(|| EventProgress::new(source.size_hint().1.map(|n| n as u64)));

        for event in &mut *source {
            let mut event = event?;
            for combiner in &self.combiners {
                combiner.combine_event(&mut event)?;
            }
            writer.write_event(&event)?;

            #[cfg(feature = "progress")]
            {
                if let Some(progress) = progress.as_mut() {
                    progress.inc();
                }
            }
        }

        #[cfg(feature = "progress")]
        {
            if let Some(progress) = progress {
                progress.finish();
            }
        }

        let summary = writer.finish(&*source)?;
        log::info!(
            "processed {} events from {} into {} ({} shower distributions)",
            summary.n_events,
            source.input_url(),
            summary.output_path,
            summary.n_shower_distributions
        );

        Ok(ProcessSummary {
            input_url: source.input_url().to_path_buf(),
            output_path: summary.output_path,
            n_events: summary.n_events,
            n_shower_distributions: summary.n_shower_distributions,
            tables: summary.tables,
        })
    }
}

#[cfg(test)]
mod processor_test {
    use super::*;
    use crate::io::{SimulationEventSource, TableEventSource};
    use crate::stereo::StereoWeighting;

    fn sample_path() -> Utf8PathBuf {
        Utf8PathBuf::from(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/data/gamma_sample.simtel.jsonl"
        ))
    }

    fn output_in(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join("dl2")).unwrap()
    }

    #[test]
    fn test_builder_validation() {
        let ok = ProcessorConfig::builder("in.jsonl", "out").build().unwrap();
        assert!(ok.write_parameters && ok.write_dl2 && !ok.overwrite);

        let err = ProcessorConfig::builder("in.jsonl", "out")
            .max_events(0)
            .build();
        assert!(matches!(err, Err(PipeError::InvalidConfig(_))));

        let err = ProcessorConfig::builder("same", "same").build();
        assert!(matches!(err, Err(PipeError::InvalidConfig(_))));

        let err = ProcessorConfig::builder("in.jsonl", "out")
            .stereo(StereoMeanCombiner::new(" ", CombineProperty::Energy))
            .build();
        assert!(matches!(err, Err(PipeError::InvalidConfig(_))));

        let err = ProcessorConfig::builder("in.jsonl", "out")
            .stereo(StereoMeanCombiner::new("rf", CombineProperty::Energy))
            .stereo(StereoMeanCombiner::new("rf", CombineProperty::Energy))
            .build();
        assert!(matches!(err, Err(PipeError::InvalidConfig(_))));

        let err = ProcessorConfig::builder("in.jsonl", "out")
            .allowed_tels([])
            .build();
        assert!(matches!(err, Err(PipeError::InvalidConfig(_))));

        for prefix in ["../../escaped", "a/b", "..", ".", "Random Forest"] {
            let err = ProcessorConfig::builder("in.jsonl", "out")
                .stereo(StereoMeanCombiner::new(prefix, CombineProperty::Energy))
                .build();
            assert!(matches!(err, Err(PipeError::InvalidConfig(_))), "{prefix}");
        }
        assert!(ProcessorConfig::builder("in.jsonl", "out")
            .stereo(StereoMeanCombiner::new("rf-v1.2_x", CombineProperty::Energy))
            .build()
            .is_ok());
    }

    #[test]
    fn test_json_round_trip() {
        let config = ProcessorConfig::builder("in.jsonl", "out")
            .max_events(10)
            .stereo(
                StereoMeanCombiner::new("RandomForest", CombineProperty::Energy)
                    .with_weights(StereoWeighting::Konrad)
                    .with_log_target(true),
            )
            .build()
            .unwrap();
        let json = config.to_json_string().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("config.json")).unwrap();
        std::fs::write(&path, json).unwrap();
        assert_eq!(ProcessorConfig::from_json_file(&path).unwrap(), config);
    }

    #[test]
    fn test_json_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("config.json")).unwrap();
        std::fs::write(
            &path,
            r#"{"input_url": "a.jsonl", "output_path": "b", "stereo": [{"prefix": "disp", "property": "geometry"}]}"#,
        )
        .unwrap();
        let config = ProcessorConfig::from_json_file(&path).unwrap();
        assert!(config.write_dl2);
        assert!(!config.progress);
        assert_eq!(config.stereo[0].weights, StereoWeighting::None);
    }

    #[test]
    fn test_run_with_combiners() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let config = ProcessorConfig::builder(sample_path(), output_in(&dir))
            .stereo(
                StereoMeanCombiner::new("RandomForest", CombineProperty::Energy)
                    .with_weights(StereoWeighting::Intensity),
            )
            .stereo(StereoMeanCombiner::new("disp", CombineProperty::Geometry))
            .build()
            .unwrap();

        let summary = Processor::new(config).unwrap().run().unwrap();
        assert_eq!(summary.n_events, 5);
        assert_eq!(summary.n_shower_distributions, 2);

        let events: Vec<_> = TableEventSource::open(&summary.output_path, Default::default())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(events.len(), 5);
        assert!(events
            .iter()
            .all(|e| e.stereo.energy["RandomForest"].is_valid && e.stereo.geometry["disp"].is_valid));
    }

    #[test]
    fn test_process_source_twice() {
        let dir = tempfile::tempdir().unwrap();
        let mut source =
            SimulationEventSource::open(&sample_path(), EventSourceConfig::default()).unwrap();
        let config = ProcessorConfig::builder(sample_path(), output_in(&dir))
            .overwrite(true)
            .build()
            .unwrap();
        let processor = Processor::new(config).unwrap();

        for _ in 0..2 {
            let summary = processor.process_source(&mut source).unwrap();
            assert_eq!(summary.n_events, 5);
            assert_eq!(summary.n_shower_distributions, 2);
            let written = TableEventSource::open(&summary.output_path, Default::default()).unwrap();
            assert_eq!(written.simulated_shower_distributions().len(), 2);
        }
    }

    #[test]
    fn test_max_events_and_allowed_tels() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProcessorConfig::builder(sample_path(), output_in(&dir))
            .max_events(2)
            .allowed_tels([1, 2])
            .build()
            .unwrap();
        let summary = Processor::new(config).unwrap().run().unwrap();
        assert_eq!(summary.n_events, 2);

        let written = TableEventSource::open(&summary.output_path, Default::default()).unwrap();
        assert_eq!(written.subarray().n_tels(), 2);
        // distributions do not depend on the number of events read
        assert_eq!(written.simulated_shower_distributions().len(), 2);
    }

    #[cfg(not(feature = "progress"))]
    #[test]
    fn test_progress_requires_feature() {
        let config = ProcessorConfig::builder("in.jsonl", "out")
            .progress(true)
            .build()
            .unwrap();
        match Processor::new(config).err().unwrap() {
            PipeError::OptionalDependency(e) => {
                assert_eq!(e.dependency, OptionalDependency::Progress)
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
