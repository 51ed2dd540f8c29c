//! # Parquet event source
//!
//! [`ParquetEventSource`] reads a flat **telescope-event** table from Apache Parquet (one row per
//! triggered telescope) and groups the rows into [`ArrayEvent`]s.
//!
//! ## Expected Parquet Schema
//! -----------------
//! Required leaf columns:
//! - `obs_id: UInt64`, `event_id: UInt64` – array event index,
//! - `tel_id: UInt16` (or `UInt32`) – telescope id.
//!
//! Optional columns, used when present:
//! - `hillas_intensity`, `hillas_length`, `hillas_width: Float64` – Hillas parameters, set on a
//!   telescope when all three are non-null; `hillas_fov_lon`, `hillas_fov_lat`, `hillas_psi`
//!   complete them,
//! - `time_mjd_tai: Float64` – trigger time,
//! - `pointing_alt`, `pointing_az: Float64` – array pointing in degrees.
//!
//! Only the present columns are projected. Rows with a null key (`obs_id`, `event_id`,
//! `tel_id`) are skipped and counted in a warning.
//!
//! Such tables carry no simulation metadata: the source is never a simulation and has no shower
//! distributions. The subarray is built from the telescope ids found in the file.
use std::io;

use ahash::RandomState;
use arrow_array::array::{Array, Float64Array, UInt16Array, UInt32Array, UInt64Array};
use arrow_array::RecordBatch;
use camino::{Utf8Path, Utf8PathBuf};
use parquet::arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ProjectionMask};
use parquet::errors::ParquetError;

use super::containers::{
    ArrayEvent, EventIndex, HillasParameters, SubarrayDescription, TelescopeDescription,
};
use super::event_source::{DataLevel, EventSource, EventSourceConfig};
use super::{is_parquet_file, FastHashMap};
use crate::constants::{ObsId, TelId};
use crate::coordinates::AltAz;
use crate::pipe_errors::PipeError;
use crate::time::from_mjd_tai;

const KEY_COLUMNS: [&str; 3] = ["obs_id", "event_id", "tel_id"];
const OPTIONAL_COLUMNS: [&str; 9] = [
    "hillas_intensity",
    "hillas_length",
    "hillas_width",
    "hillas_fov_lon",
    "hillas_fov_lat",
    "hillas_psi",
    "time_mjd_tai",
    "pointing_alt",
    "pointing_az",
];

/// [`EventSource`] over a flat telescope-event Parquet table.
pub struct ParquetEventSource {
    input_url: Utf8PathBuf,
    config: EventSourceConfig,
    subarray: SubarrayDescription,
    events: Vec<ArrayEvent>,
    has_parameters: bool,
    position: usize,
}

impl ParquetEventSource {
    /// Read and group the telescope events of `path`.
    ///
    /// Arguments
    /// -----------------
    /// * `path`: Parquet file with at least the `obs_id`, `event_id` and `tel_id` columns
    /// * `config`: reading options (`max_events`, `allowed_tels`)
    ///
    /// Return
    /// ----------
    /// * The opened source. A missing key column is an `io::ErrorKind::NotFound`, a column of
    ///   unexpected type an `io::ErrorKind::InvalidData`.
    pub fn open(path: &Utf8Path, config: EventSourceConfig) -> Result<Self, PipeError> {
        Self::open_with_batch_size(path, config, None)
    }

    /// Same as [`Self::open`] with an explicit Arrow batch size (default 8192 rows).
    pub fn open_with_batch_size(
        path: &Utf8Path,
        config: EventSourceConfig,
        batch_size: Option<usize>,
    ) -> Result<Self, PipeError> {
        let file = std::fs::File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

        let schema_descr = builder.metadata().file_metadata().schema_descr();
        let all_fields = schema_descr.columns();
        let position = |name: &str| all_fields.iter().position(|f| f.name() == name);

        let mut projection_indices: Vec<usize> = KEY_COLUMNS
            .iter()
            .map(|name| {
                position(*name).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("Column '{name}' not found in schema"),
                    )
                })
            })
            .collect::<Result<_, _>>()?;
        projection_indices.extend(OPTIONAL_COLUMNS.iter().filter_map(|name| position(*name)));
        let mask = ProjectionMask::leaves(schema_descr, projection_indices);

        let reader = builder
            .with_projection(mask)
            .with_batch_size(batch_size.unwrap_or(8192))
            .build()?;

        let mut grouped: FastHashMap<EventIndex, ArrayEvent> =
            FastHashMap::with_capacity_and_hasher(1024, RandomState::default());
        let mut n_rows = 0usize;
        let mut skipped = 0usize;

        for maybe_batch in reader {
            let batch = maybe_batch.map_err(ParquetError::from)?;
            let columns = BatchColumns::new(&batch)?;
            n_rows += batch.num_rows();

            for i in 0..batch.num_rows() {
                let Some((index, tel_id)) = columns.key(i)? else {
                    skipped += 1;
                    continue;
                };
                let event = grouped
                    .entry(index)
                    .or_insert_with(|| ArrayEvent::new(index));
                if event.time.is_none() {
                    event.time = from_mjd_tai(columns.time_mjd_tai.and_then(|c| f64_at(c, i)));
                }
                if event.pointing.is_none() {
                    event.pointing = columns.pointing(i);
                }
                event.tel.entry(tel_id).or_default().hillas = columns.hillas(i);
            }
        }

        if skipped > 0 {
            log::warn!("{path}: skipped {skipped} rows with a null obs_id, event_id or tel_id");
        }

        let mut events: Vec<ArrayEvent> = grouped.into_values().collect();
        events.sort_unstable_by_key(|event| event.index);

        let has_parameters = events
            .iter()
            .flat_map(|event| event.tel.values())
            .any(|tel| tel.hillas.is_some());

        let mut tel_ids: Vec<TelId> = events
            .iter()
            .flat_map(|event| event.tel.keys().copied())
            .collect();
        tel_ids.sort_unstable();
        tel_ids.dedup();
        let subarray = SubarrayDescription::new(
            path.file_stem().unwrap_or("parquet"),
            tel_ids.into_iter().map(|tel_id| TelescopeDescription {
                tel_id,
                name: format!("tel_{tel_id:03}"),
                position: [0.0; 3],
                equivalent_focal_length: None,
            }),
        );
        let subarray = config.filter_subarray(subarray);

        log::info!(
            "opened parquet table {path}: {n_rows} telescope events in {} array events",
            events.len()
        );

        Ok(Self {
            input_url: path.to_path_buf(),
            config,
            subarray,
            events,
            has_parameters,
            position: 0,
        })
    }
}

enum TelIdColumn<'a> {
    U16(&'a UInt16Array),
    U32(&'a UInt32Array),
}

/// Typed views on the projected columns of one batch, downcast once.
struct BatchColumns<'a> {
    obs_id: &'a UInt64Array,
    event_id: &'a UInt64Array,
    tel_id: TelIdColumn<'a>,
    intensity: Option<&'a Float64Array>,
    length: Option<&'a Float64Array>,
    width: Option<&'a Float64Array>,
    fov_lon: Option<&'a Float64Array>,
    fov_lat: Option<&'a Float64Array>,
    psi: Option<&'a Float64Array>,
    time_mjd_tai: Option<&'a Float64Array>,
    pointing_alt: Option<&'a Float64Array>,
    pointing_az: Option<&'a Float64Array>,
}

impl<'a> BatchColumns<'a> {
    fn new(batch: &'a RecordBatch) -> Result<Self, io::Error> {
        let tel_column = batch
            .column_by_name("tel_id")
            .ok_or_else(|| missing_column("tel_id"))?;
        let tel_id = if let Some(array) = tel_column.as_any().downcast_ref::<UInt16Array>() {
            TelIdColumn::U16(array)
        } else if let Some(array) = tel_column.as_any().downcast_ref::<UInt32Array>() {
            TelIdColumn::U32(array)
        } else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "tel_id must be UInt16Array or UInt32Array",
            ));
        };

        Ok(Self {
            obs_id: required_u64(batch, "obs_id")?,
            event_id: required_u64(batch, "event_id")?,
            tel_id,
            intensity: optional_f64(batch, "hillas_intensity")?,
            length: optional_f64(batch, "hillas_length")?,
            width: optional_f64(batch, "hillas_width")?,
            fov_lon: optional_f64(batch, "hillas_fov_lon")?,
            fov_lat: optional_f64(batch, "hillas_fov_lat")?,
            psi: optional_f64(batch, "hillas_psi")?,
            time_mjd_tai: optional_f64(batch, "time_mjd_tai")?,
            pointing_alt: optional_f64(batch, "pointing_alt")?,
            pointing_az: optional_f64(batch, "pointing_az")?,
        })
    }

    /// Event index and telescope id of row `i`, `None` if a key is null.
    fn key(&self, i: usize) -> Result<Option<(EventIndex, TelId)>, io::Error> {
        if self.obs_id.is_null(i) || self.event_id.is_null(i) {
            return Ok(None);
        }
        let tel_id = match self.tel_id {
            TelIdColumn::U16(array) if array.is_valid(i) => array.value(i),
            TelIdColumn::U32(array) if array.is_valid(i) => {
                TelId::try_from(array.value(i)).map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("tel_id {} does not fit in 16 bits", array.value(i)),
                    )
                })?
            }
            _ => return Ok(None),
        };
        Ok(Some((
            EventIndex::new(self.obs_id.value(i), self.event_id.value(i)),
            tel_id,
        )))
    }

    fn hillas(&self, i: usize) -> Option<HillasParameters> {
        let intensity = f64_at(self.intensity?, i)?;
        let length = f64_at(self.length?, i)?;
        let width = f64_at(self.width?, i)?;
        let or_zero =
            |column: Option<&Float64Array>| column.and_then(|c| f64_at(c, i)).unwrap_or(0.0);
        Some(HillasParameters {
            intensity,
            length,
            width,
            fov_lon: or_zero(self.fov_lon),
            fov_lat: or_zero(self.fov_lat),
            psi: or_zero(self.psi),
        })
    }

    fn pointing(&self, i: usize) -> Option<AltAz> {
        let alt = f64_at(self.pointing_alt?, i)?;
        let az = f64_at(self.pointing_az?, i)?;
        Some(AltAz::new(alt, az))
    }
}

fn f64_at(array: &Float64Array, i: usize) -> Option<f64> {
    array.is_valid(i).then(|| array.value(i))
}

fn missing_column(name: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("Column '{name}' not found in schema"),
    )
}

fn required_u64<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt64Array, io::Error> {
    batch
        .column_by_name(name)
        .ok_or_else(|| missing_column(name))?
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{name} must be UInt64Array"),
            )
        })
}

fn optional_f64<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<Option<&'a Float64Array>, io::Error> {
    let Some(column) = batch.column_by_name(name) else {
        return Ok(None);
    };
    column
        .as_any()
        .downcast_ref::<Float64Array>()
        .map(Some)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{name} must be Float64Array"),
            )
        })
}

impl Iterator for ParquetEventSource {
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

impl EventSource for ParquetEventSource {
    fn input_url(&self) -> &Utf8Path {
        &self.input_url
    }

    fn is_simulation(&self) -> bool {
        false
    }

    fn subarray(&self) -> &SubarrayDescription {
        &self.subarray
    }

    fn obs_ids(&self) -> Vec<ObsId> {
        let mut ids: Vec<ObsId> = self.events.iter().map(|e| e.index.obs_id).collect();
        ids.dedup();
        ids
    }

    fn datalevels(&self) -> Vec<DataLevel> {
        if self.has_parameters {
            vec![DataLevel::Trigger, DataLevel::Dl1Parameters]
        } else {
            vec![DataLevel::Trigger]
        }
    }

    fn rewind(&mut self) -> Result<(), PipeError> {
        self.position = 0;
        Ok(())
    }

    fn is_compatible(path: &Utf8Path) -> bool {
        is_parquet_file(path)
    }
}
