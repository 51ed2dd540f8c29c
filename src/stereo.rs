//! # Stereo combination of telescope-wise predictions
//!
//! Mono reconstructions (energy, gamma/hadron classification, shower direction) are produced
//! per telescope. [`StereoMeanCombiner`] merges them into one array-level prediction as a
//! weighted mean.
//!
//! ## Weighting
//! -----------------
//! | [`StereoWeighting`] | weight of a telescope |
//! |---|---|
//! | `None` | `1` |
//! | `Intensity` | Hillas intensity |
//! | `Konrad` | intensity · length / width |
//!
//! Weights are divided by their maximum before averaging: per event in
//! [`StereoMeanCombiner::combine_event`], over the whole table in
//! [`StereoMeanCombiner::predict_table`]. When the weights of an event sum to zero the
//! prediction is `NaN` and flagged invalid.
//!
//! ## Property-specific rules
//! -----------------
//! * **Energy** – weighted mean. The uncertainty of an event is the weighted sample standard
//!   deviation for reliability weights (divided by `V1 - V2/V1`, `NaN` for one telescope); the
//!   table mode uses the weighted RMS deviation. With `log_target` both are computed on `ln(E)`
//!   and mapped back with `exp`.
//! * **Classification** – weighted mean of the predictions.
//! * **Geometry** – weighted mean of the Cartesian unit vectors, converted back to (alt, az).
//!   Uncertainties are not estimated and are `NaN`.
//!
//! Invalid mono predictions never contribute. The telescopes that did contribute are listed in
//! the `telescopes` field of the result.
use std::fmt;

use itertools::Itertools;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::constants::{EventId, ObsId, TeV, TelId};
use crate::coordinates::AltAz;
use crate::io::containers::{
    ArrayEvent, EventIndex, HillasParameters, ParticleClassification, ReconstructedContainer,
    ReconstructedEnergy, ReconstructedGeometry, TelescopeList,
};
use crate::pipe_errors::PipeError;

/// Reconstructed quantity handled by a combiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineProperty {
    Energy,
    Classification,
    Geometry,
}

impl fmt::Display for CombineProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CombineProperty::Energy => "energy",
            CombineProperty::Classification => "classification",
            CombineProperty::Geometry => "geometry",
        };
        f.write_str(name)
    }
}

/// How telescope predictions are weighted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StereoWeighting {
    #[default]
    None,
    Intensity,
    Konrad,
}

impl StereoWeighting {
    /// Weight of one telescope, `None` when Hillas parameters are needed but missing.
    pub fn weight(self, hillas: Option<&HillasParameters>) -> Option<f64> {
        match self {
            StereoWeighting::None => Some(1.0),
            StereoWeighting::Intensity => hillas.map(|h| h.intensity),
            StereoWeighting::Konrad => hillas.map(|h| h.intensity * h.length / h.width),
        }
    }
}

impl fmt::Display for StereoWeighting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StereoWeighting::None => "none",
            StereoWeighting::Intensity => "intensity",
            StereoWeighting::Konrad => "konrad",
        };
        f.write_str(name)
    }
}

/// One telescope-wise prediction value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PredictionValue {
    Energy(TeV),
    Classification(f64),
    Geometry(AltAz),
}

impl PredictionValue {
    pub fn property(&self) -> CombineProperty {
        match self {
            PredictionValue::Energy(_) => CombineProperty::Energy,
            PredictionValue::Classification(_) => CombineProperty::Classification,
            PredictionValue::Geometry(_) => CombineProperty::Geometry,
        }
    }
}

/// Row of a telescope-event prediction table.
#[derive(Debug, Clone, PartialEq)]
pub struct MonoPredictionRow {
    pub obs_id: ObsId,
    pub event_id: EventId,
    pub tel_id: TelId,
    pub hillas: Option<HillasParameters>,
    pub value: PredictionValue,
    pub is_valid: bool,
}

/// Array-level prediction.
#[derive(Debug, Clone, PartialEq)]
pub enum StereoPrediction {
    Energy(ReconstructedEnergy),
    Classification(ParticleClassification),
    Geometry(ReconstructedGeometry),
}

impl StereoPrediction {
    pub fn is_valid(&self) -> bool {
        match self {
            StereoPrediction::Energy(e) => e.is_valid,
            StereoPrediction::Classification(c) => c.is_valid,
            StereoPrediction::Geometry(g) => g.is_valid,
        }
    }

    pub fn telescopes(&self) -> &TelescopeList {
        match self {
            StereoPrediction::Energy(e) => &e.telescopes,
            StereoPrediction::Classification(c) => &c.telescopes,
            StereoPrediction::Geometry(g) => &g.telescopes,
        }
    }
}

/// Row of the stereo prediction table, one per array event.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoPredictionRow {
    pub obs_id: ObsId,
    pub event_id: EventId,
    pub prediction: StereoPrediction,
}

/// Weighted-mean stereo combiner for one property of one reconstruction algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StereoMeanCombiner {
    /// Algorithm prefix the mono predictions are stored under, reused for the stereo result
    pub prefix: String,
    pub property: CombineProperty,
    #[serde(default)]
    pub weights: StereoWeighting,
    /// Average `ln(value)` and map back with `exp` (energy only)
    #[serde(default)]
    pub log_target: bool,
}

/// Valid input of one telescope.
struct Contribution {
    tel_id: TelId,
    value: PredictionValue,
    weight: f64,
}

impl StereoMeanCombiner {
    pub fn new(prefix: impl Into<String>, property: CombineProperty) -> Self {
        Self {
            prefix: prefix.into(),
            property,
            weights: StereoWeighting::None,
            log_target: false,
        }
    }

    pub fn with_weights(mut self, weights: StereoWeighting) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_log_target(mut self, log_target: bool) -> Self {
        self.log_target = log_target;
        self
    }

    /// Combine the mono predictions of one event and store the result in `event.stereo`.
    ///
    /// Telescopes without a prediction under `prefix`, or with an invalid one, are ignored.
    /// Classification and geometry fall back to a weight of `1` for telescopes without Hillas
    /// parameters; energy does not.
    ///
    /// Arguments
    /// -----------------
    /// * `event`: array event holding telescope predictions in `tel[..].dl2`
    ///
    /// Return
    /// ----------
    /// * [`PipeError::MissingParameters`] when energies are weighted and a contributing
    ///   telescope has no Hillas parameters.
    pub fn combine_event(&self, event: &mut ArrayEvent) -> Result<(), PipeError> {
        let mut contributions = Vec::with_capacity(event.tel.len());

        for (&tel_id, tel) in &event.tel {
            let Some(value) = self.mono_value(&tel.dl2) else {
                continue;
            };
            let weight = match self.weights.weight(tel.hillas.as_ref()) {
                Some(weight) => weight,
                None if self.property == CombineProperty::Energy => {
                    return Err(PipeError::MissingParameters(format!(
                        "event {:?}: telescope {tel_id} has no Hillas parameters for '{}' weighting",
                        event.index, self.weights
                    )));
                }
                None => 1.0,
            };
            contributions.push(Contribution {
                tel_id,
                value,
                weight,
            });
        }

        normalize_weights(&mut contributions);
        let prediction = self.combine(&contributions, Spread::Reliability);
        log::trace!(
            "event {:?}: stereo {} '{}' from {} telescopes",
            event.index,
            self.property,
            self.prefix,
            contributions.len()
        );

        let prefix = self.prefix.clone();
        match prediction {
            StereoPrediction::Energy(e) => {
                event.stereo.energy.insert(prefix, e);
            }
            StereoPrediction::Classification(c) => {
                event.stereo.classification.insert(prefix, c);
            }
            StereoPrediction::Geometry(g) => {
                event.stereo.geometry.insert(prefix, g);
            }
        }
        Ok(())
    }

    /// Combine a table of telescope-event predictions into one row per array event.
    ///
    /// Every `(obs_id, event_id)` present in `rows` yields a row, sorted by index, even when
    /// all its predictions are invalid (the result is then `NaN` and invalid). Weights are
    /// normalized by their maximum over all valid rows.
    ///
    /// Arguments
    /// -----------------
    /// * `rows`: mono predictions of this combiner's property
    ///
    /// Return
    /// ----------
    /// * The stereo rows, or [`PipeError::MissingParameters`] if weighting needs Hillas
    ///   parameters a valid row does not have, [`PipeError::InvalidConfig`] if a row holds a
    ///   prediction of another property.
    pub fn predict_table(
        &self,
        rows: &[MonoPredictionRow],
    ) -> Result<Vec<StereoPredictionRow>, PipeError> {
        if let Some(row) = rows.iter().find(|r| r.value.property() != self.property) {
            return Err(PipeError::InvalidConfig(format!(
                "{} combiner '{}' received a {} prediction",
                self.property,
                self.prefix,
                row.value.property()
            )));
        }

        let mut weights = Vec::with_capacity(rows.len());
        for row in rows.iter().filter(|r| r.is_valid) {
            let weight = self.weights.weight(row.hillas.as_ref()).ok_or_else(|| {
                PipeError::MissingParameters(format!(
                    "telescope {} of event ({}, {}) has no Hillas parameters for '{}' weighting",
                    row.tel_id, row.obs_id, row.event_id, self.weights
                ))
            })?;
            weights.push(weight);
        }
        let max_weight = weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut weights = weights.into_iter();

        // weights are consumed in row order, before grouping
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let weight = if row.is_valid {
                weights.next().map(|w| w / max_weight)
            } else {
                None
            };
            entries.push((row, weight));
        }

        let groups = entries
            .into_iter()
            .sorted_by_key(|(row, _)| EventIndex::new(row.obs_id, row.event_id))
            .chunk_by(|(row, _)| EventIndex::new(row.obs_id, row.event_id));

        let mut output = Vec::new();
        for (index, group) in &groups {
            let contributions: Vec<Contribution> = group
                .filter_map(|(row, weight)| {
                    weight.map(|weight| Contribution {
                        tel_id: row.tel_id,
                        value: row.value,
                        weight,
                    })
                })
                .collect();
            output.push(StereoPredictionRow {
                obs_id: index.obs_id,
                event_id: index.event_id,
                prediction: self.combine(&contributions, Spread::Population),
            });
        }

        log::debug!(
            "combined {} mono {} predictions into {} array events",
            rows.len(),
            self.property,
            output.len()
        );
        Ok(output)
    }

    /// Flatten the mono predictions of `events` into table rows for [`Self::predict_table`].
    pub fn mono_rows<'a, I>(&self, events: I) -> Vec<MonoPredictionRow>
    where
        I: IntoIterator<Item = &'a ArrayEvent>,
    {
        let mut rows = Vec::new();
        for event in events {
            for (&tel_id, tel) in &event.tel {
                let (value, is_valid) = match self.property {
                    CombineProperty::Energy => match tel.dl2.energy.get(&self.prefix) {
                        Some(e) => (PredictionValue::Energy(e.energy), e.is_valid),
                        None => continue,
                    },
                    CombineProperty::Classification => {
                        match tel.dl2.classification.get(&self.prefix) {
                            Some(c) => (PredictionValue::Classification(c.prediction), c.is_valid),
                            None => continue,
                        }
                    }
                    CombineProperty::Geometry => match tel.dl2.geometry.get(&self.prefix) {
                        Some(g) => (PredictionValue::Geometry(g.direction()), g.is_valid),
                        None => continue,
                    },
                };
                rows.push(MonoPredictionRow {
                    obs_id: event.index.obs_id,
                    event_id: event.index.event_id,
                    tel_id,
                    hillas: tel.hillas,
                    value,
                    is_valid,
                });
            }
        }
        rows
    }

    /// Valid mono prediction stored under this combiner's prefix.
    fn mono_value(&self, dl2: &ReconstructedContainer) -> Option<PredictionValue> {
        match self.property {
            CombineProperty::Energy => dl2
                .energy
                .get(&self.prefix)
                .filter(|e| e.is_valid)
                .map(|e| PredictionValue::Energy(e.energy)),
            CombineProperty::Classification => dl2
                .classification
                .get(&self.prefix)
                .filter(|c| c.is_valid)
                .map(|c| PredictionValue::Classification(c.prediction)),
            CombineProperty::Geometry => dl2
                .geometry
                .get(&self.prefix)
                .filter(|g| g.is_valid)
                .map(|g| PredictionValue::Geometry(g.direction())),
        }
    }

    fn combine(&self, contributions: &[Contribution], spread: Spread) -> StereoPrediction {
        let telescopes: TelescopeList = contributions.iter().map(|c| c.tel_id).collect();
        let weights: Vec<f64> = contributions.iter().map(|c| c.weight).collect();

        match self.property {
            CombineProperty::Energy => {
                let values: Vec<f64> = contributions
                    .iter()
                    .filter_map(|c| match c.value {
                        PredictionValue::Energy(e) if self.log_target => Some(e.ln()),
                        PredictionValue::Energy(e) => Some(e),
                        _ => None,
                    })
                    .collect();
                let (mut mean, mut std) = weighted_mean_std(&values, &weights, spread);
                if self.log_target {
                    mean = mean.exp();
                    std = std.exp();
                }
                StereoPrediction::Energy(ReconstructedEnergy {
                    energy: mean,
                    energy_uncert: std,
                    is_valid: mean.is_finite(),
                    telescopes,
                })
            }
            CombineProperty::Classification => {
                let values: Vec<f64> = contributions
                    .iter()
                    .filter_map(|c| match c.value {
                        PredictionValue::Classification(p) => Some(p),
                        _ => None,
                    })
                    .collect();
                let mean = weighted_mean(&values, &weights);
                StereoPrediction::Classification(ParticleClassification {
                    prediction: mean,
                    is_valid: mean.is_finite(),
                    telescopes,
                })
            }
            CombineProperty::Geometry => {
                let mut sum = Vector3::zeros();
                for c in contributions {
                    if let PredictionValue::Geometry(direction) = c.value {
                        sum += direction.unit_vector() * c.weight;
                    }
                }
                let direction = AltAz::from_vector(&sum);
                let is_valid = !contributions.is_empty() && direction.is_finite();
                StereoPrediction::Geometry(ReconstructedGeometry {
                    alt: if is_valid { direction.alt } else { f64::NAN },
                    az: if is_valid { direction.az } else { f64::NAN },
                    alt_uncert: f64::NAN,
                    az_uncert: f64::NAN,
                    is_valid,
                    telescopes,
                })
            }
        }
    }
}

/// Divide the weights by their maximum.
fn normalize_weights(contributions: &mut [Contribution]) {
    let max = contributions
        .iter()
        .map(|c| c.weight)
        .fold(f64::NEG_INFINITY, f64::max);
    if max > 0.0 && max.is_finite() {
        for c in contributions.iter_mut() {
            c.weight /= max;
        }
    }
}

/// Weighted mean, `NaN` when there is no value or the weights do not sum to a positive number.
fn weighted_mean(values: &[f64], weights: &[f64]) -> f64 {
    let sum_weights: f64 = weights.iter().sum();
    if values.is_empty() || !(sum_weights > 0.0) || !sum_weights.is_finite() {
        return f64::NAN;
    }
    values.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / sum_weights
}

/// Normalization of the weighted squared deviations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Spread {
    /// Divide by `V1 = Σw`: the weighted RMS deviation.
    Population,
    /// Divide by `V1 - V2 / V1` with `V2 = Σw²`: unbiased for reliability weights, undefined
    /// (`NaN`) for a single value.
    Reliability,
}

/// Weighted mean and weighted standard deviation around it.
fn weighted_mean_std(values: &[f64], weights: &[f64], spread: Spread) -> (f64, f64) {
    let mean = weighted_mean(values, weights);
    if mean.is_nan() {
        return (f64::NAN, f64::NAN);
    }
    let v1: f64 = weights.iter().sum();
    let sum_squares: f64 = values
        .iter()
        .zip(weights)
        .map(|(v, w)| w * (v - mean).powi(2))
        .sum();
    let norm = match spread {
        Spread::Population => v1,
        Spread::Reliability => v1 - weights.iter().map(|w| w * w).sum::<f64>() / v1,
    };
    if !(norm > 0.0) {
        return (mean, f64::NAN);
    }
    (mean, (sum_squares / norm).sqrt())
}

#[cfg(test)]
mod stereo_test {
    use super::*;
    use crate::io::containers::TelescopeEvent;
    use approx::assert_relative_eq;

    fn hillas(intensity: f64, width: f64) -> HillasParameters {
        HillasParameters {
            intensity,
            length: 3.0 * width,
            width,
            fov_lon: 0.0,
            fov_lat: 0.0,
            psi: 0.0,
        }
    }

    /// Six telescope events of three array events.
    fn mono_table(values: [PredictionValue; 6], valid: [bool; 6]) -> Vec<MonoPredictionRow> {
        let obs_id = [1, 1, 1, 1, 1, 2];
        let event_id = [1, 1, 1, 2, 2, 1];
        let tel_id = [1, 2, 3, 5, 7, 1];
        let intensity = [1.0, 2.0, 0.0, 1.0, 5.0, 9.0];
        let width = [0.1, 0.2, 0.1, 0.1, 0.2, 0.1];
        (0..6)
            .map(|i| MonoPredictionRow {
                obs_id: obs_id[i],
                event_id: event_id[i],
                tel_id: tel_id[i],
                hillas: Some(hillas(intensity[i], width[i])),
                value: values[i],
                is_valid: valid[i],
            })
            .collect()
    }

    fn energy_table() -> Vec<MonoPredictionRow> {
        let energy = [1.0, 10.0, 4.0, 0.5, 0.7, 1.0];
        mono_table(
            energy.map(PredictionValue::Energy),
            [true, true, true, true, false, false],
        )
    }

    fn energies(rows: &[StereoPredictionRow]) -> Vec<&ReconstructedEnergy> {
        rows.iter()
            .map(|r| match &r.prediction {
                StereoPrediction::Energy(e) => e,
                other => panic!("unexpected prediction {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_predict_table_energy() {
        let combiner = StereoMeanCombiner::new("dummy", CombineProperty::Energy);
        let rows = combiner.predict_table(&energy_table()).unwrap();
        let index: Vec<_> = rows.iter().map(|r| (r.obs_id, r.event_id)).collect();
        assert_eq!(index, vec![(1, 1), (1, 2), (2, 1)]);

        let e = energies(&rows);
        assert_relative_eq!(e[0].energy, 5.0);
        assert_relative_eq!(e[1].energy, 0.5);
        assert!(e[2].energy.is_nan());
        assert_eq!(
            e.iter().map(|e| e.is_valid).collect::<Vec<_>>(),
            vec![true, true, false]
        );
        assert_eq!(e[0].telescopes.as_slice(), &[1, 2, 3]);
        assert_eq!(e[1].telescopes.as_slice(), &[5]);
        assert!(e[2].telescopes.is_empty());
        assert_relative_eq!(e[1].energy_uncert, 0.0);

        let combiner = combiner.with_weights(StereoWeighting::Intensity);
        let rows = combiner.predict_table(&energy_table()).unwrap();
        let e = energies(&rows);
        assert_relative_eq!(e[0].energy, 7.0);
        assert_relative_eq!(e[1].energy, 0.5);
        assert!(!e[2].is_valid);
    }

    #[test]
    fn test_predict_table_classification() {
        let prediction = [1.0, 0.0, 0.5, 0.0, 0.6, 1.0];
        let table = mono_table(
            prediction.map(PredictionValue::Classification),
            [true, true, false, true, true, true],
        );
        let combiner = StereoMeanCombiner::new("dummy", CombineProperty::Classification);
        let rows = combiner.predict_table(&table).unwrap();

        let expected = [0.5, 0.3, 1.0];
        let tels: [&[TelId]; 3] = [&[1, 2], &[5, 7], &[1]];
        for ((row, value), tels) in rows.iter().zip(expected).zip(tels) {
            match &row.prediction {
                StereoPrediction::Classification(c) => {
                    assert_relative_eq!(c.prediction, value, epsilon = 1e-12);
                    assert!(c.is_valid);
                    assert_eq!(c.telescopes.as_slice(), tels);
                }
                other => panic!("unexpected prediction {other:?}"),
            }
        }
    }

    #[test]
    fn test_predict_table_geometry() {
        let alt = [58.5, 58.0, 62.5, 72.0, 74.5, 81.0];
        let az = [12.5, 15.0, 13.0, 21.0, 20.0, 14.5];
        let values: [PredictionValue; 6] =
            std::array::from_fn(|i| PredictionValue::Geometry(AltAz::new(alt[i], az[i])));
        let table = mono_table(values, [true, false, true, true, true, true]);

        let combiner = StereoMeanCombiner::new("dummy", CombineProperty::Geometry);
        let rows = combiner.predict_table(&table).unwrap();

        let expected = [
            (60.500_232_8, 12.734_569_3),
            (73.250_598_9, 20.536_251_0),
            (81.0, 14.5),
        ];
        let tels: [&[TelId]; 3] = [&[1, 3], &[5, 7], &[1]];
        for ((row, (alt, az)), tels) in rows.iter().zip(expected).zip(tels) {
            match &row.prediction {
                StereoPrediction::Geometry(g) => {
                    assert_relative_eq!(g.alt, alt, epsilon = 1e-6);
                    assert_relative_eq!(g.az, az, epsilon = 1e-6);
                    assert!(g.is_valid);
                    assert!(g.alt_uncert.is_nan());
                    assert_eq!(g.telescopes.as_slice(), tels);
                }
                other => panic!("unexpected prediction {other:?}"),
            }
        }
    }

    #[test]
    fn test_predict_table_errors() {
        let combiner = StereoMeanCombiner::new("dummy", CombineProperty::Geometry);
        assert!(matches!(
            combiner.predict_table(&energy_table()),
            Err(PipeError::InvalidConfig(_))
        ));

        let mut table = energy_table();
        table[0].hillas = None;
        let combiner = StereoMeanCombiner::new("dummy", CombineProperty::Energy)
            .with_weights(StereoWeighting::Konrad);
        assert!(matches!(
            combiner.predict_table(&table),
            Err(PipeError::MissingParameters(_))
        ));

        assert!(combiner.predict_table(&[]).unwrap().is_empty());
    }

    fn single_event() -> ArrayEvent {
        let mut event = ArrayEvent::new(EventIndex::new(1, 1));
        let tels = [
            (25, 100.0, 0.01, 1.0, (60.0, 15.0)),
            (125, 200.0, 0.02, 0.0, (50.0, 30.0)),
            (130, 400.0, 0.04, 0.8, (45.0, 280.0)),
        ];
        for (tel_id, intensity, energy, prediction, (alt, az)) in tels {
            let mut tel = TelescopeEvent {
                hillas: Some(hillas(intensity, 0.1)),
                ..Default::default()
            };
            tel.dl2.energy.insert(
                "dummy".into(),
                ReconstructedEnergy {
                    energy,
                    energy_uncert: f64::NAN,
                    is_valid: true,
                    telescopes: [tel_id].into_iter().collect(),
                },
            );
            tel.dl2.classification.insert(
                "dummy".into(),
                ParticleClassification {
                    prediction,
                    is_valid: true,
                    telescopes: [tel_id].into_iter().collect(),
                },
            );
            tel.dl2.geometry.insert(
                "dummy".into(),
                ReconstructedGeometry {
                    alt,
                    az,
                    alt_uncert: f64::NAN,
                    az_uncert: f64::NAN,
                    is_valid: true,
                    telescopes: [tel_id].into_iter().collect(),
                },
            );
            event.tel.insert(tel_id, tel);
        }
        event
    }

    #[test]
    fn test_combine_event_unweighted() {
        let mut event = single_event();
        for property in [
            CombineProperty::Energy,
            CombineProperty::Classification,
            CombineProperty::Geometry,
        ] {
            StereoMeanCombiner::new("dummy", property)
                .combine_event(&mut event)
                .unwrap();
        }

        let energy = &event.stereo.energy["dummy"];
        assert_relative_eq!(energy.energy, 0.07 / 3.0, epsilon = 1e-12);
        // sample standard deviation of 10, 20 and 40 GeV
        assert_relative_eq!(energy.energy_uncert, 0.015_275_252_3, epsilon = 1e-9);
        assert_eq!(energy.telescopes.as_slice(), &[25, 125, 130]);

        assert_relative_eq!(
            event.stereo.classification["dummy"].prediction,
            0.6,
            epsilon = 1e-12
        );

        let geometry = &event.stereo.geometry["dummy"];
        assert_relative_eq!(geometry.alt, 63.073_838_3, epsilon = 1e-6);
        assert_relative_eq!(geometry.az, 348.071_669_3, epsilon = 1e-6);
        assert!(geometry.is_valid);
    }

    #[test]
    fn test_combine_event_intensity() {
        let mut event = single_event();
        for property in [
            CombineProperty::Energy,
            CombineProperty::Classification,
            CombineProperty::Geometry,
        ] {
            StereoMeanCombiner::new("dummy", property)
                .with_weights(StereoWeighting::Intensity)
                .combine_event(&mut event)
                .unwrap();
        }
        assert_relative_eq!(event.stereo.energy["dummy"].energy, 0.03, epsilon = 1e-12);
        // weights 1/4, 1/2, 1: V1 - V2/V1 = 1.75 - 0.75
        assert_relative_eq!(
            event.stereo.energy["dummy"].energy_uncert,
            0.000_25_f64.sqrt(),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            event.stereo.classification["dummy"].prediction,
            0.6,
            epsilon = 1e-12
        );
        let geometry = &event.stereo.geometry["dummy"];
        assert_relative_eq!(geometry.alt, 60.974_860_5, epsilon = 1e-6);
        assert_relative_eq!(geometry.az, 316.036_551_5, epsilon = 1e-6);
    }

    #[test]
    fn test_combine_event_konrad_classification() {
        let mut event = single_event();
        StereoMeanCombiner::new("dummy", CombineProperty::Classification)
            .with_weights(StereoWeighting::Konrad)
            .combine_event(&mut event)
            .unwrap();
        assert_relative_eq!(
            event.stereo.classification["dummy"].prediction,
            0.6,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_combine_event_log_target() {
        let mut event = single_event();
        StereoMeanCombiner::new("dummy", CombineProperty::Energy)
            .with_log_target(true)
            .combine_event(&mut event)
            .unwrap();
        let energy = &event.stereo.energy["dummy"];
        assert_relative_eq!(energy.energy, 0.02, epsilon = 1e-12);
        assert!(energy.energy_uncert > 1.0);
    }

    #[test]
    fn test_combine_event_single_telescope_spread() {
        let mut event = single_event();
        event.tel.retain(|tel_id, _| *tel_id == 125);

        let combiner = StereoMeanCombiner::new("dummy", CombineProperty::Energy);
        combiner.combine_event(&mut event).unwrap();
        let energy = &event.stereo.energy["dummy"];
        assert_relative_eq!(energy.energy, 0.02, epsilon = 1e-12);
        assert!(energy.is_valid);
        assert!(energy.energy_uncert.is_nan());

        // the table mode keeps the RMS deviation, zero for one telescope
        let rows = combiner.predict_table(&combiner.mono_rows([&event])).unwrap();
        match &rows[0].prediction {
            StereoPrediction::Energy(e) => assert_relative_eq!(e.energy_uncert, 0.0),
            other => panic!("unexpected prediction {other:?}"),
        }
    }

    #[test]
    fn test_combine_event_without_valid_predictions() {
        let mut event = single_event();
        for tel in event.tel.values_mut() {
            tel.dl2.energy.get_mut("dummy").unwrap().is_valid = false;
        }
        StereoMeanCombiner::new("dummy", CombineProperty::Energy)
            .combine_event(&mut event)
            .unwrap();
        let energy = &event.stereo.energy["dummy"];
        assert!(!energy.is_valid);
        assert!(energy.energy.is_nan());
        assert!(energy.telescopes.is_empty());

        // unknown prefix: nothing to combine
        StereoMeanCombiner::new("other", CombineProperty::Geometry)
            .combine_event(&mut event)
            .unwrap();
        assert!(!event.stereo.geometry["other"].is_valid);
    }

    #[test]
    fn test_combine_event_missing_hillas() {
        let mut event = single_event();
        event.tel.get_mut(&125).unwrap().hillas = None;

        let err = StereoMeanCombiner::new("dummy", CombineProperty::Energy)
            .with_weights(StereoWeighting::Intensity)
            .combine_event(&mut event)
            .err()
            .unwrap();
        assert!(matches!(err, PipeError::MissingParameters(_)));

        // unweighted energy and weighted classification do not need parameters
        StereoMeanCombiner::new("dummy", CombineProperty::Energy)
            .combine_event(&mut event)
            .unwrap();
        StereoMeanCombiner::new("dummy", CombineProperty::Classification)
            .with_weights(StereoWeighting::Intensity)
            .combine_event(&mut event)
            .unwrap();
        // tel 125 gets weight 1 next to 100 and 400: (100 * 1 + 400 * 0.8) / 501
        assert_relative_eq!(
            event.stereo.classification["dummy"].prediction,
            420.0 / 501.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_zero_weights_are_invalid() {
        let mut event = single_event();
        for tel in event.tel.values_mut() {
            if let Some(h) = tel.hillas.as_mut() {
                h.intensity = 0.0;
            }
        }
        StereoMeanCombiner::new("dummy", CombineProperty::Energy)
            .with_weights(StereoWeighting::Intensity)
            .combine_event(&mut event)
            .unwrap();
        assert!(!event.stereo.energy["dummy"].is_valid);
    }

    #[test]
    fn test_mono_rows_round_trip() {
        let event = single_event();
        let combiner = StereoMeanCombiner::new("dummy", CombineProperty::Energy)
            .with_weights(StereoWeighting::Intensity);
        let rows = combiner.mono_rows([&event]);
        assert_eq!(rows.len(), 3);
        let stereo = combiner.predict_table(&rows).unwrap();
        assert_eq!(stereo.len(), 1);
        match &stereo[0].prediction {
            StereoPrediction::Energy(e) => assert_relative_eq!(e.energy, 0.03, epsilon = 1e-12),
            other => panic!("unexpected prediction {other:?}"),
        }
    }

    #[test]
    fn test_property_serde_names() {
        assert_eq!(CombineProperty::Classification.to_string(), "classification");
        let combiner: StereoMeanCombiner = serde_json::from_str(
            r#"{"prefix": "RandomForest", "property": "energy", "weights": "konrad"}"#,
        )
        .unwrap();
        assert_eq!(combiner.weights, StereoWeighting::Konrad);
        assert!(!combiner.log_target);
    }
}
