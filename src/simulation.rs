//! # Simulation metadata
//!
//! Run-level description of simulated air showers, as carried by simulation event sources and
//! persisted by the [`DataWriter`](crate::io::DataWriter).
//!
//! ## Overview
//! -----------------
//! * [`SimulationConfig`] – one row per simulation run: number of thrown showers, reuse factor,
//!   energy range, spectral index, scatter radius and viewcone.
//! * [`SimulatedShowerDistribution`] – 2D histogram of **all thrown** showers of a run, binned in
//!   true energy and core distance. It is what allows effective areas to be computed later, which
//!   is why it must be written with every processed output.
//! * [`SimulatedEventsInfo`] – summary of a set of runs (total thrown showers, energy range, …),
//!   the input for spectral reweighting.
use serde::{Deserialize, Serialize};

use crate::constants::{Degree, Meter, ObsId, TeV};
use crate::pipe_errors::PipeError;

/// Configuration of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub obs_id: ObsId,
    /// Number of simulated air showers
    pub n_showers: u64,
    /// Number of times each shower is reused with a different core position
    pub shower_reuse: u32,
    pub energy_range_min: TeV,
    pub energy_range_max: TeV,
    /// Differential spectral index of the thrown power law (negative, e.g. `-2.0`)
    pub spectral_index: f64,
    pub max_scatter_range: Meter,
    pub max_viewcone_radius: Degree,
    #[serde(default)]
    pub corsika_version: Option<String>,
}

impl SimulationConfig {
    /// Number of thrown events, i.e. showers times reuse.
    ///
    /// Return
    /// ----------
    /// * [`PipeError::InvalidSimulationMetadata`] if the product does not fit in a `u64`.
    pub fn n_thrown(&self) -> Result<u64, PipeError> {
        self.n_showers
            .checked_mul(u64::from(self.shower_reuse))
            .ok_or_else(|| {
                PipeError::InvalidSimulationMetadata(format!(
                    "run {}: {} showers reused {} times overflows the thrown event count",
                    self.obs_id, self.n_showers, self.shower_reuse
                ))
            })
    }

    pub fn validate(&self) -> Result<(), PipeError> {
        if !(self.energy_range_min > 0.0 && self.energy_range_min < self.energy_range_max) {
            return Err(PipeError::InvalidSimulationMetadata(format!(
                "run {}: invalid energy range [{}, {}] TeV",
                self.obs_id, self.energy_range_min, self.energy_range_max
            )));
        }
        if self.shower_reuse == 0 {
            return Err(PipeError::InvalidSimulationMetadata(format!(
                "run {}: shower_reuse must be at least 1",
                self.obs_id
            )));
        }
        if !self.max_scatter_range.is_finite() || self.max_scatter_range < 0.0 {
            return Err(PipeError::InvalidSimulationMetadata(format!(
                "run {}: invalid max_scatter_range {}",
                self.obs_id, self.max_scatter_range
            )));
        }
        Ok(())
    }
}

/// Histogram of thrown showers of one run in (true energy, core distance).
///
/// `histogram[i][j]` counts the showers with energy in
/// `[bins_energy[i], bins_energy[i + 1])` and core distance in
/// `[bins_core_dist[j], bins_core_dist[j + 1])`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedShowerDistribution {
    pub obs_id: ObsId,
    pub hist_id: u32,
    pub n_entries: u64,
    /// Energy bin edges in TeV
    pub bins_energy: Vec<TeV>,
    /// Core-distance bin edges in meters
    pub bins_core_dist: Vec<Meter>,
    pub histogram: Vec<Vec<u64>>,
}

impl SimulatedShowerDistribution {
    /// Sum of all histogram counts.
    pub fn total(&self) -> u64 {
        self.histogram.iter().flatten().sum()
    }

    /// Counts per energy bin, summed over core distance.
    pub fn energy_counts(&self) -> Vec<u64> {
        self.histogram.iter().map(|row| row.iter().sum()).collect()
    }

    /// Check the shape and consistency of the histogram.
    ///
    /// Return
    /// ----------
    /// * [`PipeError::InvalidSimulationMetadata`] when bin edges are not strictly increasing,
    ///   the histogram shape does not match the edges, or `n_entries` differs from the counts.
    pub fn validate(&self) -> Result<(), PipeError> {
        let invalid = |reason: String| {
            PipeError::InvalidSimulationMetadata(format!(
                "shower distribution {} of run {}: {reason}",
                self.hist_id, self.obs_id
            ))
        };

        for (axis, edges) in [
            ("energy", &self.bins_energy),
            ("core distance", &self.bins_core_dist),
        ] {
            if edges.len() < 2 {
                return Err(invalid(format!("{axis} axis needs at least two edges")));
            }
            if !edges.windows(2).all(|w| w[0] < w[1]) {
                return Err(invalid(format!("{axis} edges must be strictly increasing")));
            }
        }

        let n_energy = self.bins_energy.len() - 1;
        let n_core = self.bins_core_dist.len() - 1;
        if self.histogram.len() != n_energy {
            return Err(invalid(format!(
                "{} energy rows for {n_energy} energy bins",
                self.histogram.len()
            )));
        }
        if let Some(row) = self.histogram.iter().find(|row| row.len() != n_core) {
            return Err(invalid(format!(
                "row with {} columns for {n_core} core-distance bins",
                row.len()
            )));
        }

        let total = self.total();
        if total != self.n_entries {
            return Err(invalid(format!(
                "n_entries is {} but the histogram holds {total}",
                self.n_entries
            )));
        }
        Ok(())
    }
}

/// Summary of the thrown showers of one or more simulation runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedEventsInfo {
    pub n_showers: u64,
    pub energy_min: TeV,
    pub energy_max: TeV,
    pub max_impact: Meter,
    pub spectral_index: f64,
    pub viewcone: Degree,
}

impl SimulatedEventsInfo {
    /// Combine the configurations of several runs.
    ///
    /// The total number of showers sums `n_showers · shower_reuse` over all runs; the
    /// ranges are taken from the first run.
    ///
    /// Arguments
    /// -----------------
    /// * `configs`: run configurations, e.g. from
    ///   [`EventSource::simulation_config`](crate::io::EventSource::simulation_config)
    ///
    /// Return
    /// ----------
    /// * [`PipeError::InvalidSimulationMetadata`] if `configs` is empty, the runs disagree on
    ///   the spectral index, or the number of thrown showers overflows.
    pub fn from_configs<'a, I>(configs: I) -> Result<Self, PipeError>
    where
        I: IntoIterator<Item = &'a SimulationConfig>,
    {
        let mut iter = configs.into_iter();
        let first = iter.next().ok_or_else(|| {
            PipeError::InvalidSimulationMetadata("no simulation configuration available".into())
        })?;

        let mut n_showers = first.n_thrown()?;
        for config in iter {
            if (config.spectral_index - first.spectral_index).abs() > f64::EPSILON {
                return Err(PipeError::InvalidSimulationMetadata(format!(
                    "runs {} and {} were simulated with different spectral indices ({} vs {})",
                    first.obs_id, config.obs_id, first.spectral_index, config.spectral_index
                )));
            }
            n_showers = n_showers.checked_add(config.n_thrown()?).ok_or_else(|| {
                PipeError::InvalidSimulationMetadata(format!(
                    "total number of thrown showers overflows at run {}",
                    config.obs_id
                ))
            })?;
        }

        Ok(Self {
            n_showers,
            energy_min: first.energy_range_min,
            energy_max: first.energy_range_max,
            max_impact: first.max_scatter_range,
            spectral_index: first.spectral_index,
            viewcone: first.max_viewcone_radius,
        })
    }
}

impl SimulatedEventsInfo {
    /// Expected number of thrown showers in each energy bin.
    ///
    /// The showers follow the power law `dN/dE ∝ E^spectral_index` on
    /// `[energy_min, energy_max]`; bins are clipped to that range, so a bin outside of it
    /// receives no showers.
    ///
    /// Arguments
    /// -----------------
    /// * `bins_energy`: strictly increasing, positive bin edges in TeV
    ///
    /// Return
    /// ----------
    /// * One (fractional) count per bin, or [`PipeError::InvalidSimulationMetadata`] for
    ///   unusable edges or an empty energy range.
    pub fn n_showers_per_energy(&self, bins_energy: &[TeV]) -> Result<Vec<f64>, PipeError> {
        check_energy_edges(bins_energy)?;
        if !(self.energy_min > 0.0 && self.energy_min < self.energy_max) {
            return Err(PipeError::InvalidSimulationMetadata(format!(
                "invalid simulated energy range [{}, {}] TeV",
                self.energy_min, self.energy_max
            )));
        }

        let total = power_law_integral(self.spectral_index, self.energy_min, self.energy_max);
        Ok(bins_energy
            .windows(2)
            .map(|edges| {
                let low = edges[0].max(self.energy_min);
                let high = edges[1].min(self.energy_max);
                if low >= high {
                    0.0
                } else {
                    self.n_showers as f64 * power_law_integral(self.spectral_index, low, high)
                        / total
                }
            })
            .collect())
    }
}

/// `∫ E^index dE` over `[low, high]`.
fn power_law_integral(index: f64, low: TeV, high: TeV) -> f64 {
    let exponent = index + 1.0;
    if exponent.abs() < 1e-12 {
        (high / low).ln()
    } else {
        (high.powf(exponent) - low.powf(exponent)) / exponent
    }
}

pub(crate) fn check_energy_edges(bins_energy: &[TeV]) -> Result<(), PipeError> {
    if bins_energy.len() < 2 {
        return Err(PipeError::InvalidSimulationMetadata(
            "energy binning needs at least two edges".into(),
        ));
    }
    if !(bins_energy[0] > 0.0) || !bins_energy.windows(2).all(|w| w[0] < w[1]) {
        return Err(PipeError::InvalidSimulationMetadata(format!(
            "energy edges must be positive and strictly increasing, got {bins_energy:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod simulation_test {
    use super::*;

    pub(crate) fn config(obs_id: ObsId) -> SimulationConfig {
        SimulationConfig {
            obs_id,
            n_showers: 1000,
            shower_reuse: 10,
            energy_range_min: 0.003,
            energy_range_max: 330.0,
            spectral_index: -2.0,
            max_scatter_range: 1000.0,
            max_viewcone_radius: 0.0,
            corsika_version: None,
        }
    }

    pub(crate) fn distribution(obs_id: ObsId) -> SimulatedShowerDistribution {
        SimulatedShowerDistribution {
            obs_id,
            hist_id: 1,
            n_entries: 21,
            bins_energy: vec![0.01, 0.1, 1.0, 10.0],
            bins_core_dist: vec![0.0, 500.0, 1000.0],
            histogram: vec![vec![5, 4], vec![4, 3], vec![3, 2]],
        }
    }

    #[test]
    fn test_distribution_total_and_validate() {
        let dist = distribution(1);
        assert_eq!(dist.total(), 21);
        assert_eq!(dist.energy_counts(), vec![9, 7, 5]);
        assert!(dist.validate().is_ok());
    }

    #[test]
    fn test_distribution_shape_errors() {
        let mut dist = distribution(1);
        dist.histogram.pop();
        assert!(matches!(
            dist.validate(),
            Err(PipeError::InvalidSimulationMetadata(_))
        ));

        let mut dist = distribution(1);
        dist.bins_core_dist = vec![0.0, 1000.0, 500.0];
        assert!(dist.validate().is_err());

        let mut dist = distribution(1);
        dist.n_entries = 3;
        assert!(dist.validate().is_err());
    }

    #[test]
    fn test_events_info_from_configs() {
        let mut second = config(2);
        second.shower_reuse = 5;
        let info = SimulatedEventsInfo::from_configs(&[config(1), second]).unwrap();
        assert_eq!(info.n_showers, 10_000 + 5_000);
        assert_eq!(info.energy_min, 0.003);
        assert_eq!(info.energy_max, 330.0);
        assert_eq!(info.max_impact, 1000.0);
        assert_eq!(info.spectral_index, -2.0);
    }

    #[test]
    fn test_events_info_errors() {
        let empty: [SimulationConfig; 0] = [];
        assert!(SimulatedEventsInfo::from_configs(&empty).is_err());

        let mut other = config(2);
        other.spectral_index = -2.7;
        assert!(SimulatedEventsInfo::from_configs(&[config(1), other]).is_err());
    }

    #[test]
    fn test_n_showers_per_energy() {
        let info = SimulatedEventsInfo {
            n_showers: 1000,
            energy_min: 1.0,
            energy_max: 100.0,
            max_impact: 100.0,
            spectral_index: -2.0,
            viewcone: 0.0,
        };
        // ∫E⁻² = 1/a - 1/b: 0.9 and 0.09 of 0.99
        let counts = info.n_showers_per_energy(&[0.1, 1.0, 10.0, 100.0, 1000.0]).unwrap();
        assert_eq!(counts[0], 0.0);
        approx::assert_relative_eq!(counts[1], 1000.0 / 1.1, epsilon = 1e-9);
        approx::assert_relative_eq!(counts[2], 1000.0 / 11.0, epsilon = 1e-9);
        assert_eq!(counts[3], 0.0);

        // a bin straddling energy_max is clipped
        let clipped = info.n_showers_per_energy(&[10.0, 1000.0]).unwrap();
        approx::assert_relative_eq!(clipped[0], 1000.0 / 11.0, epsilon = 1e-9);

        let flat_in_log = SimulatedEventsInfo {
            spectral_index: -1.0,
            ..info.clone()
        };
        let counts = flat_in_log.n_showers_per_energy(&[1.0, 10.0, 100.0]).unwrap();
        approx::assert_relative_eq!(counts[0], 500.0, epsilon = 1e-9);
        approx::assert_relative_eq!(counts[1], 500.0, epsilon = 1e-9);

        assert!(info.n_showers_per_energy(&[1.0]).is_err());
        assert!(info.n_showers_per_energy(&[10.0, 1.0]).is_err());
        assert!(info.n_showers_per_energy(&[0.0, 1.0]).is_err());
    }

    #[test]
    fn test_thrown_count_overflow() {
        let mut huge = config(1);
        huge.n_showers = u64::MAX / 2;
        huge.shower_reuse = 3;
        assert!(matches!(
            huge.n_thrown(),
            Err(PipeError::InvalidSimulationMetadata(_))
        ));

        let mut half = config(2);
        half.n_showers = u64::MAX / 2 + 1;
        half.shower_reuse = 1;
        assert_eq!(half.n_thrown().unwrap(), u64::MAX / 2 + 1);
        assert!(matches!(
            SimulatedEventsInfo::from_configs(&[half.clone(), half]),
            Err(PipeError::InvalidSimulationMetadata(_))
        ));
    }

    #[test]
    fn test_config_validate() {
        assert!(config(1).validate().is_ok());
        let mut bad = config(1);
        bad.energy_range_max = 0.001;
        assert!(bad.validate().is_err());
        let mut bad = config(1);
        bad.shower_reuse = 0;
        assert!(bad.validate().is_err());
    }
}
