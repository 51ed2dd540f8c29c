//! # Effective area
//!
//! The effective area in a bin of true energy is the fraction of thrown showers that survive
//! the event selection, times the area over which the shower cores were scattered:
//!
//! ```text
//! A_eff(E) = n_selected(E) / n_thrown(E) · π · max_impact²
//! ```
//!
//! `n_thrown(E)` comes from the power-law description in [`SimulatedEventsInfo`], built from
//! the run configurations of a simulation source. The selected counts are histogrammed from the
//! true energies of the selected events.
//!
//! ```rust, no_run
//! use camino::Utf8Path;
//! use iactpipe::io::{open_event_source, EventSource, EventSourceConfig};
//! use iactpipe::irf::effective_area_from_events;
//! use iactpipe::simulation::SimulatedEventsInfo;
//!
//! let source = open_event_source(Utf8Path::new("gamma.simtel.jsonl"), EventSourceConfig::default())
//!     .unwrap();
//! let info = SimulatedEventsInfo::from_configs(source.simulation_config().values()).unwrap();
//! let events: Vec<_> = source.collect::<Result<_, _>>().unwrap();
//! let aeff = effective_area_from_events(&events, &info, &[0.01, 0.1, 1.0, 10.0, 100.0]).unwrap();
//! println!("{:?}", aeff.area);
//! ```
use serde::{Deserialize, Serialize};

use crate::constants::{SquareMeter, TeV};
use crate::io::containers::ArrayEvent;
use crate::pipe_errors::PipeError;
use crate::simulation::{check_energy_edges, SimulatedEventsInfo};

/// Effective area per bin of true energy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveArea {
    /// Bin edges in TeV
    pub bins_energy: Vec<TeV>,
    pub n_selected: Vec<u64>,
    /// Expected thrown showers per bin
    pub n_thrown: Vec<f64>,
    /// `NaN` where no shower was thrown
    pub area: Vec<SquareMeter>,
}

/// Histogram `values` with `numpy.histogram` edge rules: bins are half open except the last,
/// which includes its upper edge. Values outside the edges are dropped.
fn histogram(values: &[f64], edges: &[f64]) -> Vec<u64> {
    let n_bins = edges.len() - 1;
    let mut counts = vec![0; n_bins];
    let last = edges[n_bins];
    for &value in values {
        if !(value >= edges[0] && value <= last) {
            continue;
        }
        let bin = if value == last {
            n_bins - 1
        } else {
            edges.partition_point(|edge| *edge <= value) - 1
        };
        counts[bin] += 1;
    }
    counts
}

/// Effective area from the true energies of the selected events.
///
/// Arguments
/// -----------------
/// * `selected_true_energy`: true energy of every selected event, in TeV
/// * `info`: the thrown showers of the simulation
/// * `bins_energy`: strictly increasing, positive bin edges in TeV
///
/// Return
/// ----------
/// * The per-bin counts and areas, or [`PipeError::InvalidSimulationMetadata`] for unusable
///   edges or simulation ranges.
///
/// See also
/// ------------
/// * [`SimulatedEventsInfo::n_showers_per_energy`] – The thrown counts.
/// * [`effective_area_from_events`] – Same, reading the true energies from events.
pub fn effective_area_per_energy(
    selected_true_energy: &[TeV],
    info: &SimulatedEventsInfo,
    bins_energy: &[TeV],
) -> Result<EffectiveArea, PipeError> {
    check_energy_edges(bins_energy)?;
    if !(info.max_impact > 0.0) || !info.max_impact.is_finite() {
        return Err(PipeError::InvalidSimulationMetadata(format!(
            "max_impact must be a positive distance, got {}",
            info.max_impact
        )));
    }

    let n_thrown = info.n_showers_per_energy(bins_energy)?;
    let n_selected = histogram(selected_true_energy, bins_energy);
    let scatter_area = std::f64::consts::PI * info.max_impact.powi(2);

    let area = n_selected
        .iter()
        .zip(&n_thrown)
        .map(|(&selected, &thrown)| {
            if thrown > 0.0 {
                selected as f64 / thrown * scatter_area
            } else {
                f64::NAN
            }
        })
        .collect();

    log::debug!(
        "effective area from {} selected events in {} energy bins",
        n_selected.iter().sum::<u64>(),
        n_thrown.len()
    );
    Ok(EffectiveArea {
        bins_energy: bins_energy.to_vec(),
        n_selected,
        n_thrown,
        area,
    })
}

/// Effective area of a set of selected simulated events.
///
/// Events without simulated shower information are skipped with a warning.
pub fn effective_area_from_events<'a, I>(
    events: I,
    info: &SimulatedEventsInfo,
    bins_energy: &[TeV],
) -> Result<EffectiveArea, PipeError>
where
    I: IntoIterator<Item = &'a ArrayEvent>,
{
    let mut skipped = 0usize;
    let energies: Vec<TeV> = events
        .into_iter()
        .filter_map(|event| {
            let energy = event.simulation.as_ref().map(|shower| shower.energy);
            if energy.is_none() {
                skipped += 1;
            }
            energy
        })
        .collect();
    if skipped > 0 {
        log::warn!("{skipped} events without simulated shower ignored for the effective area");
    }
    effective_area_per_energy(&energies, info, bins_energy)
}
