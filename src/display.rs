//! # Table rendering (visualization)
//!
//! Human-readable tables of query results and simulation metadata, rendered with
//! [`comfy-table`](https://docs.rs/comfy-table/latest/comfy_table/) when the `display` cargo
//! feature is enabled.
//!
//! Without the feature both renderers return [`PipeError::OptionalDependency`] naming the
//! `Visualization` capability, so callers learn which feature to enable at the point of use.
//!
//! ```rust, no_run
//! use iactpipe::catalog::{get_bright_stars, StarCatalog};
//! use iactpipe::coordinates::SkyPosition;
//! use iactpipe::display::render_bright_stars;
//! use iactpipe::time::j2000;
//!
//! let stars = get_bright_stars(
//!     j2000(),
//!     StarCatalog::Yale,
//!     Some(SkyPosition::new(83.82, -5.39)),
//!     Some(5.0),
//!     Some(3.0),
//! )
//! .unwrap();
//! println!("{}", render_bright_stars(&stars).unwrap());
//! ```
use std::collections::BTreeMap;

use crate::catalog::BrightStar;
use crate::constants::ObsId;
use crate::pipe_errors::PipeError;
use crate::simulation::SimulatedShowerDistribution;

#[cfg(feature = "display")]
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Row, Table};

#[cfg(not(feature = "display"))]
use crate::optional_deps::{require, OptionalDependency};

#[cfg(feature = "display")]
fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header.iter().map(|h| Cell::new(h)).collect::<Vec<_>>());
    table
}

#[cfg(feature = "display")]
fn right(content: impl std::fmt::Display) -> Cell {
    Cell::new(content).set_alignment(CellAlignment::Right)
}

/// Table of bright stars: catalog id, name, propagated position, magnitude and proper motion.
#[cfg(feature = "display")]
pub fn render_bright_stars(stars: &[BrightStar]) -> Result<String, PipeError> {
    let mut table = new_table(&[
        "#",
        "Catalog",
        "ID",
        "Name",
        "RA [deg]",
        "DEC [deg]",
        "Vmag",
        "pmRA·cosδ [mas/yr]",
        "pmDEC [mas/yr]",
    ]);

    for (i, star) in stars.iter().enumerate() {
        table.add_row(Row::from(vec![
            right(i),
            Cell::new(star.catalog),
            right(star.catalog_id),
            Cell::new(star.name.as_deref().unwrap_or("")),
            right(format!("{:.5}", star.position.ra)),
            right(format!("{:+.5}", star.position.dec)),
            right(format!("{:.2}", star.vmag)),
            right(format!("{:.2}", star.proper_motion.pm_ra_cosdec)),
            right(format!("{:.2}", star.proper_motion.pm_dec)),
        ]));
    }
    Ok(table.to_string())
}

#[cfg(not(feature = "display"))]
pub fn render_bright_stars(_stars: &[BrightStar]) -> Result<String, PipeError> {
    require(OptionalDependency::Visualization, "render bright stars")?;
    Ok(String::new())
}

/// Table with one row per energy bin and run: bin edges, counts per core-distance bin, total.
#[cfg(feature = "display")]
pub fn render_shower_distributions(
    distributions: &BTreeMap<ObsId, SimulatedShowerDistribution>,
) -> Result<String, PipeError> {
    let mut table = new_table(&[
        "obs_id",
        "E_min [TeV]",
        "E_max [TeV]",
        "counts per core bin",
        "total",
    ]);

    for (obs_id, dist) in distributions {
        for (edges, counts) in dist.bins_energy.windows(2).zip(&dist.histogram) {
            let per_core = counts
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            table.add_row(Row::from(vec![
                right(obs_id),
                right(format!("{:.4}", edges[0])),
                right(format!("{:.4}", edges[1])),
                right(per_core),
                right(counts.iter().sum::<u64>()),
            ]));
        }
    }
    Ok(table.to_string())
}

#[cfg(not(feature = "display"))]
pub fn render_shower_distributions(
    _distributions: &BTreeMap<ObsId, SimulatedShowerDistribution>,
) -> Result<String, PipeError> {
    require(
        OptionalDependency::Visualization,
        "render shower distributions",
    )?;
    Ok(String::new())
}

#[cfg(test)]
mod display_test {
    use super::*;
    use crate::simulation::simulation_test::distribution;

    #[cfg(feature = "display")]
    #[test]
    fn test_render_shower_distributions() {
        let distributions = BTreeMap::from([(3, distribution(3))]);
        let rendered = render_shower_distributions(&distributions).unwrap();
        assert!(rendered.contains("obs_id"));
        assert!(rendered.contains("5 4"));
        assert!(rendered.contains("10.0000"));
        assert!(rendered.contains(" 21 ") || rendered.contains(" 9 "));
    }

    #[cfg(feature = "display")]
    #[test]
    fn test_render_bright_stars() {
        use crate::catalog::{get_bright_stars, StarCatalog};
        use crate::time::j2000;

        let stars = get_bright_stars(j2000(), StarCatalog::Yale, None, None, Some(-1.0)).unwrap();
        let rendered = render_bright_stars(&stars).unwrap();
        assert!(rendered.contains("Sirius"));
        assert!(rendered.contains("Vmag"));
    }

    #[cfg(not(feature = "display"))]
    #[test]
    fn test_render_requires_feature() {
        let err = render_bright_stars(&[]).err().unwrap();
        match err {
            PipeError::OptionalDependency(e) => {
                assert_eq!(e.dependency, OptionalDependency::Visualization);
                assert!(e.to_string().contains("--features display"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(render_shower_distributions(&BTreeMap::new()).is_err());
    }
}
