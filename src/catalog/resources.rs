//! Packaged catalog resources.
//!
//! The catalogs live in `resources/catalogs/` and are embedded into the library at compile time,
//! so lookups never depend on the working directory. Each file is parsed at most once per process
//! and kept in a [`OnceCell`].
//!
//! CSV layout (one header line):
//!
//! | column          | unit    | description                                   |
//! |-----------------|---------|-----------------------------------------------|
//! | `id`            |         | catalog number (HR for Yale, HIP for Hipparcos) |
//! | `name`          |         | common name, may be empty                     |
//! | `ra_deg`        | deg     | right ascension at the catalog epoch          |
//! | `dec_deg`       | deg     | declination at the catalog epoch              |
//! | `vmag`          | mag     | apparent visual magnitude                     |
//! | `pm_ra_cosdec`  | mas/yr  | proper motion in RA, times `cos δ`            |
//! | `pm_dec`        | mas/yr  | proper motion in declination                  |
use once_cell::sync::OnceCell;
use serde::Deserialize;

use super::proper_motion::ProperMotion;
use super::StarCatalog;
use crate::constants::{Degree, Magnitude, MasPerYear};
use crate::coordinates::SkyPosition;
use crate::pipe_errors::PipeError;

const YALE_CSV: &str = include_str!("../../resources/catalogs/yale_bright_star.csv");
const HIPPARCOS_CSV: &str = include_str!("../../resources/catalogs/hipparcos_bright_star.csv");

static YALE: OnceCell<Vec<CatalogEntry>> = OnceCell::new();
static HIPPARCOS: OnceCell<Vec<CatalogEntry>> = OnceCell::new();

/// One row of a packaged catalog, at the catalog reference epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub id: u32,
    pub name: Option<String>,
    pub position: SkyPosition,
    pub vmag: Magnitude,
    pub proper_motion: ProperMotion,
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    id: u32,
    name: String,
    ra_deg: Degree,
    dec_deg: Degree,
    vmag: Magnitude,
    pm_ra_cosdec: MasPerYear,
    pm_dec: MasPerYear,
}

impl TryFrom<CatalogRow> for CatalogEntry {
    type Error = String;

    fn try_from(row: CatalogRow) -> Result<Self, Self::Error> {
        if !(0.0..360.0).contains(&row.ra_deg) || !(-90.0..=90.0).contains(&row.dec_deg) {
            return Err(format!(
                "star {} has out-of-range coordinates ({}, {})",
                row.id, row.ra_deg, row.dec_deg
            ));
        }
        if !row.vmag.is_finite() || !row.pm_ra_cosdec.is_finite() || !row.pm_dec.is_finite() {
            return Err(format!("star {} has non-finite values", row.id));
        }

        let name = row.name.trim();
        Ok(CatalogEntry {
            id: row.id,
            name: (!name.is_empty()).then(|| name.to_string()),
            position: SkyPosition::new(row.ra_deg, row.dec_deg),
            vmag: row.vmag,
            proper_motion: ProperMotion::new(row.pm_ra_cosdec, row.pm_dec),
        })
    }
}

/// Parse catalog CSV text into entries.
///
/// Arguments
/// -----------------
/// * `resource`: resource name used in error messages
/// * `text`: CSV content with the header described in the module documentation
///
/// Return
/// ----------
/// * The parsed entries, or [`PipeError::InvalidCatalogResource`] on the first bad row.
pub(crate) fn parse_catalog(resource: &str, text: &str) -> Result<Vec<CatalogEntry>, PipeError> {
    let invalid = |reason: String| PipeError::InvalidCatalogResource {
        resource: resource.to_string(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    reader
        .deserialize::<CatalogRow>()
        .map(|row| {
            let row = row.map_err(|e| invalid(e.to_string()))?;
            CatalogEntry::try_from(row).map_err(invalid)
        })
        .collect()
}

/// Entries of `catalog`, parsed on first use and cached for the lifetime of the process.
pub fn catalog_entries(catalog: StarCatalog) -> Result<&'static [CatalogEntry], PipeError> {
    let (cell, text) = match catalog {
        StarCatalog::Yale => (&YALE, YALE_CSV),
        StarCatalog::Hipparcos => (&HIPPARCOS, HIPPARCOS_CSV),
    };

    cell.get_or_try_init(|| {
        let entries = parse_catalog(catalog.resource_name(), text)?;
        log::info!(
            "loaded {} stars from the {catalog} catalog ({})",
            entries.len(),
            catalog.resource_name()
        );
        Ok::<_, PipeError>(entries)
    })
    .map(Vec::as_slice)
}
