mod common;

use approx::assert_relative_eq;
use iactpipe::catalog::{get_bright_stars, StarCatalog};
use iactpipe::coordinates::SkyPosition;
use iactpipe::time::{j2000, julian_epoch};
use iactpipe::PipeError;

#[test]
fn test_stars_around_orion() {
    common::init_logger();
    let pointing = SkyPosition::new(83.82, -5.39);
    let stars = get_bright_stars(
        julian_epoch(2024.0),
        StarCatalog::Yale,
        Some(pointing),
        Some(10.0),
        Some(3.0),
    )
    .unwrap();

    assert!(!stars.is_empty());
    assert!(stars.iter().all(|s| s.position.separation(&pointing) <= 10.0));
    assert!(stars.iter().all(|s| s.vmag <= 3.0));
    assert!(stars.windows(2).all(|w| w[0].vmag <= w[1].vmag));

    let names: Vec<_> = stars.iter().filter_map(|s| s.name.as_deref()).collect();
    assert!(names.contains(&"Rigel"));
    assert!(names.contains(&"Alnilam"));
    assert!(!names.contains(&"Sirius"));
}

#[test]
fn test_catalogs_agree_after_propagation() {
    let time = julian_epoch(2024.0);
    let yale = get_bright_stars(time, StarCatalog::Yale, None, None, Some(-1.0)).unwrap();
    let hip = get_bright_stars(time, StarCatalog::Hipparcos, None, None, Some(-1.0)).unwrap();

    assert_eq!(yale.len(), 1);
    assert_eq!(hip.len(), 1);
    assert_eq!(yale[0].name.as_deref(), Some("Sirius"));
    assert_relative_eq!(yale[0].position.ra, hip[0].position.ra, epsilon = 1e-3);
    assert_relative_eq!(yale[0].position.dec, hip[0].position.dec, epsilon = 1e-3);
}

#[test]
fn test_positions_at_catalog_epoch_are_unchanged() {
    let stars = get_bright_stars(j2000(), StarCatalog::Yale, None, None, None).unwrap();
    for star in &stars {
        assert_relative_eq!(star.position.ra, star.catalog_position.ra, epsilon = 1e-9);
        assert_relative_eq!(star.position.dec, star.catalog_position.dec, epsilon = 1e-9);
    }
}

#[test]
fn test_pointing_without_radius_is_rejected() {
    let err = get_bright_stars(
        j2000(),
        StarCatalog::Hipparcos,
        Some(SkyPosition::new(10.0, 10.0)),
        None,
        None,
    )
    .err()
    .unwrap();
    assert!(matches!(err, PipeError::InvalidStarQuery(_)));
}
