use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use approx::assert_abs_diff_eq;

use solarmap::catalog::{PointCatalog, RawRecord};
use solarmap::map::{FeatureId, FeatureIndex, MapConfig, Pixel, PopupController, PopupState, Viewport};
use solarmap::projection::{known, Coordinate, ProjectionRegistry};
use solarmap::SolarMapError;

struct Harness {
    viewport: Viewport,
    popup: Rc<RefCell<PopupController>>,
    index: Arc<FeatureIndex>,
}

fn harness(config: MapConfig, catalog: PointCatalog) -> Harness {
    let registry = ProjectionRegistry::with_defaults().unwrap();
    let index = Arc::new(FeatureIndex::build(&catalog, &config.active_crs, &registry).unwrap());
    let mut viewport = Viewport::initialize(&config, &registry, Arc::clone(&index)).unwrap();
    let popup = Rc::new(RefCell::new(PopupController::new(Arc::clone(&index), config.popup.clone())));
    viewport.subscribe(popup.clone());
    viewport.view_mut().set_size(1000.0, 800.0);
    Harness { viewport, popup, index }
}

/// The bundled dataset at street level, centred on its first record.
fn embedded_at_street_level() -> Harness {
    let catalog = PointCatalog::embedded().unwrap();
    let mut h = harness(MapConfig::default(), catalog);
    let first = h.index.features()[0].geometry();
    let view = h.viewport.view_mut();
    view.set_zoom(16.0);
    view.set_center(first);
    h
}

#[test]
fn single_record_keeps_its_position_in_the_same_crs() {
    let catalog = PointCatalog::load(
        vec![RawRecord::new("A", 2561482.97, 1205017.37).with_detail("x")],
        known::LV95,
    )
    .unwrap();
    let registry = ProjectionRegistry::with_defaults().unwrap();
    let index = FeatureIndex::build(&catalog, known::LV95, &registry).unwrap();

    assert_eq!(index.len(), 1);
    assert_eq!(index.features()[0].geometry(), Coordinate::new(2561482.97, 1205017.37));
}

#[test]
fn empty_name_aborts_the_load() {
    let err = PointCatalog::load(vec![RawRecord::new("", 0.0, 0.0)], known::LV95).unwrap_err();
    assert!(matches!(
        err,
        SolarMapError::InvalidRecord { index: 0, ref reason } if reason == "empty name"
    ));

    let err = PointCatalog::from_json(r#"[{"name":"A","coord":[1,2]},{"name":"","coord":[0,0]}]"#, known::LV95)
        .unwrap_err();
    assert!(matches!(err, SolarMapError::InvalidRecord { index: 1, .. }));
}

#[test]
fn one_feature_per_embedded_record() {
    let h = embedded_at_street_level();
    let catalog = PointCatalog::embedded().unwrap();
    assert_eq!(h.index.len(), catalog.len());
    for (feature, record) in h.index.features().iter().zip(catalog.iter()) {
        assert_eq!(feature.record(), &**record);
        assert_eq!(feature.geometry(), record.position());
    }
}

#[test]
fn hovering_a_marker_shows_its_popup() {
    let mut h = embedded_at_street_level();
    let target = h.viewport.view().coordinate_to_pixel(h.index.features()[0].geometry());
    let event = h.viewport.pointer_moved(Pixel::new(target.x + 0.5, target.y));

    let popup = h.popup.borrow();
    let state = popup.state();
    assert!(state.visible);
    assert_eq!(state.anchor, Some(event.coordinate));
    // record #13 shares the exact position of record #0
    assert_eq!(state.feature, Some(FeatureId(0)));
    let content = state.content.as_deref().unwrap();
    assert!(content.starts_with("<b>Création de l'association Autovoltaïc</b>"));
    assert!(content.contains(r#"width="300""#));
    assert!(!h.viewport.view().is_animating());
}

#[test]
fn moving_off_the_marker_hides_the_popup() {
    let mut h = embedded_at_street_level();
    let target = h.viewport.view().coordinate_to_pixel(h.index.features()[0].geometry());
    h.viewport.pointer_moved(target);
    assert!(h.popup.borrow().state().visible);

    h.viewport.pointer_moved(Pixel::new(target.x + 50.0, target.y));
    assert_eq!(h.popup.borrow().state(), &PopupState::default());
}

#[test]
fn tolerance_follows_zoom() {
    let mut h = embedded_at_street_level();
    let target = h.viewport.view().coordinate_to_pixel(h.index.features()[0].geometry());
    let near = Pixel::new(target.x + 8.0, target.y);

    h.viewport.pointer_moved(near);
    assert!(h.popup.borrow().state().visible);

    // Zooming in keeps the pointer 8 px away on screen but also shrinks the
    // map distance the 10 px tolerance stands for.
    h.viewport.view_mut().zoom_by(1.0, target);
    let event = h.viewport.pointer_moved(near);
    assert_abs_diff_eq!(event.tolerance.map_distance(), 10.0 * h.viewport.view().resolution());
    assert!(h.popup.borrow().state().visible);

    h.viewport.pointer_moved(Pixel::new(target.x + 12.0, target.y));
    assert!(!h.popup.borrow().state().visible);
}

#[test]
fn marker_near_the_edge_pans_the_popup_into_view() {
    let mut h = embedded_at_street_level();
    let first = h.index.features()[0].geometry();
    // move the marker from the centre to 20 px from the top-left corner
    let view = h.viewport.view_mut();
    view.set_center(view.pixel_to_coordinate(Pixel::new(980.0, 780.0)));

    let target = h.viewport.view().coordinate_to_pixel(first);
    assert_abs_diff_eq!(target.x, 20.0, epsilon = 1e-6);
    assert_abs_diff_eq!(target.y, 20.0, epsilon = 1e-6);
    h.viewport.pointer_moved(target);

    assert!(h.popup.borrow().state().visible);
    assert!(h.viewport.view().is_animating());
}

#[test]
fn lv03_viewport_converts_lv95_records() {
    let catalog = PointCatalog::embedded().unwrap();
    let config = MapConfig {
        active_crs: known::LV03.to_string(),
        center: Coordinate::new(561485.53, 205014.47),
        ..MapConfig::default()
    };
    let h = harness(config, catalog);
    let first = h.index.features()[0].geometry();
    assert_abs_diff_eq!(first.x, 561482.97, epsilon = 2.0);
    assert_abs_diff_eq!(first.y, 205017.37, epsilon = 2.0);
}

#[test]
fn viewport_rejects_bad_setup() {
    let registry = ProjectionRegistry::with_defaults().unwrap();
    let catalog = PointCatalog::embedded().unwrap();
    let index = Arc::new(FeatureIndex::build(&catalog, known::LV95, &registry).unwrap());

    let config = MapConfig {
        background_tile_url_template: "https://tiles.example/{z}/{x}.png".into(),
        ..MapConfig::default()
    };
    assert!(matches!(
        Viewport::initialize(&config, &registry, Arc::clone(&index)),
        Err(SolarMapError::InvalidTileTemplate(_))
    ));

    let config = MapConfig {
        active_crs: "EPSG:9999".into(),
        ..MapConfig::default()
    };
    assert!(matches!(
        Viewport::initialize(&config, &registry, Arc::clone(&index)),
        Err(SolarMapError::UnknownCrs(_))
    ));

    let config = MapConfig {
        active_crs: known::LV03.into(),
        ..MapConfig::default()
    };
    assert!(matches!(
        Viewport::initialize(&config, &registry, index),
        Err(SolarMapError::Config(_))
    ));
}
