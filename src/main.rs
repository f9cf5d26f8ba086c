#![warn(clippy::all, rust_2018_idioms)]
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use log::{error, info};

use solarmap::catalog::PointCatalog;
use solarmap::map::{FeatureIndex, MapConfig, PopupController, Viewport};
use solarmap::projection::ProjectionRegistry;
use solarmap::ui::my_app::MyApp;

const CONFIG_VAR: &str = "SOLARMAP_CONFIG";
const CATALOG_VAR: &str = "SOLARMAP_CATALOG";

fn load_config() -> solarmap::Result<MapConfig> {
    match dotenv::var(CONFIG_VAR) {
        Ok(path) => {
            info!("reading map config from {path}");
            MapConfig::from_file(path)
        }
        Err(_) => Ok(MapConfig::default()),
    }
}

fn load_catalog(config: &MapConfig) -> solarmap::Result<PointCatalog> {
    match dotenv::var(CATALOG_VAR) {
        Ok(path) => {
            info!("reading catalog from {path}");
            let text = std::fs::read_to_string(&path)
                .map_err(|e| solarmap::SolarMapError::Config(format!("cannot read {path}: {e}")))?;
            // External catalogs are expected in the map's own CRS unless records say otherwise
            PointCatalog::from_json(&text, &config.active_crs)
        }
        Err(_) => PointCatalog::embedded(),
    }
}

/// Everything the window needs, built before it opens so startup errors
/// surface on the console.
fn build_map() -> solarmap::Result<(Arc<ProjectionRegistry>, Viewport, Rc<RefCell<PopupController>>)> {
    let config = load_config()?;
    let registry = Arc::new(ProjectionRegistry::with_defaults()?);
    let catalog = load_catalog(&config)?;
    let index = Arc::new(FeatureIndex::build(&catalog, &config.active_crs, &registry)?);

    let mut viewport = Viewport::initialize(&config, &registry, Arc::clone(&index))?;
    let popup = Rc::new(RefCell::new(PopupController::new(index, config.popup.clone())));
    viewport.subscribe(popup.clone());
    Ok((registry, viewport, popup))
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> eframe::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let (registry, viewport, popup) = match build_map() {
        Ok(parts) => parts,
        Err(e) => {
            error!("cannot start: {e}");
            std::process::exit(1);
        }
    };

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(egui::vec2(1280.0, 900.0))
            .with_min_inner_size(egui::vec2(400.0, 300.0))
            .with_title("SolarMap")
            .with_resizable(true)
            .with_decorations(true),
        ..Default::default()
    };

    eframe::run_native(
        "SolarMap",
        native_options,
        Box::new(|cc| {
            let app = MyApp::new(cc, registry, viewport, popup)?;
            Ok(Box::new(app))
        }),
    )
}
