use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};

use super::feature::{FeatureIndex, HitTolerance};
use super::view::{Pixel, View, DEFAULT_MAX_RESOLUTION};
use crate::error::{Result, SolarMapError};
use crate::projection::{known, Coordinate, ProjectionRegistry};

/// Background raster layer: swisstopo national map, colour, in the web mercator grid.
pub const DEFAULT_TILE_URL: &str =
    "https://wmts.geo.admin.ch/1.0.0/ch.swisstopo.pixelkarte-farbe/default/current/3857/{z}/{x}/{y}.jpeg";

/// URL of a raster tile with `{z}`, `{x}` and `{y}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileTemplate(String);

impl TileTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let complete = ["{z}", "{x}", "{y}"].iter().all(|p| template.contains(p));
        if !complete || template.trim().is_empty() {
            return Err(SolarMapError::InvalidTileTemplate(template.to_string()));
        }
        Ok(Self(template.to_string()))
    }

    pub fn url(&self, z: u32, x: u32, y: u32) -> String {
        self.0
            .replace("{z}", &z.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleLineUnits {
    #[default]
    Metric,
    Imperial,
}

/// Marker drawn for every feature.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IconStyle {
    /// Path of the icon image.
    pub src: String,
    /// Native icon size in pixels.
    pub size: [f64; 2],
    /// Horizontal anchor as a fraction of the width.
    pub anchor_x_fraction: f64,
    /// Vertical anchor in pixels from the top of the icon.
    pub anchor_y_pixels: f64,
    pub scale: f64,
}

impl Default for IconStyle {
    fn default() -> Self {
        Self {
            src: "data/icons8-sun-32.png".into(),
            size: [32.0, 32.0],
            anchor_x_fraction: 0.5,
            anchor_y_pixels: 32.0,
            scale: 0.8,
        }
    }
}

impl IconStyle {
    /// Screen rectangle of the icon when its anchor sits on `anchor`.
    pub fn screen_rect(&self, anchor: Pixel) -> (Pixel, Pixel) {
        let width = self.size[0] * self.scale;
        let height = self.size[1] * self.scale;
        let min = Pixel::new(
            anchor.x - self.anchor_x_fraction * width,
            anchor.y - self.anchor_y_pixels * self.scale,
        );
        (min, Pixel::new(min.x + width, min.y + height))
    }
}

/// Placement and auto-pan behaviour of the popup overlay.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OverlayOptions {
    pub auto_pan: bool,
    pub auto_pan_duration_ms: u64,
    /// Space kept between the popup and the viewport edge after panning.
    pub margin_px: f64,
    /// Offset of the popup's bottom-left corner from its anchor.
    pub offset: [f64; 2],
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            auto_pan: true,
            auto_pan_duration_ms: 250,
            margin_px: 20.0,
            offset: [-50.0, -12.0],
        }
    }
}

impl OverlayOptions {
    /// Screen rectangle of a popup of `size` anchored at `anchor`.
    pub fn popup_rect(&self, anchor: Pixel, size: Pixel) -> (Pixel, Pixel) {
        let left = anchor.x + self.offset[0];
        let bottom = anchor.y + self.offset[1];
        (
            Pixel::new(left, bottom - size.y),
            Pixel::new(left + size.x, bottom),
        )
    }
}

/// Everything needed to initialise a [`Viewport`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MapConfig {
    /// Id of the host container the map renders into.
    pub target: String,
    pub background_tile_url_template: String,
    /// CRS of the background tile grid.
    pub tile_grid_crs: String,
    pub active_crs: String,
    pub center: Coordinate,
    pub zoom: f64,
    pub scale_line_units: ScaleLineUnits,
    pub icon: IconStyle,
    pub hit_tolerance_px: f64,
    /// Map units per pixel at zoom 0.
    pub max_resolution: f64,
    pub max_tile_zoom: u32,
    pub popup: OverlayOptions,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            target: "map".into(),
            background_tile_url_template: DEFAULT_TILE_URL.into(),
            tile_grid_crs: known::WEB_MERCATOR.into(),
            active_crs: known::LV95.into(),
            center: Coordinate::new(2561485.53, 1205014.47),
            zoom: 11.0,
            scale_line_units: ScaleLineUnits::Metric,
            icon: IconStyle::default(),
            hit_tolerance_px: 10.0,
            max_resolution: DEFAULT_MAX_RESOLUTION,
            max_tile_zoom: 18,
            popup: OverlayOptions::default(),
        }
    }
}

impl MapConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SolarMapError::Config(e.to_string()))
    }

    /// Rejects values that would leave the map blank or never hit.
    fn check_numbers(&self) -> Result<()> {
        let invalid = |what: &str, value: f64| Err(SolarMapError::Config(format!("invalid {what}: {value}")));
        if !self.zoom.is_finite() {
            return invalid("zoom", self.zoom);
        }
        if !(self.max_resolution.is_finite() && self.max_resolution > 0.0) {
            return invalid("max_resolution", self.max_resolution);
        }
        if !(self.hit_tolerance_px.is_finite() && self.hit_tolerance_px >= 0.0) {
            return invalid("hit_tolerance_px", self.hit_tolerance_px);
        }
        if !self.center.is_finite() {
            return Err(SolarMapError::Config(format!(
                "invalid center: ({}, {})",
                self.center.x, self.center.y
            )));
        }
        Ok(())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SolarMapError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }
}

/// Background raster layer. Never interactive.
#[derive(Debug, Clone)]
pub struct TileLayer {
    pub id: String,
    pub template: TileTemplate,
    pub grid_crs: String,
    pub max_zoom: u32,
}

/// Topmost layer holding one icon per feature.
#[derive(Debug, Clone)]
pub struct FeatureLayer {
    pub index: Arc<FeatureIndex>,
    pub style: IconStyle,
}

#[derive(Debug, Clone)]
pub enum Layer {
    Background(TileLayer),
    Features(FeatureLayer),
}

impl Layer {
    pub fn is_interactive(&self) -> bool {
        matches!(self, Layer::Features(_))
    }
}

/// Length and label of the scale bar for one resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleBar {
    pub width_px: f64,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleLine {
    pub units: ScaleLineUnits,
    pub min_width_px: f64,
}

impl ScaleLine {
    const LEADING_DIGITS: [f64; 3] = [1.0, 2.0, 5.0];

    pub fn new(units: ScaleLineUnits) -> Self {
        Self {
            units,
            min_width_px: 64.0,
        }
    }

    /// Bar for `meters_per_pixel`: the shortest 1, 2 or 5 × 10ⁿ length
    /// that is at least `min_width_px` wide.
    pub fn bar(&self, meters_per_pixel: f64) -> Option<ScaleBar> {
        if !(meters_per_pixel.is_finite() && meters_per_pixel > 0.0) {
            return None;
        }
        let nominal = self.min_width_px * meters_per_pixel;
        let (unit_meters, suffix) = match self.units {
            ScaleLineUnits::Metric if nominal < 1000.0 => (1.0, "m"),
            ScaleLineUnits::Metric => (1000.0, "km"),
            ScaleLineUnits::Imperial if nominal < 1609.344 => (0.3048, "ft"),
            ScaleLineUnits::Imperial => (1609.344, "mi"),
        };
        let per_pixel = meters_per_pixel / unit_meters;

        let mut i = 3 * (self.min_width_px * per_pixel).log10().floor() as i32;
        loop {
            let count = Self::LEADING_DIGITS[i.rem_euclid(3) as usize] * 10f64.powi(i.div_euclid(3));
            let width_px = count / per_pixel;
            if width_px >= self.min_width_px {
                return Some(ScaleBar {
                    width_px,
                    label: format!("{count} {suffix}"),
                });
            }
            i += 1;
        }
    }
}

/// Pointer position delivered to listeners, with the tolerance to hit-test at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerMoveEvent {
    pub pixel: Pixel,
    pub coordinate: Coordinate,
    pub tolerance: HitTolerance,
}

/// Receives pointer moves from a [`Viewport`], one event at a time.
pub trait PointerMoveListener {
    fn on_pointer_move(&mut self, event: &PointerMoveEvent, view: &mut View);
}

/// The map as composed from a [`MapConfig`]: view state, layers in draw
/// order and the pointer event stream.
pub struct Viewport {
    target: String,
    view: View,
    layers: Vec<Layer>,
    scale_line: ScaleLine,
    hit_tolerance_px: f64,
    listeners: Vec<Rc<RefCell<dyn PointerMoveListener>>>,
}

impl Viewport {
    /// Validates `config` and composes the background and feature layers.
    ///
    /// `index` must have been built in `config.active_crs`.
    pub fn initialize(config: &MapConfig, registry: &ProjectionRegistry, index: Arc<FeatureIndex>) -> Result<Self> {
        let template = TileTemplate::parse(&config.background_tile_url_template)?;
        registry.get(&config.active_crs)?;
        registry.get(&config.tile_grid_crs)?;
        config.check_numbers()?;
        if index.crs() != config.active_crs {
            return Err(SolarMapError::Config(format!(
                "feature index is in {} but the map renders {}",
                index.crs(),
                config.active_crs
            )));
        }

        let layers = vec![
            Layer::Background(TileLayer {
                id: "background-layer".into(),
                template,
                grid_crs: config.tile_grid_crs.clone(),
                max_zoom: config.max_tile_zoom,
            }),
            Layer::Features(FeatureLayer {
                index,
                style: config.icon.clone(),
            }),
        ];

        info!(
            "viewport {:?} initialised in {} at zoom {}",
            config.target, config.active_crs, config.zoom
        );
        Ok(Self {
            target: config.target.clone(),
            view: View::new(&config.active_crs, config.center, config.zoom, config.max_resolution),
            layers,
            scale_line: ScaleLine::new(config.scale_line_units),
            hit_tolerance_px: config.hit_tolerance_px,
            listeners: Vec::new(),
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut View {
        &mut self.view
    }

    /// Layers from bottom to top.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn background(&self) -> Option<&TileLayer> {
        self.layers.iter().find_map(|layer| match layer {
            Layer::Background(tiles) => Some(tiles),
            Layer::Features(_) => None,
        })
    }

    pub fn features(&self) -> Option<&FeatureLayer> {
        self.layers.iter().find_map(|layer| match layer {
            Layer::Features(features) => Some(features),
            Layer::Background(_) => None,
        })
    }

    pub fn scale_line(&self) -> &ScaleLine {
        &self.scale_line
    }

    pub fn subscribe(&mut self, listener: Rc<RefCell<dyn PointerMoveListener>>) {
        self.listeners.push(listener);
    }

    /// Tolerance to hit-test at under the current zoom.
    pub fn hit_tolerance(&self) -> HitTolerance {
        HitTolerance::new(self.hit_tolerance_px, self.view.resolution())
    }

    /// Builds the event for a pointer at `pixel` and hands it to every
    /// listener in subscription order.
    pub fn pointer_moved(&mut self, pixel: Pixel) -> PointerMoveEvent {
        let event = PointerMoveEvent {
            pixel,
            coordinate: self.view.pixel_to_coordinate(pixel),
            tolerance: self.hit_tolerance(),
        };
        for listener in &self.listeners {
            listener.borrow_mut().on_pointer_move(&event, &mut self.view);
        }
        event
    }
}
