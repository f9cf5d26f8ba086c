use std::time::Duration;

use crate::projection::Coordinate;

/// Map units per pixel at zoom 0 when nothing else is configured.
pub const DEFAULT_MAX_RESOLUTION: f64 = 156_543.033_928_040_97;
pub const MAX_ZOOM: f64 = 28.0;

/// A position on the render surface, in pixels from its top-left corner.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Pixel {
    pub x: f64,
    pub y: f64,
}

impl Pixel {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CenterAnimation {
    from: Coordinate,
    to: Coordinate,
    duration: Duration,
    elapsed: Duration,
}

impl CenterAnimation {
    fn current(&self) -> Coordinate {
        let t = if self.duration.is_zero() {
            1.0
        } else {
            (self.elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
        };
        // ease in and out
        let k = t * t * (3.0 - 2.0 * t);
        Coordinate::new(
            self.from.x + (self.to.x - self.from.x) * k,
            self.from.y + (self.to.y - self.from.y) * k,
        )
    }

    fn finished(&self) -> bool {
        self.elapsed >= self.duration
    }
}

/// Projection, center and zoom of the map plus the size of the surface it
/// is drawn on. Map y grows upwards, pixel y grows downwards.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    crs: String,
    center: Coordinate,
    zoom: f64,
    max_resolution: f64,
    size: Pixel,
    animation: Option<CenterAnimation>,
}

impl View {
    pub fn new(crs: impl Into<String>, center: Coordinate, zoom: f64, max_resolution: f64) -> Self {
        Self {
            crs: crs.into(),
            center,
            zoom: zoom.clamp(0.0, MAX_ZOOM),
            max_resolution,
            size: Pixel::default(),
            animation: None,
        }
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }

    pub fn center(&self) -> Coordinate {
        self.center
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn size(&self) -> Pixel {
        self.size
    }

    pub fn set_size(&mut self, width: f64, height: f64) {
        self.size = Pixel::new(width.max(0.0), height.max(0.0));
    }

    /// Map units covered by one pixel.
    pub fn resolution(&self) -> f64 {
        self.max_resolution / 2f64.powf(self.zoom)
    }

    pub fn pixel_to_coordinate(&self, pixel: Pixel) -> Coordinate {
        let res = self.resolution();
        Coordinate::new(
            self.center.x + (pixel.x - self.size.x / 2.0) * res,
            self.center.y - (pixel.y - self.size.y / 2.0) * res,
        )
    }

    pub fn coordinate_to_pixel(&self, coordinate: Coordinate) -> Pixel {
        let res = self.resolution();
        Pixel::new(
            self.size.x / 2.0 + (coordinate.x - self.center.x) / res,
            self.size.y / 2.0 - (coordinate.y - self.center.y) / res,
        )
    }

    /// Moves the map content by `dx`, `dy` pixels, as a drag does.
    pub fn pan_by_pixels(&mut self, dx: f64, dy: f64) {
        self.animation = None;
        let res = self.resolution();
        self.center = Coordinate::new(self.center.x - dx * res, self.center.y + dy * res);
    }

    /// Changes zoom by `delta` levels keeping the coordinate under `anchor` fixed.
    pub fn zoom_by(&mut self, delta: f64, anchor: Pixel) {
        let fixed = self.pixel_to_coordinate(anchor);
        self.zoom = (self.zoom + delta).clamp(0.0, MAX_ZOOM);
        let moved = self.pixel_to_coordinate(anchor);
        self.center = self.center + (fixed - moved);
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(0.0, MAX_ZOOM);
    }

    pub fn set_center(&mut self, center: Coordinate) {
        self.animation = None;
        self.center = center;
    }

    pub fn animate_center(&mut self, target: Coordinate, duration: Duration) {
        self.animation = Some(CenterAnimation {
            from: self.center,
            to: target,
            duration,
            elapsed: Duration::ZERO,
        });
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Advances a running animation by one frame. Returns true while more
    /// frames are needed.
    pub fn advance(&mut self, dt: Duration) -> bool {
        let Some(animation) = self.animation.as_mut() else {
            return false;
        };
        animation.elapsed += dt;
        self.center = animation.current();
        if animation.finished() {
            self.animation = None;
        }
        self.animation.is_some()
    }
}
