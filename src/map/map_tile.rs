use serde::{Deserialize, Serialize};

use crate::projection::{Coordinate, Extent};

/// Half the width of the web mercator square, in meters.
pub const HALF_WORLD: f64 = 20_037_508.342_789_244;
/// Pixel width of one tile at its native resolution.
pub const TILE_SIZE: f64 = 256.0;

/// Address of a tile in an XYZ grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct TileCoord {
    pub z: u32,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Bounds of this tile in web mercator meters.
    pub fn extent(&self) -> Extent {
        let span = 2.0 * HALF_WORLD / 2f64.powi(self.z as i32);
        let west = -HALF_WORLD + self.x as f64 * span;
        let north = HALF_WORLD - self.y as f64 * span;
        Extent {
            min: Coordinate::new(west, north - span),
            max: Coordinate::new(west + span, north),
        }
    }
}

/// Meters per pixel of the tiles at `zoom`.
pub fn tile_resolution(zoom: u32) -> f64 {
    2.0 * HALF_WORLD / TILE_SIZE / 2f64.powi(zoom as i32)
}

/// Smallest tile zoom whose pixels are at least as fine as `resolution`,
/// capped at `max_zoom`.
pub fn zoom_for_resolution(resolution: f64, max_zoom: u32) -> u32 {
    if !(resolution.is_finite() && resolution > 0.0) {
        return 0;
    }
    let z = (tile_resolution(0) / resolution).log2().round();
    z.clamp(0.0, max_zoom as f64) as u32
}

/// Column and row containing a web mercator position at `zoom`, clamped to the grid.
pub fn tile_at(position: Coordinate, zoom: u32) -> (u32, u32) {
    let n = 2f64.powi(zoom as i32);
    let max = n - 1.0;
    let x = ((position.x + HALF_WORLD) / (2.0 * HALF_WORLD) * n).floor().clamp(0.0, max);
    let y = ((HALF_WORLD - position.y) / (2.0 * HALF_WORLD) * n).floor().clamp(0.0, max);
    (x as u32, y as u32)
}

/// Every tile at `zoom` that intersects `extent`, row by row.
pub fn tiles_covering(extent: &Extent, zoom: u32) -> Vec<TileCoord> {
    let (min_x, min_y) = tile_at(Coordinate::new(extent.min.x, extent.max.y), zoom);
    let (max_x, max_y) = tile_at(Coordinate::new(extent.max.x, extent.min.y), zoom);

    let mut tiles = Vec::new();
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            tiles.push(TileCoord::new(zoom, x, y));
        }
    }
    tiles
}

/// A decoded background tile, uploaded to the GPU on first use.
pub struct MapTile {
    pub coord: TileCoord,
    pub image: DecodedImage,
    texture: Option<egui::TextureHandle>, // Has to be an option so it can be loaded lazily, without needing the app context
}

/// RGBA pixels of a fetched image.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub size: [usize; 2],
    pub rgba: Vec<u8>,
}

impl DecodedImage {
    pub fn to_texture(&self, ctx: &egui::Context, name: impl Into<String>) -> egui::TextureHandle {
        let color_image = egui::ColorImage::from_rgba_unmultiplied(self.size, &self.rgba);
        ctx.load_texture(name, color_image, egui::TextureOptions::LINEAR)
    }
}

impl MapTile {
    pub fn new(coord: TileCoord, image: DecodedImage) -> Self {
        Self {
            coord,
            image,
            texture: None,
        }
    }

    pub fn texture(&mut self, ctx: &egui::Context) -> &egui::TextureHandle {
        let TileCoord { z, x, y } = self.coord;
        let image = &self.image;
        self.texture
            .get_or_insert_with(|| image.to_texture(ctx, format!("tile_{x}_{y}_zoom{z}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn zoom_zero_tile_covers_the_world() {
        let extent = TileCoord::new(0, 0, 0).extent();
        assert_relative_eq!(extent.min.x, -HALF_WORLD);
        assert_relative_eq!(extent.max.y, HALF_WORLD);
        assert_relative_eq!(extent.width(), 2.0 * HALF_WORLD);
    }

    #[test]
    fn tile_at_finds_bern() {
        // Bern is around (829_000, 5_933_000) in web mercator
        let (x, y) = tile_at(Coordinate::new(829_000.0, 5_933_000.0), 8);
        assert_eq!((x, y), (133, 90));
        let extent = TileCoord::new(8, x, y).extent();
        assert!(extent.min.x <= 829_000.0 && 829_000.0 <= extent.max.x);
        assert!(extent.min.y <= 5_933_000.0 && 5_933_000.0 <= extent.max.y);
    }

    #[test]
    fn covering_is_row_major_and_clamped() {
        let extent = Extent {
            min: Coordinate::new(-HALF_WORLD * 2.0, -1.0),
            max: Coordinate::new(1.0, HALF_WORLD * 2.0),
        };
        let tiles = tiles_covering(&extent, 1);
        assert_eq!(
            tiles,
            vec![
                TileCoord::new(1, 0, 0),
                TileCoord::new(1, 1, 0),
                TileCoord::new(1, 0, 1),
                TileCoord::new(1, 1, 1),
            ]
        );
    }

    #[test]
    fn zoom_matches_resolution() {
        assert_eq!(zoom_for_resolution(tile_resolution(11), 18), 11);
        assert_eq!(zoom_for_resolution(tile_resolution(11) * 0.9, 18), 11);
        assert_eq!(zoom_for_resolution(0.001, 18), 18);
        assert_eq!(zoom_for_resolution(f64::NAN, 18), 0);
    }
}
