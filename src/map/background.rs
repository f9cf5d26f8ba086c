//! Placement of background raster tiles inside a view whose CRS differs
//! from the tile grid's.
//!
//! Tiles are picked in the grid CRS and each one is sampled on a small
//! lattice whose nodes are projected into view pixels, so the renderer can
//! draw it as a textured mesh.

use log::debug;

use super::map_tile::{tiles_covering, zoom_for_resolution, TileCoord};
use super::view::{Pixel, View};
use crate::error::Result;
use crate::projection::{Coordinate, Extent, ProjectionRegistry};

/// Upper bound on tiles drawn in one frame.
pub const MAX_TILES_PER_FRAME: usize = 64;
/// Lattice cells per tile side.
pub const MESH_SUBDIVISIONS: usize = 4;

/// Lattice of a tile in view pixels, `(n + 1)²` nodes in row-major order
/// from the tile's north-west corner.
#[derive(Debug, Clone, PartialEq)]
pub struct TileMesh {
    pub coord: TileCoord,
    pub subdivisions: usize,
    pub nodes: Vec<Pixel>,
}

impl TileMesh {
    /// Texture coordinate of lattice node `(col, row)`.
    pub fn uv(&self, col: usize, row: usize) -> [f32; 2] {
        let n = self.subdivisions as f32;
        [col as f32 / n, row as f32 / n]
    }

    pub fn node(&self, col: usize, row: usize) -> Pixel {
        self.nodes[row * (self.subdivisions + 1) + col]
    }
}

/// Tiles of the grid in `grid_crs` needed to cover `view`.
pub fn visible_tiles(
    view: &View,
    registry: &ProjectionRegistry,
    grid_crs: &str,
    max_zoom: u32,
) -> Result<Vec<TileCoord>> {
    let size = view.size();
    if size.x <= 0.0 || size.y <= 0.0 {
        return Ok(Vec::new());
    }

    // Edge midpoints as well as corners, the view outline bends in the grid CRS.
    let samples = [
        (0.0, 0.0),
        (0.5, 0.0),
        (1.0, 0.0),
        (1.0, 0.5),
        (1.0, 1.0),
        (0.5, 1.0),
        (0.0, 1.0),
        (0.0, 0.5),
    ];
    let mut outline = Vec::with_capacity(samples.len());
    for (fx, fy) in samples {
        let coordinate = view.pixel_to_coordinate(Pixel::new(fx * size.x, fy * size.y));
        outline.push(registry.transform(coordinate, view.crs(), grid_crs)?);
    }
    let Some(extent) = Extent::from_points(outline) else {
        return Ok(Vec::new());
    };

    let resolution = extent.width().max(extent.height()) / size.x.max(size.y);
    let mut zoom = zoom_for_resolution(resolution, max_zoom);
    let mut tiles = tiles_covering(&extent, zoom);
    while tiles.len() > MAX_TILES_PER_FRAME && zoom > 0 {
        zoom -= 1;
        tiles = tiles_covering(&extent, zoom);
    }
    debug!("background: {} tiles at zoom {zoom}", tiles.len());
    Ok(tiles)
}

/// Projects the lattice of `coord` into view pixels.
pub fn tile_mesh(
    coord: TileCoord,
    view: &View,
    registry: &ProjectionRegistry,
    grid_crs: &str,
) -> Result<TileMesh> {
    let extent = coord.extent();
    let n = MESH_SUBDIVISIONS;
    let mut nodes = Vec::with_capacity((n + 1) * (n + 1));
    for row in 0..=n {
        let y = extent.max.y - extent.height() * row as f64 / n as f64;
        for col in 0..=n {
            let x = extent.min.x + extent.width() * col as f64 / n as f64;
            let projected = registry.transform(Coordinate::new(x, y), grid_crs, view.crs())?;
            nodes.push(view.coordinate_to_pixel(projected));
        }
    }
    Ok(TileMesh {
        coord,
        subdivisions: n,
        nodes,
    })
}
