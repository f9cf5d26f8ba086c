use std::time::Duration;

use egui::epaint::{emath::lerp, Color32, Mesh, Pos2, Rect, Shape, Stroke, Vertex};
use egui::{pos2, vec2, Align2, FontId, Rangef, Response, Sense, TextureId, Ui, Vec2, Widget};
use log::debug;
use lru::LruCache;

use super::background::{tile_mesh, visible_tiles, TileMesh};
use super::map_tile::{MapTile, TileCoord};
use super::view::Pixel;
use super::viewport::{IconStyle, Viewport};
use crate::projection::ProjectionRegistry;

/// Approximate meters per degree, for scale bars on geographic views.
const METERS_PER_DEGREE: f64 = 111_319.490_793_273_58;

/// Interactive map surface: draws the viewport's layers and feeds pointer
/// moves back into it.
pub struct Map<'a> {
    id: egui::Id,
    viewport: &'a mut Viewport,
    registry: &'a ProjectionRegistry,
    tile_cache: &'a mut LruCache<TileCoord, MapTile>,
    missing_tiles: &'a mut Vec<TileCoord>,
    icon: Option<&'a egui::TextureHandle>,
}

impl<'a> Map<'a> {
    pub fn new(
        id_source: impl std::hash::Hash,
        viewport: &'a mut Viewport,
        registry: &'a ProjectionRegistry,
        tile_cache: &'a mut LruCache<TileCoord, MapTile>,
        missing_tiles: &'a mut Vec<TileCoord>,
    ) -> Self {
        Self {
            id: egui::Id::new(id_source),
            viewport,
            registry,
            tile_cache,
            missing_tiles,
            icon: None,
        }
    }

    /// Texture for feature markers. A painted sun is used without one.
    pub fn icon(mut self, icon: Option<&'a egui::TextureHandle>) -> Self {
        self.icon = icon;
        self
    }
}

impl Widget for Map<'_> {
    fn ui(self, ui: &mut Ui) -> Response {
        let Map {
            id,
            viewport,
            registry,
            tile_cache,
            missing_tiles,
            icon,
        } = self;

        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        ui.painter().rect_filled(rect, 0.0, Color32::from_gray(220));
        let map_painter = ui.painter().with_clip_rect(rect);

        let view = viewport.view_mut();
        view.set_size(rect.width() as f64, rect.height() as f64);

        // Handle interactions
        if response.dragged() {
            let delta = response.drag_delta();
            view.pan_by_pixels(delta.x as f64, delta.y as f64);
        }

        let hover = response.hover_pos().map(|pos| pos - rect.min);
        if let Some(local) = hover {
            let anchor = Pixel::new(local.x as f64, local.y as f64);
            let mut zoomed = false;
            // Handle zoom for pinch / touch
            let zoom_delta = ui.input(|i| i.zoom_delta()) - 1.0;
            if zoom_delta.abs() > f32::EPSILON {
                let zoom_new = lerp(Rangef::new(0.0, 1.0), zoom_delta.abs()) * zoom_delta.signum();
                view.zoom_by(zoom_new as f64, anchor);
                zoomed = true;
            }

            // Handle zoom for scroll
            let scroll = ui.input(|i| i.smooth_scroll_delta).y;
            if scroll.abs() > f32::EPSILON && !zoomed {
                // Normalize scroll using tanh
                view.zoom_by((scroll / 10.0).tanh() as f64, anchor);
            }
        }

        let dt = ui.input(|i| i.stable_dt);
        if view.advance(Duration::from_secs_f32(dt)) {
            ui.ctx().request_repaint();
        }

        // Pointer moves, once per new position
        if let Some(local) = hover {
            let last_id = id.with("last_pointer");
            let last: Option<Vec2> = ui.ctx().data(|d| d.get_temp(last_id));
            if last != Some(local) || response.dragged() {
                viewport.pointer_moved(Pixel::new(local.x as f64, local.y as f64));
                ui.ctx().data_mut(|d| d.insert_temp(last_id, local));
            }
        }

        paint_background(&map_painter, rect, viewport, registry, tile_cache, missing_tiles);
        paint_features(&map_painter, rect, viewport, icon);
        paint_scale_line(&map_painter, rect, viewport, registry);

        response
    }
}

fn to_screen(rect: Rect, pixel: Pixel) -> Pos2 {
    rect.min + vec2(pixel.x as f32, pixel.y as f32)
}

fn paint_background(
    painter: &egui::Painter,
    rect: Rect,
    viewport: &Viewport,
    registry: &ProjectionRegistry,
    tile_cache: &mut LruCache<TileCoord, MapTile>,
    missing_tiles: &mut Vec<TileCoord>,
) {
    let Some(layer) = viewport.background() else {
        return;
    };
    let view = viewport.view();
    let tiles = match visible_tiles(view, registry, &layer.grid_crs, layer.max_zoom) {
        Ok(tiles) => tiles,
        Err(e) => {
            debug!("background skipped: {e}");
            return;
        }
    };

    for coord in tiles {
        let Some(tile) = tile_cache.get_mut(&coord) else {
            missing_tiles.push(coord);
            continue;
        };
        match tile_mesh(coord, view, registry, &layer.grid_crs) {
            Ok(mesh) => {
                let texture = tile.texture(painter.ctx()).id();
                painter.add(Shape::mesh(textured_mesh(&mesh, rect, texture)));
            }
            Err(e) => debug!("tile {coord:?} skipped: {e}"),
        }
    }
}

fn textured_mesh(tile: &TileMesh, rect: Rect, texture: TextureId) -> Mesh {
    let n = tile.subdivisions;
    let mut mesh = Mesh::with_texture(texture);
    for row in 0..=n {
        for col in 0..=n {
            let [u, v] = tile.uv(col, row);
            mesh.vertices.push(Vertex {
                pos: to_screen(rect, tile.node(col, row)),
                uv: pos2(u, v),
                color: Color32::WHITE,
            });
        }
    }
    let stride = (n + 1) as u32;
    for row in 0..n as u32 {
        for col in 0..n as u32 {
            let i = row * stride + col;
            mesh.add_triangle(i, i + 1, i + stride);
            mesh.add_triangle(i + 1, i + stride + 1, i + stride);
        }
    }
    mesh
}

fn paint_features(painter: &egui::Painter, rect: Rect, viewport: &Viewport, icon: Option<&egui::TextureHandle>) {
    let Some(layer) = viewport.features() else {
        return;
    };
    let view = viewport.view();
    for feature in layer.index.features() {
        let anchor = view.coordinate_to_pixel(feature.geometry());
        let (min, max) = layer.style.screen_rect(anchor);
        let icon_rect = Rect::from_min_max(to_screen(rect, min), to_screen(rect, max));
        if !rect.intersects(icon_rect) {
            continue;
        }
        match icon {
            Some(texture) => {
                painter.image(
                    texture.id(),
                    icon_rect,
                    Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                    Color32::WHITE,
                );
            }
            None => paint_sun(painter, icon_rect, &layer.style),
        }
    }
}

fn paint_sun(painter: &egui::Painter, icon_rect: Rect, style: &IconStyle) {
    let center = icon_rect.center();
    let radius = icon_rect.width().min(icon_rect.height()) * 0.25;
    let ray = Stroke::new((1.5 * style.scale) as f32, Color32::from_rgb(230, 140, 0));
    for k in 0..8 {
        let angle = k as f32 * std::f32::consts::FRAC_PI_4;
        let dir = vec2(angle.cos(), angle.sin());
        painter.line_segment([center + dir * radius * 1.3, center + dir * radius * 1.9], ray);
    }
    painter.circle(center, radius, Color32::from_rgb(255, 196, 0), ray);
}

fn paint_scale_line(painter: &egui::Painter, rect: Rect, viewport: &Viewport, registry: &ProjectionRegistry) {
    let view = viewport.view();
    let geographic = registry.get(view.crs()).map(|crs| crs.is_geographic()).unwrap_or(false);
    let meters_per_pixel = if geographic {
        view.resolution() * METERS_PER_DEGREE
    } else {
        view.resolution()
    };
    let Some(bar) = viewport.scale_line().bar(meters_per_pixel) else {
        return;
    };

    let stroke = Stroke::new(2.0, Color32::from_rgb(0, 60, 136));
    let left = rect.left_bottom() + vec2(10.0, -10.0);
    let right = left + vec2(bar.width_px as f32, 0.0);
    painter.line_segment([left, right], stroke);
    painter.line_segment([left, left - vec2(0.0, 6.0)], stroke);
    painter.line_segment([right, right - vec2(0.0, 6.0)], stroke);
    painter.text(
        pos2((left.x + right.x) / 2.0, left.y - 8.0),
        Align2::CENTER_BOTTOM,
        bar.label,
        FontId::proportional(12.0),
        Color32::from_rgb(0, 60, 136),
    );
}
