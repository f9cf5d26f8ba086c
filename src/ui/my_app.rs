use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::num::NonZeroU16;
use std::rc::Rc;
use std::sync::Arc;

use eframe::egui;
use egui::{Color32, Pos2, RichText, Style};
use log::{debug, error, info, warn};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::catalog::PointRecord;
use crate::map::map::Map;
use crate::map::map_tile::{DecodedImage, MapTile, TileCoord};
use crate::map::{PopupController, PopupState, Viewport};
use crate::maps_api::tile_retriever::{self, FetchError, TileRetriever};
use crate::projection::{Coordinate, ProjectionRegistry};
use crate::ui::markup::{self, Segment};

const TILE_CACHE_SIZE: u16 = 512;
const VIEW_KEY: &str = "solarmap_view";
const POPUP_MAX_WIDTH: f32 = 320.0;

/// Results coming back from the fetcher runtime.
enum Fetched {
    Tile(TileCoord, Result<MapTile, FetchError>),
    Image(String, Result<DecodedImage, FetchError>),
}

enum ImageSlot {
    Loading,
    Ready(egui::TextureHandle),
    Failed,
}

/// View state kept between runs.
#[derive(Debug, Deserialize, Serialize)]
struct SavedView {
    crs: String,
    center: Coordinate,
    zoom: f64,
}

pub struct MyApp {
    registry: Arc<ProjectionRegistry>,
    viewport: Viewport,
    popup: Rc<RefCell<PopupController>>,
    memory: LruCache<TileCoord, MapTile>,
    images: HashMap<String, ImageSlot>,
    icon: Option<egui::TextureHandle>,
    tile_retriever: TileRetriever,
    pending_tiles: HashSet<TileCoord>,
    receiver: mpsc::UnboundedReceiver<Fetched>,
    sender: mpsc::UnboundedSender<Fetched>,
    runtime: tokio::runtime::Runtime,
}

impl eframe::App for MyApp {
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        let view = self.viewport.view();
        let saved = SavedView {
            crs: view.crs().to_owned(),
            center: view.center(),
            zoom: view.zoom(),
        };
        eframe::set_value(storage, VIEW_KEY, &saved);
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Test for f11 key, to toggle fullscreen
        if let Some(new_fullscreen) = ctx.input(|i| {
            if i.key_pressed(egui::Key::F11) {
                Some(!i.viewport().fullscreen.unwrap_or(false))
            } else {
                None
            }
        }) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(new_fullscreen));
            ctx.send_viewport_cmd(egui::ViewportCommand::Decorations(!new_fullscreen));
            ctx.send_viewport_cmd(egui::ViewportCommand::Maximized(!new_fullscreen));
            ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
        }

        self.process_fetched(ctx);

        let mut missing_tiles = Vec::new();
        let map_rect = egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let map = Map::new(
                    self.viewport.target().to_owned(),
                    &mut self.viewport,
                    &self.registry,
                    &mut self.memory,
                    &mut missing_tiles,
                )
                .icon(self.icon.as_ref());
                ui.add(map).rect
            })
            .inner;

        for coord in missing_tiles {
            self.request_tile(ctx, coord);
        }

        let state = self.popup.borrow().state().clone();
        self.show_popup(ctx, map_rect.min, &state);
    }
}

impl MyApp {
    /// Wires the app around an initialised viewport. `popup` must already be
    /// subscribed to the viewport's pointer events.
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        registry: Arc<ProjectionRegistry>,
        mut viewport: Viewport,
        popup: Rc<RefCell<PopupController>>,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        cc.egui_ctx.set_style(Self::map_style(&cc.egui_ctx));

        if let Some(saved) = cc.storage.and_then(|s| eframe::get_value::<SavedView>(s, VIEW_KEY)) {
            let view = viewport.view_mut();
            if saved.crs == view.crs() && saved.center.is_finite() {
                debug!("restoring view at {:?}, zoom {}", saved.center, saved.zoom);
                view.set_center(saved.center);
                view.set_zoom(saved.zoom);
            }
        }

        let template = viewport
            .background()
            .map(|layer| layer.template.clone())
            .ok_or("viewport has no background layer")?;
        let icon = viewport
            .features()
            .and_then(|layer| load_icon(&cc.egui_ctx, &layer.style.src));

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .thread_name("tile-fetcher")
            .enable_all()
            .build()?;
        let (sender, receiver) = mpsc::unbounded_channel();

        Ok(Self {
            registry,
            viewport,
            popup,
            memory: LruCache::new(NonZeroU16::new(TILE_CACHE_SIZE).unwrap_or(NonZeroU16::MAX).into()),
            images: HashMap::new(),
            icon,
            tile_retriever: TileRetriever::new(template),
            pending_tiles: HashSet::new(),
            receiver,
            sender,
            runtime,
        })
    }

    fn process_fetched(&mut self, ctx: &egui::Context) {
        while let Ok(fetched) = self.receiver.try_recv() {
            match fetched {
                Fetched::Tile(coord, Ok(tile)) => {
                    self.pending_tiles.remove(&coord);
                    self.memory.put(coord, tile);
                }
                // Left in `pending_tiles` so it is not requested again
                Fetched::Tile(coord, Err(e)) => error!("Error fetching tile {coord:?}: {e}"),
                Fetched::Image(url, Ok(image)) => {
                    let texture = image.to_texture(ctx, url.clone());
                    self.images.insert(url, ImageSlot::Ready(texture));
                }
                Fetched::Image(url, Err(e)) => {
                    warn!("Error fetching popup image {url}: {e}");
                    self.images.insert(url, ImageSlot::Failed);
                }
            }
        }
    }

    fn request_tile(&mut self, ctx: &egui::Context, coord: TileCoord) {
        if self.pending_tiles.contains(&coord) || self.memory.peek(&coord).is_some() {
            return;
        }
        let sender = self.sender.clone();
        let tile_retriever = self.tile_retriever.clone();
        let requester = ctx.clone();
        self.runtime.spawn(async move {
            let result = tile_retriever.fetch_tile(coord).await;
            if sender.send(Fetched::Tile(coord, result)).is_ok() {
                requester.request_repaint();
            }
        });
        self.pending_tiles.insert(coord);
    }

    fn request_image(&mut self, ctx: &egui::Context, url: &str) {
        if self.images.contains_key(url) {
            return;
        }
        let sender = self.sender.clone();
        let tile_retriever = self.tile_retriever.clone();
        let requester = ctx.clone();
        let url = url.to_owned();
        self.images.insert(url.clone(), ImageSlot::Loading);
        self.runtime.spawn(async move {
            let result = tile_retriever.fetch_image(&url).await;
            if sender.send(Fetched::Image(url, result)).is_ok() {
                requester.request_repaint();
            }
        });
    }

    fn show_popup(&mut self, ctx: &egui::Context, map_origin: Pos2, state: &PopupState) {
        let (true, Some(anchor), Some(content)) = (state.visible, state.anchor, state.content.as_deref()) else {
            return;
        };
        let options = self.popup.borrow().options().clone();
        let pixel = self.viewport.view().coordinate_to_pixel(anchor);
        let bottom_left = map_origin + egui::vec2((pixel.x + options.offset[0]) as f32, (pixel.y + options.offset[1]) as f32);
        let record = state
            .feature
            .and_then(|id| self.viewport.features()?.index.get(id))
            .map(|feature| feature.shared_record());

        let area = egui::Area::new(egui::Id::new("feature_popup"))
            .order(egui::Order::Foreground)
            .pivot(egui::Align2::LEFT_BOTTOM)
            .fixed_pos(bottom_left)
            .interactable(false)
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.set_max_width(POPUP_MAX_WIDTH);
                    self.popup_contents(ui, content, record.as_deref());
                });
            });

        let size = area.response.rect.size();
        self.popup.borrow_mut().set_popup_size(size.x as f64, size.y as f64);
    }

    fn popup_contents(&mut self, ui: &mut egui::Ui, content: &str, record: Option<&PointRecord>) {
        let segments = markup::parse(content);
        for line in segments.split(|segment| matches!(segment, Segment::LineBreak)) {
            ui.horizontal_wrapped(|ui| {
                ui.spacing_mut().item_spacing.x = 0.0;
                for segment in line {
                    match segment {
                        Segment::Text { text, bold } => {
                            let text = RichText::new(text.as_str());
                            ui.label(if *bold { text.strong() } else { text });
                        }
                        Segment::Image { src, alt, width } => self.popup_image(ui, src, alt, *width),
                        Segment::LineBreak => {}
                    }
                }
            });
        }

        let Some(record) = record else {
            return;
        };
        if record.address().is_some() || record.peak_power().is_some() {
            ui.separator();
        }
        if let Some(address) = record.address() {
            ui.small(address);
        }
        if let Some(power) = record.peak_power() {
            ui.small(format!("kWp: {power}"));
        }
    }

    fn popup_image(&mut self, ui: &mut egui::Ui, src: &str, alt: &str, width: Option<f32>) {
        self.request_image(ui.ctx(), src);
        match self.images.get(src) {
            Some(ImageSlot::Ready(texture)) => {
                let size = texture.size_vec2();
                let width = width.unwrap_or(size.x).min(POPUP_MAX_WIDTH);
                let height = if size.x > 0.0 { size.y * width / size.x } else { 0.0 };
                ui.image((texture.id(), egui::vec2(width, height)));
            }
            Some(ImageSlot::Loading) => {
                ui.spinner();
            }
            Some(ImageSlot::Failed) | None => {
                ui.label(RichText::new(alt).italics().color(Color32::GRAY));
            }
        }
    }

    fn map_style(ctx: &egui::Context) -> Style {
        let mut style = (*ctx.style()).clone();
        style.visuals = egui::Visuals::light();
        style.visuals.window_rounding = egui::Rounding::same(6.0);
        style.spacing.window_margin = egui::Margin::same(8.0);
        style
    }
}

/// Reads and uploads the marker image. `None` falls back to a painted marker.
fn load_icon(ctx: &egui::Context, path: &str) -> Option<egui::TextureHandle> {
    let loaded = std::fs::read(path)
        .map_err(FetchError::from)
        .and_then(|bytes| tile_retriever::decode(&bytes));
    match loaded {
        Ok(image) => {
            info!("loaded marker icon {path}");
            Some(image.to_texture(ctx, "feature_icon"))
        }
        Err(e) => {
            warn!("cannot read marker icon {path}: {e}, drawing a default marker");
            None
        }
    }
}
