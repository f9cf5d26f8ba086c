use std::sync::Arc;
use std::time::Duration;

use log::debug;

use super::feature::{FeatureId, FeatureIndex};
use super::view::{Pixel, View};
use super::viewport::{OverlayOptions, PointerMoveEvent, PointerMoveListener};
use crate::projection::Coordinate;

/// Size assumed for the popup until the renderer reports its real size.
const INITIAL_POPUP_SIZE: Pixel = Pixel::new(320.0, 280.0);

/// What the popup overlay should show. Rewritten on every pointer move.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopupState {
    pub visible: bool,
    /// Map coordinate the popup points at.
    pub anchor: Option<Coordinate>,
    pub content: Option<String>,
    pub feature: Option<FeatureId>,
}

/// Shows the description of the hovered feature next to the pointer.
#[derive(Debug)]
pub struct PopupController {
    index: Arc<FeatureIndex>,
    options: OverlayOptions,
    popup_size: Pixel,
    state: PopupState,
}

impl PopupController {
    pub fn new(index: Arc<FeatureIndex>, options: OverlayOptions) -> Self {
        Self {
            index,
            options,
            popup_size: INITIAL_POPUP_SIZE,
            state: PopupState::default(),
        }
    }

    pub fn state(&self) -> &PopupState {
        &self.state
    }

    pub fn options(&self) -> &OverlayOptions {
        &self.options
    }

    /// Records the rendered popup size, used by auto-pan.
    pub fn set_popup_size(&mut self, width: f64, height: f64) {
        self.popup_size = Pixel::new(width, height);
    }

    pub fn handle(&mut self, event: &PointerMoveEvent, view: &mut View) {
        let Some(feature) = self.index.hit_test(event.coordinate, event.tolerance) else {
            self.state = PopupState::default();
            return;
        };

        self.state = PopupState {
            visible: true,
            anchor: Some(event.coordinate),
            content: Some(feature.description_html().to_string()),
            feature: Some(feature.id()),
        };
        if self.options.auto_pan {
            self.pan_into_view(event.coordinate, view);
        }
    }

    /// Starts a centre animation if the popup at `anchor` would not fit in
    /// the view. Returns true when an animation was started.
    fn pan_into_view(&self, anchor: Coordinate, view: &mut View) -> bool {
        let size = view.size();
        if view.is_animating() || size.x <= 0.0 || size.y <= 0.0 {
            return false;
        }

        let (min, max) = self.options.popup_rect(view.coordinate_to_pixel(anchor), self.popup_size);
        let margin = self.options.margin_px;
        let overflow = |low: f64, high: f64, extent: f64| {
            if low < margin {
                low - margin
            } else if high > extent - margin {
                (high - (extent - margin)).min(low - margin)
            } else {
                0.0
            }
        };
        let dx = overflow(min.x, max.x, size.x);
        let dy = overflow(min.y, max.y, size.y);
        if dx == 0.0 && dy == 0.0 {
            return false;
        }

        let center = Pixel::new(size.x / 2.0 + dx, size.y / 2.0 + dy);
        let target = view.pixel_to_coordinate(center);
        debug!("auto-pan by ({dx:.1}, {dy:.1}) px");
        view.animate_center(target, Duration::from_millis(self.options.auto_pan_duration_ms));
        true
    }
}

impl PointerMoveListener for PopupController {
    fn on_pointer_move(&mut self, event: &PointerMoveEvent, view: &mut View) {
        self.handle(event, view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PointCatalog, RawRecord};
    use crate::map::feature::HitTolerance;
    use crate::projection::{known, ProjectionRegistry};

    fn controller(options: OverlayOptions) -> PopupController {
        let registry = ProjectionRegistry::with_defaults().unwrap();
        let catalog = PointCatalog::load(
            vec![
                RawRecord::new("A", 1000.0, 1000.0).with_detail("x"),
                RawRecord::new("B", 1400.0, 1000.0),
            ],
            known::LV95,
        )
        .unwrap();
        let index = FeatureIndex::build(&catalog, known::LV95, &registry).unwrap();
        PopupController::new(Arc::new(index), options)
    }

    fn view() -> View {
        // 1 map unit per pixel, 800x800 px centred on (1000, 1000)
        let mut view = View::new(known::LV95, Coordinate::new(1000.0, 1000.0), 0.0, 1.0);
        view.set_size(800.0, 800.0);
        view
    }

    fn event(view: &View, coordinate: Coordinate) -> PointerMoveEvent {
        PointerMoveEvent {
            pixel: view.coordinate_to_pixel(coordinate),
            coordinate,
            tolerance: HitTolerance::new(5.0, view.resolution()),
        }
    }

    #[test]
    fn hover_shows_feature_description_at_pointer() {
        let mut popup = controller(OverlayOptions::default());
        let mut view = view();
        let at = Coordinate::new(1000.5, 1000.0);
        popup.handle(&event(&view, at), &mut view);

        let state = popup.state();
        assert!(state.visible);
        assert_eq!(state.anchor, Some(at));
        assert_eq!(state.content.as_deref(), Some("<b>A</b><br>x"));
        assert_eq!(state.feature, Some(FeatureId(0)));
        assert!(!view.is_animating());
    }

    #[test]
    fn moving_away_hides_and_clears() {
        let mut popup = controller(OverlayOptions::default());
        let mut view = view();
        popup.handle(&event(&view, Coordinate::new(1000.0, 1000.0)), &mut view);
        popup.handle(&event(&view, Coordinate::new(1200.0, 1000.0)), &mut view);
        assert_eq!(popup.state(), &PopupState::default());
        assert!(popup.state().anchor.is_none());
    }

    #[test]
    fn skipped_positions_do_not_matter() {
        let mut popup = controller(OverlayOptions::default());
        let mut view = view();
        popup.handle(&event(&view, Coordinate::new(1000.0, 1000.0)), &mut view);
        popup.handle(&event(&view, Coordinate::new(1401.0, 1000.0)), &mut view);
        assert_eq!(popup.state().feature, Some(FeatureId(1)));
        assert_eq!(popup.state().content.as_deref(), Some("<b>B</b>"));
    }

    #[test]
    fn popup_leaving_the_view_starts_auto_pan() {
        let options = OverlayOptions::default();
        let mut popup = controller(options.clone());
        let mut view = view();
        // B sits 400 px right of centre, at the right edge of the surface
        popup.handle(&event(&view, Coordinate::new(1400.0, 1000.0)), &mut view);
        assert!(popup.state().visible);
        assert!(view.is_animating());

        while view.advance(Duration::from_millis(50)) {}
        let anchor = view.coordinate_to_pixel(Coordinate::new(1400.0, 1000.0));
        let (min, max) = options.popup_rect(anchor, INITIAL_POPUP_SIZE);
        assert!(min.x >= options.margin_px - 1e-9);
        assert!(max.x <= view.size().x - options.margin_px + 1e-9);
        assert!(min.y >= options.margin_px - 1e-9);
    }

    #[test]
    fn auto_pan_can_be_disabled() {
        let mut popup = controller(OverlayOptions {
            auto_pan: false,
            ..OverlayOptions::default()
        });
        let mut view = view();
        popup.handle(&event(&view, Coordinate::new(1400.0, 1000.0)), &mut view);
        assert!(popup.state().visible);
        assert!(!view.is_animating());
    }

    #[test]
    fn running_animation_is_not_restarted() {
        let mut popup = controller(OverlayOptions::default());
        let mut view = view();
        let target = Coordinate::new(0.0, 0.0);
        view.animate_center(target, Duration::from_millis(250));
        popup.handle(&event(&view, Coordinate::new(1400.0, 1000.0)), &mut view);
        view.advance(Duration::from_millis(250));
        assert_eq!(view.center(), target);
    }
}
