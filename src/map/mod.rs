pub mod background;
pub mod feature;
pub mod map;
pub mod map_tile;
pub mod popup;
pub mod view;
pub mod viewport;

pub use feature::{Feature, FeatureId, FeatureIndex, HitTolerance};
pub use popup::{PopupController, PopupState};
pub use view::{Pixel, View};
pub use viewport::{MapConfig, PointerMoveEvent, PointerMoveListener, Viewport};
