pub mod coordinate;
pub mod known;
pub mod registry;

pub use coordinate::{Coordinate, Extent};
pub use registry::{Crs, ProjectionRegistry};
