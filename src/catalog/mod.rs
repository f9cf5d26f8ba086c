pub mod catalog;
pub mod record;

pub use catalog::PointCatalog;
pub use record::{PointRecord, RawRecord};
