#![warn(clippy::all, rust_2018_idioms)]

//! Swiss point-of-interest map: projection registry, point catalog, feature
//! hit-testing and a hover popup on top of an egui map surface.

pub mod catalog;
pub mod error;
pub mod map;
pub mod maps_api;
pub mod projection;
pub mod ui;

pub use error::{Result, SolarMapError};
