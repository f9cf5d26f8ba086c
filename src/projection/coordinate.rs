use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// A position in some CRS. For geographic systems `x` is longitude and `y`
/// latitude, both in degrees; for projected systems they are easting and
/// northing in the CRS units.
#[derive(Debug, Default, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance_2(&self, other: &Coordinate) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn to_array(self) -> [f64; 2] {
        [self.x, self.y]
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(c: Coordinate) -> Self {
        [c.x, c.y]
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl Add<Coordinate> for Coordinate {
    type Output = Coordinate;

    fn add(self, other: Coordinate) -> Coordinate {
        Coordinate {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl Sub<Coordinate> for Coordinate {
    type Output = Coordinate;

    fn sub(self, other: Coordinate) -> Coordinate {
        Coordinate {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

/// Axis-aligned bounds in a single CRS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min: Coordinate,
    pub max: Coordinate,
}

impl Extent {
    pub fn from_points(points: impl IntoIterator<Item = Coordinate>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut extent = Extent {
            min: first,
            max: first,
        };
        for p in iter {
            extent.min.x = extent.min.x.min(p.x);
            extent.min.y = extent.min.y.min(p.y);
            extent.max.x = extent.max.x.max(p.x);
            extent.max.y = extent.max.y.max(p.y);
        }
        Some(extent)
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_pair() {
        let c = Coordinate::new(2561482.97, 1205017.37);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, "[2561482.97,1205017.37]");
        let back: Coordinate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn extent_covers_all_points() {
        let extent = Extent::from_points([
            Coordinate::new(1.0, 5.0),
            Coordinate::new(-2.0, 3.0),
            Coordinate::new(4.0, -1.0),
        ])
        .unwrap();
        assert_eq!(extent.min, Coordinate::new(-2.0, -1.0));
        assert_eq!(extent.max, Coordinate::new(4.0, 5.0));
        assert_eq!(extent.center(), Coordinate::new(1.0, 2.0));
        assert!(Extent::from_points(std::iter::empty()).is_none());
    }
}
