use serde::{Deserialize, Serialize};

use crate::projection::Coordinate;

/// One catalog entry as supplied by the loader, before validation.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct RawRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub img: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, rename = "kWp")]
    pub peak_power: Option<String>,
    #[serde(default)]
    pub coord: Vec<f64>,
    /// Overrides the catalog's source CRS for this entry.
    #[serde(default)]
    pub crs: Option<String>,
}

impl RawRecord {
    pub fn new(name: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            name: name.into(),
            coord: vec![x, y],
            ..Default::default()
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.img = Some(url.into());
        self
    }
}

/// A validated, immutable catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointRecord {
    name: String,
    detail: Option<String>,
    image_url: Option<String>,
    address: Option<String>,
    peak_power: Option<String>,
    position: Coordinate,
    crs: String,
}

impl PointRecord {
    /// Checks `raw` and resolves its CRS against `default_crs`.
    ///
    /// Returns the failure reason on rejection; the caller adds the index.
    pub(crate) fn validate(raw: RawRecord, default_crs: &str) -> Result<Self, &'static str> {
        if raw.name.trim().is_empty() {
            return Err("empty name");
        }
        let position = match raw.coord.as_slice() {
            [x, y] => Coordinate::new(*x, *y),
            _ => return Err("position must have exactly 2 coordinates"),
        };
        if !position.is_finite() {
            return Err("non-finite position");
        }

        Ok(Self {
            name: raw.name,
            detail: non_empty(raw.detail),
            image_url: non_empty(raw.img),
            address: non_empty(raw.address),
            peak_power: non_empty(raw.peak_power),
            position,
            crs: non_empty(raw.crs).unwrap_or_else(|| default_crs.to_string()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Installed peak power label, e.g. "12.2 kWc".
    pub fn peak_power(&self) -> Option<&str> {
        self.peak_power.as_deref()
    }

    pub fn position(&self) -> Coordinate {
        self.position
    }

    /// Code of the CRS `position` is expressed in.
    pub fn crs(&self) -> &str {
        &self.crs
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
