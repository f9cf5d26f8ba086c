use std::fmt::Write as _;
use std::sync::Arc;

use log::info;
use rstar::primitives::GeomWithData;
use rstar::RTree;

use crate::catalog::{PointCatalog, PointRecord};
use crate::error::Result;
use crate::projection::{Coordinate, Extent, ProjectionRegistry};

/// Width, in pixels, images are displayed at inside a popup.
pub const IMAGE_DISPLAY_WIDTH: u32 = 300;

/// Position of a feature in the catalog, which is also its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryType {
    Point,
}

impl GeometryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryType::Point => "Point",
        }
    }
}

/// A renderable catalog record: its geometry in the viewport CRS plus the
/// popup markup computed once at build time.
#[derive(Debug, Clone)]
pub struct Feature {
    id: FeatureId,
    record: Arc<PointRecord>,
    geometry: Coordinate,
    geometry_type: GeometryType,
    description: String,
}

impl Feature {
    pub fn id(&self) -> FeatureId {
        self.id
    }

    pub fn record(&self) -> &PointRecord {
        &self.record
    }

    /// Shared handle on the record, for holders that outlive a borrow of the index.
    pub fn shared_record(&self) -> Arc<PointRecord> {
        Arc::clone(&self.record)
    }

    pub fn geometry(&self) -> Coordinate {
        self.geometry
    }

    pub fn geometry_type(&self) -> GeometryType {
        self.geometry_type
    }

    /// Popup markup: bold name, detail text and an optional image.
    pub fn description_html(&self) -> &str {
        &self.description
    }
}

/// Hit radius expressed in screen pixels together with the current scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitTolerance {
    pub pixels: f64,
    /// Map units per pixel at the current zoom.
    pub resolution: f64,
}

impl HitTolerance {
    pub fn new(pixels: f64, resolution: f64) -> Self {
        Self { pixels, resolution }
    }

    pub fn map_distance(&self) -> f64 {
        self.pixels * self.resolution
    }
}

type IndexEntry = GeomWithData<[f64; 2], usize>;

/// One feature per catalog record, searchable by position.
pub struct FeatureIndex {
    crs: String,
    features: Vec<Feature>,
    tree: RTree<IndexEntry>,
}

impl std::fmt::Debug for FeatureIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureIndex")
            .field("crs", &self.crs)
            .field("features", &self.features.len())
            .finish()
    }
}

impl FeatureIndex {
    /// Builds the features of `catalog`, transforming each record from its own
    /// CRS into `target_crs`.
    pub fn build(catalog: &PointCatalog, target_crs: &str, registry: &ProjectionRegistry) -> Result<Self> {
        registry.get(target_crs)?;

        let mut features = Vec::with_capacity(catalog.len());
        for (index, record) in catalog.iter().enumerate() {
            let geometry = registry.transform(record.position(), record.crs(), target_crs)?;
            features.push(Feature {
                id: FeatureId(index),
                record: Arc::clone(record),
                geometry,
                geometry_type: GeometryType::Point,
                description: describe(record),
            });
        }

        let entries = features
            .iter()
            .map(|f| IndexEntry::new(f.geometry.to_array(), f.id.0))
            .collect();
        let tree = RTree::bulk_load(entries);

        info!("feature index built: {} features in {target_crs}", features.len());
        Ok(Self {
            crs: target_crs.to_string(),
            features,
            tree,
        })
    }

    /// Nearest feature whose geometry lies within `tolerance` of `point`
    /// (inclusive). Equal distances resolve to the lowest catalog index.
    pub fn hit_test(&self, point: Coordinate, tolerance: HitTolerance) -> Option<&Feature> {
        let radius = tolerance.map_distance();
        if !point.is_finite() || !radius.is_finite() || radius < 0.0 {
            return None;
        }
        let radius_2 = radius * radius;

        self.tree
            .locate_within_distance(point.to_array(), radius_2)
            .map(|entry| (self.features[entry.data].geometry.distance_2(&point), entry.data))
            .filter(|(d2, _)| *d2 <= radius_2)
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, index)| &self.features[index])
    }

    pub fn get(&self, id: FeatureId) -> Option<&Feature> {
        self.features.get(id.0)
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// CRS all geometries are expressed in.
    pub fn crs(&self) -> &str {
        &self.crs
    }

    pub fn extent(&self) -> Option<Extent> {
        Extent::from_points(self.features.iter().map(Feature::geometry))
    }
}

fn describe(record: &PointRecord) -> String {
    let mut html = format!("<b>{}</b>", escape_text(record.name()));
    if let Some(detail) = record.detail() {
        let _ = write!(html, "<br>{detail}");
    }
    if let Some(src) = record.image_url() {
        let _ = write!(
            html,
            r#"<br><img src="{}" alt="{}" width="{IMAGE_DISPLAY_WIDTH}">"#,
            escape_attribute(src),
            escape_attribute(record.name()),
        );
    }
    html
}

fn escape_text(value: &str) -> String {
    value.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
