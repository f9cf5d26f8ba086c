use std::sync::Arc;

use log::info;
use serde_json::Value;

use super::record::{PointRecord, RawRecord};
use crate::error::{Result, SolarMapError};
use crate::projection::known;

/// Installations bundled with the application, positioned in LV95.
const EMBEDDED_CATALOG: &str = include_str!("../../data/systems.json");

/// The validated, ordered and immutable list of point records.
///
/// Records are reference counted so features can share them without
/// copying the display payload.
#[derive(Debug, Clone)]
pub struct PointCatalog {
    records: Vec<Arc<PointRecord>>,
    source_crs: String,
}

impl PointCatalog {
    /// Validates every record in order. The first invalid record aborts the
    /// load, nothing partial is returned.
    pub fn load(raw_records: Vec<RawRecord>, source_crs: &str) -> Result<Self> {
        let records = raw_records
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                PointRecord::validate(raw, source_crs)
                    .map(Arc::new)
                    .map_err(|reason| SolarMapError::invalid_record(index, reason))
            })
            .collect::<Result<Vec<_>>>()?;

        info!("catalog loaded: {} records in {source_crs}", records.len());
        Ok(Self {
            records,
            source_crs: source_crs.to_string(),
        })
    }

    /// Parses a JSON array of records. An element with a wrongly typed field
    /// is reported as an invalid record at its index.
    pub fn from_json(text: &str, source_crs: &str) -> Result<Self> {
        let values: Vec<Value> = serde_json::from_str(text)?;
        let raw_records = values
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                serde_json::from_value::<RawRecord>(value)
                    .map_err(|e| SolarMapError::invalid_record(index, e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::load(raw_records, source_crs)
    }

    /// The bundled dataset.
    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED_CATALOG, known::LV95)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<PointRecord>> {
        self.records.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<PointRecord>> {
        self.records.iter()
    }

    /// CRS assumed for records that do not name their own.
    pub fn source_crs(&self) -> &str {
        &self.source_crs
    }
}

impl<'a> IntoIterator for &'a PointCatalog {
    type Item = &'a Arc<PointRecord>;
    type IntoIter = std::slice::Iter<'a, Arc<PointRecord>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
