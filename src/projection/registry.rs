use std::collections::BTreeMap;
use std::f64::consts::PI;

use log::{debug, info};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use super::coordinate::Coordinate;
use super::known;
use crate::error::{Result, SolarMapError};

/// Radius of the sphere used by web mercator tile grids.
const MERCATOR_RADIUS: f64 = 6_378_137.0;
/// Latitude at which web mercator becomes a square.
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// How points in a CRS reach the projection engine.
enum Engine {
    /// Handed to proj4rs as-is (radians for geographic systems).
    Proj(Proj),
    /// Spherical web mercator. proj4rs would apply a datum shift between the
    /// sphere and WGS84, which tile grids never do, so points are converted
    /// to WGS84 lon/lat with closed-form math and projected from there.
    SphericalMercator { pivot: Proj },
}

/// A registered coordinate reference system.
pub struct Crs {
    code: String,
    definition: String,
    geographic: bool,
    engine: Engine,
}

impl std::fmt::Debug for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crs")
            .field("code", &self.code)
            .field("definition", &self.definition)
            .field("geographic", &self.geographic)
            .finish_non_exhaustive()
    }
}

impl Crs {
    fn parse(code: &str, definition: &str) -> Result<Self> {
        let invalid = |reason: String| SolarMapError::InvalidProjection {
            code: code.to_string(),
            reason,
        };
        let tokens = tokens(definition);
        let has = |t: &str| tokens.iter().any(|tok| *tok == t);

        let geographic = ["+proj=longlat", "+proj=latlong", "+proj=lonlat", "+proj=latlon"]
            .iter()
            .any(|t| has(t));
        let spherical_mercator = has("+proj=merc") && has("+a=6378137") && has("+b=6378137");

        let engine = if spherical_mercator {
            let pivot = Proj::from_proj_string(known::WGS84_DEF).map_err(|e| invalid(format!("{e:?}")))?;
            Engine::SphericalMercator { pivot }
        } else {
            Engine::Proj(Proj::from_proj_string(definition).map_err(|e| invalid(format!("{e:?}")))?)
        };

        Ok(Self {
            code: code.to_string(),
            definition: definition.trim().to_string(),
            geographic,
            engine,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// True when coordinates are longitude/latitude in degrees.
    pub fn is_geographic(&self) -> bool {
        self.geographic
    }

    fn same_definition(&self, definition: &str) -> bool {
        tokens(&self.definition) == tokens(definition)
    }

    /// Projection and engine-unit point for `point` expressed in this CRS.
    fn engine_input(&self, point: Coordinate) -> (&Proj, (f64, f64, f64)) {
        match &self.engine {
            Engine::Proj(proj) if self.geographic => {
                (proj, (point.x.to_radians(), point.y.to_radians(), 0.0))
            }
            Engine::Proj(proj) => (proj, (point.x, point.y, 0.0)),
            Engine::SphericalMercator { pivot } => {
                let lonlat = mercator_to_lonlat(point);
                (pivot, (lonlat.x.to_radians(), lonlat.y.to_radians(), 0.0))
            }
        }
    }

    fn engine_target(&self) -> &Proj {
        match &self.engine {
            Engine::Proj(proj) => proj,
            Engine::SphericalMercator { pivot } => pivot,
        }
    }

    fn engine_output(&self, (x, y, _): (f64, f64, f64)) -> Coordinate {
        match &self.engine {
            Engine::Proj(_) if self.geographic => Coordinate::new(x.to_degrees(), y.to_degrees()),
            Engine::Proj(_) => Coordinate::new(x, y),
            Engine::SphericalMercator { .. } => {
                lonlat_to_mercator(Coordinate::new(x.to_degrees(), y.to_degrees()))
            }
        }
    }
}

/// Registry of the coordinate reference systems known to the process.
///
/// Systems are registered once at startup and the registry is read-only
/// afterwards, so it can be shared behind an `Arc` or a plain reference.
#[derive(Debug, Default)]
pub struct ProjectionRegistry {
    systems: BTreeMap<String, Crs>,
}

impl ProjectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding WGS84, web mercator, LV95 and LV03.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        for (code, definition) in known::DEFAULTS {
            registry.register(code, definition)?;
        }
        Ok(registry)
    }

    /// Registers `code`. Registering the same definition again is a no-op,
    /// a different one is a [`SolarMapError::CrsConflict`].
    pub fn register(&mut self, code: &str, definition: &str) -> Result<()> {
        if let Some(existing) = self.systems.get(code) {
            if existing.same_definition(definition) {
                debug!("CRS {code} already registered");
                return Ok(());
            }
            return Err(SolarMapError::CrsConflict {
                code: code.to_string(),
            });
        }

        let crs = Crs::parse(code, definition)?;
        info!("registered CRS {code} (geographic: {})", crs.geographic);
        self.systems.insert(code.to_string(), crs);
        Ok(())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.systems.contains_key(code)
    }

    pub fn get(&self, code: &str) -> Result<&Crs> {
        self.systems
            .get(code)
            .ok_or_else(|| SolarMapError::UnknownCrs(code.to_string()))
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.systems.keys().map(String::as_str)
    }

    /// Re-expresses `point` from `from` into `to`.
    ///
    /// Both codes must be registered, even when they are equal. Equal codes
    /// return the input untouched.
    pub fn transform(&self, point: Coordinate, from: &str, to: &str) -> Result<Coordinate> {
        let src = self.get(from)?;
        let dst = self.get(to)?;
        if from == to {
            return Ok(point);
        }

        let failed = |reason: String| SolarMapError::TransformFailed {
            from: from.to_string(),
            to: to.to_string(),
            reason,
        };

        let (src_proj, mut p) = src.engine_input(point);
        transform(src_proj, dst.engine_target(), &mut p).map_err(|e| failed(format!("{e:?}")))?;

        let out = dst.engine_output(p);
        if !out.is_finite() {
            return Err(failed(format!("non-finite result for ({}, {})", point.x, point.y)));
        }
        Ok(out)
    }
}

fn tokens(definition: &str) -> Vec<&str> {
    definition.split_whitespace().collect()
}

pub fn mercator_to_lonlat(p: Coordinate) -> Coordinate {
    let lon = (p.x / MERCATOR_RADIUS).to_degrees();
    let lat = (2.0 * (p.y / MERCATOR_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    Coordinate::new(lon, lat)
}

pub fn lonlat_to_mercator(p: Coordinate) -> Coordinate {
    let lat = p.y.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT).to_radians();
    let x = MERCATOR_RADIUS * p.x.to_radians();
    let y = MERCATOR_RADIUS * (PI / 4.0 + lat / 2.0).tan().ln();
    Coordinate::new(x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::known::{LV03, LV95, WEB_MERCATOR, WGS84};
    use approx::assert_abs_diff_eq;

    fn registry() -> ProjectionRegistry {
        ProjectionRegistry::with_defaults().unwrap()
    }

    #[test]
    fn identity_returns_input_unchanged() {
        let reg = registry();
        let p = Coordinate::new(2561482.97, 1205017.37);
        assert_eq!(reg.transform(p, LV95, LV95).unwrap(), p);
    }

    #[test]
    fn unknown_crs_fails_even_for_identity() {
        let reg = registry();
        let p = Coordinate::new(0.0, 0.0);
        assert!(matches!(
            reg.transform(p, "EPSG:9999", "EPSG:9999"),
            Err(SolarMapError::UnknownCrs(code)) if code == "EPSG:9999"
        ));
        assert!(matches!(
            reg.transform(p, LV95, "EPSG:9999"),
            Err(SolarMapError::UnknownCrs(_))
        ));
    }

    #[test]
    fn reregistering_same_definition_is_idempotent() {
        let mut reg = registry();
        // extra whitespace does not change the definition
        let spaced = format!("  {}  ", known::LV95_DEF.replace(' ', "   "));
        reg.register(LV95, &spaced).unwrap();
        assert_eq!(reg.codes().count(), 4);
    }

    #[test]
    fn reregistering_different_definition_conflicts() {
        let mut reg = registry();
        let err = reg.register(LV95, known::LV03_DEF).unwrap_err();
        assert!(matches!(err, SolarMapError::CrsConflict { code } if code == LV95));
    }

    #[test]
    fn rejects_unparseable_definition() {
        let mut reg = ProjectionRegistry::new();
        let err = reg.register("X:1", "+proj=doesnotexist +units=m").unwrap_err();
        assert!(matches!(err, SolarMapError::InvalidProjection { .. }));
        assert!(!reg.contains("X:1"));
    }

    #[test]
    fn lv95_origin_is_near_bern() {
        let reg = registry();
        let lonlat = reg
            .transform(Coordinate::new(2_600_000.0, 1_200_000.0), LV95, WGS84)
            .unwrap();
        assert_abs_diff_eq!(lonlat.x, 7.4386, epsilon = 1e-3);
        assert_abs_diff_eq!(lonlat.y, 46.9511, epsilon = 1e-3);
    }

    #[test]
    fn lv03_and_lv95_differ_by_false_origin() {
        let reg = registry();
        let lv95 = reg
            .transform(Coordinate::new(561_482.97, 205_017.37), LV03, LV95)
            .unwrap();
        assert_abs_diff_eq!(lv95.x, 2_561_482.97, epsilon = 2.0);
        assert_abs_diff_eq!(lv95.y, 1_205_017.37, epsilon = 2.0);
    }

    #[test]
    fn round_trips_between_all_registered_pairs() {
        let reg = registry();
        let samples = [
            (WGS84, Coordinate::new(6.93, 46.99)),
            (WEB_MERCATOR, Coordinate::new(771_450.0, 5_935_000.0)),
            (LV95, Coordinate::new(2_561_482.97, 1_205_017.37)),
            (LV03, Coordinate::new(561_482.97, 205_017.37)),
        ];
        let codes: Vec<&str> = reg.codes().collect();
        for (from, p) in samples {
            for to in &codes {
                let there = reg.transform(p, from, to).unwrap();
                let back = reg.transform(there, to, from).unwrap();
                let eps = if reg.get(from).unwrap().is_geographic() { 1e-7 } else { 1e-2 };
                assert_abs_diff_eq!(back.x, p.x, epsilon = eps);
                assert_abs_diff_eq!(back.y, p.y, epsilon = eps);
            }
        }
    }

    #[test]
    fn web_mercator_matches_closed_form() {
        let reg = registry();
        let merc = reg
            .transform(Coordinate::new(7.0, 47.0), WGS84, WEB_MERCATOR)
            .unwrap();
        assert_abs_diff_eq!(merc.x, 779_236.4, epsilon = 1.0);
        assert_abs_diff_eq!(merc.y, 5_942_074.1, epsilon = 1.0);
    }
}
