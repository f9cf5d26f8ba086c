//! Well-known coordinate reference systems used by the map.
//!
//! Swiss definitions come from epsg.io and carry the CH1903 datum shift as a
//! 7-parameter `towgs84` list.

pub const WGS84: &str = "EPSG:4326";
pub const WEB_MERCATOR: &str = "EPSG:3857";
pub const LV95: &str = "EPSG:2056";
pub const LV03: &str = "EPSG:21781";

pub const WGS84_DEF: &str = "+proj=longlat +datum=WGS84 +no_defs";

pub const WEB_MERCATOR_DEF: &str =
    "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs";

pub const LV95_DEF: &str = "+proj=somerc +lat_0=46.95240555555556 +lon_0=7.439583333333333 +k_0=1 \
    +x_0=2600000 +y_0=1200000 +ellps=bessel +towgs84=674.374,15.056,405.346,0,0,0,0 +units=m +no_defs";

pub const LV03_DEF: &str = "+proj=somerc +lat_0=46.95240555555556 +lon_0=7.439583333333333 +k_0=1 \
    +x_0=600000 +y_0=200000 +ellps=bessel +towgs84=674.4,15.1,405.3,0,0,0,0 +units=m +no_defs";

/// All systems registered by [`ProjectionRegistry::with_defaults`](super::ProjectionRegistry::with_defaults).
pub const DEFAULTS: [(&str, &str); 4] = [
    (WGS84, WGS84_DEF),
    (WEB_MERCATOR, WEB_MERCATOR_DEF),
    (LV95, LV95_DEF),
    (LV03, LV03_DEF),
];
