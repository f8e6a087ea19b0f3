//! RFC 7946 types and the row → Feature conversion.
//!
//! Coordinates are always `[longitude, latitude]`. [`row_coordinates`] is the
//! only place where the lat/lon prose order is flipped.

use serde::Serialize;
use serde_json::{Map, Value, json};
use std::cmp::Ordering;

use crate::executor::Row;

const LAT_KEYS: &[&str] = &["latitude", "lat"];
const LON_KEYS: &[&str] = &["longitude", "lon", "lng"];

/// Heatmap intensity source columns, in preference order.
pub const INTENSITY_SOURCES: &[&str] = &["intensity", "skor", "score", "nilai", "weight"];

/// Intensity used when no source value exists or the range has zero width.
pub const NEUTRAL_INTENSITY: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub coordinates: [f64; 2],
}

impl Geometry {
    pub fn point(lon: f64, lat: f64) -> Self {
        Self {
            kind: "Point",
            coordinates: [lon, lat],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub geometry: Geometry,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn point(lon: f64, lat: f64, properties: Map<String, Value>) -> Self {
        Self {
            kind: "Feature",
            id: None,
            geometry: Geometry::point(lon, lat),
            properties,
        }
    }

    pub fn is_center(&self) -> bool {
        self.properties.get("type").and_then(Value::as_str) == Some("center")
    }

    fn number(&self, key: &str) -> Option<f64> {
        self.properties.get(key).and_then(as_number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    pub features: Vec<Feature>,
    pub properties: Map<String, Value>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: "FeatureCollection",
            bbox: None,
            features,
            properties: Map::new(),
        }
    }

    /// Features that came from rows (the synthetic center excluded).
    pub fn data_features(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter().filter(|f| !f.is_center())
    }
}

/// JSON numbers, and numeric strings (e.g. `numeric` cast to text).
fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|f| f.is_finite())
}

fn first_number(row: &Row, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| row.get(*k).and_then(as_number))
}

/// Finite WGS84 position.
pub fn valid_position(lon: f64, lat: f64) -> bool {
    lon.is_finite()
        && lat.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}

/// `(lon, lat)` from a row's latitude/longitude columns (`lat`, `lon`,
/// `lng` accepted). None when either is missing or out of range.
pub fn row_coordinates(row: &Row) -> Option<(f64, f64)> {
    let lat = first_number(row, LAT_KEYS)?;
    let lon = first_number(row, LON_KEYS)?;
    valid_position(lon, lat).then_some((lon, lat))
}

/// One Point per row with usable coordinates. Returns the features and the
/// number of rows dropped.
pub fn point_features(rows: &[Row]) -> (Vec<Feature>, usize) {
    let mut dropped = 0;
    let features = rows
        .iter()
        .filter_map(|row| {
            let Some((lon, lat)) = row_coordinates(row) else {
                dropped += 1;
                return None;
            };
            let mut feature = Feature::point(lon, lat, row.clone());
            feature.id = match row.get("id") {
                Some(v @ (Value::String(_) | Value::Number(_))) => Some(v.clone()),
                _ => None,
            };
            Some(feature)
        })
        .collect();
    (features, dropped)
}

/// Min-max normalise the first available intensity source into
/// `properties.intensity`. Returns the source range as found in the data.
pub fn apply_intensity(features: &mut [Feature]) -> Option<(Value, Value)> {
    let source = INTENSITY_SOURCES
        .iter()
        .copied()
        .find(|key| features.iter().any(|f| f.number(key).is_some()));

    let Some(source) = source else {
        for feature in features.iter_mut() {
            feature
                .properties
                .insert("intensity".into(), json!(NEUTRAL_INTENSITY));
        }
        return None;
    };

    let mut range: Option<((f64, Value), (f64, Value))> = None;
    for feature in features.iter() {
        let Some(v) = feature.number(source) else {
            continue;
        };
        let raw = feature.properties[source].clone();
        range = Some(match range {
            None => ((v, raw.clone()), (v, raw)),
            Some((lo, hi)) => (
                if v < lo.0 { (v, raw.clone()) } else { lo },
                if v > hi.0 { (v, raw) } else { hi },
            ),
        });
    }
    let ((min, min_raw), (max, max_raw)) = range?;

    let width = max - min;
    for feature in features.iter_mut() {
        let intensity = match feature.number(source) {
            Some(v) if width > 0.0 => ((v - min) / width).clamp(0.0, 1.0),
            _ => NEUTRAL_INTENSITY,
        };
        feature
            .properties
            .insert("intensity".into(), json!(intensity));
    }
    Some((min_raw, max_raw))
}

/// Stable ascending sort on `properties.distance`; features without a
/// distance go last.
pub fn sort_by_distance(features: &mut [Feature]) {
    features.sort_by(|a, b| match (a.number("distance"), b.number("distance")) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

pub fn center_feature(lon: f64, lat: f64, radius_km: Option<f64>) -> Feature {
    let mut properties = Map::new();
    properties.insert("type".into(), json!("center"));
    if let Some(r) = radius_km {
        properties.insert("radius_km".into(), json!(r));
    }
    Feature::point(lon, lat, properties)
}

/// `[minLon, minLat, maxLon, maxLat]` over the given features.
pub fn bbox<'a>(features: impl IntoIterator<Item = &'a Feature>) -> Option<[f64; 4]> {
    features.into_iter().fold(None, |acc, f| {
        let [lon, lat] = f.geometry.coordinates;
        Some(match acc {
            None => [lon, lat, lon, lat],
            Some([a, b, c, d]) => [a.min(lon), b.min(lat), c.max(lon), d.max(lat)],
        })
    })
}

fn valid_point(geometry: &serde_json::Map<String, Value>) -> bool {
    match geometry.get("coordinates").and_then(Value::as_array).map(Vec::as_slice) {
        Some([lon, lat]) => match (lon.as_f64(), lat.as_f64()) {
            (Some(lon), Some(lat)) => valid_position(lon, lat),
            _ => false,
        },
        _ => false,
    }
}

/// Structural FeatureCollection check on the serialised form. Point
/// positions must also be in range.
pub fn validate_feature_collection(value: &Value) -> bool {
    if value.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        return false;
    }
    let Some(features) = value.get("features").and_then(Value::as_array) else {
        return false;
    };
    features.iter().all(|f| {
        f.get("type").and_then(Value::as_str) == Some("Feature")
            && f.get("geometry").and_then(Value::as_object).is_some_and(|g| {
                match g.get("type").and_then(Value::as_str) {
                    Some("Point") => valid_point(g),
                    Some(_) => true,
                    None => false,
                }
            })
    })
}
