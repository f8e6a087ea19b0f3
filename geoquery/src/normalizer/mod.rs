//! Output shaping.
//!
//! Value normalisation ([`values::to_json`]) happens when rows leave the
//! executor, so every row reaching this module is already plain JSON.
//! This module picks the response shape from the intent and decorates
//! spatial collections with their metadata.

use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};

use crate::executor::Row;
use crate::geojson::{self, FeatureCollection};
use crate::intent::Intent;
use crate::prompt::SpatialContext;

pub mod values;

const COUNT_ALIASES: &[&str] = &["total", "count", "COUNT(*)", "count(*)"];

/// Aggregate scalar from the first row of a COUNT query. Falls back to the
/// only column of a single-column row, then to 0 for an empty result.
fn count_scalar(rows: &[Row]) -> Value {
    let Some(first) = rows.first() else {
        return json!(0);
    };
    if let Some(v) = COUNT_ALIASES.iter().find_map(|k| first.get(*k)) {
        return v.clone();
    }
    if first.len() == 1
        && let Some((_, v)) = first.iter().next()
    {
        return v.clone();
    }
    json!(0)
}

/// Non-spatial response shapes. Spatial intents shaped here (the `/query`
/// surface) fall through to the plain `{data, count}` listing.
pub fn shape_tabular(intent: Intent, rows: Vec<Row>) -> Value {
    match intent {
        Intent::Count => {
            let total = count_scalar(&rows);
            json!({ "total": total, "count": total })
        }
        Intent::Statistics => {
            let row_count = rows.len();
            json!({ "data": rows, "row_count": row_count })
        }
        _ => {
            let count = rows.len();
            json!({ "data": rows, "count": count })
        }
    }
}

/// Spatial shaping for location, heatmap and distance. Any other intent is
/// shaped as location.
pub fn shape_spatial(
    intent: Intent,
    rows: &[Row],
    query: &str,
    spatial: &SpatialContext,
) -> FeatureCollection {
    let (mut features, dropped) = geojson::point_features(rows);
    let mut collection_props = serde_json::Map::new();

    match intent {
        Intent::Heatmap => {
            let range = geojson::apply_intensity(&mut features);
            collection_props.insert("heatmap".into(), json!(true));
            if let Some((min, max)) = range {
                collection_props.insert("intensity_range".into(), json!([min, max]));
            }
        }
        Intent::Distance => {
            geojson::sort_by_distance(&mut features);
            let (lat, lon) = distance_center(rows, spatial);
            features.insert(0, geojson::center_feature(lon, lat, spatial.radius_km));
            collection_props.insert("center".into(), json!([lon, lat]));
        }
        _ => {}
    }

    let mut fc = FeatureCollection::new(features);
    fc.bbox = geojson::bbox(fc.data_features());

    let count = fc.data_features().count();
    if dropped > 0 {
        tracing::info!(
            intent = %intent,
            rows = rows.len(),
            features = count,
            dropped,
            "Dropped rows without coordinates"
        );
    }

    let shape = if intent.is_spatial() { intent } else { Intent::Location };
    fc.properties.insert("count".into(), json!(count));
    fc.properties.insert("total_rows".into(), json!(rows.len()));
    fc.properties.insert("dropped".into(), json!(dropped));
    fc.properties.insert("query".into(), json!(query));
    fc.properties.insert("intent".into(), json!(shape.as_str()));
    fc.properties.insert(
        "generated_at".into(),
        json!(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
    fc.properties.extend(collection_props);
    fc
}

/// `(lat, lon)`: explicit context, else the first row's
/// `center_latitude`/`center_longitude`, else the origin. Out-of-range
/// candidates are skipped.
fn distance_center(rows: &[Row], spatial: &SpatialContext) -> (f64, f64) {
    if let Some((lat, lon)) = spatial.center()
        && geojson::valid_position(lon, lat)
    {
        return (lat, lon);
    }
    let from_row = |key: &str| {
        rows.first()
            .and_then(|r| r.get(key))
            .and_then(Value::as_f64)
    };
    if let (Some(lat), Some(lon)) = (from_row("center_latitude"), from_row("center_longitude"))
        && geojson::valid_position(lon, lat)
    {
        return (lat, lon);
    }
    tracing::debug!("No usable distance center; using the origin");
    (0.0, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::rows;

    fn bandung() -> Vec<Row> {
        rows(json!([
            {"lat": -6.9271, "lon": 107.6062},
            {"lat": -6.8852, "lon": 107.5992},
            {"lat": -6.9452, "lon": 107.6102},
        ]))
    }

    #[test]
    fn count_reads_any_alias() {
        for key in ["total", "count", "COUNT(*)"] {
            let r = rows(json!([{ key: 403 }]));
            assert_eq!(
                shape_tabular(Intent::Count, r),
                json!({"total": 403, "count": 403}),
                "{key}"
            );
        }
    }

    #[test]
    fn count_falls_back_to_single_column() {
        let r = rows(json!([{"jumlah": 12}]));
        assert_eq!(shape_tabular(Intent::Count, r), json!({"total": 12, "count": 12}));
        assert_eq!(
            shape_tabular(Intent::Count, vec![]),
            json!({"total": 0, "count": 0})
        );
    }

    #[test]
    fn statistics_and_listing_shapes() {
        let r = rows(json!([{"kabupaten": "Bandung", "n": 3}, {"kabupaten": "Garut", "n": 1}]));
        let stats = shape_tabular(Intent::Statistics, r.clone());
        assert_eq!(stats["row_count"], json!(2));
        assert_eq!(stats["data"][1]["kabupaten"], json!("Garut"));

        for intent in [Intent::List, Intent::Filter, Intent::Ranking, Intent::Help, Intent::Unknown, Intent::Location] {
            let listing = shape_tabular(intent, r.clone());
            assert_eq!(listing["count"], json!(2));
            assert_eq!(listing["data"].as_array().map(Vec::len), Some(2));
        }
    }

    #[test]
    fn location_collection_with_metadata() {
        let fc = shape_spatial(
            Intent::Location,
            &bandung(),
            "Tampilkan lokasi santri miskin",
            &SpatialContext::default(),
        );
        assert_eq!(fc.features.len(), 3);
        assert_eq!(fc.features[0].geometry.coordinates, [107.6062, -6.9271]);
        assert_eq!(fc.bbox, Some([107.5992, -6.9452, 107.6102, -6.8852]));
        assert_eq!(fc.properties["count"], json!(3));
        assert_eq!(fc.properties["intent"], json!("location"));
        assert_eq!(fc.properties["query"], json!("Tampilkan lokasi santri miskin"));
        assert!(fc.properties.contains_key("generated_at"));

        let value = serde_json::to_value(&fc).unwrap();
        assert!(geojson::validate_feature_collection(&value));
    }

    #[test]
    fn no_coordinates_is_an_empty_collection() {
        let r = rows(json!([{"nama": "A"}, {"nama": "B", "lat": null, "lon": null}]));
        let fc = shape_spatial(Intent::Location, &r, "q", &SpatialContext::default());
        assert!(fc.features.is_empty());
        assert_eq!(fc.bbox, None);
        assert_eq!(fc.properties["count"], json!(0));
        assert_eq!(fc.properties["total_rows"], json!(2));
        assert_eq!(fc.properties["dropped"], json!(2));
    }

    #[test]
    fn heatmap_collection() {
        let mut r = bandung();
        for (row, skor) in r.iter_mut().zip([75, 85, 92]) {
            row.insert("skor".into(), json!(skor));
        }
        let fc = shape_spatial(Intent::Heatmap, &r, "heatmap", &SpatialContext::default());

        assert_eq!(fc.properties["heatmap"], json!(true));
        assert_eq!(fc.properties["intensity_range"], json!([75, 92]));
        for f in &fc.features {
            let i = f.properties["intensity"].as_f64().unwrap();
            assert!((0.0..=1.0).contains(&i));
        }
        assert_eq!(fc.features[2].properties["intensity"], json!(1.0));
    }

    #[test]
    fn distance_collection_leads_with_center() {
        let mut r = bandung();
        for (row, d) in r.iter_mut().zip([2.5, 5.2, 3.1]) {
            row.insert("distance".into(), json!(d));
        }
        let ctx = SpatialContext {
            center_lat: Some(-6.9),
            center_lon: Some(107.6),
            radius_km: None,
        };
        let fc = shape_spatial(Intent::Distance, &r, "dekat", &ctx);

        assert_eq!(fc.features.len(), 4);
        assert!(fc.features[0].is_center());
        assert_eq!(fc.features[0].geometry.coordinates, [107.6, -6.9]);
        let d: Vec<f64> = fc.features[1..]
            .iter()
            .map(|f| f.properties["distance"].as_f64().unwrap())
            .collect();
        assert_eq!(d, vec![2.5, 3.1, 5.2]);
        assert_eq!(fc.properties["count"], json!(3));
        // bbox ignores the center
        assert_eq!(fc.bbox, Some([107.5992, -6.9452, 107.6102, -6.8852]));
    }

    #[test]
    fn distance_center_falls_back_to_first_row_then_origin() {
        let r = rows(json!([
            {"lat": 1.0, "lon": 2.0, "center_latitude": -7.0, "center_longitude": 110.0}
        ]));
        let fc = shape_spatial(Intent::Distance, &r, "q", &SpatialContext::default());
        assert_eq!(fc.features[0].geometry.coordinates, [110.0, -7.0]);

        let r = rows(json!([{"lat": 1.0, "lon": 2.0}]));
        let fc = shape_spatial(Intent::Distance, &r, "q", &SpatialContext::default());
        assert_eq!(fc.features[0].geometry.coordinates, [0.0, 0.0]);
    }

    #[test]
    fn out_of_range_row_center_is_skipped() {
        let r = rows(json!([
            {"lat": 1.0, "lon": 2.0, "center_latitude": 200.0, "center_longitude": -500.0}
        ]));
        let fc = shape_spatial(Intent::Distance, &r, "q", &SpatialContext::default());
        assert_eq!(fc.features[0].geometry.coordinates, [0.0, 0.0]);
        assert!(crate::geojson::validate_feature_collection(&serde_json::to_value(&fc).unwrap()));
    }

    #[test]
    fn non_spatial_intent_is_shaped_as_location() {
        let fc = shape_spatial(Intent::Ranking, &bandung(), "q", &SpatialContext::default());
        assert_eq!(fc.properties["intent"], json!("location"));
        assert!(!fc.properties.contains_key("heatmap"));
    }
}
