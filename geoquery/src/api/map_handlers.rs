use axum::response::Json;
use serde_json::{Value, json};

use super::success;
use crate::geojson::{INTENSITY_SOURCES, NEUTRAL_INTENSITY};

/// Static description of the GeoJSON produced by `/query-map`.
pub fn geojson_contract() -> Value {
    json!({
        "format": "GeoJSON (RFC 7946)",
        "coordinate_order": ["longitude", "latitude"],
        "feature_collection": {
            "type": "FeatureCollection",
            "bbox": "optional [minLon, minLat, maxLon, maxLat] over data features",
            "features": "array of Feature",
            "properties": {
                "count": "number of data features (rows without coordinates are dropped)",
                "total_rows": "rows returned by the database before dropping",
                "dropped": "rows without usable latitude/longitude",
                "query": "original question",
                "intent": "location | heatmap | distance",
                "generated_at": "ISO-8601 UTC timestamp"
            }
        },
        "feature": {
            "type": "Feature",
            "id": "optional, copied from the row's id column",
            "geometry": { "type": "Point", "coordinates": "[longitude, latitude]" },
            "properties": "all columns of the source row"
        },
        "coordinate_columns": {
            "latitude": ["latitude", "lat"],
            "longitude": ["longitude", "lon", "lng"]
        },
        "intents": {
            "location": "one Point per row",
            "heatmap": {
                "feature_properties": { "intensity": "min-max normalised value in [0, 1]" },
                "intensity_sources": INTENSITY_SOURCES,
                "fallback_intensity": NEUTRAL_INTENSITY,
                "collection_properties": {
                    "heatmap": true,
                    "intensity_range": "[min, max] of the source column"
                }
            },
            "distance": {
                "first_feature": "synthetic center with properties.type = \"center\"",
                "ordering": "remaining features by ascending properties.distance (km)",
                "collection_properties": { "center": "[longitude, latitude]" }
            }
        },
        "request": {
            "query": "natural-language question",
            "center_lat": "optional center latitude for distance queries",
            "center_lon": "optional center longitude for distance queries",
            "radius_km": "optional search radius for distance queries"
        },
        "response": {
            "intent": "string",
            "confidence": "number in [0, 1]",
            "sql_query": "executed SQL",
            "row_count": "rows returned by the database",
            "geojson": "FeatureCollection",
            "execution_time_ms": "integer",
            "valid_geojson": "false when the structural check failed; clients should not render"
        }
    })
}

// ---------- GET /map/schema ----------

pub async fn map_schema() -> Json<Value> {
    success("GeoJSON schema", geojson_contract())
}
