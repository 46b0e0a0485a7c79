use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

/// Open-ended property bag of one administrative unit.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// One polygon record as produced by the feature-stream reader.
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: MultiPolygon<f64>,
    pub properties: Properties,
}

/// A feature after partitioning: geometry plus the `Hierarchy`-only property set.
#[derive(Debug, Clone)]
pub struct LayerFeature {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    pub properties: Properties,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub longitude: f64,
    pub latitude: f64,
}

/// Renders an id property the way it is keyed in the side table.
///
/// Strings are used verbatim, numbers are stringified. Anything else is not a usable id.
pub fn id_key(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
