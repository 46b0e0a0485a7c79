//! Feature-stream reader: turns a GeoJSON dataset into a lazy sequence of [`Feature`]s.

use crate::error::LoadError;
use crate::types::{id_key, Feature, Properties};
use geo::MultiPolygon;
use geojson::FeatureReader;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Property replaced by an entry from `localizedAdminNames`.
pub const NAME_PROPERTY: &str = "Name";

const EXTENSIONS: [&str; 2] = ["geojson", "json"];

/// Finds the dataset file for `layer`.
///
/// `datapath` is either the file itself or a directory holding `<layer>.geojson`
/// (or `<layer>.json`).
pub fn resolve_dataset(datapath: &Path, layer: &str) -> Result<PathBuf, LoadError> {
    if datapath.is_dir() {
        return EXTENSIONS
            .iter()
            .map(|ext| datapath.join(format!("{}.{}", layer, ext)))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| LoadError::UnsupportedFormat {
                path: datapath.to_path_buf(),
            });
    }

    let extension = datapath
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase());

    match extension.as_deref() {
        Some(ext) if EXTENSIONS.contains(&ext) => Ok(datapath.to_path_buf()),
        _ => Err(LoadError::UnsupportedFormat {
            path: datapath.to_path_buf(),
        }),
    }
}

/// Opens the dataset for `layer` and returns a lazy stream of its polygon features.
pub fn read_features(
    datapath: &Path,
    layer: &str,
    localized_names: Option<&Properties>,
    id_property: &str,
) -> Result<FeatureStream, LoadError> {
    let path = resolve_dataset(datapath, layer)?;
    let file = File::open(&path).map_err(|e| LoadError::Reader {
        path: path.clone(),
        message: e.to_string(),
    })?;

    debug!(layer, path = %path.display(), "opened dataset");

    let features = FeatureReader::from_reader(BufReader::new(file)).features();
    Ok(FeatureStream {
        path,
        features: Box::new(features),
        localized_names: localized_names.cloned(),
        id_property: id_property.to_string(),
    })
}

/// Iterator over the polygon features of one dataset.
///
/// Features without a polygonal geometry are skipped. A parse failure ends the
/// stream with an error.
pub struct FeatureStream {
    path: PathBuf,
    features: Box<dyn Iterator<Item = geojson::Result<geojson::Feature>> + Send>,
    localized_names: Option<Properties>,
    id_property: String,
}

impl FeatureStream {
    fn convert(&self, feature: geojson::Feature) -> Result<Option<Feature>, LoadError> {
        let geometry = match feature.geometry {
            Some(geometry) => geometry,
            None => return Ok(None),
        };

        let geometry: geo::Geometry<f64> =
            geometry.value.try_into().map_err(|e: geojson::Error| LoadError::Reader {
                path: self.path.clone(),
                message: format!("Failed to convert geojson geometry: {}", e),
            })?;

        let geometry = match geometry {
            geo::Geometry::MultiPolygon(mp) => mp,
            geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
            _ => return Ok(None),
        };

        let mut properties = feature.properties.unwrap_or_default();

        // Fall back to the feature-level id when the properties carry none.
        if !properties.contains_key(&self.id_property) {
            if let Some(id) = feature.id {
                let value = match id {
                    geojson::feature::Id::String(s) => serde_json::Value::String(s),
                    geojson::feature::Id::Number(n) => serde_json::Value::Number(n),
                };
                properties.insert(self.id_property.clone(), value);
            }
        }

        if let Some(names) = &self.localized_names {
            let localized = properties
                .get(&self.id_property)
                .and_then(id_key)
                .and_then(|id| names.get(&id))
                .and_then(|name| name.as_str())
                .map(str::to_string);
            if let Some(name) = localized {
                properties.insert(NAME_PROPERTY.to_string(), serde_json::Value::String(name));
            }
        }

        Ok(Some(Feature {
            geometry,
            properties,
        }))
    }
}

impl Iterator for FeatureStream {
    type Item = Result<Feature, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let feature = match self.features.next()? {
                Ok(feature) => feature,
                Err(e) => {
                    return Some(Err(LoadError::Reader {
                        path: self.path.clone(),
                        message: e.to_string(),
                    }))
                }
            };

            match self.convert(feature) {
                Ok(Some(feature)) => return Some(Ok(feature)),
                Ok(None) => {
                    debug!(path = %self.path.display(), "skipping non-polygon feature");
                    continue;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
