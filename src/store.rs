//! Layer store: splits each feature between the on-disk side table and the
//! in-memory collection used for indexing.
//!
//! Full property sets go to `wof-<layer>-data.json`, keyed by feature id. Only
//! `Hierarchy` stays in memory, so a worker's footprint tracks geometry size.

use crate::config::StoreConfig;
use crate::error::LoadError;
use crate::types::{id_key, Feature, LayerFeature, Properties};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Feature id → full property set, destined for disk.
pub type SideTable = BTreeMap<String, Properties>;

/// Deterministic side-table file name for a layer.
pub fn side_table_file_name(layer: &str) -> String {
    format!("wof-{}-data.json", layer)
}

pub fn side_table_path(dir: &Path, layer: &str) -> PathBuf {
    dir.join(side_table_file_name(layer))
}

/// Partitions `features` into a side table and a reduced in-memory collection.
///
/// Every feature must carry an id and a `Hierarchy` (keys taken from `config`);
/// ids must be unique within the layer.
pub fn ingest<I>(
    layer: &str,
    features: I,
    config: &StoreConfig,
) -> Result<(SideTable, Vec<LayerFeature>), LoadError>
where
    I: IntoIterator<Item = Result<Feature, LoadError>>,
{
    let mut side_table = SideTable::new();
    let mut reduced = Vec::new();

    for (index, feature) in features.into_iter().enumerate() {
        let Feature {
            geometry,
            properties,
        } = feature?;

        let id = properties
            .get(&config.id_property)
            .and_then(id_key)
            .ok_or_else(|| LoadError::MalformedFeature {
                index,
                reason: format!("missing `{}`", config.id_property),
            })?;

        let hierarchy = match properties.get(&config.hierarchy_property) {
            Some(value) if !value.is_null() => value.clone(),
            _ => {
                return Err(LoadError::MalformedFeature {
                    index,
                    reason: format!("missing `{}`", config.hierarchy_property),
                })
            }
        };

        if side_table.contains_key(&id) {
            return Err(LoadError::MalformedFeature {
                index,
                reason: format!("duplicate id {}", id),
            });
        }
        side_table.insert(id.clone(), properties);

        let mut minimal = Properties::new();
        minimal.insert(config.hierarchy_property.clone(), hierarchy);
        reduced.push(LayerFeature {
            id,
            geometry,
            properties: minimal,
        });
    }

    debug!(layer, features = reduced.len(), "partitioned layer");
    Ok((side_table, reduced))
}

/// Writes the side table for `layer` into `dir` and flushes it to stable storage.
///
/// The data lands in a `.tmp` sibling first and is renamed into place only after
/// `fsync`, so the final file either holds the full table or does not exist.
pub fn write_side_table(dir: &Path, layer: &str, table: &SideTable) -> Result<PathBuf, LoadError> {
    let path = side_table_path(dir, layer);
    let temp_path = path.with_extension("json.tmp");

    let file = File::create(&temp_path).map_err(|e| LoadError::io(&temp_path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, table)
        .map_err(|e| LoadError::io(&temp_path, e.into()))?;
    writer.flush().map_err(|e| LoadError::io(&temp_path, e))?;

    let file = writer
        .into_inner()
        .map_err(|e| LoadError::io(&temp_path, e.into_error()))?;
    file.sync_all().map_err(|e| LoadError::io(&temp_path, e))?;

    fs::rename(&temp_path, &path).map_err(|e| LoadError::io(&path, e))?;
    Ok(path)
}
