//! Landsat Level-1 `_MTL.txt` metadata.
//!
//! The file is a list of `KEY = VALUE` lines, grouped by `GROUP = ...` /
//! `END_GROUP = ...` markers and terminated by a bare `END`. Corner
//! coordinates in the MTL are pixel centers.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::{BandPixelSize, MetadataSchema, ReferenceBand, SceneMetadata};
use crate::error::{ElevationError, Result};
use crate::extent::GridOrigin;
use crate::geo::BoundingBox;

const NORTH_FIELDS: [&str; 2] = ["CORNER_UL_LAT_PRODUCT", "CORNER_UR_LAT_PRODUCT"];
const SOUTH_FIELDS: [&str; 2] = ["CORNER_LL_LAT_PRODUCT", "CORNER_LR_LAT_PRODUCT"];
const WEST_FIELDS: [&str; 2] = ["CORNER_UL_LON_PRODUCT", "CORNER_LL_LON_PRODUCT"];
const EAST_FIELDS: [&str; 2] = ["CORNER_UR_LON_PRODUCT", "CORNER_LR_LON_PRODUCT"];

/// Split MTL text into its key/value pairs, stopping at `END`.
fn read_fields(text: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line == "END" {
            break;
        }
        if let Some((key, value)) = line.split_once('=') {
            fields.insert(
                key.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            );
        }
    }
    fields
}

struct Fields<'a> {
    path: &'a Path,
    values: HashMap<String, String>,
}

impl Fields<'_> {
    fn text(&self, key: &str) -> Result<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ElevationError::metadata(self.path, format!("missing {} field", key))
            })
    }

    fn number(&self, key: &str) -> Result<f64> {
        let value = self.text(key)?;
        value.parse().map_err(|_| {
            ElevationError::metadata(self.path, format!("invalid {} value '{}'", key, value))
        })
    }

    /// Largest (`max`) or smallest value among `keys`.
    fn extreme(&self, keys: &[&str], max: bool) -> Result<f64> {
        let mut result: Option<f64> = None;
        for key in keys {
            let value = self.number(key)?;
            result = Some(match result {
                Some(r) if max => r.max(value),
                Some(r) => r.min(value),
                None => value,
            });
        }
        result.ok_or_else(|| ElevationError::metadata(self.path, "no corner fields requested"))
    }
}

pub(super) fn parse_file(path: &Path) -> Result<SceneMetadata> {
    let text = fs::read_to_string(path)?;
    parse_text(&text, path)
}

fn parse_text(text: &str, path: &Path) -> Result<SceneMetadata> {
    let fields = Fields {
        path,
        values: read_fields(text),
    };

    let bounds = BoundingBox::new(
        fields.extreme(&NORTH_FIELDS, true)?,
        fields.extreme(&SOUTH_FIELDS, false)?,
        fields.extreme(&EAST_FIELDS, true)?,
        fields.extreme(&WEST_FIELDS, false)?,
    );
    bounds
        .validate()
        .map_err(|e| ElevationError::metadata(path, e.to_string()))?;

    let upper_left = (
        fields.number("CORNER_UL_PROJECTION_X_PRODUCT")?,
        fields.number("CORNER_UL_PROJECTION_Y_PRODUCT")?,
    );
    let lower_right = (
        fields.number("CORNER_LR_PROJECTION_X_PRODUCT")?,
        fields.number("CORNER_LR_PROJECTION_Y_PRODUCT")?,
    );
    let cell_size = fields.number("GRID_CELL_SIZE_REFLECTIVE")?;
    let product_id = fields.text("LANDSAT_SCENE_ID")?.to_string();
    let band_file = fields.text("FILE_NAME_BAND_1")?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let band_path = dir.join(band_file);
    if !band_path.is_file() {
        return Err(ElevationError::metadata(
            path,
            format!("band 1 file {} not found", band_path.display()),
        ));
    }

    tracing::debug!(product_id = %product_id, band = %band_path.display(), "Parsed MTL metadata");

    Ok(SceneMetadata {
        path: path.to_path_buf(),
        schema: MetadataSchema::Mtl,
        product_id,
        bounds,
        upper_left,
        lower_right,
        grid_origin: GridOrigin::Center,
        reference: ReferenceBand {
            name: "FILE_NAME_BAND_1".to_string(),
            path: band_path,
            pixel_size: BandPixelSize {
                x: cell_size,
                y: cell_size,
                units: "meters".to_string(),
            },
        },
    })
}
