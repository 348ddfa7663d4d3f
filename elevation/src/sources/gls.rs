//! GLS tiles: `<root>/gls/<tile>.bil` + `.hdr`, all sharing
//! `gls_projection.prj`.

use std::fs;
use std::path::{Path, PathBuf};

use super::{link_into, shift_western_tiles, MOSAIC_IMAGE};
use crate::config::{ElevationConfig, ElevationSource};
use crate::error::{ElevationError, Result};
use crate::gdal::{CommandRunner, GdalTools};
use crate::geo::BoundingBox;
use crate::tiles::parse_gls_tile_name;

pub(super) fn prepare<R: CommandRunner>(
    config: &ElevationConfig,
    source: &ElevationSource,
    tools: &GdalTools<R>,
    bounds: &BoundingBox,
    work_dir: &Path,
) -> Result<PathBuf> {
    let tiles = source.tiles(bounds);
    let expected = tiles.len();

    let (present, missing): (Vec<String>, Vec<String>) = tiles
        .into_iter()
        .partition(|tile| source.tile_path(tile).is_file());

    tracing::info!(
        expected,
        present = present.len(),
        tiles = %present.join(", "),
        "GLS tiles"
    );

    if expected == 0 {
        return Err(ElevationError::InvalidExtent(format!(
            "no GLS tiles for bounding box N {} S {} E {} W {}",
            bounds.north, bounds.south, bounds.east, bounds.west
        )));
    }
    if present.is_empty() {
        return Err(ElevationError::OverWater { expected });
    }
    if !missing.is_empty() {
        if !config.fill_missing_tiles() {
            return Err(ElevationError::PartialCoverage {
                dataset: "GLS",
                missing,
                expected,
            });
        }
        tracing::warn!(
            missing = %missing.join(", "),
            "Filling missing GLS tiles with sea level"
        );
    }

    let projection = config.gls_projection();
    if !projection.is_file() {
        return Err(ElevationError::FileNotFound { path: projection });
    }

    let tile_dir = work_dir.join("gls");
    fs::create_dir_all(&tile_dir)?;

    let mut bil_files = Vec::with_capacity(present.len());
    for tile in &present {
        let header = source.companion(tile, "hdr");
        if !header.is_file() {
            return Err(ElevationError::FileNotFound { path: header });
        }

        let bil = tile_dir.join(format!("{}.bil", tile));
        link_into(&source.tile_path(tile), &bil)?;
        link_into(&header, &tile_dir.join(format!("{}.hdr", tile)))?;
        link_into(&projection, &tile_dir.join(format!("{}.prj", tile)))?;
        bil_files.push(bil);
    }

    if bounds.crosses_antimeridian() {
        bil_files = shift_western_tiles(tools, bil_files, |stem| {
            parse_gls_tile_name(stem).is_some_and(|(_, lon)| lon < 0)
        })?;
    }

    let mosaic = work_dir.join(MOSAIC_IMAGE);
    tools.mosaic(&bil_files, &mosaic)?;
    Ok(mosaic)
}
