//! GTOPO30 tiles, distributed as `<root>/gtopo30/<tile>.tar.gz` archives.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;

use super::{shift_western_tiles, MOSAIC_IMAGE};
use crate::config::ElevationSource;
use crate::error::{ElevationError, Result};
use crate::gdal::{CommandRunner, GdalTools};
use crate::geo::BoundingBox;

/// Unpack a `.tar.gz` archive into `destination`.
fn extract_archive(archive: &Path, destination: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut tar = Archive::new(GzDecoder::new(file));
    tar.unpack(destination)?;
    Ok(())
}

/// Elevation files (`*.DEM`) in `dir`, sorted by name.
fn dem_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dems: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("dem"))
        })
        .collect();
    dems.sort();
    Ok(dems)
}

pub(super) fn prepare<R: CommandRunner>(
    source: &ElevationSource,
    tools: &GdalTools<R>,
    bounds: &BoundingBox,
    work_dir: &Path,
) -> Result<PathBuf> {
    let tiles = source.tiles(bounds);
    tracing::info!(tiles = %tiles.join(", "), "GTOPO30 tiles");

    let archives = tiles
        .iter()
        .map(|tile| {
            let path = source.tile_path(tile);
            if path.is_file() {
                Ok(path)
            } else {
                Err(ElevationError::FileNotFound { path })
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let tile_dir = work_dir.join("gtopo30");
    fs::create_dir_all(&tile_dir)?;
    for archive in &archives {
        tracing::debug!(archive = %archive.display(), "Extracting");
        extract_archive(archive, &tile_dir)?;
    }

    let mut dems = dem_files(&tile_dir)?;
    if dems.is_empty() {
        return Err(ElevationError::PartialCoverage {
            dataset: "GTOPO30",
            missing: tiles,
            expected: archives.len(),
        });
    }
    tracing::info!(
        files = %dems
            .iter()
            .filter_map(|d| d.file_name())
            .map(|n| n.to_string_lossy())
            .collect::<Vec<_>>()
            .join(", "),
        "GTOPO30 DEM files"
    );

    if bounds.crosses_antimeridian() {
        dems = shift_western_tiles(tools, dems, |stem| {
            stem.starts_with('W') || stem.starts_with('w')
        })?;
    }

    let mosaic = work_dir.join(MOSAIC_IMAGE);
    tools.mosaic(&dems, &mosaic)?;
    Ok(mosaic)
}
