//! Elevation source selection and preparation.
//!
//! The padded scene box decides which dataset is tried first:
//!
//! | Padded box | Source | Fallback |
//! |------------|--------|----------|
//! | north ≤ 60°S | RAMP | GTOPO30 when RAMP does not cover the scene |
//! | entirely in (60°S, 53°S] or entirely ≥ 83°N | GTOPO30 | none |
//! | anywhere else | GLS | GTOPO30 when every GLS tile is missing |
//!
//! Preparing a source leaves a single raster in the working directory that
//! is then warped onto the scene grid.

mod gls;
mod gtopo30;
mod ramp;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{
    ElevationConfig, SourceKind, GLS_NORTH_LATITUDE, GLS_SOUTH_LATITUDE, RAMP_NORTH_LATITUDE,
};
use crate::error::{ElevationError, Result};
use crate::gdal::{CommandRunner, GdalTools};
use crate::geo::BoundingBox;

/// Name of the mosaic produced from tiled sources.
pub const MOSAIC_IMAGE: &str = "mosaic.img";

/// Offset applied to western tiles of scenes spanning the antimeridian.
const ANTIMERIDIAN_SHIFT: f64 = 360.0;

fn in_gls_south_gap(lat: f64) -> bool {
    lat <= GLS_SOUTH_LATITUDE && lat > RAMP_NORTH_LATITUDE
}

/// Choose the first dataset to try for a padded bounding box.
///
/// # Examples
///
/// ```
/// use espa_elevation::config::SourceKind;
/// use espa_elevation::geo::BoundingBox;
/// use espa_elevation::sources::select_source;
///
/// assert_eq!(select_source(&BoundingBox::new(45.2, 43.0, -109.0, -112.0)), SourceKind::Gls);
/// assert_eq!(select_source(&BoundingBox::new(-70.0, -72.0, 10.0, 5.0)), SourceKind::Ramp);
/// assert_eq!(select_source(&BoundingBox::new(84.0, 83.0, 10.0, 5.0)), SourceKind::Gtopo30);
/// ```
pub fn select_source(bounds: &BoundingBox) -> SourceKind {
    if bounds.north <= RAMP_NORTH_LATITUDE {
        SourceKind::Ramp
    } else if (in_gls_south_gap(bounds.north) && in_gls_south_gap(bounds.south))
        || (bounds.north >= GLS_NORTH_LATITUDE && bounds.south >= GLS_NORTH_LATITUDE)
    {
        SourceKind::Gtopo30
    } else {
        SourceKind::Gls
    }
}

/// Dataset to use when `kind` cannot serve the scene.
pub fn fallback_source(kind: SourceKind) -> Option<SourceKind> {
    match kind {
        SourceKind::Ramp | SourceKind::Gls => Some(SourceKind::Gtopo30),
        SourceKind::Gtopo30 => None,
    }
}

/// Whether `error` from preparing `kind` should move on to the fallback.
///
/// Over water only counts when there were tiles to look for.
pub fn triggers_fallback(kind: SourceKind, error: &ElevationError) -> bool {
    match (kind, error) {
        (SourceKind::Ramp, ElevationError::RampCoverage { .. }) => true,
        (SourceKind::Gls, ElevationError::OverWater { expected }) => *expected > 0,
        _ => false,
    }
}

/// A source raster ready to be warped.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSource {
    pub kind: SourceKind,
    pub raster: PathBuf,
}

/// Gather, and if needed mosaic, the data of `kind` covering `bounds`.
pub fn prepare<R: CommandRunner>(
    kind: SourceKind,
    config: &ElevationConfig,
    tools: &GdalTools<R>,
    bounds: &BoundingBox,
    work_dir: &Path,
) -> Result<PreparedSource> {
    let source = config.source(kind);
    tracing::info!(source = %kind, root = %source.root.display(), "Preparing elevation source");
    let raster = match kind {
        SourceKind::Gls => gls::prepare(config, &source, tools, bounds, work_dir)?,
        SourceKind::Gtopo30 => gtopo30::prepare(&source, tools, bounds, work_dir)?,
        SourceKind::Ramp => ramp::prepare(&source, tools, bounds)?,
    };
    Ok(PreparedSource { kind, raster })
}

/// Make `source` available at `destination`.
fn link_into(source: &Path, destination: &Path) -> Result<()> {
    if destination.exists() {
        fs::remove_file(destination)?;
    }
    #[cfg(unix)]
    std::os::unix::fs::symlink(source, destination)?;
    #[cfg(not(unix))]
    fs::copy(source, destination)?;
    Ok(())
}

/// Shift western-hemisphere rasters by +360° so a mosaic spanning the
/// antimeridian stays contiguous.
fn shift_western_tiles<R: CommandRunner>(
    tools: &GdalTools<R>,
    tiles: Vec<PathBuf>,
    is_western: impl Fn(&str) -> bool,
) -> Result<Vec<PathBuf>> {
    tiles
        .into_iter()
        .map(|tile| {
            let stem = tile
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !is_western(&stem) {
                return Ok(tile);
            }
            let shifted = tile.with_file_name(format!("{}_shifted.img", stem));
            tools.shift_longitude(&tile, &shifted, ANTIMERIDIAN_SHIFT)?;
            Ok(shifted)
        })
        .collect()
}

/// A tile or file the builder would read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFile {
    pub source: SourceKind,
    pub name: String,
    pub path: PathBuf,
    pub present: bool,
}

/// What a build would read, without running any tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcePlan {
    /// Padded geographic box used for selection.
    pub bounds: BoundingBox,
    pub primary: SourceKind,
    pub fallback: Option<SourceKind>,
    pub crosses_antimeridian: bool,
    pub files: Vec<SourceFile>,
}

impl SourcePlan {
    /// Plan the sources for a scene's (unpadded) geographic box.
    pub fn new(config: &ElevationConfig, scene_bounds: &BoundingBox) -> Self {
        let bounds = scene_bounds.padded(config.maxbox_padding());
        let primary = select_source(&bounds);
        let fallback = fallback_source(primary);

        let mut files = Vec::new();
        for kind in std::iter::once(primary).chain(fallback) {
            let source = config.source(kind);
            files.extend(source.tiles(&bounds).into_iter().map(|tile| {
                let path = source.tile_path(&tile);
                source_file(kind, tile, path)
            }));
        }

        Self {
            bounds,
            primary,
            fallback,
            crosses_antimeridian: bounds.crosses_antimeridian(),
            files,
        }
    }

    /// Files of the primary source that do not exist.
    pub fn missing_primary(&self) -> impl Iterator<Item = &SourceFile> {
        self.files
            .iter()
            .filter(move |f| f.source == self.primary && !f.present)
    }
}

fn source_file(source: SourceKind, name: String, path: PathBuf) -> SourceFile {
    let present = path.is_file();
    SourceFile {
        source,
        name,
        path,
        present,
    }
}
