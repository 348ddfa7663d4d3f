//! Conversion of geoid-referenced heights to WGS84 ellipsoid heights.
//!
//! The geoid height grid is warped onto the scene grid and added, sample by
//! sample, to the elevation raster.

use std::path::Path;

use crate::config::ElevationConfig;
use crate::envi::{header_path, write_int16, EnviHeader, Int16Raster};
use crate::error::{ElevationError, Result};
use crate::extent::WarpTarget;
use crate::gdal::{CommandRunner, GdalTools};

/// Name of the warped geoid inside the working directory.
const WARPED_GEOID: &str = "geoid.img";

/// Add the geoid heights to every sample, saturating at the Int16 limits.
///
/// # Examples
///
/// ```
/// use espa_elevation::geoid::add_offsets;
///
/// let mut elevation = vec![100, -20, 32000];
/// add_offsets(&mut elevation, &[-15, 5, 1000]);
/// assert_eq!(elevation, vec![85, -15, i16::MAX]);
/// ```
pub fn add_offsets(elevation: &mut [i16], geoid: &[i16]) {
    for (value, offset) in elevation.iter_mut().zip(geoid) {
        *value = value.saturating_add(*offset);
    }
}

/// Warp the geoid to `target` and add it to the raster at `elevation_image`.
pub fn adjust_to_wgs84<R: CommandRunner>(
    config: &ElevationConfig,
    tools: &GdalTools<R>,
    target: &WarpTarget,
    elevation_image: &Path,
    work_dir: &Path,
) -> Result<()> {
    for path in [config.geoid_header(), config.geoid_image()] {
        if !path.is_file() {
            return Err(ElevationError::FileNotFound { path });
        }
    }

    let warped = work_dir.join(WARPED_GEOID);
    tools.warp(&config.geoid_image(), &warped, target, config.resampling())?;

    let geoid = Int16Raster::open_with_header(&warped)?;
    let header = EnviHeader::from_file(header_path(elevation_image))?;
    let elevation = Int16Raster::open(elevation_image, &header)?;

    if geoid.samples() != elevation.samples() || geoid.lines() != elevation.lines() {
        return Err(ElevationError::EnviHeader {
            path: header_path(&warped),
            message: format!(
                "geoid grid {}x{} does not match elevation grid {}x{}",
                geoid.samples(),
                geoid.lines(),
                elevation.samples(),
                elevation.lines()
            ),
        });
    }

    let mut values = elevation.values();
    let byte_order = elevation.byte_order();
    add_offsets(&mut values, &geoid.values());
    drop(elevation);

    write_int16(elevation_image, &values, byte_order)?;
    tracing::info!(samples = values.len(), "Adjusted elevation to the WGS84 ellipsoid");
    Ok(())
}
