//! RAMP Antarctic DEM.
//!
//! The dataset is a single polar stereographic raster. Before it is used the
//! scene corners and center are projected into the RAMP grid and at least
//! three of those five points must fall inside the raster footprint.

use std::path::PathBuf;

use crate::config::ElevationSource;
use crate::error::{ElevationError, Result};
use crate::gdal::{CommandRunner, GdalTools};
use crate::geo::{point_in_polygon, BoundingBox};

/// Points of the scene that must lie within the RAMP data.
const MIN_POINTS_INSIDE: usize = 3;

/// Used for the scene bounding box when the RAMP raster carries no
/// geographic coordinate system of its own.
const DEFAULT_GEOGRAPHIC_SRS: &str = "EPSG:4326";

/// Balanced `KEYWORD[...]` node of a WKT string, ignoring brackets inside
/// quoted names.
fn wkt_node<'a>(wkt: &'a str, keyword: &str) -> Option<&'a str> {
    let start = wkt.find(&format!("{}[", keyword))?;
    let mut depth = 0usize;
    let mut quoted = false;
    for (i, c) in wkt[start..].char_indices() {
        match c {
            '"' => quoted = !quoted,
            '[' | '(' if !quoted => depth += 1,
            ']' | ')' if !quoted => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&wkt[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Geographic coordinate system underlying a projected WKT definition.
///
/// WKT1 nests it as `GEOGCS[...]`; WKT2 as `BASEGEOGCRS[...]`, which is
/// returned renamed to a standalone `GEOGCRS[...]`.
fn geographic_cs(wkt: &str) -> Option<String> {
    if let Some(base) = wkt_node(wkt, "BASEGEOGCRS") {
        return Some(format!("GEOGCRS{}", &base["BASEGEOGCRS".len()..]));
    }
    wkt_node(wkt, "GEOGCS")
        .or_else(|| wkt_node(wkt, "GEOGCRS"))
        .map(str::to_string)
}

pub(super) fn prepare<R: CommandRunner>(
    source: &ElevationSource,
    tools: &GdalTools<R>,
    bounds: &BoundingBox,
) -> Result<PathBuf> {
    let name = source.tiles(bounds).into_iter().next().unwrap_or_default();
    let image = source.tile_path(&name);
    for path in [source.companion(&name, "hdr"), image.clone()] {
        if !path.is_file() {
            return Err(ElevationError::FileNotFound { path });
        }
    }

    let info = tools.info(&image)?;
    let wkt = info.wkt().ok_or_else(|| ElevationError::ToolOutput {
        tool: "gdalinfo",
        message: format!("{} has no coordinate system", image.display()),
    })?;

    let geographic = geographic_cs(wkt).unwrap_or_else(|| {
        tracing::debug!(
            default = DEFAULT_GEOGRAPHIC_SRS,
            "No geographic coordinate system in RAMP projection"
        );
        DEFAULT_GEOGRAPHIC_SRS.to_string()
    });

    let projected = tools.transform_points(&geographic, wkt, &bounds.probe_points())?;
    let footprint = info.transform().footprint(info.samples(), info.lines());

    let mut inside = 0;
    for &(x, y) in &projected {
        if point_in_polygon(&footprint, x, y)? {
            inside += 1;
        }
    }
    tracing::info!(inside, of = projected.len(), "RAMP overlap");

    if inside < MIN_POINTS_INSIDE {
        return Err(ElevationError::RampCoverage { points: inside });
    }
    Ok(image)
}
