//! Geographic helpers: bounding boxes, longitude normalisation, affine
//! transforms and point-in-polygon tests.

use serde::Serialize;

use crate::error::{ElevationError, Result};

/// Latitude limits of the globe.
pub const NORTH_LATITUDE_LIMIT: f64 = 90.0;
pub const SOUTH_LATITUDE_LIMIT: f64 = -90.0;

/// A geographic bounding box in decimal degrees (WGS84).
///
/// `west` may be greater than `east` when the box crosses the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    /// Northern boundary latitude.
    pub north: f64,
    /// Southern boundary latitude.
    pub south: f64,
    /// Eastern boundary longitude.
    pub east: f64,
    /// Western boundary longitude.
    pub west: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Check that the box describes a real area on the globe.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::InvalidExtent`] if a bound is not finite,
    /// a latitude is outside ±90°, a longitude is outside ±180°, or the
    /// northern edge is not north of the southern edge.
    pub fn validate(&self) -> Result<()> {
        let bounds = [self.north, self.south, self.east, self.west];
        if bounds.iter().any(|v| !v.is_finite()) {
            return Err(ElevationError::InvalidExtent(format!(
                "non-finite bounding box N {} S {} E {} W {}",
                self.north, self.south, self.east, self.west
            )));
        }
        for lat in [self.north, self.south] {
            if !(SOUTH_LATITUDE_LIMIT..=NORTH_LATITUDE_LIMIT).contains(&lat) {
                return Err(ElevationError::InvalidExtent(format!(
                    "latitude {} is outside [-90, 90]",
                    lat
                )));
            }
        }
        for lon in [self.east, self.west] {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(ElevationError::InvalidExtent(format!(
                    "longitude {} is outside [-180, 180]",
                    lon
                )));
            }
        }
        if self.north <= self.south {
            return Err(ElevationError::InvalidExtent(format!(
                "north ({}) must be greater than south ({})",
                self.north, self.south
            )));
        }
        Ok(())
    }

    /// Grow the box by `degrees` on every side.
    ///
    /// Longitudes are brought back into `[-180, 180)`; latitudes are not
    /// clamped so that the source selection thresholds see the padded value.
    pub fn padded(&self, degrees: f64) -> Self {
        Self {
            north: self.north + degrees,
            south: self.south - degrees,
            east: longitude_norm(self.east + degrees),
            west: longitude_norm(self.west - degrees),
        }
    }

    /// Center of the box, not accounting for antimeridian wrapping.
    pub fn center(&self) -> (f64, f64) {
        ((self.west + self.east) / 2.0, (self.north + self.south) / 2.0)
    }

    /// True when the box starts east of the prime meridian and ends west of
    /// it, i.e. it wraps across the 180° meridian.
    pub fn crosses_antimeridian(&self) -> bool {
        (self.west.floor() as i32) > 0 && (self.east.floor() as i32) < 0
    }

    /// Corner points (lon, lat) in UL, UR, LR, LL order followed by the center.
    pub fn probe_points(&self) -> [(f64, f64); 5] {
        [
            (self.west, self.north),
            (self.east, self.north),
            (self.east, self.south),
            (self.west, self.south),
            self.center(),
        ]
    }
}

/// Calculate the canonical longitude in the range `[-180, 180)`.
///
/// # Examples
///
/// ```
/// use espa_elevation::geo::longitude_norm;
///
/// assert_eq!(longitude_norm(190.0), -170.0);
/// assert_eq!(longitude_norm(-181.0), 179.0);
/// assert_eq!(longitude_norm(180.0), -180.0);
/// ```
pub fn longitude_norm(longitude: f64) -> f64 {
    (longitude + 180.0).rem_euclid(360.0) - 180.0
}

/// GDAL affine transform `[ul_x, pixel_w, rot_x, ul_y, rot_y, pixel_h]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    /// Translate image (sample, line) coordinates into map coordinates.
    pub fn image_to_map(&self, image_x: f64, image_y: f64) -> (f64, f64) {
        let t = &self.0;
        (
            t[0] + image_x * t[1] + image_y * t[2],
            t[3] + image_x * t[4] + image_y * t[5],
        )
    }

    /// Closed footprint polygon through the centers of the four corner pixels.
    pub fn footprint(&self, samples: usize, lines: usize) -> Vec<(f64, f64)> {
        let last_x = samples.saturating_sub(1) as f64;
        let last_y = lines.saturating_sub(1) as f64;
        let ul = self.image_to_map(0.0, 0.0);
        vec![
            ul,
            self.image_to_map(last_x, 0.0),
            self.image_to_map(last_x, last_y),
            self.image_to_map(0.0, last_y),
            ul,
        ]
    }
}

/// Determine whether a point lies within a closed polygon.
///
/// Uses W. Randolph Franklin's crossing test. The vertex list must be closed
/// (`vertices[0] == vertices[n - 1]`) and hold at least four entries.
///
/// # Errors
///
/// Returns [`ElevationError::InvalidExtent`] for an open or degenerate polygon.
pub fn point_in_polygon(vertices: &[(f64, f64)], x: f64, y: f64) -> Result<bool> {
    if vertices.len() < 4 {
        return Err(ElevationError::InvalidExtent(
            "insufficient polygon line segments".to_string(),
        ));
    }
    if vertices.first() != vertices.last() {
        return Err(ElevationError::InvalidExtent(
            "not a closed polygon vertex list".to_string(),
        ));
    }

    let mut inside = false;
    for pair in vertices.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if (x0 > x) != (x1 > x) && y < (y1 - y0) * (x - x0) / (x1 - x0) + y0 {
            inside = !inside;
        }
    }

    Ok(inside)
}
