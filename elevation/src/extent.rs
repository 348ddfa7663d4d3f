//! Scene extents and the pixel-origin correction.
//!
//! Scene metadata reports the projected extent of a scene either at the
//! centers of the outermost pixels ([`GridOrigin::Center`]) or at their outer
//! corners ([`GridOrigin::Corner`]). Everything downstream works in center
//! convention, so [`SceneExtent::resolve`] moves corner-referenced extents
//! inward by half a pixel before a [`WarpTarget`] is derived from them.
//!
//! # Example
//!
//! ```
//! use espa_elevation::extent::{GridOrigin, PixelSize, SceneExtent};
//!
//! let extent = SceneExtent::new(
//!     100_000.0, 100_300.0, 200_000.0, 200_300.0,
//!     PixelSize::new(30.0, 30.0),
//!     GridOrigin::Corner,
//! )?;
//! let resolved = extent.resolve();
//! assert_eq!(resolved.min_x, 100_015.0);
//! assert_eq!(resolved.max_x, 100_285.0);
//! # Ok::<(), espa_elevation::ElevationError>(())
//! ```

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{ElevationError, Result};
use crate::geo::BoundingBox;

/// Convention used by the reported extent coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GridOrigin {
    /// Coordinates reference the centers of the outermost pixels.
    Center,
    /// Coordinates reference the outer corners of the outermost pixels.
    Corner,
}

impl FromStr for GridOrigin {
    type Err = String;

    /// Parse the `<grid_origin>` value of ESPA/ARD metadata.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CENTER" => Ok(GridOrigin::Center),
            "UL" | "CORNER" => Ok(GridOrigin::Corner),
            other => Err(format!("unsupported grid origin '{}'", other)),
        }
    }
}

impl fmt::Display for GridOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridOrigin::Center => write!(f, "CENTER"),
            GridOrigin::Corner => write!(f, "CORNER"),
        }
    }
}

/// Pixel dimensions of the scene grid, always positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PixelSize {
    pub dx: f64,
    pub dy: f64,
}

impl PixelSize {
    pub fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }
}

/// A projected bounding box together with its pixel size and origin convention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SceneExtent {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub pixel: PixelSize,
    pub origin: GridOrigin,
}

impl SceneExtent {
    /// Create a validated extent.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::InvalidExtent`] if any coordinate is not
    /// finite, `min >= max` on either axis, the pixel size is not positive,
    /// or a corner-referenced extent is no larger than a single pixel.
    pub fn new(
        min_x: f64,
        max_x: f64,
        min_y: f64,
        max_y: f64,
        pixel: PixelSize,
        origin: GridOrigin,
    ) -> Result<Self> {
        let values = [min_x, max_x, min_y, max_y, pixel.dx, pixel.dy];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ElevationError::InvalidExtent(format!(
                "non-finite value in extent [{}, {}] x [{}, {}] with pixel size {} x {}",
                min_x, max_x, min_y, max_y, pixel.dx, pixel.dy
            )));
        }
        if pixel.dx <= 0.0 || pixel.dy <= 0.0 {
            return Err(ElevationError::InvalidExtent(format!(
                "pixel size must be positive, got {} x {}",
                pixel.dx, pixel.dy
            )));
        }
        if min_x >= max_x {
            return Err(ElevationError::InvalidExtent(format!(
                "min_x ({}) must be less than max_x ({})",
                min_x, max_x
            )));
        }
        if min_y >= max_y {
            return Err(ElevationError::InvalidExtent(format!(
                "min_y ({}) must be less than max_y ({})",
                min_y, max_y
            )));
        }
        if origin == GridOrigin::Corner && (max_x - min_x <= pixel.dx || max_y - min_y <= pixel.dy)
        {
            return Err(ElevationError::InvalidExtent(format!(
                "corner extent [{}, {}] x [{}, {}] must span more than one {} x {} pixel",
                min_x, max_x, min_y, max_y, pixel.dx, pixel.dy
            )));
        }

        Ok(Self {
            min_x,
            max_x,
            min_y,
            max_y,
            pixel,
            origin,
        })
    }

    /// Express this extent at pixel-center convention.
    ///
    /// Corner extents move inward by half a pixel on every side; center
    /// extents are returned unchanged.
    pub fn resolve(&self) -> SceneExtent {
        match self.origin {
            GridOrigin::Center => *self,
            GridOrigin::Corner => {
                let half_x = self.pixel.dx * 0.5;
                let half_y = self.pixel.dy * 0.5;
                SceneExtent {
                    min_x: self.min_x + half_x,
                    max_x: self.max_x - half_x,
                    min_y: self.min_y + half_y,
                    max_y: self.max_y - half_y,
                    pixel: self.pixel,
                    origin: GridOrigin::Center,
                }
            }
        }
    }

    /// Reject extents that do not fit a geographic (degree) grid.
    ///
    /// Longitudes outside [-180, 180] mean the box wraps the antimeridian,
    /// which cannot be warped as a single extent.
    pub fn ensure_geographic(&self) -> Result<()> {
        let (west, east, south, north) = match self.origin {
            GridOrigin::Corner => (self.min_x, self.max_x, self.min_y, self.max_y),
            GridOrigin::Center => (
                self.min_x - self.pixel.dx * 0.5,
                self.max_x + self.pixel.dx * 0.5,
                self.min_y - self.pixel.dy * 0.5,
                self.max_y + self.pixel.dy * 0.5,
            ),
        };
        if west < -180.0 || east > 180.0 {
            return Err(ElevationError::InvalidExtent(format!(
                "longitude range [{}, {}] crosses the antimeridian",
                west, east
            )));
        }
        if south < -90.0 || north > 90.0 {
            return Err(ElevationError::InvalidExtent(format!(
                "latitude range [{}, {}] exceeds +/-90 degrees",
                south, north
            )));
        }
        Ok(())
    }

    /// Center point of the extent.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) * 0.5,
            (self.min_y + self.max_y) * 0.5,
        )
    }
}

/// The output grid handed to `gdalwarp`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarpTarget {
    /// Outer edge extent: `(min_x, min_y, max_x, max_y)` as used by `-te`.
    pub te: [f64; 4],
    pub pixel: PixelSize,
    pub samples: usize,
    pub lines: usize,
    /// Target spatial reference (proj4).
    pub srs: String,
}

impl WarpTarget {
    /// Derive the warp grid from an extent, resolving its origin first.
    pub fn from_extent(extent: &SceneExtent, srs: impl Into<String>) -> Self {
        let centered = extent.resolve();
        let half_x = centered.pixel.dx * 0.5;
        let half_y = centered.pixel.dy * 0.5;

        let samples = ((centered.max_x - centered.min_x) / centered.pixel.dx).round() as usize + 1;
        let lines = ((centered.max_y - centered.min_y) / centered.pixel.dy).round() as usize + 1;

        Self {
            te: [
                centered.min_x - half_x,
                centered.min_y - half_y,
                centered.max_x + half_x,
                centered.max_y + half_y,
            ],
            pixel: centered.pixel,
            samples,
            lines,
            srs: srs.into(),
        }
    }
}

/// User-specified extents that replace the scene footprint.
///
/// The projected values are outer pixel edges; the geographic values drive
/// source and tile selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtentOverride {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub bounds: BoundingBox,
}

/// Raw, possibly incomplete, user extent values.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtentOverrideParts {
    pub min_x: Option<f64>,
    pub max_x: Option<f64>,
    pub min_y: Option<f64>,
    pub max_y: Option<f64>,
    pub north_lat: Option<f64>,
    pub south_lat: Option<f64>,
    pub west_lon: Option<f64>,
    pub east_lon: Option<f64>,
}

impl ExtentOverrideParts {
    /// Returns `Ok(None)` when no value was given and the override when all
    /// eight were given.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::Config`] naming the first missing value when
    /// only some of them were given, and [`ElevationError::InvalidExtent`]
    /// when the bounding box is not a valid geographic box.
    pub fn into_override(self) -> Result<Option<ExtentOverride>> {
        let named = [
            ("--extent-minx", self.min_x),
            ("--extent-maxx", self.max_x),
            ("--extent-miny", self.min_y),
            ("--extent-maxy", self.max_y),
            ("--nbound-lat", self.north_lat),
            ("--sbound-lat", self.south_lat),
            ("--wbound-lon", self.west_lon),
            ("--ebound-lon", self.east_lon),
        ];

        if named.iter().all(|(_, v)| v.is_none()) {
            return Ok(None);
        }
        if let Some((flag, _)) = named.iter().find(|(_, v)| v.is_none()) {
            return Err(ElevationError::Config(format!(
                "Must specify {} when specifying custom extents",
                flag
            )));
        }

        let value = |v: Option<f64>| v.unwrap_or_default();
        let bounds = BoundingBox::new(
            value(self.north_lat),
            value(self.south_lat),
            value(self.east_lon),
            value(self.west_lon),
        );
        bounds.validate()?;
        Ok(Some(ExtentOverride {
            min_x: value(self.min_x),
            max_x: value(self.max_x),
            min_y: value(self.min_y),
            max_y: value(self.max_y),
            bounds,
        }))
    }
}
