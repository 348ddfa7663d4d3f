//! Dataset configuration.
//!
//! The elevation datasets live under a single root directory:
//!
//! ```text
//! $ESPA_ELEVATION_DIR/
//! ├── gls/        n45w112.bil, n45w112.hdr, ..., gls_projection.prj
//! ├── gtopo30/    w140n90.tar.gz, ...
//! ├── ramp/       ramp200dem_wgs_v2.img, ramp200dem_wgs_v2.hdr
//! └── geoid/      geoid.img, geoid.hdr
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{ElevationError, Result};
use crate::geo::BoundingBox;
use crate::tiles::{gls_tiles, gtopo30_tiles};

/// Environment variable naming the dataset root directory.
pub const ELEVATION_DIR_ENV: &str = "ESPA_ELEVATION_DIR";

/// Environment variable enabling sea-level fill of missing GLS tiles.
pub const FILL_MISSING_ENV: &str = "ESPA_ELEVATION_FILL_MISSING";

/// Default padding, in degrees, applied to the scene bounding box.
pub const DEFAULT_MAXBOX_PADDING: f64 = 0.2;

/// Default padding, in degrees, applied when choosing GTOPO30 tiles.
pub const DEFAULT_GTOPO30_PADDING: f64 = 1.0;

/// Version string recorded in the XML band.
pub const APP_VERSION: &str = concat!("ELEVATION_", env!("CARGO_PKG_VERSION"));

/// Scenes whose padded northern edge is at or below this latitude use RAMP.
pub const RAMP_NORTH_LATITUDE: f64 = -60.0;

/// GLS stops at 53°S: scenes entirely in (-60, -53] use GTOPO30.
pub const GLS_SOUTH_LATITUDE: f64 = -53.0;

/// GLS stops short of the pole: scenes entirely at or above 83°N use GTOPO30.
pub const GLS_NORTH_LATITUDE: f64 = 83.0;

const GLS_DIR: &str = "gls";
const GLS_PROJECTION: &str = "gls_projection.prj";
const GTOPO30_DIR: &str = "gtopo30";
const RAMP_DIR: &str = "ramp";
const RAMP_BASENAME: &str = "ramp200dem_wgs_v2";
const GEOID_DIR: &str = "geoid";
const GEOID_BASENAME: &str = "geoid";

/// The elevation datasets known to the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Global Land Survey DEM, 1° tiles, roughly 90 m.
    Gls,
    /// USGS GTOPO30, 30 arc-second global DEM.
    Gtopo30,
    /// Radarsat Antarctic Mapping Project DEM, 200 m polar stereographic.
    Ramp,
}

impl SourceKind {
    /// Lowercase name used for the XML `source` attribute.
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Gls => "gls",
            SourceKind::Gtopo30 => "gtopo30",
            SourceKind::Ramp => "ramp",
        }
    }

    /// Uppercase label used in logs and coverage errors.
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Gls => "GLS",
            SourceKind::Gtopo30 => "GTOPO30",
            SourceKind::Ramp => "RAMP",
        }
    }

    /// Whether elevations from this source need the geoid correction.
    pub fn needs_geoid(&self) -> bool {
        !matches!(self, SourceKind::Ramp)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// How a dataset is split into files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tiling {
    /// 1° x 1° tiles named by their south-west corner (`n44w112`).
    Degree,
    /// 40° x 50° tiles, 60° x 30° in the Antarctic row, chosen over the box
    /// grown by `padding` degrees.
    Gtopo30 { padding: f64 },
    /// One file for the whole dataset.
    Single { name: &'static str },
}

/// Read-only descriptor of an elevation dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElevationSource {
    pub kind: SourceKind,
    pub root: PathBuf,
    pub tiling: Tiling,
    /// Extension of the file that holds each tile.
    pub extension: &'static str,
    /// Native resolution in the native projection's units.
    pub resolution: f64,
    pub projection: &'static str,
}

impl ElevationSource {
    /// Names of the tiles covering `bounds`, in mosaic order.
    pub fn tiles(&self, bounds: &BoundingBox) -> Vec<String> {
        match self.tiling {
            Tiling::Degree => gls_tiles(bounds),
            Tiling::Gtopo30 { padding } => gtopo30_tiles(bounds, padding),
            Tiling::Single { name } => vec![name.to_string()],
        }
    }

    /// Location of the tile file named `tile`.
    pub fn tile_path(&self, tile: &str) -> PathBuf {
        self.root.join(format!("{}.{}", tile, self.extension))
    }

    /// Location of a companion file of `tile` with another extension.
    pub fn companion(&self, tile: &str, extension: &str) -> PathBuf {
        self.root.join(format!("{}.{}", tile, extension))
    }
}

/// Configuration shared by every stage of the builder.
#[derive(Debug, Clone)]
pub struct ElevationConfig {
    root: PathBuf,
    maxbox_padding: f64,
    gtopo30_padding: f64,
    resampling: String,
    fill_missing_tiles: bool,
}

impl ElevationConfig {
    /// Create a builder rooted at `root`.
    pub fn builder<P: AsRef<Path>>(root: P) -> ElevationConfigBuilder {
        ElevationConfigBuilder::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn maxbox_padding(&self) -> f64 {
        self.maxbox_padding
    }

    pub fn gtopo30_padding(&self) -> f64 {
        self.gtopo30_padding
    }

    /// `gdalwarp -r` method used for the final warp.
    pub fn resampling(&self) -> &str {
        &self.resampling
    }

    pub fn fill_missing_tiles(&self) -> bool {
        self.fill_missing_tiles
    }

    pub fn gls_dir(&self) -> PathBuf {
        self.root.join(GLS_DIR)
    }

    /// Shared projection file of every GLS tile.
    pub fn gls_projection(&self) -> PathBuf {
        self.gls_dir().join(GLS_PROJECTION)
    }

    pub fn gtopo30_dir(&self) -> PathBuf {
        self.root.join(GTOPO30_DIR)
    }

    pub fn geoid_image(&self) -> PathBuf {
        self.root.join(GEOID_DIR).join(format!("{}.img", GEOID_BASENAME))
    }

    pub fn geoid_header(&self) -> PathBuf {
        self.root.join(GEOID_DIR).join(format!("{}.hdr", GEOID_BASENAME))
    }

    /// Descriptor of the given dataset.
    pub fn source(&self, kind: SourceKind) -> ElevationSource {
        match kind {
            SourceKind::Gls => ElevationSource {
                kind,
                root: self.gls_dir(),
                tiling: Tiling::Degree,
                extension: "bil",
                resolution: 1.0 / 1200.0,
                projection: "EPSG:4326",
            },
            SourceKind::Gtopo30 => ElevationSource {
                kind,
                root: self.gtopo30_dir(),
                tiling: Tiling::Gtopo30 {
                    padding: self.gtopo30_padding,
                },
                extension: "tar.gz",
                resolution: 1.0 / 120.0,
                projection: "EPSG:4326",
            },
            SourceKind::Ramp => ElevationSource {
                kind,
                root: self.root.join(RAMP_DIR),
                tiling: Tiling::Single {
                    name: RAMP_BASENAME,
                },
                extension: "img",
                resolution: 200.0,
                projection: "Antarctic Polar Stereographic",
            },
        }
    }
}

/// Builder for [`ElevationConfig`].
///
/// # Example
///
/// ```no_run
/// use espa_elevation::ElevationConfigBuilder;
///
/// let config = ElevationConfigBuilder::from_env()?
///     .fill_missing_tiles(true)
///     .build()?;
/// # Ok::<(), espa_elevation::ElevationError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ElevationConfigBuilder {
    root: PathBuf,
    maxbox_padding: f64,
    gtopo30_padding: f64,
    resampling: String,
    fill_missing_tiles: bool,
}

impl ElevationConfigBuilder {
    /// Create a new builder with the specified dataset root.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            maxbox_padding: DEFAULT_MAXBOX_PADDING,
            gtopo30_padding: DEFAULT_GTOPO30_PADDING,
            resampling: "bilinear".to_string(),
            fill_missing_tiles: false,
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `ESPA_ELEVATION_DIR` | Root of the elevation datasets | Required |
    /// | `ESPA_ELEVATION_FILL_MISSING` | Fill missing GLS tiles with sea level (`true`/`1`) | false |
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::MissingEnv`] if `ESPA_ELEVATION_DIR` is not set.
    pub fn from_env() -> Result<Self> {
        let root = std::env::var(ELEVATION_DIR_ENV).map_err(|_| ElevationError::MissingEnv {
            var: ELEVATION_DIR_ENV,
        })?;

        Ok(Self::new(root).env_overrides())
    }

    /// Apply the optional environment variables to a builder whose root was
    /// chosen elsewhere.
    ///
    /// `ESPA_ELEVATION_FILL_MISSING` replaces the fill setting only when it
    /// is set.
    pub fn env_overrides(self) -> Self {
        match std::env::var(FILL_MISSING_ENV) {
            Ok(v) => self.fill_missing_tiles(v.eq_ignore_ascii_case("true") || v == "1"),
            Err(_) => self,
        }
    }

    /// Set the dataset root.
    ///
    /// Overrides the directory set in the constructor or from environment.
    pub fn root<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.root = path.as_ref().to_path_buf();
        self
    }

    /// Padding, in degrees, applied to the scene bounding box.
    pub fn maxbox_padding(mut self, degrees: f64) -> Self {
        self.maxbox_padding = degrees;
        self
    }

    /// Padding, in degrees, applied when selecting GTOPO30 tiles.
    pub fn gtopo30_padding(mut self, degrees: f64) -> Self {
        self.gtopo30_padding = degrees;
        self
    }

    /// Resampling method passed to `gdalwarp -r`.
    pub fn resampling(mut self, method: impl Into<String>) -> Self {
        self.resampling = method.into();
        self
    }

    /// Replace missing GLS tiles with sea level instead of failing.
    pub fn fill_missing_tiles(mut self, fill: bool) -> Self {
        self.fill_missing_tiles = fill;
        self
    }

    /// Build the [`ElevationConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::Config`] if the root is not a directory or a
    /// padding is negative.
    pub fn build(self) -> Result<ElevationConfig> {
        if !self.root.is_dir() {
            return Err(ElevationError::Config(format!(
                "elevation dataset directory {} does not exist",
                self.root.display()
            )));
        }
        if !(self.maxbox_padding >= 0.0 && self.gtopo30_padding >= 0.0) {
            return Err(ElevationError::Config(format!(
                "padding must be non-negative (maxbox {}, gtopo30 {})",
                self.maxbox_padding, self.gtopo30_padding
            )));
        }

        Ok(ElevationConfig {
            root: self.root,
            maxbox_padding: self.maxbox_padding,
            gtopo30_padding: self.gtopo30_padding,
            resampling: self.resampling,
            fill_missing_tiles: self.fill_missing_tiles,
        })
    }
}
