//! End-to-end generation of a scene's elevation band.
//!
//! [`ElevationBuilder`] ties the pieces together:
//!
//! 1. read the scene metadata and work out the output grid,
//! 2. pick and prepare an elevation source, falling back to GTOPO30 when the
//!    preferred dataset has nothing for the scene,
//! 3. warp the source onto the scene grid as Int16 ENVI,
//! 4. convert geoid heights to ellipsoid heights for GLS and GTOPO30,
//! 5. stage the XML metadata with the new band, then install the raster
//!    and commit the metadata.
//!
//! Intermediate files live in a temporary directory next to the output and
//! are removed whether or not the build succeeds.
//!
//! ```ignore
//! use espa_elevation::{BuildRequest, ElevationBuilder, ElevationConfig};
//!
//! let config = ElevationConfig::builder("/usr/local/espa/elevation").build()?;
//! let builder = ElevationBuilder::new(config);
//! let product = builder.generate(&BuildRequest::xml("LC08_L1TP_038029.xml"))?;
//! println!("{} from {}", product.image.display(), product.source);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use crate::config::{ElevationConfig, SourceKind};
use crate::error::Result;
use crate::extent::{ExtentOverride, GridOrigin, SceneExtent, WarpTarget};
use crate::gdal::{CommandRunner, GdalTools, SystemRunner};
use crate::geo::BoundingBox;
use crate::geoid;
use crate::metadata::{stage_elevation_band, BandPixelSize, ElevationBand, SceneMetadata};
use crate::product::{ElevationProduct, ProductWriter};
use crate::sources::{self, PreparedSource, SourcePlan};

/// Name of the warped elevation raster inside the working directory.
const STAGED_IMAGE: &str = "elevation.img";

/// Prefix of the per-build working directory.
const WORK_DIR_PREFIX: &str = ".elevation-";

/// Where the scene description comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataInput {
    /// ESPA or ARD XML document.
    Xml(PathBuf),
    /// Landsat MTL file.
    Mtl(PathBuf),
}

impl MetadataInput {
    pub fn path(&self) -> &Path {
        match self {
            MetadataInput::Xml(path) | MetadataInput::Mtl(path) => path,
        }
    }

    pub fn load(&self) -> Result<SceneMetadata> {
        match self {
            MetadataInput::Xml(path) => SceneMetadata::from_xml(path),
            MetadataInput::Mtl(path) => SceneMetadata::from_mtl(path),
        }
    }
}

/// A single build invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRequest {
    pub metadata: MetadataInput,
    /// Output raster; defaults to `<product_id>_elevation.img` next to the
    /// metadata.
    pub output: Option<PathBuf>,
    pub extent_override: Option<ExtentOverride>,
}

impl BuildRequest {
    pub fn xml(path: impl Into<PathBuf>) -> Self {
        Self::new(MetadataInput::Xml(path.into()))
    }

    pub fn mtl(path: impl Into<PathBuf>) -> Self {
        Self::new(MetadataInput::Mtl(path.into()))
    }

    pub fn new(metadata: MetadataInput) -> Self {
        Self {
            metadata,
            output: None,
            extent_override: None,
        }
    }

    /// Write the raster to `path` instead of the default location.
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Replace the scene footprint with user extents.
    pub fn extent_override(mut self, extent: ExtentOverride) -> Self {
        self.extent_override = Some(extent);
        self
    }
}

/// Everything a build decides before running any GDAL tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenePlan {
    pub scene: SceneMetadata,
    /// Extent of the output grid as given by the metadata or the user.
    pub extent: SceneExtent,
    /// Geographic footprint of the scene before padding.
    pub bounds: BoundingBox,
    pub sources: SourcePlan,
    pub output: PathBuf,
    /// `-te` values handed to `gdalwarp`.
    pub te: [f64; 4],
    pub samples: usize,
    pub lines: usize,
}

impl ScenePlan {
    /// Work out the output grid and the sources for `scene`.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::InvalidExtent`](crate::ElevationError::InvalidExtent) if the extent or the
    /// bounding box is invalid, or if a geographic scene would warp across
    /// the antimeridian.
    pub fn new(
        config: &ElevationConfig,
        scene: SceneMetadata,
        extent_override: Option<&ExtentOverride>,
        output: Option<&Path>,
    ) -> Result<Self> {
        let (extent, bounds) = match extent_override {
            Some(user) => (
                SceneExtent::new(
                    user.min_x,
                    user.max_x,
                    user.min_y,
                    user.max_y,
                    scene.pixel_size(),
                    GridOrigin::Corner,
                )?,
                user.bounds,
            ),
            None => (scene.extent()?, scene.bounds),
        };
        bounds.validate()?;
        if scene.is_geographic() {
            extent.ensure_geographic()?;
        }

        // The grid does not depend on the projection, only the srs string.
        let grid = WarpTarget::from_extent(&extent, "");
        let sources = SourcePlan::new(config, &bounds);
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| scene.default_elevation_image());

        Ok(Self {
            scene,
            extent,
            bounds,
            sources,
            output,
            te: grid.te,
            samples: grid.samples,
            lines: grid.lines,
        })
    }
}

/// Generates elevation bands for scenes.
///
/// The GDAL utilities are reached through a [`CommandRunner`], which is the
/// system one unless another is supplied with [`ElevationBuilder::with_runner`].
pub struct ElevationBuilder<R = SystemRunner> {
    config: ElevationConfig,
    tools: GdalTools<R>,
}

impl ElevationBuilder<SystemRunner> {
    pub fn new(config: ElevationConfig) -> Self {
        Self::with_runner(config, SystemRunner)
    }
}

impl<R: CommandRunner> ElevationBuilder<R> {
    pub fn with_runner(config: ElevationConfig, runner: R) -> Self {
        Self {
            config,
            tools: GdalTools::new(runner),
        }
    }

    pub fn config(&self) -> &ElevationConfig {
        &self.config
    }

    /// Plan a build without touching any dataset or running any tool.
    pub fn plan(&self, request: &BuildRequest) -> Result<ScenePlan> {
        let scene = request.metadata.load()?;
        ScenePlan::new(
            &self.config,
            scene,
            request.extent_override.as_ref(),
            request.output.as_deref(),
        )
    }

    /// Build the elevation band described by `request`.
    ///
    /// Nothing is written to the output paths unless every step succeeds.
    pub fn generate(&self, request: &BuildRequest) -> Result<ElevationProduct> {
        let plan = self.plan(request)?;
        let scene = &plan.scene;
        tracing::info!(
            metadata = %scene.path.display(),
            product_id = %scene.product_id,
            source = %plan.sources.primary,
            "Building elevation band"
        );

        let srs = self.tools.srs_proj4(&scene.reference.path)?;
        let target = WarpTarget::from_extent(&plan.extent, srs);
        tracing::debug!(
            te = ?target.te,
            samples = target.samples,
            lines = target.lines,
            srs = %target.srs,
            "Output grid"
        );

        let output_dir = match plan.output.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&output_dir)?;
        let work_dir = tempfile::Builder::new()
            .prefix(WORK_DIR_PREFIX)
            .tempdir_in(&output_dir)?;

        let prepared = self.prepare_source(&plan.sources, work_dir.path())?;

        let staged = work_dir.path().join(STAGED_IMAGE);
        self.tools
            .warp(&prepared.raster, &staged, &target, self.config.resampling())?;

        if prepared.kind.needs_geoid() {
            geoid::adjust_to_wgs84(&self.config, &self.tools, &target, &staged, work_dir.path())?;
        }

        let writer = ProductWriter::new(&plan.output);
        let band = scene.schema.records_band().then(|| {
            ElevationBand::new(
                prepared.kind,
                target.lines,
                target.samples,
                writer.relative_name(scene.dir()),
                BandPixelSize {
                    x: target.pixel.dx,
                    y: target.pixel.dy,
                    units: scene.pixel_units().to_string(),
                },
                Utc::now(),
            )
        });

        // The metadata is rewritten before the raster lands so that a bad
        // document leaves no output behind.
        let staged_metadata = band
            .as_ref()
            .map(|band| stage_elevation_band(&scene.path, band))
            .transpose()?;

        writer.install(&staged)?;
        if let Some(staged_metadata) = staged_metadata {
            if let Err(err) = staged_metadata.commit() {
                if let Err(cleanup) = writer.remove() {
                    tracing::warn!(error = %cleanup, "Failed to remove elevation band");
                }
                return Err(err);
            }
        }

        Ok(ElevationProduct {
            image: writer.image().to_path_buf(),
            header: writer.header().to_path_buf(),
            source: prepared.kind,
            target,
            band,
        })
    }

    /// Prepare the planned source, moving on to the fallback when the
    /// primary dataset has no data for the scene.
    fn prepare_source(&self, plan: &SourcePlan, work_dir: &Path) -> Result<PreparedSource> {
        let primary = plan.primary;
        match sources::prepare(primary, &self.config, &self.tools, &plan.bounds, work_dir) {
            Ok(prepared) => Ok(prepared),
            Err(err) if sources::triggers_fallback(primary, &err) => {
                let fallback = plan.fallback.ok_or(err)?;
                tracing::warn!(from = %primary, to = %fallback, "Falling back to another source");
                self.prepare_fallback(fallback, &plan.bounds, work_dir)
            }
            Err(err) => Err(err),
        }
    }

    fn prepare_fallback(
        &self,
        kind: SourceKind,
        bounds: &BoundingBox,
        work_dir: &Path,
    ) -> Result<PreparedSource> {
        sources::prepare(kind, &self.config, &self.tools, bounds, work_dir).map_err(|err| {
            tracing::error!(source = %kind, error = %err, "Fallback source failed");
            err
        })
    }
}

impl<R> std::fmt::Debug for ElevationBuilder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevationBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
