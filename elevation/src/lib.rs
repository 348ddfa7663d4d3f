//! # ESPA Elevation
//!
//! Builds the elevation band that accompanies a Landsat scene in ESPA
//! processing: an Int16 ENVI raster of heights above the WGS84 ellipsoid,
//! on exactly the grid and projection of the scene's reference band.
//!
//! ## Datasets
//!
//! Elevations come from one of three datasets under a common root
//! (`ESPA_ELEVATION_DIR`):
//!
//! - **GLS**: 1°×1° tiles, the default wherever they exist
//! - **GTOPO30**: 40°×50° tiles, used beyond the GLS latitude range and as
//!   the fallback for the others
//! - **RAMP**: a single Antarctic raster for scenes south of 60°S
//!
//! GLS and GTOPO30 heights are relative to the geoid and are converted to
//! ellipsoid heights with the geoid grid stored in the same root.
//!
//! ## Quick Start
//!
//! ```ignore
//! use espa_elevation::{BuildRequest, ElevationBuilder, ElevationConfigBuilder};
//!
//! let config = ElevationConfigBuilder::from_env()?.build()?;
//! let product = ElevationBuilder::new(config)
//!     .generate(&BuildRequest::xml("/data/LC08_L1TP_038029_20200101.xml"))?;
//! println!("Wrote {}", product.image.display());
//! ```
//!
//! ## External tools
//!
//! Mosaicking, reprojection and coordinate transforms are done by the GDAL
//! command-line utilities (`gdalwarp`, `gdal_translate`, `gdalinfo`,
//! `gdalsrsinfo`, `gdaltransform`), which must be on `PATH`.

pub mod builder;
pub mod config;
pub mod envi;
pub mod error;
pub mod extent;
pub mod gdal;
pub mod geo;
pub mod geoid;
pub mod metadata;
pub mod product;
pub mod sources;
pub mod tiles;

// Re-export main types at crate root for convenience
pub use builder::{BuildRequest, ElevationBuilder, MetadataInput, ScenePlan};
pub use config::{ElevationConfig, ElevationConfigBuilder, ElevationSource, SourceKind};
pub use error::{ElevationError, ErrorKind, Result};
pub use extent::{ExtentOverride, ExtentOverrideParts, GridOrigin, PixelSize, SceneExtent, WarpTarget};
pub use geo::BoundingBox;
pub use metadata::{MetadataSchema, SceneMetadata};
pub use product::ElevationProduct;
