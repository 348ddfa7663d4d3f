pub mod build;
pub mod plan;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args};
use espa_elevation::{BuildRequest, ElevationConfig, ElevationConfigBuilder, ExtentOverrideParts};

/// Scene and dataset arguments shared by every subcommand.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("metadata").required(true).args(["xml", "mtl"])))]
pub struct SceneArgs {
    /// ESPA or ARD XML metadata of the scene
    #[arg(long, visible_alias = "xml_filename", value_name = "FILE")]
    pub xml: Option<PathBuf>,

    /// Landsat MTL metadata of the scene
    #[arg(long, visible_alias = "mtl_filename", value_name = "FILE")]
    pub mtl: Option<PathBuf>,

    /// Output raster (default: <product_id>_elevation.img next to the metadata)
    #[arg(long, value_name = "FILE")]
    pub elevation: Option<PathBuf>,

    /// Root of the GLS, GTOPO30, RAMP and geoid datasets
    #[arg(long, value_name = "DIR")]
    pub elevation_dir: Option<PathBuf>,

    /// Fill missing GLS tiles with sea level instead of failing
    #[arg(long)]
    pub fill_missing_tiles: bool,

    /// Minimum projected x of the output (outer pixel edge)
    #[arg(long = "extent-minx", allow_hyphen_values = true, value_name = "X")]
    pub extent_minx: Option<f64>,

    /// Maximum projected x of the output (outer pixel edge)
    #[arg(long = "extent-maxx", allow_hyphen_values = true, value_name = "X")]
    pub extent_maxx: Option<f64>,

    /// Minimum projected y of the output (outer pixel edge)
    #[arg(long = "extent-miny", allow_hyphen_values = true, value_name = "Y")]
    pub extent_miny: Option<f64>,

    /// Maximum projected y of the output (outer pixel edge)
    #[arg(long = "extent-maxy", allow_hyphen_values = true, value_name = "Y")]
    pub extent_maxy: Option<f64>,

    /// Northern latitude of the output area
    #[arg(long = "nbound-lat", allow_hyphen_values = true, value_name = "DEG")]
    pub north_lat: Option<f64>,

    /// Southern latitude of the output area
    #[arg(long = "sbound-lat", allow_hyphen_values = true, value_name = "DEG")]
    pub south_lat: Option<f64>,

    /// Western longitude of the output area
    #[arg(long = "wbound-lon", allow_hyphen_values = true, value_name = "DEG")]
    pub west_lon: Option<f64>,

    /// Eastern longitude of the output area
    #[arg(long = "ebound-lon", allow_hyphen_values = true, value_name = "DEG")]
    pub east_lon: Option<f64>,
}

impl SceneArgs {
    /// Dataset configuration; `--elevation-dir` wins over the environment.
    pub fn config(&self) -> Result<ElevationConfig> {
        let builder = match &self.elevation_dir {
            Some(dir) => ElevationConfigBuilder::new(dir).env_overrides(),
            None => ElevationConfigBuilder::from_env()
                .context("Use --elevation-dir or set ESPA_ELEVATION_DIR")?,
        };
        let builder = if self.fill_missing_tiles {
            builder.fill_missing_tiles(true)
        } else {
            builder
        };
        builder
            .build()
            .context("Failed to configure elevation datasets")
    }

    pub fn request(&self) -> Result<BuildRequest> {
        let mut request = match (&self.xml, &self.mtl) {
            (Some(xml), _) => BuildRequest::xml(xml),
            (None, Some(mtl)) => BuildRequest::mtl(mtl),
            (None, None) => anyhow::bail!("Either --xml or --mtl is required"),
        };
        if let Some(elevation) = &self.elevation {
            request = request.output(elevation);
        }

        let parts = ExtentOverrideParts {
            min_x: self.extent_minx,
            max_x: self.extent_maxx,
            min_y: self.extent_miny,
            max_y: self.extent_maxy,
            north_lat: self.north_lat,
            south_lat: self.south_lat,
            west_lon: self.west_lon,
            east_lon: self.east_lon,
        };
        if let Some(extent) = parts.into_override()? {
            request = request.extent_override(extent);
        }
        Ok(request)
    }
}
