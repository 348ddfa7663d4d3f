//! Scene metadata: ESPA and ARD XML documents and Landsat MTL files.

mod mtl;
mod xml;

pub use xml::{append_elevation_band, stage_elevation_band, ElevationBand, StagedMetadata};

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{ElevationError, Result};
use crate::extent::{GridOrigin, PixelSize, SceneExtent};
use crate::geo::BoundingBox;

/// Band names accepted as the ESPA reference band.
pub const ESPA_BAND_NAMES: [&str; 2] = ["b1", "sr_band1"];

/// Products accepted as the ESPA reference band.
pub const ESPA_PRODUCT_NAMES: [&str; 6] = ["L1T", "L1G", "L1TP", "L1GT", "L1GS", "sr_refl"];

/// Band names accepted as the ARD reference band. PIXELQA is present in all
/// ARD tile products.
pub const ARD_BAND_NAMES: [&str; 1] = ["PIXELQA"];

/// Products accepted as the ARD reference band.
pub const ARD_PRODUCT_NAMES: [&str; 1] = ["level2_qa"];

/// Layout of the metadata file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataSchema {
    /// `<espa_metadata>` document.
    Espa,
    /// `<ard_metadata>` document; the tile is described under `<tile_metadata>`.
    Ard,
    /// Landsat Level-1 `_MTL.txt`.
    Mtl,
}

impl MetadataSchema {
    /// Whether the elevation band is recorded back into the metadata.
    pub fn records_band(&self) -> bool {
        !matches!(self, MetadataSchema::Mtl)
    }

    fn accepts_reference(&self, name: &str, product: &str) -> bool {
        match self {
            MetadataSchema::Espa => {
                ESPA_BAND_NAMES.contains(&name) && ESPA_PRODUCT_NAMES.contains(&product)
            }
            MetadataSchema::Ard => {
                ARD_BAND_NAMES.contains(&name) && ARD_PRODUCT_NAMES.contains(&product)
            }
            MetadataSchema::Mtl => false,
        }
    }
}

/// Pixel size recorded for a band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandPixelSize {
    pub x: f64,
    pub y: f64,
    pub units: String,
}

/// A `<band>` entry of an XML document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BandInfo {
    pub product: String,
    pub name: String,
    pub file_name: String,
    pub pixel_size: Option<BandPixelSize>,
}

/// The band whose grid and projection the elevation band copies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceBand {
    pub name: String,
    /// Location of the raster, resolved against the metadata directory.
    pub path: PathBuf,
    pub pixel_size: BandPixelSize,
}

/// Everything the builder needs to know about a scene.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneMetadata {
    pub path: PathBuf,
    pub schema: MetadataSchema,
    pub product_id: String,
    /// Geographic footprint in degrees.
    pub bounds: BoundingBox,
    /// Projected upper-left corner `(x, y)`.
    pub upper_left: (f64, f64),
    /// Projected lower-right corner `(x, y)`.
    pub lower_right: (f64, f64),
    pub grid_origin: GridOrigin,
    pub reference: ReferenceBand,
}

impl SceneMetadata {
    /// Read an ESPA or ARD XML document.
    pub fn from_xml<P: AsRef<Path>>(path: P) -> Result<Self> {
        xml::parse_file(path.as_ref())
    }

    /// Read a Landsat MTL file.
    pub fn from_mtl<P: AsRef<Path>>(path: P) -> Result<Self> {
        mtl::parse_file(path.as_ref())
    }

    /// Directory containing the metadata file.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn pixel_size(&self) -> PixelSize {
        PixelSize::new(self.reference.pixel_size.x, self.reference.pixel_size.y)
    }

    /// Units of the scene grid (`meters`, `degrees`, ...).
    pub fn pixel_units(&self) -> &str {
        &self.reference.pixel_size.units
    }

    /// Whether the scene grid is geographic rather than projected.
    pub fn is_geographic(&self) -> bool {
        let units = self.pixel_units().to_ascii_lowercase();
        units.starts_with("deg")
    }

    /// Projected extent of the scene from its corner points.
    pub fn extent(&self) -> Result<SceneExtent> {
        SceneExtent::new(
            self.upper_left.0,
            self.lower_right.0,
            self.lower_right.1,
            self.upper_left.1,
            self.pixel_size(),
            self.grid_origin,
        )
    }

    /// Default location of the elevation raster, next to the metadata.
    pub fn default_elevation_image(&self) -> PathBuf {
        self.dir()
            .join(format!("{}_elevation.img", self.product_id))
    }
}

/// Pick the reference band from a document's bands.
///
/// The first band with an accepted name and product whose file exists wins.
fn select_reference(
    schema: MetadataSchema,
    bands: &[BandInfo],
    metadata_path: &Path,
) -> Result<ReferenceBand> {
    let dir = metadata_path.parent().unwrap_or_else(|| Path::new("."));

    for band in bands {
        if !schema.accepts_reference(&band.name, &band.product) {
            continue;
        }
        let path = dir.join(&band.file_name);
        if !path.is_file() {
            tracing::debug!(band = %band.name, path = %path.display(), "Reference band file missing");
            continue;
        }
        let pixel_size = band.pixel_size.clone().ok_or_else(|| {
            ElevationError::metadata(
                metadata_path,
                format!("band '{}' has no pixel_size", band.name),
            )
        })?;
        return Ok(ReferenceBand {
            name: band.name.clone(),
            path,
            pixel_size,
        });
    }

    Err(ElevationError::metadata(
        metadata_path,
        "Supported bands not found in XML file",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn band(name: &str, product: &str, file_name: &str) -> BandInfo {
        BandInfo {
            product: product.to_string(),
            name: name.to_string(),
            file_name: file_name.to_string(),
            pixel_size: Some(BandPixelSize {
                x: 30.0,
                y: 30.0,
                units: "meters".to_string(),
            }),
        }
    }

    #[test]
    fn test_select_reference_requires_file() {
        let temp_dir = TempDir::new().unwrap();
        let xml = temp_dir.path().join("scene.xml");
        fs::write(temp_dir.path().join("sr_band1.img"), b"").unwrap();

        let bands = vec![
            band("b1", "L1TP", "b1.img"),
            band("sr_band1", "sr_refl", "sr_band1.img"),
        ];
        let reference = select_reference(MetadataSchema::Espa, &bands, &xml).unwrap();
        assert_eq!(reference.name, "sr_band1");
        assert_eq!(reference.path, temp_dir.path().join("sr_band1.img"));
    }

    #[test]
    fn test_select_reference_by_schema() {
        let temp_dir = TempDir::new().unwrap();
        let xml = temp_dir.path().join("tile.xml");
        fs::write(temp_dir.path().join("qa.tif"), b"").unwrap();

        let bands = vec![band("PIXELQA", "level2_qa", "qa.tif")];
        assert!(select_reference(MetadataSchema::Ard, &bands, &xml).is_ok());
        assert!(matches!(
            select_reference(MetadataSchema::Espa, &bands, &xml),
            Err(ElevationError::Metadata { .. })
        ));

        // Right name, wrong product
        let bands = vec![band("b1", "toa_refl", "qa.tif")];
        assert!(select_reference(MetadataSchema::Espa, &bands, &xml).is_err());
    }

    #[test]
    fn test_schema_records_band() {
        assert!(MetadataSchema::Espa.records_band());
        assert!(MetadataSchema::Ard.records_band());
        assert!(!MetadataSchema::Mtl.records_band());
    }
}
