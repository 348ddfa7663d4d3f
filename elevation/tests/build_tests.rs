//! Full builds driven by a fake GDAL that writes real ENVI files.

use std::cell::RefCell;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use espa_elevation::config::SourceKind;
use espa_elevation::envi::{header_path, EnviHeader, Int16Raster};
use espa_elevation::gdal::{CommandRunner, ToolCommand};
use espa_elevation::{
    BuildRequest, ElevationBuilder, ElevationConfig, ElevationConfigBuilder, ElevationError,
    Result, SceneMetadata,
};
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;

const PROJ4: &str = "+proj=utm +zone=12 +datum=WGS84 +units=m +no_defs";

/// Height the fake writes for every elevation sample.
const ELEVATION: i16 = 100;

/// Height the fake writes for every geoid sample.
const GEOID: i16 = -10;

const SCENE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<espa_metadata version="2.2" xmlns="http://espa.cr.usgs.gov/v2">
    <global_metadata>
        <product_id>LC08_L1TP_038029_20180810_20180815_01_T1</product_id>
        <bounding_coordinates>
            <west>-111.7</west>
            <east>-110.9</east>
            <north>44.9</north>
            <south>44.1</south>
        </bounding_coordinates>
        <projection_information projection="UTM" datum="WGS84" units="meters">
            <corner_point location="UL" x="399900.000000" y="5000040.000000"/>
            <corner_point location="LR" x="400200.000000" y="4999740.000000"/>
            <grid_origin>CORNER</grid_origin>
        </projection_information>
    </global_metadata>
    <bands>
        <band product="L1TP" source="level1" name="b1" category="image" data_type="UINT16" nlines="10" nsamps="10">
            <short_name>LC08DN</short_name>
            <file_name>LC08_b1.img</file_name>
            <pixel_size x="30" y="30" units="meters"/>
        </band>
    </bands>
</espa_metadata>
"#;

const SCENE_MTL: &str = r#"GROUP = L1_METADATA_FILE
  GROUP = METADATA_FILE_INFO
    LANDSAT_SCENE_ID = "LC80380292018222LGN00"
  END_GROUP = METADATA_FILE_INFO
  GROUP = PRODUCT_METADATA
    CORNER_UL_LAT_PRODUCT = 44.9
    CORNER_UL_LON_PRODUCT = -111.7
    CORNER_UR_LAT_PRODUCT = 44.9
    CORNER_UR_LON_PRODUCT = -110.9
    CORNER_LL_LAT_PRODUCT = 44.1
    CORNER_LL_LON_PRODUCT = -111.7
    CORNER_LR_LAT_PRODUCT = 44.1
    CORNER_LR_LON_PRODUCT = -110.9
    CORNER_UL_PROJECTION_X_PRODUCT = 399915.000
    CORNER_UL_PROJECTION_Y_PRODUCT = 5000025.000
    CORNER_LR_PROJECTION_X_PRODUCT = 400185.000
    CORNER_LR_PROJECTION_Y_PRODUCT = 4999755.000
    FILE_NAME_BAND_1 = "LC08_B1.TIF"
  END_GROUP = PRODUCT_METADATA
  GROUP = PROJECTION_PARAMETERS
    GRID_CELL_SIZE_REFLECTIVE = 30.00
  END_GROUP = PROJECTION_PARAMETERS
END_GROUP = L1_METADATA_FILE
END
"#;

/// Stands in for the GDAL utilities.
///
/// `gdalwarp` onto a scene grid writes an Int16 ENVI raster sized from its
/// `-te`/`-tr` arguments, filled with [`GEOID`] when warping the geoid and
/// [`ELEVATION`] otherwise.
#[derive(Default)]
struct FakeGdal {
    commands: RefCell<Vec<ToolCommand>>,
    fail_scene_warp: bool,
    /// Metadata file cut short while the scene is being warped.
    truncate_metadata: Option<PathBuf>,
}

impl FakeGdal {
    fn failing() -> Self {
        Self {
            fail_scene_warp: true,
            ..Self::default()
        }
    }

    fn truncating(metadata: &Path) -> Self {
        Self {
            truncate_metadata: Some(metadata.to_path_buf()),
            ..Self::default()
        }
    }

    fn programs(&self) -> Vec<String> {
        self.commands
            .borrow()
            .iter()
            .map(|c| c.program.clone())
            .collect()
    }

    fn values_after(args: &[String], flag: &str, count: usize) -> Vec<f64> {
        let start = args.iter().position(|a| a == flag).unwrap() + 1;
        args[start..start + count]
            .iter()
            .map(|v| v.parse().unwrap())
            .collect()
    }

    fn warp(&self, command: &ToolCommand) -> Result<String> {
        let args = &command.args;
        let output = PathBuf::from(args.last().unwrap());

        if !args.iter().any(|a| a == "-te") {
            // Mosaic of source tiles; only its existence matters.
            fs::write(&output, b"")?;
            return Ok(String::new());
        }
        if self.fail_scene_warp {
            return Err(ElevationError::ToolFailed {
                command: command.to_string(),
                status: "returned error code [1]".to_string(),
                output: "ERROR 1: out of memory".to_string(),
            });
        }

        let te = Self::values_after(args, "-te", 4);
        let tr = Self::values_after(args, "-tr", 2);
        let samples = ((te[2] - te[0]) / tr[0]).round() as usize;
        let lines = ((te[3] - te[1]) / tr[1]).round() as usize;

        let source = &args[args.len() - 2];
        let value = if source.ends_with("geoid.img") {
            GEOID
        } else {
            ELEVATION
        };
        if let Some(metadata) = &self.truncate_metadata {
            let text = fs::read_to_string(metadata)?;
            let cut = text.find("</bands>").unwrap_or(text.len() / 2);
            fs::write(metadata, &text[..cut])?;
        }
        let bytes: Vec<u8> = std::iter::repeat(value.to_le_bytes())
            .take(samples * lines)
            .flatten()
            .collect();
        fs::write(&output, bytes)?;
        fs::write(
            header_path(&output),
            format!(
                "ENVI\ndescription = {{\n{}}}\nsamples = {}\nlines = {}\nbands = 1\n\
                 header offset = 0\nfile type = ENVI Standard\ndata type = 2\n\
                 interleave = bsq\nbyte order = 0\nband names = {{\nBand 1}}\n",
                output.display(),
                samples,
                lines
            ),
        )?;
        Ok(String::new())
    }
}

impl CommandRunner for FakeGdal {
    fn run(&self, command: &ToolCommand) -> Result<String> {
        self.commands.borrow_mut().push(command.clone());
        match command.program.as_str() {
            "gdalsrsinfo" => Ok(format!("'{}'\n", PROJ4)),
            "gdalwarp" => self.warp(command),
            other => panic!("unexpected program {}", other),
        }
    }
}

/// A scene directory and an elevation dataset root.
struct Fixture {
    scene: TempDir,
    dataset: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let scene = TempDir::new().unwrap();
        fs::write(scene.path().join("LC08_b1.img"), b"").unwrap();
        fs::write(scene.path().join("LC08_B1.TIF"), b"").unwrap();
        fs::write(scene.path().join("scene.xml"), SCENE_XML).unwrap();
        fs::write(scene.path().join("LC08_MTL.txt"), SCENE_MTL).unwrap();

        let dataset = TempDir::new().unwrap();
        let geoid = dataset.path().join("geoid");
        fs::create_dir_all(&geoid).unwrap();
        fs::write(geoid.join("geoid.img"), b"").unwrap();
        fs::write(geoid.join("geoid.hdr"), b"").unwrap();
        fs::create_dir_all(dataset.path().join("gls")).unwrap();
        fs::write(dataset.path().join("gls/gls_projection.prj"), b"GEOGCS").unwrap();

        Self { scene, dataset }
    }

    fn xml(&self) -> PathBuf {
        self.scene.path().join("scene.xml")
    }

    fn config(&self) -> ElevationConfig {
        ElevationConfigBuilder::new(self.dataset.path()).build().unwrap()
    }

    /// Planned files of `kind`, by name.
    fn planned(&self, kind: SourceKind) -> Vec<String> {
        let builder = ElevationBuilder::with_runner(self.config(), FakeGdal::default());
        builder
            .plan(&BuildRequest::xml(self.xml()))
            .unwrap()
            .sources
            .files
            .into_iter()
            .filter(|f| f.source == kind)
            .map(|f| f.name)
            .collect()
    }

    fn add_gls_tiles<'a>(&self, tiles: impl IntoIterator<Item = &'a String>) {
        let gls = self.dataset.path().join("gls");
        for tile in tiles {
            fs::write(gls.join(format!("{}.bil", tile)), b"").unwrap();
            fs::write(gls.join(format!("{}.hdr", tile)), b"").unwrap();
        }
    }

    fn add_gtopo30_archive(&self, tile: &str) {
        let dir = self.dataset.path().join("gtopo30");
        fs::create_dir_all(&dir).unwrap();
        let file = File::create(dir.join(format!("{}.tar.gz", tile))).unwrap();
        let mut archive = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        let data = b"DEM";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        archive
            .append_data(&mut header, format!("{}.DEM", tile.to_ascii_uppercase()), &data[..])
            .unwrap();
        archive.into_inner().unwrap().finish().unwrap();
    }

    /// Entries left in the scene directory by a build's working directory.
    fn leftover_work_dirs(&self) -> Vec<String> {
        fs::read_dir(self.scene.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".elevation-"))
            .collect()
    }
}

fn elevation_values(image: &Path) -> Vec<i16> {
    Int16Raster::open_with_header(image).unwrap().values()
}

#[test]
fn test_gls_build_with_geoid() {
    let fixture = Fixture::new();
    fixture.add_gls_tiles(&fixture.planned(SourceKind::Gls));

    let runner = FakeGdal::default();
    let builder = ElevationBuilder::with_runner(fixture.config(), &runner);
    let product = builder.generate(&BuildRequest::xml(fixture.xml())).unwrap();

    assert_eq!(product.source, SourceKind::Gls);
    assert_eq!(
        product.image,
        fixture
            .scene
            .path()
            .join("LC08_L1TP_038029_20180810_20180815_01_T1_elevation.img")
    );
    assert_eq!((product.target.samples, product.target.lines), (10, 10));
    assert_eq!(product.target.srs, PROJ4);
    assert_eq!(
        runner.programs(),
        vec!["gdalsrsinfo", "gdalwarp", "gdalwarp", "gdalwarp"]
    );

    let values = elevation_values(&product.image);
    assert_eq!(values.len(), 100);
    assert!(values.iter().all(|v| *v == ELEVATION + GEOID));

    let header = EnviHeader::from_file(&product.header).unwrap();
    assert_eq!(header.get("band names"), Some("{band 1 - elevation}"));
    assert_eq!(header.get("data ignore value"), Some("-9999"));

    let xml = fs::read_to_string(fixture.xml()).unwrap();
    assert!(xml.contains(r#"<band product="elevation" source="gls" name="elevation""#));
    assert!(xml.contains(
        "<file_name>LC08_L1TP_038029_20180810_20180815_01_T1_elevation.img</file_name>"
    ));
    assert!(fixture.leftover_work_dirs().is_empty());

    // The updated document still reads as the same scene
    let scene = SceneMetadata::from_xml(fixture.xml()).unwrap();
    assert_eq!(scene.reference.name, "b1");
}

#[test]
fn test_rerun_replaces_band_and_header() {
    let fixture = Fixture::new();
    fixture.add_gls_tiles(&fixture.planned(SourceKind::Gls));
    let runner = FakeGdal::default();
    let builder = ElevationBuilder::with_runner(fixture.config(), &runner);
    let request = BuildRequest::xml(fixture.xml());

    let first = builder.generate(&request).unwrap();
    let header = fs::read(&first.header).unwrap();
    let second = builder.generate(&request).unwrap();

    assert_eq!(header, fs::read(&second.header).unwrap());
    let xml = fs::read_to_string(fixture.xml()).unwrap();
    assert_eq!(xml.matches(r#"product="elevation""#).count(), 1);
}

#[test]
fn test_over_water_falls_back_to_gtopo30() {
    let fixture = Fixture::new();
    for tile in fixture.planned(SourceKind::Gtopo30) {
        fixture.add_gtopo30_archive(&tile);
    }

    let runner = FakeGdal::default();
    let builder = ElevationBuilder::with_runner(fixture.config(), &runner);
    let product = builder.generate(&BuildRequest::xml(fixture.xml())).unwrap();

    assert_eq!(product.source, SourceKind::Gtopo30);
    assert!(elevation_values(&product.image)
        .iter()
        .all(|v| *v == ELEVATION + GEOID));

    let xml = fs::read_to_string(fixture.xml()).unwrap();
    assert!(xml.contains(r#"source="gtopo30""#));
}

#[test]
fn test_partial_gls_coverage_fails_cleanly() {
    let fixture = Fixture::new();
    let tiles = fixture.planned(SourceKind::Gls);
    assert!(tiles.len() > 1);
    fixture.add_gls_tiles(&tiles[..1]);

    let runner = FakeGdal::default();
    let builder = ElevationBuilder::with_runner(fixture.config(), &runner);
    let err = builder
        .generate(&BuildRequest::xml(fixture.xml()))
        .unwrap_err();

    match err {
        ElevationError::PartialCoverage {
            missing, expected, ..
        } => {
            assert_eq!(expected, tiles.len());
            assert_eq!(missing, tiles[1..].to_vec());
        }
        other => panic!("Expected PartialCoverage, got {:?}", other),
    }
    assert!(fixture.leftover_work_dirs().is_empty());
    assert_eq!(fs::read_to_string(fixture.xml()).unwrap(), SCENE_XML);
}

#[test]
fn test_fill_missing_tiles_allows_partial_coverage() {
    let fixture = Fixture::new();
    let tiles = fixture.planned(SourceKind::Gls);
    fixture.add_gls_tiles(&tiles[..1]);

    let config = ElevationConfigBuilder::new(fixture.dataset.path())
        .fill_missing_tiles(true)
        .build()
        .unwrap();
    let builder = ElevationBuilder::with_runner(config, FakeGdal::default());
    let product = builder.generate(&BuildRequest::xml(fixture.xml())).unwrap();
    assert_eq!(product.source, SourceKind::Gls);
}

#[test]
fn test_failed_warp_leaves_no_output() {
    let fixture = Fixture::new();
    fixture.add_gls_tiles(&fixture.planned(SourceKind::Gls));

    let builder = ElevationBuilder::with_runner(fixture.config(), FakeGdal::failing());
    let request = BuildRequest::xml(fixture.xml());
    let output = builder.plan(&request).unwrap().output;

    let err = builder.generate(&request).unwrap_err();
    assert!(matches!(err, ElevationError::ToolFailed { .. }));
    assert!(err.to_string().contains("out of memory"));

    assert!(!output.exists());
    assert!(!header_path(&output).exists());
    assert!(fixture.leftover_work_dirs().is_empty());
    assert_eq!(fs::read_to_string(fixture.xml()).unwrap(), SCENE_XML);
}

#[test]
fn test_mtl_build_does_not_record_band() {
    let fixture = Fixture::new();
    fixture.add_gls_tiles(&fixture.planned(SourceKind::Gls));
    let mtl = fixture.scene.path().join("LC08_MTL.txt");

    let builder = ElevationBuilder::with_runner(fixture.config(), FakeGdal::default());
    let product = builder.generate(&BuildRequest::mtl(&mtl)).unwrap();

    assert!(product.band.is_none());
    assert_eq!(
        product.image,
        fixture.scene.path().join("LC80380292018222LGN00_elevation.img")
    );
    // Pixel-center corners 15 m inside the XML scene's edges give the same grid
    assert_eq!((product.target.samples, product.target.lines), (10, 10));
    assert_eq!(fs::read_to_string(&mtl).unwrap(), SCENE_MTL);
}

#[test]
fn test_output_override() {
    let fixture = Fixture::new();
    fixture.add_gls_tiles(&fixture.planned(SourceKind::Gls));
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("nested").join("dem.img");

    let builder = ElevationBuilder::with_runner(fixture.config(), FakeGdal::default());
    let product = builder
        .generate(&BuildRequest::xml(fixture.xml()).output(&output))
        .unwrap();

    assert_eq!(product.image, output);
    assert!(out_dir.path().join("nested").join("dem.hdr").is_file());
    let band = product.band.unwrap();
    assert_eq!(band.file_name, output.to_string_lossy());
}

#[test]
fn test_unreadable_metadata_leaves_no_output() {
    let fixture = Fixture::new();
    fixture.add_gls_tiles(&fixture.planned(SourceKind::Gls));

    let builder =
        ElevationBuilder::with_runner(fixture.config(), FakeGdal::truncating(&fixture.xml()));
    let request = BuildRequest::xml(fixture.xml());
    let output = builder.plan(&request).unwrap().output;

    assert!(builder.generate(&request).is_err());
    assert!(!output.exists());
    assert!(!header_path(&output).exists());
    assert!(fixture.leftover_work_dirs().is_empty());

    // Only the scene files and the truncated document remain
    let mut names: Vec<String> = fs::read_dir(fixture.scene.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["LC08_B1.TIF", "LC08_MTL.txt", "LC08_b1.img", "scene.xml"]);
}

#[test]
fn test_invalid_bounding_box_is_rejected() {
    let fixture = Fixture::new();
    fixture.add_gls_tiles(&fixture.planned(SourceKind::Gls));
    let xml = SCENE_XML
        .replace("<north>44.9</north>", "<north>44.0</north>")
        .replace("<west>-111.7</west>", "<west>1e300</west>");
    fs::write(fixture.xml(), &xml).unwrap();

    let runner = FakeGdal::default();
    let builder = ElevationBuilder::with_runner(fixture.config(), &runner);
    match builder.generate(&BuildRequest::xml(fixture.xml())) {
        Err(ElevationError::Metadata { .. }) => {}
        other => panic!("Expected Metadata error, got {:?}", other.map(|p| p.image)),
    }
    assert!(runner.programs().is_empty());
    assert!(fixture.leftover_work_dirs().is_empty());
    assert_eq!(fs::read_to_string(fixture.xml()).unwrap(), xml);
}
