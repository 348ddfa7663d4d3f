//! Installing the finished elevation raster and its header.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::SourceKind;
use crate::envi::{header_path, EnviHeader};
use crate::error::Result;
use crate::extent::WarpTarget;
use crate::metadata::ElevationBand;

/// The output of a successful build.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationProduct {
    pub image: PathBuf,
    pub header: PathBuf,
    /// Dataset the elevations were taken from.
    pub source: SourceKind,
    pub target: WarpTarget,
    /// Band record added to the scene XML, if any.
    pub band: Option<ElevationBand>,
}

/// Moves a staged ENVI raster to its final location.
#[derive(Debug, Clone)]
pub struct ProductWriter {
    image: PathBuf,
    header: PathBuf,
}

impl ProductWriter {
    pub fn new(image: impl Into<PathBuf>) -> Self {
        let image = image.into();
        let header = header_path(&image);
        Self { image, header }
    }

    pub fn image(&self) -> &Path {
        &self.image
    }

    pub fn header(&self) -> &Path {
        &self.header
    }

    /// Rewrite a GDAL header so it describes the elevation band.
    ///
    /// The description is pinned to the final file name so the header does
    /// not depend on where the raster was staged.
    pub fn rewrite_header(&self, staged_header: &Path) -> Result<()> {
        let mut header = EnviHeader::from_file(staged_header)?;
        let name = self
            .image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        header.set("description", format!("{{{}}}", name));
        header.mark_elevation();
        header.write(staged_header)
    }

    /// Fix up the staged header and move image and header into place.
    pub fn install(&self, staged_image: &Path) -> Result<()> {
        let staged_header = header_path(staged_image);
        self.rewrite_header(&staged_header)?;

        move_file(staged_image, &self.image)?;
        move_file(&staged_header, &self.header)?;

        tracing::info!(
            image = %self.image.display(),
            header = %self.header.display(),
            "Wrote elevation band"
        );
        Ok(())
    }

    /// Delete an installed image and header. Missing files are ignored.
    pub fn remove(&self) -> Result<()> {
        for path in [&self.image, &self.header] {
            match fs::remove_file(path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }
        Ok(())
    }

    /// Name of the image as recorded in the metadata in `metadata_dir`.
    pub fn relative_name(&self, metadata_dir: &Path) -> String {
        self.image
            .strip_prefix(metadata_dir)
            .unwrap_or(&self.image)
            .to_string_lossy()
            .into_owned()
    }
}

/// Rename, falling back to copy and delete across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const STAGED_HEADER: &str = "ENVI
description = {
/tmp/out/.elevation-abc123/elevation.img}
samples = 10
lines = 10
bands = 1
header offset = 0
file type = ENVI Standard
data type = 2
interleave = bsq
byte order = 0
band names = {
Band 1}
";

    fn stage(dir: &Path) -> PathBuf {
        let staged = dir.join("elevation.img");
        fs::write(&staged, vec![0u8; 200]).unwrap();
        fs::write(header_path(&staged), STAGED_HEADER).unwrap();
        staged
    }

    #[test]
    fn test_install_moves_and_rewrites() {
        let out = TempDir::new().unwrap();
        let work = TempDir::new_in(out.path()).unwrap();
        let staged = stage(work.path());

        let writer = ProductWriter::new(out.path().join("LC08_elevation.img"));
        assert_eq!(writer.header(), out.path().join("LC08_elevation.hdr"));
        writer.install(&staged).unwrap();

        assert!(!staged.exists());
        assert_eq!(fs::read(writer.image()).unwrap().len(), 200);

        let header = fs::read_to_string(writer.header()).unwrap();
        assert!(header.starts_with("ENVI\ndescription = {LC08_elevation.img}\n"));
        assert!(header.contains("band names = {band 1 - elevation}\n"));
        assert!(header.ends_with("data ignore value = -9999\n"));
    }

    #[test]
    fn test_reinstall_is_byte_identical() {
        let out = TempDir::new().unwrap();
        let writer = ProductWriter::new(out.path().join("scene_elevation.img"));

        let first_work = TempDir::new_in(out.path()).unwrap();
        writer.install(&stage(first_work.path())).unwrap();
        let first = fs::read(writer.header()).unwrap();

        let second_work = TempDir::new_in(out.path()).unwrap();
        writer.install(&stage(second_work.path())).unwrap();
        assert_eq!(first, fs::read(writer.header()).unwrap());
    }

    #[test]
    fn test_remove_installed() {
        let temp_dir = TempDir::new().unwrap();
        let writer = ProductWriter::new(temp_dir.path().join("scene_elevation.img"));
        fs::write(writer.image(), b"data").unwrap();

        // The header was never written
        writer.remove().unwrap();
        assert!(!writer.image().exists());
        assert!(!writer.header().exists());
        writer.remove().unwrap();
    }

    #[test]
    fn test_relative_name() {
        let writer = ProductWriter::new("/data/scene/LC08_elevation.img");
        assert_eq!(writer.relative_name(Path::new("/data/scene")), "LC08_elevation.img");
        assert_eq!(
            writer.relative_name(Path::new("/elsewhere")),
            "/data/scene/LC08_elevation.img"
        );
    }
}
