//! ENVI raw-binary rasters and their text headers.
//!
//! A header is a text file starting with `ENVI` followed by `key = value`
//! pairs. Values wrapped in braces may span several lines. Keys are matched
//! case-insensitively and written back in their original order.

use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::{ElevationError, Result};

/// ENVI data type code for signed 16-bit integers.
pub const DATA_TYPE_INT16: u32 = 2;

/// Fill value of the elevation band.
pub const ELEVATION_FILL_VALUE: i16 = -9999;

/// Band name recorded in the elevation header.
pub const ELEVATION_BAND_NAMES: &str = "{band 1 - elevation}";

/// Path of the header belonging to an ENVI image (`x.img` -> `x.hdr`).
pub fn header_path(image: &Path) -> PathBuf {
    image.with_extension("hdr")
}

/// Byte order of the raster samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// An ENVI header with its keys in file order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnviHeader {
    entries: Vec<(String, String)>,
}

impl EnviHeader {
    /// Parse header text. `path` is only used in error messages.
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let error = |message: String| ElevationError::EnviHeader {
            path: path.to_path_buf(),
            message,
        };

        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        match lines.next() {
            Some(first) if first.trim() == "ENVI" => {}
            _ => return Err(error("missing ENVI signature".to_string())),
        }

        let mut entries: Vec<(String, String)> = Vec::new();
        let mut open: Option<(String, String)> = None;

        for line in lines {
            if let Some((key, mut value)) = open.take() {
                value.push('\n');
                value.push_str(line.trim_end());
                if line.contains('}') {
                    entries.push((key, value));
                } else {
                    open = Some((key, value));
                }
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| error(format!("expected 'key = value', got '{}'", line.trim())))?;
            let key = key.trim().to_string();
            let value = value.trim().to_string();

            if value.starts_with('{') && !value.contains('}') {
                open = Some((key, value));
            } else {
                entries.push((key, value));
            }
        }

        if let Some((key, _)) = open {
            return Err(error(format!("unterminated value for '{}'", key)));
        }

        Ok(Self { entries })
    }

    /// Read and parse a header file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::parse(&text, path)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Replace the value of `key` in place, or append it.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    fn number<T: std::str::FromStr>(&self, key: &str) -> Result<T> {
        let value = self.get(key).ok_or_else(|| ElevationError::EnviHeader {
            path: PathBuf::new(),
            message: format!("missing '{}'", key),
        })?;
        value.trim().parse().map_err(|_| ElevationError::EnviHeader {
            path: PathBuf::new(),
            message: format!("invalid '{}' value '{}'", key, value),
        })
    }

    pub fn samples(&self) -> Result<usize> {
        self.number("samples")
    }

    pub fn lines(&self) -> Result<usize> {
        self.number("lines")
    }

    pub fn data_type(&self) -> Result<u32> {
        self.number("data type")
    }

    pub fn header_offset(&self) -> usize {
        self.number("header offset").unwrap_or(0)
    }

    pub fn byte_order(&self) -> ByteOrder {
        match self.number::<u32>("byte order") {
            Ok(1) => ByteOrder::Big,
            _ => ByteOrder::Little,
        }
    }

    /// Describe the raster as the Int16 elevation band.
    pub fn mark_elevation(&mut self) {
        self.set("data type", DATA_TYPE_INT16.to_string());
        self.set("band names", ELEVATION_BAND_NAMES);
        self.set("data ignore value", ELEVATION_FILL_VALUE.to_string());
    }

    /// Write the header to `path`.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_string())?;
        Ok(())
    }
}

impl fmt::Display for EnviHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ENVI")?;
        for (key, value) in &self.entries {
            writeln!(f, "{} = {}", key, value)?;
        }
        Ok(())
    }
}

/// A memory-mapped single band Int16 ENVI raster.
pub struct Int16Raster {
    /// Memory-mapped file data
    data: Mmap,
    samples: usize,
    lines: usize,
    offset: usize,
    byte_order: ByteOrder,
}

impl Int16Raster {
    /// Open `image` using the metadata from `header`.
    ///
    /// # Errors
    ///
    /// Returns an error if the header does not describe an Int16 raster or
    /// the file is smaller than the header claims.
    pub fn open<P: AsRef<Path>>(image: P, header: &EnviHeader) -> Result<Self> {
        let image = image.as_ref();
        let with_path = |e: ElevationError| match e {
            ElevationError::EnviHeader { message, .. } => ElevationError::EnviHeader {
                path: header_path(image),
                message,
            },
            other => other,
        };

        let samples = header.samples().map_err(with_path)?;
        let lines = header.lines().map_err(with_path)?;
        let data_type = header.data_type().map_err(with_path)?;
        if data_type != DATA_TYPE_INT16 {
            return Err(ElevationError::EnviHeader {
                path: header_path(image),
                message: format!("expected data type {}, found {}", DATA_TYPE_INT16, data_type),
            });
        }

        let file = File::open(image)?;

        // SAFETY: Memory mapping is safe as long as the file is not modified
        // while mapped. We open the file read-only and don't expose the mapping.
        let data = unsafe { Mmap::map(&file)? };

        let offset = header.header_offset();
        let needed = offset + samples * lines * 2;
        if data.len() < needed {
            return Err(ElevationError::EnviHeader {
                path: header_path(image),
                message: format!(
                    "{} is {} bytes, expected at least {}",
                    image.display(),
                    data.len(),
                    needed
                ),
            });
        }

        Ok(Self {
            data,
            samples,
            lines,
            offset,
            byte_order: header.byte_order(),
        })
    }

    /// Open an image with its sibling `.hdr` header.
    pub fn open_with_header<P: AsRef<Path>>(image: P) -> Result<Self> {
        let image = image.as_ref();
        let header = EnviHeader::from_file(header_path(image))?;
        Self::open(image, &header)
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// All samples in row-major order.
    pub fn values(&self) -> Vec<i16> {
        let end = self.offset + self.samples * self.lines * 2;
        self.data[self.offset..end]
            .chunks_exact(2)
            .map(|pair| match self.byte_order {
                ByteOrder::Little => i16::from_le_bytes([pair[0], pair[1]]),
                ByteOrder::Big => i16::from_be_bytes([pair[0], pair[1]]),
            })
            .collect()
    }
}

/// Write `values` as raw Int16 samples.
pub fn write_int16<P: AsRef<Path>>(path: P, values: &[i16], byte_order: ByteOrder) -> Result<()> {
    let bytes: Vec<u8> = values
        .iter()
        .flat_map(|v| match byte_order {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        })
        .collect();
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const GDAL_HEADER: &str = "ENVI
description = {
elevation.img}
samples = 3
lines = 2
bands = 1
header offset = 0
file type = ENVI Standard
data type = 2
interleave = bsq
byte order = 0
map info = {UTM, 1, 1, 100000, 4000600, 30, 30, 12, North,WGS-84}
band names = {
Band 1}
";

    #[test]
    fn test_parse_gdal_header() {
        let header = EnviHeader::parse(GDAL_HEADER, Path::new("elevation.hdr")).unwrap();
        assert_eq!(header.samples().unwrap(), 3);
        assert_eq!(header.lines().unwrap(), 2);
        assert_eq!(header.data_type().unwrap(), 2);
        assert_eq!(header.byte_order(), ByteOrder::Little);
        assert_eq!(header.get("DESCRIPTION"), Some("{\nelevation.img}"));
        assert_eq!(
            header.get("map info"),
            Some("{UTM, 1, 1, 100000, 4000600, 30, 30, 12, North,WGS-84}")
        );
    }

    #[test]
    fn test_parse_errors() {
        let path = Path::new("bad.hdr");
        assert!(EnviHeader::parse("samples = 3\n", path).is_err());
        assert!(EnviHeader::parse("ENVI\nsamples 3\n", path).is_err());
        assert!(EnviHeader::parse("ENVI\nband names = {\nBand 1\n", path).is_err());
    }

    #[test]
    fn test_mark_elevation_keeps_order() {
        let mut header = EnviHeader::parse(GDAL_HEADER, Path::new("x.hdr")).unwrap();
        header.set("data type", "4");
        header.mark_elevation();

        let keys: Vec<_> = header.keys().collect();
        assert_eq!(keys[6], "data type");
        assert_eq!(keys.last(), Some(&"data ignore value"));
        assert_eq!(header.get("band names"), Some("{band 1 - elevation}"));

        let text = header.to_string();
        assert!(text.starts_with("ENVI\ndescription = {\nelevation.img}\n"));
        assert!(text.contains("data type = 2\n"));
        assert!(text.ends_with("data ignore value = -9999\n"));
    }

    #[test]
    fn test_rewrite_is_byte_identical() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("elevation.hdr");

        let mut header = EnviHeader::parse(GDAL_HEADER, &path).unwrap();
        header.mark_elevation();
        header.write(&path).unwrap();
        let first = fs::read(&path).unwrap();

        let mut again = EnviHeader::from_file(&path).unwrap();
        again.mark_elevation();
        again.write(&path).unwrap();
        assert_eq!(first, fs::read(&path).unwrap());
    }

    #[test]
    fn test_raster_roundtrip_both_byte_orders() {
        let temp_dir = TempDir::new().unwrap();
        let image = temp_dir.path().join("elevation.img");
        let values = [1000, -5, 0, 32767, -9999, 42];

        let mut header = EnviHeader::parse(GDAL_HEADER, &image).unwrap();
        for order in [ByteOrder::Little, ByteOrder::Big] {
            header.set("byte order", if order == ByteOrder::Big { "1" } else { "0" });
            write_int16(&image, &values, order).unwrap();

            let raster = Int16Raster::open(&image, &header).unwrap();
            assert_eq!(raster.samples(), 3);
            assert_eq!(raster.byte_order(), order);
            assert_eq!(raster.values(), values);
        }
    }

    #[test]
    fn test_raster_size_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let image = temp_dir.path().join("short.img");
        write_int16(&image, &[1, 2, 3], ByteOrder::Little).unwrap();

        let header = EnviHeader::parse(GDAL_HEADER, &image).unwrap();
        match Int16Raster::open(&image, &header) {
            Err(ElevationError::EnviHeader { path, message }) => {
                assert_eq!(path, temp_dir.path().join("short.hdr"));
                assert!(message.contains("6 bytes"));
            }
            Err(other) => panic!("Expected EnviHeader error, got {:?}", other),
            Ok(_) => panic!("Expected EnviHeader error"),
        }
    }

    #[test]
    fn test_rejects_non_int16() {
        let temp_dir = TempDir::new().unwrap();
        let image = temp_dir.path().join("float.img");
        write_int16(&image, &[0; 6], ByteOrder::Little).unwrap();

        let mut header = EnviHeader::parse(GDAL_HEADER, &image).unwrap();
        header.set("data type", "4");
        assert!(Int16Raster::open(&image, &header).is_err());
    }
}
