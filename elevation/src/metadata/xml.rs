//! ESPA and ARD XML metadata.
//!
//! Both documents are read with a streaming `quick_xml` reader that tracks the
//! element path; the elevation band is added by copying the document event
//! by event and emitting the new `<band>` just before `</bands>`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tempfile::NamedTempFile;

use super::{select_reference, BandInfo, BandPixelSize, MetadataSchema, SceneMetadata};
use crate::config::{SourceKind, APP_VERSION};
use crate::envi::ELEVATION_FILL_VALUE;
use crate::error::{ElevationError, Result};
use crate::geo::BoundingBox;

const ELEVATION_PRODUCT: &str = "elevation";

/// Values collected from a document before validation.
#[derive(Debug, Default)]
struct Document {
    schema: Option<MetadataSchema>,
    product_id: Option<String>,
    scene_id: Option<String>,
    north: Option<f64>,
    south: Option<f64>,
    east: Option<f64>,
    west: Option<f64>,
    upper_left: Option<(f64, f64)>,
    lower_right: Option<(f64, f64)>,
    grid_origin: Option<String>,
    bands: Vec<BandInfo>,
}

fn schema_for_root(root: &str) -> Option<MetadataSchema> {
    match root {
        "espa_metadata" => Some(MetadataSchema::Espa),
        "ard_metadata" => Some(MetadataSchema::Ard),
        _ => None,
    }
}

/// Element path of `<global_metadata>` for a schema.
fn global_path(schema: MetadataSchema) -> &'static [&'static str] {
    match schema {
        MetadataSchema::Ard => &["ard_metadata", "tile_metadata", "global_metadata"],
        _ => &["espa_metadata", "global_metadata"],
    }
}

/// Element path of `<bands>` for a schema.
fn bands_path(schema: MetadataSchema) -> &'static [&'static str] {
    match schema {
        MetadataSchema::Ard => &["ard_metadata", "tile_metadata", "bands"],
        _ => &["espa_metadata", "bands"],
    }
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attributes(e: &BytesStart) -> Result<Vec<(String, String)>> {
    e.attributes()
        .map(|attr| {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            Ok((key, value))
        })
        .collect()
}

fn attribute<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn path_is(stack: &[String], expected: &[&str]) -> bool {
    stack.len() == expected.len() && stack.iter().zip(expected).all(|(a, b)| a == b)
}

fn number<T: std::str::FromStr>(path: &Path, what: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ElevationError::metadata(path, format!("invalid {} value '{}'", what, value.trim()))
    })
}

impl Document {
    /// Handle an opening (or self-closing) element whose parent path is `stack`.
    fn open(&mut self, path: &Path, stack: &[String], name: &str, e: &BytesStart) -> Result<()> {
        let schema = match self.schema {
            Some(schema) => schema,
            None => return Ok(()),
        };
        let global = global_path(schema);
        let bands = bands_path(schema);

        if name == "corner_point"
            && stack.len() == global.len() + 1
            && stack.starts_with_path(global)
            && stack[global.len()] == "projection_information"
        {
            let attrs = attributes(e)?;
            let x = attribute(&attrs, "x").map(|v| number(path, "corner_point x", v));
            let y = attribute(&attrs, "y").map(|v| number(path, "corner_point y", v));
            if let (Some(x), Some(y)) = (x, y) {
                let point = (x?, y?);
                match attribute(&attrs, "location") {
                    Some("UL") => self.upper_left = Some(point),
                    Some("LR") => self.lower_right = Some(point),
                    _ => {}
                }
            }
        } else if name == "band" && path_is(stack, bands) {
            let attrs = attributes(e)?;
            self.bands.push(BandInfo {
                product: attribute(&attrs, "product").unwrap_or_default().to_string(),
                name: attribute(&attrs, "name").unwrap_or_default().to_string(),
                ..Default::default()
            });
        } else if name == "pixel_size"
            && stack.len() == bands.len() + 1
            && stack.starts_with_path(bands)
        {
            let attrs = attributes(e)?;
            let x = attribute(&attrs, "x").unwrap_or_default();
            let y = attribute(&attrs, "y").unwrap_or_default();
            let pixel_size = BandPixelSize {
                x: number(path, "pixel_size x", x)?,
                y: number(path, "pixel_size y", y)?,
                units: attribute(&attrs, "units").unwrap_or_default().to_string(),
            };
            if let Some(band) = self.bands.last_mut() {
                band.pixel_size = Some(pixel_size);
            }
        }
        Ok(())
    }

    /// Handle the text of the element at the top of `stack`.
    fn text(&mut self, path: &Path, stack: &[String], text: &str) -> Result<()> {
        let schema = match self.schema {
            Some(schema) => schema,
            None => return Ok(()),
        };
        let (name, parent) = match stack.split_last() {
            Some(split) => split,
            None => return Ok(()),
        };
        let global = global_path(schema);
        let bands = bands_path(schema);
        let value = text.trim();

        if path_is(parent, global) {
            match name.as_str() {
                "product_id" => self.product_id = Some(value.to_string()),
                "scene_id" => self.scene_id = Some(value.to_string()),
                _ => {}
            }
        } else if parent.len() == global.len() + 1 && parent.starts_with_path(global) {
            match (parent[global.len()].as_str(), name.as_str()) {
                ("bounding_coordinates", "north") => self.north = Some(number(path, "north", value)?),
                ("bounding_coordinates", "south") => self.south = Some(number(path, "south", value)?),
                ("bounding_coordinates", "east") => self.east = Some(number(path, "east", value)?),
                ("bounding_coordinates", "west") => self.west = Some(number(path, "west", value)?),
                ("projection_information", "grid_origin") => {
                    self.grid_origin = Some(value.to_string())
                }
                _ => {}
            }
        } else if name == "file_name"
            && parent.len() == bands.len() + 1
            && parent.starts_with_path(bands)
        {
            if let Some(band) = self.bands.last_mut() {
                band.file_name = value.to_string();
            }
        }
        Ok(())
    }
}

trait PathPrefix {
    fn starts_with_path(&self, prefix: &[&str]) -> bool;
}

impl PathPrefix for [String] {
    fn starts_with_path(&self, prefix: &[&str]) -> bool {
        self.len() >= prefix.len() && self.iter().zip(prefix).all(|(a, b)| a == b)
    }
}

/// Collect the fields of interest from XML text.
fn read_document(text: &str, path: &Path) -> Result<Document> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut doc = Document::default();
    let mut stack: Vec<String> = Vec::new();
    let mut seen_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = local_name(&e);
                if !seen_root {
                    seen_root = true;
                    doc.schema = schema_for_root(&name);
                }
                doc.open(path, &stack, &name, &e)?;
                stack.push(name);
            }
            Event::Empty(e) => {
                let name = local_name(&e);
                if !seen_root {
                    seen_root = true;
                    doc.schema = schema_for_root(&name);
                }
                doc.open(path, &stack, &name, &e)?;
            }
            Event::Text(t) => {
                let value = t.unescape()?;
                doc.text(path, &stack, &value)?;
            }
            Event::CData(c) => {
                let value = String::from_utf8_lossy(&c).into_owned();
                doc.text(path, &stack, &value)?;
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(doc)
}

/// Parse an ESPA or ARD document and select its reference band.
pub(super) fn parse_file(path: &Path) -> Result<SceneMetadata> {
    let text = fs::read_to_string(path)?;
    let doc = read_document(&text, path)?;

    let schema = doc
        .schema
        .ok_or_else(|| ElevationError::metadata(path, "Un-Supported Metadata XML"))?;

    let product_id = doc
        .product_id
        .or(doc.scene_id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ElevationError::metadata(path, "no product_id or scene_id found"))?;

    let missing = |what: &str| ElevationError::metadata(path, format!("missing {}", what));
    let bounds = BoundingBox::new(
        doc.north.ok_or_else(|| missing("bounding_coordinates/north"))?,
        doc.south.ok_or_else(|| missing("bounding_coordinates/south"))?,
        doc.east.ok_or_else(|| missing("bounding_coordinates/east"))?,
        doc.west.ok_or_else(|| missing("bounding_coordinates/west"))?,
    );
    bounds
        .validate()
        .map_err(|e| ElevationError::metadata(path, e.to_string()))?;
    let upper_left = doc.upper_left.ok_or_else(|| missing("UL corner_point"))?;
    let lower_right = doc.lower_right.ok_or_else(|| missing("LR corner_point"))?;
    let grid_origin = doc
        .grid_origin
        .ok_or_else(|| missing("grid_origin"))?
        .parse()
        .map_err(|msg: String| ElevationError::metadata(path, msg))?;

    let reference = select_reference(schema, &doc.bands, path)?;

    tracing::debug!(
        product_id = %product_id,
        schema = ?schema,
        reference = %reference.path.display(),
        "Parsed XML metadata"
    );

    Ok(SceneMetadata {
        path: path.to_path_buf(),
        schema,
        product_id,
        bounds,
        upper_left,
        lower_right,
        grid_origin,
        reference,
    })
}

/// The `<band>` record describing a generated elevation raster.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationBand {
    pub source: SourceKind,
    pub nlines: usize,
    pub nsamps: usize,
    /// Raster file name, relative to the metadata directory.
    pub file_name: String,
    pub pixel_size: BandPixelSize,
    pub app_version: String,
    /// UTC timestamp, `%Y-%m-%dT%H:%M:%SZ`.
    pub production_date: String,
}

impl ElevationBand {
    pub fn new(
        source: SourceKind,
        nlines: usize,
        nsamps: usize,
        file_name: impl Into<String>,
        pixel_size: BandPixelSize,
        produced: DateTime<Utc>,
    ) -> Self {
        Self {
            source,
            nlines,
            nsamps,
            file_name: file_name.into(),
            pixel_size,
            app_version: APP_VERSION.to_string(),
            production_date: produced.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }

    fn write_to<W: Write>(&self, writer: &mut Writer<W>, indent: &str) -> Result<()> {
        let inner = format!("{}  ", indent);

        let mut band = BytesStart::new("band");
        band.push_attribute(("product", ELEVATION_PRODUCT));
        band.push_attribute(("source", self.source.name()));
        band.push_attribute(("name", "elevation"));
        band.push_attribute(("category", "image"));
        band.push_attribute(("data_type", "INT16"));
        band.push_attribute(("nlines", self.nlines.to_string().as_str()));
        band.push_attribute(("nsamps", self.nsamps.to_string().as_str()));
        band.push_attribute(("fill_value", ELEVATION_FILL_VALUE.to_string().as_str()));
        writer.write_event(Event::Start(band))?;

        let text_elements = [
            ("short_name", "ELEVATION"),
            ("long_name", "elevation"),
            ("file_name", self.file_name.as_str()),
        ];
        for (name, value) in text_elements {
            write_text_element(writer, &inner, name, value)?;
        }

        writer.write_event(Event::Text(BytesText::from_escaped(inner.as_str())))?;
        let mut pixel_size = BytesStart::new("pixel_size");
        pixel_size.push_attribute(("x", self.pixel_size.x.to_string().as_str()));
        pixel_size.push_attribute(("y", self.pixel_size.y.to_string().as_str()));
        pixel_size.push_attribute(("units", self.pixel_size.units.as_str()));
        writer.write_event(Event::Empty(pixel_size))?;

        let text_elements = [
            ("resample_method", "bilinear"),
            ("data_units", "meters"),
            ("app_version", self.app_version.as_str()),
            ("production_date", self.production_date.as_str()),
        ];
        for (name, value) in text_elements {
            write_text_element(writer, &inner, name, value)?;
        }

        writer.write_event(Event::Text(BytesText::from_escaped(indent)))?;
        writer.write_event(Event::End(BytesEnd::new("band")))?;
        Ok(())
    }
}

fn write_text_element<W: Write>(
    writer: &mut Writer<W>,
    indent: &str,
    name: &str,
    value: &str,
) -> Result<()> {
    writer.write_event(Event::Text(BytesText::from_escaped(indent)))?;
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn is_whitespace(text: &[u8]) -> bool {
    text.iter().all(u8::is_ascii_whitespace)
}

fn is_elevation_band(e: &BytesStart) -> Result<bool> {
    let attrs = attributes(e)?;
    Ok(attribute(&attrs, "product") == Some(ELEVATION_PRODUCT))
}

/// Indentation used before the first child of an element indented by `closing`.
fn child_indent(closing: &str) -> String {
    let base = if closing.starts_with('\n') {
        closing.to_string()
    } else {
        format!("\n{}", closing)
    };
    format!("{}  ", base)
}

/// Copy `text`, dropping any existing elevation band and appending `band`.
fn rewrite_document(text: &str, path: &Path, band: &ElevationBand) -> Result<Vec<u8>> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(text.len() + 1024));

    let mut stack: Vec<String> = Vec::new();
    let mut bands: Option<&'static [&'static str]> = None;
    let mut pending: Option<String> = None;
    let mut band_indent: Option<String> = None;
    let mut skipping = 0usize;
    let mut appended = false;

    loop {
        let event = reader.read_event()?;

        if skipping > 0 {
            match event {
                Event::Start(_) => skipping += 1,
                Event::End(_) => skipping -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match &event {
            Event::Text(t) if is_whitespace(t) => {
                let ws = String::from_utf8_lossy(t).into_owned();
                pending = Some(match pending.take() {
                    Some(prev) => prev + &ws,
                    None => ws,
                });
                continue;
            }
            Event::Start(e) | Event::Empty(e) if stack.is_empty() => {
                let root = local_name(e);
                let schema = schema_for_root(&root)
                    .ok_or_else(|| ElevationError::metadata(path, "Un-Supported Metadata XML"))?;
                bands = Some(bands_path(schema));
            }
            Event::Start(e) | Event::Empty(e)
                if bands.is_some_and(|b| path_is(&stack, b)) && local_name(e) == "band" =>
            {
                if is_elevation_band(e)? {
                    tracing::info!(path = %path.display(), "Replacing existing elevation band");
                    pending = None;
                    if matches!(event, Event::Start(_)) {
                        skipping = 1;
                    }
                    continue;
                }
                band_indent = pending.clone();
            }
            Event::Empty(e)
                if bands.is_some_and(|b| stack.len() + 1 == b.len() && stack.starts_with_path(b))
                    && Some(local_name(e).as_str()) == bands.and_then(|b| b.last().copied()) =>
            {
                // `<bands/>`: expand it so the band has somewhere to go
                let closing = pending.take().unwrap_or_default();
                writer.write_event(Event::Text(BytesText::from_escaped(closing.as_str())))?;
                writer.write_event(Event::Start(e.to_owned()))?;
                band.write_to(&mut writer, &child_indent(&closing))?;
                writer.write_event(Event::Text(BytesText::from_escaped(closing.as_str())))?;
                writer.write_event(Event::End(e.to_end().into_owned()))?;
                appended = true;
                continue;
            }
            Event::End(_) if bands.is_some_and(|b| path_is(&stack, b)) => {
                let closing = pending.take().unwrap_or_default();
                let indent = band_indent
                    .take()
                    .unwrap_or_else(|| child_indent(&closing));
                band.write_to(&mut writer, &indent)?;
                writer.write_event(Event::Text(BytesText::from_escaped(closing.as_str())))?;
                appended = true;
            }
            Event::Eof => break,
            _ => {}
        }

        if let Some(ws) = pending.take() {
            writer.write_event(Event::Text(BytesText::from_escaped(ws.as_str())))?;
        }

        match &event {
            Event::Start(e) => stack.push(local_name(e)),
            Event::End(_) => {
                stack.pop();
            }
            _ => {}
        }
        writer.write_event(event)?;
    }

    if !appended {
        return Err(ElevationError::metadata(path, "no <bands> element to append to"));
    }
    if let Some(ws) = pending.take() {
        writer.write_event(Event::Text(BytesText::from_escaped(ws.as_str())))?;
    }

    Ok(writer.into_inner())
}

/// Append `band` to the metadata document at `path`.
///
/// An elevation band left by an earlier run is replaced rather than
/// duplicated. Equivalent to [`stage_elevation_band`] followed by
/// [`StagedMetadata::commit`].
pub fn append_elevation_band<P: AsRef<Path>>(path: P, band: &ElevationBand) -> Result<()> {
    stage_elevation_band(path, band)?.commit()
}

/// A rewritten metadata document waiting beside the original.
///
/// Dropping it without calling [`StagedMetadata::commit`] removes the
/// temporary file and leaves the original untouched.
#[derive(Debug)]
pub struct StagedMetadata {
    path: PathBuf,
    temp: NamedTempFile,
    source: SourceKind,
}

impl StagedMetadata {
    /// Document that will be replaced on commit.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the staged document over the original.
    pub fn commit(self) -> Result<()> {
        self.temp
            .persist(&self.path)
            .map_err(|e| ElevationError::Io(e.error))?;
        tracing::info!(path = %self.path.display(), source = self.source.name(), "Added elevation band to XML");
        Ok(())
    }
}

/// Rewrite the document at `path` with `band` into a temporary file in the
/// same directory.
///
/// The rewritten document is re-read and must hold exactly one elevation
/// band before it is staged.
pub fn stage_elevation_band<P: AsRef<Path>>(path: P, band: &ElevationBand) -> Result<StagedMetadata> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let output = rewrite_document(&text, path, band)?;

    let rewritten = String::from_utf8_lossy(&output);
    let doc = read_document(&rewritten, path)?;
    let elevation_bands = doc
        .bands
        .iter()
        .filter(|b| b.product == ELEVATION_PRODUCT)
        .count();
    if elevation_bands != 1 {
        return Err(ElevationError::metadata(
            path,
            format!("expected one elevation band after append, found {}", elevation_bands),
        ));
    }

    let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(&output)?;
    temp.flush()?;

    Ok(StagedMetadata {
        path: path.to_path_buf(),
        temp,
        source: band.source,
    })
}
