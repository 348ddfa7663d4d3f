//! Invocation of the GDAL command-line tools.
//!
//! Every call goes through a [`CommandRunner`] so the pipeline can be driven
//! without GDAL installed. [`SystemRunner`] spawns the real processes.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use serde::Deserialize;

use crate::error::{ElevationError, Result};
use crate::extent::WarpTarget;
use crate::geo::GeoTransform;

/// Working memory handed to `gdalwarp -wm`, in MB.
const WARP_MEMORY_MB: &str = "2048";

/// Output data type of every warp.
pub const OUTPUT_TYPE: &str = "Int16";

/// Output raster format of every warp.
pub const OUTPUT_FORMAT: &str = "ENVI";

/// An external program with its arguments and optional standard input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    /// Text written to the program's standard input.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Executes external commands.
pub trait CommandRunner {
    /// Run the command to completion and return its standard output.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::ToolFailed`] on a non-zero exit status or
    /// signal termination.
    fn run(&self, command: &ToolCommand) -> Result<String>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, command: &ToolCommand) -> Result<String> {
        (**self).run(command)
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for Box<R> {
    fn run(&self, command: &ToolCommand) -> Result<String> {
        (**self).run(command)
    }
}

/// Runs commands as blocking child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &ToolCommand) -> Result<String> {
        tracing::info!(command = %command, "Executing");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if command.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = cmd.spawn().map_err(|e| ElevationError::ToolFailed {
            command: command.to_string(),
            status: format!("could not be started: {}", e),
            output: String::new(),
        })?;

        if let (Some(input), Some(mut pipe)) = (&command.stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !stderr.trim().is_empty() {
            tracing::debug!(program = %command.program, stderr = %stderr.trim());
        }

        if !output.status.success() {
            let combined = [stdout.trim(), stderr.trim()]
                .iter()
                .filter(|s| !s.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(ElevationError::ToolFailed {
                command: command.to_string(),
                status: describe_status(output.status),
                output: combined,
            });
        }

        Ok(stdout)
    }
}

fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("returned error code [{}]", code),
        None => "terminated by signal".to_string(),
    }
}

/// A `gdalwarp` invocation.
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
/// use espa_elevation::gdal::WarpRequest;
///
/// let cmd = WarpRequest::new(vec![PathBuf::from("a.bil")], "mosaic.img")
///     .dst_nodata(0)
///     .to_command();
/// assert_eq!(
///     cmd.to_string(),
///     "gdalwarp -wm 2048 -multi -overwrite -dstnodata 0 -ot Int16 -of ENVI a.bil mosaic.img"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct WarpRequest {
    sources: Vec<PathBuf>,
    output: PathBuf,
    resampling: Option<String>,
    resolution: Option<(f64, f64)>,
    target_srs: Option<String>,
    extent: Option<[f64; 4]>,
    dst_nodata: Option<i32>,
}

impl WarpRequest {
    pub fn new(sources: Vec<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            sources,
            output: output.into(),
            resampling: None,
            resolution: None,
            target_srs: None,
            extent: None,
            dst_nodata: None,
        }
    }

    pub fn resampling(mut self, method: impl Into<String>) -> Self {
        self.resampling = Some(method.into());
        self
    }

    /// Use the resolution, projection and extent of `target`.
    pub fn target(mut self, target: &WarpTarget) -> Self {
        self.resolution = Some((target.pixel.dx, target.pixel.dy));
        self.target_srs = Some(target.srs.clone());
        self.extent = Some(target.te);
        self
    }

    pub fn dst_nodata(mut self, value: i32) -> Self {
        self.dst_nodata = Some(value);
        self
    }

    pub fn to_command(&self) -> ToolCommand {
        let mut cmd = ToolCommand::new("gdalwarp").args(["-wm", WARP_MEMORY_MB, "-multi", "-overwrite"]);

        if let Some(method) = &self.resampling {
            cmd = cmd.arg("-r").arg(method.as_str());
        }
        if let Some((x, y)) = self.resolution {
            cmd = cmd.arg("-tr").arg(x.to_string()).arg(y.to_string());
        }
        if let Some(srs) = &self.target_srs {
            cmd = cmd.arg("-t_srs").arg(srs.as_str());
        }
        if let Some(te) = self.extent {
            cmd = cmd.arg("-te").args(te.iter().map(|v| v.to_string()));
        }
        if let Some(nodata) = self.dst_nodata {
            cmd = cmd.arg("-dstnodata").arg(nodata.to_string());
        }

        cmd = cmd.args(["-ot", OUTPUT_TYPE, "-of", OUTPUT_FORMAT]);
        for source in &self.sources {
            cmd = cmd.path(source);
        }
        cmd.path(&self.output)
    }
}

/// The subset of `gdalinfo -json` output used by the builder.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetInfo {
    /// Raster size as `[samples, lines]`.
    pub size: [usize; 2],
    #[serde(rename = "geoTransform")]
    pub geo_transform: [f64; 6],
    #[serde(rename = "coordinateSystem", default)]
    pub coordinate_system: Option<CoordinateSystem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinateSystem {
    #[serde(default)]
    pub wkt: String,
}

impl DatasetInfo {
    pub fn samples(&self) -> usize {
        self.size[0]
    }

    pub fn lines(&self) -> usize {
        self.size[1]
    }

    pub fn transform(&self) -> GeoTransform {
        GeoTransform(self.geo_transform)
    }

    pub fn wkt(&self) -> Option<&str> {
        self.coordinate_system
            .as_ref()
            .map(|cs| cs.wkt.as_str())
            .filter(|wkt| !wkt.is_empty())
    }
}

/// Thin typed wrapper over the GDAL tools.
pub struct GdalTools<R> {
    runner: R,
}

impl<R: CommandRunner> GdalTools<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    fn run(&self, command: ToolCommand) -> Result<String> {
        let output = self.runner.run(&command)?;
        if !output.trim().is_empty() {
            tracing::debug!(program = %command.program, output = %output.trim());
        }
        Ok(output)
    }

    /// Mosaic `tiles` into a single Int16 ENVI raster with 0 as nodata.
    pub fn mosaic(&self, tiles: &[PathBuf], output: &Path) -> Result<()> {
        tracing::info!(tiles = tiles.len(), output = %output.display(), "Mosaicking tiles");
        self.run(WarpRequest::new(tiles.to_vec(), output).dst_nodata(0).to_command())?;
        Ok(())
    }

    /// Warp `source` onto the scene grid.
    pub fn warp(
        &self,
        source: &Path,
        output: &Path,
        target: &WarpTarget,
        resampling: &str,
    ) -> Result<()> {
        tracing::info!(source = %source.display(), output = %output.display(), "Warping to scene grid");
        self.run(
            WarpRequest::new(vec![source.to_path_buf()], output)
                .resampling(resampling)
                .target(target)
                .to_command(),
        )?;
        Ok(())
    }

    /// Read size, geotransform and projection of a raster.
    pub fn info(&self, path: &Path) -> Result<DatasetInfo> {
        let output = self.run(ToolCommand::new("gdalinfo").arg("-json").path(path))?;
        serde_json::from_str(&output).map_err(|e| ElevationError::ToolOutput {
            tool: "gdalinfo",
            message: format!("{}: {}", path.display(), e),
        })
    }

    /// Proj4 definition of a raster's projection.
    pub fn srs_proj4(&self, path: &Path) -> Result<String> {
        let output = self.run(
            ToolCommand::new("gdalsrsinfo")
                .args(["-o", "proj4"])
                .path(path),
        )?;
        let proj4 = output.trim().trim_matches(|c| c == '\'' || c == '"').trim();
        if proj4.is_empty() {
            return Err(ElevationError::ToolOutput {
                tool: "gdalsrsinfo",
                message: format!("no projection found for {}", path.display()),
            });
        }
        Ok(proj4.to_string())
    }

    /// Copy `input` to an ENVI raster with its corners reassigned to `ullr`
    /// (`ulx uly lrx lry`).
    pub fn translate_ullr(&self, input: &Path, output: &Path, ullr: [f64; 4]) -> Result<()> {
        self.run(
            ToolCommand::new("gdal_translate")
                .args(["-of", OUTPUT_FORMAT, "-a_ullr"])
                .args(ullr.iter().map(|v| v.to_string()))
                .path(input)
                .path(output),
        )?;
        Ok(())
    }

    /// Shift a raster's longitudes by `offset` degrees.
    pub fn shift_longitude(&self, input: &Path, output: &Path, offset: f64) -> Result<()> {
        let info = self.info(input)?;
        let t = info.geo_transform;
        let lrx = t[0] + info.samples() as f64 * t[1];
        let lry = t[3] + info.lines() as f64 * t[5];
        tracing::info!(input = %input.display(), offset, "Shifting longitudes");
        self.translate_ullr(input, output, [t[0] + offset, t[3], lrx + offset, lry])
    }

    /// Reproject `(x, y)` points between two spatial references.
    pub fn transform_points(
        &self,
        source_srs: &str,
        target_srs: &str,
        points: &[(f64, f64)],
    ) -> Result<Vec<(f64, f64)>> {
        let input: String = points
            .iter()
            .map(|(x, y)| format!("{} {}\n", x, y))
            .collect();
        let output = self.run(
            ToolCommand::new("gdaltransform")
                .arg("-s_srs")
                .arg(source_srs)
                .arg("-t_srs")
                .arg(target_srs)
                .stdin(input),
        )?;

        let parsed = output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_point)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ElevationError::ToolOutput {
                tool: "gdaltransform",
                message: format!("unparseable output: {}", output.trim()),
            })?;

        if parsed.len() != points.len() {
            return Err(ElevationError::ToolOutput {
                tool: "gdaltransform",
                message: format!("expected {} points, got {}", points.len(), parsed.len()),
            });
        }
        Ok(parsed)
    }
}

fn parse_point(line: &str) -> Option<(f64, f64)> {
    let mut values = line.split_whitespace().map(|v| v.parse::<f64>());
    match (values.next(), values.next()) {
        (Some(Ok(x)), Some(Ok(y))) => Some((x, y)),
        _ => None,
    }
}
