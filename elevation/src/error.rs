//! Error types for the elevation band builder.

use std::path::PathBuf;
use thiserror::Error;

/// Broad classification of an [`ElevationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing environment variable, dataset root or incomplete user input.
    Configuration,
    /// Malformed or unsupported scene metadata.
    Metadata,
    /// Invalid or out-of-range bounding box.
    Extent,
    /// Missing source files or insufficient source coverage.
    Resource,
    /// An external GDAL tool failed.
    ExternalTool,
    /// Local filesystem failure.
    Io,
}

/// Errors that can occur while building an elevation band.
#[derive(Error, Debug)]
pub enum ElevationError {
    /// IO error when reading or writing files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A required environment variable is not set.
    #[error("{var} environment variable not defined")]
    MissingEnv { var: &'static str },

    /// Invalid configuration or command-line input.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The scene metadata is malformed or unsupported.
    #[error("Metadata error in {path}: {message}")]
    Metadata { path: PathBuf, message: String },

    /// Low-level XML read/write failure.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The extent violates the bounding box invariants.
    #[error("Invalid extent: {0}")]
    InvalidExtent(String),

    /// A required elevation source file does not exist.
    #[error("Elevation source file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Some, but not all, tiles of a tiled source are missing.
    #[error(
        "Incomplete {dataset} coverage: {} of {expected} tiles missing ({})",
        .missing.len(),
        .missing.join(", ")
    )]
    PartialCoverage {
        dataset: &'static str,
        missing: Vec<String>,
        expected: usize,
    },

    /// None of the GLS tiles exist, which means the scene is over water.
    #[error("GLS DEM is over water: none of the {expected} tiles exist")]
    OverWater { expected: usize },

    /// The RAMP DEM does not cover enough of the scene.
    #[error("Insufficient RAMP overlap: only {points} points within data when at least 3 are required")]
    RampCoverage { points: usize },

    /// An external tool exited unsuccessfully.
    #[error("Application [{command}] {status}{}", format_output(.output))]
    ToolFailed {
        command: String,
        status: String,
        output: String,
    },

    /// An external tool produced output that could not be interpreted.
    #[error("Unexpected output from {tool}: {message}")]
    ToolOutput { tool: &'static str, message: String },

    /// An ENVI header could not be parsed or does not match its raster.
    #[error("Invalid ENVI header {path}: {message}")]
    EnviHeader { path: PathBuf, message: String },
}

fn format_output(output: &str) -> String {
    if output.is_empty() {
        String::new()
    } else {
        format!(" Stdout/Stderr is: {}", output)
    }
}

impl ElevationError {
    /// Shorthand for a [`ElevationError::Metadata`] error.
    pub fn metadata(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ElevationError::Metadata {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns the broad classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ElevationError::MissingEnv { .. } | ElevationError::Config(_) => {
                ErrorKind::Configuration
            }
            ElevationError::Metadata { .. } | ElevationError::Xml(_) => ErrorKind::Metadata,
            ElevationError::InvalidExtent(_) => ErrorKind::Extent,
            ElevationError::FileNotFound { .. }
            | ElevationError::PartialCoverage { .. }
            | ElevationError::OverWater { .. }
            | ElevationError::RampCoverage { .. }
            | ElevationError::EnviHeader { .. } => ErrorKind::Resource,
            ElevationError::ToolFailed { .. } | ElevationError::ToolOutput { .. } => {
                ErrorKind::ExternalTool
            }
            ElevationError::Io(_) => ErrorKind::Io,
        }
    }
}

/// Result type alias using [`ElevationError`].
pub type Result<T> = std::result::Result<T, ElevationError>;
