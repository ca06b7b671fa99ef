//! Error types emitted by the totefleet CLI.
//!
//! Keep this error type reasonably small, as many CLI helpers return
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::path::PathBuf;
use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;
use totefleet_core::{ConfigError, PipelineError, ReportError};
use totefleet_data::SiteLoadError;
use totefleet_data::routing::ProviderBuildError;

/// Errors emitted by the totefleet CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// An option carries a value the command does not understand.
    #[error("invalid --{field} value {value:?}: {message}")]
    InvalidOption {
        field: &'static str,
        value: String,
        message: String,
    },
    /// The requested operation requires a missing compile-time feature.
    #[error("{action} requires the `{feature}` feature to be enabled")]
    MissingFeature {
        feature: &'static str,
        action: &'static str,
    },
    /// A referenced input path does not exist on disk.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path exists but is not a file.
    #[error("{field} path {path:?} exists but is not a file")]
    SourcePathNotFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected due to an IO error.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectSourcePath {
        field: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A path taken from the run configuration is not valid UTF-8.
    #[error("path {path:?} is not valid UTF-8")]
    NonUtf8Path { path: PathBuf },
    /// Reading the run configuration failed.
    #[error("failed to read run configuration at {path:?}: {source}")]
    ReadRunConfig {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Run configuration JSON could not be decoded.
    #[error("failed to parse run configuration JSON at {path:?}: {source}")]
    ParseRunConfig {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The run configuration failed validation.
    #[error("run configuration in {path:?} failed validation: {source}")]
    InvalidRunConfig {
        path: Utf8PathBuf,
        #[source]
        source: ConfigError,
    },
    /// The location table could not be loaded.
    #[error(transparent)]
    LoadSites(#[from] SiteLoadError),
    /// Constructing the OSRM cost provider failed.
    #[error("failed to build OSRM cost provider for {base_url:?}: {source}")]
    BuildCostProvider {
        base_url: String,
        #[source]
        source: ProviderBuildError,
    },
    /// Creating the output directory failed.
    #[error("failed to create output directory {path:?}: {source}")]
    CreateOutputDir {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Opening the feasibility report database failed.
    #[error("failed to open feasibility store at {path:?}: {source}")]
    OpenStore {
        path: Utf8PathBuf,
        #[source]
        source: ReportError,
    },
    /// The planning pipeline failed.
    #[error("planning failed: {0}")]
    Pipeline(#[from] PipelineError),
    /// Serialising the plan summary failed.
    #[error("failed to serialise plan summary: {0}")]
    SerialiseSummary(#[source] serde_json::Error),
    /// Writing the plan summary file failed.
    #[error("failed to write plan summary to {path:?}: {source}")]
    WriteSummaryFile {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Writing the plan output failed.
    #[error("failed to write plan output: {0}")]
    WritePlanOutput(#[source] std::io::Error),
}
