mod component;
mod descriptor;
mod filter;
mod fingerprint;
mod repository;
mod run;
mod wiring;

pub use component::{
    Attributes, Capability, Component, ComponentId, IDENTITY_NAMESPACE, RawComponent, Requirement,
};
pub use descriptor::RunDescriptor;
pub use filter::{CompareOp, Filter};
pub use fingerprint::Fingerprint;
use miette::Diagnostic;
pub use repository::{Repository, RepositoryIndex, RepositoryRef};
pub use run::{LeveledBundle, RunSpec, STARTLEVEL_ATTRIBUTE, StartLevelConfig, StartLevelOrder};
use semver::Version;
use thiserror::Error;
pub use wiring::{Wire, WiredComponent, Wiring};

#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid filter `{input}`: {message}")]
    #[diagnostic(code(model::invalid_filter))]
    InvalidFilter { input: String, message: String },

    #[error("invalid start level clause `{input}`: {message}")]
    #[diagnostic(
        code(model::invalid_start_levels),
        help("Expected e.g. `order=leastdependenciesfirst,begin=100,step=10`.")
    )]
    InvalidStartLevels { input: String, message: String },

    #[error("invalid version `{0}`")]
    #[diagnostic(code(model::invalid_version))]
    InvalidVersion(String),

    #[error("invalid fingerprint `{0}`")]
    #[diagnostic(code(model::invalid_fingerprint))]
    InvalidFingerprint(String),

    #[error("invalid component `{name}`: {message}")]
    #[diagnostic(code(model::invalid_component))]
    InvalidComponent { name: String, message: String },

    #[error("wire references `{id}` which is not part of the wiring")]
    #[diagnostic(code(model::unknown_wire_endpoint))]
    UnknownWireEndpoint { id: String },

    #[error("invalid repository location `{location}`: {source}")]
    #[diagnostic(code(model::invalid_repository_location))]
    InvalidRepositoryLocation {
        location: String,
        source: url::ParseError,
    },

    #[error("json5 error: {0}")]
    #[diagnostic(code(model::json5_error))]
    Json5(#[from] json5::Error),

    #[error("json error: {0}")]
    #[diagnostic(code(model::json_error))]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    #[diagnostic(code(model::io_error))]
    Io(#[from] std::io::Error),
}

/// Parse a version, padding missing minor/patch segments (`1` -> `1.0.0`, `1.2` -> `1.2.0`).
pub fn parse_version(input: &str) -> Result<Version, Error> {
    let trimmed = input.trim();
    if let Ok(version) = Version::parse(trimmed) {
        return Ok(version);
    }

    let (core, rest) = match trimmed.find(['-', '+']) {
        Some(idx) => trimmed.split_at(idx),
        None => (trimmed, ""),
    };
    let segments = core.split('.').count();
    let padded = match segments {
        1 => format!("{core}.0.0{rest}"),
        2 => format!("{core}.0{rest}"),
        _ => return Err(Error::InvalidVersion(input.to_string())),
    };
    Version::parse(&padded).map_err(|_| Error::InvalidVersion(input.to_string()))
}
