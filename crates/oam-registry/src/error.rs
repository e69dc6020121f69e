use snafu::Snafu;

use crate::DefinitionKind;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{kind} definition {name:?} not found"))]
    NotFound { kind: DefinitionKind, name: String },

    #[snafu(display("definition with version {version} is immutable and cannot be updated: {name:?}"))]
    Immutable { name: String, version: String },

    #[snafu(display("{name:?} has invalid version {version:?}: {source}"))]
    InvalidVersion {
        name: String,
        version: String,
        source: semver::Error,
    },

    #[snafu(display("{name:?}: failed to parse template: {source}"))]
    SchemaParse {
        name: String,
        source: oam_expr::ParseError,
    },

    #[snafu(display("{name:?} is missing required attribute {attribute}"))]
    MissingRequiredAttribute { name: String, attribute: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;
