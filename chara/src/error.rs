use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CharaError {
    #[error("Unknown race: {0}")]
    UnknownRace(Box<str>),
    #[error("Race table is invalid: {0}")]
    RaceTable(Box<str>),
    #[error("Failed to parse race table")]
    RaceTableParse(#[source] serde_json::Error),

    #[error("Failed to decode character descriptor")]
    Descriptor(#[source] serde_json::Error),
    #[error("Failed to parse resolve settings")]
    Settings(#[source] serde_json::Error),

    #[error("Unable to find catalog item for {0}")]
    ModelNotFound(Box<str>),
    #[error("No race yields model data for {0}")]
    ModelUnavailable(Box<str>),
    #[error("Unable to deform model: {0}")]
    Deform(Box<str>),

    #[error("Material reference {0} could not be decoded")]
    MaterialPath(Box<str>),
    #[error("Material {0} is unavailable")]
    MaterialUnavailable(Box<str>),

    #[error("Asset source failed")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    IO(io::Error),
}
