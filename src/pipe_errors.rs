use thiserror::Error;

use crate::optional_deps::OptionalDependencyError;

#[derive(Error, Debug)]
pub enum PipeError {
    #[error(transparent)]
    OptionalDependency(#[from] OptionalDependencyError),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[cfg(feature = "parquet")]
    #[error("Parquet error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),

    #[error("Unknown star catalog: {0} (expected 'Yale' or 'Hipparcos')")]
    UnknownCatalog(String),

    #[error("Invalid catalog resource '{resource}': {reason}")]
    InvalidCatalogResource { resource: String, reason: String },

    #[error("Invalid star query: {0}")]
    InvalidStarQuery(String),

    #[error("No compatible event source found for input: {0}")]
    NoCompatibleEventSource(String),

    #[error("Malformed event data in {path} (line {line}): {reason}")]
    MalformedEventData {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("Invalid simulation metadata: {0}")]
    InvalidSimulationMetadata(String),

    #[error("Output path already exists and overwrite is disabled: {0}")]
    OutputExists(String),

    #[error("Data writer has already been finished for this run")]
    WriterFinished,

    #[error("Missing parameters for stereo combination: {0}")]
    MissingParameters(String),

    #[error("Invalid processor configuration: {0}")]
    InvalidConfig(String),
}

impl PartialEq for PipeError {
    fn eq(&self, other: &Self) -> bool {
        use PipeError::*;
        match (self, other) {
            (OptionalDependency(a), OptionalDependency(b)) => a == b,

            // Foreign error payloads are not comparable: same variant means equal
            (IoError(_), IoError(_)) => true,
            (CsvError(_), CsvError(_)) => true,
            (JsonError(_), JsonError(_)) => true,
            #[cfg(feature = "parquet")]
            (ParquetError(_), ParquetError(_)) => true,

            (UnknownCatalog(a), UnknownCatalog(b)) => a == b,
            (
                InvalidCatalogResource {
                    resource: ra,
                    reason: rea,
                },
                InvalidCatalogResource {
                    resource: rb,
                    reason: reb,
                },
            ) => ra == rb && rea == reb,
            (InvalidStarQuery(a), InvalidStarQuery(b)) => a == b,
            (NoCompatibleEventSource(a), NoCompatibleEventSource(b)) => a == b,
            (
                MalformedEventData {
                    path: pa,
                    line: la,
                    reason: ra,
                },
                MalformedEventData {
                    path: pb,
                    line: lb,
                    reason: rb,
                },
            ) => pa == pb && la == lb && ra == rb,
            (InvalidSimulationMetadata(a), InvalidSimulationMetadata(b)) => a == b,
            (OutputExists(a), OutputExists(b)) => a == b,
            (MissingParameters(a), MissingParameters(b)) => a == b,
            (InvalidConfig(a), InvalidConfig(b)) => a == b,

            (WriterFinished, WriterFinished) => true,

            _ => false,
        }
    }
}
