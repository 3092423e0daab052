use thiserror::Error;

/// The input table cannot be cleaned as given.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Column '{column}' has non-numeric value '{value}' at row {row}")]
    NotNumeric {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Malformed table: {0}")]
    Malformed(String),
}

/// Fetching or publishing an artifact failed.
#[derive(Error, Debug)]
pub enum ArtifactServiceError {
    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Invalid artifact reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("Digest mismatch for '{file}': expected {expected}, got {actual}")]
    DigestMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Artifact {artifact} holds {count} files, expected exactly one")]
    NotSingleFile { artifact: String, count: usize },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Artifact store responded with {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Artifact store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact metadata is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum CleaningError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    ArtifactService(#[from] ArtifactServiceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CleaningError>;
