use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File '{}' not found", .0.display())]
    NotFound(PathBuf),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Column '{column}' missing from '{}'", .file.display())]
    MissingColumn { file: PathBuf, column: String },

    #[error("Invalid hexadecimal value '{value}' in column '{column}'")]
    HexDecode { column: String, value: String },

    #[error("Non-numeric value '{value}' in feature column '{column}'")]
    FeatureParse { column: String, value: String },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Invalid session identifier: {0}")]
    InvalidSession(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl DetectorError {
    pub fn is_not_found(&self) -> bool {
        match self {
            DetectorError::NotFound(_) => true,
            DetectorError::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectorError>;
