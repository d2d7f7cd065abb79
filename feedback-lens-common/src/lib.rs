pub mod config;
pub use config::{
    ChartConfig, Config, LoggingConfig, ProcessingConfig, ReportLayoutConfig, UploadConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedbackLensError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("Corrupt file: {0}")]
    CorruptFile(String),
    #[error("Field not found: {0}")]
    FieldNotFound(String),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("File size too large ({size} bytes). Maximum size is {limit} bytes.")]
    FileTooLarge { size: u64, limit: u64 },
    #[error("Invalid report configuration: {0}")]
    ConfigValidation(String),
    #[error("Invalid chart spec: {0}")]
    ChartSpec(String),
    #[error("Render error: {0}")]
    Render(String),
    #[error("Layout error: {0}")]
    Layout(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

impl FeedbackLensError {
    /// HTTP-style status class for the collaborator boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnsupportedFormat(_)
            | Self::CorruptFile(_)
            | Self::FieldNotFound(_)
            | Self::FileTooLarge { .. }
            | Self::ConfigValidation(_)
            | Self::ChartSpec(_) => 400,
            Self::FileNotFound(_) => 404,
            Self::Render(_) | Self::Layout(_) | Self::Io(_) | Self::Other(_) => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// `{"error": "<message>"}` body
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}

pub type Result<T> = std::result::Result<T, FeedbackLensError>;
