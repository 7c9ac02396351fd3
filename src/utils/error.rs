// src/utils/error.rs
use thiserror::Error;

/// Upper bound on failure text written to the run ledger.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 2000;

// Define specific error types for different parts of the application
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to launch or connect to browser: {0}")]
    Launch(String),

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Timed out loading {url}")]
    Timeout { url: String },

    #[error("Renderer session lost: {0}")]
    SessionLost(String),

    #[error("Browser support not compiled. Rebuild with: cargo build --features browser")]
    Unsupported,
}

impl RenderError {
    /// Session-level defects end the run; page-level ones only cost a page.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RenderError::Launch(_) | RenderError::SessionLost(_) | RenderError::Unsupported
        )
    }
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Regular expression error: {0}")]
    RegexError(String),

    #[error("Invalid layout profile: {0}")]
    InvalidLayout(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Unknown run id: {0}")]
    UnknownRun(i64),

    #[error("Store lock poisoned")]
    Poisoned,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Truncates failure text on a character boundary for the ledger.
pub fn bounded_message(message: &str) -> String {
    message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
}
