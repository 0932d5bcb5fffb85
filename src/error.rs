//! Error types for the visage engine.

/// Top-level error type for the avatar engine.
///
/// Only one-shot setup calls (audio attach, avatar swap, config I/O) return
/// these. Per-frame work logs and drops its failures instead.
#[derive(Debug, thiserror::Error)]
pub enum VisageError {
    /// Audio device, permission, or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Render backend error (surface creation, upload, draw).
    #[error("render error: {0}")]
    Render(String),

    /// Scene lifecycle error (use after dispose, not initialized).
    #[error("scene error: {0}")]
    Scene(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VisageError>;
