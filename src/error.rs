use thiserror::Error;

/// Failures of the color sampling core.
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("sampling task did not complete: {0}")]
    Task(String),
}

/// Failures talking to the remote ripeness authority.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("request to classifier failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("classifier rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed classifier response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("'{0}' already exists")]
    Duplicate(String),

    #[error("'{0}' not found")]
    NotFound(String),

    #[error("code label index {0} out of range (expected 1-3)")]
    InvalidCodeIndex(usize),

    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store data is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("an image and a visual color selection are required before analysis")]
    NotReady,

    #[error("image decode timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error(transparent)]
    Sampler(#[from] SamplerError),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
