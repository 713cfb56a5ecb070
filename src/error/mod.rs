use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostVerifyError {
    #[error("Host unreachable: {0}")]
    Unreachable(String),

    #[error("Command error: {0}")]
    Command(String),

    #[error("Command timed out after {secs}s: {command}")]
    Timeout { command: String, secs: u64 },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Suite parse error: {0}")]
    SuiteParse(String),

    #[error("Suite file not found: {0}")]
    SuiteFileNotFound(String),

    #[error("Duplicate check name '{name}' in suite '{suite}'")]
    DuplicateCheck { suite: String, name: String },

    #[error("Inventory error: {0}")]
    Inventory(String),

    #[error("Invalid host URI: {0}")]
    InvalidHostUri(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HostVerifyError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, HostVerifyError::Unreachable(_))
    }
}

pub type Result<T> = std::result::Result<T, HostVerifyError>;
