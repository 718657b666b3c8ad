use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Malformed task data: {0}")]
    TaskData(#[from] serde_json::Error),

    #[error("Invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The module's defining plugin is gone; the module cannot be deleted normally
    /// and no fallback applies.
    #[error("Cannot delete this module as the plugin '{0}' is missing")]
    MissingModulePlugin(String),

    #[error("Module clean-up failed: {0}")]
    ModuleCleanup(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Other(String),
}
