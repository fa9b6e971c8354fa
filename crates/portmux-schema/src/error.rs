/// Errors that can occur during command registration and dispatch.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The schema could not be compiled.
    #[error("failed to compile schema for {path}: {message}")]
    CompileFailed { path: String, message: String },

    /// An entry's path matched but the payload failed schema validation.
    #[error("schema violation at {path}: {detail}")]
    SchemaViolation { path: String, detail: String },

    /// No registered entry matches the envelope for this module.
    #[error("unknown command for module '{0}'")]
    UnknownCommand(String),

    /// A path was registered twice for the same module.
    #[error("duplicate path '{path}' for module '{module}'")]
    DuplicatePath { module: String, path: String },

    /// The payload could not be represented as JSON.
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SchemaError>;
